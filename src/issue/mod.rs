//! Issue documents written from agent output.

pub mod naming;
pub mod writer;

pub use writer::{save_issue, IssueLayout, SavedIssue};
