#![forbid(unsafe_code)]

//! Drive the `claude` and `codex` CLI agents as subprocesses to summarize
//! vault documents, and watch the vault for new documents to summarize into
//! sequenced issue files.

pub mod agent;
pub mod config;
pub mod errors;
pub mod issue;
pub mod orchestrator;
pub mod process;
pub mod summarize;
pub mod watch;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
