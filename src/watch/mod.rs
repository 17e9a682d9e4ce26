//! Vault auto-watch: polling change detection feeding the summarize pipeline.

pub mod poller;
pub mod scanner;
pub mod settle;
pub mod state;

pub use poller::AutoWatcher;
pub use scanner::{scan_candidates, ScanRules};
pub use state::{TickPlan, WatchState, WatchStatus};
