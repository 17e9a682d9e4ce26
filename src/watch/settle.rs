//! Wait for a file to stop growing before it is summarized.

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::config::WatchConfig;

/// Size-sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    /// Delay between samples.
    pub interval: Duration,
    /// Repeats of the previous size needed to call the file stable.
    pub samples: u32,
    /// Samples taken before giving up.
    pub max_attempts: u32,
}

impl SettlePolicy {
    /// Policy from the `[watch]` table.
    #[must_use]
    pub fn from_config(watch: &WatchConfig) -> Self {
        Self {
            interval: watch.settle_interval(),
            samples: watch.settle_samples,
            max_attempts: watch.settle_max_attempts,
        }
    }
}

/// Sample the size of `path` until it repeats `policy.samples` times in a row.
///
/// Returns `false` as soon as the file disappears. When attempts run out
/// without a stable reading the file is still processed if it exists.
pub async fn wait_for_stable_file(path: &Path, policy: &SettlePolicy) -> bool {
    let mut last_size: Option<u64> = None;
    let mut stable = 0;

    for _ in 0..policy.max_attempts {
        let Ok(metadata) = tokio::fs::metadata(path).await else {
            debug!(path = %path.display(), "file vanished while settling");
            return false;
        };
        let size = metadata.len();
        if last_size == Some(size) {
            stable += 1;
            if stable >= policy.samples {
                return true;
            }
        } else {
            stable = 0;
            last_size = Some(size);
        }
        tokio::time::sleep(policy.interval).await;
    }

    debug!(path = %path.display(), "file still changing, processing anyway");
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
