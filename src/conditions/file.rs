//! File-existence leaf condition.
//!
//! Polls the filesystem every `poll` (default 100ms), so satisfaction is observed
//! at most one poll interval after the file appears.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::condition::Condition;
use crate::error::ConditionError;

/// Default polling interval of [`FileExists`].
pub const FILE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Satisfied once `path` exists.
#[derive(Clone, Debug)]
pub struct FileExists {
    path: PathBuf,
    poll: Duration,
}

impl FileExists {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll: FILE_POLL_INTERVAL,
        }
    }

    /// Overrides the polling interval (clamped to at least 1ms).
    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll.max(Duration::from_millis(1));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Condition for FileExists {
    async fn wait(&self, ctx: CancellationToken) -> Result<(), ConditionError> {
        loop {
            if ctx.is_cancelled() {
                return Err(ConditionError::Cancelled);
            }
            match tokio::fs::try_exists(&self.path).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => {
                    return Err(ConditionError::Failed {
                        condition: self.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
            tokio::select! {
                _ = ctx.cancelled() => return Err(ConditionError::Cancelled),
                _ = tokio::time::sleep(self.poll) => {}
            }
        }
    }
}

impl fmt::Display for FileExists {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file {:?} to exist", self.path)
    }
}
