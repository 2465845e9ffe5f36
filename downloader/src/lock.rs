/// Best-effort "already downloaded" marker.
///
/// The marker is a plain file. Checking and marking are separate steps, so two
/// processes starting at the same moment can both see it absent.
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct DownloadLock {
    path: PathBuf,
}

impl DownloadLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True iff the sentinel exists. Its content is not inspected.
    pub fn is_downloaded(&self) -> bool {
        self.path.exists()
    }

    /// Write the current pid into the sentinel. Never fails.
    pub fn mark_downloaded(&self) {
        let pid = std::process::id();
        match std::fs::write(&self.path, pid.to_string()) {
            Ok(()) => debug!("Marked download lock {} (pid {})", self.path.display(), pid),
            Err(e) => warn!("Could not write download lock {}: {}", self.path.display(), e),
        }
    }

    /// Pid recorded by whoever marked the lock, if readable.
    pub fn holder_pid(&self) -> Option<u32> {
        std::fs::read_to_string(&self.path).ok()?.trim().parse().ok()
    }
}
