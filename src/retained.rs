//! ==============================================================================
//! retained.rs - clock region that survives low-power sleep
//! ==============================================================================
//!
//! purpose:
//!     loads and stores the ClockState across the sleep boundary. nothing else
//!     crosses it; every wake starts from scratch with just this region.
//!
//! layout:
//!     {"hour":"09","min":"15","sec":"42","synchronized":true}
//!
//! the file store defaults to a tmpfs path, which mirrors rtc memory: it
//! survives a process restart (sleep) but not a power loss (cold boot).
//!
//! ==============================================================================

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::domain::ClockState;

pub trait RetainedStore {
    /// `None` means the region was wiped (cold boot)
    fn load(&self) -> Result<Option<ClockState>>;
    fn save(&self, state: &ClockState) -> Result<()>;

    /// region contents, or the cold-boot state when absent or unreadable
    fn load_or_cold(&self) -> ClockState {
        match self.load() {
            Ok(Some(state)) => {
                info!(time = %state.time(), synchronized = state.synchronized, "woke with retained clock");
                state
            }
            Ok(None) => {
                info!("cold boot: no retained clock");
                ClockState::cold()
            }
            Err(e) => {
                warn!(error = %e, "retained clock unreadable, treating as cold boot");
                ClockState::cold()
            }
        }
    }
}

pub struct FileRetainedStore {
    path: PathBuf,
}

impl FileRetainedStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl RetainedStore for FileRetainedStore {
    fn load(&self) -> Result<Option<ClockState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let state = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        Ok(Some(state))
    }

    fn save(&self, state: &ClockState) -> Result<()> {
        let content = serde_json::to_string(state)?;
        // write-then-rename so a power cut mid-write never leaves half a region
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to commit {}", self.path.display()))?;
        Ok(())
    }
}
