//! ==============================================================================
//! duty_cycle.rs - wake timer and power-down
//! ==============================================================================
//!
//! purpose:
//!     arms the wake source for the role's sleep period and takes the process
//!     down. nothing survives the power-down except the retained clock region.
//!
//! sleep model:
//!     - commit the ClockState to the retained store
//!     - block for the armed duration (no runtime, no radio)
//!     - re-execute this binary so the next cycle starts at Booting with
//!       empty memory, or exit and let a supervisor restart it
//!
//! relationships:
//!     - uses: retained.rs (commits the region)
//!     - used by: main.rs (last thing every cycle does)
//!
//! ==============================================================================

use anyhow::{bail, Result};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::DutyCycleConfig;
use crate::domain::ClockState;
use crate::retained::RetainedStore;

#[derive(Debug)]
pub struct DutyCycleController {
    armed: Option<Duration>,
    reexec: bool,
}

impl DutyCycleController {
    pub fn new(cfg: &DutyCycleConfig) -> Self {
        Self { armed: None, reexec: cfg.reexec }
    }

    /// set the wake source; a cycle arms it exactly once
    pub fn arm_wake_timer(&mut self, duration: Duration) -> Result<()> {
        if let Some(existing) = self.armed {
            bail!("wake timer already armed for {:?}", existing);
        }
        info!(?duration, "wake timer armed");
        self.armed = Some(duration);
        Ok(())
    }

    #[cfg(test)]
    pub fn armed(&self) -> Option<Duration> {
        self.armed
    }

    /// writes the region and returns how long to stay down
    fn commit<R: RetainedStore>(&self, store: &R, state: &ClockState) -> Duration {
        if let Err(e) = store.save(state) {
            // the next wake will look like a cold boot and resync
            error!(error = %e, "failed to commit retained clock");
        }
        self.armed.unwrap_or_else(|| {
            warn!("entering low power with no wake timer armed");
            Duration::ZERO
        })
    }

    /// never returns: the current process instance ends here
    pub fn enter_low_power<R: RetainedStore>(self, store: &R, state: &ClockState) -> ! {
        let duration = self.commit(store, state);
        info!(
            ?duration,
            time = %state.time(),
            synchronized = state.synchronized,
            "entering low power"
        );
        std::thread::sleep(duration);

        if self.reexec {
            wake();
        }
        std::process::exit(0)
    }
}

#[cfg(unix)]
fn wake() {
    use std::os::unix::process::CommandExt;

    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            error!(error = %e, "cannot locate own binary, exiting instead");
            return;
        }
    };
    // exec only returns on failure
    let err = std::process::Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .exec();
    error!(error = %err, exe = %exe.display(), "re-exec failed, exiting instead");
}

#[cfg(not(unix))]
fn wake() {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            error!(error = %e, "cannot locate own binary, exiting instead");
            return;
        }
    };
    if let Err(e) = std::process::Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .spawn()
    {
        error!(error = %e, exe = %exe.display(), "respawn failed, exiting instead");
    }
}
