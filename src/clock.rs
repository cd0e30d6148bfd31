//! ==============================================================================
//! clock.rs - persisted clock, sync-or-reuse at boot
//! ==============================================================================
//!
//! purpose:
//!     wraps the retained ClockState for one wake cycle and decides whether
//!     the node has to fetch network time or can reuse what it kept.
//!
//! relationships:
//!     - borrows: domain::ClockState (loaded by retained.rs in main.rs)
//!     - uses: sntp.rs (NetworkTimeSource)
//!     - used by: sensor_role.rs, actuator_role.rs (Booting, message stamps)
//!
//! a network fetch is the expensive part of a cycle, so it only happens
//! while `synchronized` is false. once set, the stored time is carried
//! forward unchanged; drift is never corrected until the region is wiped.
//!
//! ==============================================================================

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::TimeConfig;
use crate::domain::{ClockState, TimeOfDay};
use crate::sntp::NetworkTimeSource;

/// which path Booting took
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootPath {
    Synced,
    SyncFailed,
    Reused,
}

pub struct PersistentClock<'a> {
    state: &'a mut ClockState,
}

impl<'a> PersistentClock<'a> {
    pub fn new(state: &'a mut ClockState) -> Self {
        Self { state }
    }

    pub fn needs_sync(&self) -> bool {
        !self.state.synchronized
    }

    /// blocks on one network fetch; on failure the stored time stays as it was
    pub async fn sync_from_network<N: NetworkTimeSource>(
        &mut self,
        source: &mut N,
        cfg: &TimeConfig,
    ) -> Result<TimeOfDay> {
        match source.fetch_time(cfg).await {
            Ok(time) => {
                self.state.set_time(time);
                self.state.synchronized = true;
                info!(%time, server = %cfg.server, "clock synchronized");
                Ok(time)
            }
            Err(e) => {
                warn!(error = %e, stale = %self.state.time(), "time sync failed, keeping stale time");
                Err(e)
            }
        }
    }

    /// no network: the retained fields are the time
    pub fn reuse(&self) -> TimeOfDay {
        let time = self.state.time();
        debug!(%time, "reusing retained time");
        time
    }

    pub fn current_time(&self) -> TimeOfDay {
        self.state.time()
    }

    /// sync-or-reuse, the whole of the Booting state
    pub async fn boot<N: NetworkTimeSource>(&mut self, source: &mut N, cfg: &TimeConfig) -> BootPath {
        if self.needs_sync() {
            match self.sync_from_network(source, cfg).await {
                Ok(_) => BootPath::Synced,
                Err(_) => BootPath::SyncFailed,
            }
        } else {
            self.reuse();
            BootPath::Reused
        }
    }

    /// called on the way into Sleeping. the region already holds the time
    /// this cycle stamped with: a sync wrote it, a reuse left it alone. the
    /// flag is only ever raised by a successful sync, so a failed one stays
    /// clear and the next boot retries.
    pub fn carry_forward(&self) {
        debug!(
            time = %self.state.time(),
            synchronized = self.state.synchronized,
            "carrying clock forward"
        );
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::future::Future;

    /// scripted time source that counts how often it is asked
    pub(crate) struct FakeTimeSource {
        pub reply: Option<TimeOfDay>,
        pub calls: usize,
    }

    impl FakeTimeSource {
        pub fn answering(time: TimeOfDay) -> Self {
            Self { reply: Some(time), calls: 0 }
        }

        pub fn unreachable() -> Self {
            Self { reply: None, calls: 0 }
        }
    }

    impl NetworkTimeSource for FakeTimeSource {
        fn fetch_time(&mut self, _cfg: &TimeConfig) -> impl Future<Output = Result<TimeOfDay>> {
            self.calls += 1;
            let reply = self.reply;
            async move { reply.ok_or_else(|| anyhow!("network unreachable")) }
        }
    }

    fn synced_at(time: TimeOfDay) -> ClockState {
        let mut state = ClockState::cold();
        state.set_time(time);
        state.synchronized = true;
        state
    }

    #[tokio::test]
    async fn test_cold_boot_syncs() {
        let mut state = ClockState::cold();
        let mut source = FakeTimeSource::answering(TimeOfDay::new(14, 30, 0));
        let mut clock = PersistentClock::new(&mut state);

        assert!(clock.needs_sync());
        assert_eq!(clock.boot(&mut source, &TimeConfig::default()).await, BootPath::Synced);
        assert_eq!(clock.current_time(), TimeOfDay::new(14, 30, 0));
        assert!(!clock.needs_sync());
        assert_eq!(source.calls, 1);
        assert!(state.synchronized);
    }

    #[tokio::test]
    async fn test_failed_sync_keeps_last_time() {
        let mut state = ClockState::cold();
        state.set_time(TimeOfDay::new(8, 0, 1));
        let mut source = FakeTimeSource::unreachable();
        let mut clock = PersistentClock::new(&mut state);

        assert_eq!(clock.boot(&mut source, &TimeConfig::default()).await, BootPath::SyncFailed);
        assert_eq!(clock.current_time(), TimeOfDay::new(8, 0, 1));
        assert!(clock.needs_sync());

        clock.carry_forward();
        assert!(clock.needs_sync());
        assert!(!state.synchronized);
    }

    #[tokio::test]
    async fn test_warm_boot_reuses_without_network() {
        let mut state = synced_at(TimeOfDay::new(9, 15, 42));
        let mut source = FakeTimeSource::answering(TimeOfDay::new(23, 0, 0));
        let mut clock = PersistentClock::new(&mut state);

        assert_eq!(clock.boot(&mut source, &TimeConfig::default()).await, BootPath::Reused);
        assert_eq!(clock.current_time(), TimeOfDay::new(9, 15, 42));
        assert_eq!(source.calls, 0);
    }

    #[tokio::test]
    async fn test_carry_forward_leaves_region_untouched() {
        let warm = synced_at(TimeOfDay::new(9, 15, 42));
        let mut state = warm.clone();
        let mut source = FakeTimeSource::unreachable();
        {
            let mut clock = PersistentClock::new(&mut state);
            clock.boot(&mut source, &TimeConfig::default()).await;
            clock.carry_forward();
        }
        assert_eq!(state, warm);

        let mut cold = ClockState::cold();
        {
            let mut clock = PersistentClock::new(&mut cold);
            clock.boot(&mut source, &TimeConfig::default()).await;
            clock.carry_forward();
        }
        assert_eq!(cold, ClockState::cold());
    }

    #[tokio::test]
    async fn test_carry_forward_after_sync() {
        let mut state = ClockState::cold();
        let mut source = FakeTimeSource::answering(TimeOfDay::new(1, 2, 3));
        {
            let mut clock = PersistentClock::new(&mut state);
            clock.boot(&mut source, &TimeConfig::default()).await;
            clock.carry_forward();
        }
        assert!(state.synchronized);
        assert_eq!(state.time(), TimeOfDay::new(1, 2, 3));
    }
}
