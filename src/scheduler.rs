//! ==============================================================================
//! scheduler.rs - recurring broadcast task
//! ==============================================================================
//!
//! purpose:
//!     an enable/disable switch plus a fixed period. the control loop polls it
//!     once per iteration; enabling makes it due straight away, a deferred
//!     enable makes it due one period out.
//!
//! relationships:
//!     - used by: sensor_role.rs (rebroadcast while awaiting an answer)
//!     - used by: actuator_role.rs (single decision send)
//!     - configured by: config.rs ([mesh] broadcast_interval_ms)
//!
//! ==============================================================================

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct RecurringTask {
    interval: Duration,
    next_due: Option<Instant>,
}

impl RecurringTask {
    /// starts disabled
    pub fn new(interval: Duration) -> Self {
        Self { interval, next_due: None }
    }

    pub fn enable(&mut self) {
        if self.next_due.is_none() {
            self.next_due = Some(Instant::now());
        }
    }

    /// enabled, first run one interval from now
    pub fn enable_deferred(&mut self) {
        self.next_due = Some(Instant::now() + self.interval);
    }

    pub fn disable(&mut self) {
        self.next_due = None;
    }

    #[cfg(test)]
    pub fn is_enabled(&self) -> bool {
        self.next_due.is_some()
    }

    /// true when the task should run now; reschedules it one interval out
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_disabled_never_fires() {
        let mut task = RecurringTask::new(Duration::from_millis(100));
        assert!(!task.is_enabled());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!task.poll(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_on_enable_then_every_interval() {
        let mut task = RecurringTask::new(Duration::from_millis(100));
        task.enable();
        assert!(task.poll(Instant::now()));
        assert!(!task.poll(Instant::now()));

        tokio::time::advance(Duration::from_millis(99)).await;
        assert!(!task.poll(Instant::now()));
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(task.poll(Instant::now()));

        task.disable();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!task.poll(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_waits_one_interval() {
        let mut task = RecurringTask::new(Duration::from_millis(100));
        task.enable_deferred();
        assert!(task.is_enabled());
        assert!(!task.poll(Instant::now()));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(task.poll(Instant::now()));
    }
}
