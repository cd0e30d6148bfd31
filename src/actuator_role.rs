//! ==============================================================================
//! actuator_role.rs - actuator node state machine
//! ==============================================================================
//!
//! purpose:
//!     one wake cycle of the indicating node: get a usable time, wait for a
//!     reading, turn it into a color, show it, answer with a decision, sleep.
//!
//! states:
//!
//!     Booting ──> Listening ──> Deciding ──> Broadcasting ──> Sleeping
//!                    │                                           ▲
//!                    └───────────── listen window closed ────────┘
//!
//!     - the broadcast task starts disabled and is only enabled for the one
//!       decision send.
//!     - this node is the last actor of the round: it sleeps once its own
//!       send completes, without waiting for anything back.
//!
//! relationships:
//!     - uses: clock.rs, hal.rs, codec.rs, mesh.rs, scheduler.rs
//!     - used by: runtime.rs
//!
//! ==============================================================================

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::PersistentClock;
use crate::codec::{decode_reading, encode_decision, is_decision};
use crate::config::NodeConfig;
use crate::domain::{decide, ClockState, Color, CycleOutcome, Decision, Reading};
use crate::hal::HardwareProvider;
use crate::mesh::{Mailbox, MeshTransport};
use crate::scheduler::RecurringTask;
use crate::sntp::NetworkTimeSource;

#[derive(Clone, Debug, PartialEq)]
pub enum ActuatorState {
    Booting,
    Listening,
    Deciding(Reading),
    Broadcasting(Color),
    Sleeping(CycleOutcome),
}

pub struct ActuatorRole<'a, H, T, N> {
    config: &'a NodeConfig,
    clock: PersistentClock<'a>,
    hal: &'a H,
    transport: &'a mut T,
    time_source: &'a mut N,
    inbox: Mailbox,
    task: RecurringTask,
}

impl<'a, H, T, N> ActuatorRole<'a, H, T, N>
where
    H: HardwareProvider,
    T: MeshTransport,
    N: NetworkTimeSource,
{
    pub fn new(
        config: &'a NodeConfig,
        clock_state: &'a mut ClockState,
        hal: &'a H,
        transport: &'a mut T,
        time_source: &'a mut N,
    ) -> Self {
        Self {
            config,
            clock: PersistentClock::new(clock_state),
            hal,
            transport,
            time_source,
            inbox: Mailbox::new(config.mesh.mailbox_capacity),
            task: RecurringTask::new(config.mesh.broadcast_interval()),
        }
    }

    pub async fn run(mut self) -> CycleOutcome {
        let mut state = ActuatorState::Booting;
        loop {
            state = match state {
                ActuatorState::Sleeping(outcome) => return outcome,
                other => self.step(other).await,
            };
        }
    }

    pub async fn step(&mut self, state: ActuatorState) -> ActuatorState {
        match state {
            ActuatorState::Booting => {
                let path = self.clock.boot(&mut *self.time_source, &self.config.time).await;
                self.task.disable();
                debug!(?path, "actuator: booting -> listening");
                ActuatorState::Listening
            }
            ActuatorState::Listening => self.listen().await,
            ActuatorState::Deciding(reading) => {
                let color = decide(reading.temperature, self.config.decision.threshold_c);
                info!(
                    from = reading.node_id,
                    temp = reading.temperature,
                    threshold = self.config.decision.threshold_c,
                    %color,
                    "decided"
                );
                ActuatorState::Broadcasting(color)
            }
            ActuatorState::Broadcasting(color) => self.broadcast_decision(color).await,
            ActuatorState::Sleeping(outcome) => ActuatorState::Sleeping(outcome),
        }
    }

    async fn listen(&mut self) -> ActuatorState {
        let deadline = Instant::now() + self.config.duty_cycle.listen_timeout();
        loop {
            if let Err(e) = self.transport.service(&mut self.inbox).await {
                warn!(error = %e, "mesh service failed");
                tokio::time::sleep(self.config.mesh.tick()).await;
            }

            while let Some(msg) = self.inbox.take() {
                if is_decision(&msg) {
                    debug!(%msg, "actuator: ignoring another actuator's decision");
                    continue;
                }
                debug!(%msg, "actuator: listening -> deciding");
                return ActuatorState::Deciding(decode_reading(&msg));
            }

            if Instant::now() >= deadline {
                warn!(timeout = ?self.config.duty_cycle.listen_timeout(), "no reading arrived");
                return self.sleep(CycleOutcome::NothingHeard);
            }
        }
    }

    async fn broadcast_decision(&mut self, color: Color) -> ActuatorState {
        let levels = self.config.indicator.levels(color);
        if let Err(e) = self.hal.set_indicator(self.config.indicator.pins, levels) {
            warn!(error = %e, %color, "indicator write failed");
        }

        let decision = Decision {
            node_id: self.config.node.node_id,
            color,
            stamp: self.clock.current_time(),
        };
        let payload = encode_decision(&decision);

        self.task.enable();
        if self.task.poll(Instant::now()) {
            match self.transport.broadcast(&payload).await {
                Ok(()) => debug!(%payload, "actuator: broadcast"),
                Err(e) => warn!(error = %e, "broadcast failed"),
            }
        }
        self.task.disable();

        self.sleep(CycleOutcome::Decided(decision))
    }

    fn sleep(&mut self, outcome: CycleOutcome) -> ActuatorState {
        self.clock.carry_forward();
        debug!("actuator: -> sleeping");
        ActuatorState::Sleeping(outcome)
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::tests::FakeTimeSource;
    use crate::domain::TimeOfDay;
    use crate::hal::MockHal;
    use crate::mesh::memory;

    const MILD_READING: &str = r#"{"node":1,"temp":25.0,"hum":40.0,"hour":"14","min":"30","sec":"00"}"#;

    fn actuator_config() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.node.role = crate::config::NodeRole::Actuator;
        config.node.node_id = 2;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_green_decision_for_mild_reading() {
        let config = actuator_config();
        let mut state = ClockState::cold();
        let hal = MockHal::with_reading(0.0, 0.0);
        let mut source = FakeTimeSource::answering(TimeOfDay::new(14, 30, 0));
        let (mut actuator_end, mut peer) = memory::pair(config.mesh.tick());

        peer.broadcast(MILD_READING).await.unwrap();
        let outcome = ActuatorRole::new(&config, &mut state, &hal, &mut actuator_end, &mut source)
            .run()
            .await;

        assert_eq!(
            outcome,
            CycleOutcome::Decided(Decision {
                node_id: 2,
                color: Color::Green,
                stamp: TimeOfDay::new(14, 30, 0),
            })
        );
        assert_eq!(hal.indicator(), Some(config.indicator.green));
        assert_eq!(
            peer.pending(),
            vec![r#"{"node":2,"color":"Green","hour":"14","min":"30","sec":"00"}"#.to_string()]
        );
        assert!(state.synchronized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_red_decision_for_hot_reading() {
        let config = actuator_config();
        let mut state = ClockState::cold();
        let hal = MockHal::with_reading(0.0, 0.0);
        let mut source = FakeTimeSource::answering(TimeOfDay::new(14, 30, 0));
        let (mut actuator_end, mut peer) = memory::pair(config.mesh.tick());

        peer.broadcast(r#"{"node":1,"temp":31.5,"hum":40.0,"hour":"14","min":"30","sec":"00"}"#)
            .await
            .unwrap();
        let outcome = ActuatorRole::new(&config, &mut state, &hal, &mut actuator_end, &mut source)
            .run()
            .await;

        match outcome {
            CycleOutcome::Decided(decision) => assert_eq!(decision.color, Color::Red),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(hal.indicator(), Some([255, 0, 0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_boundary_reading_is_green() {
        let config = actuator_config();
        let mut state = ClockState::cold();
        let hal = MockHal::with_reading(0.0, 0.0);
        let mut source = FakeTimeSource::answering(TimeOfDay::new(14, 30, 0));
        let (mut actuator_end, mut peer) = memory::pair(config.mesh.tick());

        peer.broadcast(r#"{"node":1,"temp":29.0,"hum":40.0}"#).await.unwrap();
        let outcome = ActuatorRole::new(&config, &mut state, &hal, &mut actuator_end, &mut source)
            .run()
            .await;

        assert!(matches!(outcome, CycleOutcome::Decided(Decision { color: Color::Green, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignores_decisions_while_listening() {
        let config = actuator_config();
        let mut state = ClockState::cold();
        let hal = MockHal::with_reading(0.0, 0.0);
        let mut source = FakeTimeSource::answering(TimeOfDay::new(14, 30, 0));
        let (mut actuator_end, mut peer) = memory::pair(config.mesh.tick());

        peer.broadcast(r#"{"node":3,"color":"Green","hour":"14","min":"29","sec":"59"}"#)
            .await
            .unwrap();
        peer.broadcast(r#"{"node":1,"temp":35.0,"hum":20.0}"#).await.unwrap();
        let outcome = ActuatorRole::new(&config, &mut state, &hal, &mut actuator_end, &mut source)
            .run()
            .await;

        assert!(matches!(outcome, CycleOutcome::Decided(Decision { color: Color::Red, .. })));
        assert_eq!(actuator_end.sent.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_reading_degrades_to_green() {
        let config = actuator_config();
        let mut state = ClockState::cold();
        let hal = MockHal::with_reading(0.0, 0.0);
        let mut source = FakeTimeSource::answering(TimeOfDay::new(14, 30, 0));
        let (mut actuator_end, mut peer) = memory::pair(config.mesh.tick());

        peer.broadcast("{not json").await.unwrap();
        let outcome = ActuatorRole::new(&config, &mut state, &hal, &mut actuator_end, &mut source)
            .run()
            .await;

        assert!(matches!(outcome, CycleOutcome::Decided(Decision { color: Color::Green, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_listen_window_closes_without_reading() {
        let config = actuator_config();
        let mut state = ClockState::cold();
        state.set_time(TimeOfDay::new(9, 15, 42));
        state.synchronized = true;
        let hal = MockHal::with_reading(0.0, 0.0);
        let mut source = FakeTimeSource::unreachable();
        let (mut actuator_end, _silent_peer) = memory::pair(config.mesh.tick());

        let started = Instant::now();
        let outcome = ActuatorRole::new(&config, &mut state, &hal, &mut actuator_end, &mut source)
            .run()
            .await;

        assert_eq!(outcome, CycleOutcome::NothingHeard);
        assert!(started.elapsed() >= config.duty_cycle.listen_timeout());
        assert!(actuator_end.sent.is_empty());
        assert_eq!(hal.indicator(), None);
        assert_eq!(source.calls, 0);
        assert!(state.synchronized);
    }
}
