//! ==============================================================================
//! sensor_role.rs - sensor node state machine
//! ==============================================================================
//!
//! purpose:
//!     one wake cycle of the sensing node: get a usable time, take one
//!     sample, broadcast it, wait for any peer to answer, go to sleep.
//!
//! states:
//!
//!     Booting ──> Sampling ──> Broadcasting ──> AwaitingAck ──> Sleeping
//!                                                  │  ▲
//!                                                  └──┘ rebroadcast every interval
//!
//!     - AwaitingAck ends on the first peer message, whatever it says, or
//!       when the ack window closes.
//!     - Sleeping is terminal; the caller hands control to the duty cycle.
//!
//! relationships:
//!     - uses: clock.rs, hal.rs, codec.rs, mesh.rs, scheduler.rs
//!     - used by: runtime.rs
//!
//! ==============================================================================

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::PersistentClock;
use crate::codec::{decode_decision, encode_reading, is_decision};
use crate::config::NodeConfig;
use crate::domain::{ClockState, CycleOutcome, Reading};
use crate::hal::HardwareProvider;
use crate::mesh::{Mailbox, MeshTransport};
use crate::scheduler::RecurringTask;
use crate::sntp::NetworkTimeSource;

#[derive(Clone, Debug, PartialEq)]
pub enum SensorState {
    Booting,
    Sampling,
    Broadcasting(Reading),
    AwaitingAck { reading: Reading, payload: String },
    Sleeping(CycleOutcome),
}

pub struct SensorRole<'a, H, T, N> {
    config: &'a NodeConfig,
    clock: PersistentClock<'a>,
    hal: &'a H,
    transport: &'a mut T,
    time_source: &'a mut N,
    inbox: Mailbox,
    task: RecurringTask,
}

impl<'a, H, T, N> SensorRole<'a, H, T, N>
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

    /// drive the machine from Booting to Sleeping
    pub async fn run(mut self) -> CycleOutcome {
        let mut state = SensorState::Booting;
        loop {
            state = match state {
                SensorState::Sleeping(outcome) => return outcome,
                other => self.step(other).await,
            };
        }
    }

    pub async fn step(&mut self, state: SensorState) -> SensorState {
        match state {
            SensorState::Booting => {
                let path = self.clock.boot(&mut *self.time_source, &self.config.time).await;
                debug!(?path, "sensor: booting -> sampling");
                SensorState::Sampling
            }
            SensorState::Sampling => {
                let reading = self.sample();
                debug!("sensor: sampling -> broadcasting");
                SensorState::Broadcasting(reading)
            }
            SensorState::Broadcasting(reading) => {
                let payload = encode_reading(&reading);
                self.send(&payload).await;
                self.task.enable_deferred();
                debug!("sensor: broadcasting -> awaiting ack");
                SensorState::AwaitingAck { reading, payload }
            }
            SensorState::AwaitingAck { reading, payload } => self.await_ack(reading, payload).await,
            SensorState::Sleeping(outcome) => SensorState::Sleeping(outcome),
        }
    }

    /// one sample, no retry; a failed read becomes NaN and is still sent
    fn sample(&self) -> Reading {
        let pin = self.config.sensors.dht22.gpio_pin;
        let (temperature, humidity) = match self.hal.read_dht22(pin) {
            Ok(values) => values,
            Err(e) => {
                warn!(error = %e, pin, "sensor read failed, sending NaN");
                (f32::NAN, f32::NAN)
            }
        };
        let reading = Reading {
            node_id: self.config.node.node_id,
            temperature,
            humidity,
            stamp: self.clock.current_time(),
        };
        if self.config.logging.show_sensor_data {
            info!("[DHT22] Temp: {:.1}°C | Humidity: {:.1}% @ {}", temperature, humidity, reading.stamp);
        }
        reading
    }

    async fn await_ack(&mut self, reading: Reading, payload: String) -> SensorState {
        let deadline = Instant::now() + self.config.duty_cycle.ack_timeout();
        loop {
            if let Err(e) = self.transport.service(&mut self.inbox).await {
                warn!(error = %e, "mesh service failed");
                tokio::time::sleep(self.config.mesh.tick()).await;
            }

            // any answer at all is the signal; its content is not checked
            if let Some(msg) = self.inbox.take() {
                if is_decision(&msg) {
                    let decision = decode_decision(&msg);
                    info!(from = decision.node_id, color = %decision.color, stamp = %decision.stamp, "peer decided");
                }
                debug!(%msg, "sensor: peer answered");
                self.task.disable();
                return self.sleep(CycleOutcome::Acknowledged(reading));
            }

            let now = Instant::now();
            if now >= deadline {
                self.task.disable();
                warn!(timeout = ?self.config.duty_cycle.ack_timeout(), "no peer answered");
                return self.sleep(CycleOutcome::Unacknowledged(reading));
            }

            if self.task.poll(now) {
                self.send(&payload).await;
            }
        }
    }

    async fn send(&mut self, payload: &str) {
        match self.transport.broadcast(payload).await {
            Ok(()) => debug!(%payload, "sensor: broadcast"),
            Err(e) => warn!(error = %e, "broadcast failed"),
        }
    }

    fn sleep(&mut self, outcome: CycleOutcome) -> SensorState {
        self.clock.carry_forward();
        debug!("sensor: -> sleeping");
        SensorState::Sleeping(outcome)
    }
}
