//! ==============================================================================
//! runtime.rs - one node, one wake cycle
//! ==============================================================================
//!
//! purpose:
//!     owns the collaborators a node needs for a cycle (hardware, mesh
//!     transport, network time) and runs the state machine that matches the
//!     configured role against the retained clock.
//!
//! relationships:
//!     - used by: main.rs (creates runtime, calls run_cycle once per wake)
//!     - uses: sensor_role.rs, actuator_role.rs
//!
//! ==============================================================================

use tracing::info;

use crate::actuator_role::ActuatorRole;
use crate::config::{NodeConfig, NodeRole};
use crate::domain::{ClockState, CycleOutcome};
use crate::hal::HardwareProvider;
use crate::mesh::MeshTransport;
use crate::sensor_role::SensorRole;
use crate::sntp::NetworkTimeSource;

pub struct NodeRuntime<H, T, N> {
    config: NodeConfig,
    hal: H,
    transport: T,
    time_source: N,
}

impl<H, T, N> NodeRuntime<H, T, N>
where
    H: HardwareProvider,
    T: MeshTransport,
    N: NetworkTimeSource,
{
    pub fn new(config: NodeConfig, hal: H, transport: T, time_source: N) -> Self {
        Self { config, hal, transport, time_source }
    }

    /// run the role's machine from Booting to Sleeping. `clock` is the
    /// retained region and holds the carried-forward time afterwards.
    pub async fn run_cycle(&mut self, clock: &mut ClockState) -> CycleOutcome {
        info!(role = %self.config.node.role, node = self.config.node.node_id, "cycle start");

        let outcome = match self.config.node.role {
            NodeRole::Sensor => {
                SensorRole::new(
                    &self.config,
                    clock,
                    &self.hal,
                    &mut self.transport,
                    &mut self.time_source,
                )
                .run()
                .await
            }
            NodeRole::Actuator => {
                ActuatorRole::new(
                    &self.config,
                    clock,
                    &self.hal,
                    &mut self.transport,
                    &mut self.time_source,
                )
                .run()
                .await
            }
        };

        self.report(&outcome);
        outcome
    }

    fn report(&self, outcome: &CycleOutcome) {
        let show = self.config.logging.show_sensor_data;
        match outcome {
            CycleOutcome::Acknowledged(r) if show => info!(
                temp = r.temperature,
                hum = r.humidity,
                stamp = %r.stamp,
                "cycle done: reading acknowledged"
            ),
            CycleOutcome::Unacknowledged(r) if show => info!(
                temp = r.temperature,
                hum = r.humidity,
                stamp = %r.stamp,
                "cycle done: reading unacknowledged"
            ),
            CycleOutcome::Acknowledged(_) => info!("cycle done: reading acknowledged"),
            CycleOutcome::Unacknowledged(_) => info!("cycle done: reading unacknowledged"),
            CycleOutcome::Decided(d) => {
                info!(color = %d.color, stamp = %d.stamp, "cycle done: decision sent")
            }
            CycleOutcome::NothingHeard => info!("cycle done: nothing heard"),
        }
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }
}
