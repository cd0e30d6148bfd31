//! ==============================================================================
//! main.rs - duty-cycled node entry point
//! ==============================================================================
//!
//! purpose:
//!     one process instance is one wake cycle. it boots, restores the
//!     retained clock, runs the role's state machine to Sleeping, arms the
//!     wake timer and powers down. the next cycle is a fresh process.
//!
//! relationships:
//!     - uses: config.rs (node.toml), retained.rs (clock region)
//!     - uses: runtime.rs (role dispatch), duty_cycle.rs (power-down)
//!     - uses: hal.rs, mesh.rs, sntp.rs (concrete collaborators)
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────────┐
//!     │                      node (this process)                     │
//!     │                                                              │
//!     │  retained ──> PersistentClock ──> role FSM ──> DutyCycle     │
//!     │  region         (sync|reuse)      │      ▲      (sleep)      │
//!     │     ▲                             ▼      │         │         │
//!     │     │                         ┌────────────┐       │         │
//!     │     │                         │ mesh (udp) │       │         │
//!     │     │                         └────────────┘       │         │
//!     │     └──────────────── commit before sleep ─────────┘         │
//!     └──────────────────────────────────────────────────────────────┘
//!
//!     sensor:   sample ──> broadcast reading ──> wait for any answer
//!     actuator: wait for reading ──> color ──> indicator ──> broadcast decision
//!
//! ==============================================================================

mod actuator_role;
mod clock;
mod codec;
mod config;
mod domain;
mod duty_cycle;
mod hal;
mod mesh;
mod retained;
mod runtime;
mod scheduler;
mod sensor_role;
mod sntp;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::NodeConfig;
use crate::duty_cycle::DutyCycleController;
use crate::mesh::UdpMeshTransport;
use crate::retained::{FileRetainedStore, RetainedStore};
use crate::runtime::NodeRuntime;
use crate::sntp::SntpClient;

// ==============================================================================
// main entry point
// ==============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // startup banner
    println!("===========================================================");
    println!("  Duty-Cycled Sensor/Actuator Node");
    println!("  \"Sync Once, Sleep Often\"");
    println!("===========================================================");

    // step 1: load configuration
    let config = NodeConfig::load_or_default();
    config.print_summary();
    init_tracing(&config.logging.level);

    // step 2: restore the retained clock region
    let store = FileRetainedStore::new(&config.retained.path);
    let mut clock = store.load_or_cold();
    if !clock.synchronized {
        info!(ssid = %config.network.ssid, "time sync needed this cycle");
    }

    // step 3: join the mesh and run one cycle
    match UdpMeshTransport::bind(&config.mesh).await {
        Ok(transport) => {
            let mut runtime = NodeRuntime::new(
                config.clone(),
                hal::Hal::new(),
                transport,
                SntpClient::new(),
            );
            runtime.run_cycle(&mut clock).await;
        }
        Err(e) => {
            // no mesh this cycle: keep the region as it was and try again after sleep
            error!(error = %format!("{:#}", e), "mesh unavailable, skipping cycle");
        }
    }

    // step 4: power down; never returns
    let mut duty = DutyCycleController::new(&config.duty_cycle);
    if let Err(e) = duty.arm_wake_timer(config.sleep_duration()) {
        error!(error = %e, "wake timer not armed");
    }
    duty.enter_low_power(&store, &clock)
}

fn init_tracing(level: &str) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
