//! ==============================================================================
//! config.rs - Node Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `node.toml`.
//!     loads configuration from file or falls back to defaults.
//!     both roles read the same structure, so thresholds, durations and
//!     credentials live in exactly one place.
//!
//! structure:
//!     - NodeSection: which role this node plays and its wire identity.
//!     - NetworkConfig: credentials for the network used by time sync. joining
//!       that network is left to the host's own connection manager; the node
//!       only reports which one it expects when a sync is due.
//!     - TimeConfig: SNTP server, port and local offsets.
//!     - MeshConfig: mesh identifier, credential, port and broadcast timing.
//!     - DutyCycleConfig: per-role sleep durations and wait bounds.
//!     - DecisionConfig: the red/green threshold.
//!     - IndicatorConfig: color -> output levels, and output pins.
//!     - SensorsConfig: DHT22 pin.
//!     - RetainedConfig: where the clock region is kept between cycles.
//!
//! ==============================================================================

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::domain::Color;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub time: TimeConfig,
    #[serde(default)]
    pub mesh: MeshConfig,
    #[serde(default)]
    pub duty_cycle: DutyCycleConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub indicator: IndicatorConfig,
    #[serde(default)]
    pub sensors: SensorsConfig,
    #[serde(default)]
    pub retained: RetainedConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    #[default]
    Sensor,
    Actuator,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Sensor => f.write_str("sensor"),
            NodeRole::Actuator => f.write_str("actuator"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NodeSection {
    pub role: NodeRole,
    pub node_id: u32,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self { role: NodeRole::Sensor, node_id: 1 }
    }
}

/// handed to the external connection bootstrap, never used to connect here
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct NetworkConfig {
    pub ssid: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimeConfig {
    pub server: String,
    pub port: u16,
    pub gmt_offset_secs: i64,
    pub dst_offset_secs: i64,
    pub timeout_ms: u64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            server: "pool.ntp.org".to_string(),
            port: 123,
            gmt_offset_secs: 0,
            dst_offset_secs: 0,
            timeout_ms: 5000,
        }
    }
}

impl TimeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MeshConfig {
    pub prefix: String,
    pub password: String,
    pub port: u16,
    pub broadcast_addr: String,
    /// period of the recurring broadcast task
    pub broadcast_interval_ms: u64,
    /// how long one transport service step waits for a frame
    pub tick_ms: u64,
    pub mailbox_capacity: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            prefix: "dutymesh".to_string(),
            password: "dutymesh-pass".to_string(),
            port: 5555,
            broadcast_addr: "255.255.255.255".to_string(),
            broadcast_interval_ms: 1000,
            tick_ms: 50,
            mailbox_capacity: 4,
        }
    }
}

impl MeshConfig {
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DutyCycleConfig {
    pub sensor_sleep_us: u64,
    /// kept longer than the sensor's so the actuator wakes after the
    /// sensor's next transmission window opens
    pub actuator_sleep_us: u64,
    pub ack_timeout_ms: u64,
    pub listen_timeout_ms: u64,
    /// re-execute the binary on wake; false exits and leaves restarts to a supervisor
    pub reexec: bool,
}

impl Default for DutyCycleConfig {
    fn default() -> Self {
        Self {
            sensor_sleep_us: 5_000_000,
            actuator_sleep_us: 5_100_000,
            ack_timeout_ms: 4000,
            listen_timeout_ms: 30_000,
            reexec: true,
        }
    }
}

impl DutyCycleConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_millis(self.listen_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DecisionConfig {
    pub threshold_c: f32,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self { threshold_c: 29.0 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndicatorConfig {
    pub red: [u8; 3],
    pub green: [u8; 3],
    /// gpio pins for the r, g and b channels
    pub pins: [u8; 3],
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            red: [255, 0, 0],
            green: [0, 255, 0],
            pins: [17, 27, 22],
        }
    }
}

impl IndicatorConfig {
    /// output levels for a color
    pub fn levels(&self, color: Color) -> [u8; 3] {
        match color {
            Color::Red => self.red,
            Color::Green => self.green,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SensorsConfig {
    #[serde(default)]
    pub dht22: Dht22Config,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Dht22Config {
    pub gpio_pin: u8,
}

impl Default for Dht22Config {
    fn default() -> Self {
        Self { gpio_pin: 4 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetainedConfig {
    pub path: String,
}

impl Default for RetainedConfig {
    fn default() -> Self {
        // tmpfs: survives a process restart, not a power loss
        Self { path: "/dev/shm/duty-node.json".to_string() }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

impl NodeConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: NodeConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        Ok(config)
    }

    /// Load with default fallback
    ///
    /// `DUTY_NODE_CONFIG` wins over the conventional locations.
    pub fn load_or_default() -> Self {
        let mut paths = Vec::new();
        if let Ok(explicit) = std::env::var("DUTY_NODE_CONFIG") {
            paths.push(std::path::PathBuf::from(explicit));
        }
        paths.push(std::path::PathBuf::from("config").join("node.toml"));
        paths.push(std::path::PathBuf::from("..").join("config").join("node.toml"));

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    /// sleep duration for this node's role
    pub fn sleep_duration(&self) -> Duration {
        match self.node.role {
            NodeRole::Sensor => Duration::from_micros(self.duty_cycle.sensor_sleep_us),
            NodeRole::Actuator => Duration::from_micros(self.duty_cycle.actuator_sleep_us),
        }
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│           NODE CONFIGURATION            │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Role: {}", self.node.role);
        println!("│ Node ID: {}", self.node.node_id);
        println!(
            "│ Network: {} ({})",
            self.network.ssid,
            if self.network.password.is_empty() { "open" } else { "secured" }
        );
        println!("│ Mesh: {} (port {})", self.mesh.prefix, self.mesh.port);
        println!("│ Time Server: {}:{}", self.time.server, self.time.port);
        println!("│ Sleep: {:?}", self.sleep_duration());
        println!("│ Threshold: {:.1}°C", self.decision.threshold_c);
        println!("│ Log Level: {}", self.logging.level);
        println!("├─────────────────────────────────────────┤");
    }
}
