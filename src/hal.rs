//! ==============================================================================
//! hal.rs - Hardware Abstraction Layer
//! ==============================================================================
//!
//! purpose:
//!     the two hardware collaborators a node talks to: the DHT22
//!     temperature/humidity sensor and the RGB indicator.
//!     abstracts away the difference between running on a real Raspberry Pi
//!     (using `rppal`) and a development machine (using mocks).
//!
//! design philosophy:
//!     - "Compile Anywhere": the node builds and runs on any machine.
//!     - "Narrow": one read, one write. calibration and retries live elsewhere
//!       (or nowhere; a failed read is surfaced, not hidden).
//!
//! relationships:
//!     - used by: sensor_role.rs (read_dht22), actuator_role.rs (set_indicator)
//!     - uses: rppal (on feature="hardware")
//!     - uses: std::process::Command (python DHT22 driver, on feature="hardware")
//!
//! ==============================================================================

use anyhow::Result;

pub trait HardwareProvider {
    /// (temperature °C, relative humidity %)
    fn read_dht22(&self, pin: u8) -> Result<(f32, f32)>;
    /// drive the r, g, b channel pins to the given levels
    fn set_indicator(&self, pins: [u8; 3], levels: [u8; 3]) -> Result<()>;
}

#[cfg(not(feature = "hardware"))]
pub type Hal = MockHal;

#[cfg(feature = "hardware")]
pub type Hal = PiHal;

// ==============================================================================================
// MOCK IMPLEMENTATION (For Non-Hardware Build and Tests)
// ==============================================================================================
#[cfg(any(test, not(feature = "hardware")))]
pub struct MockHal {
    reading: Option<(f32, f32)>,
    indicator: std::sync::Mutex<Option<[u8; 3]>>,
}

#[cfg(any(test, not(feature = "hardware")))]
impl MockHal {
    pub fn new() -> Self {
        tracing::info!("Using MOCK HAL (No hardware access)");
        Self::with_reading(25.0, 50.0)
    }

    pub fn with_reading(temperature: f32, humidity: f32) -> Self {
        Self {
            reading: Some((temperature, humidity)),
            indicator: std::sync::Mutex::new(None),
        }
    }

    /// a sensor that never answers
    #[cfg(test)]
    pub fn failing() -> Self {
        Self { reading: None, indicator: std::sync::Mutex::new(None) }
    }

    /// last levels written to the indicator
    #[cfg(test)]
    pub fn indicator(&self) -> Option<[u8; 3]> {
        self.indicator.lock().ok().and_then(|g| *g)
    }
}

#[cfg(any(test, not(feature = "hardware")))]
impl HardwareProvider for MockHal {
    fn read_dht22(&self, pin: u8) -> Result<(f32, f32)> {
        tracing::debug!("[MOCK DHT22] Reading pin {}", pin);
        self.reading.ok_or_else(|| anyhow::anyhow!("DHT22 read failed"))
    }

    fn set_indicator(&self, pins: [u8; 3], levels: [u8; 3]) -> Result<()> {
        tracing::debug!("[MOCK LED] Pins {:?} set to RGB{:?}", pins, levels);
        let mut guard = self
            .indicator
            .lock()
            .map_err(|_| anyhow::anyhow!("indicator state poisoned"))?;
        *guard = Some(levels);
        Ok(())
    }
}

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================================
#[cfg(feature = "hardware")]
pub struct PiHal {
    // output pins stay owned here so software pwm keeps running
    outputs: std::sync::Mutex<Vec<rppal::gpio::OutputPin>>,
}

#[cfg(feature = "hardware")]
impl PiHal {
    pub fn new() -> Self {
        tracing::info!("Using REAL HARDWARE HAL (rppal)");
        Self { outputs: std::sync::Mutex::new(Vec::new()) }
    }
}

#[cfg(feature = "hardware")]
impl HardwareProvider for PiHal {
    fn read_dht22(&self, pin: u8) -> Result<(f32, f32)> {
        // NOTE: DHT22 bit-banging needs microsecond timing; the adafruit driver
        // handles it, so we shell out to it rather than toggling pins here.
        use std::process::Command;
        let script = format!(
            r#"
import adafruit_dht, board, json, sys
try:
    dht = adafruit_dht.DHT22(board.D{})
    print(json.dumps({{"t": dht.temperature, "h": dht.humidity}}))
    dht.exit()
except Exception:
    print("null")
"#,
            pin
        );
        let output = Command::new("python3").args(["-c", &script]).output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim() == "null" || stdout.trim().is_empty() {
            anyhow::bail!("DHT22 read failed");
        }
        let v: serde_json::Value = serde_json::from_str(&stdout)?;
        let t = v["t"].as_f64().ok_or_else(|| anyhow::anyhow!("Missing temp"))?;
        let h = v["h"].as_f64().ok_or_else(|| anyhow::anyhow!("Missing humidity"))?;
        Ok((t as f32, h as f32))
    }

    fn set_indicator(&self, pins: [u8; 3], levels: [u8; 3]) -> Result<()> {
        use rppal::gpio::Gpio;
        let gpio = Gpio::new()?;
        let mut outputs = self
            .outputs
            .lock()
            .map_err(|_| anyhow::anyhow!("indicator pins poisoned"))?;
        outputs.clear();

        for (pin, level) in pins.iter().zip(levels.iter()) {
            let mut p = gpio.get(*pin)?.into_output();
            // keep the color after this process goes to sleep
            p.set_reset_on_drop(false);
            match *level {
                0 => p.set_low(),
                255 => p.set_high(),
                l => p.set_pwm_frequency(100.0, f64::from(l) / 255.0)?,
            }
            outputs.push(p);
        }
        Ok(())
    }
}
