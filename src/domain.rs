//! ==============================================================================
//! domain.rs - data model shared by both node roles
//! ==============================================================================
//!
//! purpose:
//!     the values that flow between the sensor and the actuator, plus the
//!     clock region that survives a sleep cycle.
//!
//! relationships:
//!     - encoded by: codec.rs (wire text)
//!     - persisted by: retained.rs (ClockState only)
//!     - mutated by: clock.rs (ClockState only)
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// wall-clock time of day, rendered as zero-padded two-digit fields
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl TimeOfDay {
    pub const fn new(hour: u8, minute: u8, second: u8) -> Self {
        Self { hour, minute, second }
    }

    /// the three fields as the "HH", "MM", "SS" strings used on the wire
    pub fn fields(&self) -> (String, String, String) {
        (
            format!("{:02}", self.hour),
            format!("{:02}", self.minute),
            format!("{:02}", self.second),
        )
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// clock region kept across low-power sleep, wiped on power loss
///
/// `synchronized == false` forces a network time fetch on the next boot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockState {
    pub hour: String,
    pub min: String,
    pub sec: String,
    pub synchronized: bool,
}

impl ClockState {
    /// state after a cold boot: all-zero time, not synchronized
    pub fn cold() -> Self {
        Self {
            hour: "00".to_string(),
            min: "00".to_string(),
            sec: "00".to_string(),
            synchronized: false,
        }
    }

    pub fn time(&self) -> TimeOfDay {
        TimeOfDay {
            hour: parse_field(&self.hour),
            minute: parse_field(&self.min),
            second: parse_field(&self.sec),
        }
    }

    pub fn set_time(&mut self, time: TimeOfDay) {
        let (hour, min, sec) = time.fields();
        self.hour = hour;
        self.min = min;
        self.sec = sec;
    }
}

/// lenient two-digit field parse; anything unparseable reads as zero
pub fn parse_field(field: &str) -> u8 {
    field.trim().parse().unwrap_or(0)
}

/// one sensor sample, stamped with the persisted time
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub node_id: u32,
    /// degrees celsius, NaN when the sensor read failed
    pub temperature: f32,
    /// relative humidity (0-100%), NaN when the sensor read failed
    pub humidity: f32,
    pub stamp: TimeOfDay,
}

/// indicator state derived from a reading
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
}

impl Color {
    pub fn as_str(&self) -> &'static str {
        match self {
            Color::Red => "Red",
            Color::Green => "Green",
        }
    }

    /// unknown names fall back to green, the below-threshold state
    pub fn from_name(name: &str) -> Self {
        match name {
            "Red" => Color::Red,
            _ => Color::Green,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// the actuator's answer to one reading
#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    pub node_id: u32,
    pub color: Color,
    pub stamp: TimeOfDay,
}

/// threshold rule: strictly above the threshold is red
///
/// the boundary itself and NaN readings resolve to green.
pub fn decide(temperature: f32, threshold_c: f32) -> Color {
    if temperature > threshold_c {
        Color::Red
    } else {
        Color::Green
    }
}

/// what a single wake cycle produced before going back to sleep
#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    /// reading sent and a peer answered
    Acknowledged(Reading),
    /// reading sent, no peer answered before the ack window closed
    Unacknowledged(Reading),
    /// decision derived, indicator driven and decision sent
    Decided(Decision),
    /// no reading arrived before the listen window closed
    NothingHeard,
}
