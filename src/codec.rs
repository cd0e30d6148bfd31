//! ==============================================================================
//! codec.rs - wire codec for readings and decisions
//! ==============================================================================
//!
//! purpose:
//!     turns a Reading or Decision into the compact json text that travels
//!     over the mesh, and back.
//!
//! wire format:
//!     reading:  {"node":1,"temp":25.0,"hum":40.0,"hour":"14","min":"30","sec":"00"}
//!     decision: {"node":2,"color":"Green","hour":"14","min":"30","sec":"00"}
//!
//! decoding is permissive: only key presence matters. a missing key reads as
//! the zero value of its type and malformed text decodes to an all-default
//! value. nothing in here fails; dropped or mangled messages are tolerated by
//! the callers, not detected.
//!
//! a failed sensor read (NaN) is written as json `null` and read back as NaN.
//!
//! ==============================================================================

use crate::domain::{parse_field, Color, Decision, Reading, TimeOfDay};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
struct ReadingWire<'a> {
    node: u32,
    temp: f32,
    hum: f32,
    hour: &'a str,
    min: &'a str,
    sec: &'a str,
}

#[derive(Serialize)]
struct DecisionWire<'a> {
    node: u32,
    color: &'a str,
    hour: &'a str,
    min: &'a str,
    sec: &'a str,
}

pub fn encode_reading(reading: &Reading) -> String {
    let (hour, min, sec) = reading.stamp.fields();
    let wire = ReadingWire {
        node: reading.node_id,
        temp: reading.temperature,
        hum: reading.humidity,
        hour: &hour,
        min: &min,
        sec: &sec,
    };
    // a struct of plain numbers and strings cannot fail to serialize
    serde_json::to_string(&wire).unwrap_or_default()
}

pub fn encode_decision(decision: &Decision) -> String {
    let (hour, min, sec) = decision.stamp.fields();
    let wire = DecisionWire {
        node: decision.node_id,
        color: decision.color.as_str(),
        hour: &hour,
        min: &min,
        sec: &sec,
    };
    serde_json::to_string(&wire).unwrap_or_default()
}

pub fn decode_reading(text: &str) -> Reading {
    let v = parse(text);
    Reading {
        node_id: node_field(&v),
        temperature: float_field(&v, "temp"),
        humidity: float_field(&v, "hum"),
        stamp: stamp_fields(&v),
    }
}

pub fn decode_decision(text: &str) -> Decision {
    let v = parse(text);
    Decision {
        node_id: node_field(&v),
        color: Color::from_name(v.get("color").and_then(Value::as_str).unwrap_or("")),
        stamp: stamp_fields(&v),
    }
}

/// true when the message carries a `color` key, i.e. came from an actuator
pub fn is_decision(text: &str) -> bool {
    parse(text).get("color").is_some()
}

// ==============================================================================
// field helpers
// ==============================================================================

fn parse(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or(Value::Null)
}

fn node_field(v: &Value) -> u32 {
    v.get("node")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

fn float_field(v: &Value, key: &str) -> f32 {
    match v.get(key) {
        None => 0.0,
        Some(Value::Null) => f32::NAN,
        Some(n) => n.as_f64().map(|x| x as f32).unwrap_or(0.0),
    }
}

fn time_field(v: &Value, key: &str) -> u8 {
    match v.get(key) {
        Some(Value::String(s)) => parse_field(s),
        Some(n) => n
            .as_u64()
            .and_then(|x| u8::try_from(x).ok())
            .unwrap_or(0),
        None => 0,
    }
}

fn stamp_fields(v: &Value) -> TimeOfDay {
    TimeOfDay::new(time_field(v, "hour"), time_field(v, "min"), time_field(v, "sec"))
}
