//! Device controllers: sensor events in, actuator commands out
//!
//! Controllers are synchronous state machines. The reconciliation engine
//! feeds them parsed events with the current instant and publishes whatever
//! commands come back; no controller ever touches a connection itself.

pub mod smart_home;
pub mod units;

pub use smart_home::SmartHomeController;

use std::time::Instant;

use serde::Deserialize;

/// Hysteresis band, `[cool_lo, cool_hi, heat_lo, heat_hi]` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "[f64; 4]")]
pub struct Setpoints {
    pub cool_lo: f64,
    pub cool_hi: f64,
    pub heat_lo: f64,
    pub heat_hi: f64,
}

impl From<[f64; 4]> for Setpoints {
    fn from(raw: [f64; 4]) -> Self {
        Self {
            cool_lo: raw[0],
            cool_hi: raw[1],
            heat_lo: raw[2],
            heat_hi: raw[3],
        }
    }
}

/// A parsed sensor event
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    /// A temperature reading with its unit
    Temperature { value: f64, unit: String },
    /// Motion detected
    Motion,
    /// Noise detected
    Noise,
    /// Override of the occupied hysteresis band
    OccupiedBand(Setpoints),
    /// Override of the vacant hysteresis band
    VacantBand(Setpoints),
}

impl SensorEvent {
    /// Parse a `{"n", "v", "u"}` record; `None` for records the controllers
    /// do not react to (unknown names, un-asserted triggers, malformed JSON)
    #[must_use]
    pub fn parse(payload: &[u8]) -> Option<Self> {
        #[derive(Deserialize)]
        struct Raw {
            n: String,
            #[serde(default)]
            v: serde_json::Value,
            #[serde(default)]
            u: Option<String>,
        }

        let raw: Raw = serde_json::from_slice(payload).ok()?;
        match raw.n.as_str() {
            "temperature" => Some(Self::Temperature {
                value: raw.v.as_f64()?,
                unit: raw.u.unwrap_or_else(|| "C".to_string()),
            }),
            "PIR" if raw.v == 1 => Some(Self::Motion),
            "noise" if raw.v == 1 => Some(Self::Noise),
            "sp1" => serde_json::from_value(raw.v).ok().map(Self::OccupiedBand),
            "sp0" => serde_json::from_value(raw.v).ok().map(Self::VacantBand),
            _ => None,
        }
    }
}

/// Where a command is published
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// On the broker connection that owns the originating device
    Device,
    /// On the home broker connection
    Home,
}

/// One actuator command or service output
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub route: Route,
    pub topic: String,
    pub body: serde_json::Value,
}

impl Command {
    /// A device-routed command
    #[must_use]
    pub fn device(topic: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            route: Route::Device,
            topic: topic.into(),
            body,
        }
    }

    /// A home-routed service output
    #[must_use]
    pub fn home(topic: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            route: Route::Home,
            topic: topic.into(),
            body,
        }
    }
}

/// A per-device control state machine
pub trait DeviceController: Send + 'static {
    /// React to one event, producing the commands to publish
    fn handle(&mut self, event: &SensorEvent, now: Instant) -> Vec<Command>;
}
