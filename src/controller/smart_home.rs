//! Hysteresis controller for one smart-home device
//!
//! Keeps an occupancy estimate from motion and noise triggers and drives the
//! heater and fan PWM outputs from the temperature reading, interpolating
//! across the selected hysteresis band.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::debug;

use super::{Command, DeviceController, SensorEvent, Setpoints, units};

/// Full PWM drive for the heater and fan outputs
pub const MAX_DRIVE: f64 = 255.0;

/// How long a motion trigger keeps the room occupied
pub const MOTION_HOLD: Duration = Duration::from_secs(30 * 60);

/// How long a noise trigger keeps the room occupied
pub const NOISE_HOLD: Duration = Duration::from_secs(60 * 60);

/// Noise triggers closer together than this coalesce into one latch
pub const NOISE_COALESCE_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Minimum spacing between accepted temperature readings
pub const READING_MIN_INTERVAL: Duration = Duration::from_secs(30);

/// Band used while the room counts as occupied
pub const OCCUPIED_DEFAULT: Setpoints = Setpoints {
    cool_lo: 22.0,
    cool_hi: 25.0,
    heat_lo: 16.0,
    heat_hi: 20.0,
};

/// Band used while the room counts as vacant
pub const VACANT_DEFAULT: Setpoints = Setpoints {
    cool_lo: 24.0,
    cool_hi: 28.0,
    heat_lo: 14.0,
    heat_hi: 18.0,
};

/// Hysteresis controller over one device's actuator topics
pub struct SmartHomeController {
    heater_topics: Vec<String>,
    fan_topics: Vec<String>,
    display_topics: Vec<String>,
    occupied: Setpoints,
    vacant: Setpoints,
    last_reading: Option<Instant>,
    motion_latch: Option<Instant>,
    noise_latch: Option<Instant>,
    noise_history: VecDeque<Instant>,
    greeted: bool,
}

impl SmartHomeController {
    /// Create a controller driving the given actuator topics
    #[must_use]
    pub fn new(
        heater_topics: Vec<String>,
        fan_topics: Vec<String>,
        display_topics: Vec<String>,
    ) -> Self {
        Self {
            heater_topics,
            fan_topics,
            display_topics,
            occupied: OCCUPIED_DEFAULT,
            vacant: VACANT_DEFAULT,
            last_reading: None,
            motion_latch: None,
            noise_latch: None,
            noise_history: VecDeque::new(),
            greeted: false,
        }
    }

    /// Latches are checked lazily, on the next event after they expire
    fn expire_latches(&mut self, now: Instant) {
        if self
            .motion_latch
            .is_some_and(|since| now.duration_since(since) >= MOTION_HOLD)
        {
            self.motion_latch = None;
        }
        if self
            .noise_latch
            .is_some_and(|since| now.duration_since(since) >= NOISE_HOLD)
        {
            self.noise_latch = None;
        }
    }

    fn occupied_now(&self) -> bool {
        self.motion_latch.is_some() || self.noise_latch.is_some()
    }

    /// Noise triggers inside the trailing window share one latch; a trigger
    /// past the window starts a fresh one
    fn note_noise(&mut self, now: Instant) {
        while self
            .noise_history
            .front()
            .is_some_and(|t| now.duration_since(*t) >= NOISE_COALESCE_WINDOW)
        {
            self.noise_history.pop_front();
        }
        if self.noise_history.is_empty() {
            self.noise_latch = Some(now);
        }
        self.noise_history.push_back(now);
    }

    /// Heater drive: max at or below `heat_lo`, off at or above `heat_hi`,
    /// linearly decreasing across the band
    fn heater_drive(&self, band: &Setpoints, celsius: f64) -> i64 {
        if celsius <= band.heat_lo {
            MAX_DRIVE as i64
        } else if celsius >= band.heat_hi {
            0
        } else {
            (MAX_DRIVE - (celsius - band.heat_lo) / (band.heat_hi - band.heat_lo) * MAX_DRIVE)
                as i64
        }
    }

    /// Fan drive: off at or below `cool_lo`, max at or above `cool_hi`,
    /// linearly increasing across the band
    fn fan_drive(&self, band: &Setpoints, celsius: f64) -> i64 {
        if celsius <= band.cool_lo {
            0
        } else if celsius >= band.cool_hi {
            MAX_DRIVE as i64
        } else {
            ((celsius - band.cool_lo) / (band.cool_hi - band.cool_lo) * MAX_DRIVE) as i64
        }
    }

    fn on_reading(&mut self, value: f64, unit: &str, now: Instant) -> Vec<Command> {
        if self
            .last_reading
            .is_some_and(|last| now.duration_since(last) < READING_MIN_INTERVAL)
        {
            return Vec::new();
        }
        let Some(celsius) = units::to_celsius(value, unit) else {
            debug!(unit, "reading with unrecognized unit dropped");
            return Vec::new();
        };
        self.last_reading = Some(now);

        let band = if self.occupied_now() {
            self.occupied
        } else {
            self.vacant
        };

        let mut commands = Vec::new();
        for topic in &self.display_topics {
            commands.push(Command::device(
                topic,
                json!({"n": "lcd", "v": format!("Smart Home {value} {unit}"), "u": null}),
            ));
        }
        let heater = self.heater_drive(&band, celsius);
        for topic in &self.heater_topics {
            commands.push(Command::device(
                topic,
                json!({"n": "led", "v": heater, "u": null}),
            ));
        }
        let fan = self.fan_drive(&band, celsius);
        for topic in &self.fan_topics {
            commands.push(Command::device(
                topic,
                json!({"n": "FAN", "v": fan, "u": null}),
            ));
        }
        commands
    }
}

impl DeviceController for SmartHomeController {
    fn handle(&mut self, event: &SensorEvent, now: Instant) -> Vec<Command> {
        let mut commands = Vec::new();
        if !self.greeted {
            self.greeted = true;
            for topic in &self.display_topics {
                commands.push(Command::device(
                    topic,
                    json!({"n": "lcd", "v": "Smart Home Welcome", "u": null}),
                ));
            }
        }

        self.expire_latches(now);

        match event {
            SensorEvent::Temperature { value, unit } => {
                commands.extend(self.on_reading(*value, unit, now));
            }
            SensorEvent::Motion => self.motion_latch = Some(now),
            SensorEvent::Noise => self.note_noise(now),
            SensorEvent::OccupiedBand(band) => self.occupied = *band,
            SensorEvent::VacantBand(band) => self.vacant = *band,
        }
        commands
    }
}
