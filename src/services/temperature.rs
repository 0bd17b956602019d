//! Temperature-mean service
//!
//! Subscribes the temperature topics of every qualifying device and
//! publishes the rounded mean of the readings collected over a fixed window.
//! All devices feed one accumulator, shared across controllers behind its
//! own lock so it never holds up reconciliation.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;

use crate::catalog::registration::ServiceRegistration;
use crate::controller::{Command, DeviceController, SensorEvent, units};
use crate::db::{Action, Device, MqttEndpoints, ServiceEndpoints};
use crate::engine::{CapabilityPredicate, DevicePlan, ServiceProfile};
use crate::transport::BrokerAddr;

/// Topic the mean is published on
pub const AVERAGE_TOPIC: &str = "hearth/temperature/average";

/// Window of readings that makes one published mean
pub const PUBLISH_WINDOW: Duration = Duration::from_secs(5 * 60);

/// A window stretched this far is stale; its readings are discarded
pub const STALE_WINDOW: Duration = Duration::from_secs(6 * 60);

#[derive(Default)]
struct MeanWindow {
    sum: f64,
    count: u32,
    opened: Option<Instant>,
}

/// Profile of the temperature-mean service
pub struct TemperatureProfile {
    marker: String,
    predicate: CapabilityPredicate,
    window: Arc<Mutex<MeanWindow>>,
}

impl TemperatureProfile {
    /// Create the profile for devices whose id carries `marker`
    #[must_use]
    pub fn new(marker: impl Into<String>) -> Self {
        let marker = marker.into();
        Self {
            predicate: CapabilityPredicate::new(marker.clone(), ["Temp"]),
            marker,
            window: Arc::new(Mutex::new(MeanWindow::default())),
        }
    }
}

impl ServiceProfile for TemperatureProfile {
    fn predicate(&self) -> &CapabilityPredicate {
        &self.predicate
    }

    fn plan(&self, device: &Device) -> Option<DevicePlan> {
        let mut plan = DevicePlan::from_mqtt(device)?;
        plan.topics = super::topics_named(device, Action::Subscribe, "temperature");
        (!plan.topics.is_empty()).then_some(plan)
    }

    fn controller(&self, _device: &Device) -> Box<dyn DeviceController> {
        Box::new(MeanController {
            window: self.window.clone(),
        })
    }

    fn registration(&self, home: &BrokerAddr) -> ServiceRegistration {
        ServiceRegistration {
            service_id: "temperature-mean".to_string(),
            description: format!("mean temperature over the {} devices", self.marker),
            end_points: ServiceEndpoints {
                mqtt: Some(MqttEndpoints {
                    broker: Some(home.clone()),
                    subscribe: Some(vec![AVERAGE_TOPIC.to_string()]),
                    publish: None,
                }),
                rest: None,
            },
        }
    }
}

/// Feeds readings into the shared window
struct MeanController {
    window: Arc<Mutex<MeanWindow>>,
}

impl DeviceController for MeanController {
    fn handle(&mut self, event: &SensorEvent, now: Instant) -> Vec<Command> {
        let SensorEvent::Temperature { value, unit } = event else {
            return Vec::new();
        };
        let Some(celsius) = units::to_celsius(*value, unit) else {
            return Vec::new();
        };
        let Ok(mut window) = self.window.lock() else {
            return Vec::new();
        };

        match window.opened {
            None => window.opened = Some(now),
            Some(opened) if now.duration_since(opened) >= STALE_WINDOW => {
                // Readings stopped coming for too long; start over.
                *window = MeanWindow {
                    opened: Some(now),
                    ..MeanWindow::default()
                };
            }
            Some(_) => {}
        }

        window.sum += celsius;
        window.count += 1;

        let opened = window.opened.unwrap_or(now);
        if now.duration_since(opened) >= PUBLISH_WINDOW {
            let mean = (window.sum / f64::from(window.count)).round();
            *window = MeanWindow::default();
            return vec![Command::home(
                AVERAGE_TOPIC,
                json!({"n": "temperature", "v": mean, "u": "C"}),
            )];
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tests::device_with_topics;

    fn reading(v: f64) -> SensorEvent {
        SensorEvent::Temperature {
            value: v,
            unit: "C".to_string(),
        }
    }

    #[test]
    fn plan_covers_temperature_topics_only() {
        let profile = TemperatureProfile::new("YUN");
        let device = device_with_topics("YUN-1", &["Temp"], &["temperature", "noise"], &["led"]);
        let plan = profile.plan(&device).unwrap();
        assert_eq!(plan.topics, vec!["temperature/YUN-1".to_string()]);
    }

    #[test]
    fn window_publishes_the_rounded_mean() {
        let profile = TemperatureProfile::new("YUN");
        let device = device_with_topics("YUN-1", &["Temp"], &["temperature"], &[]);
        let mut ctl = profile.controller(&device);
        let start = Instant::now();

        assert!(ctl.handle(&reading(20.0), start).is_empty());
        assert!(ctl.handle(&reading(21.0), start + Duration::from_secs(60)).is_empty());

        // (20 + 21 + 23) / 3 = 21.33 → 21.
        let commands = ctl.handle(&reading(23.0), start + PUBLISH_WINDOW);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].topic, AVERAGE_TOPIC);
        assert_eq!(commands[0].body["v"], 21.0);
    }

    #[test]
    fn readings_from_all_devices_share_the_window() {
        let profile = TemperatureProfile::new("YUN");
        let d1 = device_with_topics("YUN-1", &["Temp"], &["temperature"], &[]);
        let d2 = device_with_topics("YUN-2", &["Temp"], &["temperature"], &[]);
        let mut ctl1 = profile.controller(&d1);
        let mut ctl2 = profile.controller(&d2);
        let start = Instant::now();

        ctl1.handle(&reading(10.0), start);
        ctl2.handle(&reading(20.0), start + Duration::from_secs(1));
        let commands = ctl1.handle(&reading(30.0), start + PUBLISH_WINDOW);
        assert_eq!(commands[0].body["v"], 20.0);
    }

    #[test]
    fn stale_window_is_discarded() {
        let profile = TemperatureProfile::new("YUN");
        let device = device_with_topics("YUN-1", &["Temp"], &["temperature"], &[]);
        let mut ctl = profile.controller(&device);
        let start = Instant::now();

        ctl.handle(&reading(99.0), start);
        // Next reading arrives past the stale bound: the 99 is gone and a
        // fresh window opens with this reading.
        let commands = ctl.handle(&reading(20.0), start + STALE_WINDOW);
        assert!(commands.is_empty());

        let commands = ctl.handle(&reading(22.0), start + STALE_WINDOW + PUBLISH_WINDOW);
        assert_eq!(commands[0].body["v"], 21.0);
    }
}
