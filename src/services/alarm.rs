//! Alarm service
//!
//! Watches the temperature of every qualifying device against the healthy
//! range. A reading outside the range lights the device's led and raises the
//! alarm on the status feed; a reading back in range clears both. Sink
//! services (mail, chat) are plain subscribers of the status feed.

use std::time::Instant;

use serde_json::json;

use crate::catalog::registration::ServiceRegistration;
use crate::controller::{Command, DeviceController, SensorEvent, units};
use crate::db::{Action, Device, MqttEndpoints, ServiceEndpoints};
use crate::engine::{CapabilityPredicate, DevicePlan, ServiceProfile};
use crate::transport::BrokerAddr;

/// Topic alarm state changes are published on
pub const STATUS_TOPIC: &str = "hearth/alarm/status";

/// Healthy temperature range, exclusive at both ends
pub const HEALTHY_RANGE: (f64, f64) = (0.0, 30.0);

/// Profile of the alarm service
pub struct AlarmProfile {
    predicate: CapabilityPredicate,
}

impl AlarmProfile {
    /// Create the profile for devices whose id carries `marker`
    #[must_use]
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            predicate: CapabilityPredicate::new(marker, ["Temp", "Led"]),
        }
    }
}

impl ServiceProfile for AlarmProfile {
    fn predicate(&self) -> &CapabilityPredicate {
        &self.predicate
    }

    fn plan(&self, device: &Device) -> Option<DevicePlan> {
        let mut plan = DevicePlan::from_mqtt(device)?;
        plan.topics = super::topics_named(device, Action::Subscribe, "temperature");
        (!plan.topics.is_empty()).then_some(plan)
    }

    fn controller(&self, device: &Device) -> Box<dyn DeviceController> {
        Box::new(AlarmController {
            device_id: device.device_id.clone(),
            led_topics: super::topics_named(device, Action::Publish, "led"),
        })
    }

    fn registration(&self, home: &BrokerAddr) -> ServiceRegistration {
        ServiceRegistration {
            service_id: "alarm".to_string(),
            description: "temperature alarm with per-device led indication".to_string(),
            end_points: ServiceEndpoints {
                mqtt: Some(MqttEndpoints {
                    broker: Some(home.clone()),
                    subscribe: Some(vec![STATUS_TOPIC.to_string()]),
                    publish: None,
                }),
                rest: None,
            },
        }
    }
}

/// Range check over one device's readings
struct AlarmController {
    device_id: String,
    led_topics: Vec<String>,
}

impl DeviceController for AlarmController {
    fn handle(&mut self, event: &SensorEvent, _now: Instant) -> Vec<Command> {
        let SensorEvent::Temperature { value, unit } = event else {
            return Vec::new();
        };
        let Some(celsius) = units::to_celsius(*value, unit) else {
            return Vec::new();
        };

        let alarm = celsius <= HEALTHY_RANGE.0 || celsius >= HEALTHY_RANGE.1;
        let mut commands: Vec<Command> = self
            .led_topics
            .iter()
            .map(|topic| {
                Command::device(topic, json!({"n": "led", "v": i32::from(alarm), "u": null}))
            })
            .collect();
        commands.push(Command::home(
            STATUS_TOPIC,
            json!({"device": self.device_id, "alarm": alarm}),
        ));
        commands
    }
}
