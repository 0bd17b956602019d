//! Smart-home service
//!
//! Consumes fully-equipped devices, drives one hysteresis controller per
//! device, and publishes the roster of connected devices.

use crate::catalog::registration::ServiceRegistration;
use crate::controller::{DeviceController, SmartHomeController};
use crate::db::{Action, Device, MqttEndpoints, ServiceEndpoints};
use crate::engine::{CapabilityPredicate, DevicePlan, ServiceProfile};
use crate::transport::BrokerAddr;

/// Topic the connected-device roster is published on
pub const ROSTER_TOPIC: &str = "hearth/smarthome/roster";

/// Capabilities a device must carry to be driven
pub const REQUIRED_CAPABILITIES: [&str; 7] = ["Temp", "Led", "FAN", "PIR", "noise", "SM", "Lcd"];

/// Profile of the smart-home service
pub struct SmartHomeProfile {
    predicate: CapabilityPredicate,
}

impl SmartHomeProfile {
    /// Create the profile for devices whose id carries `marker`
    #[must_use]
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            predicate: CapabilityPredicate::new(marker, REQUIRED_CAPABILITIES),
        }
    }
}

impl ServiceProfile for SmartHomeProfile {
    fn predicate(&self) -> &CapabilityPredicate {
        &self.predicate
    }

    /// Everything the device publishes is of interest here
    fn plan(&self, device: &Device) -> Option<DevicePlan> {
        let plan = DevicePlan::from_mqtt(device)?;
        (!plan.topics.is_empty()).then_some(plan)
    }

    fn controller(&self, device: &Device) -> Box<dyn DeviceController> {
        Box::new(SmartHomeController::new(
            super::topics_named(device, Action::Publish, "led"),
            super::topics_named(device, Action::Publish, "fan"),
            super::topics_named(device, Action::Publish, "lcd"),
        ))
    }

    fn registration(&self, home: &BrokerAddr) -> ServiceRegistration {
        ServiceRegistration {
            service_id: "smart-home".to_string(),
            description: "hysteresis climate control with occupancy detection".to_string(),
            end_points: ServiceEndpoints {
                mqtt: Some(MqttEndpoints {
                    broker: Some(home.clone()),
                    subscribe: Some(vec![ROSTER_TOPIC.to_string()]),
                    publish: None,
                }),
                rest: None,
            },
        }
    }

    fn roster_topic(&self) -> Option<&str> {
        Some(ROSTER_TOPIC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tests::device_with_topics;

    #[test]
    fn only_fully_equipped_devices_qualify() {
        let profile = SmartHomeProfile::new("YUN");

        let full = device_with_topics(
            "YUN-1",
            &REQUIRED_CAPABILITIES,
            &["temperature", "PIR", "noise"],
            &["led", "FAN", "lcd"],
        );
        assert!(profile.predicate().matches(&full));

        let partial = device_with_topics("YUN-2", &["Temp", "Led"], &["temperature"], &["led"]);
        assert!(!profile.predicate().matches(&partial));
    }

    #[test]
    fn plan_subscribes_every_telemetry_topic() {
        let profile = SmartHomeProfile::new("YUN");
        let device = device_with_topics(
            "YUN-1",
            &REQUIRED_CAPABILITIES,
            &["temperature", "PIR", "noise"],
            &["led", "FAN", "lcd"],
        );
        let plan = profile.plan(&device).unwrap();
        assert_eq!(plan.topics.len(), 3);
        assert!(plan.topics.contains(&"PIR/YUN-1".to_string()));
    }

    #[test]
    fn roster_topic_is_announced() {
        let profile = SmartHomeProfile::new("YUN");
        assert_eq!(profile.roster_topic(), Some(ROSTER_TOPIC));
        let registration = profile.registration(&BrokerAddr {
            host: "home.local".to_string(),
            port: 1883,
        });
        assert_eq!(registration.service_id, "smart-home");
    }
}
