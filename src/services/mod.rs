//! Consumer service profiles
//!
//! Each profile tells the reconciliation engine which devices the service
//! consumes, what to subscribe, and which controller drives each device.

pub mod alarm;
pub mod smart_home;
pub mod temperature;

pub use alarm::AlarmProfile;
pub use smart_home::SmartHomeProfile;
pub use temperature::TemperatureProfile;

use crate::db::{Action, Device};

/// Resolved MQTT topics whose endpoint name matches, case-insensitively.
/// Resolved topics are `{name}/{deviceID}`, so the name is the first segment.
pub(crate) fn topics_named(device: &Device, action: Action, name: &str) -> Vec<String> {
    device
        .mqtt_topics(action)
        .iter()
        .filter(|topic| {
            topic
                .split('/')
                .next()
                .is_some_and(|segment| segment.eq_ignore_ascii_case(name))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::db::{Protocol, ProtocolEndpoints};

    pub(crate) fn device_with_topics(
        id: &str,
        resources: &[&str],
        subscribe: &[&str],
        publish: &[&str],
    ) -> Device {
        let to_topics = |names: &[&str]| -> Vec<String> {
            names.iter().map(|n| format!("{n}/{id}")).collect()
        };
        Device {
            device_id: id.to_string(),
            end_points: BTreeMap::from([(
                Protocol::Mqtt,
                ProtocolEndpoints {
                    ip: "broker.local".to_string(),
                    port: 1883,
                    end_points: BTreeMap::from([
                        (Action::Subscribe, to_topics(subscribe)),
                        (Action::Publish, to_topics(publish)),
                    ]),
                },
            )]),
            available_resources: BTreeMap::from([(
                Protocol::Mqtt,
                resources.iter().map(ToString::to_string).collect(),
            )]),
            last_seen: 0,
        }
    }

    #[test]
    fn topic_names_match_case_insensitively() {
        let device = device_with_topics("YUN-1", &["Temp"], &["temperature"], &["led", "FAN"]);
        assert_eq!(
            topics_named(&device, Action::Publish, "fan"),
            vec!["FAN/YUN-1".to_string()]
        );
        assert!(topics_named(&device, Action::Publish, "lcd").is_empty());
    }
}
