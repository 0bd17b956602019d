//! Registration payload validation and normalization
//!
//! Wire payloads are heterogeneous: a device declares either one protocol or
//! both. The accepted shapes are discriminated here, once, into typed
//! variants; downstream code only ever sees the normalized entities.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::db::{Action, Device, EmailLabel, Protocol, ProtocolEndpoints, ServiceEndpoints, ServiceRecord, User};
use crate::{Error, Result};

/// Semantic actions as declared in a registration payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
pub enum SemanticAction {
    /// The device produces data here ("S" for sense)
    #[serde(rename = "S")]
    Sense,
    /// The device accepts commands here ("A" for actuate)
    #[serde(rename = "A")]
    Actuate,
}

/// Marker accepted only as the literal `"BOTH"`
#[derive(Debug, Clone, Copy, Deserialize)]
enum DualTag {
    #[serde(rename = "BOTH")]
    Both,
}

/// Per-protocol block of a dual-protocol registration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolPayload {
    #[serde(rename = "IP")]
    pub ip: String,
    #[serde(rename = "P")]
    pub port: u16,
    #[serde(rename = "ED")]
    pub end_points: BTreeMap<SemanticAction, Vec<String>>,
    #[serde(rename = "AR")]
    pub resources: Vec<String>,
}

/// Registration of a device speaking a single protocol
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SingleProtocol {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "PROT")]
    pub protocol: Protocol,
    #[serde(rename = "IP")]
    pub ip: String,
    #[serde(rename = "P")]
    pub port: u16,
    #[serde(rename = "ED")]
    pub end_points: BTreeMap<SemanticAction, Vec<String>>,
    #[serde(rename = "AR")]
    pub resources: Vec<String>,
}

/// Registration of a device speaking MQTT and REST
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DualProtocol {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "PROT")]
    #[allow(dead_code)]
    tag: DualTag,
    #[serde(rename = "MQTT")]
    pub mqtt: ProtocolPayload,
    #[serde(rename = "REST")]
    pub rest: ProtocolPayload,
}

/// A device registration in one of the two accepted shapes.
///
/// The key set of the payload must match exactly one shape; anything else is
/// a validation error before any store mutation.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DeviceRegistration {
    Dual(DualProtocol),
    Single(SingleProtocol),
}

impl DeviceRegistration {
    /// Discriminate a raw JSON payload into one of the accepted shapes
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the key set matches neither shape
    /// or a value has the wrong type
    pub fn parse(payload: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(payload.clone()).map_err(|e| {
            Error::Validation(format!(
                "device payload must match the single-protocol shape \
                 {{ID, PROT, IP, P, ED, AR}} or the dual-protocol shape \
                 {{ID, PROT: \"BOTH\", MQTT, REST}}: {e}"
            ))
        })
    }

    /// Normalize into a [`Device`], resolving every endpoint name into a
    /// concrete addressable identifier
    #[must_use]
    pub fn into_device(self, now: i64) -> Device {
        match self {
            Self::Single(single) => {
                let block = ProtocolPayload {
                    ip: single.ip,
                    port: single.port,
                    end_points: single.end_points,
                    resources: single.resources,
                };
                build_device(single.id, vec![(single.protocol, block)], now)
            }
            Self::Dual(dual) => build_device(
                dual.id,
                vec![(Protocol::Mqtt, dual.mqtt), (Protocol::Rest, dual.rest)],
                now,
            ),
        }
    }
}

fn build_device(id: String, blocks: Vec<(Protocol, ProtocolPayload)>, now: i64) -> Device {
    let mut end_points = BTreeMap::new();
    let mut available_resources = BTreeMap::new();

    for (protocol, block) in blocks {
        let resolved = block
            .end_points
            .into_iter()
            .map(|(action, names)| {
                (
                    concrete_action(protocol, action),
                    names
                        .into_iter()
                        .map(|name| resolve_endpoint(protocol, &name, &id, &block.ip, block.port))
                        .collect(),
                )
            })
            .collect();

        end_points.insert(
            protocol,
            ProtocolEndpoints {
                ip: block.ip,
                port: block.port,
                end_points: resolved,
            },
        );
        available_resources.insert(protocol, block.resources);
    }

    Device {
        device_id: id,
        end_points,
        available_resources,
        last_seen: now,
    }
}

/// Map a declared semantic action onto the protocol's concrete action
const fn concrete_action(protocol: Protocol, action: SemanticAction) -> Action {
    match (protocol, action) {
        (Protocol::Mqtt, SemanticAction::Sense) => Action::Subscribe,
        (Protocol::Mqtt, SemanticAction::Actuate) => Action::Publish,
        (Protocol::Rest, SemanticAction::Sense) => Action::Get,
        (Protocol::Rest, SemanticAction::Actuate) => Action::Post,
    }
}

/// Resolve an endpoint name: URLs for REST, device-scoped topics for MQTT
/// (scoping by device id keeps topics collision-free across devices)
fn resolve_endpoint(protocol: Protocol, name: &str, id: &str, ip: &str, port: u16) -> String {
    match protocol {
        Protocol::Rest => format!("http://{ip}:{port}/{name}"),
        Protocol::Mqtt => format!("{name}/{id}"),
    }
}

/// A user registration
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserRegistration {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub name: String,
    pub surname: String,
    pub email_addresses: BTreeMap<EmailLabel, String>,
}

impl UserRegistration {
    /// Validate a raw JSON payload
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] on a shape or type mismatch
    pub fn parse(payload: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(payload.clone()).map_err(|e| {
            Error::Validation(format!(
                "user payload must have keys {{userID, name, surname, email_addresses}} \
                 with addresses labeled WORK or PERSONAL: {e}"
            ))
        })
    }

    /// Normalize into a [`User`]
    #[must_use]
    pub fn into_user(self) -> User {
        User {
            user_id: self.user_id,
            name: self.name,
            surname: self.surname,
            email_addresses: self.email_addresses,
        }
    }
}

/// A service registration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceRegistration {
    #[serde(rename = "serviceID")]
    pub service_id: String,
    pub description: String,
    pub end_points: ServiceEndpoints,
}

impl ServiceRegistration {
    /// Validate a raw JSON payload
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] on a shape or type mismatch
    pub fn parse(payload: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(payload.clone()).map_err(|e| {
            Error::Validation(format!(
                "service payload must have keys {{serviceID, description, end_points}}: {e}"
            ))
        })
    }

    /// Normalize into a [`ServiceRecord`]
    #[must_use]
    pub fn into_record(self, now: i64) -> ServiceRecord {
        ServiceRecord {
            service_id: self.service_id,
            description: self.description,
            end_points: self.end_points,
            last_seen: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_protocol_resolves_mqtt_topics() {
        let payload = json!({
            "ID": "YUN-7",
            "PROT": "MQTT",
            "IP": "broker.local",
            "P": 1883,
            "ED": {"S": ["temperature"], "A": ["led", "lcd"]},
            "AR": ["Temp", "Led", "Lcd"],
        });

        let device = DeviceRegistration::parse(&payload).unwrap().into_device(42);
        assert_eq!(device.device_id, "YUN-7");
        assert_eq!(device.last_seen, 42);

        let mqtt = device.mqtt().unwrap();
        assert_eq!(mqtt.ip, "broker.local");
        assert_eq!(
            mqtt.end_points[&Action::Subscribe],
            vec!["temperature/YUN-7".to_string()]
        );
        assert_eq!(
            mqtt.end_points[&Action::Publish],
            vec!["led/YUN-7".to_string(), "lcd/YUN-7".to_string()]
        );
        assert_eq!(
            device.available_resources[&Protocol::Mqtt],
            vec!["Temp", "Led", "Lcd"]
        );
    }

    #[test]
    fn single_protocol_resolves_rest_urls() {
        let payload = json!({
            "ID": "YUN-2",
            "PROT": "REST",
            "IP": "10.0.0.5",
            "P": 8080,
            "ED": {"S": ["temperature"]},
            "AR": ["Temp"],
        });

        let device = DeviceRegistration::parse(&payload).unwrap().into_device(0);
        let rest = &device.end_points[&Protocol::Rest];
        assert_eq!(
            rest.end_points[&Action::Get],
            vec!["http://10.0.0.5:8080/temperature".to_string()]
        );
    }

    #[test]
    fn dual_protocol_carries_both_blocks() {
        let payload = json!({
            "ID": "YUN-3",
            "PROT": "BOTH",
            "MQTT": {
                "IP": "broker.local", "P": 1883,
                "ED": {"S": ["temperature"]}, "AR": ["Temp"],
            },
            "REST": {
                "IP": "10.0.0.5", "P": 8080,
                "ED": {"S": ["temperature"]}, "AR": ["Temp"],
            },
        });

        let device = DeviceRegistration::parse(&payload).unwrap().into_device(0);
        assert_eq!(device.end_points.len(), 2);
        assert_eq!(
            device.mqtt_topics(Action::Subscribe),
            ["temperature/YUN-3".to_string()]
        );
    }

    #[test]
    fn wrong_key_set_is_rejected() {
        let err = DeviceRegistration::parse(&json!({"id": "d1"})).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Extra key on an otherwise valid payload.
        let err = DeviceRegistration::parse(&json!({
            "ID": "d1", "PROT": "MQTT", "IP": "h", "P": 1883,
            "ED": {}, "AR": [], "EXTRA": true,
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn unsupported_protocol_is_rejected() {
        let err = DeviceRegistration::parse(&json!({
            "ID": "d1", "PROT": "COAP", "IP": "h", "P": 1883,
            "ED": {}, "AR": [],
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // "BOTH" with the single-protocol key set matches neither shape.
        let err = DeviceRegistration::parse(&json!({
            "ID": "d1", "PROT": "BOTH", "IP": "h", "P": 1883,
            "ED": {}, "AR": [],
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn resources_must_be_strings() {
        let err = DeviceRegistration::parse(&json!({
            "ID": "d1", "PROT": "MQTT", "IP": "h", "P": 1883,
            "ED": {"S": ["temperature"]}, "AR": [1, 2],
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn user_labels_are_a_closed_set() {
        let ok = UserRegistration::parse(&json!({
            "userID": "u1", "name": "Ada", "surname": "Lovelace",
            "email_addresses": {"WORK": "ada@work.example"},
        }));
        assert!(ok.is_ok());

        let err = UserRegistration::parse(&json!({
            "userID": "u1", "name": "Ada", "surname": "Lovelace",
            "email_addresses": {"OTHER": "ada@other.example"},
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn service_endpoints_validate_per_protocol() {
        let ok = ServiceRegistration::parse(&json!({
            "serviceID": "s1",
            "description": "temperature average",
            "end_points": {
                "MQTT": {
                    "broker": {"ip": "broker.local", "port": 1883},
                    "subscribe": ["hearth/temperature/average"],
                }
            },
        }));
        assert!(ok.is_ok());

        let err = ServiceRegistration::parse(&json!({
            "serviceID": "s1",
            "description": "bad",
            "end_points": {"MQTT": {"broker": {"ip": "only-ip"}}},
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
