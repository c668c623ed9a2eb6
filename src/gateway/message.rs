//! Push envelope sent to subscribers.

use serde::Serialize;

use crate::error::Result;
use crate::telemetry::TelemetrySnapshot;

/// Message pushed to every subscriber
///
/// Serialized as `{"type": "telemetry", "data": {...}}` or `{"type": "ping"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum PushMessage {
    /// Full vehicle snapshot
    Telemetry(TelemetrySnapshot),

    /// Keepalive with no payload
    Ping,
}

impl PushMessage {
    /// Serialize to the JSON text sent over the wire
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Envelope kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Telemetry(_) => "telemetry",
            Self::Ping => "ping",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_telemetry_envelope() {
        let snap = TelemetrySnapshot {
            altitude: 50.0,
            ground_speed: 3.5,
            heading: 180.0,
            mode: "GUIDED".to_string(),
            armed: true,
        };
        let text = PushMessage::Telemetry(snap).to_json().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "telemetry",
                "data": {
                    "altitude": 50.0,
                    "ground_speed": 3.5,
                    "heading": 180.0,
                    "mode": "GUIDED",
                    "armed": true
                }
            })
        );
    }

    #[test]
    fn test_ping_envelope() {
        let text = PushMessage::Ping.to_json().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({ "type": "ping" }));
        assert_eq!(PushMessage::Ping.kind(), "ping");
    }
}
