//! Typed content payloads for protocol envelopes.
//!
//! Wire field names are camelCase to match the envelope JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `ai.krill.pair.request`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairRequest {
    pub user_id: String,
    pub device_id: String,
    pub device_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
}

/// `ai.krill.pair.response`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_id: Option<String>,
    /// Plaintext bearer token; present exactly once, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `ai.krill.pair.complete` — client acknowledgment that it stored the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairComplete {
    pub pairing_id: String,
}

/// `ai.krill.verify.request`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Opaque nonce, echoed verbatim in the response.
    pub challenge: String,
}

/// `ai.krill.health.ping`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthPing {
    pub request_id: String,
    #[serde(default)]
    pub skip_llm_test: bool,
}

/// `ai.krill.health.ack` — sent unconditionally before any probing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthAck {
    pub request_id: String,
    pub agent_id: String,
    pub gateway_id: String,
    pub timestamp: String,
}

/// `ai.krill.health.pong`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthPong {
    pub request_id: String,
    pub agent_id: String,
    pub gateway_id: String,
    /// `"online"` or `"unresponsive"`. Never `"offline"`; remote callers
    /// infer that from the absence of any pong.
    pub status: String,
    pub llm_status: String,
    /// Probe latency in milliseconds, `-1` when the probe was skipped.
    pub llm_latency_ms: i64,
    pub load: f64,
    pub uptime_seconds: u64,
    pub version: String,
    pub timestamp: String,
}

/// `ai.krill.config.update`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdateRequest {
    pub request_id: String,
    /// Deep-merge patch against the configuration document.
    pub patch: Value,
    #[serde(default)]
    pub restart: bool,
}

/// `ai.krill.config.update.result`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdateResult {
    pub request_id: String,
    pub success: bool,
    /// Whether the applied values are live (restart happened and passed the
    /// health check) or saved-but-inert pending a manual restart.
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the gateway is in a state requiring operator intervention.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unrecoverable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_pair_request_wire_names_are_camel_case() {
        let req: PairRequest = serde_json::from_value(json!({
            "userId": "@u1:example.org",
            "deviceId": "d1",
            "deviceName": "Laptop",
            "deviceType": "desktop",
        }))
        .unwrap();
        assert_eq!(req.user_id, "@u1:example.org");
        assert_eq!(req.device_type.as_deref(), Some("desktop"));
    }

    #[test]
    fn test_pair_request_device_type_optional() {
        let req: PairRequest = serde_json::from_value(json!({
            "userId": "u",
            "deviceId": "d",
            "deviceName": "n",
        }))
        .unwrap();
        assert!(req.device_type.is_none());
    }

    #[test]
    fn test_health_ping_skip_flag_defaults_false() {
        let ping: HealthPing = serde_json::from_value(json!({"requestId": "r1"})).unwrap();
        assert!(!ping.skip_llm_test);
    }

    #[test]
    fn test_pong_serializes_camel_case() {
        let pong = HealthPong {
            request_id: "r1".to_string(),
            agent_id: "a".to_string(),
            gateway_id: "g".to_string(),
            status: "online".to_string(),
            llm_status: "skipped".to_string(),
            llm_latency_ms: -1,
            load: 0.5,
            uptime_seconds: 10,
            version: "0.1.0".to_string(),
            timestamp: "t".to_string(),
        };
        let v = serde_json::to_value(&pong).unwrap();
        assert_eq!(v["requestId"], json!("r1"));
        assert_eq!(v["llmLatencyMs"], json!(-1));
        assert_eq!(v["uptimeSeconds"], json!(10));
    }

    #[test]
    fn test_update_result_hides_unrecoverable_when_false() {
        let result = ConfigUpdateResult {
            request_id: "r1".to_string(),
            success: true,
            applied: true,
            error: None,
            unrecoverable: false,
        };
        let v = serde_json::to_value(&result).unwrap();
        assert!(v.get("unrecoverable").is_none());
        assert!(v.get("error").is_none());
    }

    #[test]
    fn test_config_update_restart_defaults_false() {
        let req: ConfigUpdateRequest = serde_json::from_value(json!({
            "requestId": "r1",
            "patch": {"llm": {"model": "m2"}},
        }))
        .unwrap();
        assert!(!req.restart);
    }
}
