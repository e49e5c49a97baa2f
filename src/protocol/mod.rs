//! Wire protocol: envelopes, classification, and dispatch.
//!
//! Every protocol message is a JSON object
//! `{ "type": "ai.krill.<ns>.<verb>", "content": { ... } }` delivered as a
//! chat message body or an HTTP POST body. Anything that does not parse to
//! that shape is not a protocol message and falls through to the normal
//! conversational path.

mod dispatch;
mod messages;

pub use dispatch::{Dispatcher, ProfileLookup};
pub use messages::{
    ConfigUpdateRequest, ConfigUpdateResult, HealthAck, HealthPing, HealthPong, PairComplete,
    PairRequest, PairResponse, VerifyRequest,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Namespace prefix shared by all protocol message types.
pub const TYPE_PREFIX: &str = "ai.krill.";

pub const TYPE_PAIR_REQUEST: &str = "ai.krill.pair.request";
pub const TYPE_PAIR_RESPONSE: &str = "ai.krill.pair.response";
pub const TYPE_PAIR_COMPLETE: &str = "ai.krill.pair.complete";
pub const TYPE_VERIFY_REQUEST: &str = "ai.krill.verify.request";
pub const TYPE_VERIFY_RESPONSE: &str = "ai.krill.verify.response";
pub const TYPE_HEALTH_PING: &str = "ai.krill.health.ping";
pub const TYPE_HEALTH_ACK: &str = "ai.krill.health.ack";
pub const TYPE_HEALTH_PONG: &str = "ai.krill.health.pong";
pub const TYPE_CONFIG_UPDATE: &str = "ai.krill.config.update";
pub const TYPE_CONFIG_UPDATE_RESULT: &str = "ai.krill.config.update.result";

/// A parsed protocol envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub content: Value,
}

impl Envelope {
    /// Build an envelope from a typed content payload.
    pub fn new(message_type: &str, content: impl Serialize) -> Self {
        Self {
            message_type: message_type.to_string(),
            content: serde_json::to_value(content).unwrap_or(Value::Null),
        }
    }

    /// Deserialize the content into a typed message, mapping missing or
    /// mistyped fields to a [`ProtocolError::Malformed`].
    pub fn parse_content<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(self.content.clone()).map_err(|e| ProtocolError::Malformed {
            reason: format!("{}: {}", self.message_type, e),
        })
    }
}

/// Classify raw inbound text as a protocol envelope or not.
///
/// Returns `None` for non-JSON text, JSON that is not an object, and objects
/// whose `type` is missing, not a string, or outside the `ai.krill.`
/// namespace. None of these raise an error; the message simply is not ours.
pub fn classify(raw: &str) -> Option<Envelope> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let obj = value.as_object()?;
    let message_type = obj.get("type")?.as_str()?;
    if !message_type.starts_with(TYPE_PREFIX) {
        return None;
    }
    Some(Envelope {
        message_type: message_type.to_string(),
        content: obj.get("content").cloned().unwrap_or(Value::Null),
    })
}

/// Delivery seam for outbound protocol replies. The transport (chat network,
/// HTTP response) implements this; handlers never talk to it directly.
#[async_trait::async_trait]
pub trait ReplySink: Send + Sync {
    async fn reply(&self, envelope: Envelope) -> Result<(), ProtocolError>;
}
