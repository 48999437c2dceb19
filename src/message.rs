/// Wire-level event envelopes for the abstract pub/sub transport
///
/// Messages are dynamic JSON (`serde_json::Value`); inbound events use a
/// tagged enum, outbound events carry an event name plus payload and an
/// optional target connection for point-to-point replies.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Full-snapshot fan-out event
pub const EVENT_UI_CONFIG: &str = "ui-config";

/// Prefix for targeted load replies (`widget-load:<id>`)
pub const EVENT_WIDGET_LOAD_PREFIX: &str = "widget-load:";

/// Prefix for input fan-out notifications (`msg-input:<id>`)
pub const EVENT_MSG_INPUT_PREFIX: &str = "msg-input:";

/// Widget ids with this prefix are client-only built-ins; `load` is
/// answered for them even when no server-side widget exists.
pub const RESERVED_WIDGET_PREFIX: &str = "ui-";

/// Inbound events received from a client connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    #[serde(rename = "widget-action")]
    Action { widget_id: String, payload: Value },

    #[serde(rename = "widget-change")]
    Change { widget_id: String, payload: Value },

    #[serde(rename = "widget-send")]
    Send { widget_id: String, payload: Value },

    #[serde(rename = "widget-load")]
    Load { widget_id: String },

    /// Custom transport event declared by a widget's socket-hook map
    #[serde(rename = "custom")]
    Custom {
        event: String,
        widget_id: String,
        payload: Value,
    },
}

impl InboundEvent {
    /// Target widget id of this event
    pub fn widget_id(&self) -> &str {
        match self {
            Self::Action { widget_id, .. }
            | Self::Change { widget_id, .. }
            | Self::Send { widget_id, .. }
            | Self::Load { widget_id }
            | Self::Custom { widget_id, .. } => widget_id,
        }
    }
}

/// Outbound event delivered over a connection's transport channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEvent {
    /// Event name (`ui-config`, `widget-load:<id>`, `msg-input:<id>`, ...)
    pub event: String,

    /// JSON payload
    pub payload: Value,

    /// Target connection for point-to-point delivery; `None` is
    /// globally addressed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Uuid>,
}

impl OutboundEvent {
    /// Globally-addressed event
    pub fn broadcast(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
            target: None,
        }
    }

    /// Event addressed to a single connection
    pub fn targeted(event: impl Into<String>, payload: Value, target: Uuid) -> Self {
        Self {
            event: event.into(),
            payload,
            target: Some(target),
        }
    }
}

/// Unwrap a `{payload: ...}` envelope, returning the inner value
///
/// Clients may send either a bare value or an envelope object; both
/// normalize to the same stored payload.
pub fn unwrap_payload_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("payload") => map
            .remove("payload")
            .unwrap_or(Value::Null),
        other => other,
    }
}

/// Read the `topic` field of a message object, if any
pub fn message_topic(msg: &Value) -> Option<&str> {
    msg.get("topic").and_then(Value::as_str)
}

/// Set the `topic` field on a message, coercing non-objects into an
/// object with the original value as `payload`
pub fn set_message_topic(msg: Value, topic: String) -> Value {
    let mut map = match msg {
        Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("payload".to_string(), other);
            map
        }
    };
    map.insert("topic".to_string(), Value::String(topic));
    Value::Object(map)
}
