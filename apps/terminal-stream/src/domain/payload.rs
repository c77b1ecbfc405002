//! Typed Stream Payloads
//!
//! Every JSON body delivered to a topic handler is classified into a tagged
//! variant before any business logic runs. Order updates are validated for
//! their required fields here, so the reconciler only ever sees well-formed
//! records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::order::Order;

/// Errors raised while classifying a payload.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// A required field is absent or null.
    #[error("order update is missing required field `{0}`")]
    MissingField(&'static str),

    /// A field is present but has the wrong shape or an unknown value.
    #[error("invalid order update: {0}")]
    InvalidOrder(#[from] serde_json::Error),
}

/// A chat message pushed on the messaging topic tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message text.
    pub content: String,
    /// Sender role (e.g. `user1`).
    #[serde(default)]
    pub role: Option<String>,
    /// Room or conversation identifier.
    #[serde(default)]
    pub room: Option<String>,
}

/// A decoded application payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPayload {
    /// Order lifecycle event.
    OrderUpdate(Order),
    /// Chat room message.
    ChatMessage(ChatMessage),
    /// Anything else; left for the caller to ignore or inspect.
    Unrecognized(Value),
}

impl StreamPayload {
    /// Classify a JSON body.
    ///
    /// An object is treated as an order update when it carries `order_id`,
    /// `order_status`, or both of the short `id`/`status` keys. It is a chat
    /// message when it carries a string `content`.
    ///
    /// # Errors
    ///
    /// Returns an error if an order-shaped object lacks required fields or
    /// fails to deserialize.
    pub fn decode(value: Value) -> Result<Self, PayloadError> {
        let Some(object) = value.as_object() else {
            return Ok(Self::Unrecognized(value));
        };

        let has = |key: &str| object.get(key).is_some_and(|v| !v.is_null());
        let order_shaped = object.contains_key("order_id")
            || object.contains_key("order_status")
            || (object.contains_key("id") && object.contains_key("status"));

        if order_shaped {
            if !has("order_id") && !has("id") {
                return Err(PayloadError::MissingField("order_id"));
            }
            if !has("order_status") && !has("status") {
                return Err(PayloadError::MissingField("order_status"));
            }
            let order: Order = serde_json::from_value(value)?;
            return Ok(Self::OrderUpdate(order));
        }

        if object.get("content").is_some_and(Value::is_string) {
            let message: ChatMessage = serde_json::from_value(value)?;
            return Ok(Self::ChatMessage(message));
        }

        Ok(Self::Unrecognized(value))
    }
}
