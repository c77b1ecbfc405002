//! Topic Handler Port

use serde_json::Value;

/// Receives the decoded JSON payloads of one subscribed topic.
///
/// Handlers run synchronously on the connection's listener task and must
/// not block. They may still be running while the owning connection tears
/// down.
pub trait TopicHandler: Send + Sync {
    /// Handle one payload delivered on `topic`.
    fn on_message(&self, topic: &str, payload: Value);
}

impl<F> TopicHandler for F
where
    F: Fn(&str, Value) + Send + Sync,
{
    fn on_message(&self, topic: &str, payload: Value) {
        self(topic, payload);
    }
}
