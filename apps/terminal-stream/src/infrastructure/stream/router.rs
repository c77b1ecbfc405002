//! Subscription Router
//!
//! Topic to handler table for a single connection. Lookup is exact; there is
//! no wildcard or prefix matching.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::application::ports::TopicHandler;

/// Result of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler received the payload.
    Delivered,
    /// No handler was registered; the payload was dropped.
    NoHandler,
}

#[derive(Clone)]
struct Route {
    topic: String,
    id: String,
    handler: Arc<dyn TopicHandler>,
}

/// Per-connection subscription table.
#[derive(Default)]
pub struct SubscriptionRouter {
    routes: RwLock<Vec<Route>>,
}

impl std::fmt::Debug for SubscriptionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRouter")
            .field("subscriptions", &self.subscriptions())
            .finish()
    }
}

impl SubscriptionRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`.
    ///
    /// Re-registering a topic swaps the handler but keeps its id and position.
    pub fn register(&self, topic: &str, handler: Arc<dyn TopicHandler>) -> String {
        let mut routes = self.routes.write();
        if let Some(route) = routes.iter_mut().find(|r| r.topic == topic) {
            route.handler = handler;
            return route.id.clone();
        }

        let id = format!("sub-{}", uuid::Uuid::new_v4().simple());
        routes.push(Route {
            topic: topic.to_string(),
            id: id.clone(),
            handler,
        });
        id
    }

    /// Make `handler` the only entry in the table.
    pub fn replace_sole(&self, topic: &str, handler: Arc<dyn TopicHandler>) -> String {
        let mut routes = self.routes.write();
        let id = routes
            .iter()
            .find(|r| r.topic == topic)
            .map_or_else(|| format!("sub-{}", uuid::Uuid::new_v4().simple()), |r| r.id.clone());
        routes.clear();
        routes.push(Route {
            topic: topic.to_string(),
            id: id.clone(),
            handler,
        });
        id
    }

    /// Deliver `payload` to the handler registered for `topic`.
    pub fn dispatch(&self, topic: &str, payload: Value) -> DispatchOutcome {
        let route = self.routes.read().iter().find(|r| r.topic == topic).cloned();

        match route {
            Some(route) => {
                route.handler.on_message(&route.topic, payload);
                DispatchOutcome::Delivered
            }
            None => {
                tracing::warn!(topic = %topic, "No handler registered for topic, dropping message");
                DispatchOutcome::NoHandler
            }
        }
    }

    /// Deliver `payload` to the first handler regardless of topic.
    pub fn dispatch_sole(&self, payload: Value) -> DispatchOutcome {
        let route = self.routes.read().first().cloned();

        match route {
            Some(route) => {
                route.handler.on_message(&route.topic, payload);
                DispatchOutcome::Delivered
            }
            None => {
                tracing::warn!("No handler registered, dropping message");
                DispatchOutcome::NoHandler
            }
        }
    }

    /// `(topic, id)` pairs in declaration order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<(String, String)> {
        self.routes
            .read()
            .iter()
            .map(|r| (r.topic.clone(), r.id.clone()))
            .collect()
    }

    /// Number of registered topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    /// Whether no topic is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }
}
