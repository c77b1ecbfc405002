//! HTTP Order Gateway
//!
//! reqwest adapter for the [`OrderGateway`] port.
//!
//! # Routes
//!
//! | Operation | Request |
//! |---|---|
//! | submit | `POST {base}orders` |
//! | cancel | `DELETE {base}orders/{id}` |
//! | history | `POST {base}orders/history` with `{start, end}` |
//! | strategy | `POST {base}strategies/start` |
//!
//! Every response is reduced to a list of orders; see [`extract_orders`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde_json::Value;

use crate::application::ports::{GatewayError, OrderGateway};
use crate::domain::order::{HistoryQuery, Order, OrderRequest, StrategyRequest};

/// HTTP client for the order API.
#[derive(Debug, Clone)]
pub struct HttpOrderGateway {
    client: Client,
    base_url: String,
}

impl HttpOrderGateway {
    /// Create a gateway rooted at `base_url`.
    ///
    /// A trailing `/` is added when missing so routes join cleanly.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Network`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };

        Ok(Self { client, base_url })
    }

    /// Base URL with trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{path}", self.base_url))
    }

    async fn post_json<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<Vec<Order>, GatewayError> {
        self.execute(self.request(Method::POST, path).json(body)).await
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Vec<Order>, GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), body = %text, "Order API request failed");
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let value: Value =
            serde_json::from_str(&text).map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(extract_orders(value))
    }
}

#[async_trait]
impl OrderGateway for HttpOrderGateway {
    async fn submit_order(&self, request: &OrderRequest) -> Result<Vec<Order>, GatewayError> {
        tracing::info!(code = %request.code, side = ?request.trd_side, qty = %request.qty, "Submitting order");
        self.post_json("orders", request).await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<Vec<Order>, GatewayError> {
        tracing::info!(order_id = %order_id, "Cancelling order");
        self.execute(self.request(Method::DELETE, &format!("orders/{order_id}")))
            .await
    }

    async fn fetch_history(&self, query: &HistoryQuery) -> Result<Vec<Order>, GatewayError> {
        tracing::debug!(start = %query.start, end = %query.end, "Fetching order history");
        self.post_json("orders/history", query).await
    }

    async fn start_strategy(&self, request: &StrategyRequest) -> Result<Vec<Order>, GatewayError> {
        tracing::info!(strategy = %request.strategy, code = %request.code, "Starting strategy");
        self.post_json("strategies/start", request).await
    }
}

/// Pull the order list out of a response body.
///
/// Looks for an `orders` array, then a root array, then a single root order
/// object. Elements that do not decode as orders are skipped.
#[must_use]
pub fn extract_orders(body: Value) -> Vec<Order> {
    let items = match body {
        Value::Object(mut map) => match map.remove("orders") {
            Some(Value::Array(items)) => items,
            Some(_) => Vec::new(),
            None => vec![Value::Object(map)],
        },
        Value::Array(items) => items,
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Order>(item) {
            Ok(order) => Some(order),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed order in response");
                None
            }
        })
        .collect()
}
