//! Order Gateway Port
//!
//! The request/response side of the terminal. Every call answers with the
//! orders the server reports back, which the reconciler folds into the
//! ledger with the same status rules as the stream.

use async_trait::async_trait;

use crate::domain::order::{HistoryQuery, Order, OrderRequest, StrategyRequest};

/// Order API failures.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("request failed with status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The response body was not valid JSON.
    #[error("response decode error: {0}")]
    Decode(String),
}

/// Request/response access to the order API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit a new order.
    async fn submit_order(&self, request: &OrderRequest) -> Result<Vec<Order>, GatewayError>;

    /// Cancel an order by identifier.
    async fn cancel_order(&self, order_id: &str) -> Result<Vec<Order>, GatewayError>;

    /// Fetch historical orders in a date range.
    async fn fetch_history(&self, query: &HistoryQuery) -> Result<Vec<Order>, GatewayError>;

    /// Start an algorithmic execution strategy.
    async fn start_strategy(&self, request: &StrategyRequest) -> Result<Vec<Order>, GatewayError>;
}
