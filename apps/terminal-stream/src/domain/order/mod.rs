//! Order Types
//!
//! Order records as they travel over the order stream and the order API.
//! Only the identifier and status are mandatory; every other field is
//! optional so that partial lifecycle events can be represented and merged.
//!
//! # Status Lifecycle
//!
//! ```text
//! SUBMITTING ──► SUBMITTED ──► FILLED_PART ──► FILLED_ALL     (terminal)
//!                     │              │
//!                     └──────────────┴───────► CANCELLED_ALL  (terminal)
//!                                    └───────► FAILED         (terminal)
//! ```

pub mod ledger;

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

pub use ledger::{LedgerOutcome, OrderLedger, PendingOrder, PopulateSummary};

// =============================================================================
// Enumerations
// =============================================================================

/// Order status reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted locally, being sent to the exchange.
    Submitting,
    /// Working on the exchange.
    Submitted,
    /// Partially filled and still working.
    FilledPart,
    /// Completely filled.
    #[serde(alias = "FILLED")]
    FilledAll,
    /// Cancelled.
    CancelledAll,
    /// Rejected or failed.
    Failed,
}

impl OrderStatus {
    /// Returns true if no further transition is expected.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::FilledAll | Self::CancelledAll | Self::Failed)
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Submitting => "SUBMITTING",
            Self::Submitted => "SUBMITTED",
            Self::FilledPart => "FILLED_PART",
            Self::FilledAll => "FILLED_ALL",
            Self::CancelledAll => "CANCELLED_ALL",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
}

// =============================================================================
// Order Record
// =============================================================================

/// An order record, either a full snapshot or a partial lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Server-assigned order identifier.
    #[serde(alias = "id", deserialize_with = "deserialize_order_id")]
    pub order_id: String,
    /// Current status.
    #[serde(alias = "status")]
    pub order_status: OrderStatus,
    /// Instrument code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Instrument display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_name: Option<String>,
    /// Order side.
    #[serde(default, alias = "side", skip_serializing_if = "Option::is_none")]
    pub trd_side: Option<Side>,
    /// Broker order type (e.g. `NORMAL`, `MARKET`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_type: Option<String>,
    /// Requested quantity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qty: Option<Decimal>,
    /// Limit price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// Filled quantity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dealt_qty: Option<Decimal>,
    /// Average fill price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dealt_avg_price: Option<Decimal>,
    /// Settlement currency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Creation timestamp as reported by the broker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    /// Last update timestamp as reported by the broker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_time: Option<String>,
    /// Client-generated identifier echoed back by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

impl Order {
    /// Create a bare record with only an identifier and a status.
    #[must_use]
    pub fn new(order_id: impl Into<String>, order_status: OrderStatus) -> Self {
        Self {
            order_id: order_id.into(),
            order_status,
            code: None,
            stock_name: None,
            trd_side: None,
            order_type: None,
            qty: None,
            price: None,
            dealt_qty: None,
            dealt_avg_price: None,
            currency: None,
            create_time: None,
            updated_time: None,
            client_order_id: None,
        }
    }

    /// Returns true if the record carries a terminal status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.order_status.is_terminal()
    }

    /// Overwrite every field the update carries.
    ///
    /// The update is authoritative: fields it omits are left untouched,
    /// fields it carries replace the current value even if older.
    pub fn merge_from(&mut self, update: &Self) {
        self.order_id.clone_from(&update.order_id);
        self.order_status = update.order_status;
        overwrite(&mut self.code, &update.code);
        overwrite(&mut self.stock_name, &update.stock_name);
        overwrite(&mut self.trd_side, &update.trd_side);
        overwrite(&mut self.order_type, &update.order_type);
        overwrite(&mut self.qty, &update.qty);
        overwrite(&mut self.price, &update.price);
        overwrite(&mut self.dealt_qty, &update.dealt_qty);
        overwrite(&mut self.dealt_avg_price, &update.dealt_avg_price);
        overwrite(&mut self.currency, &update.currency);
        overwrite(&mut self.create_time, &update.create_time);
        overwrite(&mut self.updated_time, &update.updated_time);
        overwrite(&mut self.client_order_id, &update.client_order_id);
    }
}

fn overwrite<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if let Some(v) = value {
        *slot = Some(v.clone());
    }
}

/// Accept identifiers sent either as strings or as bare numbers.
fn deserialize_order_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "invalid order identifier: {other}"
        ))),
    }
}

// =============================================================================
// Requests
// =============================================================================

/// New order submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Instrument code.
    pub code: String,
    /// Order side.
    pub trd_side: Side,
    /// Broker order type.
    pub order_type: String,
    /// Requested quantity.
    pub qty: Decimal,
    /// Limit price.
    pub price: Decimal,
    /// Client-generated identifier used to match the confirmation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    /// Create a limit order request.
    #[must_use]
    pub fn limit(code: impl Into<String>, trd_side: Side, qty: Decimal, price: Decimal) -> Self {
        Self {
            code: code.into(),
            trd_side,
            order_type: "NORMAL".to_string(),
            qty,
            price,
            client_order_id: None,
        }
    }

    /// Build the locally displayed draft for this request.
    #[must_use]
    pub fn to_draft(&self, placeholder: &str) -> Order {
        let mut draft = Order::new(placeholder, OrderStatus::Submitting);
        draft.code = Some(self.code.clone());
        draft.trd_side = Some(self.trd_side);
        draft.order_type = Some(self.order_type.clone());
        draft.qty = Some(self.qty);
        draft.price = Some(self.price);
        draft.client_order_id = Some(placeholder.to_string());
        draft
    }
}

/// Historical order query by inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    /// First day included.
    pub start: NaiveDate,
    /// Last day included.
    pub end: NaiveDate,
}

impl HistoryQuery {
    /// Query covering the `days` days up to and including `today`.
    #[must_use]
    pub fn trailing_days(today: NaiveDate, days: u32) -> Self {
        let start = today
            .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
            .unwrap_or(today);
        Self { start, end: today }
    }
}

/// Request to start an algorithmic execution strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRequest {
    /// Strategy name (e.g. `TWAP`).
    pub strategy: String,
    /// Instrument code.
    pub code: String,
    /// Order side.
    pub trd_side: Side,
    /// Total quantity to work.
    pub qty: Decimal,
    /// Strategy-specific parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}
