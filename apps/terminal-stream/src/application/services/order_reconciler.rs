//! Order Reconciler Service
//!
//! Owns the order ledger and keeps it consistent across three sources:
//!
//! - stream events delivered on the order topic (via [`TopicHandler`])
//! - bulk history fetched through the [`OrderGateway`]
//! - responses to submit/cancel/strategy calls
//!
//! All ledger mutation happens under one write lock, so a terminal transition
//! (remove from active, insert into historical) is observed atomically by
//! readers. The lock is never held across an await point.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::watch;

use crate::application::ports::{GatewayError, OrderGateway, TopicHandler};
use crate::domain::order::{
    HistoryQuery, LedgerOutcome, Order, OrderLedger, OrderRequest, PendingOrder, PopulateSummary,
    StrategyRequest,
};
use crate::domain::payload::{PayloadError, StreamPayload};

/// Default lifetime of an unconfirmed optimistic order.
pub const DEFAULT_PENDING_TTL: chrono::Duration = chrono::Duration::seconds(30);

/// Point-in-time copy of the ledger for rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    /// Active orders, newest first.
    pub active: Vec<Order>,
    /// Historical orders, newest first.
    pub historical: Vec<Order>,
    /// Pending drafts.
    pub pending: Vec<PendingOrder>,
}

/// Reconciles order events into the active/historical ledger.
#[derive(Debug)]
pub struct OrderReconciler {
    ledger: RwLock<OrderLedger>,
    revision: watch::Sender<u64>,
    pending_ttl: chrono::Duration,
}

impl Default for OrderReconciler {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_TTL)
    }
}

impl OrderReconciler {
    /// Create a reconciler with an empty ledger.
    #[must_use]
    pub fn new(pending_ttl: chrono::Duration) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            ledger: RwLock::new(OrderLedger::new()),
            revision,
            pending_ttl,
        }
    }

    /// Receiver bumped after every ledger change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Current revision number.
    #[must_use]
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Active orders, newest first.
    #[must_use]
    pub fn active(&self) -> Vec<Order> {
        self.ledger.read().active().cloned().collect()
    }

    /// Historical orders, newest first.
    #[must_use]
    pub fn historical(&self) -> Vec<Order> {
        self.ledger.read().historical().cloned().collect()
    }

    /// Pending drafts.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingOrder> {
        self.ledger.read().pending().to_vec()
    }

    /// Consistent copy of all three collections.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        let ledger = self.ledger.read();
        LedgerSnapshot {
            active: ledger.active().cloned().collect(),
            historical: ledger.historical().cloned().collect(),
            pending: ledger.pending().to_vec(),
        }
    }

    /// Apply a single order event.
    pub fn apply(&self, event: Order) -> LedgerOutcome {
        let order_id = event.order_id.clone();
        let status = event.order_status;
        let outcome = self.ledger.write().apply(event);

        if outcome == LedgerOutcome::IgnoredTerminal {
            tracing::debug!(order_id = %order_id, status = %status, "Ignoring update for completed order");
        } else {
            tracing::debug!(order_id = %order_id, status = %status, ?outcome, "Order event applied");
            self.bump();
        }
        outcome
    }

    /// Decode and apply a raw JSON payload.
    ///
    /// Returns `Ok(None)` for payloads that are not order updates.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is an order update with missing or
    /// invalid fields. The ledger is left unchanged.
    pub fn apply_payload(&self, payload: Value) -> Result<Option<LedgerOutcome>, PayloadError> {
        match StreamPayload::decode(payload)? {
            StreamPayload::OrderUpdate(order) => Ok(Some(self.apply(order))),
            StreamPayload::ChatMessage(_) | StreamPayload::Unrecognized(_) => Ok(None),
        }
    }

    /// Reconcile a bulk list of orders.
    pub fn populate(&self, orders: Vec<Order>) -> PopulateSummary {
        let summary = self.ledger.write().populate(orders);
        tracing::info!(
            active = summary.active,
            historical = summary.historical,
            skipped = summary.skipped,
            "Orders populated"
        );
        self.bump();
        summary
    }

    /// Fetch order history and reconcile it with the ledger.
    ///
    /// # Errors
    ///
    /// Returns the gateway error; the ledger is left unchanged.
    pub async fn bootstrap(
        &self,
        gateway: &dyn OrderGateway,
        query: &HistoryQuery,
    ) -> Result<PopulateSummary, GatewayError> {
        let orders = gateway.fetch_history(query).await?;
        Ok(self.populate(orders))
    }

    /// Submit an order with an optimistic pending entry.
    ///
    /// The pending entry is keyed by the request's `client_order_id`
    /// (generated when absent) and is resolved by a matching response order,
    /// by a single-order response, or later by a stream event carrying the
    /// same `client_order_id`. Returns the placeholder.
    ///
    /// # Errors
    ///
    /// Returns the gateway error after discarding the pending entry.
    pub async fn submit(
        &self,
        gateway: &dyn OrderGateway,
        mut request: OrderRequest,
    ) -> Result<String, GatewayError> {
        let placeholder = request
            .client_order_id
            .get_or_insert_with(|| format!("cl-{}", uuid::Uuid::new_v4()))
            .clone();

        self.ledger
            .write()
            .add_pending(&placeholder, request.to_draft(&placeholder), Utc::now());
        self.bump();

        let orders = match gateway.submit_order(&request).await {
            Ok(orders) => orders,
            Err(e) => {
                self.ledger.write().discard_pending(&placeholder);
                self.bump();
                tracing::warn!(placeholder = %placeholder, error = %e, "Order submission failed");
                return Err(e);
            }
        };

        self.reconcile_submission(&placeholder, orders);
        Ok(placeholder)
    }

    /// Cancel an order and reconcile whatever the server reports back.
    ///
    /// # Errors
    ///
    /// Returns the gateway error; the ledger is left unchanged.
    pub async fn cancel(
        &self,
        gateway: &dyn OrderGateway,
        order_id: &str,
    ) -> Result<PopulateSummary, GatewayError> {
        let orders = gateway.cancel_order(order_id).await?;
        Ok(self.populate(orders))
    }

    /// Start an execution strategy and reconcile the orders it reports.
    ///
    /// # Errors
    ///
    /// Returns the gateway error; the ledger is left unchanged.
    pub async fn start_strategy(
        &self,
        gateway: &dyn OrderGateway,
        request: &StrategyRequest,
    ) -> Result<PopulateSummary, GatewayError> {
        let orders = gateway.start_strategy(request).await?;
        Ok(self.populate(orders))
    }

    /// Discard pending drafts older than the configured TTL.
    pub fn expire_pending(&self, now: DateTime<Utc>) -> Vec<PendingOrder> {
        let expired = self.ledger.write().expire_pending(now - self.pending_ttl);
        for pending in &expired {
            tracing::warn!(
                placeholder = %pending.placeholder,
                submitted_at = %pending.submitted_at,
                "Discarding unconfirmed order"
            );
        }
        if !expired.is_empty() {
            self.bump();
        }
        expired
    }

    fn reconcile_submission(&self, placeholder: &str, orders: Vec<Order>) {
        let matched = orders
            .iter()
            .position(|o| o.client_order_id.as_deref() == Some(placeholder))
            .or_else(|| (orders.len() == 1).then_some(0));

        let mut ledger = self.ledger.write();
        for (idx, order) in orders.into_iter().enumerate() {
            if Some(idx) == matched {
                let order_id = order.order_id.clone();
                // The stream may have resolved the draft while the request was in flight.
                if ledger.pending().iter().any(|p| p.placeholder == placeholder) {
                    ledger.confirm_pending(placeholder, order);
                    tracing::info!(placeholder = %placeholder, order_id = %order_id, "Order confirmed");
                } else {
                    ledger.apply(order);
                }
            } else {
                ledger.apply(order);
            }
        }
        drop(ledger);
        self.bump();
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r = r.wrapping_add(1));
    }
}

impl TopicHandler for OrderReconciler {
    fn on_message(&self, topic: &str, payload: Value) {
        match self.apply_payload(payload) {
            Ok(Some(_)) => {}
            Ok(None) => tracing::debug!(topic = %topic, "Ignoring non-order payload"),
            Err(e) => tracing::warn!(topic = %topic, error = %e, "Discarding malformed order event"),
        }
    }
}
