//! Order Ledger
//!
//! Folds an unordered sequence of order lifecycle events into three disjoint
//! collections:
//!
//! - **active**: orders with a non-terminal status, newest first
//! - **historical**: orders with a terminal status, newest first
//! - **pending**: optimistic drafts awaiting server confirmation, keyed by
//!   their client-generated placeholder
//!
//! Per order identifier the state machine is `Unseen → Active → Historical`.
//! Nothing moves an order out of historical.
//!
//! # Ordering
//!
//! Events carry no sequence number, so arrival order is authoritative. A
//! delayed non-terminal event overwrites newer active fields with older
//! values. The terminal rule is the only guard: once historical, an order
//! ignores non-terminal events.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use super::Order;

/// Result of applying one event to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// New active order inserted at the front.
    Opened,
    /// Existing active order updated.
    Amended,
    /// Order moved (or inserted) into historical.
    Completed,
    /// Existing historical order updated.
    HistoryAmended,
    /// Non-terminal event for an order that is already historical.
    IgnoredTerminal,
}

/// Counts produced by a bulk population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateSummary {
    /// Records placed in or updated in active.
    pub active: usize,
    /// Records placed in or updated in historical.
    pub historical: usize,
    /// Non-terminal records skipped because the order is already historical.
    pub skipped: usize,
}

/// An optimistic order awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOrder {
    /// Client-generated placeholder identifier.
    pub placeholder: String,
    /// Locally built draft.
    pub draft: Order,
    /// When the draft was submitted.
    pub submitted_at: DateTime<Utc>,
}

/// Active, historical and pending order collections.
#[derive(Debug, Clone, Default)]
pub struct OrderLedger {
    active: VecDeque<Order>,
    historical: VecDeque<Order>,
    pending: Vec<PendingOrder>,
}

impl OrderLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Active orders, newest first.
    pub fn active(&self) -> impl Iterator<Item = &Order> {
        self.active.iter()
    }

    /// Historical orders, newest first.
    pub fn historical(&self) -> impl Iterator<Item = &Order> {
        self.historical.iter()
    }

    /// Pending drafts in submission order.
    #[must_use]
    pub fn pending(&self) -> &[PendingOrder] {
        &self.pending
    }

    /// Look up an active order.
    #[must_use]
    pub fn active_order(&self, order_id: &str) -> Option<&Order> {
        self.active.iter().find(|o| o.order_id == order_id)
    }

    /// Look up a historical order.
    #[must_use]
    pub fn historical_order(&self, order_id: &str) -> Option<&Order> {
        self.historical.iter().find(|o| o.order_id == order_id)
    }

    /// Apply one stream event.
    pub fn apply(&mut self, event: Order) -> LedgerOutcome {
        let event = self.absorb_pending(event);

        if event.is_terminal() {
            return self.complete(event);
        }

        if self.historical_position(&event.order_id).is_some() {
            return LedgerOutcome::IgnoredTerminal;
        }

        if let Some(idx) = self.active_position(&event.order_id) {
            self.active[idx].merge_from(&event);
            LedgerOutcome::Amended
        } else {
            self.active.push_front(event);
            LedgerOutcome::Opened
        }
    }

    /// Reconcile a bulk fetch with the current ledger.
    ///
    /// Records are partitioned by status alone. Orders not yet known are
    /// appended in list order; known orders follow the same upsert rules as
    /// stream events.
    pub fn populate(&mut self, orders: Vec<Order>) -> PopulateSummary {
        let mut summary = PopulateSummary::default();

        for order in orders {
            let order = self.absorb_pending(order);

            if order.is_terminal() {
                let previous = self
                    .active_position(&order.order_id)
                    .and_then(|idx| self.active.remove(idx));
                match self.historical_position(&order.order_id) {
                    Some(idx) => self.historical[idx].merge_from(&order),
                    None => self.historical.push_back(with_prior(previous, order)),
                }
                summary.historical += 1;
            } else if self.historical_position(&order.order_id).is_some() {
                summary.skipped += 1;
            } else {
                match self.active_position(&order.order_id) {
                    Some(idx) => self.active[idx].merge_from(&order),
                    None => self.active.push_back(order),
                }
                summary.active += 1;
            }
        }

        summary
    }

    /// Record an optimistic draft. Replaces any draft with the same placeholder.
    pub fn add_pending(&mut self, placeholder: &str, draft: Order, submitted_at: DateTime<Utc>) {
        self.pending.retain(|p| p.placeholder != placeholder);
        self.pending.push(PendingOrder {
            placeholder: placeholder.to_string(),
            draft,
            submitted_at,
        });
    }

    /// Drop a draft without promoting it.
    pub fn discard_pending(&mut self, placeholder: &str) -> Option<PendingOrder> {
        let idx = self.pending.iter().position(|p| p.placeholder == placeholder)?;
        Some(self.pending.remove(idx))
    }

    /// Promote a draft using the server-confirmed record.
    ///
    /// The draft's fields are kept where the confirmation omits them. Returns
    /// `None` if no draft exists for the placeholder.
    pub fn confirm_pending(&mut self, placeholder: &str, confirmed: Order) -> Option<LedgerOutcome> {
        let pending = self.discard_pending(placeholder)?;
        let mut record = pending.draft;
        record.merge_from(&confirmed);
        Some(self.apply(record))
    }

    /// Discard drafts submitted at or before `cutoff`.
    pub fn expire_pending(&mut self, cutoff: DateTime<Utc>) -> Vec<PendingOrder> {
        let (expired, kept): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|p| p.submitted_at <= cutoff);
        self.pending = kept;
        expired
    }

    fn complete(&mut self, event: Order) -> LedgerOutcome {
        let previous = self
            .active_position(&event.order_id)
            .and_then(|idx| self.active.remove(idx));

        if let Some(idx) = self.historical_position(&event.order_id) {
            self.historical[idx].merge_from(&event);
            return LedgerOutcome::HistoryAmended;
        }

        self.historical.push_front(with_prior(previous, event));
        LedgerOutcome::Completed
    }

    /// Drop the draft this record confirms, keeping the draft's fields where
    /// the record omits them.
    fn absorb_pending(&mut self, order: Order) -> Order {
        let Some(idx) = self.pending.iter().position(|p| {
            p.placeholder == order.order_id
                || order.client_order_id.as_deref() == Some(p.placeholder.as_str())
        }) else {
            return order;
        };
        with_prior(Some(self.pending.remove(idx).draft), order)
    }

    fn active_position(&self, order_id: &str) -> Option<usize> {
        self.active.iter().position(|o| o.order_id == order_id)
    }

    fn historical_position(&self, order_id: &str) -> Option<usize> {
        self.historical.iter().position(|o| o.order_id == order_id)
    }
}

fn with_prior(previous: Option<Order>, event: Order) -> Order {
    match previous {
        Some(mut record) => {
            record.merge_from(&event);
            record
        }
        None => event,
    }
}
