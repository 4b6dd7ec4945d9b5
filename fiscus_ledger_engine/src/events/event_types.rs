use crate::{
    db_types::{DoubleEntry, Order},
    traits::ReversalOutcome,
};

/// Fired once a charge has been reconciled and its ledger rows committed.
#[derive(Debug, Clone)]
pub struct ContributionSettledEvent {
    pub order: Order,
    pub contribution: DoubleEntry,
    pub tip: Option<DoubleEntry>,
}

impl ContributionSettledEvent {
    pub fn new(order: Order, contribution: DoubleEntry, tip: Option<DoubleEntry>) -> Self {
        Self { order, contribution, tip }
    }
}

/// Fired when a payment intent fails. The order is in `Error` and may be retried upstream.
#[derive(Debug, Clone)]
pub struct PaymentFailedEvent {
    pub order: Order,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct DisputeOpenedEvent {
    pub order: Order,
    pub dispute_id: String,
}

/// Fired after a lost dispute or a refunding review closure commits its reversal rows.
#[derive(Debug, Clone)]
pub struct FundsReversedEvent {
    pub outcome: ReversalOutcome,
}

impl FundsReversedEvent {
    pub fn new(outcome: ReversalOutcome) -> Self {
        Self { outcome }
    }
}
