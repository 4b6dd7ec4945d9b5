use fiscus_common::{CurrencyCode, MinorUnits};
use serde::{Deserialize, Serialize};

use crate::{
    api::fees::FeeBreakdown,
    db_types::{DoubleEntry, LedgerEntry, Order, PaymentProcessor},
};

//--------------------------------------  ProcessorEvent  ------------------------------------------------------------
/// A normalized inbound payment-processor event.
///
/// The delivery layer verifies the webhook and maps the provider-specific event type onto
/// [`ProcessorEventKind`] (see [`crate::api::normalize_event`]) before handing it to the
/// reconciliation engine. `object_id` is the processor-side id the event is keyed on: a payment
/// intent or charge id for order events, a payout reference for expense events.
#[derive(Debug, Clone)]
pub struct ProcessorEvent {
    pub processor: PaymentProcessor,
    pub kind: ProcessorEventKind,
    pub object_id: String,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorEventKind {
    IntentProcessing,
    IntentSucceeded,
    IntentFailed,
    DisputeCreated,
    DisputeClosed,
    ReviewOpened,
    ReviewClosed,
    PayoutProcessing,
    PayoutSucceeded,
    PayoutFailed,
}

/// The fields the engine reads out of a processor event body. Everything is optional; handlers
/// reject events that are missing what they need with `InvalidEvent` rather than guessing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPayload {
    pub charge_id: Option<String>,
    /// Processor fee as reported, in host currency minor units. The sign is normalized by the
    /// fee calculator; processors are not trusted to get it right.
    pub processor_fee: Option<MinorUnits>,
    pub dispute_id: Option<String>,
    pub dispute_fee: Option<MinorUnits>,
    pub review_id: Option<String>,
    /// Dispute outcome ("won"/"lost") or review closure reason.
    pub outcome: Option<String>,
    pub payment_method_ref: Option<String>,
    pub failure_message: Option<String>,
}

//--------------------------------------  ReviewCloseReason  ---------------------------------------------------------
/// Closure reasons for a processor fraud review. `Refunded` reverses funds; `RefundedAsFraud`
/// additionally restricts the paying user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewCloseReason {
    Approved,
    Refunded,
    RefundedAsFraud,
}

impl ReviewCloseReason {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(Self::Approved),
            "refunded" => Some(Self::Refunded),
            "refunded_as_fraud" => Some(Self::RefundedAsFraud),
            _ => None,
        }
    }
}

//--------------------------------------  NewPaymentMethod  ----------------------------------------------------------
/// Upsert payload for the processor payment method attached to an order. Concurrent webhooks for
/// the same order race on this record, so backends must write it with an upsert inside the event
/// transaction, never a check-then-insert.
#[derive(Debug, Clone)]
pub struct NewPaymentMethod {
    pub processor: PaymentProcessor,
    pub processor_ref: String,
    pub collective_id: i64,
    pub currency: CurrencyCode,
    pub saved: bool,
}

//--------------------------------------  ContributionSettlement  ----------------------------------------------------
/// Everything a backend needs to reconcile a succeeded charge into the ledger in one transaction.
#[derive(Debug, Clone)]
pub struct ContributionSettlement {
    pub processor: PaymentProcessor,
    pub charge_id: String,
    pub intent_id: Option<String>,
    pub payment_method: Option<NewPaymentMethod>,
    /// The host whose books the charge settles on.
    pub host_collective_id: i64,
    pub fees: FeeBreakdown,
}

/// Result of a settlement attempt. Replayed webhooks land on `AlreadyRecorded` and must not
/// produce further writes.
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    AlreadyRecorded(Order),
    Settled { order: Order, contribution: DoubleEntry, tip: Option<DoubleEntry> },
}

impl SettlementOutcome {
    pub fn order(&self) -> &Order {
        match self {
            SettlementOutcome::AlreadyRecorded(order) => order,
            SettlementOutcome::Settled { order, .. } => order,
        }
    }
}

//--------------------------------------  ReversalOutcome  -----------------------------------------------------------
/// Result of a lost dispute or a refunding review closure.
#[derive(Debug, Clone)]
pub struct ReversalOutcome {
    pub order: Order,
    pub refund: DoubleEntry,
    /// Host-funded top-up for the processor fee the processor kept.
    pub cover: Option<DoubleEntry>,
    /// The dispute fee leg, charged to the host. Absent for review closures.
    pub dispute_fee: Option<LedgerEntry>,
    /// Whether the paying user came out of restriction (no other disputed orders remain).
    pub user_unrestricted: bool,
}
