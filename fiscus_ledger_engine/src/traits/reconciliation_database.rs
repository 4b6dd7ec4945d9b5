use fiscus_common::{MinorUnits, MoneyConversionError};
use thiserror::Error;

use crate::{
    db_types::{Collective, Expense, Order, PaymentProcessor},
    traits::{
        ContributionSettlement,
        FxRateError,
        LedgerError,
        NewPaymentMethod,
        ReversalOutcome,
        ReviewCloseReason,
        SettlementOutcome,
    },
};

//--------------------------------------  ReconciliationError  -------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum ReconciliationError {
    #[error("{0}")]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    Fx(#[from] FxRateError),
    #[error("{0}")]
    Money(#[from] MoneyConversionError),
    #[error("No owning record matches {processor} object {object_id}")]
    MissingOwningRecord { processor: PaymentProcessor, object_id: String },
    #[error("The requested order {0} does not exist")]
    OrderNotFound(i64),
    #[error("The requested expense {0} does not exist")]
    ExpenseNotFound(i64),
    #[error("Malformed processor event: {0}")]
    InvalidEvent(String),
    #[error("Order {order_id} is in status {status}, which does not admit this transition: {detail}")]
    StateConflict { order_id: i64, status: String, detail: String },
    #[error("Collective {collective_id} has balance {balance} but the payout needs {required}")]
    InsufficientBalance { collective_id: i64, balance: MinorUnits, required: MinorUnits },
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for ReconciliationError {
    fn from(e: sqlx::Error) -> Self {
        ReconciliationError::DatabaseError(e.to_string())
    }
}

//--------------------------------------  ReconciliationDatabase  ----------------------------------------------------
/// Per-event composite operations. Each method is the full set of mutations for one processor
/// event and runs inside a single database transaction: either every row commits or none do.
/// Event delivery order is not trusted; methods tolerate out-of-order arrival wherever the state
/// machine allows it.
#[allow(async_fn_in_trait)]
pub trait ReconciliationDatabase: Clone {
    /// Resolve the order owning a payment intent id or (legacy) charge id. `None` means the
    /// event belongs to some other deployment and will be dropped by the caller.
    async fn fetch_order_by_processor_object(
        &self,
        processor: PaymentProcessor,
        object_id: &str,
    ) -> Result<Option<Order>, ReconciliationError>;

    async fn fetch_expense_by_payout_ref(
        &self,
        processor: PaymentProcessor,
        payout_ref: &str,
    ) -> Result<Option<Expense>, ReconciliationError>;

    async fn fetch_collective(&self, id: i64) -> Result<Option<Collective>, ReconciliationError>;

    /// The host whose books `collective` settles on. Independent collectives host themselves.
    async fn fetch_host_of(&self, collective: &Collective) -> Result<Option<Collective>, ReconciliationError>;

    /// `intent.processing`: move the order to Processing, snapshot any superseded intent into the
    /// intent history, and upsert the payment method the intent references.
    async fn mark_order_processing(
        &self,
        order_id: i64,
        intent_id: &str,
        payment_method: Option<NewPaymentMethod>,
    ) -> Result<Order, ReconciliationError>;

    /// `intent.succeeded`: the whole settlement in one transaction. Replay-safe: if a live ledger
    /// leg already references the charge, nothing is written and
    /// [`SettlementOutcome::AlreadyRecorded`] is returned. Otherwise the contribution double
    /// entry (and tip pair, if any) is created, the order moves to Paid/Active, the subscription's
    /// `last_charged_at` advances, and the contributor's membership is upserted.
    async fn record_contribution_settlement(
        &self,
        order_id: i64,
        settlement: ContributionSettlement,
    ) -> Result<SettlementOutcome, ReconciliationError>;

    /// `intent.payment_failed`: order to Error, intent snapshot retired into history. No ledger
    /// rows.
    async fn mark_order_failed(
        &self,
        order_id: i64,
        intent_id: Option<&str>,
        reason: &str,
    ) -> Result<Order, ReconciliationError>;

    /// `dispute.created`: flag the charge's whole transaction group as disputed, move the order
    /// to Disputed, suspend its subscription, and restrict the paying user.
    async fn open_dispute(
        &self,
        order_id: i64,
        charge_id: &str,
        dispute_id: &str,
        reason: Option<String>,
    ) -> Result<Order, ReconciliationError>;

    /// `dispute.closed` with outcome "lost": zero-processor-fee refund of the contribution, a
    /// dispute fee charged to the **host**, order to Refunded/Cancelled, and the user released
    /// only if no other disputed orders remain. The dispute flags on the originals stay set.
    async fn close_dispute_lost(
        &self,
        order_id: i64,
        dispute_id: &str,
        dispute_fee: MinorUnits,
    ) -> Result<ReversalOutcome, ReconciliationError>;

    /// `dispute.closed` with outcome "won": clear the dispute flags, restore the order to its
    /// settled status, reactivate the subscription.
    async fn close_dispute_won(&self, order_id: i64, dispute_id: &str) -> Result<Order, ReconciliationError>;

    /// `review.opened`: same shape as a dispute, tracked on the review flags, without user
    /// restriction until the closure says fraud.
    async fn open_review(
        &self,
        order_id: i64,
        charge_id: &str,
        review_id: &str,
        reason: Option<String>,
    ) -> Result<Order, ReconciliationError>;

    /// `review.closed`: `Approved` restores the order, the refunding reasons reverse funds, and
    /// `RefundedAsFraud` additionally restricts the user.
    async fn close_review(
        &self,
        order_id: i64,
        review_id: &str,
        reason: ReviewCloseReason,
    ) -> Result<ReviewOutcome, ReconciliationError>;

    /// `payout.processing` for an expense.
    async fn mark_expense_processing(&self, expense_id: i64) -> Result<Expense, ReconciliationError>;

    /// `payout.succeeded`: balance-checked Expense double entry (Debit on the paying collective)
    /// plus the payout fee, expense to Paid.
    async fn record_expense_payout(
        &self,
        expense_id: i64,
        processor_fee: MinorUnits,
    ) -> Result<(Expense, crate::db_types::DoubleEntry), ReconciliationError>;

    /// `payout.failed`: expense to Error. No ledger rows.
    async fn mark_expense_failed(&self, expense_id: i64, reason: &str) -> Result<Expense, ReconciliationError>;
}

//--------------------------------------    ReviewOutcome   ----------------------------------------------------------
#[derive(Debug, Clone)]
pub enum ReviewOutcome {
    Approved(Order),
    Reversed(ReversalOutcome),
}

impl ReviewOutcome {
    pub fn order(&self) -> &Order {
        match self {
            ReviewOutcome::Approved(order) => order,
            ReviewOutcome::Reversed(outcome) => &outcome.order,
        }
    }
}
