use fiscus_common::MinorUnits;
use thiserror::Error;

use crate::db_types::{DoubleEntry, LedgerEntry, NewLedgerEntry, PaymentProcessor, RefundKind, TransactionGroup};

/// Tolerance, in minor units, when comparing `amount + fees` against the stored net amount.
/// Applied uniformly at write validation and by the consistency checker.
pub const NET_AMOUNT_TOLERANCE: i64 = 1;

//--------------------------------------    LedgerError     ----------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Invalid ledger entry payload: {0}")]
    InvalidEntry(#[from] InvalidEntry),
    #[error("Ledger entry {0} has already been refunded")]
    AlreadyRefunded(i64),
    #[error("A live ledger entry already exists for {processor} charge {charge_id}")]
    ChargeAlreadyRecorded { processor: PaymentProcessor, charge_id: String },
    #[error("The requested ledger entry {0} does not exist")]
    EntryNotFound(i64),
    #[error("Transaction group {0} has no live entries")]
    GroupNotFound(TransactionGroup),
    #[error("Transaction group {0} has no primary Credit leg to refund")]
    NoPrimaryEntry(TransactionGroup),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}

/// Payload validation failures. These are fatal and never retried; the caller constructed a
/// ledger write that cannot be made consistent.
#[derive(Debug, Clone, Error)]
pub enum InvalidEntry {
    #[error("currency {currency} differs from host currency {host_currency} but no fx rate was supplied")]
    MissingFxRate { currency: String, host_currency: String },
    #[error("currency equals host currency but fx rate is {0}, not 1")]
    FxRateMustBeUnity(f64),
    #[error("currency equals host currency but amount {amount} != host amount {amount_in_host_currency}")]
    AmountMismatch { amount: MinorUnits, amount_in_host_currency: MinorUnits },
    #[error("fx rate {0} is not a positive finite number")]
    BadFxRate(f64),
    #[error("a {0} entry cannot have a zero amount")]
    ZeroAmount(String),
    #[error("an entry may reference an order or an expense, not both")]
    ConflictingReference,
    #[error("a {0} entry must reference its owning record")]
    MissingReference(String),
    #[error("fee field {field} must not be positive on a {entry_type} leg: {value}")]
    FeeSign { field: &'static str, entry_type: String, value: MinorUnits },
    #[error("amount + fees = {expected} drifts from net amount {actual} by more than {NET_AMOUNT_TOLERANCE}")]
    NetAmountDrift { expected: MinorUnits, actual: MinorUnits },
}

//--------------------------------------   LedgerDatabase   ----------------------------------------------------------
/// The ledger store: append-only double-entry rows with soft delete and controlled reversal.
///
/// Implementations must guarantee that every method is atomic. A double entry is never visible
/// with one leg missing, and a failed write leaves no rows behind.
#[allow(async_fn_in_trait)]
pub trait LedgerDatabase: Clone {
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Validates the given Credit leg, derives the Debit counterpart, and persists both legs in
    /// one transaction. Fails with [`LedgerError::InvalidEntry`] on malformed payloads and with
    /// [`LedgerError::ChargeAlreadyRecorded`] when the replay guard trips.
    async fn create_double_entry(&self, entry: NewLedgerEntry) -> Result<DoubleEntry, LedgerError>;

    /// Persists a lone leg for the single-sided kinds (processor fee, dispute fee). Rejects
    /// paired kinds.
    async fn create_single_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, LedgerError>;

    /// Reverses the primary pair of `original_id`'s transaction group into a new group, linking
    /// the originals via `refund_entry_id`. The originals are **not** deleted; a refund is not a
    /// correction.
    ///
    /// `refunded_processor_fee` is the (non-negative) portion of the original processor fee the
    /// processor returned. Any remainder is made up to the collective with a host-funded
    /// `PaymentProcessorCover` pair.
    ///
    /// Calling this twice for the same original fails with [`LedgerError::AlreadyRefunded`].
    async fn create_refund_pair(
        &self,
        original_id: i64,
        refunded_processor_fee: MinorUnits,
        kind: RefundKind,
        group_override: Option<TransactionGroup>,
    ) -> Result<RefundOutcome, LedgerError>;

    /// Soft-deletes every live row of the group in one statement. Pairs always go together.
    /// Returns the number of rows marked.
    async fn soft_delete_group(&self, group: &TransactionGroup) -> Result<u64, LedgerError>;

    /// All rows of a group, live and deleted, ordered by id.
    async fn entries_for_group(&self, group: &TransactionGroup) -> Result<Vec<LedgerEntry>, LedgerError>;

    async fn fetch_entry(&self, id: i64) -> Result<LedgerEntry, LedgerError>;

    /// Fast-path replay probe: is there a live, non-refund leg for this charge?
    async fn charge_recorded(&self, processor: PaymentProcessor, charge_id: &str) -> Result<bool, LedgerError>;

    /// The collective's balance: sum of `net_amount_in_collective_currency` over its live rows.
    async fn collective_balance(&self, collective_id: i64) -> Result<MinorUnits, LedgerError>;
}

//--------------------------------------   RefundOutcome    ----------------------------------------------------------
#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub refund: DoubleEntry,
    pub cover: Option<DoubleEntry>,
}
