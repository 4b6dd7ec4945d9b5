use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use fiscus_common::{CurrencyCode, MinorUnits};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConversionError(pub String);

//--------------------------------------  TransactionGroup  ----------------------------------------------------------
/// Correlation id linking every ledger row of one economic event: the principal pair, its fee
/// siblings, and any later reversal. Stored as a UUID string.
#[derive(Debug, Clone, Type, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct TransactionGroup(String);

impl TransactionGroup {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TransactionGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for TransactionGroup {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for TransactionGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------     EntryType      ----------------------------------------------------------
/// Which side of a double entry a ledger row represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum EntryType {
    Credit,
    Debit,
}

impl EntryType {
    pub fn flipped(self) -> Self {
        match self {
            EntryType::Credit => EntryType::Debit,
            EntryType::Debit => EntryType::Credit,
        }
    }
}

impl Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryType::Credit => write!(f, "Credit"),
            EntryType::Debit => write!(f, "Debit"),
        }
    }
}

//--------------------------------------   LedgerEntryKind  ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum LedgerEntryKind {
    Contribution,
    Expense,
    AddedFunds,
    PlatformTip,
    HostFee,
    PaymentProcessorFee,
    PaymentProcessorCover,
    PaymentProcessorDisputeFee,
    BalanceTransfer,
    PrepaidPaymentMethod,
}

impl LedgerEntryKind {
    /// Primary kinds anchor a transaction group; at most one live Credit/Debit pair of a primary
    /// kind may share a group.
    pub fn is_primary(&self) -> bool {
        matches!(
            self,
            LedgerEntryKind::Contribution
                | LedgerEntryKind::Expense
                | LedgerEntryKind::AddedFunds
                | LedgerEntryKind::BalanceTransfer
                | LedgerEntryKind::PrepaidPaymentMethod
        )
    }

    /// Secondary kinds must share a group with a primary row (post-cutover), except for the
    /// processor-cover and dispute-fee kinds, which legitimately stand alone.
    pub fn is_secondary(&self) -> bool {
        matches!(
            self,
            LedgerEntryKind::PlatformTip | LedgerEntryKind::HostFee | LedgerEntryKind::PaymentProcessorFee
        )
    }

    /// Kinds that are written as a lone leg rather than a Credit/Debit pair.
    pub fn is_single_sided(&self) -> bool {
        matches!(self, LedgerEntryKind::PaymentProcessorFee | LedgerEntryKind::PaymentProcessorDisputeFee)
    }
}

impl Display for LedgerEntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LedgerEntryKind::Contribution => "Contribution",
            LedgerEntryKind::Expense => "Expense",
            LedgerEntryKind::AddedFunds => "AddedFunds",
            LedgerEntryKind::PlatformTip => "PlatformTip",
            LedgerEntryKind::HostFee => "HostFee",
            LedgerEntryKind::PaymentProcessorFee => "PaymentProcessorFee",
            LedgerEntryKind::PaymentProcessorCover => "PaymentProcessorCover",
            LedgerEntryKind::PaymentProcessorDisputeFee => "PaymentProcessorDisputeFee",
            LedgerEntryKind::BalanceTransfer => "BalanceTransfer",
            LedgerEntryKind::PrepaidPaymentMethod => "PrepaidPaymentMethod",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------  PaymentProcessor  ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum PaymentProcessor {
    Stripe,
    Paypal,
    Wise,
}

impl Display for PaymentProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentProcessor::Stripe => write!(f, "Stripe"),
            PaymentProcessor::Paypal => write!(f, "Paypal"),
            PaymentProcessor::Wise => write!(f, "Wise"),
        }
    }
}

impl FromStr for PaymentProcessor {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stripe" => Ok(Self::Stripe),
            "paypal" => Ok(Self::Paypal),
            "wise" => Ok(Self::Wise),
            s => Err(ConversionError(format!("Unknown payment processor: {s}"))),
        }
    }
}

//--------------------------------------     Provenance     ----------------------------------------------------------
/// Typed record of why a ledger row exists. Serialized as tagged JSON into the `provenance`
/// column, replacing a free-form audit blob with a closed set of shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Provenance {
    ProcessorCharge { processor: PaymentProcessor, charge_id: String, intent_id: Option<String> },
    Refund { refunded_entry_id: i64, kind: RefundKind },
    Dispute { dispute_id: String, reason: Option<String> },
    Review { review_id: String, reason: Option<String> },
    Payout { processor: PaymentProcessor, payout_ref: String },
    Manual { note: String, created_by: i64 },
    Migration { script: String, note: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundKind {
    Refund,
    Dispute,
    FraudReview,
}

//--------------------------------------    OrderStatus     ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Created; no processor activity yet.
    New,
    /// A payment intent is in flight.
    Processing,
    /// One-off order, fully reconciled.
    Paid,
    /// Recurring order with a settled charge.
    Active,
    /// The last payment attempt failed.
    Error,
    /// A chargeback is open against the charge.
    Disputed,
    /// The processor put the charge under fraud review.
    InReview,
    /// Funds were reversed back to the contributor.
    Refunded,
    /// Terminal state for reversed recurring orders.
    Cancelled,
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::New => "New",
            OrderStatus::Processing => "Processing",
            OrderStatus::Paid => "Paid",
            OrderStatus::Active => "Active",
            OrderStatus::Error => "Error",
            OrderStatus::Disputed => "Disputed",
            OrderStatus::InReview => "InReview",
            OrderStatus::Refunded => "Refunded",
            OrderStatus::Cancelled => "Cancelled",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(Self::New),
            "Processing" => Ok(Self::Processing),
            "Paid" => Ok(Self::Paid),
            "Active" => Ok(Self::Active),
            "Error" => Ok(Self::Error),
            "Disputed" => Ok(Self::Disputed),
            "InReview" => Ok(Self::InReview),
            "Refunded" => Ok(Self::Refunded),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to New");
            OrderStatus::New
        })
    }
}

//--------------------------------------  PaymentIntentStatus  -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentIntentStatus {
    RequiresAction,
    Processing,
    Succeeded,
    Failed,
}

impl Display for PaymentIntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentIntentStatus::RequiresAction => "RequiresAction",
            PaymentIntentStatus::Processing => "Processing",
            PaymentIntentStatus::Succeeded => "Succeeded",
            PaymentIntentStatus::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------   ExpenseStatus    ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ExpenseStatus {
    Approved,
    Processing,
    Paid,
    Error,
}

impl Display for ExpenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExpenseStatus::Approved => "Approved",
            ExpenseStatus::Processing => "Processing",
            ExpenseStatus::Paid => "Paid",
            ExpenseStatus::Error => "Error",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------    LedgerEntry     ----------------------------------------------------------
/// One immutable row of the double-entry ledger.
///
/// Mutations after creation are limited to attaching `refund_entry_id`, flipping the dispute and
/// review flags, and soft deletion. Amounts are minor units in the entry's own `currency`; the
/// `*_in_host_currency` fields are denominated in `host_currency`.
#[derive(Debug, Clone, FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub uuid: String,
    pub entry_type: EntryType,
    pub kind: LedgerEntryKind,
    pub transaction_group: TransactionGroup,
    pub collective_id: i64,
    pub from_collective_id: i64,
    pub host_collective_id: i64,
    pub order_id: Option<i64>,
    pub expense_id: Option<i64>,
    pub amount: MinorUnits,
    pub currency: CurrencyCode,
    pub host_currency: CurrencyCode,
    pub host_currency_fx_rate: f64,
    pub amount_in_host_currency: MinorUnits,
    pub net_amount_in_collective_currency: MinorUnits,
    pub platform_fee_in_host_currency: MinorUnits,
    pub host_fee_in_host_currency: MinorUnits,
    pub payment_processor_fee_in_host_currency: MinorUnits,
    pub tax_amount: MinorUnits,
    pub processor: Option<PaymentProcessor>,
    pub charge_id: Option<String>,
    pub is_refund: bool,
    pub refund_entry_id: Option<i64>,
    pub is_disputed: bool,
    pub is_in_review: bool,
    pub is_internal: bool,
    pub provenance: Json<Provenance>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    /// Sum of the fee columns, all in host currency.
    pub fn total_fees_in_host_currency(&self) -> MinorUnits {
        self.platform_fee_in_host_currency
            + self.host_fee_in_host_currency
            + self.payment_processor_fee_in_host_currency
    }
}

/// The two legs of one money movement, as returned by the ledger store.
#[derive(Debug, Clone)]
pub struct DoubleEntry {
    pub credit: LedgerEntry,
    pub debit: LedgerEntry,
}

impl DoubleEntry {
    pub fn group(&self) -> &TransactionGroup {
        &self.credit.transaction_group
    }
}

//--------------------------------------   NewLedgerEntry   ----------------------------------------------------------
/// Input for one leg of a ledger write. For paired kinds the caller describes the **Credit** leg
/// (money arriving at `collective_id` from `from_collective_id`); the store derives the Debit
/// counterpart. Single-sided kinds are written as given.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub entry_type: EntryType,
    pub kind: LedgerEntryKind,
    pub transaction_group: TransactionGroup,
    pub collective_id: i64,
    pub from_collective_id: i64,
    pub host_collective_id: i64,
    pub order_id: Option<i64>,
    pub expense_id: Option<i64>,
    pub amount: MinorUnits,
    pub currency: CurrencyCode,
    pub host_currency: CurrencyCode,
    pub host_currency_fx_rate: f64,
    pub amount_in_host_currency: MinorUnits,
    pub net_amount_in_collective_currency: MinorUnits,
    pub platform_fee_in_host_currency: MinorUnits,
    pub host_fee_in_host_currency: MinorUnits,
    pub payment_processor_fee_in_host_currency: MinorUnits,
    pub tax_amount: MinorUnits,
    pub processor: Option<PaymentProcessor>,
    pub charge_id: Option<String>,
    pub is_refund: bool,
    pub refund_entry_id: Option<i64>,
    pub is_internal: bool,
    pub provenance: Provenance,
}

impl NewLedgerEntry {
    /// A same-currency Credit leg with no fees. Callers fill in fee fields and references
    /// afterwards with struct update syntax or plain assignment.
    pub fn credit(
        kind: LedgerEntryKind,
        group: TransactionGroup,
        collective_id: i64,
        from_collective_id: i64,
        host_collective_id: i64,
        amount: MinorUnits,
        currency: CurrencyCode,
        provenance: Provenance,
    ) -> Self {
        Self {
            entry_type: EntryType::Credit,
            kind,
            transaction_group: group,
            collective_id,
            from_collective_id,
            host_collective_id,
            order_id: None,
            expense_id: None,
            amount,
            currency: currency.clone(),
            host_currency: currency,
            host_currency_fx_rate: 1.0,
            amount_in_host_currency: amount,
            net_amount_in_collective_currency: amount,
            platform_fee_in_host_currency: MinorUnits::ZERO,
            host_fee_in_host_currency: MinorUnits::ZERO,
            payment_processor_fee_in_host_currency: MinorUnits::ZERO,
            tax_amount: MinorUnits::ZERO,
            processor: None,
            charge_id: None,
            is_refund: false,
            refund_entry_id: None,
            is_internal: false,
            provenance,
        }
    }

    /// Derives the opposite leg: flipped side, negated amounts, swapped collectives, same group,
    /// kind and references. Fee and tax columns are carried over unchanged, so both legs state
    /// the withheld amounts with the same non-positive sign.
    pub fn counterpart(&self) -> Self {
        Self {
            entry_type: self.entry_type.flipped(),
            collective_id: self.from_collective_id,
            from_collective_id: self.collective_id,
            amount: -self.amount,
            amount_in_host_currency: -self.amount_in_host_currency,
            net_amount_in_collective_currency: -self.net_amount_in_collective_currency,
            ..self.clone()
        }
    }
}

//--------------------------------------    IntentSnapshot  ----------------------------------------------------------
/// Snapshot of a superseded payment intent, kept on the order when the processor issues a new
/// intent after a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentSnapshot {
    pub intent_id: String,
    pub status: PaymentIntentStatus,
    pub recorded_at: DateTime<Utc>,
}

//--------------------------------------       Order        ----------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: i64,
    pub collective_id: i64,
    pub from_collective_id: i64,
    pub created_by_user_id: i64,
    pub subscription_id: Option<i64>,
    pub status: OrderStatus,
    pub currency: CurrencyCode,
    /// Total charged to the contributor, tip included.
    pub total_amount: MinorUnits,
    pub platform_tip_amount: MinorUnits,
    pub tax_amount: MinorUnits,
    pub payment_method_id: Option<i64>,
    pub processor: Option<PaymentProcessor>,
    pub payment_intent_id: Option<String>,
    pub payment_intent_status: Option<PaymentIntentStatus>,
    pub intent_history: Json<Vec<IntentSnapshot>>,
    pub charge_id: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_recurring(&self) -> bool {
        self.subscription_id.is_some()
    }

    /// The contribution principal: total minus tip.
    pub fn principal(&self) -> MinorUnits {
        self.total_amount - self.platform_tip_amount
    }

    /// The status a reconciled order settles into.
    pub fn settled_status(&self) -> OrderStatus {
        if self.is_recurring() {
            OrderStatus::Active
        } else {
            OrderStatus::Paid
        }
    }

    /// The terminal status after a full reversal.
    pub fn reversed_status(&self) -> OrderStatus {
        if self.is_recurring() {
            OrderStatus::Cancelled
        } else {
            OrderStatus::Refunded
        }
    }
}

/// Seed data for a new order. Orders are created upstream of this engine; the constructor exists
/// for admin tooling and tests.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub collective_id: i64,
    pub from_collective_id: i64,
    pub created_by_user_id: i64,
    pub subscription_id: Option<i64>,
    pub currency: CurrencyCode,
    pub total_amount: MinorUnits,
    pub platform_tip_amount: MinorUnits,
    pub tax_amount: MinorUnits,
    pub processor: Option<PaymentProcessor>,
}

impl NewOrder {
    pub fn new(
        collective_id: i64,
        from_collective_id: i64,
        created_by_user_id: i64,
        total_amount: MinorUnits,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            collective_id,
            from_collective_id,
            created_by_user_id,
            subscription_id: None,
            currency,
            total_amount,
            platform_tip_amount: MinorUnits::ZERO,
            tax_amount: MinorUnits::ZERO,
            processor: None,
        }
    }
}

//--------------------------------------      Expense       ----------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Expense {
    pub id: i64,
    pub collective_id: i64,
    pub payee_collective_id: i64,
    pub status: ExpenseStatus,
    pub currency: CurrencyCode,
    pub amount: MinorUnits,
    pub processor: Option<PaymentProcessor>,
    pub payout_ref: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewExpense {
    pub collective_id: i64,
    pub payee_collective_id: i64,
    pub currency: CurrencyCode,
    pub amount: MinorUnits,
    pub processor: Option<PaymentProcessor>,
    pub payout_ref: Option<String>,
}

//--------------------------------------     Collective     ----------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Collective {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub currency: CurrencyCode,
    pub host_collective_id: Option<i64>,
    /// Per-collective override; the host's default applies when unset.
    pub host_fee_percent: Option<f64>,
    pub is_host: bool,
    pub is_platform: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Collective {
    /// Self-hosted collectives hold their own funds; no host fee ever applies to them.
    pub fn is_independent(&self) -> bool {
        self.host_collective_id == Some(self.id)
    }
}

#[derive(Debug, Clone)]
pub struct NewCollective {
    pub slug: String,
    pub name: String,
    pub currency: CurrencyCode,
    pub host_collective_id: Option<i64>,
    pub host_fee_percent: Option<f64>,
    pub is_host: bool,
    pub is_platform: bool,
}

impl NewCollective {
    pub fn new<S: Into<String>>(slug: S, currency: CurrencyCode) -> Self {
        let slug = slug.into();
        Self {
            name: slug.clone(),
            slug,
            currency,
            host_collective_id: None,
            host_fee_percent: None,
            is_host: false,
            is_platform: false,
        }
    }
}

//--------------------------------------   Subscription     ----------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Subscription {
    pub id: i64,
    pub interval: String,
    pub is_active: bool,
    pub last_charged_at: Option<DateTime<Utc>>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   PaymentMethod    ----------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct PaymentMethod {
    pub id: i64,
    pub processor: PaymentProcessor,
    pub processor_ref: String,
    pub collective_id: i64,
    pub currency: CurrencyCode,
    pub saved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       User         ----------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub collective_id: i64,
    /// Fraud containment: restricted users cannot place new orders until cleared.
    pub is_restricted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      Member        ----------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Member {
    pub id: i64,
    pub collective_id: i64,
    pub member_collective_id: i64,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      FxRate        ----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FxRate {
    pub id: i64,
    pub base_currency: CurrencyCode,
    pub quote_currency: CurrencyCode,
    pub rate: f64,
    pub as_of: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A rate observation to store. `as_of` is the validity date, not the insertion time.
#[derive(Debug, Clone)]
pub struct NewFxRate {
    pub base_currency: CurrencyCode,
    pub quote_currency: CurrencyCode,
    pub rate: f64,
    pub as_of: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counterpart_negates_and_swaps() {
        let usd: CurrencyCode = "USD".parse().unwrap();
        let mut credit = NewLedgerEntry::credit(
            LedgerEntryKind::Contribution,
            TransactionGroup::new(),
            10,
            20,
            30,
            MinorUnits::from(1000),
            usd,
            Provenance::Manual { note: "test".into(), created_by: 1 },
        );
        credit.host_fee_in_host_currency = MinorUnits::from(-100);
        credit.net_amount_in_collective_currency = MinorUnits::from(900);
        let debit = credit.counterpart();
        assert_eq!(debit.entry_type, EntryType::Debit);
        assert_eq!(debit.collective_id, 20);
        assert_eq!(debit.from_collective_id, 10);
        assert_eq!(debit.amount, MinorUnits::from(-1000));
        // Fee columns keep the credit leg's sign; only the amount columns flip.
        assert_eq!(debit.host_fee_in_host_currency, MinorUnits::from(-100));
        assert_eq!(debit.net_amount_in_collective_currency, MinorUnits::from(-900));
        assert_eq!(debit.transaction_group, credit.transaction_group);
        assert_eq!(debit.kind, credit.kind);
    }

    #[test]
    fn provenance_round_trips_as_tagged_json() {
        let p = Provenance::ProcessorCharge {
            processor: PaymentProcessor::Stripe,
            charge_id: "ch_123".into(),
            intent_id: Some("pi_456".into()),
        };
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains(r#""source":"processor_charge""#));
        let back: Provenance = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn order_status_parsing() {
        assert_eq!("Disputed".parse::<OrderStatus>().unwrap(), OrderStatus::Disputed);
        assert!("disputed".parse::<OrderStatus>().is_err());
        assert_eq!(OrderStatus::from("InReview".to_string()), OrderStatus::InReview);
        assert_eq!(OrderStatus::from("nonsense".to_string()), OrderStatus::New);
    }

    #[test]
    fn processor_parsing_is_case_insensitive() {
        assert_eq!("STRIPE".parse::<PaymentProcessor>().unwrap(), PaymentProcessor::Stripe);
        assert_eq!("wise".parse::<PaymentProcessor>().unwrap(), PaymentProcessor::Wise);
        assert!("venmo".parse::<PaymentProcessor>().is_err());
    }
}
