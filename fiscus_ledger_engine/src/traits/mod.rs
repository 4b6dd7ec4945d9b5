//! Interface contracts for ledger engine database backends.
//!
//! A backend that wants to power the reconciliation core implements these traits:
//!
//! * [`LedgerDatabase`] is the ledger store proper: atomic double-entry writes, controlled
//!   refunds, soft deletion, and balance queries.
//! * [`ReconciliationDatabase`] layers the per-event composite operations on top. Each method is
//!   one processor event's worth of mutations and must run inside a single database transaction;
//!   either everything commits or nothing does.
//! * [`ExchangeRates`] stores and serves FX rate observations. Lookups are as-of a date and fail
//!   loudly when no observation exists; the engine never guesses a rate.
//! * [`ConsistencyChecks`] exposes the batch invariant scans run by the checker CLI.

mod consistency;
mod data_objects;
mod exchange_rates;
mod ledger_database;
mod reconciliation_database;

pub use consistency::{CheckError, CheckStats, ConsistencyChecks, SECONDARY_ENTRY_CUTOVER};
pub use data_objects::{
    ContributionSettlement,
    EventPayload,
    NewPaymentMethod,
    ProcessorEvent,
    ProcessorEventKind,
    ReversalOutcome,
    ReviewCloseReason,
    SettlementOutcome,
};
pub use exchange_rates::{ExchangeRates, FxRateError};
pub use ledger_database::{InvalidEntry, LedgerDatabase, LedgerError, RefundOutcome, NET_AMOUNT_TOLERANCE};
pub use reconciliation_database::{ReconciliationDatabase, ReconciliationError, ReviewOutcome};
