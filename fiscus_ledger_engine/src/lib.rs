//! Fiscus Ledger Engine
//!
//! The ledger engine is the bookkeeping core of a fiscal hosting platform: a double-entry ledger
//! over collectives, the fee and FX arithmetic that turns a processor charge into ledger rows,
//! and a reconciliation state machine that consumes payment processor webhook events. It is
//! provider-agnostic; Stripe, Paypal and Wise event vocabularies are normalized at the edge.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`]). You should rarely need the low-level
//!    functions directly; the data types in [`db_types`] are public, the queries are not meant to
//!    be.
//! 2. The backend contracts ([`mod@traits`]). A storage backend implements these to power the
//!    engine; `SqliteDatabase` is the bundled implementation.
//! 3. The public API: [`ReconciliationApi`] for processor events, [`LedgerApi`] for
//!    operator-initiated ledger writes, [`FxApi`] for exchange rates, and the pure fee arithmetic
//!    in [`mod@fees`].
//!
//! The engine also emits events through a small actor-style hook system ([`mod@events`]): after a
//! reconciliation transaction commits, subscribed handlers hear about settled contributions,
//! failed payments, opened disputes and reversed funds.
mod api;

pub mod checks;
pub mod db_types;
pub mod events;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::{fees, normalize_event, EventOutcome, FeeBreakdown, FxApi, LedgerApi, ReconciliationApi};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
