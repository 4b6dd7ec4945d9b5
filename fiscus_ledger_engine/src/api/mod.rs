//! # Ledger engine public API
//!
//! The `api` module exposes the programmatic surface of the ledger engine. It is modular: clients
//! pick the API they need and hand it a database backend implementing the matching traits, so the
//! reconciliation flow and, say, operator fx tooling can run against different connections or
//! even different machines.
//!
//! * [`reconciliation_api`] turns normalized processor events into ledger writes and order/expense
//!   state transitions.
//! * [`ledger_api`] is the direct write surface for manual operations: added funds, balance
//!   transfers, refunds issued by an operator.
//! * [`fx_api`] reads and records exchange rates.
//! * [`fees`] is the pure fee/FX arithmetic shared by all of them.
//!
//! The pattern is the same everywhere:
//!
//! ```rust,ignore
//! use fiscus_ledger_engine::{ReconciliationApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/fiscus_store.db", 16).await?;
//! let api = ReconciliationApi::new(db, producers);
//! let outcome = api.process_event(event).await?;
//! ```

pub mod fees;
pub mod fx_api;
pub mod ledger_api;
pub mod normalize;
pub mod reconciliation_api;

pub use fees::FeeBreakdown;
pub use fx_api::FxApi;
pub use ledger_api::LedgerApi;
pub use normalize::normalize_event;
pub use reconciliation_api::{EventOutcome, ReconciliationApi};
