//! # SQLite database methods
//!
//! "Low-level" SQLite interactions, kept as plain functions that accept a `&mut SqliteConnection`.
//! Callers obtain a connection from the pool, or open a transaction and pass it straight through,
//! so any group of these calls can be made atomic without further plumbing.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod checks;
pub mod collectives;
pub mod expenses;
pub mod fx_rates;
pub mod ledger;
pub mod orders;
pub mod payment_methods;
pub mod subscriptions;

const SQLITE_DB_URL: &str = "sqlite://data/fiscus_store.db";

pub fn db_url() -> String {
    let result = env::var("FISCUS_DATABASE_URL").unwrap_or_else(|_| {
        info!("FISCUS_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
