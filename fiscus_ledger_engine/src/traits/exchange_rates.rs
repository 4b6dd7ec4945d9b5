use chrono::{DateTime, Utc};
use fiscus_common::CurrencyCode;
use thiserror::Error;

use crate::db_types::{FxRate, NewFxRate};

#[derive(Debug, Clone, Error)]
pub enum FxRateError {
    #[error("No {base}->{quote} rate is available as of {as_of}")]
    Unavailable { base: CurrencyCode, quote: CurrencyCode, as_of: DateTime<Utc> },
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for FxRateError {
    fn from(e: sqlx::Error) -> Self {
        FxRateError::DatabaseError(e.to_string())
    }
}

/// FX rate storage. Lookups are as-of a date; a missing rate is an error, never a silent 1.0.
/// The identical-currency short-circuit lives in the API layer, not here.
#[allow(async_fn_in_trait)]
pub trait ExchangeRates: Clone {
    /// The newest stored rate with `as_of <= the requested date`.
    async fn rate_on(
        &self,
        base: &CurrencyCode,
        quote: &CurrencyCode,
        as_of: DateTime<Utc>,
    ) -> Result<FxRate, FxRateError>;

    /// The newest stored rate for the pair, regardless of date.
    async fn latest_rate(&self, base: &CurrencyCode, quote: &CurrencyCode) -> Result<FxRate, FxRateError>;

    /// Store a rate observation.
    async fn set_rate(&self, rate: NewFxRate) -> Result<(), FxRateError>;
}
