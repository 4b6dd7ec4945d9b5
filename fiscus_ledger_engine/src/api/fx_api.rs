//! Exchange rate access for hosts whose collectives take contributions in foreign currencies.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use fiscus_common::CurrencyCode;

use crate::{
    db_types::{FxRate, NewFxRate},
    traits::{ExchangeRates, FxRateError},
};

pub struct FxApi<B> {
    db: B,
}

impl<B> Debug for FxApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FxApi")
    }
}

impl<B> FxApi<B>
where B: ExchangeRates
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// The conversion factor from `base` to `quote` as of `as_of`. Identical currencies are
    /// always 1.0 and never hit the store.
    pub async fn rate_for(
        &self,
        base: &CurrencyCode,
        quote: &CurrencyCode,
        as_of: DateTime<Utc>,
    ) -> Result<f64, FxRateError> {
        if base == quote {
            return Ok(1.0);
        }
        let rate = self.db.rate_on(base, quote, as_of).await?;
        Ok(rate.rate)
    }

    pub async fn fetch_latest_rate(&self, base: &CurrencyCode, quote: &CurrencyCode) -> Result<FxRate, FxRateError> {
        self.db.latest_rate(base, quote).await
    }

    pub async fn set_rate(&self, rate: NewFxRate) -> Result<(), FxRateError> {
        self.db.set_rate(rate).await
    }
}
