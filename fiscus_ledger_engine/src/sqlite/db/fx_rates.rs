use chrono::{DateTime, Utc};
use fiscus_common::CurrencyCode;
use sqlx::SqliteConnection;

use crate::{
    db_types::{FxRate, NewFxRate},
    traits::FxRateError,
};

/// The newest observation with `as_of` on or before the requested date. A missing rate is an
/// error; the caller decides whether to fall back to the latest known rate or abort.
pub async fn rate_on(
    base: &CurrencyCode,
    quote: &CurrencyCode,
    as_of: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<FxRate, FxRateError> {
    let rate = sqlx::query_as(
        r#"SELECT * FROM fx_rates
           WHERE base_currency = $1 AND quote_currency = $2 AND as_of <= $3
           ORDER BY as_of DESC LIMIT 1"#,
    )
    .bind(base.as_str())
    .bind(quote.as_str())
    .bind(as_of)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| FxRateError::Unavailable { base: base.clone(), quote: quote.clone(), as_of })?;
    Ok(rate)
}

pub async fn latest_rate(
    base: &CurrencyCode,
    quote: &CurrencyCode,
    conn: &mut SqliteConnection,
) -> Result<FxRate, FxRateError> {
    let rate = sqlx::query_as(
        "SELECT * FROM fx_rates WHERE base_currency = $1 AND quote_currency = $2 ORDER BY as_of DESC LIMIT 1",
    )
    .bind(base.as_str())
    .bind(quote.as_str())
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| FxRateError::Unavailable { base: base.clone(), quote: quote.clone(), as_of: Utc::now() })?;
    Ok(rate)
}

pub async fn set_rate(rate: NewFxRate, conn: &mut SqliteConnection) -> Result<(), FxRateError> {
    sqlx::query("INSERT INTO fx_rates (base_currency, quote_currency, rate, as_of) VALUES ($1, $2, $3, $4)")
        .bind(rate.base_currency)
        .bind(rate.quote_currency)
        .bind(rate.rate)
        .bind(rate.as_of)
        .execute(conn)
        .await?;
    Ok(())
}
