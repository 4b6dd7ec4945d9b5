use anyhow::Context;
use chrono::{DateTime, Utc};
use fiscus_common::CurrencyCode;
use fiscus_ledger_engine::{db_types::NewFxRate, FxApi};

use crate::{check::connect, RateGetParams, RateSetParams};

fn parse_pair(base: &str, quote: &str) -> anyhow::Result<(CurrencyCode, CurrencyCode)> {
    let base = base.parse::<CurrencyCode>().with_context(|| format!("'{base}' is not a currency code"))?;
    let quote = quote.parse::<CurrencyCode>().with_context(|| format!("'{quote}' is not a currency code"))?;
    Ok((base, quote))
}

fn parse_as_of(value: Option<&str>) -> anyhow::Result<Option<DateTime<Utc>>> {
    value.map(|v| v.parse().with_context(|| format!("'{v}' is not an RFC 3339 timestamp"))).transpose()
}

pub async fn get_rate(database_url: Option<&str>, params: RateGetParams) -> anyhow::Result<()> {
    let (base, quote) = parse_pair(&params.base, &params.quote)?;
    let db = connect(database_url).await?;
    let api = FxApi::new(db.clone());
    match parse_as_of(params.as_of.as_deref())? {
        Some(as_of) => {
            let rate = api.rate_for(&base, &quote, as_of).await?;
            println!("1 {base} = {rate} {quote} (as of {as_of})");
        },
        None => {
            let rate = api.fetch_latest_rate(&base, &quote).await?;
            println!("1 {base} = {} {quote} (observed {})", rate.rate, rate.as_of);
        },
    }
    db.close().await;
    Ok(())
}

pub async fn set_rate(database_url: Option<&str>, params: RateSetParams) -> anyhow::Result<()> {
    let (base, quote) = parse_pair(&params.base, &params.quote)?;
    let as_of = parse_as_of(params.as_of.as_deref())?.unwrap_or_else(Utc::now);
    let db = connect(database_url).await?;
    let api = FxApi::new(db.clone());
    api.set_rate(NewFxRate { base_currency: base.clone(), quote_currency: quote.clone(), rate: params.rate, as_of })
        .await?;
    println!("Stored: 1 {base} = {} {quote} as of {as_of}", params.rate);
    db.close().await;
    Ok(())
}
