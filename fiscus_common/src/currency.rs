use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

//--------------------------------------    CurrencyCode      --------------------------------------------------------
/// A three-letter ISO-4217 style currency code ("USD", "EUR", ...).
///
/// Stored uppercase. Parsing rejects anything that is not exactly three ASCII letters.
#[derive(Debug, Clone, Type, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct CurrencyCode(String);

#[derive(Debug, Clone, Error)]
#[error("Invalid currency code: {0}")]
pub struct CurrencyCodeError(String);

impl CurrencyCode {
    pub fn new<S: AsRef<str>>(code: S) -> Result<Self, CurrencyCodeError> {
        let code = code.as_ref().trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CurrencyCodeError(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CurrencyCode {
    type Err = CurrencyCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_and_uppercases() {
        assert_eq!(CurrencyCode::new("usd").unwrap().as_str(), "USD");
        assert_eq!("EUR".parse::<CurrencyCode>().unwrap().as_str(), "EUR");
        assert_eq!(" jpy ".parse::<CurrencyCode>().unwrap().as_str(), "JPY");
    }

    #[test]
    fn rejects_malformed_codes() {
        assert!(CurrencyCode::new("").is_err());
        assert!(CurrencyCode::new("US").is_err());
        assert!(CurrencyCode::new("USDT").is_err());
        assert!(CurrencyCode::new("U5D").is_err());
    }
}
