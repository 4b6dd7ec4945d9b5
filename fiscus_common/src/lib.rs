mod currency;
mod money;

pub mod op;

pub use currency::{CurrencyCode, CurrencyCodeError};
pub use money::{MinorUnits, MoneyConversionError};
