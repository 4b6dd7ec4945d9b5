//! The fee and tip calculator.
//!
//! Pure functions from an order plus host configuration to the fee fields a ledger entry carries.
//! All results are minor units; the only floating point is the transient rate math inside
//! [`MinorUnits::convert`]. Fees come out **negative** (they are outflows, on both legs) no
//! matter what sign the processor reported them with.
use fiscus_common::{CurrencyCode, MinorUnits, MoneyConversionError};

use crate::db_types::{Collective, Order};

/// Everything the ledger needs to book one settled contribution.
#[derive(Debug, Clone)]
pub struct FeeBreakdown {
    /// Contribution principal in the order currency: total minus tip.
    pub principal: MinorUnits,
    /// Platform tip in the order currency, booked as its own pair.
    pub tip: MinorUnits,
    pub currency: CurrencyCode,
    pub host_currency: CurrencyCode,
    pub fx_rate: f64,
    pub amount_in_host_currency: MinorUnits,
    pub platform_fee_in_host_currency: MinorUnits,
    pub host_fee_in_host_currency: MinorUnits,
    pub payment_processor_fee_in_host_currency: MinorUnits,
    pub tax_amount: MinorUnits,
    pub net_amount_in_collective_currency: MinorUnits,
    /// The platform's cut of the host fee. A settlement figure carried alongside the ledger, not
    /// a ledger kind of its own until it is actually settled.
    pub host_fee_share: MinorUnits,
}

/// Fees are outflows: whatever sign the processor reported, the stored value is `-abs`.
pub fn normalize_fee(reported: MinorUnits) -> MinorUnits {
    -reported.abs()
}

/// Host fee on a contribution, as a negative host-currency amount.
///
/// Independent (self-hosted) collectives never pay a host fee; that is an enforced invariant
/// here, not a default the configuration could override.
pub fn host_fee(
    amount_in_host_currency: MinorUnits,
    collective: &Collective,
    host: &Collective,
) -> Result<MinorUnits, MoneyConversionError> {
    if collective.is_independent() {
        return Ok(MinorUnits::ZERO);
    }
    let percent = collective.host_fee_percent.or(host.host_fee_percent).unwrap_or(0.0);
    Ok(-amount_in_host_currency.percent(percent)?.abs())
}

/// The explicit tip on the order; zero when absent or nonsensical.
pub fn platform_tip(order: &Order) -> MinorUnits {
    if order.platform_tip_amount.is_negative() {
        MinorUnits::ZERO
    } else {
        order.platform_tip_amount
    }
}

/// Shared-revenue figure: the platform's percentage of a (negative) host fee, returned positive.
pub fn host_fee_share(host_fee: MinorUnits, share_percent: f64) -> Result<MinorUnits, MoneyConversionError> {
    host_fee.abs().percent(share_percent)
}

/// Computes the full breakdown for a settled contribution.
///
/// `fx_rate` converts the order currency into the host currency and must be 1.0 when they are
/// equal. `reported_processor_fee` is taken at face value in host currency but its sign is not.
pub fn contribution_fees(
    order: &Order,
    collective: &Collective,
    host: &Collective,
    fx_rate: f64,
    reported_processor_fee: MinorUnits,
    host_fee_share_percent: f64,
) -> Result<FeeBreakdown, MoneyConversionError> {
    let principal = order.principal();
    let tip = platform_tip(order);
    let amount_in_host_currency = principal.convert(fx_rate)?;
    let processor_fee = normalize_fee(reported_processor_fee);
    let host_fee = host_fee(amount_in_host_currency, collective, host)?;
    let platform_fee = MinorUnits::ZERO;
    let tax = -order.tax_amount.abs();
    let net = (amount_in_host_currency + platform_fee + host_fee + processor_fee).convert(1.0 / fx_rate)? + tax;
    let share = host_fee_share(host_fee, host_fee_share_percent)?;
    Ok(FeeBreakdown {
        principal,
        tip,
        currency: order.currency.clone(),
        host_currency: host.currency.clone(),
        fx_rate,
        amount_in_host_currency,
        platform_fee_in_host_currency: platform_fee,
        host_fee_in_host_currency: host_fee,
        payment_processor_fee_in_host_currency: processor_fee,
        tax_amount: tax,
        net_amount_in_collective_currency: net,
        host_fee_share: share,
    })
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use sqlx::types::Json;

    use super::*;
    use crate::db_types::OrderStatus;

    fn collective(id: i64, host_id: Option<i64>, fee_percent: Option<f64>, currency: &str) -> Collective {
        Collective {
            id,
            slug: format!("c{id}"),
            name: format!("c{id}"),
            currency: currency.parse().unwrap(),
            host_collective_id: host_id,
            host_fee_percent: fee_percent,
            is_host: false,
            is_platform: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    fn order(total: i64, tip: i64, currency: &str) -> Order {
        Order {
            id: 1,
            collective_id: 1,
            from_collective_id: 2,
            created_by_user_id: 1,
            subscription_id: None,
            status: OrderStatus::New,
            currency: currency.parse().unwrap(),
            total_amount: MinorUnits::from(total),
            platform_tip_amount: MinorUnits::from(tip),
            tax_amount: MinorUnits::ZERO,
            payment_method_id: None,
            processor: None,
            payment_intent_id: None,
            payment_intent_status: None,
            intent_history: Json(vec![]),
            charge_id: None,
            processed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn simple_contribution_breakdown() {
        // 1000 minor units, currency == host currency, 10% host fee.
        let c = collective(1, Some(9), None, "USD");
        let host = collective(9, None, Some(10.0), "USD");
        let fees = contribution_fees(&order(1000, 0, "USD"), &c, &host, 1.0, MinorUnits::ZERO, 0.0).unwrap();
        assert_eq!(fees.principal, MinorUnits::from(1000));
        assert_eq!(fees.amount_in_host_currency, MinorUnits::from(1000));
        assert_eq!(fees.host_fee_in_host_currency, MinorUnits::from(-100));
        assert_eq!(fees.net_amount_in_collective_currency, MinorUnits::from(900));
    }

    #[test]
    fn tip_is_split_out_of_the_principal() {
        let c = collective(1, Some(9), None, "USD");
        let host = collective(9, None, Some(5.0), "USD");
        let fees = contribution_fees(&order(1100, 100, "USD"), &c, &host, 1.0, MinorUnits::ZERO, 0.0).unwrap();
        assert_eq!(fees.principal, MinorUnits::from(1000));
        assert_eq!(fees.tip, MinorUnits::from(100));
        assert_eq!(fees.host_fee_in_host_currency, MinorUnits::from(-50));
        assert_eq!(fees.net_amount_in_collective_currency, MinorUnits::from(950));
    }

    #[test]
    fn independent_collectives_never_pay_host_fee() {
        // Self-hosted: the collective is its own host, with a configured fee percent that must
        // be ignored.
        let c = collective(1, Some(1), Some(10.0), "USD");
        let fees = contribution_fees(&order(1000, 0, "USD"), &c, &c, 1.0, MinorUnits::ZERO, 0.0).unwrap();
        assert_eq!(fees.host_fee_in_host_currency, MinorUnits::ZERO);
        assert_eq!(fees.net_amount_in_collective_currency, MinorUnits::from(1000));
    }

    #[test]
    fn processor_fee_sign_is_forced_negative() {
        assert_eq!(normalize_fee(MinorUnits::from(59)), MinorUnits::from(-59));
        assert_eq!(normalize_fee(MinorUnits::from(-59)), MinorUnits::from(-59));

        let c = collective(1, Some(9), None, "USD");
        let host = collective(9, None, None, "USD");
        // Processor reports the fee positive; the breakdown still books it negative.
        let fees = contribution_fees(&order(1000, 0, "USD"), &c, &host, 1.0, MinorUnits::from(59), 0.0).unwrap();
        assert_eq!(fees.payment_processor_fee_in_host_currency, MinorUnits::from(-59));
        assert_eq!(fees.net_amount_in_collective_currency, MinorUnits::from(941));
    }

    #[test]
    fn cross_currency_amounts_round_half_away_from_zero() {
        let c = collective(1, Some(9), None, "EUR");
        let host = collective(9, None, Some(10.0), "USD");
        let fees = contribution_fees(&order(1001, 0, "EUR"), &c, &host, 1.1, MinorUnits::ZERO, 0.0).unwrap();
        // 1001 * 1.1 = 1101.1 -> 1101
        assert_eq!(fees.amount_in_host_currency, MinorUnits::from(1101));
        // 10% of 1101 = 110.1 -> 110
        assert_eq!(fees.host_fee_in_host_currency, MinorUnits::from(-110));
        // (1101 - 110) / 1.1 = 900.9... -> 901
        assert_eq!(fees.net_amount_in_collective_currency, MinorUnits::from(901));
    }

    #[test]
    fn host_fee_share_is_an_aux_positive_figure() {
        let share = host_fee_share(MinorUnits::from(-100), 15.0).unwrap();
        assert_eq!(share, MinorUnits::from(15));
    }

    #[test]
    fn collective_override_beats_host_default() {
        let c = collective(1, Some(9), Some(2.5), "USD");
        let host = collective(9, None, Some(10.0), "USD");
        let fee = host_fee(MinorUnits::from(1000), &c, &host).unwrap();
        assert_eq!(fee, MinorUnits::from(-25));
    }
}
