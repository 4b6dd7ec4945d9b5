//! Consistency checker and exchange rate store behaviour.
mod support;

use chrono::{Duration, Utc};
use fiscus_ledger_engine::{
    checks::run_all_checks,
    db_types::NewFxRate,
    events::EventProducers,
    traits::{FxRateError, SettlementOutcome},
    EventOutcome,
    FxApi,
    ReconciliationApi,
};
use support::{fixture, succeeded};

#[tokio::test]
async fn fx_lookups_are_as_of_dated() {
    let fx = fixture().await;
    let api = FxApi::new(fx.db.clone());
    let usd: fiscus_common::CurrencyCode = "USD".parse().unwrap();
    let eur: fiscus_common::CurrencyCode = "EUR".parse().unwrap();
    let t1 = Utc::now() - Duration::days(10);
    let t2 = Utc::now() - Duration::days(2);
    api.set_rate(NewFxRate { base_currency: usd.clone(), quote_currency: eur.clone(), rate: 0.90, as_of: t1 })
        .await
        .unwrap();
    api.set_rate(NewFxRate { base_currency: usd.clone(), quote_currency: eur.clone(), rate: 0.95, as_of: t2 })
        .await
        .unwrap();

    // A date between the two observations sees the older one.
    let mid = Utc::now() - Duration::days(5);
    assert_eq!(api.rate_for(&usd, &eur, mid).await.unwrap(), 0.90);
    assert_eq!(api.rate_for(&usd, &eur, Utc::now()).await.unwrap(), 0.95);
    assert_eq!(api.fetch_latest_rate(&usd, &eur).await.unwrap().rate, 0.95);

    // No observation existed that far back; the engine never guesses.
    let too_early = Utc::now() - Duration::days(30);
    let err = api.rate_for(&usd, &eur, too_early).await.unwrap_err();
    assert!(matches!(err, FxRateError::Unavailable { .. }));

    // The inverse pair is a separate series, not implied.
    let err = api.rate_for(&eur, &usd, Utc::now()).await.unwrap_err();
    assert!(matches!(err, FxRateError::Unavailable { .. }));

    // Identical currencies never hit the store.
    let zar: fiscus_common::CurrencyCode = "ZAR".parse().unwrap();
    assert_eq!(api.rate_for(&zar, &zar, too_early).await.unwrap(), 1.0);

    fx.tear_down().await;
}

#[tokio::test]
async fn clean_ledger_passes_every_check() {
    let fx = fixture().await;
    let api = ReconciliationApi::new(fx.db.clone(), EventProducers::default());
    fx.order(1000, 100, "pi_800").await;
    let outcome = api.process_event(succeeded("pi_800", "ch_800", 30)).await.unwrap();
    assert!(matches!(outcome, EventOutcome::Settlement(SettlementOutcome::Settled { .. })));

    let report = run_all_checks(&fx.db, false).await.unwrap();
    assert_eq!(report.outcomes.len(), 8);
    assert_eq!(report.total_violations(), 0);
    assert!(report.is_clean());

    fx.tear_down().await;
}

#[tokio::test]
async fn fixable_violations_are_repaired_exactly_once() {
    let fx = fixture().await;
    let api = ReconciliationApi::new(fx.db.clone(), EventProducers::default());
    fx.order(1000, 0, "pi_810").await;
    api.process_event(succeeded("pi_810", "ch_810", 30)).await.unwrap();

    // Damage the order and plant a mismatched payment method on the hosted collective.
    sqlx::query("UPDATE orders SET processed_at = NULL WHERE status = 'Paid'")
        .execute(fx.db.pool())
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO payment_methods (processor, processor_ref, collective_id, currency, saved) \
         VALUES ('Stripe', 'pm_810', $1, 'EUR', 1)",
    )
    .bind(fx.collective.id)
    .execute(fx.db.pool())
    .await
    .unwrap();

    let report = run_all_checks(&fx.db, false).await.unwrap();
    assert_eq!(report.total_violations(), 2);
    assert_eq!(report.total_fixed(), 0);

    let report = run_all_checks(&fx.db, true).await.unwrap();
    assert_eq!(report.total_violations(), 2);
    assert_eq!(report.total_fixed(), 2);
    assert!(report.is_clean());

    // Fixes are conditional updates: a second fixing run has nothing left to touch.
    let report = run_all_checks(&fx.db, true).await.unwrap();
    assert_eq!(report.total_violations(), 0);
    assert_eq!(report.total_fixed(), 0);

    fx.tear_down().await;
}

#[tokio::test]
async fn unfixable_violations_are_reported_but_untouched() {
    let fx = fixture().await;
    let api = ReconciliationApi::new(fx.db.clone(), EventProducers::default());
    fx.order(1000, 0, "pi_820").await;
    api.process_event(succeeded("pi_820", "ch_820", 30)).await.unwrap();

    // Soft-delete the collective out from under its live ledger rows.
    sqlx::query("UPDATE collectives SET deleted_at = CURRENT_TIMESTAMP WHERE id = $1")
        .bind(fx.collective.id)
        .execute(fx.db.pool())
        .await
        .unwrap();

    let report = run_all_checks(&fx.db, true).await.unwrap();
    let outcome = report.outcomes.iter().find(|o| o.name == "entries_for_deleted_collectives").unwrap();
    assert!(outcome.stats.violations > 0);
    assert_eq!(outcome.stats.fixed, 0);
    assert!(!report.is_clean());

    fx.tear_down().await;
}

#[tokio::test]
async fn duplicate_one_time_contributions_are_flagged() {
    let fx = fixture().await;
    let api = ReconciliationApi::new(fx.db.clone(), EventProducers::default());
    let order = fx.order(1000, 0, "pi_830").await;
    api.process_event(succeeded("pi_830", "ch_830", 30)).await.unwrap();

    // A second live Credit Contribution for the same one-time order, as a bad import would leave.
    sqlx::query(
        "INSERT INTO ledger (uuid, entry_type, kind, transaction_group, collective_id, from_collective_id, \
         host_collective_id, order_id, amount, currency, host_currency, host_currency_fx_rate, \
         amount_in_host_currency, net_amount_in_collective_currency, platform_fee_in_host_currency, \
         host_fee_in_host_currency, payment_processor_fee_in_host_currency, tax_amount, is_refund, provenance) \
         SELECT 'dup-830', entry_type, kind, 'grp-dup-830', collective_id, from_collective_id, host_collective_id, \
         order_id, amount, currency, host_currency, host_currency_fx_rate, amount_in_host_currency, \
         net_amount_in_collective_currency, platform_fee_in_host_currency, host_fee_in_host_currency, \
         payment_processor_fee_in_host_currency, tax_amount, is_refund, provenance \
         FROM ledger WHERE order_id = $1 AND entry_type = 'Credit' AND kind = 'Contribution'",
    )
    .bind(order.id)
    .execute(fx.db.pool())
    .await
    .unwrap();

    let report = run_all_checks(&fx.db, false).await.unwrap();
    let outcome = report.outcomes.iter().find(|o| o.name == "duplicate_one_time_contribution").unwrap();
    assert_eq!(outcome.stats.violations, 1);

    fx.tear_down().await;
}

#[tokio::test]
async fn triple_primary_rows_in_one_group_are_flagged() {
    let fx = fixture().await;
    let api = ReconciliationApi::new(fx.db.clone(), EventProducers::default());
    let order = fx.order(1000, 0, "pi_840").await;
    api.process_event(succeeded("pi_840", "ch_840", 30)).await.unwrap();

    // A third live Contribution row in the settled pair's group, as a botched import would leave.
    sqlx::query(
        "INSERT INTO ledger (uuid, entry_type, kind, transaction_group, collective_id, from_collective_id, \
         host_collective_id, order_id, amount, currency, host_currency, host_currency_fx_rate, \
         amount_in_host_currency, net_amount_in_collective_currency, platform_fee_in_host_currency, \
         host_fee_in_host_currency, payment_processor_fee_in_host_currency, tax_amount, is_refund, provenance) \
         SELECT 'dup-840', entry_type, kind, transaction_group, collective_id, from_collective_id, \
         host_collective_id, order_id, amount, currency, host_currency, host_currency_fx_rate, \
         amount_in_host_currency, net_amount_in_collective_currency, platform_fee_in_host_currency, \
         host_fee_in_host_currency, payment_processor_fee_in_host_currency, tax_amount, is_refund, provenance \
         FROM ledger WHERE order_id = $1 AND entry_type = 'Credit' AND kind = 'Contribution'",
    )
    .bind(order.id)
    .execute(fx.db.pool())
    .await
    .unwrap();

    // One offending group; there is no mechanical fix for it.
    let report = run_all_checks(&fx.db, true).await.unwrap();
    let outcome = report.outcomes.iter().find(|o| o.name == "duplicate_primary_in_group").unwrap();
    assert_eq!(outcome.stats.violations, 1);
    assert_eq!(outcome.stats.fixed, 0);

    fx.tear_down().await;
}

#[tokio::test]
async fn duplicate_uuids_among_live_rows_are_flagged() {
    let fx = fixture().await;
    let api = ReconciliationApi::new(fx.db.clone(), EventProducers::default());
    let order = fx.order(1000, 0, "pi_850").await;
    api.process_event(succeeded("pi_850", "ch_850", 30)).await.unwrap();

    // A store imported without the uuid guard can hold live duplicates; recreate that state.
    sqlx::query("DROP INDEX idx_ledger_uuid_live").execute(fx.db.pool()).await.unwrap();
    sqlx::query(
        "INSERT INTO ledger (uuid, entry_type, kind, transaction_group, collective_id, from_collective_id, \
         host_collective_id, order_id, amount, currency, host_currency, host_currency_fx_rate, \
         amount_in_host_currency, net_amount_in_collective_currency, platform_fee_in_host_currency, \
         host_fee_in_host_currency, payment_processor_fee_in_host_currency, tax_amount, is_refund, provenance) \
         SELECT uuid, entry_type, kind, 'grp-uuid-850', collective_id, from_collective_id, \
         host_collective_id, order_id, amount, currency, host_currency, host_currency_fx_rate, \
         amount_in_host_currency, net_amount_in_collective_currency, platform_fee_in_host_currency, \
         host_fee_in_host_currency, payment_processor_fee_in_host_currency, tax_amount, is_refund, provenance \
         FROM ledger WHERE order_id = $1 AND entry_type = 'Credit' AND kind = 'Contribution'",
    )
    .bind(order.id)
    .execute(fx.db.pool())
    .await
    .unwrap();

    let report = run_all_checks(&fx.db, false).await.unwrap();
    let outcome = report.outcomes.iter().find(|o| o.name == "duplicate_entry_uuid").unwrap();
    assert_eq!(outcome.stats.violations, 1);

    fx.tear_down().await;
}

#[tokio::test]
async fn orphaned_secondary_entries_are_flagged_after_the_cutover_only() {
    let fx = fixture().await;

    // A live HostFee with no primary left in its group, written today.
    sqlx::query(
        "INSERT INTO ledger (uuid, entry_type, kind, transaction_group, collective_id, from_collective_id, \
         host_collective_id, amount, currency, host_currency, amount_in_host_currency, \
         net_amount_in_collective_currency, provenance) \
         VALUES ('orphan-860', 'Debit', 'HostFee', 'grp-orphan-860', $1, $1, $2, -100, 'USD', 'USD', -100, -100, \
         '{\"source\":\"manual\",\"note\":\"import\",\"created_by\":1}')",
    )
    .bind(fx.collective.id)
    .bind(fx.host.id)
    .execute(fx.db.pool())
    .await
    .unwrap();
    // The same shape predating the paired-write guarantee is legacy data, not a violation.
    sqlx::query(
        "INSERT INTO ledger (uuid, entry_type, kind, transaction_group, collective_id, from_collective_id, \
         host_collective_id, amount, currency, host_currency, amount_in_host_currency, \
         net_amount_in_collective_currency, provenance, created_at) \
         VALUES ('orphan-861', 'Debit', 'HostFee', 'grp-orphan-861', $1, $1, $2, -100, 'USD', 'USD', -100, -100, \
         '{\"source\":\"manual\",\"note\":\"import\",\"created_by\":1}', '2023-06-01 00:00:00')",
    )
    .bind(fx.collective.id)
    .bind(fx.host.id)
    .execute(fx.db.pool())
    .await
    .unwrap();

    let report = run_all_checks(&fx.db, false).await.unwrap();
    let outcome = report.outcomes.iter().find(|o| o.name == "orphaned_secondary_entries").unwrap();
    assert_eq!(outcome.stats.violations, 1);

    fx.tear_down().await;
}

#[tokio::test]
async fn paid_orders_with_only_voided_entries_are_retired() {
    let fx = fixture().await;
    let api = ReconciliationApi::new(fx.db.clone(), EventProducers::default());
    let order = fx.order(1000, 0, "pi_870").await;
    api.process_event(succeeded("pi_870", "ch_870", 30)).await.unwrap();

    // Void every leg the settlement wrote, leaving the Paid order pointing at nothing.
    sqlx::query("UPDATE ledger SET deleted_at = CURRENT_TIMESTAMP WHERE order_id = $1")
        .bind(order.id)
        .execute(fx.db.pool())
        .await
        .unwrap();

    let report = run_all_checks(&fx.db, false).await.unwrap();
    let outcome = report.outcomes.iter().find(|o| o.name == "paid_order_with_only_deleted_entries").unwrap();
    assert_eq!(outcome.stats.violations, 1);
    assert_eq!(outcome.stats.fixed, 0);

    // Fixing soft-deletes the order; the next run finds nothing left.
    let report = run_all_checks(&fx.db, true).await.unwrap();
    let outcome = report.outcomes.iter().find(|o| o.name == "paid_order_with_only_deleted_entries").unwrap();
    assert_eq!(outcome.stats.violations, 1);
    assert_eq!(outcome.stats.fixed, 1);
    let retired: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE id = $1 AND deleted_at IS NOT NULL")
            .bind(order.id)
            .fetch_one(fx.db.pool())
            .await
            .unwrap();
    assert_eq!(retired, 1);

    let report = run_all_checks(&fx.db, true).await.unwrap();
    let outcome = report.outcomes.iter().find(|o| o.name == "paid_order_with_only_deleted_entries").unwrap();
    assert_eq!(outcome.stats.violations, 0);
    assert_eq!(outcome.stats.fixed, 0);

    fx.tear_down().await;
}
