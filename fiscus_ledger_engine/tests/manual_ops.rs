//! Operator-initiated ledger movements: added funds, transfers, refunds, voids.
mod support;

use fiscus_common::MinorUnits;
use fiscus_ledger_engine::{
    db_types::{LedgerEntryKind, NewCollective, Provenance},
    events::EventProducers,
    traits::{LedgerDatabase, LedgerError, SettlementOutcome},
    EventOutcome,
    LedgerApi,
    ReconciliationApi,
};
use support::{fixture, succeeded};

#[tokio::test]
async fn added_funds_credit_the_collective() {
    let fx = fixture().await;
    let api = LedgerApi::new(fx.db.clone());
    let pair = api
        .record_added_funds(
            fx.collective.id,
            fx.host.id,
            fx.host.id,
            MinorUnits::from(2500),
            "USD".parse().unwrap(),
            "cheque deposit, ref 4471",
            fx.user.id,
        )
        .await
        .unwrap();

    assert_eq!(pair.credit.kind, LedgerEntryKind::AddedFunds);
    assert_eq!(pair.credit.amount, MinorUnits::from(2500));
    assert_eq!(pair.credit.net_amount_in_collective_currency, MinorUnits::from(2500));
    assert_eq!(pair.debit.amount, MinorUnits::from(-2500));
    assert!(matches!(&*pair.credit.provenance, Provenance::Manual { created_by, .. } if *created_by == fx.user.id));
    assert_eq!(api.balance(fx.collective.id).await.unwrap(), MinorUnits::from(2500));

    fx.tear_down().await;
}

#[tokio::test]
async fn balance_transfers_move_funds_within_a_host() {
    let fx = fixture().await;
    let usd = "USD".parse().unwrap();
    let sibling = fx
        .db
        .insert_collective(NewCollective { host_collective_id: Some(fx.host.id), ..NewCollective::new("zine-fund", usd) })
        .await
        .unwrap();
    let api = LedgerApi::new(fx.db.clone());
    api.record_added_funds(
        fx.collective.id,
        fx.host.id,
        fx.host.id,
        MinorUnits::from(2500),
        "USD".parse().unwrap(),
        "seed",
        fx.user.id,
    )
    .await
    .unwrap();

    let pair = api
        .record_balance_transfer(
            fx.collective.id,
            sibling.id,
            fx.host.id,
            MinorUnits::from(600),
            "USD".parse().unwrap(),
            "shared sticker print run",
            fx.user.id,
        )
        .await
        .unwrap();

    assert_eq!(pair.credit.kind, LedgerEntryKind::BalanceTransfer);
    assert!(pair.credit.is_internal);
    assert_eq!(api.balance(fx.collective.id).await.unwrap(), MinorUnits::from(1900));
    assert_eq!(api.balance(sibling.id).await.unwrap(), MinorUnits::from(600));

    fx.tear_down().await;
}

#[tokio::test]
async fn partial_fee_refunds_are_topped_up_by_the_host() {
    let fx = fixture().await;
    let recon = ReconciliationApi::new(fx.db.clone(), EventProducers::default());
    fx.order(1000, 0, "pi_900").await;
    let outcome = recon.process_event(succeeded("pi_900", "ch_900", 30)).await.unwrap();
    let EventOutcome::Settlement(SettlementOutcome::Settled { contribution, .. }) = outcome else {
        panic!("expected a settlement");
    };

    // The processor returned 20 of its 30 fee; the host covers the remaining 10.
    let api = LedgerApi::new(fx.db.clone());
    let outcome = api.issue_refund(contribution.credit.id, MinorUnits::from(20)).await.unwrap();
    assert_eq!(outcome.refund.debit.net_amount_in_collective_currency, MinorUnits::from(-880));
    assert_eq!(outcome.refund.debit.payment_processor_fee_in_host_currency, MinorUnits::from(-20));
    let cover = outcome.cover.expect("host should cover the fee shortfall");
    assert_eq!(cover.credit.kind, LedgerEntryKind::PaymentProcessorCover);
    assert_eq!(cover.credit.amount, MinorUnits::from(10));
    assert_eq!(api.balance(fx.collective.id).await.unwrap(), MinorUnits::ZERO);

    // The originals are linked, not deleted, and a second refund is refused.
    let original = fx.db.fetch_entry(contribution.credit.id).await.unwrap();
    assert_eq!(original.refund_entry_id, Some(outcome.refund.debit.id));
    let err = api.issue_refund(contribution.credit.id, MinorUnits::from(20)).await.unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyRefunded(_)));

    fx.tear_down().await;
}

#[tokio::test]
async fn voided_groups_drop_out_of_the_balance() {
    let fx = fixture().await;
    let api = LedgerApi::new(fx.db.clone());
    let pair = api
        .record_added_funds(
            fx.collective.id,
            fx.host.id,
            fx.host.id,
            MinorUnits::from(2500),
            "USD".parse().unwrap(),
            "fat-fingered amount",
            fx.user.id,
        )
        .await
        .unwrap();

    let voided = api.void_group(pair.group()).await.unwrap();
    assert_eq!(voided, 2);
    assert_eq!(api.balance(fx.collective.id).await.unwrap(), MinorUnits::ZERO);
    // History keeps the rows; only the balance forgets them.
    let rows = api.entries_for_group(pair.group()).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|e| e.deleted_at.is_some()));

    fx.tear_down().await;
}
