//! End-to-end reconciliation of contribution charges against a live SQLite store.
mod support;

use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
};

use fiscus_common::MinorUnits;
use fiscus_ledger_engine::{
    db_types::{EntryType, LedgerEntryKind, OrderStatus},
    events::{EventHandlers, EventHooks, EventProducers},
    traits::{EventPayload, LedgerDatabase, ProcessorEventKind, SettlementOutcome},
    EventOutcome,
    ReconciliationApi,
    SqliteDatabase,
};
use log::*;
use support::{event, fixture, succeeded};

fn api(db: SqliteDatabase) -> ReconciliationApi<SqliteDatabase> {
    ReconciliationApi::new(db, EventProducers::default())
}

#[tokio::test]
async fn contribution_settles_into_a_fee_bearing_double_entry() {
    let fx = fixture().await;
    let api = api(fx.db.clone());
    let order = fx.order(1100, 100, "pi_100").await;

    let processing = event(ProcessorEventKind::IntentProcessing, "pi_100", EventPayload {
        payment_method_ref: Some("pm_100".to_string()),
        ..EventPayload::default()
    });
    let outcome = api.process_event(processing).await.expect("processing event failed");
    let EventOutcome::OrderUpdated(updated) = outcome else {
        panic!("expected an order update");
    };
    assert_eq!(updated.status, OrderStatus::Processing);
    assert!(updated.payment_method_id.is_some());

    let outcome = api.process_event(succeeded("pi_100", "ch_100", 30)).await.expect("succeeded event failed");
    let EventOutcome::Settlement(SettlementOutcome::Settled { order: settled, contribution, tip }) = outcome else {
        panic!("expected a settlement");
    };
    assert_eq!(settled.id, order.id);
    assert_eq!(settled.status, OrderStatus::Paid);
    assert_eq!(settled.charge_id.as_deref(), Some("ch_100"));
    assert!(settled.processed_at.is_some());

    // Principal 1000 at a 10% host fee and a 30c processor fee nets 870 to the collective.
    let credit = &contribution.credit;
    assert_eq!(credit.entry_type, EntryType::Credit);
    assert_eq!(credit.kind, LedgerEntryKind::Contribution);
    assert_eq!(credit.amount, MinorUnits::from(1000));
    assert_eq!(credit.host_fee_in_host_currency, MinorUnits::from(-100));
    assert_eq!(credit.payment_processor_fee_in_host_currency, MinorUnits::from(-30));
    assert_eq!(credit.net_amount_in_collective_currency, MinorUnits::from(870));
    assert_eq!(contribution.debit.amount, MinorUnits::from(-1000));
    assert_eq!(contribution.debit.collective_id, fx.contributor.id);
    // The debit mirror carries the same non-positive fee columns as the credit leg.
    assert_eq!(contribution.debit.host_fee_in_host_currency, MinorUnits::from(-100));
    assert_eq!(contribution.debit.payment_processor_fee_in_host_currency, MinorUnits::from(-30));
    assert_eq!(contribution.debit.net_amount_in_collective_currency, MinorUnits::from(-870));

    // The tip is its own pair, in the same group, credited to the platform.
    let tip = tip.expect("tip pair missing");
    assert_eq!(tip.credit.kind, LedgerEntryKind::PlatformTip);
    assert_eq!(tip.credit.amount, MinorUnits::from(100));
    assert_eq!(tip.credit.collective_id, fx.platform.id);
    assert_eq!(tip.group(), contribution.group());

    assert_eq!(fx.db.collective_balance(fx.collective.id).await.unwrap(), MinorUnits::from(870));
    assert_eq!(fx.db.collective_balance(fx.platform.id).await.unwrap(), MinorUnits::from(100));

    // Settling also records the contributor as a backer of the collective.
    let members = fx.db.fetch_members(fx.collective.id).await.unwrap();
    assert!(members.iter().any(|m| m.member_collective_id == fx.contributor.id && m.role == "Backer"));

    fx.tear_down().await;
}

#[tokio::test]
async fn replayed_charge_writes_nothing() {
    let fx = fixture().await;
    let api = api(fx.db.clone());
    fx.order(1000, 0, "pi_200").await;

    let first = api.process_event(succeeded("pi_200", "ch_200", 30)).await.unwrap();
    assert!(matches!(first, EventOutcome::Settlement(SettlementOutcome::Settled { .. })));
    let balance = fx.db.collective_balance(fx.collective.id).await.unwrap();

    let replay = api.process_event(succeeded("pi_200", "ch_200", 30)).await.unwrap();
    let EventOutcome::Settlement(SettlementOutcome::AlreadyRecorded(order)) = replay else {
        panic!("expected the replay to be dropped");
    };
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(fx.db.collective_balance(fx.collective.id).await.unwrap(), balance);

    fx.tear_down().await;
}

#[tokio::test]
async fn succeeded_before_processing_is_tolerated() {
    let fx = fixture().await;
    let api = api(fx.db.clone());
    let order = fx.order(1000, 0, "pi_300").await;

    let outcome = api.process_event(succeeded("pi_300", "ch_300", 0)).await.unwrap();
    assert!(matches!(outcome, EventOutcome::Settlement(SettlementOutcome::Settled { .. })));

    // The straggling `processing` event must not demote the order.
    let processing = event(ProcessorEventKind::IntentProcessing, "pi_300", EventPayload::default());
    let EventOutcome::OrderUpdated(updated) = api.process_event(processing).await.unwrap() else {
        panic!("expected an order update");
    };
    assert_eq!(updated.id, order.id);
    assert_eq!(updated.status, OrderStatus::Paid);

    fx.tear_down().await;
}

#[tokio::test]
async fn failed_intent_moves_order_to_error() {
    let fx = fixture().await;
    let api = api(fx.db.clone());
    fx.order(1000, 0, "pi_400").await;

    let failed = event(ProcessorEventKind::IntentFailed, "pi_400", EventPayload {
        failure_message: Some("card_declined".to_string()),
        ..EventPayload::default()
    });
    let EventOutcome::OrderUpdated(order) = api.process_event(failed).await.unwrap() else {
        panic!("expected an order update");
    };
    assert_eq!(order.status, OrderStatus::Error);

    fx.tear_down().await;
}

#[tokio::test]
async fn events_for_unknown_objects_are_dropped() {
    let fx = fixture().await;
    let api = api(fx.db.clone());
    let outcome = api.process_event(succeeded("pi_somewhere_else", "ch_somewhere_else", 5)).await.unwrap();
    assert!(matches!(outcome, EventOutcome::Ignored));
    fx.tear_down().await;
}

#[tokio::test]
async fn contribution_settled_hook_fires_after_commit() {
    let fx = fixture().await;
    fx.order(1000, 0, "pi_500").await;

    let calls = Arc::new(AtomicI32::new(0));
    let counter = calls.clone();
    let mut hooks = EventHooks::default();
    hooks.on_contribution_settled(move |ev| {
        info!("🪝️ order #{} settled", ev.order.id);
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }) as Pin<Box<dyn std::future::Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(8, hooks);
    let api = ReconciliationApi::new(fx.db.clone(), handlers.producers());
    handlers.start_handlers().await;

    let outcome = api.process_event(succeeded("pi_500", "ch_500", 30)).await.unwrap();
    assert!(matches!(outcome, EventOutcome::Settlement(SettlementOutcome::Settled { .. })));
    tokio::time::sleep(tokio::time::Duration::from_millis(250)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    fx.tear_down().await;
}
