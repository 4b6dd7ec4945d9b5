//! Rapid insert-then-read cycles across the connection pool.
//!
//! Every order write commits explicitly, so the follow-up reads here land on other pooled
//! connections and must see the row at once.
mod support;

use fiscus_ledger_engine::{events::EventProducers, traits::SettlementOutcome, EventOutcome, ReconciliationApi};
use log::*;
use support::{fixture, succeeded};

const NUM_ORDERS: i64 = 40;

#[tokio::test]
async fn burst_orders_are_visible_immediately() {
    let fx = fixture().await;
    let api = ReconciliationApi::new(fx.db.clone(), EventProducers::default());

    info!("🚀️ Injecting {NUM_ORDERS} orders");
    for i in 0..NUM_ORDERS {
        let intent_id = format!("pi_burst_{i}");
        // `order` inserts the row and then attaches the intent through a fresh connection; a
        // write that is not yet visible pool-wide fails here with OrderNotFound.
        let order = fx.order(1000 + i, 0, &intent_id).await;
        let found = fx.db.fetch_order(order.id).await.expect("Error fetching order");
        assert!(found.is_some(), "order {i} not visible after insert");
        assert_eq!(found.unwrap().payment_intent_id.as_deref(), Some(intent_id.as_str()));
    }

    // Settlements resolve each intent through yet another connection.
    for i in 0..NUM_ORDERS {
        let intent_id = format!("pi_burst_{i}");
        let charge_id = format!("ch_burst_{i}");
        let outcome = api.process_event(succeeded(&intent_id, &charge_id, 30)).await.expect("settlement failed");
        assert!(
            matches!(outcome, EventOutcome::Settlement(SettlementOutcome::Settled { .. })),
            "order {i} did not settle"
        );
    }

    info!("🚀️ burst complete");
    fx.tear_down().await;
}
