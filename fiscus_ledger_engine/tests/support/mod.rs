#![allow(dead_code)]
pub mod prepare_env;

use fiscus_common::MinorUnits;
use fiscus_ledger_engine::{
    db_types::{Collective, NewCollective, NewOrder, Order, PaymentProcessor, User},
    traits::{EventPayload, LedgerDatabase, ProcessorEvent, ProcessorEventKind},
    SqliteDatabase,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use prepare_env::{prepare_test_env, random_db_path};

/// A hosted collective with its host, the platform account and a contributor, seeded into a fresh
/// database. The host charges a 10% default fee.
pub struct Fixture {
    pub db: SqliteDatabase,
    pub platform: Collective,
    pub host: Collective,
    pub collective: Collective,
    pub contributor: Collective,
    pub user: User,
}

pub async fn fixture() -> Fixture {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let usd = "USD".parse().unwrap();
    let platform = db
        .insert_collective(NewCollective { is_platform: true, ..NewCollective::new("platform", usd) })
        .await
        .expect("Error creating platform collective");
    let usd = "USD".parse().unwrap();
    let host = db
        .insert_collective(NewCollective {
            is_host: true,
            host_fee_percent: Some(10.0),
            ..NewCollective::new("big-fiscal-host", usd)
        })
        .await
        .expect("Error creating host");
    let usd = "USD".parse().unwrap();
    let collective = db
        .insert_collective(NewCollective {
            host_collective_id: Some(host.id),
            ..NewCollective::new("open-webdocs", usd)
        })
        .await
        .expect("Error creating collective");
    let usd = "USD".parse().unwrap();
    let contributor =
        db.insert_collective(NewCollective::new("alice", usd)).await.expect("Error creating contributor");
    let user = db.insert_user(contributor.id).await.expect("Error creating user");
    Fixture { db, platform, host, collective, contributor, user }
}

impl Fixture {
    /// A Stripe order from the contributor to the collective, with its checkout intent attached.
    pub async fn order(&self, total: i64, tip: i64, intent_id: &str) -> Order {
        let mut order = NewOrder::new(
            self.collective.id,
            self.contributor.id,
            self.user.id,
            MinorUnits::from(total),
            "USD".parse().unwrap(),
        );
        order.platform_tip_amount = MinorUnits::from(tip);
        order.processor = Some(PaymentProcessor::Stripe);
        let order = self.db.insert_order(order).await.expect("Error creating order");
        self.db.attach_intent(order.id, intent_id).await.expect("Error attaching intent")
    }

    pub async fn tear_down(self) {
        let url = self.db.url().to_string();
        self.db.close().await;
        if let Err(e) = Sqlite::drop_database(&url).await {
            error!("🚀️ Failed to drop test database: {e}");
        }
    }
}

pub fn event(kind: ProcessorEventKind, object_id: &str, payload: EventPayload) -> ProcessorEvent {
    ProcessorEvent { processor: PaymentProcessor::Stripe, kind, object_id: object_id.to_string(), payload }
}

pub fn succeeded(intent_id: &str, charge_id: &str, processor_fee: i64) -> ProcessorEvent {
    event(ProcessorEventKind::IntentSucceeded, intent_id, EventPayload {
        charge_id: Some(charge_id.to_string()),
        processor_fee: Some(MinorUnits::from(processor_fee)),
        ..EventPayload::default()
    })
}
