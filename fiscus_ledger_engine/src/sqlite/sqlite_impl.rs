//! `SqliteDatabase` is a concrete ledger engine backend.
//!
//! It implements every trait in the [`crate::traits`] module over a SQLite pool. The composite
//! reconciliation methods each open one transaction and push all of their writes through it, so a
//! processor event either lands whole or not at all; SQLite's single-writer model is what
//! serializes concurrent events touching the same order.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use fiscus_common::{CurrencyCode, MinorUnits};
use log::*;
use sqlx::SqlitePool;

use super::db::{
    checks,
    collectives,
    db_url,
    expenses,
    fx_rates,
    ledger,
    new_pool,
    orders,
    payment_methods,
    subscriptions,
};
use crate::{
    db_types::{
        Collective,
        DoubleEntry,
        EntryType,
        Expense,
        ExpenseStatus,
        FxRate,
        LedgerEntry,
        LedgerEntryKind,
        Member,
        NewCollective,
        NewExpense,
        NewFxRate,
        NewLedgerEntry,
        NewOrder,
        Order,
        OrderStatus,
        PaymentIntentStatus,
        PaymentMethod,
        PaymentProcessor,
        Provenance,
        RefundKind,
        Subscription,
        TransactionGroup,
        User,
    },
    traits::{
        CheckError,
        CheckStats,
        ConsistencyChecks,
        ContributionSettlement,
        ExchangeRates,
        FxRateError,
        LedgerDatabase,
        LedgerError,
        NewPaymentMethod,
        ReconciliationDatabase,
        ReconciliationError,
        RefundOutcome,
        ReviewCloseReason,
        ReviewOutcome,
        SettlementOutcome,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connect using the `FISCUS_DATABASE_URL` environment variable, or the default store path.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await
    }

    //----------------------------------- registry helpers ----------------------------------------
    // Collectives, users, orders and expenses are owned by the surrounding platform; these
    // accessors exist for operator tooling and tests, not for the reconciliation flow.

    pub async fn insert_collective(&self, collective: NewCollective) -> Result<Collective, ReconciliationError> {
        let mut tx = self.pool.begin().await?;
        let collective = collectives::insert_collective(collective, &mut tx).await?;
        tx.commit().await?;
        Ok(collective)
    }

    pub async fn fetch_platform_collective(&self) -> Result<Option<Collective>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        collectives::fetch_platform_collective(&mut conn).await
    }

    pub async fn insert_user(&self, collective_id: i64) -> Result<User, ReconciliationError> {
        let mut tx = self.pool.begin().await?;
        let user = collectives::insert_user(collective_id, &mut tx).await?;
        tx.commit().await?;
        Ok(user)
    }

    pub async fn fetch_user(&self, id: i64) -> Result<Option<User>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        collectives::fetch_user(id, &mut conn).await
    }

    pub async fn fetch_members(&self, collective_id: i64) -> Result<Vec<Member>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        collectives::fetch_members(collective_id, &mut conn).await
    }

    pub async fn insert_order(&self, order: NewOrder) -> Result<Order, ReconciliationError> {
        // An explicit commit, so the row is visible to reads on other pooled connections as soon
        // as this returns. Autocommit writes can lag behind under SQLite's WAL mode.
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    pub async fn fetch_order(&self, id: i64) -> Result<Option<Order>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(id, &mut conn).await
    }

    /// Records the payment intent created for an order at checkout, before any webhook arrives.
    /// Event lookups key on this id.
    pub async fn attach_intent(&self, order_id: i64, intent_id: &str) -> Result<Order, ReconciliationError> {
        let mut tx = self.pool.begin().await?;
        let order =
            orders::fetch_order(order_id, &mut tx).await?.ok_or(ReconciliationError::OrderNotFound(order_id))?;
        let order =
            orders::record_intent(&order, intent_id, PaymentIntentStatus::RequiresAction, order.processor, &mut tx)
                .await?;
        tx.commit().await?;
        Ok(order)
    }

    pub async fn insert_expense(&self, expense: NewExpense) -> Result<Expense, ReconciliationError> {
        let mut tx = self.pool.begin().await?;
        let expense = expenses::insert_expense(expense, &mut tx).await?;
        tx.commit().await?;
        Ok(expense)
    }

    pub async fn fetch_expense(&self, id: i64) -> Result<Option<Expense>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        expenses::fetch_expense(id, &mut conn).await
    }

    pub async fn insert_subscription(&self, interval: &str) -> Result<Subscription, ReconciliationError> {
        let mut tx = self.pool.begin().await?;
        let subscription = subscriptions::insert_subscription(interval, &mut tx).await?;
        tx.commit().await?;
        Ok(subscription)
    }

    pub async fn fetch_subscription(&self, id: i64) -> Result<Option<Subscription>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        subscriptions::fetch_subscription(id, &mut conn).await
    }

    pub async fn fetch_payment_method(&self, id: i64) -> Result<Option<PaymentMethod>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        payment_methods::fetch_payment_method(id, &mut conn).await
    }
}

//--------------------------------------   LedgerDatabase   ----------------------------------------------------------
impl LedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_double_entry(&self, entry: NewLedgerEntry) -> Result<DoubleEntry, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let pair = ledger::create_double_entry(entry, &mut tx).await?;
        tx.commit().await?;
        Ok(pair)
    }

    async fn create_single_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, LedgerError> {
        if !entry.kind.is_single_sided() {
            return Err(LedgerError::InvalidEntry(crate::traits::InvalidEntry::MissingReference(format!(
                "{} entries must be written as a double entry",
                entry.kind
            ))));
        }
        let mut tx = self.pool.begin().await?;
        let row = ledger::create_single_entry(entry, &mut tx).await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn create_refund_pair(
        &self,
        original_id: i64,
        refunded_processor_fee: MinorUnits,
        kind: RefundKind,
        group_override: Option<TransactionGroup>,
    ) -> Result<RefundOutcome, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let outcome =
            ledger::create_refund_pair(original_id, refunded_processor_fee, kind, group_override, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn soft_delete_group(&self, group: &TransactionGroup) -> Result<u64, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let voided = ledger::soft_delete_group(group, &mut tx).await?;
        tx.commit().await?;
        Ok(voided)
    }

    async fn entries_for_group(&self, group: &TransactionGroup) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        ledger::entries_for_group(group, &mut conn).await
    }

    async fn fetch_entry(&self, id: i64) -> Result<LedgerEntry, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        ledger::fetch_entry(id, &mut conn).await?.ok_or(LedgerError::EntryNotFound(id))
    }

    async fn charge_recorded(&self, processor: PaymentProcessor, charge_id: &str) -> Result<bool, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        ledger::charge_recorded(processor, charge_id, &mut conn).await
    }

    async fn collective_balance(&self, collective_id: i64) -> Result<MinorUnits, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        ledger::collective_balance(collective_id, &mut conn).await
    }
}

//--------------------------------------  ReconciliationDatabase  ----------------------------------------------------
impl ReconciliationDatabase for SqliteDatabase {
    async fn fetch_order_by_processor_object(
        &self,
        processor: PaymentProcessor,
        object_id: &str,
    ) -> Result<Option<Order>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_processor_object(processor, object_id, &mut conn).await
    }

    async fn fetch_expense_by_payout_ref(
        &self,
        processor: PaymentProcessor,
        payout_ref: &str,
    ) -> Result<Option<Expense>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        expenses::fetch_expense_by_payout_ref(processor, payout_ref, &mut conn).await
    }

    async fn fetch_collective(&self, id: i64) -> Result<Option<Collective>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        collectives::fetch_collective(id, &mut conn).await
    }

    async fn fetch_host_of(&self, collective: &Collective) -> Result<Option<Collective>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        collectives::fetch_host_of(collective, &mut conn).await
    }

    async fn mark_order_processing(
        &self,
        order_id: i64,
        intent_id: &str,
        payment_method: Option<NewPaymentMethod>,
    ) -> Result<Order, ReconciliationError> {
        let mut tx = self.pool.begin().await?;
        let order =
            orders::fetch_order(order_id, &mut tx).await?.ok_or(ReconciliationError::OrderNotFound(order_id))?;
        let processor = payment_method.as_ref().map(|m| m.processor).or(order.processor);
        let pm_id = match payment_method {
            Some(method) => Some(payment_methods::upsert_payment_method(method, &mut tx).await?.id),
            None => None,
        };
        let order = orders::record_intent(&order, intent_id, PaymentIntentStatus::Processing, processor, &mut tx).await?;
        if let Some(pm_id) = pm_id {
            orders::set_payment_method(order.id, pm_id, &mut tx).await?;
        }
        // `succeeded` may have arrived first; never demote a settled order back to Processing.
        let order = match order.status {
            OrderStatus::New | OrderStatus::Error | OrderStatus::Processing => {
                orders::update_order_status(order.id, OrderStatus::Processing, &mut tx).await?
            },
            _ => {
                debug!("🔁️ Order #{order_id} is {}; intent {intent_id} snapshot stored without a status change", order.status);
                order
            },
        };
        tx.commit().await?;
        Ok(order)
    }

    async fn record_contribution_settlement(
        &self,
        order_id: i64,
        settlement: ContributionSettlement,
    ) -> Result<SettlementOutcome, ReconciliationError> {
        let mut tx = self.pool.begin().await?;
        let order =
            orders::fetch_order(order_id, &mut tx).await?.ok_or(ReconciliationError::OrderNotFound(order_id))?;
        if ledger::charge_recorded(settlement.processor, &settlement.charge_id, &mut tx).await? {
            debug!("🔁️ Charge {} already reconciled; replay dropped", settlement.charge_id);
            tx.rollback().await?;
            return Ok(SettlementOutcome::AlreadyRecorded(order));
        }

        let pm_id = match settlement.payment_method.clone() {
            Some(method) => Some(payment_methods::upsert_payment_method(method, &mut tx).await?.id),
            None => order.payment_method_id,
        };

        let fees = settlement.fees.clone();
        let group = TransactionGroup::new();
        let provenance = Provenance::ProcessorCharge {
            processor: settlement.processor,
            charge_id: settlement.charge_id.clone(),
            intent_id: settlement.intent_id.clone(),
        };
        let mut entry = NewLedgerEntry::credit(
            LedgerEntryKind::Contribution,
            group.clone(),
            order.collective_id,
            order.from_collective_id,
            settlement.host_collective_id,
            fees.principal,
            fees.currency.clone(),
            provenance,
        );
        entry.order_id = Some(order.id);
        entry.host_currency = fees.host_currency.clone();
        entry.host_currency_fx_rate = fees.fx_rate;
        entry.amount_in_host_currency = fees.amount_in_host_currency;
        entry.net_amount_in_collective_currency = fees.net_amount_in_collective_currency;
        entry.platform_fee_in_host_currency = fees.platform_fee_in_host_currency;
        entry.host_fee_in_host_currency = fees.host_fee_in_host_currency;
        entry.payment_processor_fee_in_host_currency = fees.payment_processor_fee_in_host_currency;
        entry.tax_amount = fees.tax_amount;
        entry.processor = Some(settlement.processor);
        entry.charge_id = Some(settlement.charge_id.clone());

        let contribution = match ledger::create_double_entry(entry, &mut tx).await {
            Ok(pair) => pair,
            Err(LedgerError::ChargeAlreadyRecorded { charge_id, .. }) => {
                // A concurrent webhook won the race; the unique index is the authority.
                debug!("🔁️ Charge {charge_id} was recorded concurrently; replay dropped");
                tx.rollback().await?;
                return Ok(SettlementOutcome::AlreadyRecorded(order));
            },
            Err(e) => return Err(e.into()),
        };

        let tip = if fees.tip.is_positive() {
            match collectives::fetch_platform_collective(&mut tx).await? {
                Some(platform) => {
                    let mut tip_entry = NewLedgerEntry::credit(
                        LedgerEntryKind::PlatformTip,
                        group.clone(),
                        platform.id,
                        order.from_collective_id,
                        platform.id,
                        fees.tip,
                        fees.currency.clone(),
                        Provenance::ProcessorCharge {
                            processor: settlement.processor,
                            charge_id: settlement.charge_id.clone(),
                            intent_id: settlement.intent_id.clone(),
                        },
                    );
                    tip_entry.order_id = Some(order.id);
                    Some(ledger::create_double_entry(tip_entry, &mut tx).await?)
                },
                None => {
                    warn!("💸️ Order #{order_id} carries a tip but no platform collective exists; tip not booked");
                    None
                },
            }
        } else {
            None
        };

        let order =
            orders::mark_settled(order.id, order.settled_status(), &settlement.charge_id, pm_id, &mut tx).await?;
        if let Some(subscription_id) = order.subscription_id {
            subscriptions::touch_last_charged(subscription_id, &mut tx).await?;
            subscriptions::set_subscription_active(subscription_id, true, &mut tx).await?;
        }
        collectives::upsert_member(order.collective_id, order.from_collective_id, "Backer", &mut tx).await?;
        tx.commit().await?;
        info!(
            "💰️ Order #{order_id} settled: {} into group {} ({} fees withheld)",
            fees.principal,
            group,
            contribution.credit.total_fees_in_host_currency()
        );
        Ok(SettlementOutcome::Settled { order, contribution, tip })
    }

    async fn mark_order_failed(
        &self,
        order_id: i64,
        intent_id: Option<&str>,
        reason: &str,
    ) -> Result<Order, ReconciliationError> {
        let mut tx = self.pool.begin().await?;
        let order =
            orders::fetch_order(order_id, &mut tx).await?.ok_or(ReconciliationError::OrderNotFound(order_id))?;
        let order = match intent_id {
            Some(intent_id) => {
                orders::record_intent(&order, intent_id, PaymentIntentStatus::Failed, order.processor, &mut tx).await?
            },
            None => order,
        };
        let order = match order.status {
            OrderStatus::Paid | OrderStatus::Active | OrderStatus::Refunded | OrderStatus::Cancelled => {
                // A failure for a superseded intent must not clobber a settled order.
                debug!("🔁️ Late failure event for order #{order_id} in status {}; ignored", order.status);
                order
            },
            _ => orders::update_order_status(order.id, OrderStatus::Error, &mut tx).await?,
        };
        tx.commit().await?;
        warn!("❌️ Payment failed for order #{order_id}: {reason}");
        Ok(order)
    }

    async fn open_dispute(
        &self,
        order_id: i64,
        charge_id: &str,
        dispute_id: &str,
        reason: Option<String>,
    ) -> Result<Order, ReconciliationError> {
        let mut tx = self.pool.begin().await?;
        let order =
            orders::fetch_order(order_id, &mut tx).await?.ok_or(ReconciliationError::OrderNotFound(order_id))?;
        let processor = order
            .processor
            .ok_or_else(|| ReconciliationError::InvalidEvent(format!("order #{order_id} has no processor on file")))?;
        if let Some(primary) = ledger::primary_credit_for_charge(processor, charge_id, &mut tx).await? {
            let flagged = ledger::set_group_disputed(&primary.transaction_group, true, &mut tx).await?;
            debug!("⚖️ Dispute {dispute_id}: {flagged} ledger rows flagged in group {}", primary.transaction_group);
        }
        let order = orders::update_order_status(order.id, OrderStatus::Disputed, &mut tx).await?;
        if let Some(subscription_id) = order.subscription_id {
            subscriptions::set_subscription_active(subscription_id, false, &mut tx).await?;
        }
        collectives::set_user_restricted(order.created_by_user_id, true, &mut tx).await?;
        tx.commit().await?;
        warn!(
            "⚖️ Dispute {dispute_id} opened on order #{order_id} ({})",
            reason.unwrap_or_else(|| "no reason given".into())
        );
        Ok(order)
    }

    async fn close_dispute_lost(
        &self,
        order_id: i64,
        dispute_id: &str,
        dispute_fee: MinorUnits,
    ) -> Result<crate::traits::ReversalOutcome, ReconciliationError> {
        let mut tx = self.pool.begin().await?;
        let order =
            orders::fetch_order(order_id, &mut tx).await?.ok_or(ReconciliationError::OrderNotFound(order_id))?;
        let processor = order
            .processor
            .ok_or_else(|| ReconciliationError::InvalidEvent(format!("order #{order_id} has no processor on file")))?;
        let charge_id = order
            .charge_id
            .clone()
            .ok_or_else(|| ReconciliationError::InvalidEvent(format!("order #{order_id} has no settled charge")))?;
        let primary = ledger::primary_credit_for_charge(processor, &charge_id, &mut tx)
            .await?
            .ok_or_else(|| ReconciliationError::InvalidEvent(format!("charge {charge_id} has no ledger entries")))?;

        // The processor keeps its fee on a lost dispute; the refund carries none and the host
        // covers the difference.
        let reversal =
            ledger::create_refund_pair(primary.id, MinorUnits::ZERO, RefundKind::Dispute, None, &mut tx).await?;

        let fee = dispute_fee.abs();
        let dispute_fee_entry = if fee.is_positive() {
            let entry = NewLedgerEntry {
                entry_type: EntryType::Debit,
                kind: LedgerEntryKind::PaymentProcessorDisputeFee,
                transaction_group: reversal.refund.credit.transaction_group.clone(),
                collective_id: primary.host_collective_id,
                from_collective_id: primary.host_collective_id,
                host_collective_id: primary.host_collective_id,
                order_id: Some(order.id),
                expense_id: None,
                amount: -fee,
                currency: primary.host_currency.clone(),
                host_currency: primary.host_currency.clone(),
                host_currency_fx_rate: 1.0,
                amount_in_host_currency: -fee,
                net_amount_in_collective_currency: -fee,
                platform_fee_in_host_currency: MinorUnits::ZERO,
                host_fee_in_host_currency: MinorUnits::ZERO,
                payment_processor_fee_in_host_currency: MinorUnits::ZERO,
                tax_amount: MinorUnits::ZERO,
                processor: Some(processor),
                charge_id: None,
                is_refund: false,
                refund_entry_id: None,
                is_internal: false,
                provenance: Provenance::Dispute { dispute_id: dispute_id.to_string(), reason: Some("lost".into()) },
            };
            Some(ledger::create_single_entry(entry, &mut tx).await?)
        } else {
            None
        };

        let order = orders::update_order_status(order.id, order.reversed_status(), &mut tx).await?;
        if let Some(subscription_id) = order.subscription_id {
            subscriptions::set_subscription_active(subscription_id, false, &mut tx).await?;
        }
        let remaining = orders::count_disputed_orders_for_user(order.created_by_user_id, &mut tx).await?;
        let user_unrestricted = if remaining == 0 {
            collectives::set_user_restricted(order.created_by_user_id, false, &mut tx).await?
        } else {
            debug!("⚖️ User {} still has {remaining} disputed orders; restriction stays", order.created_by_user_id);
            false
        };
        tx.commit().await?;
        warn!("⚖️ Dispute {dispute_id} lost on order #{order_id}; funds reversed, host charged the dispute fee");
        Ok(crate::traits::ReversalOutcome {
            order,
            refund: reversal.refund,
            cover: reversal.cover,
            dispute_fee: dispute_fee_entry,
            user_unrestricted,
        })
    }

    async fn close_dispute_won(&self, order_id: i64, dispute_id: &str) -> Result<Order, ReconciliationError> {
        let mut tx = self.pool.begin().await?;
        let order =
            orders::fetch_order(order_id, &mut tx).await?.ok_or(ReconciliationError::OrderNotFound(order_id))?;
        let processor = order
            .processor
            .ok_or_else(|| ReconciliationError::InvalidEvent(format!("order #{order_id} has no processor on file")))?;
        if let Some(charge_id) = &order.charge_id {
            if let Some(primary) = ledger::primary_credit_for_charge(processor, charge_id, &mut tx).await? {
                ledger::set_group_disputed(&primary.transaction_group, false, &mut tx).await?;
            }
        }
        let order = orders::update_order_status(order.id, order.settled_status(), &mut tx).await?;
        if let Some(subscription_id) = order.subscription_id {
            subscriptions::set_subscription_active(subscription_id, true, &mut tx).await?;
        }
        let remaining = orders::count_disputed_orders_for_user(order.created_by_user_id, &mut tx).await?;
        if remaining == 0 {
            collectives::set_user_restricted(order.created_by_user_id, false, &mut tx).await?;
        }
        tx.commit().await?;
        info!("⚖️ Dispute {dispute_id} won; order #{order_id} restored to {}", order.status);
        Ok(order)
    }

    async fn open_review(
        &self,
        order_id: i64,
        charge_id: &str,
        review_id: &str,
        reason: Option<String>,
    ) -> Result<Order, ReconciliationError> {
        let mut tx = self.pool.begin().await?;
        let order =
            orders::fetch_order(order_id, &mut tx).await?.ok_or(ReconciliationError::OrderNotFound(order_id))?;
        let processor = order
            .processor
            .ok_or_else(|| ReconciliationError::InvalidEvent(format!("order #{order_id} has no processor on file")))?;
        if let Some(primary) = ledger::primary_credit_for_charge(processor, charge_id, &mut tx).await? {
            ledger::set_group_in_review(&primary.transaction_group, true, &mut tx).await?;
        }
        let order = orders::update_order_status(order.id, OrderStatus::InReview, &mut tx).await?;
        if let Some(subscription_id) = order.subscription_id {
            subscriptions::set_subscription_active(subscription_id, false, &mut tx).await?;
        }
        tx.commit().await?;
        warn!(
            "🔍️ Review {review_id} opened on order #{order_id} ({})",
            reason.unwrap_or_else(|| "no reason given".into())
        );
        Ok(order)
    }

    async fn close_review(
        &self,
        order_id: i64,
        review_id: &str,
        reason: ReviewCloseReason,
    ) -> Result<ReviewOutcome, ReconciliationError> {
        let mut tx = self.pool.begin().await?;
        let order =
            orders::fetch_order(order_id, &mut tx).await?.ok_or(ReconciliationError::OrderNotFound(order_id))?;
        let processor = order
            .processor
            .ok_or_else(|| ReconciliationError::InvalidEvent(format!("order #{order_id} has no processor on file")))?;

        if reason == ReviewCloseReason::Approved {
            if let Some(charge_id) = &order.charge_id {
                if let Some(primary) = ledger::primary_credit_for_charge(processor, charge_id, &mut tx).await? {
                    ledger::set_group_in_review(&primary.transaction_group, false, &mut tx).await?;
                }
            }
            let order = orders::update_order_status(order.id, order.settled_status(), &mut tx).await?;
            if let Some(subscription_id) = order.subscription_id {
                subscriptions::set_subscription_active(subscription_id, true, &mut tx).await?;
            }
            tx.commit().await?;
            info!("🔍️ Review {review_id} approved; order #{order_id} restored");
            return Ok(ReviewOutcome::Approved(order));
        }

        let charge_id = order
            .charge_id
            .clone()
            .ok_or_else(|| ReconciliationError::InvalidEvent(format!("order #{order_id} has no settled charge")))?;
        let primary = ledger::primary_credit_for_charge(processor, &charge_id, &mut tx)
            .await?
            .ok_or_else(|| ReconciliationError::InvalidEvent(format!("charge {charge_id} has no ledger entries")))?;
        let reversal =
            ledger::create_refund_pair(primary.id, MinorUnits::ZERO, RefundKind::FraudReview, None, &mut tx).await?;
        let order = orders::update_order_status(order.id, order.reversed_status(), &mut tx).await?;
        if let Some(subscription_id) = order.subscription_id {
            subscriptions::set_subscription_active(subscription_id, false, &mut tx).await?;
        }
        if reason == ReviewCloseReason::RefundedAsFraud {
            collectives::set_user_restricted(order.created_by_user_id, true, &mut tx).await?;
        }
        tx.commit().await?;
        warn!("🔍️ Review {review_id} closed ({reason:?}); order #{order_id} reversed");
        Ok(ReviewOutcome::Reversed(crate::traits::ReversalOutcome {
            order,
            refund: reversal.refund,
            cover: reversal.cover,
            dispute_fee: None,
            user_unrestricted: false,
        }))
    }

    async fn mark_expense_processing(&self, expense_id: i64) -> Result<Expense, ReconciliationError> {
        let mut tx = self.pool.begin().await?;
        let expense = expenses::fetch_expense(expense_id, &mut tx)
            .await?
            .ok_or(ReconciliationError::ExpenseNotFound(expense_id))?;
        let expense = match expense.status {
            ExpenseStatus::Paid => expense,
            ExpenseStatus::Processing => expense,
            _ => expenses::update_expense_status(expense.id, ExpenseStatus::Processing, &mut tx).await?,
        };
        tx.commit().await?;
        Ok(expense)
    }

    async fn record_expense_payout(
        &self,
        expense_id: i64,
        processor_fee: MinorUnits,
    ) -> Result<(Expense, DoubleEntry), ReconciliationError> {
        let mut tx = self.pool.begin().await?;
        let expense = expenses::fetch_expense(expense_id, &mut tx)
            .await?
            .ok_or(ReconciliationError::ExpenseNotFound(expense_id))?;
        let processor = expense
            .processor
            .ok_or_else(|| ReconciliationError::InvalidEvent(format!("expense #{expense_id} has no processor")))?;

        if expense.status == ExpenseStatus::Paid {
            // Replayed payout event: hand back the original pair, write nothing.
            let existing = ledger::entries_for_expense(expense.id, &mut tx).await?;
            let credit = existing.iter().find(|e| e.entry_type == EntryType::Credit).cloned();
            let debit = existing.iter().find(|e| e.entry_type == EntryType::Debit).cloned();
            tx.rollback().await?;
            return match (credit, debit) {
                (Some(credit), Some(debit)) => Ok((expense, DoubleEntry { credit, debit })),
                _ => Err(ReconciliationError::StateConflict {
                    order_id: expense.id,
                    status: expense.status.to_string(),
                    detail: "expense is Paid but its ledger pair is missing".into(),
                }),
            };
        }

        let fee = -processor_fee.abs();
        let required = expense.amount + fee.abs();
        let balance = ledger::collective_balance(expense.collective_id, &mut tx).await?;
        if balance < required {
            return Err(ReconciliationError::InsufficientBalance {
                collective_id: expense.collective_id,
                balance,
                required,
            });
        }

        let paying = collectives::fetch_collective(expense.collective_id, &mut tx)
            .await?
            .ok_or_else(|| ReconciliationError::InvalidEvent(format!("collective {} is missing", expense.collective_id)))?;
        let host_id = collectives::fetch_host_of(&paying, &mut tx).await?.map(|h| h.id).unwrap_or(paying.id);
        let payout_ref = expense.payout_ref.clone().unwrap_or_default();
        let provenance = Provenance::Payout { processor, payout_ref };

        let group = TransactionGroup::new();
        let mut entry = NewLedgerEntry::credit(
            LedgerEntryKind::Expense,
            group.clone(),
            expense.payee_collective_id,
            expense.collective_id,
            host_id,
            expense.amount,
            expense.currency.clone(),
            provenance.clone(),
        );
        entry.expense_id = Some(expense.id);
        entry.processor = Some(processor);
        let pair = ledger::create_double_entry(entry, &mut tx).await?;

        if fee.is_negative() {
            // Payout fee leaves the paying collective as a lone Debit in the same group.
            let fee_entry = NewLedgerEntry {
                entry_type: EntryType::Debit,
                kind: LedgerEntryKind::PaymentProcessorFee,
                transaction_group: group.clone(),
                collective_id: expense.collective_id,
                from_collective_id: expense.collective_id,
                host_collective_id: host_id,
                order_id: None,
                expense_id: Some(expense.id),
                amount: fee,
                currency: expense.currency.clone(),
                host_currency: expense.currency.clone(),
                host_currency_fx_rate: 1.0,
                amount_in_host_currency: fee,
                net_amount_in_collective_currency: fee,
                platform_fee_in_host_currency: MinorUnits::ZERO,
                host_fee_in_host_currency: MinorUnits::ZERO,
                payment_processor_fee_in_host_currency: MinorUnits::ZERO,
                tax_amount: MinorUnits::ZERO,
                processor: Some(processor),
                charge_id: None,
                is_refund: false,
                refund_entry_id: None,
                is_internal: false,
                provenance,
            };
            ledger::create_single_entry(fee_entry, &mut tx).await?;
        }

        let expense = expenses::update_expense_status(expense.id, ExpenseStatus::Paid, &mut tx).await?;
        tx.commit().await?;
        info!("💸️ Expense #{expense_id} paid out: {} into group {group}", expense.amount);
        Ok((expense, pair))
    }

    async fn mark_expense_failed(&self, expense_id: i64, reason: &str) -> Result<Expense, ReconciliationError> {
        let mut tx = self.pool.begin().await?;
        let expense = expenses::fetch_expense(expense_id, &mut tx)
            .await?
            .ok_or(ReconciliationError::ExpenseNotFound(expense_id))?;
        let expense = match expense.status {
            ExpenseStatus::Paid => {
                debug!("🔁️ Late payout failure for paid expense #{expense_id}; ignored");
                expense
            },
            _ => expenses::update_expense_status(expense.id, ExpenseStatus::Error, &mut tx).await?,
        };
        tx.commit().await?;
        warn!("❌️ Payout failed for expense #{expense_id}: {reason}");
        Ok(expense)
    }
}

//--------------------------------------    ExchangeRates    ---------------------------------------------------------
impl ExchangeRates for SqliteDatabase {
    async fn rate_on(
        &self,
        base: &CurrencyCode,
        quote: &CurrencyCode,
        as_of: DateTime<Utc>,
    ) -> Result<FxRate, FxRateError> {
        let mut conn = self.pool.acquire().await?;
        fx_rates::rate_on(base, quote, as_of, &mut conn).await
    }

    async fn latest_rate(&self, base: &CurrencyCode, quote: &CurrencyCode) -> Result<FxRate, FxRateError> {
        let mut conn = self.pool.acquire().await?;
        fx_rates::latest_rate(base, quote, &mut conn).await
    }

    async fn set_rate(&self, rate: NewFxRate) -> Result<(), FxRateError> {
        let mut tx = self.pool.begin().await?;
        fx_rates::set_rate(rate, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

//--------------------------------------  ConsistencyChecks  ---------------------------------------------------------
impl ConsistencyChecks for SqliteDatabase {
    async fn check_entries_for_deleted_collectives(&self) -> Result<CheckStats, CheckError> {
        let mut conn = self.pool.acquire().await?;
        checks::entries_for_deleted_collectives(&mut conn).await
    }

    async fn check_duplicate_primary_in_group(&self) -> Result<CheckStats, CheckError> {
        let mut conn = self.pool.acquire().await?;
        checks::duplicate_primary_in_group(&mut conn).await
    }

    async fn check_orphaned_secondary_entries(&self, cutover: DateTime<Utc>) -> Result<CheckStats, CheckError> {
        let mut conn = self.pool.acquire().await?;
        checks::orphaned_secondary_entries(cutover, &mut conn).await
    }

    async fn check_duplicate_entry_uuid(&self) -> Result<CheckStats, CheckError> {
        let mut conn = self.pool.acquire().await?;
        checks::duplicate_entry_uuid(&mut conn).await
    }

    async fn check_duplicate_one_time_contribution(&self) -> Result<CheckStats, CheckError> {
        let mut conn = self.pool.acquire().await?;
        checks::duplicate_one_time_contribution(&mut conn).await
    }

    async fn check_paid_order_missing_processed_at(&self, fix: bool) -> Result<CheckStats, CheckError> {
        let mut tx = self.pool.begin().await?;
        let stats = checks::paid_order_missing_processed_at(fix, &mut tx).await?;
        tx.commit().await?;
        Ok(stats)
    }

    async fn check_paid_order_with_only_deleted_entries(&self, fix: bool) -> Result<CheckStats, CheckError> {
        let mut tx = self.pool.begin().await?;
        let stats = checks::paid_order_with_only_deleted_entries(fix, &mut tx).await?;
        tx.commit().await?;
        Ok(stats)
    }

    async fn check_payment_method_currency_mismatch(&self, fix: bool) -> Result<CheckStats, CheckError> {
        let mut tx = self.pool.begin().await?;
        let stats = checks::payment_method_currency_mismatch(fix, &mut tx).await?;
        tx.commit().await?;
        Ok(stats)
    }
}
