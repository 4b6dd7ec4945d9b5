//! `ReconciliationApi` is the primary entry point of the engine: it takes normalized payment
//! processor events and drives them through the backend's per-event transactions, firing event
//! hooks once the writes have committed.
use std::fmt::Debug;

use chrono::Utc;
use fiscus_common::MinorUnits;
use log::*;

use crate::{
    api::fees,
    db_types::{Expense, Order, PaymentProcessor},
    events::{ContributionSettledEvent, DisputeOpenedEvent, EventProducers, FundsReversedEvent, PaymentFailedEvent},
    traits::{
        ContributionSettlement,
        EventPayload,
        ExchangeRates,
        NewPaymentMethod,
        ProcessorEvent,
        ProcessorEventKind,
        ReconciliationDatabase,
        ReconciliationError,
        ReviewCloseReason,
        ReviewOutcome,
        SettlementOutcome,
    },
};

/// What a processed event amounted to. `Ignored` covers events whose owning record lives in some
/// other deployment; they are logged and dropped rather than treated as errors, since processors
/// fan webhooks out to every registered endpoint.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Ignored,
    OrderUpdated(Order),
    Settlement(SettlementOutcome),
    Review(ReviewOutcome),
    Reversal(crate::traits::ReversalOutcome),
    ExpenseUpdated(Expense),
    ExpensePaid(Expense),
}

pub struct ReconciliationApi<B> {
    db: B,
    producers: EventProducers,
    /// The platform's percentage of collected host fees, carried on fee breakdowns as a
    /// settlement figure.
    host_fee_share_percent: f64,
}

impl<B> Debug for ReconciliationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B> ReconciliationApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, host_fee_share_percent: 0.0 }
    }

    pub fn with_host_fee_share(mut self, percent: f64) -> Self {
        self.host_fee_share_percent = percent;
        self
    }
}

impl<B> ReconciliationApi<B>
where B: ReconciliationDatabase + ExchangeRates
{
    /// Processes one normalized processor event end to end. Each arm delegates to a single
    /// backend transaction; hooks fire only after that transaction has committed.
    pub async fn process_event(&self, event: ProcessorEvent) -> Result<EventOutcome, ReconciliationError> {
        trace!("📥️ {} event {:?} for object [{}]", event.processor, event.kind, event.object_id);
        match event.kind {
            ProcessorEventKind::IntentProcessing => self.on_intent_processing(event).await,
            ProcessorEventKind::IntentSucceeded => self.on_intent_succeeded(event).await,
            ProcessorEventKind::IntentFailed => self.on_intent_failed(event).await,
            ProcessorEventKind::DisputeCreated => self.on_dispute_created(event).await,
            ProcessorEventKind::DisputeClosed => self.on_dispute_closed(event).await,
            ProcessorEventKind::ReviewOpened => self.on_review_opened(event).await,
            ProcessorEventKind::ReviewClosed => self.on_review_closed(event).await,
            ProcessorEventKind::PayoutProcessing => self.on_payout_processing(event).await,
            ProcessorEventKind::PayoutSucceeded => self.on_payout_succeeded(event).await,
            ProcessorEventKind::PayoutFailed => self.on_payout_failed(event).await,
        }
    }

    /// Resolves the order an event belongs to. Intent events key on the event's object id; for
    /// dispute and review events that id names the dispute itself, so the charge id in the
    /// payload is tried as a fallback. `None` means the event is not ours.
    async fn owning_order(&self, event: &ProcessorEvent) -> Result<Option<Order>, ReconciliationError> {
        if let Some(order) = self.db.fetch_order_by_processor_object(event.processor, &event.object_id).await? {
            return Ok(Some(order));
        }
        if let Some(charge_id) = event.payload.charge_id.as_deref() {
            if let Some(order) = self.db.fetch_order_by_processor_object(event.processor, charge_id).await? {
                return Ok(Some(order));
            }
        }
        warn!("📥️ No order matches {} object [{}]; event dropped", event.processor, event.object_id);
        Ok(None)
    }

    async fn owning_expense(&self, event: &ProcessorEvent) -> Result<Option<Expense>, ReconciliationError> {
        let expense = self.db.fetch_expense_by_payout_ref(event.processor, &event.object_id).await?;
        if expense.is_none() {
            warn!("📥️ No expense matches {} payout [{}]; event dropped", event.processor, event.object_id);
        }
        Ok(expense)
    }

    fn payment_method_from(&self, payload: &EventPayload, processor: PaymentProcessor, order: &Order) -> Option<NewPaymentMethod> {
        payload.payment_method_ref.as_ref().map(|processor_ref| NewPaymentMethod {
            processor,
            processor_ref: processor_ref.clone(),
            collective_id: order.from_collective_id,
            currency: order.currency.clone(),
            saved: order.is_recurring(),
        })
    }

    async fn on_intent_processing(&self, event: ProcessorEvent) -> Result<EventOutcome, ReconciliationError> {
        let Some(order) = self.owning_order(&event).await? else {
            return Ok(EventOutcome::Ignored);
        };
        let method = self.payment_method_from(&event.payload, event.processor, &order);
        let order = self.db.mark_order_processing(order.id, &event.object_id, method).await?;
        debug!("🔄️ Order #{} is Processing on intent [{}]", order.id, event.object_id);
        Ok(EventOutcome::OrderUpdated(order))
    }

    async fn on_intent_succeeded(&self, event: ProcessorEvent) -> Result<EventOutcome, ReconciliationError> {
        let Some(order) = self.owning_order(&event).await? else {
            return Ok(EventOutcome::Ignored);
        };
        let charge_id = event
            .payload
            .charge_id
            .clone()
            .ok_or_else(|| ReconciliationError::InvalidEvent("succeeded event carries no charge id".into()))?;
        let collective = self
            .db
            .fetch_collective(order.collective_id)
            .await?
            .ok_or_else(|| ReconciliationError::InvalidEvent(format!("collective {} is missing", order.collective_id)))?;
        let host = self.db.fetch_host_of(&collective).await?.unwrap_or_else(|| collective.clone());
        let fx_rate = if order.currency == host.currency {
            1.0
        } else {
            self.db.rate_on(&order.currency, &host.currency, Utc::now()).await?.rate
        };
        let reported_fee = event.payload.processor_fee.unwrap_or(MinorUnits::ZERO);
        let breakdown =
            fees::contribution_fees(&order, &collective, &host, fx_rate, reported_fee, self.host_fee_share_percent)?;
        let settlement = ContributionSettlement {
            processor: event.processor,
            charge_id,
            intent_id: Some(event.object_id.clone()),
            payment_method: self.payment_method_from(&event.payload, event.processor, &order),
            host_collective_id: host.id,
            fees: breakdown,
        };
        let outcome = self.db.record_contribution_settlement(order.id, settlement).await?;
        if let SettlementOutcome::Settled { order, contribution, tip } = &outcome {
            self.call_contribution_settled_hook(order, contribution, tip.as_ref()).await;
        }
        Ok(EventOutcome::Settlement(outcome))
    }

    async fn on_intent_failed(&self, event: ProcessorEvent) -> Result<EventOutcome, ReconciliationError> {
        let Some(order) = self.owning_order(&event).await? else {
            return Ok(EventOutcome::Ignored);
        };
        let reason = event.payload.failure_message.clone().unwrap_or_else(|| "unspecified".to_string());
        let order = self.db.mark_order_failed(order.id, Some(&event.object_id), &reason).await?;
        for producer in &self.producers.payment_failed_producer {
            producer.publish_event(PaymentFailedEvent { order: order.clone(), reason: reason.clone() }).await;
        }
        Ok(EventOutcome::OrderUpdated(order))
    }

    async fn on_dispute_created(&self, event: ProcessorEvent) -> Result<EventOutcome, ReconciliationError> {
        let Some(order) = self.owning_order(&event).await? else {
            return Ok(EventOutcome::Ignored);
        };
        let dispute_id = event
            .payload
            .dispute_id
            .clone()
            .ok_or_else(|| ReconciliationError::InvalidEvent("dispute event carries no dispute id".into()))?;
        let charge_id = event
            .payload
            .charge_id
            .clone()
            .or_else(|| order.charge_id.clone())
            .ok_or_else(|| ReconciliationError::InvalidEvent("dispute event has no charge to flag".into()))?;
        let order = self.db.open_dispute(order.id, &charge_id, &dispute_id, event.payload.outcome.clone()).await?;
        for producer in &self.producers.dispute_opened_producer {
            producer.publish_event(DisputeOpenedEvent { order: order.clone(), dispute_id: dispute_id.clone() }).await;
        }
        Ok(EventOutcome::OrderUpdated(order))
    }

    async fn on_dispute_closed(&self, event: ProcessorEvent) -> Result<EventOutcome, ReconciliationError> {
        let Some(order) = self.owning_order(&event).await? else {
            return Ok(EventOutcome::Ignored);
        };
        let dispute_id = event
            .payload
            .dispute_id
            .clone()
            .ok_or_else(|| ReconciliationError::InvalidEvent("dispute event carries no dispute id".into()))?;
        let outcome = event
            .payload
            .outcome
            .as_deref()
            .ok_or_else(|| ReconciliationError::InvalidEvent("dispute closure carries no outcome".into()))?;
        match outcome {
            "won" => {
                let order = self.db.close_dispute_won(order.id, &dispute_id).await?;
                Ok(EventOutcome::OrderUpdated(order))
            },
            "lost" => {
                let fee = event.payload.dispute_fee.unwrap_or(MinorUnits::ZERO);
                let reversal = self.db.close_dispute_lost(order.id, &dispute_id, fee).await?;
                self.call_funds_reversed_hook(&reversal).await;
                Ok(EventOutcome::Reversal(reversal))
            },
            other => Err(ReconciliationError::InvalidEvent(format!("unknown dispute outcome: {other}"))),
        }
    }

    async fn on_review_opened(&self, event: ProcessorEvent) -> Result<EventOutcome, ReconciliationError> {
        let Some(order) = self.owning_order(&event).await? else {
            return Ok(EventOutcome::Ignored);
        };
        let review_id = event
            .payload
            .review_id
            .clone()
            .ok_or_else(|| ReconciliationError::InvalidEvent("review event carries no review id".into()))?;
        let charge_id = event
            .payload
            .charge_id
            .clone()
            .or_else(|| order.charge_id.clone())
            .ok_or_else(|| ReconciliationError::InvalidEvent("review event has no charge to flag".into()))?;
        let order = self.db.open_review(order.id, &charge_id, &review_id, event.payload.outcome.clone()).await?;
        Ok(EventOutcome::OrderUpdated(order))
    }

    async fn on_review_closed(&self, event: ProcessorEvent) -> Result<EventOutcome, ReconciliationError> {
        let Some(order) = self.owning_order(&event).await? else {
            return Ok(EventOutcome::Ignored);
        };
        let review_id = event
            .payload
            .review_id
            .clone()
            .ok_or_else(|| ReconciliationError::InvalidEvent("review event carries no review id".into()))?;
        let reason = event
            .payload
            .outcome
            .as_deref()
            .and_then(ReviewCloseReason::parse)
            .ok_or_else(|| {
                ReconciliationError::InvalidEvent(format!("unknown review closure reason: {:?}", event.payload.outcome))
            })?;
        let outcome = self.db.close_review(order.id, &review_id, reason).await?;
        if let ReviewOutcome::Reversed(reversal) = &outcome {
            self.call_funds_reversed_hook(reversal).await;
        }
        Ok(EventOutcome::Review(outcome))
    }

    async fn on_payout_processing(&self, event: ProcessorEvent) -> Result<EventOutcome, ReconciliationError> {
        let Some(expense) = self.owning_expense(&event).await? else {
            return Ok(EventOutcome::Ignored);
        };
        let expense = self.db.mark_expense_processing(expense.id).await?;
        Ok(EventOutcome::ExpenseUpdated(expense))
    }

    async fn on_payout_succeeded(&self, event: ProcessorEvent) -> Result<EventOutcome, ReconciliationError> {
        let Some(expense) = self.owning_expense(&event).await? else {
            return Ok(EventOutcome::Ignored);
        };
        let fee = event.payload.processor_fee.unwrap_or(MinorUnits::ZERO);
        let (expense, _pair) = self.db.record_expense_payout(expense.id, fee).await?;
        Ok(EventOutcome::ExpensePaid(expense))
    }

    async fn on_payout_failed(&self, event: ProcessorEvent) -> Result<EventOutcome, ReconciliationError> {
        let Some(expense) = self.owning_expense(&event).await? else {
            return Ok(EventOutcome::Ignored);
        };
        let reason = event.payload.failure_message.clone().unwrap_or_else(|| "unspecified".to_string());
        let expense = self.db.mark_expense_failed(expense.id, &reason).await?;
        Ok(EventOutcome::ExpenseUpdated(expense))
    }

    async fn call_contribution_settled_hook(
        &self,
        order: &Order,
        contribution: &crate::db_types::DoubleEntry,
        tip: Option<&crate::db_types::DoubleEntry>,
    ) {
        for producer in &self.producers.contribution_settled_producer {
            debug!("📬️ Notifying contribution settled hook subscribers");
            let event = ContributionSettledEvent::new(order.clone(), contribution.clone(), tip.cloned());
            producer.publish_event(event).await;
        }
    }

    async fn call_funds_reversed_hook(&self, reversal: &crate::traits::ReversalOutcome) {
        for producer in &self.producers.funds_reversed_producer {
            debug!("📬️ Notifying funds reversed hook subscribers");
            producer.publish_event(FundsReversedEvent::new(reversal.clone())).await;
        }
    }
}
