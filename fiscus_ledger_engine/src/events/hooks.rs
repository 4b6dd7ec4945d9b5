use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    ContributionSettledEvent,
    DisputeOpenedEvent,
    EventHandler,
    EventProducer,
    FundsReversedEvent,
    Handler,
    PaymentFailedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub contribution_settled_producer: Vec<EventProducer<ContributionSettledEvent>>,
    pub payment_failed_producer: Vec<EventProducer<PaymentFailedEvent>>,
    pub dispute_opened_producer: Vec<EventProducer<DisputeOpenedEvent>>,
    pub funds_reversed_producer: Vec<EventProducer<FundsReversedEvent>>,
}

pub struct EventHandlers {
    pub on_contribution_settled: Option<EventHandler<ContributionSettledEvent>>,
    pub on_payment_failed: Option<EventHandler<PaymentFailedEvent>>,
    pub on_dispute_opened: Option<EventHandler<DisputeOpenedEvent>>,
    pub on_funds_reversed: Option<EventHandler<FundsReversedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_contribution_settled = hooks.on_contribution_settled.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_failed = hooks.on_payment_failed.map(|f| EventHandler::new(buffer_size, f));
        let on_dispute_opened = hooks.on_dispute_opened.map(|f| EventHandler::new(buffer_size, f));
        let on_funds_reversed = hooks.on_funds_reversed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_contribution_settled, on_payment_failed, on_dispute_opened, on_funds_reversed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_contribution_settled {
            result.contribution_settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_failed {
            result.payment_failed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_dispute_opened {
            result.dispute_opened_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_funds_reversed {
            result.funds_reversed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_contribution_settled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_payment_failed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_dispute_opened {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_funds_reversed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_contribution_settled: Option<Handler<ContributionSettledEvent>>,
    pub on_payment_failed: Option<Handler<PaymentFailedEvent>>,
    pub on_dispute_opened: Option<Handler<DisputeOpenedEvent>>,
    pub on_funds_reversed: Option<Handler<FundsReversedEvent>>,
}

impl EventHooks {
    pub fn on_contribution_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ContributionSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_contribution_settled = Some(Arc::new(f));
        self
    }

    pub fn on_payment_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentFailedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_failed = Some(Arc::new(f));
        self
    }

    pub fn on_dispute_opened<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DisputeOpenedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_dispute_opened = Some(Arc::new(f));
        self
    }

    pub fn on_funds_reversed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(FundsReversedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_funds_reversed = Some(Arc::new(f));
        self
    }
}
