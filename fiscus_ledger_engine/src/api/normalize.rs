//! Provider event-type mapping.
//!
//! Each processor names its webhook events differently; the delivery layer calls
//! [`normalize_event`] to fold them onto the shared [`ProcessorEventKind`] before anything
//! reaches the reconciliation engine. Unknown types map to `None` and should be acknowledged and
//! ignored by the caller.
use crate::{db_types::PaymentProcessor, traits::ProcessorEventKind};

pub fn normalize_event(processor: PaymentProcessor, event_type: &str) -> Option<ProcessorEventKind> {
    use ProcessorEventKind::*;
    match processor {
        PaymentProcessor::Stripe => match event_type {
            "payment_intent.processing" => Some(IntentProcessing),
            "payment_intent.succeeded" => Some(IntentSucceeded),
            "payment_intent.payment_failed" => Some(IntentFailed),
            "charge.dispute.created" => Some(DisputeCreated),
            "charge.dispute.closed" => Some(DisputeClosed),
            "review.opened" => Some(ReviewOpened),
            "review.closed" => Some(ReviewClosed),
            _ => None,
        },
        PaymentProcessor::Paypal => match event_type {
            "PAYMENT.CAPTURE.PENDING" => Some(IntentProcessing),
            "PAYMENT.CAPTURE.COMPLETED" => Some(IntentSucceeded),
            "PAYMENT.CAPTURE.DENIED" => Some(IntentFailed),
            "CUSTOMER.DISPUTE.CREATED" => Some(DisputeCreated),
            "CUSTOMER.DISPUTE.RESOLVED" => Some(DisputeClosed),
            "PAYMENT.PAYOUTS-ITEM.PROCESSING" => Some(PayoutProcessing),
            "PAYMENT.PAYOUTS-ITEM.SUCCEEDED" => Some(PayoutSucceeded),
            "PAYMENT.PAYOUTS-ITEM.FAILED" | "PAYMENT.PAYOUTS-ITEM.RETURNED" => Some(PayoutFailed),
            _ => None,
        },
        PaymentProcessor::Wise => match event_type {
            "transfers#state-change" => Some(PayoutProcessing),
            "transfers#outgoing-payment-sent" => Some(PayoutSucceeded),
            "transfers#funds-refunded" => Some(PayoutFailed),
            _ => None,
        },
    }
}
