//! Split payment domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, Money, OrderId, PaymentCollectionId, SellerId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

/// Events that can occur on a split payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SplitPaymentEvent {
    SplitPaymentCreated(SplitPaymentCreatedData),

    /// The seller's share of the parent payment was captured.
    SplitPaymentCaptured(SplitPaymentCapturedData),

    /// A capture was undone by a compensating step.
    CaptureReverted(CaptureRevertedData),

    SplitPaymentRefunded(SplitPaymentRefundedData),

    /// A refund was undone by a compensating step.
    RefundReverted(RefundRevertedData),

    SplitPaymentCanceled(SplitPaymentCanceledData),
}

impl DomainEvent for SplitPaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SplitPaymentEvent::SplitPaymentCreated(_) => "SplitPaymentCreated",
            SplitPaymentEvent::SplitPaymentCaptured(_) => "SplitPaymentCaptured",
            SplitPaymentEvent::CaptureReverted(_) => "CaptureReverted",
            SplitPaymentEvent::SplitPaymentRefunded(_) => "SplitPaymentRefunded",
            SplitPaymentEvent::RefundReverted(_) => "RefundReverted",
            SplitPaymentEvent::SplitPaymentCanceled(_) => "SplitPaymentCanceled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitPaymentCreatedData {
    pub split_payment_id: AggregateId,
    pub order_id: OrderId,
    pub seller_id: SellerId,
    /// Parent payment collection; queried when a capture arrives.
    pub payment_collection_id: PaymentCollectionId,
    pub authorized: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitPaymentCapturedData {
    pub payment_id: String,
    pub amount: Decimal,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRevertedData {
    pub payment_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitPaymentRefundedData {
    pub refund_id: String,
    pub amount: Decimal,
    pub refunded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRevertedData {
    pub refund_id: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitPaymentCanceledData {
    pub reason: String,
}

impl SplitPaymentEvent {
    pub fn created(
        split_payment_id: AggregateId,
        order_id: OrderId,
        seller_id: SellerId,
        payment_collection_id: PaymentCollectionId,
        authorized: Money,
    ) -> Self {
        SplitPaymentEvent::SplitPaymentCreated(SplitPaymentCreatedData {
            split_payment_id,
            order_id,
            seller_id,
            payment_collection_id,
            authorized,
            created_at: Utc::now(),
        })
    }

    pub fn captured(payment_id: impl Into<String>, amount: Decimal) -> Self {
        SplitPaymentEvent::SplitPaymentCaptured(SplitPaymentCapturedData {
            payment_id: payment_id.into(),
            amount,
            captured_at: Utc::now(),
        })
    }

    pub fn capture_reverted(payment_id: impl Into<String>) -> Self {
        SplitPaymentEvent::CaptureReverted(CaptureRevertedData {
            payment_id: payment_id.into(),
        })
    }

    pub fn refunded(refund_id: impl Into<String>, amount: Decimal) -> Self {
        SplitPaymentEvent::SplitPaymentRefunded(SplitPaymentRefundedData {
            refund_id: refund_id.into(),
            amount,
            refunded_at: Utc::now(),
        })
    }

    pub fn refund_reverted(refund_id: impl Into<String>, amount: Decimal) -> Self {
        SplitPaymentEvent::RefundReverted(RefundRevertedData {
            refund_id: refund_id.into(),
            amount,
        })
    }

    pub fn canceled(reason: impl Into<String>) -> Self {
        SplitPaymentEvent::SplitPaymentCanceled(SplitPaymentCanceledData {
            reason: reason.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn serializes_with_type_and_data() {
        let event = SplitPaymentEvent::refunded("re_1", dec!(20.00));
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "SplitPaymentRefunded");
        assert_eq!(json["data"]["refund_id"], "re_1");
        assert_eq!(json["data"]["amount"], "20.00");

        let back: SplitPaymentEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.event_type(), "SplitPaymentRefunded");
    }
}
