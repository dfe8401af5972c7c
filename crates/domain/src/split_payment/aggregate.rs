//! Split payment aggregate.

use common::{AggregateId, CurrencyCode, Money, OrderId, PaymentCollectionId, SellerId};
use event_store::Version;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{SplitPaymentError, SplitPaymentEvent};
use crate::aggregate::Aggregate;

/// Ledger status of a split payment.
///
/// A partial refund keeps the payment `Captured`; it becomes `Refunded` once
/// the whole captured amount has been refunded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPaymentStatus {
    #[default]
    Pending,
    Captured,
    Refunded,
    Canceled,
}

impl std::fmt::Display for SplitPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SplitPaymentStatus::Pending => "pending",
            SplitPaymentStatus::Captured => "captured",
            SplitPaymentStatus::Refunded => "refunded",
            SplitPaymentStatus::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRecord {
    pub refund_id: String,
    pub amount: Decimal,
}

/// One seller's slice of a parent payment collection.
///
/// Invariants held after every event:
/// `0 <= captured <= authorized` and `0 <= refunded <= captured`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitOrderPayment {
    id: Option<AggregateId>,
    #[serde(default)]
    version: Version,
    order_id: Option<OrderId>,
    seller_id: Option<SellerId>,
    payment_collection_id: Option<PaymentCollectionId>,
    currency: CurrencyCode,
    status: SplitPaymentStatus,
    authorized_amount: Decimal,
    captured_amount: Decimal,
    refunded_amount: Decimal,
    capture_payment_id: Option<String>,
    refunds: Vec<RefundRecord>,
}

impl Default for SplitOrderPayment {
    fn default() -> Self {
        Self {
            id: None,
            version: Version::initial(),
            order_id: None,
            seller_id: None,
            payment_collection_id: None,
            currency: CurrencyCode::new(""),
            status: SplitPaymentStatus::Pending,
            authorized_amount: Decimal::ZERO,
            captured_amount: Decimal::ZERO,
            refunded_amount: Decimal::ZERO,
            capture_payment_id: None,
            refunds: Vec::new(),
        }
    }
}

impl Aggregate for SplitOrderPayment {
    type Event = SplitPaymentEvent;
    type Error = SplitPaymentError;

    fn aggregate_type() -> &'static str {
        "SplitOrderPayment"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            SplitPaymentEvent::SplitPaymentCreated(data) => {
                self.id = Some(data.split_payment_id);
                self.order_id = Some(data.order_id);
                self.seller_id = Some(data.seller_id);
                self.payment_collection_id = Some(data.payment_collection_id);
                self.currency = data.authorized.currency;
                self.authorized_amount = data.authorized.amount;
                self.status = SplitPaymentStatus::Pending;
            }
            SplitPaymentEvent::SplitPaymentCaptured(data) => {
                self.captured_amount = data.amount;
                self.capture_payment_id = Some(data.payment_id);
                self.status = SplitPaymentStatus::Captured;
            }
            SplitPaymentEvent::CaptureReverted(_) => {
                self.captured_amount = Decimal::ZERO;
                self.capture_payment_id = None;
                self.status = SplitPaymentStatus::Pending;
            }
            SplitPaymentEvent::SplitPaymentRefunded(data) => {
                self.refunded_amount += data.amount;
                self.refunds.push(RefundRecord {
                    refund_id: data.refund_id,
                    amount: data.amount,
                });
                self.refresh_refund_status();
            }
            SplitPaymentEvent::RefundReverted(data) => {
                self.refunded_amount -= data.amount;
                self.refunds.retain(|r| r.refund_id != data.refund_id);
                self.refresh_refund_status();
            }
            SplitPaymentEvent::SplitPaymentCanceled(_) => {
                self.status = SplitPaymentStatus::Canceled;
            }
        }
    }
}

// Query methods
impl SplitOrderPayment {
    /// The split payment of an order shares the order's UUID.
    pub fn id_for(order_id: OrderId) -> AggregateId {
        AggregateId::from_uuid(order_id.as_uuid())
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn seller_id(&self) -> Option<SellerId> {
        self.seller_id
    }

    pub fn payment_collection_id(&self) -> Option<PaymentCollectionId> {
        self.payment_collection_id
    }

    pub fn status(&self) -> SplitPaymentStatus {
        self.status
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn authorized(&self) -> Money {
        Money::new(self.authorized_amount, self.currency.clone())
    }

    pub fn captured(&self) -> Money {
        Money::new(self.captured_amount, self.currency.clone())
    }

    pub fn refunded(&self) -> Money {
        Money::new(self.refunded_amount, self.currency.clone())
    }

    /// Captured amount not yet refunded.
    pub fn refundable(&self) -> Decimal {
        self.captured_amount - self.refunded_amount
    }

    pub fn is_partially_refunded(&self) -> bool {
        self.refunded_amount > Decimal::ZERO && self.refunded_amount < self.captured_amount
    }

    pub fn capture_payment_id(&self) -> Option<&str> {
        self.capture_payment_id.as_deref()
    }

    pub fn refunds(&self) -> &[RefundRecord] {
        &self.refunds
    }

    fn refresh_refund_status(&mut self) {
        if self.status == SplitPaymentStatus::Canceled {
            return;
        }
        self.status = if self.captured_amount > Decimal::ZERO
            && self.refunded_amount >= self.captured_amount
        {
            SplitPaymentStatus::Refunded
        } else {
            SplitPaymentStatus::Captured
        };
    }

    fn ensure_exists(&self) -> Result<(), SplitPaymentError> {
        if self.id.is_none() {
            return Err(SplitPaymentError::NotInitialized);
        }
        Ok(())
    }
}

// Command methods (return events)
impl SplitOrderPayment {
    pub fn create(
        &self,
        order_id: OrderId,
        seller_id: SellerId,
        payment_collection_id: PaymentCollectionId,
        authorized: Money,
    ) -> Result<Vec<SplitPaymentEvent>, SplitPaymentError> {
        if self.id.is_some() {
            return Err(SplitPaymentError::AlreadyExists);
        }
        if authorized.is_negative() {
            return Err(SplitPaymentError::InvalidAmount(authorized.amount));
        }

        Ok(vec![SplitPaymentEvent::created(
            Self::id_for(order_id),
            order_id,
            seller_id,
            payment_collection_id,
            authorized,
        )])
    }

    /// Captures the full authorized amount.
    ///
    /// Capture sets rather than adds, and a payment that is already captured
    /// yields no events, so a redelivered capture is harmless.
    pub fn capture(&self, payment_id: &str) -> Result<Vec<SplitPaymentEvent>, SplitPaymentError> {
        self.ensure_exists()?;
        match self.status {
            SplitPaymentStatus::Pending => Ok(vec![SplitPaymentEvent::captured(
                payment_id,
                self.authorized_amount,
            )]),
            SplitPaymentStatus::Captured | SplitPaymentStatus::Refunded => Ok(vec![]),
            SplitPaymentStatus::Canceled => Err(SplitPaymentError::InvalidState {
                status: self.status,
                action: "capture",
            }),
        }
    }

    /// Undoes a capture made with `payment_id`. A no-op if that capture is not
    /// in effect.
    pub fn revert_capture(
        &self,
        payment_id: &str,
    ) -> Result<Vec<SplitPaymentEvent>, SplitPaymentError> {
        self.ensure_exists()?;
        if self.status != SplitPaymentStatus::Captured
            || self.capture_payment_id.as_deref() != Some(payment_id)
        {
            return Ok(vec![]);
        }
        if self.refunded_amount > Decimal::ZERO {
            return Err(SplitPaymentError::InvalidState {
                status: self.status,
                action: "revert the capture of",
            });
        }
        Ok(vec![SplitPaymentEvent::capture_reverted(payment_id)])
    }

    /// Records a refund. Re-submitting a known `refund_id` yields no events.
    pub fn refund(
        &self,
        refund_id: &str,
        amount: &Money,
    ) -> Result<Vec<SplitPaymentEvent>, SplitPaymentError> {
        self.ensure_exists()?;
        if self.refunds.iter().any(|r| r.refund_id == refund_id) {
            return Ok(vec![]);
        }
        amount.ensure_same_currency(&self.currency)?;
        if !amount.is_positive() {
            return Err(SplitPaymentError::InvalidAmount(amount.amount));
        }
        if !matches!(
            self.status,
            SplitPaymentStatus::Captured | SplitPaymentStatus::Refunded
        ) {
            return Err(SplitPaymentError::InvalidState {
                status: self.status,
                action: "refund",
            });
        }
        let available = self.refundable();
        if amount.amount > available {
            return Err(SplitPaymentError::RefundExceedsCaptured {
                requested: amount.amount,
                available,
            });
        }

        Ok(vec![SplitPaymentEvent::refunded(refund_id, amount.amount)])
    }

    /// Undoes a recorded refund. A no-op for unknown refund ids.
    pub fn revert_refund(
        &self,
        refund_id: &str,
    ) -> Result<Vec<SplitPaymentEvent>, SplitPaymentError> {
        self.ensure_exists()?;
        Ok(self
            .refunds
            .iter()
            .find(|r| r.refund_id == refund_id)
            .map(|r| vec![SplitPaymentEvent::refund_reverted(refund_id, r.amount)])
            .unwrap_or_default())
    }

    /// Cancels a payment that was never captured.
    pub fn cancel(&self, reason: &str) -> Result<Vec<SplitPaymentEvent>, SplitPaymentError> {
        self.ensure_exists()?;
        match self.status {
            SplitPaymentStatus::Pending => Ok(vec![SplitPaymentEvent::canceled(reason)]),
            SplitPaymentStatus::Canceled => Ok(vec![]),
            status => Err(SplitPaymentError::InvalidState {
                status,
                action: "cancel",
            }),
        }
    }
}
