//! Seller balance postings shared by the capture, commission and account
//! workflows.
//!
//! A captured order posts two transactions to its seller: the capture credit
//! and the commission debit. They are keyed by the split payment and the
//! order, so whichever workflow runs second completes the pair and the
//! account's transaction dedup absorbs repeats. Each poster writes its own
//! fact first and reads the other one after, so two concurrent posters cannot
//! both miss the debit.

use common::{AggregateId, CurrencyCode, Money, OrderId, SellerId};
use domain::payout::PayoutAccountEvent;
use domain::{BalanceTransaction, DomainError, PayoutAccountService, total_commission};
use event_store::EventStore;

use crate::error::SagaError;
use crate::services::CommissionStore;

pub fn capture_transaction_id(split_payment_id: AggregateId) -> String {
    format!("capture:{split_payment_id}")
}

pub fn commission_transaction_id(order_id: OrderId) -> String {
    format!("commission:{order_id}")
}

/// Applies `transactions` to the seller's account and returns the ids that
/// were not already in its ledger.
pub async fn post<S: EventStore>(
    payouts: &PayoutAccountService<S>,
    seller_id: SellerId,
    transactions: &[BalanceTransaction],
) -> Result<Vec<String>, SagaError> {
    let result = payouts.apply_transactions(seller_id, transactions).await?;
    Ok(result
        .events
        .iter()
        .filter_map(|event| match event {
            PayoutAccountEvent::TransactionsApplied(data) => Some(&data.transactions),
            _ => None,
        })
        .flatten()
        .map(|t| t.id.clone())
        .collect())
}

/// The commission debit of an order, or `None` while its lines are not recorded.
pub async fn commission_debit(
    commissions: &dyn CommissionStore,
    order_id: OrderId,
    currency: &CurrencyCode,
) -> Result<Option<BalanceTransaction>, SagaError> {
    let lines = commissions.lines_for_order(order_id).await?;
    if lines.is_empty() {
        return Ok(None);
    }
    let total = total_commission(&lines, currency)
        .map_err(|e| SagaError::Domain(DomainError::Commission(e)))?;
    Ok(Some(BalanceTransaction::commission(
        commission_transaction_id(order_id),
        total,
    )))
}

/// Credits a captured split payment to its seller, then debits the order's
/// commission if it is already finalized.
///
/// Returns the newly posted transaction ids. On error nothing new stays
/// posted.
pub async fn credit_capture<S: EventStore>(
    payouts: &PayoutAccountService<S>,
    commissions: &dyn CommissionStore,
    seller_id: SellerId,
    split_payment_id: AggregateId,
    order_id: OrderId,
    captured: &Money,
) -> Result<Vec<String>, SagaError> {
    let credit = BalanceTransaction::capture(
        capture_transaction_id(split_payment_id),
        captured.clone(),
    );
    let mut posted = post(payouts, seller_id, &[credit]).await?;

    let debit = async {
        match commission_debit(commissions, order_id, &captured.currency).await? {
            Some(debit) => post(payouts, seller_id, &[debit]).await,
            None => Ok(Vec::new()),
        }
    }
    .await;

    match debit {
        Ok(ids) => {
            posted.extend(ids);
            Ok(posted)
        }
        Err(error) => {
            revert(payouts, seller_id, &posted).await;
            Err(error)
        }
    }
}

/// Takes posted transactions back out, logging instead of failing.
pub async fn revert<S: EventStore>(
    payouts: &PayoutAccountService<S>,
    seller_id: SellerId,
    transaction_ids: &[String],
) {
    if transaction_ids.is_empty() {
        return;
    }
    if let Err(error) = payouts.revert_transactions(seller_id, transaction_ids).await {
        tracing::warn!(%seller_id, %error, "failed to revert balance transactions");
    }
}
