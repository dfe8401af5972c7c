//! The marketplace workflows.

pub mod capture_payment;
pub mod finalize_commission;
pub mod ledger;
pub mod payout;
pub mod place_order_set;
pub mod refund;

pub use capture_payment::{CapturePayment, CapturedSlice, SellerCredit};
pub use finalize_commission::FinalizeCommission;
pub use payout::{CreatePayout, CreatePayoutAccount, InitializeOnboarding};
pub use place_order_set::{ORDER_SET_PLACED, PlaceOrderSet};
pub use refund::{RefundSplitPayment, ReversalRecord};
