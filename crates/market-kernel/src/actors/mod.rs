//! Buyer and seller actors.
//!
//! Each seller runs one task serving its request and order channels plus one
//! replenisher task; each buyer runs one task driving its shopping cycles.
//!
//! ```text
//! Buyer ── sellers_offering ──▶ Directory
//!   ├─ OfferRequest (correlation_id) ──▶ Seller ── transact(quote) ──▶ OfferReply
//!   ├─ rank_sellers (cost ascending)
//!   └─ Order ──▶ Seller ── transact(fill) ──▶ bool
//!                  └─ TradeSettled / OrderRejected ──▶ TradeJournal
//! Replenisher ── transact(credit) ──▶ SellerBook
//! ```

mod book;
mod buyer;
mod seller;

pub use book::{
    DEFAULT_DISCOUNT_THRESHOLD, DISCOUNT_MULTIPLIER, FillOutcome, LoyaltyLedger, SellerBook,
};
pub(crate) use book::SharedBook;
pub use buyer::{Buyer, BuyerReport, CycleReport};
pub use seller::{Seller, SellerOptions};
