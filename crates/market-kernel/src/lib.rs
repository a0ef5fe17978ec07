//! Market Kernel: buyers and sellers trading through asynchronous messages.
//!
//! Sellers own their stock and a background replenisher; buyers discover
//! sellers through a shared [`Directory`], collect offers, rank sellers by
//! cost and place whole-order purchases until their want-list is drained.

pub mod actors;
pub mod catalog;
pub mod config;
pub mod directory;
pub mod error;
pub mod inventory;
pub mod journal;
pub mod messages;
pub mod ranking;
pub mod replenisher;
pub mod trade;

pub use actors::{
    Buyer, BuyerReport, CycleReport, DEFAULT_DISCOUNT_THRESHOLD, DISCOUNT_MULTIPLIER, Seller,
    SellerOptions,
};
pub use catalog::Catalog;
pub use config::{BuyerConfig, ProductConfig, ProductSpec, SellerConfig};
pub use directory::{Directory, SellerChannels};
pub use error::{MarketError, Result};
pub use inventory::{Inventory, StockEntry};
pub use journal::{JournalSummary, TradeJournal};
pub use ranking::{OfferTable, PreferenceOrder, RankedSeller};
pub use replenisher::{ReplenishPolicy, ReplenishSchedule};
pub use trade::{Identity, Offer, OfferLine, WantList};
