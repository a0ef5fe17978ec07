//! Message types exchanged between buyer and seller actors.
//!
//! Offer requests carry a correlation id so a buyer can tell a late reply
//! from an earlier, abandoned request apart from the one it is waiting for.
//! Orders carry a oneshot reply; a dropped reply sender reads as rejection.

use std::collections::BTreeMap;

use tokio::sync::{mpsc, oneshot};

use crate::trade::{Identity, Offer};

/// Request for a seller's current terms on the listed products.
#[derive(Debug)]
pub struct OfferRequest {
    /// Requesting buyer, validated against the directory
    pub buyer_id: Identity,
    /// Buyer-chosen id echoed back in the reply
    pub correlation_id: u64,
    /// Products the buyer still needs, in want-list order
    pub wanted_products: Vec<String>,
    /// Buyer's inbound offer channel
    pub reply_to: mpsc::Sender<OfferReply>,
}

/// A seller's answer to an [`OfferRequest`].
#[derive(Debug, Clone)]
pub struct OfferReply {
    /// Seller that built the offer
    pub seller_id: Identity,
    /// Correlation id copied from the request
    pub correlation_id: u64,
    /// Terms for every requested product the seller carries
    pub offer: Offer,
}

/// A whole-order purchase: accepted in full or not at all.
#[derive(Debug)]
pub struct Order {
    /// Purchasing buyer
    pub buyer_id: Identity,
    /// Line items: product -> quantity
    pub items: BTreeMap<String, u32>,
    /// Receives `true` when every line item was debited
    pub reply_to: oneshot::Sender<OrderResult>,
}

/// Outcome of an [`Order`].
pub type OrderResult = bool;
