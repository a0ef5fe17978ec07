//! Ranking: how a buyer orders sellers by the cost of their offers.
//!
//! For a want-list `W` and an offer `O`:
//!
//! ```text
//! coverage_penalty = |W - O| / |W|
//! contribution(p)  = price * min(need, available) / (1 if available >= need else available / need)
//! cost             = sum(contribution) / coverage_penalty    (no scaling when the penalty is 0)
//! ```
//!
//! Lower cost ranks first. Equal costs keep discovery order, so the ranking
//! is a pure function of the offer table and the want-list.

use serde::Serialize;

use crate::trade::{Identity, Offer, WantList};

/// Offers collected in one shopping cycle, in discovery order.
///
/// Lines with zero availability are pruned on insert and sellers whose
/// pruned offer is empty are never stored.
#[derive(Debug, Clone, Default)]
pub struct OfferTable {
    entries: Vec<(Identity, Offer)>,
}

impl OfferTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a seller's offer. Returns false when nothing usable remained.
    pub fn insert(&mut self, seller: Identity, mut offer: Offer) -> bool {
        offer.retain(|_, line| line.available > 0);
        if offer.is_empty() {
            return false;
        }
        self.entries.retain(|(id, _)| *id != seller);
        self.entries.push((seller, offer));
        true
    }

    pub fn get(&self, seller: Identity) -> Option<&Offer> {
        self.entries
            .iter()
            .find(|(id, _)| *id == seller)
            .map(|(_, offer)| offer)
    }

    pub fn remove(&mut self, seller: Identity) -> Option<Offer> {
        let pos = self.entries.iter().position(|(id, _)| *id == seller)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Identity, &Offer)> {
        self.entries.iter().map(|(id, offer)| (*id, offer))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One seller's place in a preference order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankedSeller {
    pub seller_id: Identity,
    pub cost: f64,
}

/// Sellers sorted by ascending cost.
pub type PreferenceOrder = Vec<RankedSeller>;

/// Cost of buying the wanted products from one offer.
pub fn seller_cost(offer: &Offer, want: &WantList) -> f64 {
    if want.is_empty() {
        return 0.0;
    }

    let missing = want.keys().filter(|p| !offer.contains_key(*p)).count();
    let coverage_penalty = missing as f64 / want.len() as f64;

    let total: f64 = offer
        .iter()
        .filter_map(|(product, line)| {
            let need = *want.get(product)?;
            let taken = need.min(line.available);
            let availability = if line.available >= need {
                1.0
            } else {
                f64::from(line.available) / f64::from(need)
            };
            Some(line.unit_price * f64::from(taken) / availability)
        })
        .sum();

    if coverage_penalty == 0.0 {
        total
    } else {
        total / coverage_penalty
    }
}

/// Rank every seller that can supply at least one still-wanted product.
pub fn rank_sellers(table: &OfferTable, want: &WantList) -> PreferenceOrder {
    let mut order: PreferenceOrder = table
        .iter()
        .filter(|(_, offer)| offer.keys().any(|p| want.contains_key(p)))
        .map(|(seller_id, offer)| RankedSeller {
            seller_id,
            cost: seller_cost(offer, want),
        })
        .collect();
    // Stable sort: ties keep discovery order.
    order.sort_by(|a, b| a.cost.total_cmp(&b.cost));
    order
}
