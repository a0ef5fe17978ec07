//! SellerBook: everything a seller guards under its single lock.
//!
//! Inventory, list prices and the loyalty ledger are only reachable through
//! [`SharedBook::transact`], which acquires the lock, runs one closure and
//! releases it. Request handling, order handling and replenishment firings
//! each take exactly one `transact`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::Result;
use crate::inventory::Inventory;
use crate::trade::{Identity, Offer, OfferLine};

/// Price multiplier once a buyer's spend passes the loyalty threshold.
pub const DISCOUNT_MULTIPLIER: f64 = 0.95;
/// Default cumulative spend a buyer must exceed to earn the discount.
pub const DEFAULT_DISCOUNT_THRESHOLD: f64 = 50.0;

/// Cumulative qualifying spend per buyer at one seller.
#[derive(Debug, Clone, Default)]
pub struct LoyaltyLedger {
    threshold: f64,
    spend: HashMap<Identity, f64>,
}

impl LoyaltyLedger {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            spend: HashMap::new(),
        }
    }

    pub fn spend(&self, buyer: Identity) -> f64 {
        self.spend.get(&buyer).copied().unwrap_or(0.0)
    }

    /// Whether the buyer has unlocked the discount. Once true, stays true.
    pub fn is_discounted(&self, buyer: Identity) -> bool {
        self.spend(buyer) > self.threshold
    }

    pub fn multiplier(&self, buyer: Identity) -> f64 {
        if self.is_discounted(buyer) {
            DISCOUNT_MULTIPLIER
        } else {
            1.0
        }
    }

    /// Add an order's value. Spend stops accumulating past the threshold.
    pub fn record(&mut self, buyer: Identity, value: f64) {
        let spend = self.spend.entry(buyer).or_insert(0.0);
        if *spend <= self.threshold {
            *spend += value;
        }
    }
}

/// Result of trying to fill a whole order.
#[derive(Debug, Clone, PartialEq)]
pub enum FillOutcome {
    /// Every line item was debited.
    Settled { units: u32, value: f64 },
    /// Nothing was debited; `product` is the first line that could not be met.
    Rejected {
        product: String,
        requested: u32,
        available: u32,
    },
}

/// A seller's stock, prices and loyalty ledger.
#[derive(Debug, Clone)]
pub struct SellerBook {
    pub(crate) inventory: Inventory,
    pub(crate) prices: BTreeMap<String, f64>,
    pub(crate) loyalty: LoyaltyLedger,
}

impl SellerBook {
    pub fn new(inventory: Inventory, prices: BTreeMap<String, f64>, discount_threshold: f64) -> Self {
        Self {
            inventory,
            prices,
            loyalty: LoyaltyLedger::new(discount_threshold),
        }
    }

    pub fn price(&self, product: &str) -> Option<f64> {
        self.prices.get(product).copied()
    }

    /// Current terms for `buyer` on each wanted product this seller carries.
    pub fn quote(&self, buyer: Identity, wanted: &[String]) -> Offer {
        let multiplier = self.loyalty.multiplier(buyer);
        wanted
            .iter()
            .filter_map(|product| {
                let available = self.inventory.level(product)?;
                let price = self.prices.get(product)?;
                Some((
                    product.clone(),
                    OfferLine {
                        available,
                        unit_price: price * multiplier,
                    },
                ))
            })
            .collect()
    }

    /// Debit every line item, or none of them.
    pub fn fill(&mut self, buyer: Identity, items: &BTreeMap<String, u32>) -> Result<FillOutcome> {
        if items.is_empty() {
            return Ok(FillOutcome::Rejected {
                product: String::new(),
                requested: 0,
                available: 0,
            });
        }

        let multiplier = self.loyalty.multiplier(buyer);
        let mut value = 0.0;
        for (product, &requested) in items {
            let available = self.inventory.level(product).unwrap_or(0);
            let price = self.prices.get(product);
            match price {
                Some(price) if requested <= available && self.inventory.contains(product) => {
                    value += price * multiplier * f64::from(requested);
                }
                _ => {
                    return Ok(FillOutcome::Rejected {
                        product: product.clone(),
                        requested,
                        available,
                    });
                }
            }
        }

        let mut units = 0;
        for (product, &qty) in items {
            self.inventory.debit(product, qty)?;
            units += qty;
        }
        self.loyalty.record(buyer, value);

        Ok(FillOutcome::Settled { units, value })
    }
}

/// The lock-protected book shared by a seller's loop and its replenisher.
#[derive(Debug, Clone)]
pub(crate) struct SharedBook(Arc<Mutex<SellerBook>>);

impl SharedBook {
    pub(crate) fn new(book: SellerBook) -> Self {
        Self(Arc::new(Mutex::new(book)))
    }

    /// Acquire the book, apply `f`, release.
    pub(crate) async fn transact<R>(&self, f: impl FnOnce(&mut SellerBook) -> R) -> R {
        let mut book = self.0.lock().await;
        f(&mut book)
    }
}
