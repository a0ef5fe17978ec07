//! Inventory: a seller's stock ledger of bounded per-product counters.
//!
//! Inventory performs no locking. Callers mutate it only from inside the
//! owning seller's `transact` unit.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::validate_limit;
use crate::error::{MarketError, Result};

/// Stock held for one product. Invariant: `amount <= limit <= STOCK_CEILING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockEntry {
    pub amount: u32,
    pub limit: u32,
}

/// Per-seller stock ledger.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    stock: BTreeMap<String, StockEntry>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `product` with the given opening stock and limit.
    pub fn add_product(&mut self, product: &str, amount: u32, limit: u32) -> Result<()> {
        if self.stock.contains_key(product) {
            return Err(MarketError::AlreadyExists(product.to_string()));
        }
        validate_limit(product, limit)?;
        if amount > limit {
            return Err(MarketError::config(
                product,
                format!("amount ({amount}) exceeds its limit ({limit})"),
            ));
        }
        self.stock
            .insert(product.to_string(), StockEntry { amount, limit });
        Ok(())
    }

    /// Stop tracking `product`. Absent products are ignored.
    pub fn remove_product(&mut self, product: &str) {
        self.stock.remove(product);
    }

    /// Current stock of `product`, if tracked.
    pub fn level(&self, product: &str) -> Option<u32> {
        self.stock.get(product).map(|entry| entry.amount)
    }

    pub fn entry(&self, product: &str) -> Option<StockEntry> {
        self.stock.get(product).copied()
    }

    pub fn contains(&self, product: &str) -> bool {
        self.stock.contains_key(product)
    }

    /// Tracked products and their stock.
    pub fn entries(&self) -> impl Iterator<Item = (&str, StockEntry)> {
        self.stock.iter().map(|(name, entry)| (name.as_str(), *entry))
    }

    /// Add `amount` units, saturating at the product's limit.
    ///
    /// Returns the new level.
    pub fn credit(&mut self, product: &str, amount: u32) -> Result<u32> {
        let entry = self.entry_mut(product)?;
        entry.amount = entry.amount.saturating_add(amount).min(entry.limit);
        Ok(entry.amount)
    }

    /// Remove `amount` units. Fails without side effects when stock is short.
    pub fn debit(&mut self, product: &str, amount: u32) -> Result<u32> {
        let entry = self.entry_mut(product)?;
        if amount > entry.amount {
            return Err(MarketError::InsufficientStock {
                product: product.to_string(),
                requested: amount,
                available: entry.amount,
            });
        }
        entry.amount -= amount;
        Ok(entry.amount)
    }

    /// Change the capacity limit. Stock above the new limit is discarded.
    pub fn set_limit(&mut self, product: &str, limit: u32) -> Result<()> {
        validate_limit(product, limit)?;
        let entry = self.entry_mut(product)?;
        entry.limit = limit;
        entry.amount = entry.amount.min(limit);
        Ok(())
    }

    fn entry_mut(&mut self, product: &str) -> Result<&mut StockEntry> {
        self.stock
            .get_mut(product)
            .ok_or_else(|| MarketError::UnknownProduct(product.to_string()))
    }
}
