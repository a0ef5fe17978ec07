//! Scenario files: one TOML document describing a whole market.
//!
//! ```toml
//! buyers = 4
//! purchase_cycles = 3
//! seed = 42
//!
//! [[sellers]]
//! name = "orchard"
//!
//! [sellers.products.apple]
//! price = 1.0
//! amount = 20
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use market_kernel::{
    BuyerConfig, Catalog, DEFAULT_DISCOUNT_THRESHOLD, SellerConfig, SellerOptions,
};
use serde::Deserialize;

/// Market-wide settings plus every seller's configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarketConfig {
    /// Product names buyers and sellers may use (default: the built-in catalog)
    pub catalog: Option<Vec<String>>,
    /// Milliseconds per replenishment time unit
    pub time_unit_ms: u64,
    /// How long a buyer waits for one offer
    pub offer_timeout_ms: u64,
    /// Pause between a buyer's cycles
    pub cycle_pause_ms: u64,
    /// Spend above which a buyer earns the loyalty discount
    pub discount_threshold: f64,
    /// Capacity of each seller's inbound channels
    pub queue_capacity: usize,
    /// Number of buyers to start
    pub buyers: usize,
    /// Shopping cycles per buyer
    pub purchase_cycles: usize,
    /// Upper bound on distinct products in a generated want-list
    pub max_products: usize,
    /// Upper bound on the quantity wanted per product
    pub max_quantity: u32,
    /// Master seed; buyer seeds are derived from it
    pub seed: Option<u64>,
    pub sellers: Vec<SellerConfig>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        let buyer = BuyerConfig::default();
        Self {
            catalog: None,
            time_unit_ms: 1000,
            offer_timeout_ms: buyer.offer_timeout.as_millis() as u64,
            cycle_pause_ms: 0,
            discount_threshold: DEFAULT_DISCOUNT_THRESHOLD,
            queue_capacity: 64,
            buyers: 3,
            purchase_cycles: buyer.purchase_cycles,
            max_products: buyer.max_products,
            max_quantity: buyer.max_quantity,
            seed: None,
            sellers: Vec::new(),
        }
    }
}

impl MarketConfig {
    /// Read and validate a scenario file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing scenario {}", path.display()))
    }

    /// Parse and validate a scenario from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check market-wide settings and every seller against the catalog.
    pub fn validate(&self) -> Result<()> {
        if self.time_unit_ms == 0 {
            bail!("time_unit_ms must be at least 1");
        }
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be at least 1");
        }
        if self.offer_timeout_ms == 0 {
            bail!("offer_timeout_ms must be at least 1");
        }
        if self.max_products == 0 {
            bail!("max_products must be at least 1");
        }
        if self.max_quantity == 0 {
            bail!("max_quantity must be at least 1");
        }
        if !self.discount_threshold.is_finite() || self.discount_threshold < 0.0 {
            bail!("discount_threshold must be a non-negative number");
        }
        if self.catalog.as_ref().is_some_and(Vec::is_empty) {
            bail!("catalog must name at least one product");
        }

        let catalog = self.catalog();
        for seller in &self.sellers {
            seller
                .resolve(&catalog)
                .with_context(|| format!("seller '{}'", seller.name))?;
        }
        Ok(())
    }

    pub fn catalog(&self) -> Catalog {
        match &self.catalog {
            Some(names) => Catalog::new(names.iter().cloned()),
            None => Catalog::default(),
        }
    }

    /// Buyer behaviour with the given want-list seed.
    pub fn buyer_config(&self, seed: Option<u64>) -> BuyerConfig {
        BuyerConfig {
            purchase_cycles: self.purchase_cycles,
            max_products: self.max_products,
            max_quantity: self.max_quantity,
            offer_timeout: Duration::from_millis(self.offer_timeout_ms),
            cycle_pause: Duration::from_millis(self.cycle_pause_ms),
            seed,
        }
    }

    /// Seller runtime settings without a journal attached.
    pub fn seller_options(&self) -> SellerOptions {
        SellerOptions {
            discount_threshold: self.discount_threshold,
            time_unit: Duration::from_millis(self.time_unit_ms),
            queue_capacity: self.queue_capacity,
            journal: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = MarketConfig::from_toml_str("").unwrap();
        assert_eq!(config, MarketConfig::default());
        assert_eq!(config.catalog().len(), 10);
    }

    #[test]
    fn test_full_scenario() {
        let config = MarketConfig::from_toml_str(
            r#"
            catalog = ["apple", "pear"]
            buyers = 2
            purchase_cycles = 5
            offer_timeout_ms = 50
            seed = 9

            [[sellers]]
            name = "orchard"
            [sellers.products.apple]
            price = 2.5
            amount = 10
            create_time = 0

            [[sellers]]
            name = "stall"
            [sellers.products.pear]
            "#,
        )
        .unwrap();

        assert_eq!(config.sellers.len(), 2);
        assert_eq!(config.sellers[0].products["apple"].price, Some(2.5));
        assert_eq!(config.buyer_config(Some(1)).offer_timeout, Duration::from_millis(50));
        assert_eq!(config.buyer_config(None).purchase_cycles, 5);
        assert_eq!(config.seller_options().time_unit, Duration::from_secs(1));
    }

    #[test]
    fn test_rejects_seller_outside_catalog() {
        let err = MarketConfig::from_toml_str(
            r#"
            catalog = ["apple"]
            [[sellers]]
            name = "odd"
            [sellers.products.durian]
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("odd"));
    }

    #[test]
    fn test_rejects_bad_market_settings() {
        assert!(MarketConfig::from_toml_str("time_unit_ms = 0").is_err());
        assert!(MarketConfig::from_toml_str("queue_capacity = 0").is_err());
        assert!(MarketConfig::from_toml_str("offer_timeout_ms = 0").is_err());
        assert!(MarketConfig::from_toml_str("max_products = 0").is_err());
        assert!(MarketConfig::from_toml_str("max_quantity = 0").is_err());
        assert!(MarketConfig::from_toml_str("discount_threshold = -1.0").is_err());
        assert!(MarketConfig::from_toml_str("catalog = []").is_err());
        assert!(MarketConfig::from_toml_str("unknown_key = 1").is_err());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = MarketConfig::load("/nonexistent/scenario.toml").unwrap_err();
        assert!(format!("{err:#}").contains("reading scenario"));
    }
}
