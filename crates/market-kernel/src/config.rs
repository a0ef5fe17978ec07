//! Configuration types for sellers and buyers.
//!
//! Every field is optional in the serialized form and falls back to the
//! documented default. Validation happens once, when a seller is built or a
//! product is added, and never silently corrects a bad value.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::catalog::Catalog;
use crate::error::{MarketError, Result};
use crate::replenisher::ReplenishPolicy;

/// Unit price when none is configured.
pub const DEFAULT_PRICE: f64 = 1.0;
/// Opening stock when none is configured.
pub const DEFAULT_AMOUNT: u32 = 5;
/// Capacity limit when none is configured.
pub const DEFAULT_LIMIT: u32 = 100;
/// Hard ceiling on any product's capacity limit.
pub const STOCK_CEILING: u32 = 1000;
/// Replenishment period (market time units) when none is configured.
pub const DEFAULT_CREATE_TIME: u32 = 5;
/// Replenishment batch when none is configured.
pub const DEFAULT_CREATE_AMOUNT: u32 = 1;
/// Largest allowed replenishment period.
pub const MAX_CREATE_TIME: u32 = 1000;
/// Largest allowed replenishment batch.
pub const MAX_CREATE_AMOUNT: u32 = 50;

/// Per-product seller configuration as written in a scenario file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductConfig {
    /// List price per unit (default 1.0, must be >= 0)
    pub price: Option<f64>,
    /// Opening stock (default 5, must be below `limit`)
    pub amount: Option<u32>,
    /// Capacity limit (default 100, at most 1000)
    pub limit: Option<u32>,
    /// Replenishment period in market time units (default 5, 0..=1000)
    pub create_time: Option<u32>,
    /// Units credited per replenishment (default 1, 0..=50)
    pub create_amount: Option<u32>,
}

/// A validated product configuration with defaults applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductSpec {
    pub price: f64,
    pub amount: u32,
    pub limit: u32,
    pub policy: ReplenishPolicy,
}

impl ProductConfig {
    /// Shorthand for a product configured only by its price.
    pub fn priced(price: f64) -> Self {
        Self {
            price: Some(price),
            ..Self::default()
        }
    }

    /// Apply defaults and check every bound.
    pub fn resolve(&self, product: &str, catalog: &Catalog) -> Result<ProductSpec> {
        if !catalog.contains(product) {
            return Err(MarketError::UnknownProduct(product.to_string()));
        }

        let price = self.price.unwrap_or(DEFAULT_PRICE);
        if !price.is_finite() || price < 0.0 {
            return Err(MarketError::config(
                product,
                format!("price must be a non-negative number, got {price}"),
            ));
        }

        let amount = self.amount.unwrap_or(DEFAULT_AMOUNT);
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        validate_limit(product, limit)?;
        if amount >= limit {
            return Err(MarketError::config(
                product,
                format!("amount ({amount}) must be below its limit ({limit})"),
            ));
        }

        let period = self.create_time.unwrap_or(DEFAULT_CREATE_TIME);
        let batch = self.create_amount.unwrap_or(DEFAULT_CREATE_AMOUNT);
        validate_period(product, period)?;
        validate_batch(product, batch)?;

        Ok(ProductSpec {
            price,
            amount,
            limit,
            policy: ReplenishPolicy { period, batch },
        })
    }
}

pub(crate) fn validate_limit(product: &str, limit: u32) -> Result<()> {
    if limit == 0 || limit > STOCK_CEILING {
        return Err(MarketError::config(
            product,
            format!("limit must be within 1..={STOCK_CEILING}, got {limit}"),
        ));
    }
    Ok(())
}

pub(crate) fn validate_period(product: &str, period: u32) -> Result<()> {
    if period > MAX_CREATE_TIME {
        return Err(MarketError::config(
            product,
            format!("create_time must be within 0..={MAX_CREATE_TIME}, got {period}"),
        ));
    }
    Ok(())
}

pub(crate) fn validate_batch(product: &str, batch: u32) -> Result<()> {
    if batch > MAX_CREATE_AMOUNT {
        return Err(MarketError::config(
            product,
            format!("create_amount must be within 0..={MAX_CREATE_AMOUNT}, got {batch}"),
        ));
    }
    Ok(())
}

/// Configuration for one seller: its name and the products it carries.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SellerConfig {
    pub name: String,
    #[serde(default)]
    pub products: BTreeMap<String, ProductConfig>,
}

impl SellerConfig {
    /// A seller carrying `products` with default settings.
    pub fn with_defaults<I, S>(name: impl Into<String>, products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            products: products
                .into_iter()
                .map(|p| (p.into(), ProductConfig::default()))
                .collect(),
        }
    }

    /// Add or replace one product's configuration.
    pub fn product(mut self, name: impl Into<String>, config: ProductConfig) -> Self {
        self.products.insert(name.into(), config);
        self
    }

    /// Resolve every product, failing on the first invalid one.
    pub fn resolve(&self, catalog: &Catalog) -> Result<BTreeMap<String, ProductSpec>> {
        self.products
            .iter()
            .map(|(name, config)| Ok((name.clone(), config.resolve(name, catalog)?)))
            .collect()
    }
}

/// Behaviour of a buyer across its shopping cycles.
#[derive(Debug, Clone)]
pub struct BuyerConfig {
    /// Number of shopping cycles before the buyer is done
    pub purchase_cycles: usize,
    /// Upper bound on distinct products in a generated want-list
    pub max_products: usize,
    /// Upper bound on the quantity wanted per product
    pub max_quantity: u32,
    /// How long to wait for one seller's offer before dropping it
    pub offer_timeout: Duration,
    /// Pause between cycles
    pub cycle_pause: Duration,
    /// Random seed for want-list generation (None for entropy)
    pub seed: Option<u64>,
}

impl Default for BuyerConfig {
    fn default() -> Self {
        Self {
            purchase_cycles: 3,
            max_products: 4,
            max_quantity: 10,
            offer_timeout: Duration::from_millis(500),
            cycle_pause: Duration::ZERO,
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::new(["apple", "banana"])
    }

    #[test]
    fn test_defaults_applied() {
        let spec = ProductConfig::default().resolve("apple", &catalog()).unwrap();
        assert_eq!(spec.price, DEFAULT_PRICE);
        assert_eq!(spec.amount, DEFAULT_AMOUNT);
        assert_eq!(spec.limit, DEFAULT_LIMIT);
        assert_eq!(spec.policy.period, DEFAULT_CREATE_TIME);
        assert_eq!(spec.policy.batch, DEFAULT_CREATE_AMOUNT);
    }

    #[test]
    fn test_unknown_product_rejected() {
        let err = ProductConfig::default()
            .resolve("banana1111", &catalog())
            .unwrap_err();
        assert_eq!(err, MarketError::UnknownProduct("banana1111".to_string()));
    }

    #[test]
    fn test_out_of_bound_fields_rejected() {
        let cases = [
            ProductConfig { price: Some(-1.0), ..Default::default() },
            ProductConfig { price: Some(f64::NAN), ..Default::default() },
            ProductConfig { amount: Some(20), limit: Some(20), ..Default::default() },
            ProductConfig { limit: Some(0), ..Default::default() },
            ProductConfig { limit: Some(1001), ..Default::default() },
            ProductConfig { create_time: Some(1001), ..Default::default() },
            ProductConfig { create_amount: Some(51), ..Default::default() },
        ];

        for config in cases {
            let result = config.resolve("apple", &catalog());
            assert!(
                matches!(result, Err(MarketError::InvalidConfig { .. })),
                "expected rejection for {config:?}"
            );
        }
    }

    #[test]
    fn test_seller_config_from_toml() {
        let text = r#"
            name = "orchard"

            [products.apple]
            price = 5.0
            amount = 10
            limit = 20

            [products.banana]
            create_time = 0
        "#;
        let config: SellerConfig = toml::from_str(text).unwrap();
        let specs = config.resolve(&catalog()).unwrap();

        assert_eq!(specs["apple"].price, 5.0);
        assert_eq!(specs["apple"].amount, 10);
        assert_eq!(specs["apple"].limit, 20);
        assert_eq!(specs["banana"].policy.period, 0);
        assert_eq!(specs["banana"].amount, DEFAULT_AMOUNT);
    }

    #[test]
    fn test_seller_config_fails_on_first_bad_product() {
        let config = SellerConfig::with_defaults("s", ["apple", "kiwi"]);
        assert!(matches!(
            config.resolve(&catalog()),
            Err(MarketError::UnknownProduct(p)) if p == "kiwi"
        ));
    }
}
