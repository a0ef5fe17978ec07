//! Catalog: the read-only set of product names that may be traded.

use std::collections::BTreeSet;

use rand::prelude::*;

use crate::trade::WantList;

/// Products available when no catalog is configured.
pub const DEFAULT_PRODUCTS: &[&str] = &[
    "apple", "banana", "cherry", "grape", "lemon", "mango", "orange", "peach", "pear", "plum",
];

/// Set of valid product names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    products: BTreeSet<String>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(DEFAULT_PRODUCTS.iter().copied())
    }
}

impl Catalog {
    /// Build a catalog from product names. Duplicates collapse.
    pub fn new<I, S>(products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            products: products.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, product: &str) -> bool {
        self.products.contains(product)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Product names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.products.iter().map(String::as_str)
    }

    /// Draw a random want-list: between 1 and `max_products` distinct
    /// products, each wanted in a quantity between 1 and `max_quantity`.
    ///
    /// `max_products` is capped at the catalog size. Scenario files reject
    /// zero bounds; a zero passed here directly draws as if it were 1.
    /// Returns an empty list only when the catalog itself is empty.
    pub fn sample_want_list(
        &self,
        rng: &mut impl Rng,
        max_products: usize,
        max_quantity: u32,
    ) -> WantList {
        if self.products.is_empty() {
            return WantList::new();
        }

        let upper = max_products.clamp(1, self.products.len());
        let count = rng.random_range(1..=upper);
        let names: Vec<&String> = self.products.iter().collect();
        let chosen: Vec<String> = names
            .choose_multiple(&mut *rng, count)
            .map(|name| (*name).clone())
            .collect();

        chosen
            .into_iter()
            .map(|name| (name, rng.random_range(1..=max_quantity.max(1))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_contains_fruit() {
        let catalog = Catalog::default();
        assert!(catalog.contains("apple"));
        assert!(!catalog.contains("banana1111"));
        assert_eq!(catalog.len(), DEFAULT_PRODUCTS.len());
    }

    #[test]
    fn test_sample_want_list_respects_bounds() {
        let catalog = Catalog::default();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..50 {
            let want = catalog.sample_want_list(&mut rng, 4, 10);
            assert!(!want.is_empty());
            assert!(want.len() <= 4);
            for (product, qty) in &want {
                assert!(catalog.contains(product));
                assert!((1..=10).contains(qty));
            }
        }
    }

    #[test]
    fn test_sample_want_list_is_reproducible_with_seed() {
        let catalog = Catalog::default();
        let a = catalog.sample_want_list(&mut StdRng::seed_from_u64(7), 4, 10);
        let b = catalog.sample_want_list(&mut StdRng::seed_from_u64(7), 4, 10);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_catalog_yields_empty_want_list() {
        let catalog = Catalog::new(Vec::<String>::new());
        let mut rng = StdRng::seed_from_u64(1);
        assert!(catalog.sample_want_list(&mut rng, 4, 10).is_empty());
    }
}
