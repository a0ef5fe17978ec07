//! Core value types exchanged between buyers, sellers and the directory.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identity of a buyer or seller. Buyers and sellers share one namespace.
pub type Identity = u32;

/// Outstanding demand of a buyer: product -> strictly positive quantity.
pub type WantList = BTreeMap<String, u32>;

/// A seller's advertised terms for one product.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OfferLine {
    /// Units in stock when the offer was built
    pub available: u32,
    /// Price per unit after any loyalty discount
    pub unit_price: f64,
}

/// A seller's reply to an offer request: product -> terms.
///
/// Products the seller does not carry are absent rather than zero.
pub type Offer = BTreeMap<String, OfferLine>;

/// Reduce `want` by the fulfilled quantities, dropping entries that reach zero.
pub fn reduce_want_list(want: &mut WantList, fulfilled: &BTreeMap<String, u32>) {
    for (product, qty) in fulfilled {
        if let Some(need) = want.get_mut(product) {
            *need = need.saturating_sub(*qty);
            if *need == 0 {
                want.remove(product);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_want_list_drops_zeroed_entries() {
        let mut want = WantList::from([("apple".to_string(), 4), ("pear".to_string(), 2)]);
        let fulfilled = BTreeMap::from([("apple".to_string(), 4), ("pear".to_string(), 1)]);

        reduce_want_list(&mut want, &fulfilled);

        assert_eq!(want.get("apple"), None);
        assert_eq!(want.get("pear"), Some(&1));
    }

    #[test]
    fn test_reduce_want_list_ignores_unwanted_products() {
        let mut want = WantList::from([("apple".to_string(), 4)]);
        let fulfilled = BTreeMap::from([("plum".to_string(), 3)]);

        reduce_want_list(&mut want, &fulfilled);

        assert_eq!(want, WantList::from([("apple".to_string(), 4)]));
    }
}
