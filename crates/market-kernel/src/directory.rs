//! Directory: the shared registry of buyers and sellers.
//!
//! Issues identities from one namespace shared by buyers and sellers, always
//! handing out the smallest free id. Every operation takes the registry lock
//! exactly once, so registrations, removals and discovery queries never
//! observe each other half-done.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{MarketError, Result};
use crate::messages::{OfferReply, OfferRequest, Order};
use crate::trade::Identity;

/// Inbound channels of a seller.
#[derive(Debug, Clone)]
pub struct SellerChannels {
    pub requests: mpsc::Sender<OfferRequest>,
    pub orders: mpsc::Sender<Order>,
}

/// Registry entry for a buyer.
#[derive(Debug, Clone)]
pub struct BuyerRecord {
    pub name: String,
    pub reply_to: mpsc::Sender<OfferReply>,
}

/// Registry entry for a seller.
#[derive(Debug, Clone)]
pub struct SellerRecord {
    pub name: String,
    pub products: BTreeSet<String>,
    pub channels: SellerChannels,
}

#[derive(Debug, Default)]
struct Registry {
    buyers: BTreeMap<Identity, BuyerRecord>,
    sellers: BTreeMap<Identity, SellerRecord>,
    free_ids: BTreeSet<Identity>,
    next_id: Identity,
}

impl Registry {
    fn allocate_id(&mut self) -> Identity {
        match self.free_ids.pop_first() {
            Some(id) => id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                id
            }
        }
    }

    fn seller_mut(&mut self, id: Identity) -> Result<&mut SellerRecord> {
        if self.buyers.contains_key(&id) {
            return Err(MarketError::InvalidIdentity {
                id,
                reason: "identity belongs to a buyer",
            });
        }
        self.sellers.get_mut(&id).ok_or(MarketError::InvalidIdentity {
            id,
            reason: "no such identity in the directory",
        })
    }
}

/// Process-wide registry of active buyers and sellers.
///
/// Created once by the bootstrap and shared as `Arc<Directory>`.
#[derive(Debug, Default)]
pub struct Directory {
    registry: RwLock<Registry>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the registry half-updated:
    // each mutation is a single insert or remove, so a poisoned guard is safe.
    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a buyer and return its identity.
    pub fn register_buyer(
        &self,
        name: impl Into<String>,
        reply_to: mpsc::Sender<OfferReply>,
    ) -> Identity {
        let name = name.into();
        let mut registry = self.write();
        let id = registry.allocate_id();
        debug!(buyer_id = id, name = %name, "Directory: buyer registered");
        registry.buyers.insert(id, BuyerRecord { name, reply_to });
        id
    }

    /// Register a seller and return its identity.
    ///
    /// The product set is copied; later changes go through
    /// [`add_seller_product`](Self::add_seller_product) and
    /// [`remove_seller_product`](Self::remove_seller_product).
    pub fn register_seller<I, S>(
        &self,
        name: impl Into<String>,
        products: I,
        channels: SellerChannels,
    ) -> Identity
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let record = SellerRecord {
            name: name.into(),
            products: products.into_iter().map(|p| p.as_ref().to_string()).collect(),
            channels,
        };
        let mut registry = self.write();
        let id = registry.allocate_id();
        debug!(
            seller_id = id,
            name = %record.name,
            products = record.products.len(),
            "Directory: seller registered"
        );
        registry.sellers.insert(id, record);
        id
    }

    /// Every seller carrying at least one of `products`, keyed by identity.
    pub fn sellers_offering<I, S>(&self, products: I) -> BTreeMap<Identity, SellerChannels>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted: Vec<S> = products.into_iter().collect();
        let registry = self.read();
        registry
            .sellers
            .iter()
            .filter(|(_, record)| wanted.iter().any(|p| record.products.contains(p.as_ref())))
            .map(|(id, record)| (*id, record.channels.clone()))
            .collect()
    }

    /// Whether `id` names a currently registered buyer.
    pub fn is_active_buyer(&self, id: Identity) -> bool {
        self.read().buyers.contains_key(&id)
    }

    /// Remove a buyer or seller and free its identity for reuse.
    pub fn deregister(&self, id: Identity) -> Result<()> {
        let mut registry = self.write();
        let removed = registry.buyers.remove(&id).is_some() || registry.sellers.remove(&id).is_some();
        if !removed {
            return Err(MarketError::InvalidIdentity {
                id,
                reason: "no such identity in the directory",
            });
        }
        registry.free_ids.insert(id);
        debug!(id, "Directory: identity released");
        Ok(())
    }

    /// Publish an additional product for a seller.
    pub fn add_seller_product(&self, id: Identity, product: &str) -> Result<()> {
        let mut registry = self.write();
        registry.seller_mut(id)?.products.insert(product.to_string());
        Ok(())
    }

    /// Withdraw a product from a seller's published set.
    pub fn remove_seller_product(&self, id: Identity, product: &str) -> Result<()> {
        let mut registry = self.write();
        registry.seller_mut(id)?.products.remove(product);
        Ok(())
    }

    /// Snapshot of a seller's published products.
    pub fn seller_products(&self, id: Identity) -> Option<BTreeSet<String>> {
        self.read().sellers.get(&id).map(|record| record.products.clone())
    }

    pub fn buyer_count(&self) -> usize {
        self.read().buyers.len()
    }

    pub fn seller_count(&self) -> usize {
        self.read().sellers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_channel() -> mpsc::Sender<OfferReply> {
        mpsc::channel(1).0
    }

    fn seller_channels() -> SellerChannels {
        SellerChannels {
            requests: mpsc::channel(1).0,
            orders: mpsc::channel(1).0,
        }
    }

    #[test]
    fn test_identity_reuse_smallest_first() {
        let directory = Directory::new();
        let buyer = directory.register_buyer("b0", reply_channel());
        let seller = directory.register_seller("s1", ["apple"], seller_channels());
        assert_eq!((buyer, seller), (0, 1));

        directory.deregister(buyer).unwrap();
        assert!(!directory.is_active_buyer(0));

        let next = directory.register_buyer("b2", reply_channel());
        assert_eq!(next, 0);
        assert_eq!(directory.register_buyer("b3", reply_channel()), 2);
    }

    #[test]
    fn test_freed_ids_are_reused_in_ascending_order() {
        let directory = Directory::new();
        for i in 0..5 {
            directory.register_buyer(format!("b{i}"), reply_channel());
        }
        directory.deregister(3).unwrap();
        directory.deregister(1).unwrap();

        assert_eq!(directory.register_buyer("x", reply_channel()), 1);
        assert_eq!(directory.register_buyer("y", reply_channel()), 3);
        assert_eq!(directory.register_buyer("z", reply_channel()), 5);
    }

    #[test]
    fn test_deregister_unknown_id_fails() {
        let directory = Directory::new();
        assert!(matches!(
            directory.deregister(7),
            Err(MarketError::InvalidIdentity { id: 7, .. })
        ));

        let id = directory.register_buyer("b", reply_channel());
        directory.deregister(id).unwrap();
        assert!(directory.deregister(id).is_err());
    }

    #[test]
    fn test_is_active_buyer_rejects_sellers_and_unknown() {
        let directory = Directory::new();
        let buyer = directory.register_buyer("b", reply_channel());
        let seller = directory.register_seller("s", ["apple"], seller_channels());

        assert!(directory.is_active_buyer(buyer));
        assert!(!directory.is_active_buyer(seller));
        assert!(!directory.is_active_buyer(99));
    }

    #[test]
    fn test_sellers_offering_intersects_product_sets() {
        let directory = Directory::new();
        let a = directory.register_seller("a", ["apple", "pear"], seller_channels());
        let b = directory.register_seller("b", ["banana"], seller_channels());
        let c = directory.register_seller("c", ["pear"], seller_channels());

        let found: Vec<Identity> = directory
            .sellers_offering(["pear", "plum"])
            .into_keys()
            .collect();
        assert_eq!(found, vec![a, c]);

        let found: Vec<Identity> = directory.sellers_offering(["banana"]).into_keys().collect();
        assert_eq!(found, vec![b]);
        assert!(directory.sellers_offering(["kiwi"]).is_empty());
    }

    #[test]
    fn test_seller_product_changes_are_published() {
        let directory = Directory::new();
        let mut products = vec!["apple".to_string()];
        let seller = directory.register_seller("s", &products, seller_channels());

        // The directory holds its own copy.
        products.push("pear".to_string());
        assert!(directory.sellers_offering(["pear"]).is_empty());

        directory.add_seller_product(seller, "pear").unwrap();
        assert!(directory.sellers_offering(["pear"]).contains_key(&seller));

        directory.remove_seller_product(seller, "apple").unwrap();
        assert!(directory.sellers_offering(["apple"]).is_empty());
        assert_eq!(
            directory.seller_products(seller),
            Some(BTreeSet::from(["pear".to_string()]))
        );
    }

    #[test]
    fn test_seller_product_changes_reject_buyers_and_unknown() {
        let directory = Directory::new();
        let buyer = directory.register_buyer("b", reply_channel());

        assert!(matches!(
            directory.add_seller_product(buyer, "apple"),
            Err(MarketError::InvalidIdentity { reason, .. }) if reason.contains("buyer")
        ));
        assert!(matches!(
            directory.remove_seller_product(42, "apple"),
            Err(MarketError::InvalidIdentity { id: 42, .. })
        ));
    }

    #[test]
    fn test_concurrent_registration_yields_unique_ids() {
        let directory = std::sync::Arc::new(Directory::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let directory = directory.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .map(|j| directory.register_buyer(format!("b{i}-{j}"), reply_channel()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<Identity> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 200);
        assert_eq!(ids.last(), Some(&199));
        assert_eq!(directory.buyer_count(), 200);
    }
}
