//! Buyer actor: browse, rank and order, one shopping cycle at a time.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::BuyerConfig;
use crate::directory::{Directory, SellerChannels};
use crate::error::Result;
use crate::messages::{OfferReply, OfferRequest, Order};
use crate::ranking::{OfferTable, rank_sellers};
use crate::trade::{Identity, Offer, WantList, reduce_want_list};

/// Capacity of a buyer's private reply channel.
const REPLY_CAPACITY: usize = 16;

/// What happened during one shopping cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle: usize,
    pub want_before: WantList,
    pub sellers_discovered: usize,
    pub sellers_unreachable: usize,
    /// Sellers whose offer still had stock after pruning
    pub offers_received: usize,
    pub orders_placed: usize,
    pub orders_accepted: usize,
    pub units_bought: u64,
    /// Value of accepted orders at the offered prices
    pub spent: f64,
    pub want_after: WantList,
}

/// Every cycle a buyer ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuyerReport {
    pub buyer_id: Identity,
    pub name: String,
    pub cycles: Vec<CycleReport>,
}

impl BuyerReport {
    pub fn orders_accepted(&self) -> usize {
        self.cycles.iter().map(|c| c.orders_accepted).sum()
    }

    pub fn units_bought(&self) -> u64 {
        self.cycles.iter().map(|c| c.units_bought).sum()
    }

    pub fn spent(&self) -> f64 {
        self.cycles.iter().map(|c| c.spent).sum()
    }
}

/// A registered buyer and its private reply channel.
#[derive(Debug)]
pub struct Buyer {
    id: Identity,
    name: String,
    directory: Arc<Directory>,
    catalog: Arc<Catalog>,
    config: BuyerConfig,
    rng: StdRng,
    want: WantList,
    replies: mpsc::Receiver<OfferReply>,
    reply_tx: mpsc::Sender<OfferReply>,
    next_correlation: u64,
    cycles_run: usize,
}

impl Buyer {
    /// Register a new buyer with the directory.
    pub fn register(
        name: impl Into<String>,
        directory: Arc<Directory>,
        catalog: Arc<Catalog>,
        config: BuyerConfig,
    ) -> Self {
        let name = name.into();
        let (reply_tx, replies) = mpsc::channel(REPLY_CAPACITY);
        let id = directory.register_buyer(name.clone(), reply_tx.clone());
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        debug!(buyer_id = id, name = %name, "Buyer registered");

        Self {
            id,
            name,
            directory,
            catalog,
            config,
            rng,
            want: WantList::new(),
            replies,
            reply_tx,
            next_correlation: 0,
            cycles_run: 0,
        }
    }

    pub fn id(&self) -> Identity {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn want_list(&self) -> &WantList {
        &self.want
    }

    /// Replace the outstanding want-list. Zero quantities are dropped.
    pub fn set_want_list(&mut self, want: WantList) {
        self.want = want.into_iter().filter(|(_, qty)| *qty > 0).collect();
    }

    /// Run the configured number of cycles, starting no new cycle once
    /// `shutdown` is cancelled.
    pub async fn run(&mut self, shutdown: &CancellationToken) -> BuyerReport {
        let mut report = BuyerReport {
            buyer_id: self.id,
            name: self.name.clone(),
            cycles: Vec::with_capacity(self.config.purchase_cycles),
        };

        for _ in 0..self.config.purchase_cycles {
            if shutdown.is_cancelled() {
                break;
            }
            // A started cycle runs to completion so accepted orders are
            // never lost from the report.
            let cycle = self.shop_cycle().await;
            report.cycles.push(cycle);

            if !self.config.cycle_pause.is_zero() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.cycle_pause) => {}
                }
            }
        }

        info!(
            buyer_id = self.id,
            cycles = report.cycles.len(),
            orders_accepted = report.orders_accepted(),
            units = report.units_bought(),
            "Buyer finished"
        );
        report
    }

    /// One browse, rank and order pass over the current want-list.
    ///
    /// An empty want-list is first refilled from the catalog. Whatever is
    /// still wanted at the end carries over to the next cycle.
    pub async fn shop_cycle(&mut self) -> CycleReport {
        self.cycles_run += 1;
        if self.want.is_empty() {
            self.want = self.catalog.sample_want_list(
                &mut self.rng,
                self.config.max_products,
                self.config.max_quantity,
            );
            debug!(buyer_id = self.id, want = ?self.want, "Want-list generated");
        }

        let mut report = CycleReport {
            cycle: self.cycles_run,
            want_before: self.want.clone(),
            ..Default::default()
        };

        let products: Vec<String> = self.want.keys().cloned().collect();
        let candidates = self.directory.sellers_offering(&products);
        report.sellers_discovered = candidates.len();

        let mut table = OfferTable::new();
        for (&seller_id, channels) in &candidates {
            match self.request_offer(seller_id, channels, &products).await {
                Some(offer) => {
                    if table.insert(seller_id, offer) {
                        report.offers_received += 1;
                    } else {
                        debug!(buyer_id = self.id, seller_id, "Offer empty after pruning");
                    }
                }
                None => {
                    report.sellers_unreachable += 1;
                    warn!(buyer_id = self.id, seller_id, "Seller unreachable this cycle");
                }
            }
        }

        while !self.want.is_empty() {
            let Some(best) = rank_sellers(&table, &self.want).first().copied() else {
                break;
            };
            let Some(offer) = table.remove(best.seller_id) else {
                break;
            };
            let Some(channels) = candidates.get(&best.seller_id) else {
                continue;
            };

            let items = self.order_lines(&offer);
            if items.is_empty() {
                continue;
            }
            let value: f64 = items
                .iter()
                .map(|(product, qty)| f64::from(*qty) * offer[product].unit_price)
                .sum();

            report.orders_placed += 1;
            if self.submit_order(channels, items.clone()).await {
                report.orders_accepted += 1;
                report.units_bought += items.values().map(|q| u64::from(*q)).sum::<u64>();
                report.spent += value;
                reduce_want_list(&mut self.want, &items);
                debug!(
                    buyer_id = self.id,
                    seller_id = best.seller_id,
                    cost = best.cost,
                    remaining = self.want.len(),
                    "Order accepted"
                );
            } else {
                debug!(buyer_id = self.id, seller_id = best.seller_id, "Order rejected");
            }
        }

        report.want_after = self.want.clone();
        report
    }

    /// Lines for every product the offer covers and the buyer still needs,
    /// capped at the advertised amount.
    fn order_lines(&self, offer: &Offer) -> BTreeMap<String, u32> {
        self.want
            .iter()
            .filter_map(|(product, need)| {
                let line = offer.get(product)?;
                let qty = (*need).min(line.available);
                (qty > 0).then(|| (product.clone(), qty))
            })
            .collect()
    }

    /// Ask one seller for an offer, waiting at most `offer_timeout`.
    ///
    /// Replies carrying another correlation id are left over from an
    /// earlier request that timed out and are discarded.
    async fn request_offer(
        &mut self,
        seller_id: Identity,
        channels: &SellerChannels,
        products: &[String],
    ) -> Option<Offer> {
        self.next_correlation += 1;
        let correlation_id = self.next_correlation;
        let deadline = Instant::now() + self.config.offer_timeout;

        let request = OfferRequest {
            buyer_id: self.id,
            correlation_id,
            wanted_products: products.to_vec(),
            reply_to: self.reply_tx.clone(),
        };
        match timeout_at(deadline, channels.requests.send(request)).await {
            Ok(Ok(())) => {}
            _ => return None,
        }

        loop {
            match timeout_at(deadline, self.replies.recv()).await {
                Ok(Some(reply))
                    if reply.correlation_id == correlation_id && reply.seller_id == seller_id =>
                {
                    return Some(reply.offer);
                }
                Ok(Some(stale)) => {
                    debug!(
                        buyer_id = self.id,
                        seller_id = stale.seller_id,
                        correlation_id = stale.correlation_id,
                        "Stale offer discarded"
                    );
                }
                Ok(None) | Err(_) => return None,
            }
        }
    }

    /// Submit an order and wait for the verdict. A closed reply reads as a
    /// rejection.
    async fn submit_order(&self, channels: &SellerChannels, items: BTreeMap<String, u32>) -> bool {
        let (reply_to, verdict) = oneshot::channel();
        let order = Order {
            buyer_id: self.id,
            items,
            reply_to,
        };
        if channels.orders.send(order).await.is_err() {
            return false;
        }
        verdict.await.unwrap_or(false)
    }

    /// Leave the directory.
    pub fn teardown(self) -> Result<()> {
        self.directory.deregister(self.id)?;
        debug!(buyer_id = self.id, "Buyer torn down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::OfferLine;
    use std::time::Duration;

    fn buyer(directory: &Arc<Directory>) -> Buyer {
        Buyer::register(
            "b",
            directory.clone(),
            Arc::new(Catalog::default()),
            BuyerConfig {
                offer_timeout: Duration::from_millis(100),
                seed: Some(7),
                ..Default::default()
            },
        )
    }

    fn seller_channels() -> (SellerChannels, mpsc::Receiver<OfferRequest>, mpsc::Receiver<Order>) {
        let (requests, request_rx) = mpsc::channel(4);
        let (orders, order_rx) = mpsc::channel(4);
        (SellerChannels { requests, orders }, request_rx, order_rx)
    }

    #[test]
    fn test_set_want_list_drops_zero_quantities() {
        let directory = Arc::new(Directory::new());
        let mut b = buyer(&directory);
        b.set_want_list(WantList::from([("apple".into(), 0), ("pear".into(), 2)]));
        assert_eq!(b.want_list(), &WantList::from([("pear".into(), 2)]));
    }

    #[tokio::test]
    async fn test_empty_want_list_is_generated_from_catalog() {
        let directory = Arc::new(Directory::new());
        let catalog = Catalog::default();
        let mut b = buyer(&directory);

        let report = b.shop_cycle().await;
        assert!(!report.want_before.is_empty());
        assert!(report.want_before.keys().all(|p| catalog.contains(p)));
        // No sellers: everything carries over.
        assert_eq!(report.want_after, report.want_before);
        assert_eq!(report.sellers_discovered, 0);
    }

    #[tokio::test]
    async fn test_silent_seller_is_unreachable() {
        let directory = Arc::new(Directory::new());
        let (channels, _requests, _orders) = seller_channels();
        directory.register_seller("mute", ["apple"], channels);

        let mut b = buyer(&directory);
        b.set_want_list(WantList::from([("apple".into(), 4)]));
        let report = b.shop_cycle().await;

        assert_eq!(report.sellers_discovered, 1);
        assert_eq!(report.sellers_unreachable, 1);
        assert_eq!(report.orders_placed, 0);
        assert_eq!(b.want_list(), &WantList::from([("apple".into(), 4)]));
    }

    #[tokio::test]
    async fn test_stale_reply_is_ignored() {
        let directory = Arc::new(Directory::new());
        let (channels, mut requests, mut orders) = seller_channels();
        let seller_id = directory.register_seller("s", ["apple"], channels);

        tokio::spawn(async move {
            let request = requests.recv().await.unwrap();
            let offer = Offer::from([(
                "apple".to_string(),
                OfferLine {
                    available: 10,
                    unit_price: 1.0,
                },
            )]);
            let stale = OfferReply {
                seller_id,
                correlation_id: request.correlation_id + 100,
                offer: Offer::new(),
            };
            request.reply_to.send(stale).await.unwrap();
            let fresh = OfferReply {
                seller_id,
                correlation_id: request.correlation_id,
                offer,
            };
            request.reply_to.send(fresh).await.unwrap();

            let order = orders.recv().await.unwrap();
            assert_eq!(order.items, BTreeMap::from([("apple".to_string(), 4)]));
            order.reply_to.send(true).unwrap();
        });

        let mut b = buyer(&directory);
        b.set_want_list(WantList::from([("apple".into(), 4)]));
        let report = b.shop_cycle().await;

        assert_eq!(report.offers_received, 1);
        assert_eq!(report.orders_accepted, 1);
        assert_eq!(report.units_bought, 4);
        assert!(b.want_list().is_empty());
    }

    #[tokio::test]
    async fn test_order_is_capped_by_advertised_amount() {
        let directory = Arc::new(Directory::new());
        let (channels, mut requests, mut orders) = seller_channels();
        let seller_id = directory.register_seller("s", ["apple"], channels);

        tokio::spawn(async move {
            let request = requests.recv().await.unwrap();
            let reply = OfferReply {
                seller_id,
                correlation_id: request.correlation_id,
                offer: Offer::from([(
                    "apple".to_string(),
                    OfferLine {
                        available: 3,
                        unit_price: 2.0,
                    },
                )]),
            };
            request.reply_to.send(reply).await.unwrap();
            let order = orders.recv().await.unwrap();
            assert_eq!(order.items["apple"], 3);
            order.reply_to.send(true).unwrap();
        });

        let mut b = buyer(&directory);
        b.set_want_list(WantList::from([("apple".into(), 5)]));
        let report = b.shop_cycle().await;

        assert_eq!(report.spent, 6.0);
        assert_eq!(b.want_list(), &WantList::from([("apple".into(), 2)]));
    }

    #[tokio::test]
    async fn test_teardown_deregisters() {
        let directory = Arc::new(Directory::new());
        let b = buyer(&directory);
        let id = b.id();
        assert!(directory.is_active_buyer(id));
        b.teardown().unwrap();
        assert!(!directory.is_active_buyer(id));
    }
}
