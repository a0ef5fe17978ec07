//! Seller actor: serves offer requests and orders against its own book.
//!
//! The loop selects over the shutdown token and the two inbound channels.
//! Each message is handled to completion before the next is taken, so a
//! shutdown never interrupts a half-applied order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use acton_reactive::prelude::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::book::{DEFAULT_DISCOUNT_THRESHOLD, FillOutcome, SellerBook, SharedBook};
use crate::catalog::Catalog;
use crate::config::{ProductConfig, SellerConfig};
use crate::directory::{Directory, SellerChannels};
use crate::error::{MarketError, Result};
use crate::inventory::{Inventory, StockEntry};
use crate::journal::{OrderRejected, TradeSettled};
use crate::messages::{OfferReply, OfferRequest, Order};
use crate::replenisher::{ReplenishPolicy, Replenisher};
use crate::trade::Identity;

/// Runtime settings shared by every seller in a market.
#[derive(Clone)]
pub struct SellerOptions {
    /// Spend a buyer must exceed to earn the loyalty discount
    pub discount_threshold: f64,
    /// Wall-clock length of one replenishment time unit
    pub time_unit: Duration,
    /// Capacity of each inbound channel
    pub queue_capacity: usize,
    /// Journal to notify of order outcomes
    pub journal: Option<ActorHandle>,
}

impl Default for SellerOptions {
    fn default() -> Self {
        Self {
            discount_threshold: DEFAULT_DISCOUNT_THRESHOLD,
            time_unit: Duration::from_secs(1),
            queue_capacity: 64,
            journal: None,
        }
    }
}

/// Owner-side handle to a running seller.
///
/// Dropping the handle does not stop the seller; call
/// [`teardown`](Seller::teardown) to stop its tasks and leave the directory.
#[derive(Debug)]
pub struct Seller {
    id: Identity,
    name: String,
    book: SharedBook,
    replenisher: Replenisher,
    directory: Arc<Directory>,
    catalog: Arc<Catalog>,
    channels: SellerChannels,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Seller {
    /// Validate `config`, register with the directory and start the seller.
    ///
    /// The seller stops taking messages once `shutdown` is cancelled.
    pub fn spawn(
        config: &SellerConfig,
        catalog: Arc<Catalog>,
        directory: Arc<Directory>,
        shutdown: &CancellationToken,
        options: SellerOptions,
    ) -> Result<Self> {
        let specs = config.resolve(&catalog)?;

        let mut inventory = Inventory::new();
        let mut prices = BTreeMap::new();
        let replenisher = Replenisher::new(options.time_unit);
        for (product, spec) in &specs {
            inventory.add_product(product, spec.amount, spec.limit)?;
            prices.insert(product.clone(), spec.price);
            replenisher.add(product, spec.policy)?;
        }
        let book = SharedBook::new(SellerBook::new(inventory, prices, options.discount_threshold));

        let (request_tx, requests) = mpsc::channel(options.queue_capacity);
        let (order_tx, orders) = mpsc::channel(options.queue_capacity);
        let channels = SellerChannels {
            requests: request_tx,
            orders: order_tx,
        };
        let id = directory.register_seller(&config.name, specs.keys(), channels.clone());

        let cancel = shutdown.child_token();
        let service = SellerLoop {
            id,
            book: book.clone(),
            directory: directory.clone(),
            journal: options.journal,
        };
        let tasks = vec![
            tokio::spawn(service.run(requests, orders, cancel.clone())),
            replenisher.spawn(id, book.clone(), cancel.clone()),
        ];

        info!(
            seller_id = id,
            name = %config.name,
            products = specs.len(),
            "Seller started"
        );

        Ok(Self {
            id,
            name: config.name.clone(),
            book,
            replenisher,
            directory,
            catalog,
            channels,
            cancel,
            tasks,
        })
    }

    pub fn id(&self) -> Identity {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The seller's inbound channels, as published in the directory.
    pub fn channels(&self) -> SellerChannels {
        self.channels.clone()
    }

    /// Start carrying a new product and publish it in the directory.
    pub async fn add_product(&self, product: &str, config: &ProductConfig) -> Result<()> {
        let spec = config.resolve(product, &self.catalog)?;
        self.book
            .transact(|book| {
                book.inventory.add_product(product, spec.amount, spec.limit)?;
                book.prices.insert(product.to_string(), spec.price);
                Ok::<_, MarketError>(())
            })
            .await?;
        self.replenisher.add(product, spec.policy)?;
        self.directory.add_seller_product(self.id, product)?;
        debug!(seller_id = self.id, product, "Seller: product added");
        Ok(())
    }

    /// Stop carrying a product. Unknown products are ignored.
    pub async fn remove_product(&self, product: &str) -> Result<()> {
        self.directory.remove_seller_product(self.id, product)?;
        self.replenisher.remove(product);
        self.book
            .transact(|book| {
                book.inventory.remove_product(product);
                book.prices.remove(product);
            })
            .await;
        debug!(seller_id = self.id, product, "Seller: product removed");
        Ok(())
    }

    /// Change a product's capacity limit, discarding stock above it.
    pub async fn set_limit(&self, product: &str, limit: u32) -> Result<()> {
        self.book
            .transact(|book| book.inventory.set_limit(product, limit))
            .await
    }

    pub fn set_replenish_batch(&self, product: &str, batch: u32) -> Result<()> {
        self.replenisher.set_batch(product, batch)
    }

    pub fn set_replenish_period(&self, product: &str, period: u32) -> Result<()> {
        self.replenisher.set_period(product, period)
    }

    pub fn replenish_policy(&self, product: &str) -> Option<ReplenishPolicy> {
        self.replenisher.policy(product)
    }

    /// Current stock of `product`, if carried.
    pub async fn level(&self, product: &str) -> Option<u32> {
        self.book.transact(|book| book.inventory.level(product)).await
    }

    /// List price of `product`, if carried.
    pub async fn price(&self, product: &str) -> Option<f64> {
        self.book.transact(|book| book.price(product)).await
    }

    /// Snapshot of every carried product's stock.
    pub async fn stock(&self) -> BTreeMap<String, StockEntry> {
        self.book
            .transact(|book| {
                book.inventory
                    .entries()
                    .map(|(name, entry)| (name.to_string(), entry))
                    .collect()
            })
            .await
    }

    /// Cumulative qualifying spend recorded for `buyer`.
    pub async fn loyalty_spend(&self, buyer: Identity) -> f64 {
        self.book.transact(|book| book.loyalty.spend(buyer)).await
    }

    /// Stop taking messages. In-flight handling completes first.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Stop the seller's tasks and leave the directory.
    pub async fn teardown(mut self) -> Result<()> {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!(seller_id = self.id, error = %e, "Seller task failed");
            }
        }
        self.directory.deregister(self.id)?;
        info!(seller_id = self.id, name = %self.name, "Seller torn down");
        Ok(())
    }
}

/// State owned by the seller's message loop.
struct SellerLoop {
    id: Identity,
    book: SharedBook,
    directory: Arc<Directory>,
    journal: Option<ActorHandle>,
}

impl SellerLoop {
    async fn run(
        self,
        mut requests: mpsc::Receiver<OfferRequest>,
        mut orders: mpsc::Receiver<Order>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(request) = requests.recv() => self.handle_request(request).await,
                Some(order) = orders.recv() => self.handle_order(order).await,
                else => break,
            }
        }
        debug!(seller_id = self.id, "Seller loop stopped");
    }

    async fn handle_request(&self, request: OfferRequest) {
        if !self.directory.is_active_buyer(request.buyer_id) {
            warn!(
                seller_id = self.id,
                buyer_id = request.buyer_id,
                "Offer request from unknown buyer dropped"
            );
            return;
        }

        let offer = self
            .book
            .transact(|book| book.quote(request.buyer_id, &request.wanted_products))
            .await;
        debug!(
            seller_id = self.id,
            buyer_id = request.buyer_id,
            products = offer.len(),
            "Offer built"
        );

        let reply = OfferReply {
            seller_id: self.id,
            correlation_id: request.correlation_id,
            offer,
        };
        if request.reply_to.try_send(reply).is_err() {
            debug!(
                seller_id = self.id,
                buyer_id = request.buyer_id,
                "Buyer not listening, offer discarded"
            );
        }
    }

    async fn handle_order(&self, order: Order) {
        let buyer_id = order.buyer_id;
        if !self.directory.is_active_buyer(buyer_id) {
            warn!(seller_id = self.id, buyer_id, "Order from unknown buyer dropped");
            return;
        }

        let outcome = self
            .book
            .transact(|book| book.fill(buyer_id, &order.items))
            .await;

        let accepted = match outcome {
            Ok(FillOutcome::Settled { units, value }) => {
                info!(seller_id = self.id, buyer_id, units, value, "Order settled");
                if let Some(journal) = &self.journal {
                    journal
                        .send(TradeSettled {
                            seller_id: self.id,
                            buyer_id,
                            units,
                            value,
                        })
                        .await;
                }
                true
            }
            Ok(FillOutcome::Rejected {
                product,
                requested,
                available,
            }) => {
                debug!(
                    seller_id = self.id,
                    buyer_id,
                    product = %product,
                    requested,
                    available,
                    "Order rejected"
                );
                if let Some(journal) = &self.journal {
                    journal
                        .send(OrderRejected {
                            seller_id: self.id,
                            buyer_id,
                        })
                        .await;
                }
                false
            }
            Err(e) => {
                error!(seller_id = self.id, buyer_id, error = %e, "Order fill failed");
                false
            }
        };

        if order.reply_to.send(accepted).is_err() {
            debug!(seller_id = self.id, buyer_id, "Buyer gone before order confirmation");
        }
    }
}
