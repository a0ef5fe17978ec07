//! Market driver: start every actor, run the buyers, tear everything down.
//!
//! Each buyer runs in its own task. Teardown order is fixed: buyers finish,
//! the shutdown token is cancelled, sellers are stopped and deregistered,
//! buyers deregister, the journal is flushed and finally the actor runtime
//! is shut down.

use std::sync::Arc;
use std::time::Duration;

use acton_reactive::prelude::*;
use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::join_all;
use market_kernel::journal::FlushJournal;
use market_kernel::{Buyer, Catalog, Directory, JournalSummary, Seller, TradeJournal};
use rand::prelude::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::results::{SellerReport, SimulationReport};
use crate::scenario::MarketConfig;

/// How long to wait for the journal to answer a flush.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// A launched market, ready to run.
pub struct Market {
    seed: Option<u64>,
    runtime: ActorRuntime,
    directory: Arc<Directory>,
    shutdown: CancellationToken,
    journal: ActorHandle,
    summaries: mpsc::Receiver<JournalSummary>,
    sellers: Vec<Seller>,
    buyers: Vec<Buyer>,
}

impl Market {
    /// Validate `config` and start the journal, every seller and every buyer.
    pub async fn launch(config: MarketConfig) -> Result<Self> {
        config.validate()?;

        let catalog = Arc::new(config.catalog());
        let directory = Arc::new(Directory::new());
        let shutdown = CancellationToken::new();

        let mut runtime = ActonApp::launch_async().await;
        let (tx, summaries) = mpsc::channel(1);
        let journal = TradeJournal::new(tx).spawn(&mut runtime).await;

        let mut options = config.seller_options();
        options.journal = Some(journal.clone());
        let mut sellers = Vec::with_capacity(config.sellers.len());
        for seller_config in &config.sellers {
            let seller = Seller::spawn(
                seller_config,
                catalog.clone(),
                directory.clone(),
                &shutdown,
                options.clone(),
            )
            .with_context(|| format!("starting seller '{}'", seller_config.name))?;
            sellers.push(seller);
        }

        let buyers = Self::register_buyers(&config, &catalog, &directory);

        info!(
            sellers = sellers.len(),
            buyers = buyers.len(),
            products = catalog.len(),
            seed = ?config.seed,
            "Market launched"
        );

        Ok(Self {
            seed: config.seed,
            runtime,
            directory,
            shutdown,
            journal,
            summaries,
            sellers,
            buyers,
        })
    }

    /// Buyer seeds come from one generator so a seeded market is reproducible.
    fn register_buyers(
        config: &MarketConfig,
        catalog: &Arc<Catalog>,
        directory: &Arc<Directory>,
    ) -> Vec<Buyer> {
        let mut seeds = config.seed.map(StdRng::seed_from_u64);
        (0..config.buyers)
            .map(|i| {
                let seed = seeds.as_mut().map(|rng| rng.random::<u64>());
                Buyer::register(
                    format!("buyer-{i}"),
                    directory.clone(),
                    catalog.clone(),
                    config.buyer_config(seed),
                )
            })
            .collect()
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// Token that stops every buyer and seller when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run every buyer to completion, then tear the market down.
    pub async fn run(self) -> Result<SimulationReport> {
        let started_at = Utc::now();
        let shutdown = self.shutdown.clone();

        let tasks = self.buyers.into_iter().map(|mut buyer| {
            let shutdown = shutdown.clone();
            let id = buyer.id();
            let handle = tokio::spawn(async move {
                let report = buyer.run(&shutdown).await;
                (buyer, report)
            });
            async move { (id, handle.await) }
        });
        let finished = join_all(tasks).await;

        shutdown.cancel();

        // Every actor is torn down before the first failure is reported.
        let mut first_error: Option<anyhow::Error> = None;

        let mut sellers = Vec::with_capacity(self.sellers.len());
        for seller in self.sellers {
            sellers.push(SellerReport {
                seller_id: seller.id(),
                name: seller.name().to_string(),
                stock: seller.stock().await,
            });
            let name = seller.name().to_string();
            if let Err(e) = seller.teardown().await {
                error!(seller = %name, error = %e, "Seller teardown failed");
                first_error.get_or_insert(e.into());
            }
        }

        let mut buyers = Vec::with_capacity(finished.len());
        for (buyer_id, outcome) in finished {
            let result = match outcome {
                Ok((buyer, report)) => {
                    buyers.push(report);
                    buyer.teardown()
                }
                Err(e) => {
                    error!(buyer_id, error = %e, "Buyer task failed");
                    self.directory.deregister(buyer_id)
                }
            };
            if let Err(e) = result {
                error!(buyer_id, error = %e, "Buyer teardown failed");
                first_error.get_or_insert(e.into());
            }
        }

        self.journal.send(FlushJournal).await;
        let mut summaries = self.summaries;
        let journal = match tokio::time::timeout(FLUSH_TIMEOUT, summaries.recv()).await {
            Ok(Some(summary)) => summary,
            _ => {
                warn!("Trade journal did not answer the flush");
                JournalSummary::default()
            }
        };

        let mut runtime = self.runtime;
        let _ = runtime.shutdown_all().await;

        if let Some(e) = first_error {
            return Err(e.context("tearing down the market"));
        }

        let report = SimulationReport {
            run_id: Uuid::new_v4(),
            started_at,
            ended_at: Utc::now(),
            seed: self.seed,
            buyers,
            sellers,
            journal,
        };
        info!(
            run_id = %report.run_id,
            orders = report.orders_accepted(),
            units = report.units_bought(),
            spent = report.spent(),
            duration_ms = report.duration_ms(),
            "Market run complete"
        );
        Ok(report)
    }
}
