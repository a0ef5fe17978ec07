//! TradeJournal: market-wide tally of settled and rejected orders.
//!
//! Sellers notify the journal after each order outcome, outside their own
//! lock. The journal is an acton-reactive actor so notifications from every
//! seller are serialized through one mailbox; `FlushJournal` forwards a
//! snapshot to the channel registered at spawn.
//!
//! ```text
//! Seller ── TradeSettled / OrderRejected ──▶ TradeJournal
//! Driver ── FlushJournal ──▶ TradeJournal ── JournalSummary ──▶ mpsc
//! ```

use std::collections::BTreeMap;

use acton_reactive::prelude::*;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::trade::Identity;

/// An order a seller accepted and debited.
#[derive(Debug, Clone)]
pub struct TradeSettled {
    pub seller_id: Identity,
    pub buyer_id: Identity,
    /// Units debited across all line items
    pub units: u32,
    /// Value charged, after any loyalty discount
    pub value: f64,
}

/// An order a seller turned down.
#[derive(Debug, Clone)]
pub struct OrderRejected {
    pub seller_id: Identity,
    pub buyer_id: Identity,
}

/// Ask the journal to publish its current summary.
#[derive(Debug, Clone)]
pub struct FlushJournal;

/// Running totals for one seller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SellerTally {
    pub orders_settled: usize,
    pub orders_rejected: usize,
    pub units_sold: u64,
    pub revenue: f64,
}

/// Snapshot of every seller's tally.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JournalSummary {
    pub sellers: BTreeMap<Identity, SellerTally>,
}

impl JournalSummary {
    pub fn orders_settled(&self) -> usize {
        self.sellers.values().map(|t| t.orders_settled).sum()
    }

    pub fn orders_rejected(&self) -> usize {
        self.sellers.values().map(|t| t.orders_rejected).sum()
    }

    pub fn units_sold(&self) -> u64 {
        self.sellers.values().map(|t| t.units_sold).sum()
    }

    pub fn revenue(&self) -> f64 {
        self.sellers.values().map(|t| t.revenue).sum()
    }
}

/// Actor state for TradeJournal.
#[derive(Default, Clone)]
pub struct TradeJournalState {
    tallies: DashMap<Identity, SellerTally>,
    tx: Option<mpsc::Sender<JournalSummary>>,
}

impl std::fmt::Debug for TradeJournalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeJournalState")
            .field("sellers", &self.tallies.len())
            .field("has_tx", &self.tx.is_some())
            .finish()
    }
}

/// Actor collecting order outcomes from all sellers.
pub struct TradeJournal {
    tx: mpsc::Sender<JournalSummary>,
}

impl TradeJournal {
    /// Create a journal that publishes summaries to `tx`.
    pub fn new(tx: mpsc::Sender<JournalSummary>) -> Self {
        Self { tx }
    }

    /// Spawn the journal actor in the given runtime.
    pub async fn spawn(self, runtime: &mut ActorRuntime) -> ActorHandle {
        let mut actor = runtime.new_actor_with_name::<TradeJournalState>("TradeJournal".to_string());
        actor.model.tx = Some(self.tx);

        actor.mutate_on::<TradeSettled>(|actor, context| {
            let msg = context.message();
            let mut tally = actor.model.tallies.entry(msg.seller_id).or_default();
            tally.orders_settled += 1;
            tally.units_sold += u64::from(msg.units);
            tally.revenue += msg.value;
            tracing::trace!(
                seller_id = msg.seller_id,
                buyer_id = msg.buyer_id,
                units = msg.units,
                value = msg.value,
                "TradeJournal: settlement recorded"
            );
            Reply::ready()
        });

        actor.mutate_on::<OrderRejected>(|actor, context| {
            let msg = context.message();
            actor
                .model
                .tallies
                .entry(msg.seller_id)
                .or_default()
                .orders_rejected += 1;
            tracing::trace!(
                seller_id = msg.seller_id,
                buyer_id = msg.buyer_id,
                "TradeJournal: rejection recorded"
            );
            Reply::ready()
        });

        // mutate_on so a flush observes every notification queued before it
        actor.mutate_on::<FlushJournal>(|actor, _context| {
            let summary = JournalSummary {
                sellers: actor
                    .model
                    .tallies
                    .iter()
                    .map(|entry| (*entry.key(), entry.value().clone()))
                    .collect(),
            };
            let tx = actor.model.tx.clone();

            Reply::pending(async move {
                if let Some(tx) = tx {
                    // Ignore send errors - receiver may have been dropped
                    let _ = tx.send(summary).await;
                }
            })
        });

        actor.start().await
    }
}
