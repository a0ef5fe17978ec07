//! Report of one simulation run, written as JSON.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use market_kernel::{BuyerReport, Identity, JournalSummary, StockEntry};
use serde::Serialize;
use uuid::Uuid;

/// Final stock of one seller.
#[derive(Debug, Clone, Serialize)]
pub struct SellerReport {
    pub seller_id: Identity,
    pub name: String,
    pub stock: BTreeMap<String, StockEntry>,
}

/// Everything observed during one run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Unique id of this run
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Master seed, if the run was seeded
    pub seed: Option<u64>,
    pub buyers: Vec<BuyerReport>,
    pub sellers: Vec<SellerReport>,
    /// Seller-side totals as recorded by the trade journal
    pub journal: JournalSummary,
}

impl SimulationReport {
    /// Orders accepted across all buyers.
    pub fn orders_accepted(&self) -> usize {
        self.buyers.iter().map(BuyerReport::orders_accepted).sum()
    }

    pub fn units_bought(&self) -> u64 {
        self.buyers.iter().map(BuyerReport::units_bought).sum()
    }

    pub fn spent(&self) -> f64 {
        self.buyers.iter().map(BuyerReport::spent).sum()
    }

    /// Buyers whose last cycle ended with an empty want-list.
    pub fn satisfied_buyers(&self) -> usize {
        self.buyers
            .iter()
            .filter(|b| b.cycles.last().is_some_and(|c| c.want_after.is_empty()))
            .count()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }

    /// Save the report as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing report {}", path.display()))?;
        Ok(())
    }
}
