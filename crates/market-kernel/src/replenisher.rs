//! Replenisher: per-product scheduled restocking of a seller's inventory.
//!
//! Each product cycles `scheduled -> fired -> rescheduled` until it is
//! removed. The schedule is a priority queue of (fire time, insertion
//! sequence, product); the runner task sleeps until the earliest entry is
//! due, credits the inventory through the seller's book and pushes the next
//! firing `period` time units later. Waiting never holds the book lock.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::actors::SharedBook;
use crate::config::{validate_batch, validate_period};
use crate::error::{MarketError, Result};
use crate::trade::Identity;

/// How often and how much of a product is restocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplenishPolicy {
    /// Time units between firings
    pub period: u32,
    /// Units credited per firing
    pub batch: u32,
}

impl ReplenishPolicy {
    /// A zero period or zero batch leaves the product unscheduled.
    pub fn is_active(&self) -> bool {
        self.period > 0 && self.batch > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Pending {
    due: Instant,
    seq: u64,
    product: String,
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    policy: ReplenishPolicy,
    generation: u64,
}

/// Priority queue of pending replenishment firings.
///
/// Removing or rescheduling a product bumps its generation; queue entries
/// from an older generation are discarded when they reach the head.
#[derive(Debug)]
pub struct ReplenishSchedule {
    queue: BinaryHeap<Reverse<Pending>>,
    products: HashMap<String, Scheduled>,
    time_unit: Duration,
    next_seq: u64,
    next_generation: u64,
}

impl ReplenishSchedule {
    pub fn new(time_unit: Duration) -> Self {
        Self {
            queue: BinaryHeap::new(),
            products: HashMap::new(),
            time_unit,
            next_seq: 0,
            next_generation: 0,
        }
    }

    /// Start replenishing `product`; the first firing is one period after `now`.
    pub fn add(&mut self, product: &str, policy: ReplenishPolicy, now: Instant) -> Result<()> {
        if self.products.contains_key(product) {
            return Err(MarketError::AlreadyExists(product.to_string()));
        }
        validate_period(product, policy.period)?;
        validate_batch(product, policy.batch)?;
        self.install(product, policy, now);
        Ok(())
    }

    /// Stop replenishing `product`, cancelling its pending firing.
    pub fn remove(&mut self, product: &str) -> bool {
        self.products.remove(product).is_some()
    }

    pub fn policy(&self, product: &str) -> Option<ReplenishPolicy> {
        self.products.get(product).map(|s| s.policy)
    }

    /// Change the units credited per firing, keeping the current timer.
    pub fn set_batch(&mut self, product: &str, batch: u32, now: Instant) -> Result<()> {
        validate_batch(product, batch)?;
        let current = self.scheduled(product)?;
        let policy = ReplenishPolicy { batch, ..current.policy };
        if current.policy.is_active() && policy.is_active() {
            if let Some(s) = self.products.get_mut(product) {
                s.policy = policy;
            }
        } else {
            self.install(product, policy, now);
        }
        Ok(())
    }

    /// Change the period. The next firing moves to one new period after `now`.
    pub fn set_period(&mut self, product: &str, period: u32, now: Instant) -> Result<()> {
        validate_period(product, period)?;
        let current = self.scheduled(product)?;
        let policy = ReplenishPolicy { period, ..current.policy };
        self.install(product, policy, now);
        Ok(())
    }

    /// Fire time of the earliest live entry.
    pub fn next_due(&mut self) -> Option<Instant> {
        self.discard_stale();
        self.queue.peek().map(|Reverse(p)| p.due)
    }

    /// Pop the earliest entry if it is due at `now`, rescheduling it.
    ///
    /// Returns the product and the batch to credit.
    pub fn pop_due(&mut self, now: Instant) -> Option<(String, u32)> {
        self.discard_stale();
        if self.queue.peek().is_none_or(|Reverse(p)| p.due > now) {
            return None;
        }
        let Reverse(fired) = self.queue.pop()?;
        let scheduled = *self.products.get(&fired.product)?;
        let due = now + self.period(scheduled.policy);
        self.push(fired.product.clone(), due, scheduled.generation);
        Some((fired.product, scheduled.policy.batch))
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    fn scheduled(&self, product: &str) -> Result<Scheduled> {
        self.products
            .get(product)
            .copied()
            .ok_or_else(|| MarketError::UnknownProduct(product.to_string()))
    }

    fn install(&mut self, product: &str, policy: ReplenishPolicy, now: Instant) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.products
            .insert(product.to_string(), Scheduled { policy, generation });
        if policy.is_active() {
            let due = now + self.period(policy);
            self.push(product.to_string(), due, generation);
        }
    }

    fn push(&mut self, product: String, due: Instant, generation: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Pending {
            due,
            seq,
            product,
            generation,
        }));
    }

    fn period(&self, policy: ReplenishPolicy) -> Duration {
        self.time_unit * policy.period
    }

    fn discard_stale(&mut self) {
        while let Some(Reverse(head)) = self.queue.peek() {
            let live = self
                .products
                .get(&head.product)
                .is_some_and(|s| s.generation == head.generation && s.policy.is_active());
            if live {
                break;
            }
            self.queue.pop();
        }
    }
}

/// Handle to a seller's replenishment schedule and its runner task.
#[derive(Debug, Clone)]
pub struct Replenisher {
    schedule: Arc<Mutex<ReplenishSchedule>>,
    wake: Arc<Notify>,
}

impl Replenisher {
    pub fn new(time_unit: Duration) -> Self {
        Self {
            schedule: Arc::new(Mutex::new(ReplenishSchedule::new(time_unit))),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn add(&self, product: &str, policy: ReplenishPolicy) -> Result<()> {
        self.update(|s| s.add(product, policy, Instant::now()))
    }

    pub fn remove(&self, product: &str) -> bool {
        self.update(|s| s.remove(product))
    }

    pub fn set_batch(&self, product: &str, batch: u32) -> Result<()> {
        self.update(|s| s.set_batch(product, batch, Instant::now()))
    }

    pub fn set_period(&self, product: &str, period: u32) -> Result<()> {
        self.update(|s| s.set_period(product, period, Instant::now()))
    }

    pub fn policy(&self, product: &str) -> Option<ReplenishPolicy> {
        self.lock().policy(product)
    }

    /// Spawn the runner. It exits when `cancel` fires.
    pub(crate) fn spawn(
        &self,
        seller_id: Identity,
        book: SharedBook,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run(seller_id, book, cancel).await })
    }

    async fn run(self, seller_id: Identity, book: SharedBook, cancel: CancellationToken) {
        debug!(seller_id, "Replenisher started");
        loop {
            let next_due = self.lock().next_due();
            let wait = async {
                match next_due {
                    Some(due) => sleep_until(due).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.wake.notified() => continue,
                _ = wait => {}
            }

            let now = Instant::now();
            loop {
                let due = self.lock().pop_due(now);
                let Some((product, batch)) = due else {
                    break;
                };
                let credited = book
                    .transact(|book| book.inventory.credit(&product, batch))
                    .await;
                match credited {
                    Ok(level) => trace!(seller_id, product = %product, batch, level, "Replenished"),
                    // The product was withdrawn between the pop and the credit.
                    Err(e) => debug!(seller_id, product = %product, error = %e, "Replenish skipped"),
                }
            }
        }
        debug!(seller_id, "Replenisher stopped");
    }

    fn update<R>(&self, f: impl FnOnce(&mut ReplenishSchedule) -> R) -> R {
        let result = f(&mut self.lock());
        self.wake.notify_one();
        result
    }

    fn lock(&self) -> MutexGuard<'_, ReplenishSchedule> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::SellerBook;
    use crate::inventory::Inventory;

    const UNIT: Duration = Duration::from_millis(10);

    fn policy(period: u32, batch: u32) -> ReplenishPolicy {
        ReplenishPolicy { period, batch }
    }

    #[test]
    fn test_entries_fire_in_due_order_with_insertion_tiebreak() {
        let start = Instant::now();
        let mut schedule = ReplenishSchedule::new(UNIT);
        schedule.add("pear", policy(5, 1), start).unwrap();
        schedule.add("apple", policy(2, 3), start).unwrap();
        schedule.add("banana", policy(5, 2), start).unwrap();

        assert_eq!(schedule.next_due(), Some(start + UNIT * 2));
        assert_eq!(schedule.pop_due(start + UNIT), None);

        let at = start + UNIT * 5;
        assert_eq!(schedule.pop_due(at), Some(("apple".to_string(), 3)));
        assert_eq!(schedule.pop_due(at), Some(("pear".to_string(), 1)));
        assert_eq!(schedule.pop_due(at), Some(("banana".to_string(), 2)));
        assert_eq!(schedule.pop_due(at), None);

        // Every product was pushed one period after it fired.
        assert_eq!(schedule.next_due(), Some(at + UNIT * 2));
    }

    #[test]
    fn test_removed_product_never_fires() {
        let start = Instant::now();
        let mut schedule = ReplenishSchedule::new(UNIT);
        schedule.add("apple", policy(1, 1), start).unwrap();
        assert_eq!(schedule.len(), 1);
        assert!(schedule.remove("apple"));
        assert!(!schedule.remove("apple"));
        assert!(schedule.is_empty());

        assert_eq!(schedule.next_due(), None);
        assert_eq!(schedule.pop_due(start + UNIT * 10), None);
    }

    #[test]
    fn test_zero_period_or_batch_is_unscheduled() {
        let start = Instant::now();
        let mut schedule = ReplenishSchedule::new(UNIT);
        schedule.add("apple", policy(0, 5), start).unwrap();
        schedule.add("pear", policy(3, 0), start).unwrap();
        assert_eq!(schedule.next_due(), None);

        schedule.set_batch("pear", 2, start).unwrap();
        assert_eq!(schedule.next_due(), Some(start + UNIT * 3));
    }

    #[test]
    fn test_set_period_reschedules_and_validates() {
        let start = Instant::now();
        let mut schedule = ReplenishSchedule::new(UNIT);
        schedule.add("apple", policy(100, 1), start).unwrap();

        let later = start + UNIT * 10;
        schedule.set_period("apple", 4, later).unwrap();
        assert_eq!(schedule.next_due(), Some(later + UNIT * 4));
        assert_eq!(schedule.pop_due(later + UNIT * 4), Some(("apple".to_string(), 1)));

        assert!(schedule.set_period("apple", 1001, later).is_err());
        assert!(schedule.set_batch("apple", 51, later).is_err());
        assert!(matches!(
            schedule.set_batch("kiwi", 1, later),
            Err(MarketError::UnknownProduct(_))
        ));
    }

    #[test]
    fn test_add_duplicate_fails() {
        let mut schedule = ReplenishSchedule::new(UNIT);
        schedule.add("apple", policy(1, 1), Instant::now()).unwrap();
        assert_eq!(
            schedule.add("apple", policy(2, 2), Instant::now()),
            Err(MarketError::AlreadyExists("apple".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_credits_and_saturates() {
        let mut inventory = Inventory::new();
        inventory.add_product("apple", 0, 5).unwrap();
        let book = SharedBook::new(SellerBook::new(inventory, Default::default(), 50.0));

        let replenisher = Replenisher::new(UNIT);
        replenisher.add("apple", policy(1, 2)).unwrap();
        let cancel = CancellationToken::new();
        let task = replenisher.spawn(0, book.clone(), cancel.clone());

        tokio::time::sleep(UNIT * 2 + UNIT / 2).await;
        assert_eq!(book.transact(|b| b.inventory.level("apple")).await, Some(4));

        tokio::time::sleep(UNIT * 5).await;
        assert_eq!(book.transact(|b| b.inventory.level("apple")).await, Some(5));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_picks_up_products_added_later() {
        let mut inventory = Inventory::new();
        inventory.add_product("pear", 0, 100).unwrap();
        let book = SharedBook::new(SellerBook::new(inventory, Default::default(), 50.0));

        let replenisher = Replenisher::new(UNIT);
        let cancel = CancellationToken::new();
        let task = replenisher.spawn(0, book.clone(), cancel.clone());

        tokio::time::sleep(UNIT * 3).await;
        replenisher.add("pear", policy(1, 1)).unwrap();
        tokio::time::sleep(UNIT * 3 + UNIT / 2).await;

        assert_eq!(book.transact(|b| b.inventory.level("pear")).await, Some(3));

        cancel.cancel();
        task.await.unwrap();
    }
}
