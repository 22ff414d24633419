//! Fault injection for the persistence collaborator.
//!
//! [`FaultyStore`] wraps any [`BillStore`] and makes the next N inserts or closes fail
//! with `Transient` before reaching the inner store. Inserts and closes can also be
//! slowed down, which keeps a batch or a close in flight while a test acts. It counts
//! calls, which is how tests observe that a close was issued exactly once.

use crate::bill_actor::BillingError;
use crate::model::{Bill, BillId, BillItem, BillItemSummary, BillStatus};
use crate::store::BillStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

pub struct FaultyStore<S> {
    inner: S,
    failing_inserts: AtomicU32,
    failing_closes: AtomicU32,
    closes_always_fail: AtomicBool,
    insert_delay_ms: AtomicU64,
    close_delay_ms: AtomicU64,
    insert_calls: AtomicU32,
    close_calls: AtomicU32,
}

impl<S: BillStore> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing_inserts: AtomicU32::new(0),
            failing_closes: AtomicU32::new(0),
            closes_always_fail: AtomicBool::new(false),
            insert_delay_ms: AtomicU64::new(0),
            close_delay_ms: AtomicU64::new(0),
            insert_calls: AtomicU32::new(0),
            close_calls: AtomicU32::new(0),
        }
    }

    pub fn fail_next_inserts(&self, count: u32) {
        self.failing_inserts.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_closes(&self, count: u32) {
        self.failing_closes.store(count, Ordering::SeqCst);
    }

    /// Every close fails until `heal_closes` is called.
    pub fn fail_all_closes(&self) {
        self.closes_always_fail.store(true, Ordering::SeqCst);
    }

    pub fn heal_closes(&self) {
        self.closes_always_fail.store(false, Ordering::SeqCst);
        self.failing_closes.store(0, Ordering::SeqCst);
    }

    /// Every insert sleeps this long before doing anything else.
    pub fn delay_inserts(&self, delay: std::time::Duration) {
        self.insert_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Every close sleeps this long before doing anything else.
    pub fn delay_closes(&self, delay: std::time::Duration) {
        self.close_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn insert_calls(&self) -> u32 {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

async fn pause(delay_ms: &AtomicU64) {
    let millis = delay_ms.load(Ordering::SeqCst);
    if millis > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
    }
}

fn take_one(budget: &AtomicU32) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl<S: BillStore> BillStore for FaultyStore<S> {
    async fn create_bill(&self, close_date: DateTime<Utc>) -> Result<Bill, BillingError> {
        self.inner.create_bill(close_date).await
    }

    async fn insert_item(
        &self,
        bill_id: BillId,
        amount: i64,
        currency: &str,
    ) -> Result<BillItem, BillingError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        pause(&self.insert_delay_ms).await;
        if take_one(&self.failing_inserts) {
            return Err(BillingError::Transient("injected insert failure".to_string()));
        }
        self.inner.insert_item(bill_id, amount, currency).await
    }

    async fn close_bill(&self, bill_id: BillId) -> Result<Bill, BillingError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        pause(&self.close_delay_ms).await;
        if self.closes_always_fail.load(Ordering::SeqCst) || take_one(&self.failing_closes) {
            return Err(BillingError::Transient("injected close failure".to_string()));
        }
        self.inner.close_bill(bill_id).await
    }

    async fn get_bill(&self, bill_id: BillId) -> Result<Bill, BillingError> {
        self.inner.get_bill(bill_id).await
    }

    async fn list_items(&self, bill_id: BillId) -> Result<Vec<BillItem>, BillingError> {
        self.inner.list_items(bill_id).await
    }

    async fn summarize(&self, bill_id: BillId) -> Result<Vec<BillItemSummary>, BillingError> {
        self.inner.summarize(bill_id).await
    }

    async fn list_bills(&self, status: Option<BillStatus>) -> Result<Vec<Bill>, BillingError> {
        self.inner.list_bills(status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryBillStore;
    use chrono::Duration;

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = FaultyStore::new(InMemoryBillStore::new());
        let bill = store
            .create_bill(Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        store.fail_next_inserts(1);

        assert!(matches!(
            store.insert_item(bill.id, 1, "USD").await,
            Err(BillingError::Transient(_))
        ));
        assert!(store.insert_item(bill.id, 1, "USD").await.is_ok());
        assert_eq!(store.insert_calls(), 2);
        assert_eq!(store.inner().list_items(bill.id).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_close_takes_its_time() {
        let store = FaultyStore::new(InMemoryBillStore::new());
        let bill = store
            .create_bill(Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        store.delay_closes(std::time::Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        store.close_bill(bill.id).await.unwrap();

        assert!(started.elapsed() >= std::time::Duration::from_secs(5));
        assert_eq!(store.close_calls(), 1);
    }
}
