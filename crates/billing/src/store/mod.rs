//! # Persistence Collaborator
//!
//! [`BillStore`] is the system of record for bills and their items. The orchestration
//! core reaches it only through the retry executor, so every method classifies its
//! failures through [`BillingError`]: `Transient` is retried, everything else aborts.
//!
//! Two mutations exist and both are safe under concurrency without a lock held across
//! the call: `insert_item` only appends, and `close_bill` is a conditional update that
//! succeeds only while the bill is still `Open`.

pub mod faulty;
pub mod memory;

pub use faulty::FaultyStore;
pub use memory::InMemoryBillStore;

use crate::bill_actor::BillingError;
use crate::model::{Bill, BillId, BillItem, BillItemSummary, BillStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait BillStore: Send + Sync {
    /// Persists a new `Open` bill. Fails with `Validation` unless `close_date` is in the future.
    async fn create_bill(&self, close_date: DateTime<Utc>) -> Result<Bill, BillingError>;

    /// Appends one item. Fails with `NotFound` for an unknown bill.
    async fn insert_item(
        &self,
        bill_id: BillId,
        amount: i64,
        currency: &str,
    ) -> Result<BillItem, BillingError>;

    /// Moves the bill to `Closed` only if it is currently `Open`.
    ///
    /// Fails with `NotFound` or `AlreadyClosed` otherwise; neither changes anything.
    async fn close_bill(&self, bill_id: BillId) -> Result<Bill, BillingError>;

    /// Loads a bill together with its items.
    async fn get_bill(&self, bill_id: BillId) -> Result<Bill, BillingError>;

    async fn list_items(&self, bill_id: BillId) -> Result<Vec<BillItem>, BillingError>;

    /// Per-currency totals over the persisted items.
    async fn summarize(&self, bill_id: BillId) -> Result<Vec<BillItemSummary>, BillingError>;

    /// Bills in creation order, optionally filtered by status. Items are not loaded.
    async fn list_bills(&self, status: Option<BillStatus>) -> Result<Vec<Bill>, BillingError>;
}
