use crate::bill_actor::BillingError;
use crate::model::{
    summarize_items, validate_close_date, Bill, BillId, BillItem, BillItemSummary, BillStatus,
    ItemId,
};
use crate::store::BillStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

struct StoredBill {
    bill: Bill,
    items: Vec<BillItem>,
}

/// Bill store kept in process memory.
///
/// Each method takes the lock once, so `close_bill` checks and flips the status
/// atomically. Bill ids are v7 uuids, which keeps the map in creation order.
#[derive(Default)]
pub struct InMemoryBillStore {
    bills: Mutex<BTreeMap<BillId, StoredBill>>,
}

impl InMemoryBillStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bills(&self) -> Result<MutexGuard<'_, BTreeMap<BillId, StoredBill>>, BillingError> {
        self.bills
            .lock()
            .map_err(|_| BillingError::Transient("bill store lock poisoned".to_string()))
    }
}

fn not_found(bill_id: BillId) -> BillingError {
    BillingError::NotFound(bill_id.to_string())
}

#[async_trait]
impl BillStore for InMemoryBillStore {
    async fn create_bill(&self, close_date: DateTime<Utc>) -> Result<Bill, BillingError> {
        validate_close_date(close_date, Utc::now())?;
        let bill = Bill {
            id: BillId::new(),
            close_date,
            status: BillStatus::Open,
            closed_at: None,
            items: Vec::new(),
        };
        self.bills()?.insert(
            bill.id,
            StoredBill {
                bill: bill.clone(),
                items: Vec::new(),
            },
        );
        debug!(bill_id = %bill.id, %close_date, "Bill row inserted");
        Ok(bill)
    }

    async fn insert_item(
        &self,
        bill_id: BillId,
        amount: i64,
        currency: &str,
    ) -> Result<BillItem, BillingError> {
        let mut bills = self.bills()?;
        let stored = bills.get_mut(&bill_id).ok_or_else(|| not_found(bill_id))?;
        let item = BillItem {
            id: ItemId::new(),
            bill_id,
            amount,
            currency: currency.to_string(),
        };
        stored.items.push(item.clone());
        Ok(item)
    }

    async fn close_bill(&self, bill_id: BillId) -> Result<Bill, BillingError> {
        let mut bills = self.bills()?;
        let stored = bills.get_mut(&bill_id).ok_or_else(|| not_found(bill_id))?;
        if stored.bill.status != BillStatus::Open {
            return Err(BillingError::AlreadyClosed(bill_id.to_string()));
        }
        stored.bill.status = BillStatus::Closed;
        stored.bill.closed_at = Some(Utc::now());
        Ok(stored.bill.clone())
    }

    async fn get_bill(&self, bill_id: BillId) -> Result<Bill, BillingError> {
        let bills = self.bills()?;
        let stored = bills.get(&bill_id).ok_or_else(|| not_found(bill_id))?;
        Ok(Bill {
            items: stored.items.clone(),
            ..stored.bill.clone()
        })
    }

    async fn list_items(&self, bill_id: BillId) -> Result<Vec<BillItem>, BillingError> {
        let bills = self.bills()?;
        let stored = bills.get(&bill_id).ok_or_else(|| not_found(bill_id))?;
        Ok(stored.items.clone())
    }

    async fn summarize(&self, bill_id: BillId) -> Result<Vec<BillItemSummary>, BillingError> {
        let bills = self.bills()?;
        let stored = bills.get(&bill_id).ok_or_else(|| not_found(bill_id))?;
        summarize_items(&stored.items)
    }

    async fn list_bills(&self, status: Option<BillStatus>) -> Result<Vec<Bill>, BillingError> {
        let bills = self.bills()?;
        Ok(bills
            .values()
            .filter(|stored| status.map_or(true, |s| stored.bill.status == s))
            .map(|stored| stored.bill.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_create_rejects_past_close_date() {
        let store = InMemoryBillStore::new();
        let result = store.create_bill(Utc::now() - Duration::hours(1)).await;
        assert!(matches!(result, Err(BillingError::Validation(_))));
        assert!(store.list_bills(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_is_conditional() {
        let store = InMemoryBillStore::new();
        let bill = store
            .create_bill(Utc::now() + Duration::hours(1))
            .await
            .unwrap();

        let closed = store.close_bill(bill.id).await.unwrap();
        assert_eq!(closed.status, BillStatus::Closed);
        assert!(closed.closed_at.is_some());

        assert!(matches!(
            store.close_bill(bill.id).await,
            Err(BillingError::AlreadyClosed(_))
        ));
        let reread = store.get_bill(bill.id).await.unwrap();
        assert_eq!(reread.closed_at, closed.closed_at);

        assert!(matches!(
            store.close_bill(BillId::new()).await,
            Err(BillingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_items_and_summary() {
        let store = InMemoryBillStore::new();
        let bill = store
            .create_bill(Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        store.insert_item(bill.id, 100, "USD").await.unwrap();
        store.insert_item(bill.id, 50, "USD").await.unwrap();
        store.insert_item(bill.id, 7, "GEL").await.unwrap();

        assert_eq!(store.list_items(bill.id).await.unwrap().len(), 3);
        assert_eq!(store.get_bill(bill.id).await.unwrap().items.len(), 3);
        let totals = store.summarize(bill.id).await.unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[1].currency, "USD");
        assert_eq!(totals[1].total_amount, 150);

        assert!(matches!(
            store.insert_item(BillId::new(), 1, "USD").await,
            Err(BillingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_summary_reports_overflowing_total() {
        let store = InMemoryBillStore::new();
        let bill = store
            .create_bill(Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        store.insert_item(bill.id, i64::MAX, "USD").await.unwrap();
        store.insert_item(bill.id, 1, "USD").await.unwrap();

        assert!(matches!(
            store.summarize(bill.id).await,
            Err(BillingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_list_bills_filters_by_status() {
        let store = InMemoryBillStore::new();
        let first = store
            .create_bill(Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        let second = store
            .create_bill(Utc::now() + Duration::hours(2))
            .await
            .unwrap();
        store.close_bill(first.id).await.unwrap();

        let all = store.list_bills(None).await.unwrap();
        assert_eq!(
            all.iter().map(|b| b.id).collect::<Vec<_>>(),
            vec![first.id, second.id]
        );
        let open = store.list_bills(Some(BillStatus::Open)).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, second.id);
    }
}
