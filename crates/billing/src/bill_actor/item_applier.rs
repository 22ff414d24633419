//! # Bill Item Applier
//!
//! Validates one item and persists it through the retry executor. Validation failures
//! never reach the store. Items are applied one at a time and independently: the
//! applier keeps no state between calls, so a failed item has no effect on the next.

use crate::bill_actor::BillingError;
use crate::model::{BillId, CurrencySet, ItemId, NewBillItem};
use crate::store::BillStore;
use std::sync::Arc;
use tracing::debug;
use workflow_framework::retry::execute;
use workflow_framework::RetryPolicy;

#[derive(Clone)]
pub struct ItemApplier {
    store: Arc<dyn BillStore>,
    policy: RetryPolicy,
    currencies: Arc<CurrencySet>,
}

impl ItemApplier {
    pub fn new(store: Arc<dyn BillStore>, policy: RetryPolicy, currencies: Arc<CurrencySet>) -> Self {
        Self {
            store,
            policy,
            currencies,
        }
    }

    pub async fn apply(&self, bill_id: BillId, item: &NewBillItem) -> Result<ItemId, BillingError> {
        item.validate(&self.currencies)?;
        let store = &self.store;
        let persisted = execute(&self.policy, "insert_item", move || {
            store.insert_item(bill_id, item.amount, &item.currency)
        })
        .await?;
        debug!(%bill_id, item_id = %persisted.id, "Item persisted");
        Ok(persisted.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FaultyStore, InMemoryBillStore};
    use chrono::{Duration, Utc};

    async fn setup() -> (Arc<FaultyStore<InMemoryBillStore>>, ItemApplier, BillId) {
        let store = Arc::new(FaultyStore::new(InMemoryBillStore::new()));
        let bill = store
            .create_bill(Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        let applier = ItemApplier::new(
            store.clone(),
            RetryPolicy::default(),
            Arc::new(CurrencySet::default()),
        );
        (store, applier, bill.id)
    }

    #[tokio::test]
    async fn test_invalid_item_never_reaches_store() {
        let (store, applier, bill_id) = setup().await;

        let result = applier.apply(bill_id, &NewBillItem::new(100, "ABC")).await;
        assert!(matches!(result, Err(BillingError::Validation(_))));
        let result = applier.apply(bill_id, &NewBillItem::new(0, "USD")).await;
        assert!(matches!(result, Err(BillingError::Validation(_))));

        assert_eq!(store.insert_calls(), 0);
        assert!(store.list_items(bill_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transient_insert_failure_is_retried() {
        let (store, applier, bill_id) = setup().await;
        store.fail_next_inserts(2);

        let item_id = applier
            .apply(bill_id, &NewBillItem::new(100, "USD"))
            .await
            .unwrap();

        assert_eq!(store.insert_calls(), 3);
        let items = store.list_items(bill_id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, item_id);
    }

    #[tokio::test]
    async fn test_exhausted_insert_is_terminal() {
        let (store, applier, bill_id) = setup().await;
        store.fail_next_inserts(3);

        let result = applier.apply(bill_id, &NewBillItem::new(100, "USD")).await;

        assert!(matches!(result, Err(BillingError::Terminal { attempts: 3, .. })));
        assert_eq!(store.insert_calls(), 3);
        assert!(store.list_items(bill_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_bill_is_not_retried() {
        let (store, applier, _) = setup().await;

        let result = applier
            .apply(BillId::new(), &NewBillItem::new(100, "USD"))
            .await;

        assert!(matches!(result, Err(BillingError::NotFound(_))));
        assert_eq!(store.insert_calls(), 1);
    }
}
