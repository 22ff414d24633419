//! # Bill Client
//!
//! Provides a high‑level API for interacting with one bill run.
//! It wraps a `RunClient<BillWorkflow>` and turns framework errors back into
//! [`BillingError`].
use crate::bill_actor::{BatchOutcome, BillSnapshot, BillWorkflow, BillingError, CloseSignal};
use crate::model::{BillId, NewBillItem};
use tracing::{debug, instrument};
use workflow_framework::{FrameworkError, RunClient, UpdateId};

/// Client for interacting with a bill run.
#[derive(Clone)]
pub struct BillClient {
    bill_id: BillId,
    inner: RunClient<BillWorkflow>,
}

impl BillClient {
    pub fn new(bill_id: BillId, inner: RunClient<BillWorkflow>) -> Self {
        Self { bill_id, inner }
    }

    pub fn bill_id(&self) -> BillId {
        self.bill_id
    }

    /// Submits a batch under a fresh update id and waits for every item to be attempted.
    pub async fn add_items(&self, items: Vec<NewBillItem>) -> Result<BatchOutcome, BillingError> {
        self.add_items_with_id(UpdateId::new(), items).await
    }

    /// Submits a batch under a caller-chosen id. Resubmitting a completed id returns the
    /// recorded outcome without applying anything again.
    #[instrument(skip(self, items), fields(bill_id = %self.bill_id, items = items.len()))]
    pub async fn add_items_with_id(
        &self,
        update_id: UpdateId,
        items: Vec<NewBillItem>,
    ) -> Result<BatchOutcome, BillingError> {
        debug!(?items, "Sending batch");
        self.inner
            .update(update_id, items)
            .await
            .map_err(BillingError::from)
    }

    /// Sends the manual close signal.
    ///
    /// Returns `false` when the run no longer listens for it, which happens once the
    /// close race has been decided.
    #[instrument(skip(self), fields(bill_id = %self.bill_id))]
    pub async fn close(&self) -> Result<bool, BillingError> {
        match self.inner.signal(CloseSignal::now()).await {
            Ok(()) => Ok(true),
            Err(FrameworkError::RunClosed) => {
                debug!("Run no longer listens for close");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn snapshot(&self) -> Result<BillSnapshot, BillingError> {
        self.inner.query().await.map_err(BillingError::from)
    }

    /// True once the run stopped accepting requests.
    pub fn is_finished(&self) -> bool {
        self.inner.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bill_actor::{ItemOutcome, ItemResult, RunPhase};
    use crate::model::ItemId;
    use chrono::Utc;
    use workflow_framework::mock::{create_mock_client, expect_signal, expect_update, MockClient};

    #[tokio::test]
    async fn test_add_items_forwards_batch() {
        let bill_id = BillId::new();
        let (client, mut mailbox) = create_mock_client::<BillWorkflow>(4);
        let client = BillClient::new(bill_id, client);
        let update_id = UpdateId::new();

        let handle = tokio::spawn(async move {
            client
                .add_items_with_id(update_id, vec![NewBillItem::new(100, "USD")])
                .await
        });

        let (received_id, items, respond_to) = expect_update(&mut mailbox.requests).await.unwrap();
        assert_eq!(received_id, update_id);
        assert_eq!(items, vec![NewBillItem::new(100, "USD")]);
        let outcome = BatchOutcome {
            update_id,
            results: vec![ItemResult {
                index: 0,
                item: items[0].clone(),
                outcome: ItemOutcome::Applied {
                    item_id: ItemId::new(),
                },
            }],
        };
        respond_to.send(Ok(outcome.clone())).unwrap();

        assert_eq!(handle.await.unwrap().unwrap(), outcome);
    }

    #[tokio::test]
    async fn test_workflow_rejection_is_unwrapped() {
        let bill_id = BillId::new();
        let mut mock = MockClient::<BillWorkflow>::new();
        mock.expect_update()
            .return_err(FrameworkError::workflow(BillingError::AlreadyClosed(
                bill_id.to_string(),
            )));
        let client = BillClient::new(bill_id, mock.client());

        let result = client.add_items(vec![NewBillItem::new(1, "GEL")]).await;

        assert_eq!(result, Err(BillingError::AlreadyClosed(bill_id.to_string())));
        mock.verify();
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let bill_id = BillId::new();
        let mut mock = MockClient::<BillWorkflow>::new();
        let snapshot = BillSnapshot {
            bill_id,
            phase: RunPhase::Open,
            close_date: Utc::now(),
            trigger: None,
            items_applied: 2,
            items_failed: 0,
            failure: None,
        };
        mock.expect_query().return_ok(snapshot.clone());
        let client = BillClient::new(bill_id, mock.client());

        assert_eq!(client.snapshot().await.unwrap(), snapshot);
        mock.verify();
    }

    #[tokio::test]
    async fn test_close_sends_signal() {
        let (client, mut mailbox) = create_mock_client::<BillWorkflow>(4);
        let client = BillClient::new(BillId::new(), client);

        assert!(client.close().await.unwrap());
        assert!(expect_signal::<BillWorkflow>(&mut mailbox.signals)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_close_after_run_stopped_listening() {
        let (client, mailbox) = create_mock_client::<BillWorkflow>(4);
        let client = BillClient::new(BillId::new(), client);
        drop(mailbox);

        assert!(!client.close().await.unwrap());
        assert!(client.is_finished());
        assert!(matches!(
            client.snapshot().await,
            Err(BillingError::Unavailable(_))
        ));
    }
}
