use crate::bill_actor::{
    BatchOutcome, BillContext, BillEvent, BillOrchestrator, BillSnapshot, BillWorkflow,
    BillingError, RunPhase, RunState,
};
use crate::clients::BillClient;
use crate::config::{BillingConfig, ConfigError};
use crate::model::{Bill, BillId, BillStatus, BillSummary, NewBillItem};
use crate::store::{BillStore, InMemoryBillStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use workflow_framework::{channel, FileHistory, HistoryStore, InMemoryHistory, UpdateId, Workflow};

type RunResult = Option<Result<RunPhase, BillingError>>;

struct RunHandle {
    client: BillClient,
    task: JoinHandle<()>,
    done: watch::Receiver<RunResult>,
}

impl RunHandle {
    /// A run stops being live once it has published its result.
    fn is_live(&self) -> bool {
        self.done.borrow().is_none() && !self.task.is_finished()
    }
}

/// The runtime that owns every bill run.
///
/// `BillingSystem` is responsible for:
/// - **Run identity**: at most one live run per bill id
/// - **Dependency wiring**: every run gets the same store, history and policy
/// - **Recovery**: resuming runs from their history after a restart
/// - **Read path**: bill, summary and listing queries against the store
///
/// # Example
///
/// ```ignore
/// let system = BillingSystem::in_memory(BillingConfig::default())?;
/// let bill = system.create_bill(Utc::now() + Duration::hours(1)).await?;
/// system.add_items(bill.id, vec![NewBillItem::new(100, "USD")]).await?;
/// system.close_bill(bill.id).await?;
/// system.shutdown().await?;
/// ```
pub struct BillingSystem {
    config: BillingConfig,
    ctx: BillContext,
    runs: Mutex<HashMap<BillId, RunHandle>>,
    shutdown: watch::Sender<bool>,
}

impl BillingSystem {
    /// Creates a system over the given collaborators. No run is started.
    pub fn new(
        config: BillingConfig,
        store: Arc<dyn BillStore>,
        history: Arc<dyn HistoryStore<BillEvent>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let ctx = BillContext {
            store,
            history,
            policy: config.retry_policy(),
            currencies: Arc::new(config.currency_set()),
            task_queue: config.task_queue.clone(),
            shutdown: shutdown_rx,
        };
        info!(task_queue = %config.task_queue, "Billing system ready");
        Ok(Self {
            config,
            ctx,
            runs: Mutex::new(HashMap::new()),
            shutdown,
        })
    }

    /// In-memory store and history.
    pub fn in_memory(config: BillingConfig) -> Result<Self, ConfigError> {
        Self::new(
            config,
            Arc::new(InMemoryBillStore::new()),
            Arc::new(InMemoryHistory::<BillEvent>::new()),
        )
    }

    /// In-memory store; file history when `history_dir` is configured.
    pub async fn from_config(config: BillingConfig) -> Result<Self, ConfigError> {
        let history: Arc<dyn HistoryStore<BillEvent>> = match &config.history_dir {
            Some(dir) => Arc::new(
                FileHistory::<BillEvent>::open(dir)
                    .await
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?,
            ),
            None => Arc::new(InMemoryHistory::<BillEvent>::new()),
        };
        Self::new(config, Arc::new(InMemoryBillStore::new()), history)
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn BillStore> {
        &self.ctx.store
    }

    fn runs(&self) -> Result<MutexGuard<'_, HashMap<BillId, RunHandle>>, BillingError> {
        self.runs
            .lock()
            .map_err(|_| BillingError::Orchestration("run registry lock poisoned".to_string()))
    }

    /// Client of the bill's run while it is live.
    pub fn client(&self, bill_id: BillId) -> Option<BillClient> {
        let runs = self.runs().ok()?;
        runs.get(&bill_id)
            .filter(|h| h.is_live())
            .map(|h| h.client.clone())
    }

    fn spawn_run(
        &self,
        bill_id: BillId,
        close_date: DateTime<Utc>,
    ) -> Result<BillClient, BillingError> {
        let mut runs = self.runs()?;
        if runs.get(&bill_id).is_some_and(RunHandle::is_live) {
            return Err(BillingError::AlreadyRunning(bill_id.to_string()));
        }

        let (client, mailbox) = channel::<BillWorkflow>(self.config.mailbox_capacity);
        let client = BillClient::new(bill_id, client);
        let (done_tx, done) = watch::channel(None);
        let orchestrator = BillOrchestrator::new(bill_id, close_date, mailbox);
        let ctx = self.ctx.clone();
        let task = tokio::spawn(async move {
            let result = orchestrator.run(ctx).await;
            let _ = done_tx.send(Some(result));
        });
        debug!(%bill_id, "Run spawned");

        runs.insert(
            bill_id,
            RunHandle {
                client: client.clone(),
                task,
                done,
            },
        );
        Ok(client)
    }

    /// Persists a new bill and starts its run.
    #[instrument(skip(self))]
    pub async fn create_bill(&self, close_date: DateTime<Utc>) -> Result<Bill, BillingError> {
        let bill = self.ctx.store.create_bill(close_date).await?;
        self.spawn_run(bill.id, bill.close_date)?;
        info!(bill_id = %bill.id, "Bill created");
        Ok(bill)
    }

    pub async fn add_items(
        &self,
        bill_id: BillId,
        items: Vec<NewBillItem>,
    ) -> Result<BatchOutcome, BillingError> {
        self.add_items_with_id(bill_id, UpdateId::new(), items).await
    }

    /// Routes a batch to the bill's run.
    ///
    /// Without a live run, a resubmitted id gets its recorded outcome and anything else
    /// is refused: `AlreadyClosed` or `NotFound` from the store, `Unavailable` for a bill
    /// still open.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn add_items_with_id(
        &self,
        bill_id: BillId,
        update_id: UpdateId,
        items: Vec<NewBillItem>,
    ) -> Result<BatchOutcome, BillingError> {
        let mut refusal = None;
        if let Some(client) = self.client(bill_id) {
            match client.add_items_with_id(update_id, items).await {
                Err(BillingError::Unavailable(reason)) => {
                    debug!(%reason, "Run stopped while the batch was sent");
                    refusal = Some(reason);
                }
                other => return other,
            }
        }

        if let Some(outcome) = self
            .load_state(bill_id)
            .await?
            .and_then(|state| state.completed_update(&update_id))
        {
            return Ok(outcome);
        }
        let bill = self.ctx.store.get_bill(bill_id).await?;
        match bill.status {
            BillStatus::Closed => Err(BillingError::AlreadyClosed(bill_id.to_string())),
            BillStatus::Open => Err(BillingError::Unavailable(
                refusal.unwrap_or_else(|| format!("no live run for {bill_id}")),
            )),
        }
    }

    /// Requests an early close.
    ///
    /// Inert for a bill that is already closed or whose race was already decided. A
    /// bill left `Open` without a live run (crashed, or the close ran out of retries)
    /// gets its run resumed, which closes it.
    #[instrument(skip(self))]
    pub async fn close_bill(&self, bill_id: BillId) -> Result<(), BillingError> {
        if let Some(client) = self.client(bill_id) {
            if client.close().await? {
                info!("Close signal delivered");
                return Ok(());
            }
        }

        let bill = self.ctx.store.get_bill(bill_id).await?;
        if !bill.is_open() {
            debug!("Bill already closed, close request is inert");
            return Ok(());
        }
        if self.client(bill_id).is_some() {
            debug!("Race already decided, close is in progress");
            return Ok(());
        }

        warn!("Bill is open without a live run, resuming it");
        let client = self.resume_with(bill_id, bill.close_date).await?;
        client.close().await?;
        Ok(())
    }

    async fn load_state(&self, bill_id: BillId) -> Result<Option<RunState>, BillingError> {
        let events = self
            .ctx
            .history
            .load(&BillWorkflow::run_id(&bill_id))
            .await?;
        RunState::replay(&events)
    }

    /// Starts a new run for an existing bill, picking up its history.
    ///
    /// Fails with `AlreadyRunning` while another run for the bill is live.
    #[instrument(skip(self))]
    pub async fn resume_run(&self, bill_id: BillId) -> Result<BillClient, BillingError> {
        let bill = self.ctx.store.get_bill(bill_id).await?;
        self.resume_with(bill_id, bill.close_date).await
    }

    /// The durable close date from history wins over `fallback_close_date`.
    async fn resume_with(
        &self,
        bill_id: BillId,
        fallback_close_date: DateTime<Utc>,
    ) -> Result<BillClient, BillingError> {
        let close_date = self
            .load_state(bill_id)
            .await?
            .map_or(fallback_close_date, |state| state.close_date());
        self.spawn_run(bill_id, close_date)
    }

    /// Resumes every run that was interrupted before reaching a terminal phase, plus
    /// open bills that never got a history. Returns the resumed bill ids.
    ///
    /// Runs whose close failed terminally are left alone; `close_bill` retries them.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<Vec<BillId>, BillingError> {
        let mut resumed = Vec::new();
        let mut with_history = Vec::new();

        for run_id in self.ctx.history.list_runs().await? {
            let bill_id: BillId = match run_id.parse() {
                Ok(id) => id,
                Err(e) => {
                    warn!(%run_id, error = %e, "Skipping unknown history");
                    continue;
                }
            };
            with_history.push(bill_id);
            let Some(state) = self.load_state(bill_id).await? else {
                continue;
            };
            if state.is_terminal() || self.client(bill_id).is_some() {
                continue;
            }
            info!(%bill_id, phase = ?state.phase(), "Resuming run");
            self.spawn_run(bill_id, state.close_date())?;
            resumed.push(bill_id);
        }

        for bill in self.ctx.store.list_bills(Some(BillStatus::Open)).await? {
            if with_history.contains(&bill.id) || self.client(bill.id).is_some() {
                continue;
            }
            info!(bill_id = %bill.id, "Starting run for open bill without history");
            self.spawn_run(bill.id, bill.close_date)?;
            resumed.push(bill.id);
        }

        info!(count = resumed.len(), "Recovery complete");
        Ok(resumed)
    }

    /// Loads a bill with its items.
    pub async fn get_bill(&self, bill_id: BillId) -> Result<Bill, BillingError> {
        self.ctx.store.get_bill(bill_id).await
    }

    pub async fn list_bills(&self, status: Option<BillStatus>) -> Result<Vec<Bill>, BillingError> {
        self.ctx.store.list_bills(status).await
    }

    /// Per-currency totals of a closed bill. Refused with `StillOpen` before closure.
    #[instrument(skip(self))]
    pub async fn summary(&self, bill_id: BillId) -> Result<BillSummary, BillingError> {
        let bill = self.ctx.store.get_bill(bill_id).await?;
        if bill.is_open() {
            return Err(BillingError::StillOpen(bill_id.to_string()));
        }
        let totals = self.ctx.store.summarize(bill_id).await?;
        Ok(BillSummary {
            bill_id,
            status: bill.status,
            closed_at: bill.closed_at,
            items: bill.items,
            totals,
        })
    }

    /// Live snapshot from the run, or the last recorded one when it has stopped.
    pub async fn snapshot(&self, bill_id: BillId) -> Result<BillSnapshot, BillingError> {
        if let Some(client) = self.client(bill_id) {
            match client.snapshot().await {
                Err(BillingError::Unavailable(_)) => {}
                other => return other,
            }
        }
        self.load_state(bill_id)
            .await?
            .map(|state| state.snapshot())
            .ok_or_else(|| BillingError::NotFound(bill_id.to_string()))
    }

    /// Waits until the bill's current run stops and returns how it ended.
    pub async fn wait_for_run(&self, bill_id: BillId) -> Result<RunPhase, BillingError> {
        let mut done = self
            .runs()?
            .get(&bill_id)
            .map(|h| h.done.clone())
            .ok_or_else(|| BillingError::NotFound(bill_id.to_string()))?;
        let result = done
            .wait_for(Option::is_some)
            .await
            .map_err(|_| BillingError::Orchestration(format!("run for {bill_id} was aborted")))?;
        (*result)
            .clone()
            .unwrap_or_else(|| Err(BillingError::Orchestration("run result missing".to_string())))
    }

    fn take_handles(&self) -> Result<Vec<(BillId, RunHandle)>, BillingError> {
        Ok(self.runs()?.drain().collect())
    }

    /// Stops every run at its next wait point and waits for them.
    ///
    /// Suspended runs keep their history; a later system resumes them with
    /// [`recover`](Self::recover).
    pub async fn shutdown(self) -> Result<(), BillingError> {
        info!("Shutting down billing system...");
        let _ = self.shutdown.send(true);
        for (bill_id, handle) in self.take_handles()? {
            if let Err(e) = handle.task.await {
                error!(%bill_id, "Run task failed: {:?}", e);
                return Err(BillingError::Orchestration(format!("run task failed: {e}")));
            }
        }
        info!("Billing system shutdown complete.");
        Ok(())
    }

    /// Kills every run without letting it record anything more.
    pub async fn abort(self) -> Result<(), BillingError> {
        warn!("Aborting all runs");
        for (_, handle) in self.take_handles()? {
            handle.task.abort();
            let _ = handle.task.await;
        }
        Ok(())
    }
}
