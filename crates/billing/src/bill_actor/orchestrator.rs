//! # Bill Orchestrator
//!
//! One run per bill, driving `Open -> Closing -> Closed`.
//!
//! ## Open
//! The run multiplexes its request mailbox with the [`CloseTriggerSelector`] in a
//! single `tokio::select!` loop. Item batches are handled one at a time, items within a
//! batch in order; the caller waits until every item has been attempted. Queries are
//! answered from the replayable [`RunState`].
//!
//! ## Closing
//! When the race resolves the selector is dropped, batches already sitting in the
//! mailbox are applied, and the conditional close is issued through the retry
//! executor. `NotFound` and `AlreadyClosed` mean someone else already closed the bill.
//! Exhausting retries records `CloseFailed` and ends the run with a terminal error; the
//! bill stays `Open` in the store.
//!
//! ## Closed
//! The mailbox is closed and every update still queued is refused with
//! `AlreadyClosed`, unless its id was already completed. A run that stopped without
//! closing refuses them with `Unavailable`; none of their items was attempted.
//!
//! ## Durability
//! Every decision is appended to the run's history before the run moves on. A run
//! started for a bill with existing history replays it first and resumes where the
//! previous run stopped.

use crate::bill_actor::{
    BatchOutcome, BillEvent, BillWorkflow, BillingError, CloseSignal, CloseTriggerSelector,
    CloseTrigger, ItemApplier, ItemOutcome, RunPhase, RunState,
};
use crate::model::{BillId, CurrencySet, NewBillItem};
use crate::store::BillStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};
use workflow_framework::retry::execute;
use workflow_framework::{
    FrameworkError, HistoryStore, Mailbox, RetryError, RetryPolicy, RunRequest, UpdateId, Workflow,
};

type Requests = mpsc::Receiver<RunRequest<BillWorkflow>>;

/// Collaborators injected into a run when it starts.
#[derive(Clone)]
pub struct BillContext {
    pub store: Arc<dyn BillStore>,
    pub history: Arc<dyn HistoryStore<BillEvent>>,
    pub policy: RetryPolicy,
    pub currencies: Arc<CurrencySet>,
    pub task_queue: String,
    /// Flips to `true` when the owning system shuts down.
    pub shutdown: watch::Receiver<bool>,
}

/// A bill run that has not started yet.
///
/// Construction only binds the mailbox; the collaborators arrive through
/// [`run`](Self::run), the same late binding the framework uses for every run.
pub struct BillOrchestrator {
    bill_id: BillId,
    close_date: DateTime<Utc>,
    mailbox: Mailbox<BillWorkflow>,
}

impl BillOrchestrator {
    pub fn new(bill_id: BillId, close_date: DateTime<Utc>, mailbox: Mailbox<BillWorkflow>) -> Self {
        Self {
            bill_id,
            close_date,
            mailbox,
        }
    }

    /// Runs the bill to completion.
    ///
    /// Returns the phase the run stopped in: `Closed`, or `Open` when it was suspended
    /// by a shutdown. A close that ran out of retries returns `Terminal`.
    pub async fn run(self, ctx: BillContext) -> Result<RunPhase, BillingError> {
        let span = info_span!("bill_run", bill_id = %self.bill_id, task_queue = %ctx.task_queue);
        self.drive(ctx).instrument(span).await
    }

    async fn drive(self, ctx: BillContext) -> Result<RunPhase, BillingError> {
        let Mailbox {
            mut requests,
            signals,
        } = self.mailbox;
        let mut shutdown = ctx.shutdown.clone();
        let mut run = LiveRun::restore(self.bill_id, self.close_date, ctx).await?;
        info!(phase = ?run.state.phase(), "Run started");

        let result = run.advance(&mut requests, signals, &mut shutdown).await;
        run.reject_remaining(requests, &result).await;
        match &result {
            Ok(phase) => info!(?phase, "Run stopped"),
            Err(e) => error!(error = %e, "Run failed"),
        }
        result
    }
}

struct LiveRun {
    ctx: BillContext,
    applier: ItemApplier,
    run_id: String,
    state: RunState,
}

impl LiveRun {
    async fn restore(
        bill_id: BillId,
        close_date: DateTime<Utc>,
        ctx: BillContext,
    ) -> Result<Self, BillingError> {
        let run_id = BillWorkflow::run_id(&bill_id);
        let events = ctx.history.load(&run_id).await?;
        let applier = ItemApplier::new(ctx.store.clone(), ctx.policy, ctx.currencies.clone());

        if let Some(state) = RunState::replay(&events)? {
            if state.bill_id() != bill_id {
                return Err(BillingError::Orchestration(format!(
                    "history {run_id} belongs to {}",
                    state.bill_id()
                )));
            }
            info!(events = events.len(), phase = ?state.phase(), "Replayed history");
            return Ok(Self {
                ctx,
                applier,
                run_id,
                state,
            });
        }

        let task_queue = ctx.task_queue.clone();
        let mut run = Self {
            state: RunState::new(bill_id, close_date, task_queue.clone()),
            ctx,
            applier,
            run_id,
        };
        run.record(BillEvent::RunStarted {
            bill_id,
            close_date,
            task_queue,
        })
        .await?;
        Ok(run)
    }

    /// Appends the event, then applies it. Nothing is applied if the append fails.
    async fn record(&mut self, event: BillEvent) -> Result<(), BillingError> {
        self.ctx.history.append(&self.run_id, &event).await?;
        self.state.apply(&event)
    }

    async fn advance(
        &mut self,
        requests: &mut Requests,
        signals: mpsc::Receiver<CloseSignal>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<RunPhase, BillingError> {
        self.finish_unfinished_updates().await?;

        match self.state.phase() {
            RunPhase::Closed => return Ok(RunPhase::Closed),
            RunPhase::Closing => drop(signals),
            RunPhase::Failed => {
                drop(signals);
                info!("Retrying close after terminal failure");
                self.record(BillEvent::CloseRetried).await?;
            }
            RunPhase::Open => {
                let Some(trigger) = self.race(requests, signals, shutdown).await? else {
                    info!("Shutdown requested, suspending run");
                    return Ok(RunPhase::Open);
                };
                self.record(BillEvent::CloseTriggered { trigger }).await?;
            }
        }

        while let Ok(request) = requests.try_recv() {
            self.handle(request).await?;
        }
        self.close().await
    }

    /// Serves requests until the deadline or a manual signal wins.
    async fn race(
        &mut self,
        requests: &mut Requests,
        signals: mpsc::Receiver<CloseSignal>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<CloseTrigger>, BillingError> {
        let fire_at = self.state.close_date();
        if !self.state.timer_armed() {
            self.record(BillEvent::TimerArmed { fire_at }).await?;
        }
        let mut selector = CloseTriggerSelector::arm(fire_at, signals);
        let mut accepting = true;

        loop {
            tokio::select! {
                biased;
                Ok(()) = shutdown.changed() => return Ok(None),
                trigger = selector.wait() => {
                    info!(%trigger, "Close race resolved");
                    return Ok(Some(trigger));
                }
                request = requests.recv(), if accepting => match request {
                    Some(request) => self.handle(request).await?,
                    None => accepting = false,
                },
            }
        }
    }

    async fn handle(&mut self, request: RunRequest<BillWorkflow>) -> Result<(), BillingError> {
        match request {
            RunRequest::Update {
                update_id,
                update,
                respond_to,
            } => {
                if let Some(outcome) = self.state.completed_update(&update_id) {
                    debug!(%update_id, "Update already completed, returning recorded result");
                    let _ = respond_to.send(Ok(outcome));
                    return Ok(());
                }
                match self.process_batch(update_id, update).await {
                    Ok(outcome) => {
                        let _ = respond_to.send(Ok(outcome));
                        Ok(())
                    }
                    Err(e) => {
                        let _ = respond_to.send(Err(FrameworkError::workflow(e.clone())));
                        Err(e)
                    }
                }
            }
            RunRequest::Query { respond_to } => {
                let _ = respond_to.send(Ok(self.state.snapshot()));
                Ok(())
            }
        }
    }

    #[instrument(skip_all, fields(update_id = %update_id, items = items.len()))]
    async fn process_batch(
        &mut self,
        update_id: UpdateId,
        items: Vec<NewBillItem>,
    ) -> Result<BatchOutcome, BillingError> {
        debug!(?items, "Batch received");
        self.record(BillEvent::UpdateAccepted {
            update_id,
            items: items.clone(),
        })
        .await?;
        for (index, item) in items.iter().enumerate() {
            self.attempt_item(update_id, index, item).await?;
        }
        self.complete_update(update_id).await
    }

    async fn finish_unfinished_updates(&mut self) -> Result<(), BillingError> {
        for unfinished in self.state.unfinished_updates() {
            info!(
                update_id = %unfinished.update_id,
                pending = unfinished.pending.len(),
                "Finishing interrupted batch"
            );
            for (index, item) in &unfinished.pending {
                self.attempt_item(unfinished.update_id, *index, item).await?;
            }
            self.complete_update(unfinished.update_id).await?;
        }
        Ok(())
    }

    async fn attempt_item(
        &mut self,
        update_id: UpdateId,
        index: usize,
        item: &NewBillItem,
    ) -> Result<(), BillingError> {
        let outcome = match self.applier.apply(self.state.bill_id(), item).await {
            Ok(item_id) => ItemOutcome::Applied { item_id },
            Err(error) => {
                warn!(%update_id, index, %error, "Item not applied");
                ItemOutcome::Failed { error }
            }
        };
        self.record(BillEvent::ItemAttempted {
            update_id,
            index,
            outcome,
        })
        .await
    }

    async fn complete_update(&mut self, update_id: UpdateId) -> Result<BatchOutcome, BillingError> {
        self.record(BillEvent::UpdateCompleted { update_id }).await?;
        let outcome = self.state.completed_update(&update_id).ok_or_else(|| {
            BillingError::Orchestration(format!("update {update_id} missing after completion"))
        })?;
        info!(
            %update_id,
            applied = outcome.applied_count(),
            failed = outcome.results.len() - outcome.applied_count(),
            "Batch processed"
        );
        Ok(outcome)
    }

    async fn close(&mut self) -> Result<RunPhase, BillingError> {
        let bill_id = self.state.bill_id();
        let store = &self.ctx.store;
        let result = execute(&self.ctx.policy, "close_bill", move || store.close_bill(bill_id)).await;

        match result {
            Ok(bill) => {
                info!(closed_at = ?bill.closed_at, "Bill closed");
                self.record(BillEvent::CloseCompleted {
                    already_closed: false,
                })
                .await?;
                Ok(RunPhase::Closed)
            }
            Err(RetryError::NonRetryable {
                source: reason @ (BillingError::NotFound(_) | BillingError::AlreadyClosed(_)),
                ..
            }) => {
                warn!(%reason, "Close already satisfied");
                self.record(BillEvent::CloseCompleted {
                    already_closed: true,
                })
                .await?;
                Ok(RunPhase::Closed)
            }
            Err(e) => {
                let failure = BillingError::from(e);
                error!(error = %failure, "Close failed, bill stays open");
                self.record(BillEvent::CloseFailed {
                    error: failure.clone(),
                })
                .await?;
                Err(failure)
            }
        }
    }

    /// Stops accepting requests and answers whatever is still queued.
    async fn reject_remaining(&self, mut requests: Requests, result: &Result<RunPhase, BillingError>) {
        requests.close();
        let refusal = match result {
            Ok(RunPhase::Closed) => BillingError::AlreadyClosed(self.state.bill_id().to_string()),
            Ok(_) => BillingError::Unavailable("run suspended".to_string()),
            Err(BillingError::Terminal { .. }) => {
                BillingError::Unavailable("close failed, bill still open".to_string())
            }
            Err(e) => BillingError::Unavailable(format!("run failed: {e}")),
        };

        let mut refused = 0;
        while let Some(request) = requests.recv().await {
            match request {
                RunRequest::Update {
                    update_id,
                    respond_to,
                    ..
                } => {
                    let reply = self
                        .state
                        .completed_update(&update_id)
                        .ok_or_else(|| FrameworkError::workflow(refusal.clone()));
                    if reply.is_err() {
                        refused += 1;
                    }
                    let _ = respond_to.send(reply);
                }
                RunRequest::Query { respond_to } => {
                    let _ = respond_to.send(Ok(self.state.snapshot()));
                }
            }
        }
        if refused > 0 {
            debug!(refused, "Refused updates after the run stopped");
        }
    }
}
