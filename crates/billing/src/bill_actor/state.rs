//! Replayable state of one bill run.
//!
//! [`RunState::apply`] is the only way state changes, both live and during replay, so
//! a run rebuilt from its history is indistinguishable from the one that wrote it.

use crate::bill_actor::{
    BatchOutcome, BillEvent, BillSnapshot, BillingError, CloseTrigger, ItemOutcome, ItemResult,
    RunPhase,
};
use crate::model::{BillId, NewBillItem};
use chrono::{DateTime, Utc};
use workflow_framework::UpdateId;

#[derive(Debug, Clone)]
struct UpdateRecord {
    update_id: UpdateId,
    items: Vec<NewBillItem>,
    results: Vec<ItemResult>,
    completed: bool,
}

impl UpdateRecord {
    fn outcome(&self) -> BatchOutcome {
        BatchOutcome {
            update_id: self.update_id,
            results: self.results.clone(),
        }
    }
}

/// Batch whose items were not all attempted when the previous run stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct UnfinishedUpdate {
    pub update_id: UpdateId,
    pub pending: Vec<(usize, NewBillItem)>,
}

#[derive(Debug, Clone)]
pub struct RunState {
    bill_id: BillId,
    close_date: DateTime<Utc>,
    task_queue: String,
    phase: RunPhase,
    timer_armed: bool,
    trigger: Option<CloseTrigger>,
    updates: Vec<UpdateRecord>,
    failure: Option<BillingError>,
}

impl RunState {
    pub fn new(bill_id: BillId, close_date: DateTime<Utc>, task_queue: impl Into<String>) -> Self {
        Self {
            bill_id,
            close_date,
            task_queue: task_queue.into(),
            phase: RunPhase::Open,
            timer_armed: false,
            trigger: None,
            updates: Vec::new(),
            failure: None,
        }
    }

    /// Rebuilds state from a history. An empty history yields `None`.
    pub fn replay(events: &[BillEvent]) -> Result<Option<Self>, BillingError> {
        let Some((first, rest)) = events.split_first() else {
            return Ok(None);
        };
        let BillEvent::RunStarted {
            bill_id,
            close_date,
            task_queue,
        } = first
        else {
            return Err(BillingError::Orchestration(format!(
                "history must start with run_started, found {first:?}"
            )));
        };
        let mut state = Self::new(*bill_id, *close_date, task_queue.clone());
        for event in rest {
            state.apply(event)?;
        }
        Ok(Some(state))
    }

    pub fn apply(&mut self, event: &BillEvent) -> Result<(), BillingError> {
        match event {
            BillEvent::RunStarted {
                bill_id,
                close_date,
                task_queue,
            } => {
                self.bill_id = *bill_id;
                self.close_date = *close_date;
                self.task_queue = task_queue.clone();
            }
            BillEvent::TimerArmed { .. } => self.timer_armed = true,
            BillEvent::UpdateAccepted { update_id, items } => self.updates.push(UpdateRecord {
                update_id: *update_id,
                items: items.clone(),
                results: Vec::new(),
                completed: false,
            }),
            BillEvent::ItemAttempted {
                update_id,
                index,
                outcome,
            } => {
                let record = self.update_mut(update_id)?;
                let item = record.items.get(*index).cloned().ok_or_else(|| {
                    BillingError::Orchestration(format!(
                        "item {index} out of range for update {update_id}"
                    ))
                })?;
                record.results.push(ItemResult {
                    index: *index,
                    item,
                    outcome: outcome.clone(),
                });
            }
            BillEvent::UpdateCompleted { update_id } => self.update_mut(update_id)?.completed = true,
            BillEvent::CloseTriggered { trigger } => {
                self.trigger = Some(*trigger);
                self.phase = RunPhase::Closing;
            }
            BillEvent::CloseRetried => {
                self.failure = None;
                self.phase = RunPhase::Closing;
            }
            BillEvent::CloseCompleted { .. } => self.phase = RunPhase::Closed,
            BillEvent::CloseFailed { error } => {
                self.failure = Some(error.clone());
                self.phase = RunPhase::Failed;
            }
        }
        Ok(())
    }

    fn update_mut(&mut self, update_id: &UpdateId) -> Result<&mut UpdateRecord, BillingError> {
        self.updates
            .iter_mut()
            .find(|u| u.update_id == *update_id)
            .ok_or_else(|| BillingError::Orchestration(format!("unknown update {update_id}")))
    }

    pub fn bill_id(&self) -> BillId {
        self.bill_id
    }

    pub fn close_date(&self) -> DateTime<Utc> {
        self.close_date
    }

    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn timer_armed(&self) -> bool {
        self.timer_armed
    }

    pub fn trigger(&self) -> Option<CloseTrigger> {
        self.trigger
    }

    /// Neither `Closed` nor `Failed` runs are resumed automatically.
    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, RunPhase::Closed | RunPhase::Failed)
    }

    /// Recorded result of a completed update, if this id was seen before.
    pub fn completed_update(&self, update_id: &UpdateId) -> Option<BatchOutcome> {
        self.updates
            .iter()
            .find(|u| u.update_id == *update_id && u.completed)
            .map(UpdateRecord::outcome)
    }

    /// Accepted batches that never recorded completion, with their unattempted items.
    pub fn unfinished_updates(&self) -> Vec<UnfinishedUpdate> {
        self.updates
            .iter()
            .filter(|u| !u.completed)
            .map(|u| UnfinishedUpdate {
                update_id: u.update_id,
                pending: u
                    .items
                    .iter()
                    .enumerate()
                    .skip(u.results.len())
                    .map(|(index, item)| (index, item.clone()))
                    .collect(),
            })
            .collect()
    }

    pub fn snapshot(&self) -> BillSnapshot {
        let results = self.updates.iter().flat_map(|u| u.results.iter());
        let (applied, failed): (Vec<_>, Vec<_>) =
            results.partition(|r| matches!(r.outcome, ItemOutcome::Applied { .. }));
        BillSnapshot {
            bill_id: self.bill_id,
            phase: self.phase,
            close_date: self.close_date,
            trigger: self.trigger,
            items_applied: applied.len(),
            items_failed: failed.len(),
            failure: self.failure.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemId;
    use chrono::Duration;

    fn started(bill_id: BillId) -> BillEvent {
        BillEvent::RunStarted {
            bill_id,
            close_date: Utc::now() + Duration::hours(1),
            task_queue: "billing".into(),
        }
    }

    #[test]
    fn test_empty_history_has_no_state() {
        assert!(RunState::replay(&[]).unwrap().is_none());
    }

    #[test]
    fn test_history_must_start_with_run_started() {
        let result = RunState::replay(&[BillEvent::CloseRetried]);
        assert!(matches!(result, Err(BillingError::Orchestration(_))));
    }

    #[test]
    fn test_replay_tracks_race_and_close() {
        let bill_id = BillId::new();
        let events = vec![
            started(bill_id),
            BillEvent::TimerArmed {
                fire_at: Utc::now(),
            },
            BillEvent::CloseTriggered {
                trigger: CloseTrigger::Manual,
            },
        ];
        let state = RunState::replay(&events).unwrap().unwrap();
        assert_eq!(state.bill_id(), bill_id);
        assert!(state.timer_armed());
        assert_eq!(state.phase(), RunPhase::Closing);
        assert_eq!(state.trigger(), Some(CloseTrigger::Manual));
        assert!(!state.is_terminal());

        let mut state = state;
        state
            .apply(&BillEvent::CloseCompleted {
                already_closed: false,
            })
            .unwrap();
        assert_eq!(state.phase(), RunPhase::Closed);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_failed_close_can_be_retried() {
        let bill_id = BillId::new();
        let error = BillingError::Terminal {
            attempts: 3,
            reason: "timeout".into(),
        };
        let mut state = RunState::replay(&[
            started(bill_id),
            BillEvent::CloseTriggered {
                trigger: CloseTrigger::Deadline,
            },
            BillEvent::CloseFailed {
                error: error.clone(),
            },
        ])
        .unwrap()
        .unwrap();
        assert_eq!(state.phase(), RunPhase::Failed);
        assert_eq!(state.snapshot().failure, Some(error));

        state.apply(&BillEvent::CloseRetried).unwrap();
        assert_eq!(state.phase(), RunPhase::Closing);
        assert_eq!(state.snapshot().failure, None);
    }

    #[test]
    fn test_interrupted_batch_resumes_after_last_attempt() {
        let bill_id = BillId::new();
        let done = UpdateId::new();
        let interrupted = UpdateId::new();
        let state = RunState::replay(&[
            started(bill_id),
            BillEvent::UpdateAccepted {
                update_id: done,
                items: vec![NewBillItem::new(1, "USD")],
            },
            BillEvent::ItemAttempted {
                update_id: done,
                index: 0,
                outcome: ItemOutcome::Applied {
                    item_id: ItemId::new(),
                },
            },
            BillEvent::UpdateCompleted { update_id: done },
            BillEvent::UpdateAccepted {
                update_id: interrupted,
                items: vec![
                    NewBillItem::new(10, "USD"),
                    NewBillItem::new(0, "USD"),
                    NewBillItem::new(30, "GEL"),
                ],
            },
            BillEvent::ItemAttempted {
                update_id: interrupted,
                index: 0,
                outcome: ItemOutcome::Applied {
                    item_id: ItemId::new(),
                },
            },
        ])
        .unwrap()
        .unwrap();

        assert_eq!(state.completed_update(&done).unwrap().results.len(), 1);
        assert!(state.completed_update(&interrupted).is_none());
        assert_eq!(
            state.unfinished_updates(),
            vec![UnfinishedUpdate {
                update_id: interrupted,
                pending: vec![
                    (1, NewBillItem::new(0, "USD")),
                    (2, NewBillItem::new(30, "GEL")),
                ],
            }]
        );
        assert_eq!(state.snapshot().items_applied, 2);
    }

    #[test]
    fn test_attempt_for_unknown_update_is_rejected() {
        let mut state = RunState::new(BillId::new(), Utc::now(), "billing");
        let result = state.apply(&BillEvent::ItemAttempted {
            update_id: UpdateId::new(),
            index: 0,
            outcome: ItemOutcome::Failed {
                error: BillingError::Validation("x".into()),
            },
        });
        assert!(matches!(result, Err(BillingError::Orchestration(_))));
    }
}
