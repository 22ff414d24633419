//! Message vocabulary of a bill run: what it accepts, what it answers and what it
//! writes to its history.

use crate::bill_actor::BillingError;
use crate::model::{BillId, ItemId, NewBillItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use workflow_framework::{UpdateId, Workflow};

/// Well-known name of the manual close signal, used in logs.
pub const CLOSE_BILL_SIGNAL: &str = "close_bill";

/// Type marker tying the bill vocabulary to the framework.
#[derive(Debug)]
pub struct BillWorkflow;

impl Workflow for BillWorkflow {
    type Id = BillId;
    type Signal = CloseSignal;
    type Update = Vec<NewBillItem>;
    type UpdateOutput = BatchOutcome;
    type Snapshot = BillSnapshot;
    type Event = BillEvent;
    type Error = BillingError;
}

/// Manual request to close the bill before its deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseSignal {
    pub requested_at: DateTime<Utc>,
}

impl CloseSignal {
    pub fn now() -> Self {
        Self {
            requested_at: Utc::now(),
        }
    }
}

/// Which branch of the close race won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseTrigger {
    Deadline,
    Manual,
}

impl Display for CloseTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseTrigger::Deadline => write!(f, "deadline"),
            CloseTrigger::Manual => write!(f, "manual"),
        }
    }
}

/// Position of a run in `Open -> Closing -> Closed`.
///
/// `Failed` means the close operation ran out of retries. The bill is still `Open`
/// in the store and the run can be resumed to attempt the close again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Open,
    Closing,
    Closed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Applied { item_id: ItemId },
    Failed { error: BillingError },
}

/// Result of one item of a batch. `index` is the item's position in the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    pub index: usize,
    pub item: NewBillItem,
    pub outcome: ItemOutcome,
}

/// Per-item report of one item batch. A batch is never atomic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub update_id: UpdateId,
    pub results: Vec<ItemResult>,
}

impl BatchOutcome {
    pub fn applied(&self) -> impl Iterator<Item = &ItemResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ItemOutcome::Applied { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &ItemResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ItemOutcome::Failed { .. }))
    }

    pub fn applied_count(&self) -> usize {
        self.applied().count()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Query result describing a run as it stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillSnapshot {
    pub bill_id: BillId,
    pub phase: RunPhase,
    pub close_date: DateTime<Utc>,
    pub trigger: Option<CloseTrigger>,
    pub items_applied: usize,
    pub items_failed: usize,
    pub failure: Option<BillingError>,
}

/// A decision recorded in a bill run's history.
///
/// Events are written before the run acts on the decision they describe, except for
/// `ItemAttempted` and `Close*`, which record the outcome of a store call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BillEvent {
    RunStarted {
        bill_id: BillId,
        close_date: DateTime<Utc>,
        task_queue: String,
    },
    TimerArmed {
        fire_at: DateTime<Utc>,
    },
    UpdateAccepted {
        update_id: UpdateId,
        items: Vec<NewBillItem>,
    },
    ItemAttempted {
        update_id: UpdateId,
        index: usize,
        outcome: ItemOutcome,
    },
    UpdateCompleted {
        update_id: UpdateId,
    },
    CloseTriggered {
        trigger: CloseTrigger,
    },
    CloseRetried,
    CloseCompleted {
        already_closed: bool,
    },
    CloseFailed {
        error: BillingError,
    },
}
