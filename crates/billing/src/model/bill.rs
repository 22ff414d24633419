/// Represents a bill: a billing period that accumulates items until it closes.
///
/// # Orchestration
/// Every bill is driven by exactly one run of the
/// [`BillOrchestrator`](crate::bill_actor::BillOrchestrator), which owns the
/// `Open -> Closed` transition. The persisted row (see [`BillStore`](crate::store::BillStore))
/// is the system of record.
use crate::bill_actor::BillingError;
use crate::model::BillItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

/// Type-safe identifier for Bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillId(pub Uuid);

impl BillId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BillId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for BillId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bill_{}", self.0)
    }
}

impl FromStr for BillId {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("bill_").unwrap_or(s);
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| BillingError::Validation(format!("Invalid bill id: {s}")))
    }
}

/// Persisted lifecycle status. Moves `Open -> Closed` once and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Open,
    Closed,
}

impl Display for BillStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillStatus::Open => write!(f, "open"),
            BillStatus::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub id: BillId,
    pub close_date: DateTime<Utc>,
    pub status: BillStatus,
    pub closed_at: Option<DateTime<Utc>>,
    /// Applied items. Filled by reads that ask for them, empty otherwise.
    #[serde(default)]
    pub items: Vec<BillItem>,
}

impl Bill {
    pub fn is_open(&self) -> bool {
        self.status == BillStatus::Open
    }
}

/// Checks that a close date lies strictly after `now`.
pub fn validate_close_date(
    close_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), BillingError> {
    if close_date <= now {
        return Err(BillingError::Validation(format!(
            "Invalid bill close date: {close_date} is not in the future"
        )));
    }
    Ok(())
}
