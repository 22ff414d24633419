//! Bill items and the currency set they are validated against.

use crate::bill_actor::BillingError;
use crate::model::BillId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;
use uuid::Uuid;

/// Type-safe identifier for persisted items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "item_{}", self.0)
    }
}

/// An item as proposed by a caller. Not yet validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBillItem {
    pub amount: i64,
    pub currency: String,
}

impl NewBillItem {
    pub fn new(amount: i64, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    /// Rejects non-positive amounts and currencies outside `allowed`.
    pub fn validate(&self, allowed: &CurrencySet) -> Result<(), BillingError> {
        if self.amount <= 0 {
            return Err(BillingError::Validation(format!(
                "Invalid amount {}",
                self.amount
            )));
        }
        if !allowed.contains(&self.currency) {
            return Err(BillingError::Validation(format!(
                "Invalid currency: {}",
                self.currency
            )));
        }
        Ok(())
    }
}

/// A persisted item. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillItem {
    pub id: ItemId,
    pub bill_id: BillId,
    pub amount: i64,
    pub currency: String,
}

/// Currencies items may be billed in. Comes from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencySet(BTreeSet<String>);

impl CurrencySet {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            codes
                .into_iter()
                .map(|c| c.as_ref().trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for CurrencySet {
    fn default() -> Self {
        Self::new(["USD", "GEL"])
    }
}
