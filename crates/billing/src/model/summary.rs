//! Per-currency totals of a closed bill.

use crate::bill_actor::BillingError;
use crate::model::{BillId, BillItem, BillStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sum of the amounts of every item of one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillItemSummary {
    pub currency: String,
    pub total_amount: i64,
}

/// Read model returned once a bill has closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillSummary {
    pub bill_id: BillId,
    pub status: BillStatus,
    pub closed_at: Option<DateTime<Utc>>,
    pub items: Vec<BillItem>,
    pub totals: Vec<BillItemSummary>,
}

/// Groups items by currency, ordered by currency code.
///
/// A currency whose total does not fit in an `i64` is a `Validation` error.
pub fn summarize_items(items: &[BillItem]) -> Result<Vec<BillItemSummary>, BillingError> {
    let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
    for item in items {
        let total = totals.entry(item.currency.as_str()).or_default();
        *total = total.checked_add(item.amount).ok_or_else(|| {
            BillingError::Validation(format!("{} total overflows", item.currency))
        })?;
    }
    Ok(totals
        .into_iter()
        .map(|(currency, total_amount)| BillItemSummary {
            currency: currency.to_string(),
            total_amount,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemId;

    fn item(bill_id: BillId, amount: i64, currency: &str) -> BillItem {
        BillItem {
            id: ItemId::new(),
            bill_id,
            amount,
            currency: currency.to_string(),
        }
    }

    #[test]
    fn test_totals_are_grouped_per_currency() {
        let bill_id = BillId::new();
        let items = vec![
            item(bill_id, 100, "USD"),
            item(bill_id, 40, "GEL"),
            item(bill_id, 25, "USD"),
        ];

        assert_eq!(
            summarize_items(&items).unwrap(),
            vec![
                BillItemSummary {
                    currency: "GEL".into(),
                    total_amount: 40
                },
                BillItemSummary {
                    currency: "USD".into(),
                    total_amount: 125
                },
            ]
        );
    }

    #[test]
    fn test_no_items_no_totals() {
        assert!(summarize_items(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_overflowing_total_is_rejected() {
        let bill_id = BillId::new();
        let half = i64::MAX / 2 + 1;
        let items = vec![
            item(bill_id, half, "USD"),
            item(bill_id, 10, "GEL"),
            item(bill_id, half, "USD"),
        ];

        assert!(matches!(
            summarize_items(&items),
            Err(BillingError::Validation(_))
        ));
    }
}
