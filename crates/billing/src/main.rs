//! # Billing Demo
//!
//! Runs the two bill lifecycles end to end against an in-memory store:
//!
//! 1. A bill that closes when its deadline passes.
//! 2. A bill closed early by the manual signal, which then refuses new items.
//!
//! An optional first argument names a TOML config file; see [`billing::config`].

use billing::bill_actor::BillingError;
use billing::config::BillingConfig;
use billing::lifecycle::{setup_tracing, BillingSystem};
use billing::model::NewBillItem;
use chrono::{Duration, Utc};
use std::path::Path;
use tracing::{error, info, Instrument};

#[tokio::main]
async fn main() -> Result<(), String> {
    // Setup tracing once for the entire application
    setup_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => BillingConfig::from_file(Path::new(&path)).map_err(|e| e.to_string())?,
        None => BillingConfig::default(),
    };
    info!(task_queue = %config.task_queue, "Starting billing demo");

    let system = BillingSystem::from_config(config)
        .await
        .map_err(|e| e.to_string())?;
    let resumed = system.recover().await.map_err(|e| e.to_string())?;
    if !resumed.is_empty() {
        info!(count = resumed.len(), "Resumed runs from history");
    }

    let span = tracing::info_span!("deadline_close");
    async {
        let bill = system
            .create_bill(Utc::now() + Duration::seconds(2))
            .await?;
        let outcome = system
            .add_items(
                bill.id,
                vec![
                    NewBillItem::new(100, "USD"),
                    NewBillItem::new(40, "GEL"),
                    NewBillItem::new(5, "ABC"),
                ],
            )
            .await?;
        info!(
            applied = outcome.applied_count(),
            failed = outcome.failed().count(),
            "Batch processed"
        );

        match system.summary(bill.id).await {
            Err(BillingError::StillOpen(_)) => info!("Summary refused while the bill is open"),
            other => error!(?other, "Unexpected summary result"),
        }

        system.wait_for_run(bill.id).await?;
        let summary = system.summary(bill.id).await?;
        for total in &summary.totals {
            info!(currency = %total.currency, total = total.total_amount, "Bill total");
        }
        Ok::<_, BillingError>(())
    }
    .instrument(span)
    .await
    .map_err(|e| e.to_string())?;

    let span = tracing::info_span!("manual_close");
    async {
        let bill = system
            .create_bill(Utc::now() + Duration::hours(24))
            .await?;
        system.close_bill(bill.id).await?;
        system.wait_for_run(bill.id).await?;
        let closed = system.get_bill(bill.id).await?;
        info!(status = %closed.status, "Bill closed early");

        match system
            .add_items(bill.id, vec![NewBillItem::new(10, "USD")])
            .await
        {
            Err(BillingError::AlreadyClosed(_)) => info!("Late item refused"),
            other => error!(?other, "Unexpected late item result"),
        }
        Ok::<_, BillingError>(())
    }
    .instrument(span)
    .await
    .map_err(|e| e.to_string())?;

    system.shutdown().await.map_err(|e| e.to_string())?;
    info!("Application completed successfully");
    Ok(())
}
