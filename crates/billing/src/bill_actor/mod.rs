//! # Bill Actor
//!
//! The orchestration core for one bill, built on the workflow framework.
//!
//! ## Structure
//!
//! - [`error`] - [`BillingError`], the failure taxonomy shared by every layer
//! - [`workflow`] - [`BillWorkflow`] and its signals, updates, snapshots and events
//! - [`state`] - [`RunState`], rebuilt from history by replay
//! - [`close_trigger`] - [`CloseTriggerSelector`], deadline vs. manual close
//! - [`item_applier`] - [`ItemApplier`], validate then persist with retries
//! - [`orchestrator`] - [`BillOrchestrator`], the run loop tying it together
//!
//! ## Usage
//!
//! ```rust,ignore
//! let (client, mailbox) = workflow_framework::channel::<BillWorkflow>(32);
//! let run = BillOrchestrator::new(bill.id, bill.close_date, mailbox);
//! tokio::spawn(run.run(ctx));
//!
//! let client = BillClient::new(bill.id, client);
//! client.add_items(vec![NewBillItem::new(100, "USD")]).await?;
//! client.close().await?;
//! ```

pub mod close_trigger;
pub mod error;
pub mod item_applier;
pub mod orchestrator;
pub mod state;
pub mod workflow;

pub use close_trigger::*;
pub use error::*;
pub use item_applier::*;
pub use orchestrator::*;
pub use state::*;
pub use workflow::*;
