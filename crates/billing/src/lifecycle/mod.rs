//! # System Lifecycle
//!
//! This module manages the runtime lifecycle of bill runs: creating them with their
//! bill, wiring the shared collaborators into each one, resuming them after a restart,
//! and stopping them.
//!
//! ## Dependency Injection via Context
//!
//! Runs are constructed with only their mailbox. Store, history, retry policy and
//! currency set arrive through [`BillOrchestrator::run`](crate::bill_actor::BillOrchestrator::run)
//! as a [`BillContext`](crate::bill_actor::BillContext), so every run of a system shares
//! one set of collaborators and tests can swap any of them.
//!
//! ## Restart Model
//!
//! 1. **Shutdown** - every run stops at its next wait point; histories stay as written
//! 2. **Recover** - a new system over the same history lists the runs, replays each,
//!    and resumes those that never reached a terminal phase
//! 3. **Resume** - interrupted batches finish, a decided race goes straight to closing,
//!    an open run re-arms its timer from the recorded close date
//!
//! [`BillingSystem::abort`] kills runs mid-flight instead, the way a crash would.
//!
//! ## Observability & Tracing
//!
//! [`setup_tracing`] initializes structured logging. Each run executes inside a
//! `bill_run` span carrying `bill_id` and `task_queue`.
//!
//! ```bash
//! RUST_LOG=info cargo run      # Compact logs
//! RUST_LOG=debug cargo run     # Full payloads
//! ```

pub mod billing_system;

pub use billing_system::*;
pub use workflow_framework::tracing::setup_tracing;
