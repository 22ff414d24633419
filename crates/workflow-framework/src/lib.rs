//! # Workflow Framework
//!
//! Building blocks for durable, per-entity workflow runs on top of Tokio. A run is an
//! actor: one task owns the run's state and processes its mailbox sequentially, while
//! clients talk to it through channels. On top of that actor shape this crate adds
//! what a long-running process needs to survive restarts and flaky dependencies.
//!
//! ## Architecture Overview
//!
//! 1. **Description** ([`Workflow`]) - the message vocabulary of one kind of run
//! 2. **Transport** ([`RunClient`], [`Mailbox`], [`RunRequest`]) - updates with a reply,
//!    queries, and a separate signal channel
//! 3. **Durability** ([`HistoryStore`]) - append-only decision log, replayed on restart
//! 4. **Side effects** ([`retry::execute`]) - bounded retries with failure classification
//!
//! ## Concurrency Model
//!
//! - Each run lives in its own Tokio task and handles one request at a time
//! - Runs share nothing; arbitrarily many run in parallel
//! - A run may multiplex its mailbox with timers and signals using `tokio::select!`
//!
//! ## Testing
//!
//! The [`mock`] module provides a [`MockClient`](mock::MockClient) that answers requests
//! from queued expectations, so typed clients can be tested without a real run.

pub mod client;
pub mod error;
pub mod file_history;
pub mod history;
pub mod message;
pub mod mock;
pub mod retry;
pub mod tracing;
pub mod workflow;

// Re-export core types for convenience
pub use client::RunClient;
pub use error::FrameworkError;
pub use file_history::FileHistory;
pub use history::{HistoryStore, InMemoryHistory};
pub use message::{channel, Mailbox, Response, RunRequest, UpdateId};
pub use retry::{RetryError, RetryPolicy, Retryable};
pub use workflow::Workflow;
