//! # Workflow Trait
//!
//! The `Workflow` trait describes the message vocabulary of one kind of durable run:
//! what identifies a run, which signals and updates it accepts, what a query returns,
//! and which events it writes to its history. The framework is generic over this
//! description so the mailbox, client, history and mock code is written once.
//!
//! A workflow does not hand the framework a run loop. Each domain owns its loop and
//! consumes a [`Mailbox`](crate::Mailbox); the framework only fixes the types that
//! flow through it.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Type-level description of a durable workflow.
///
/// # Associated Types
/// Using associated types means a `RunClient<Bill>` can only send bill updates and
/// only receives bill snapshots. Sending the wrong payload is a compile error.
pub trait Workflow: Send + Sync + 'static {
    /// Identity of a run. One live run per id.
    type Id: Eq + Hash + Clone + Send + Sync + Display + Debug;

    /// Fire-and-forget message delivered on the run's signal channel.
    type Signal: Send + Debug;

    /// Payload of a synchronous update; the caller blocks until the run replies.
    type Update: Send + Debug;

    /// Result returned to the caller of an update.
    type UpdateOutput: Send + Debug;

    /// Read-only view returned by a query.
    type Snapshot: Send + Debug;

    /// Decision recorded in the run's history and replayed after a restart.
    type Event: Serialize + DeserializeOwned + Clone + Send + Sync + Debug + 'static;

    /// Workflow-level failure surfaced to update callers.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Key under which the run's history is stored.
    fn run_id(id: &Self::Id) -> String {
        id.to_string()
    }
}
