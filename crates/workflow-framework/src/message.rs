//! # Generic Messages
//!
//! This module defines the messages exchanged between a [`RunClient`](crate::RunClient)
//! and the run that owns the matching [`Mailbox`].

use crate::client::RunClient;
use crate::error::FrameworkError;
use crate::workflow::Workflow;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Type alias for the one-shot response channel used by runs.
pub type Response<T> = oneshot::Sender<Result<T, FrameworkError>>;

/// Identity of one update call.
///
/// Callers that may resubmit after a timeout or restart keep the id and send it again;
/// a run that already completed that id answers with the recorded result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateId(pub Uuid);

impl UpdateId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for UpdateId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for UpdateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "upd_{}", self.0)
    }
}

/// Request sent to a run's mailbox.
///
/// Signals are not part of this enum: they travel on their own channel so a run can
/// stop listening for them (by dropping the receiver) while still serving updates.
#[derive(Debug)]
pub enum RunRequest<W: Workflow> {
    Update {
        update_id: UpdateId,
        update: W::Update,
        respond_to: Response<W::UpdateOutput>,
    },
    Query {
        respond_to: Response<W::Snapshot>,
    },
}

/// Receiving half of a run: requests and signals.
pub struct Mailbox<W: Workflow> {
    pub requests: mpsc::Receiver<RunRequest<W>>,
    pub signals: mpsc::Receiver<W::Signal>,
}

/// Creates a connected client and mailbox.
///
/// # Arguments
///
/// * `capacity` - Bound of both channels. A full mailbox makes callers wait.
pub fn channel<W: Workflow>(capacity: usize) -> (RunClient<W>, Mailbox<W>) {
    let (request_tx, requests) = mpsc::channel(capacity);
    let (signal_tx, signals) = mpsc::channel(capacity);
    (
        RunClient::new(request_tx, signal_tx),
        Mailbox { requests, signals },
    )
}
