//! # Generic Client
//!
//! This module defines the client half of a run.

use crate::error::FrameworkError;
use crate::message::{RunRequest, UpdateId};
use crate::workflow::Workflow;
use tokio::sync::{mpsc, oneshot};

/// A type-safe client for interacting with one workflow run.
///
/// The client is cheap to clone: it only holds the two channel senders. When every
/// clone is dropped the run observes a closed mailbox.
pub struct RunClient<W: Workflow> {
    sender: mpsc::Sender<RunRequest<W>>,
    signals: mpsc::Sender<W::Signal>,
}

impl<W: Workflow> Clone for RunClient<W> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            signals: self.signals.clone(),
        }
    }
}

impl<W: Workflow> RunClient<W> {
    pub fn new(sender: mpsc::Sender<RunRequest<W>>, signals: mpsc::Sender<W::Signal>) -> Self {
        Self { sender, signals }
    }

    /// Submits an update and waits until the run has finished processing it.
    pub async fn update(
        &self,
        update_id: UpdateId,
        update: W::Update,
    ) -> Result<W::UpdateOutput, FrameworkError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(RunRequest::Update {
                update_id,
                update,
                respond_to,
            })
            .await
            .map_err(|_| FrameworkError::RunClosed)?;
        response.await.map_err(|_| FrameworkError::RunDropped)?
    }

    pub async fn query(&self) -> Result<W::Snapshot, FrameworkError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(RunRequest::Query { respond_to })
            .await
            .map_err(|_| FrameworkError::RunClosed)?;
        response.await.map_err(|_| FrameworkError::RunDropped)?
    }

    /// Delivers a signal. Returns `RunClosed` once the run stopped listening.
    pub async fn signal(&self, signal: W::Signal) -> Result<(), FrameworkError> {
        self.signals
            .send(signal)
            .await
            .map_err(|_| FrameworkError::RunClosed)
    }

    /// True once the run has dropped its request receiver.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
