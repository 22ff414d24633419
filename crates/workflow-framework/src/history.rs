//! # Run History
//!
//! Every decision a run makes is appended to an ordered, append-only log keyed by the
//! run id. After a restart the run loads its log and replays it to rebuild its state
//! before it resumes waiting, so completed side effects are not issued again.
//!
//! Two backends are provided:
//! - [`InMemoryHistory`] keeps logs for the lifetime of the process. Sharing one
//!   instance through an `Arc` between two systems simulates a restart in tests.
//! - [`FileHistory`](crate::file_history::FileHistory) writes one JSON-lines file per run.

use crate::error::FrameworkError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Append-only event log for workflow runs.
#[async_trait]
pub trait HistoryStore<E>: Send + Sync
where
    E: Send + Sync + 'static,
{
    /// Appends one event to the end of the run's log.
    async fn append(&self, run_id: &str, event: &E) -> Result<(), FrameworkError>;

    /// Loads the run's log in append order. Unknown runs have an empty log.
    async fn load(&self, run_id: &str) -> Result<Vec<E>, FrameworkError>;

    /// Lists every run id with at least one recorded event.
    async fn list_runs(&self) -> Result<Vec<String>, FrameworkError>;
}

/// History kept in process memory.
pub struct InMemoryHistory<E> {
    logs: Mutex<BTreeMap<String, Vec<E>>>,
}

impl<E> InMemoryHistory<E> {
    pub fn new() -> Self {
        Self {
            logs: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<E> Default for InMemoryHistory<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E> HistoryStore<E> for InMemoryHistory<E>
where
    E: Clone + Send + Sync + 'static,
{
    async fn append(&self, run_id: &str, event: &E) -> Result<(), FrameworkError> {
        let mut logs = self
            .logs
            .lock()
            .map_err(|_| FrameworkError::History("history lock poisoned".to_string()))?;
        logs.entry(run_id.to_string())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Vec<E>, FrameworkError> {
        let logs = self
            .logs
            .lock()
            .map_err(|_| FrameworkError::History("history lock poisoned".to_string()))?;
        Ok(logs.get(run_id).cloned().unwrap_or_default())
    }

    async fn list_runs(&self) -> Result<Vec<String>, FrameworkError> {
        let logs = self
            .logs
            .lock()
            .map_err(|_| FrameworkError::History("history lock poisoned".to_string()))?;
        Ok(logs.keys().cloned().collect())
    }
}
