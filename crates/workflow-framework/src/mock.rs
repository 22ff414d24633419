//! # Mock Framework & Testing Guide
//!
//! Typed clients (for example a bill client that turns a framework error back into a
//! domain error) can be tested without starting a run. Two styles are available:
//!
//! - **Raw receivers**: [`create_mock_client`] returns a real [`RunClient`] plus the
//!   [`Mailbox`] it talks to. The test pulls requests with [`expect_update`],
//!   [`expect_query`] or [`expect_signal`] and answers them by hand. Best when the test
//!   needs to inspect the payload.
//! - **Fluent expectations**: [`MockClient`] answers requests from a queue of
//!   expectations and records signals. Call [`MockClient::verify`] at the end.
//!
//! ```rust,ignore
//! let mut mock = MockClient::<Bill>::new();
//! mock.expect_update().return_ok(outcome);
//! let client = BillClient::new(bill_id, mock.client());
//! client.add_items(items).await?;
//! mock.verify();
//! ```

use crate::client::RunClient;
use crate::error::FrameworkError;
use crate::message::{channel, Mailbox, Response, RunRequest, UpdateId};
use crate::workflow::Workflow;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

enum Expectation<W: Workflow> {
    Update {
        response: Result<W::UpdateOutput, FrameworkError>,
    },
    Query {
        response: Result<W::Snapshot, FrameworkError>,
    },
}

type Expectations<W> = Arc<Mutex<VecDeque<Expectation<W>>>>;

/// A mock run with expectation tracking for fluent testing.
pub struct MockClient<W: Workflow> {
    client: RunClient<W>,
    expectations: Expectations<W>,
    signals: Arc<Mutex<Vec<W::Signal>>>,
    _handles: [tokio::task::JoinHandle<()>; 2],
}

impl<W: Workflow> Default for MockClient<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Workflow> MockClient<W> {
    /// Creates a new mock with no expectations.
    pub fn new() -> Self {
        let (client, mailbox) = channel::<W>(100);
        let Mailbox {
            mut requests,
            signals: mut signal_rx,
        } = mailbox;
        let expectations: Expectations<W> = Arc::new(Mutex::new(VecDeque::new()));
        let signals = Arc::new(Mutex::new(Vec::new()));

        let queue = expectations.clone();
        let request_handle = tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let expectation = queue.lock().unwrap().pop_front();
                match (request, expectation) {
                    (
                        RunRequest::Update { respond_to, .. },
                        Some(Expectation::Update { response }),
                    ) => {
                        let _ = respond_to.send(response);
                    }
                    (RunRequest::Query { respond_to }, Some(Expectation::Query { response })) => {
                        let _ = respond_to.send(response);
                    }
                    _ => panic!("Unexpected request or expectation mismatch"),
                }
            }
        });

        let received = signals.clone();
        let signal_handle = tokio::spawn(async move {
            while let Some(signal) = signal_rx.recv().await {
                received.lock().unwrap().push(signal);
            }
        });

        Self {
            client,
            expectations,
            signals,
            _handles: [request_handle, signal_handle],
        }
    }

    /// Returns the client for use in tests.
    pub fn client(&self) -> RunClient<W> {
        self.client.clone()
    }

    /// Expects an `update` call.
    pub fn expect_update(&mut self) -> UpdateExpectationBuilder<W> {
        UpdateExpectationBuilder {
            expectations: self.expectations.clone(),
        }
    }

    /// Expects a `query` call.
    pub fn expect_query(&mut self) -> QueryExpectationBuilder<W> {
        QueryExpectationBuilder {
            expectations: self.expectations.clone(),
        }
    }

    /// Number of signals received so far.
    pub fn signal_count(&self) -> usize {
        self.signals.lock().unwrap().len()
    }

    /// Verifies that all expectations were met.
    pub fn verify(&self) {
        let exps = self.expectations.lock().unwrap();
        if !exps.is_empty() {
            panic!("Not all expectations were met. {} remaining", exps.len());
        }
    }
}

/// Builder for `update` expectations.
pub struct UpdateExpectationBuilder<W: Workflow> {
    expectations: Expectations<W>,
}

impl<W: Workflow> UpdateExpectationBuilder<W> {
    pub fn return_ok(self, output: W::UpdateOutput) {
        self.expectations
            .lock()
            .unwrap()
            .push_back(Expectation::Update { response: Ok(output) });
    }

    pub fn return_err(self, error: FrameworkError) {
        self.expectations
            .lock()
            .unwrap()
            .push_back(Expectation::Update {
                response: Err(error),
            });
    }
}

/// Builder for `query` expectations.
pub struct QueryExpectationBuilder<W: Workflow> {
    expectations: Expectations<W>,
}

impl<W: Workflow> QueryExpectationBuilder<W> {
    pub fn return_ok(self, snapshot: W::Snapshot) {
        self.expectations
            .lock()
            .unwrap()
            .push_back(Expectation::Query {
                response: Ok(snapshot),
            });
    }

    pub fn return_err(self, error: FrameworkError) {
        self.expectations
            .lock()
            .unwrap()
            .push_back(Expectation::Query {
                response: Err(error),
            });
    }
}

// =============================================================================
// RAW RECEIVER HELPERS
// =============================================================================

/// Creates a client plus the mailbox it sends to, for hand-driven tests.
pub fn create_mock_client<W: Workflow>(buffer_size: usize) -> (RunClient<W>, Mailbox<W>) {
    channel(buffer_size)
}

/// Waits for the next request and returns it if it is an update.
pub async fn expect_update<W: Workflow>(
    receiver: &mut mpsc::Receiver<RunRequest<W>>,
) -> Option<(UpdateId, W::Update, Response<W::UpdateOutput>)> {
    match receiver.recv().await {
        Some(RunRequest::Update {
            update_id,
            update,
            respond_to,
        }) => Some((update_id, update, respond_to)),
        _ => None,
    }
}

/// Waits for the next request and returns it if it is a query.
pub async fn expect_query<W: Workflow>(
    receiver: &mut mpsc::Receiver<RunRequest<W>>,
) -> Option<Response<W::Snapshot>> {
    match receiver.recv().await {
        Some(RunRequest::Query { respond_to }) => Some(respond_to),
        _ => None,
    }
}

/// Waits for the next signal.
pub async fn expect_signal<W: Workflow>(receiver: &mut mpsc::Receiver<W::Signal>) -> Option<W::Signal> {
    receiver.recv().await
}
