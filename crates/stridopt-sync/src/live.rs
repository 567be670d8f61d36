//! Live query subscription with bounded retry.
//!
//! A [`LiveQuery`] owns a background task that opens a listener on the
//! document store, maps every snapshot into typed records and forwards the
//! results to the handle. Transport failures are retried with linear backoff;
//! once the bound is reached the task reports a terminal error and idles until
//! the consumer calls [`LiveQuery::retry`].
//!
//! The handle reconciles every event into a [`LiveView`]: the latest full
//! result set plus the subscription status. Each snapshot replaces the items
//! wholesale.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use stridopt_store::{Document, DocumentStore, Query, StoreError};

use crate::error::{Result, SyncError};
use crate::retry::RetryPolicy;

const EVENT_BUFFER: usize = 16;

/// Commands sent *into* the subscription task.
#[derive(Debug)]
enum LiveCommand {
    /// Re-establish now, resetting the failure count.
    Retry,
    Close,
}

/// Notifications sent *from* the subscription task, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent<T> {
    /// A complete, ordered replacement of the result set.
    Snapshot(Vec<T>),
    /// The subscription broke; the task waits `delay` before attempt `attempt + 1`.
    Retrying {
        attempt: u32,
        delay: Duration,
        error: String,
    },
    /// Terminal until [`LiveQuery::retry`].
    Failed(SyncError),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LiveStatus {
    #[default]
    Connecting,
    Live,
    Retrying {
        attempt: u32,
    },
    Failed(SyncError),
    Closed,
}

impl LiveStatus {
    pub fn error(&self) -> Option<&SyncError> {
        match self {
            LiveStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Reconciled local state of one subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveView<T> {
    pub items: Vec<T>,
    pub status: LiveStatus,
    /// Whether at least one snapshot has arrived.
    pub loaded: bool,
}

impl<T> Default for LiveView<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            status: LiveStatus::Connecting,
            loaded: false,
        }
    }
}

impl<T: Clone> LiveView<T> {
    fn apply(&mut self, event: &LiveEvent<T>) {
        match event {
            LiveEvent::Snapshot(items) => {
                self.items = items.clone();
                self.status = LiveStatus::Live;
                self.loaded = true;
            }
            LiveEvent::Retrying { attempt, .. } => {
                self.status = LiveStatus::Retrying { attempt: *attempt };
            }
            // Last good items stay visible under the error.
            LiveEvent::Failed(error) => {
                self.status = LiveStatus::Failed(error.clone());
            }
        }
    }
}

/// Handle to a running subscription. Dropping it cancels the task and
/// releases the backend listener.
pub struct LiveQuery<T> {
    collection: String,
    cmd_tx: mpsc::Sender<LiveCommand>,
    events: mpsc::Receiver<LiveEvent<T>>,
    view: LiveView<T>,
    task: Option<JoinHandle<()>>,
    closed: bool,
}

impl<T> LiveQuery<T>
where
    T: Clone + Send + 'static,
{
    /// Spawn the subscription task. Must be called inside a tokio runtime.
    ///
    /// Documents for which `mapper` fails are skipped with a warning.
    pub fn spawn<F>(
        store: Arc<dyn DocumentStore>,
        query: Query,
        policy: RetryPolicy,
        mapper: F,
    ) -> Self
    where
        F: Fn(&Document) -> stridopt_store::Result<T> + Send + Sync + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let (event_tx, events) = mpsc::channel(EVENT_BUFFER);
        let collection = query.collection.clone();
        let span = tracing::debug_span!("live", collection = %collection);

        let task = tokio::spawn(
            run(store, query, policy, mapper, cmd_rx, event_tx).instrument(span),
        );

        Self {
            collection,
            cmd_tx,
            events,
            view: LiveView::default(),
            task: Some(task),
            closed: false,
        }
    }

    /// Wait for the next event and fold it into [`LiveQuery::view`].
    /// Returns `None` once the subscription is closed.
    pub async fn next(&mut self) -> Option<LiveEvent<T>> {
        if self.closed {
            return None;
        }
        let event = self.events.recv().await?;
        self.view.apply(&event);
        Some(event)
    }

    /// Wait for the next snapshot, folding any status events on the way.
    /// Returns `None` on close or terminal failure.
    pub async fn next_snapshot(&mut self) -> Option<&[T]> {
        loop {
            match self.next().await? {
                LiveEvent::Snapshot(_) => return Some(&self.view.items),
                LiveEvent::Failed(_) => return None,
                LiveEvent::Retrying { .. } => {}
            }
        }
    }
}

impl<T> LiveQuery<T>
where
    T: DeserializeOwned + Clone + Send + 'static,
{
    /// Subscribe with the default document decoder.
    pub fn decoded(store: Arc<dyn DocumentStore>, query: Query, policy: RetryPolicy) -> Self {
        Self::spawn(store, query, policy, |doc: &Document| doc.decode::<T>())
    }
}

impl<T> LiveQuery<T> {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn view(&self) -> &LiveView<T> {
        &self.view
    }

    pub fn items(&self) -> &[T] {
        &self.view.items
    }

    pub fn status(&self) -> &LiveStatus {
        &self.view.status
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Ask a failed (or backing-off) subscription to re-establish now.
    pub fn retry(&self) -> Result<()> {
        if self.closed {
            return Err(SyncError::Closed);
        }
        match self.cmd_tx.try_send(LiveCommand::Retry) {
            Ok(()) => Ok(()),
            // A retry is already queued.
            Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SyncError::Closed),
        }
    }

    /// Stop the subscription. Idempotent; no event is delivered afterwards.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.cmd_tx.try_send(LiveCommand::Close);
        if let Some(task) = &self.task {
            task.abort();
        }
        self.events.close();
        self.view.status = LiveStatus::Closed;
        debug!(collection = %self.collection, "live query closed");
    }

    /// Close and wait until the backend listener has been released.
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

enum Outcome {
    Close,
    Broken(StoreError),
}

async fn run<T, F>(
    store: Arc<dyn DocumentStore>,
    query: Query,
    policy: RetryPolicy,
    mapper: F,
    mut cmd_rx: mpsc::Receiver<LiveCommand>,
    event_tx: mpsc::Sender<LiveEvent<T>>,
) where
    T: Send + 'static,
    F: Fn(&Document) -> stridopt_store::Result<T> + Send + Sync + 'static,
{
    let mut failures: u32 = 0;

    loop {
        let outcome = match store.listen(&query).await {
            Ok(mut stream) => {
                debug!("listener established");
                loop {
                    tokio::select! {
                        cmd = cmd_rx.recv() => match cmd {
                            Some(LiveCommand::Retry) => {}
                            Some(LiveCommand::Close) | None => break Outcome::Close,
                        },
                        item = stream.next() => match item {
                            Some(Ok(docs)) => {
                                failures = 0;
                                let items = map_documents(&docs, &mapper);
                                if event_tx.send(LiveEvent::Snapshot(items)).await.is_err() {
                                    break Outcome::Close;
                                }
                            }
                            Some(Err(e)) => break Outcome::Broken(e),
                            None => {
                                break Outcome::Broken(StoreError::Unavailable(
                                    "listener ended".into(),
                                ))
                            }
                        },
                    }
                }
            }
            Err(e) => Outcome::Broken(e),
        };

        let error = match outcome {
            Outcome::Close => break,
            Outcome::Broken(e) => e,
        };

        failures += 1;

        let terminal = if !error.is_transient() {
            Some(SyncError::Rejected {
                collection: query.collection.clone(),
                reason: error.to_string(),
            })
        } else if policy.is_exhausted(failures) {
            Some(SyncError::Exhausted {
                collection: query.collection.clone(),
                attempts: failures,
                last_error: error.to_string(),
            })
        } else {
            None
        };

        if let Some(terminal) = terminal {
            warn!(attempts = failures, error = %terminal, "subscription failed");
            if event_tx.send(LiveEvent::Failed(terminal)).await.is_err() {
                break;
            }
            match cmd_rx.recv().await {
                Some(LiveCommand::Retry) => {
                    info!("manual retry requested");
                    failures = 0;
                    continue;
                }
                Some(LiveCommand::Close) | None => break,
            }
        }

        let delay = policy.delay_after(failures);
        warn!(attempt = failures, delay_ms = delay.as_millis() as u64, error = %error, "subscription broken, retrying");
        let retrying = LiveEvent::Retrying {
            attempt: failures,
            delay,
            error: error.to_string(),
        };
        if event_tx.send(retrying).await.is_err() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            cmd = cmd_rx.recv() => match cmd {
                Some(LiveCommand::Retry) => failures = 0,
                Some(LiveCommand::Close) | None => break,
            },
        }
    }

    debug!("subscription task finished");
}

fn map_documents<T, F>(docs: &[Document], mapper: &F) -> Vec<T>
where
    F: Fn(&Document) -> stridopt_store::Result<T>,
{
    docs.iter()
        .filter_map(|doc| match mapper(doc) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(id = %doc.id, error = %e, "skipping undecodable document");
                None
            }
        })
        .collect()
}
