//! Resource Collector
//!
//! Drives one listing operation: a producer task fetches pages and submits
//! raw items, every submitted item is mapped on its own task, and the calling
//! task drains the mapped resources into a sink or a buffer. The first error
//! from fetching, mapping or the sink ends the call.

use super::error::DescribeError;
use super::model::Resource;
use super::sink::Sink;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;
use uuid::Uuid;

/// Default cap on mapping tasks in flight per call
pub const DEFAULT_MAX_CONCURRENCY: usize = 32;

/// Collector tuning, usually loaded from the `collector` config section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Resource channel capacity. 1 keeps mapping tasks in lockstep with the
    /// consumer.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Return buffered results in submission order instead of arrival order
    #[serde(default)]
    pub ordered: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_channel_capacity() -> usize {
    1
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            channel_capacity: 1,
            ordered: false,
            timeout_secs: None,
        }
    }
}

impl CollectorConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Handle given to the fetch callback for submitting raw items.
///
/// Cloning is cheap; every clone keeps the resource channel open, so clones
/// must not be stashed beyond the fetch callback.
#[derive(Clone)]
pub struct Submitter {
    tx: mpsc::Sender<(u64, Resource)>,
    errors: mpsc::Sender<anyhow::Error>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    token: CancellationToken,
    next_seq: Arc<AtomicU64>,
}

impl Submitter {
    /// Spawn a mapping task for one raw item.
    ///
    /// Waits for a concurrency permit first. Returns `Cancelled` once the call
    /// has been aborted so producers can stop paging.
    pub async fn submit<T, M>(&self, item: T, map: M) -> Result<()>
    where
        T: Send + 'static,
        M: FnOnce(T) -> Result<Option<Resource>> + Send + 'static,
    {
        let permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|_| DescribeError::Cancelled)?
            }
            _ = self.token.cancelled() => return Err(DescribeError::Cancelled.into()),
        };

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let tx = self.tx.clone();
        let errors = self.errors.clone();

        self.tracker.spawn(async move {
            match std::panic::catch_unwind(AssertUnwindSafe(|| map(item))) {
                Ok(Ok(Some(resource))) => {
                    // A closed channel means the call already failed
                    let _ = tx.send((seq, resource)).await;
                }
                Ok(Ok(None)) => tracing::trace!(seq, "Item mapped to nothing, skipping"),
                Ok(Err(e)) => {
                    let _ = errors.try_send(e);
                }
                Err(_) => {
                    let _ = errors.try_send(DescribeError::Task("item mapper panicked".into()).into());
                }
            }
            drop(permit);
        });

        Ok(())
    }

    /// Submit every item of a page with the same mapper
    pub async fn submit_all<T, I, M>(&self, items: I, map: M) -> Result<()>
    where
        T: Send + 'static,
        I: IntoIterator<Item = T>,
        M: FnOnce(T) -> Result<Option<Resource>> + Clone + Send + 'static,
    {
        for item in items {
            self.submit(item, map.clone()).await?;
        }
        Ok(())
    }

    /// Report a failure without returning from the fetch callback.
    /// Only the first failure of a call is kept.
    pub fn fail(&self, err: anyhow::Error) {
        if self.errors.try_send(err).is_err() {
            tracing::debug!("Error slot already taken, dropping later error");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the call is aborted
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Token for fetchers that select on cancellation themselves
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Runs describe calls with a shared configuration and cancellation root
#[derive(Clone)]
pub struct Collector {
    config: CollectorConfig,
    cancel: CancellationToken,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new(CollectorConfig::default())
    }
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Self {
        Self::with_cancellation(config, CancellationToken::new())
    }

    /// Calls are aborted with `Cancelled` when `cancel` fires
    pub fn with_cancellation(config: CollectorConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run a single request under the same cancellation and deadline as
    /// [`collect`](Self::collect)
    pub async fn bounded<T, Fut>(&self, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let timeout = self.config.timeout();
        let deadline = async {
            match timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            result = fut => result,
            _ = self.cancel.cancelled() => Err(DescribeError::Cancelled.into()),
            _ = deadline => Err(DescribeError::Timeout(timeout.unwrap_or_default()).into()),
        }
    }

    /// Run one listing operation.
    ///
    /// `fetch` runs on its own task and submits raw items through the
    /// [`Submitter`]. With a sink every resource is handed over as it arrives
    /// and the returned list is empty; without one the resources are returned.
    /// On error nothing is returned, though a sink may already have received
    /// some resources.
    pub async fn collect<F, Fut>(&self, fetch: F, sink: Option<&mut dyn Sink>) -> Result<Vec<Resource>>
    where
        F: FnOnce(Submitter) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let run_id = Uuid::new_v4();
        let streaming = sink.is_some();
        self.run(fetch, sink)
            .instrument(tracing::debug_span!("collect", %run_id, streaming))
            .await
    }

    async fn run<F, Fut>(&self, fetch: F, mut sink: Option<&mut dyn Sink>) -> Result<Vec<Resource>>
    where
        F: FnOnce(Submitter) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let streaming = sink.is_some();
        let token = self.cancel.child_token();
        let tracker = TaskTracker::new();
        let (tx, mut rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (err_tx, mut err_rx) = mpsc::channel::<anyhow::Error>(1);

        let submitter = Submitter {
            tx,
            errors: err_tx,
            permits: Arc::new(Semaphore::new(self.config.max_concurrency.max(1))),
            tracker: tracker.clone(),
            token: token.clone(),
            next_seq: Arc::new(AtomicU64::new(0)),
        };

        let producer = tracker.spawn(async move {
            // Holds the channels open until the error is in the slot
            let keepalive = submitter.clone();
            if let Err(e) = fetch(submitter).await {
                keepalive.fail(e);
            }
        });

        let timeout = self.config.timeout();
        let deadline = async {
            match timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        let mut buffered: Vec<(u64, Resource)> = Vec::new();
        let mut delivered = 0usize;

        let outcome: Result<()> = loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some((seq, resource)) => match sink.as_deref_mut() {
                        // A stalled sink must not outlive cancellation or the deadline
                        Some(sink) => {
                            let id = resource.id.clone();
                            tokio::select! {
                                sent = sink.send(resource) => {
                                    if let Err(source) = sent {
                                        break Err(DescribeError::Sink { id, source }.into());
                                    }
                                    delivered += 1;
                                }
                                _ = self.cancel.cancelled() => break Err(DescribeError::Cancelled.into()),
                                _ = &mut deadline => {
                                    break Err(DescribeError::Timeout(timeout.unwrap_or_default()).into());
                                }
                            }
                        }
                        None => buffered.push((seq, resource)),
                    },
                    // Every sender is gone; an error may still be waiting
                    None => break match err_rx.try_recv() {
                        Ok(e) => Err(e),
                        Err(_) => Ok(()),
                    },
                },
                Some(e) = err_rx.recv() => break Err(e),
                _ = self.cancel.cancelled() => break Err(DescribeError::Cancelled.into()),
                _ = &mut deadline => {
                    break Err(DescribeError::Timeout(timeout.unwrap_or_default()).into());
                }
            }
        };

        token.cancel();
        if outcome.is_err() {
            producer.abort();
        }
        drop(rx);

        let joined = producer.await;
        tracker.close();
        tracker.wait().await;

        if let Err(e) = outcome {
            tracing::warn!("Describe call failed: {:#}", e);
            return Err(e);
        }
        if let Err(e) = joined {
            return Err(DescribeError::Task(e.to_string()).into());
        }

        if streaming {
            tracing::debug!(delivered, "Streamed resources to sink");
            return Ok(Vec::new());
        }

        if self.config.ordered {
            buffered.sort_by_key(|(seq, _)| *seq);
        }
        tracing::debug!(count = buffered.len(), "Collected resources");
        Ok(buffered.into_iter().map(|(_, r)| r).collect())
    }
}

/// Fetch and map a single item with the same mapper the list path uses
pub async fn describe_one<T, Fut, M>(fetch: Fut, map: M) -> Result<Option<Resource>>
where
    Fut: Future<Output = Result<T>>,
    M: FnOnce(T) -> Result<Option<Resource>>,
{
    let item = fetch.await?;
    let resource = map(item)?;
    if resource.is_none() {
        tracing::debug!("Single item mapped to nothing");
    }
    Ok(resource)
}
