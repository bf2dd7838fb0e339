//! Job broker seam and the in-process implementation.
//!
//! A broker hands out queued jobs to workers (`lease`), takes them back for
//! a delayed retry, and publishes every terminal outcome on a broadcast
//! channel that the job queue listens to.
use crate::job::{Job, JobKey, JobOutcome};
use anyhow::Result;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

const COMPLETION_BUFFER: usize = 1024;

/// Terminal outcome of a job, as published to listeners.
#[derive(Debug, Clone)]
pub struct Completion {
    pub job_id: String,
    pub key: JobKey,
    pub outcome: JobOutcome,
}

#[async_trait]
pub trait JobBroker: Send + Sync + 'static {
    async fn enqueue(&self, job: Job) -> Result<()>;

    /// Next job by priority, waiting while the queue is empty. `None` once
    /// the broker is closed.
    async fn lease(&self) -> Result<Option<Job>>;

    /// Finish a leased job and publish its outcome.
    async fn ack(&self, job: &Job, outcome: JobOutcome) -> Result<()>;

    /// Put a leased job back after `delay`.
    async fn retry(&self, job: Job, delay: Duration) -> Result<()>;

    fn completions(&self) -> broadcast::Receiver<Completion>;

    fn close(&self);
}

struct Queued {
    priority: i32,
    seq: u64,
    job: Job,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    /// Higher priority first, then first in.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Queued>,
    seq: u64,
    closed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    ready: Notify,
    completions: broadcast::Sender<Completion>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, job: Job) -> Result<()> {
        {
            let mut state = self.state();
            if state.closed {
                anyhow::bail!("broker is closed");
            }
            state.seq += 1;
            let seq = state.seq;
            state.heap.push(Queued {
                priority: job.priority(),
                seq,
                job,
            });
        }
        self.ready.notify_one();
        Ok(())
    }
}

/// Priority queue in process memory. Jobs do not survive a restart.
#[derive(Clone)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        let (completions, _) = broadcast::channel(COMPLETION_BUFFER);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                ready: Notify::new(),
                completions,
            }),
        }
    }

    /// Jobs waiting to be leased.
    pub fn pending(&self) -> usize {
        self.shared.state().heap.len()
    }
}

#[async_trait]
impl JobBroker for InMemoryBroker {
    async fn enqueue(&self, job: Job) -> Result<()> {
        tracing::debug!(job_id = %job.id, url = %job.key.url, priority = job.priority(), "queue.job.enqueued");
        self.shared.push(job)
    }

    async fn lease(&self) -> Result<Option<Job>> {
        loop {
            let notified = self.shared.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.shared.state();
                if let Some(queued) = state.heap.pop() {
                    return Ok(Some(queued.job));
                }
                if state.closed {
                    return Ok(None);
                }
            }
            notified.await;
        }
    }

    async fn ack(&self, job: &Job, outcome: JobOutcome) -> Result<()> {
        let completion = Completion {
            job_id: job.id.clone(),
            key: job.key.clone(),
            outcome,
        };
        // No listener is not an error; the outcome is cached anyway.
        let _ = self.shared.completions.send(completion);
        Ok(())
    }

    async fn retry(&self, job: Job, delay: Duration) -> Result<()> {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let job_id = job.id.clone();
            if let Err(e) = shared.push(job) {
                tracing::warn!(job_id = %job_id, error = %e, "queue.job.retry_dropped");
            }
        });
        Ok(())
    }

    fn completions(&self) -> broadcast::Receiver<Completion> {
        self.shared.completions.subscribe()
    }

    fn close(&self) {
        self.shared.state().closed = true;
        self.shared.ready.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobKey;
    use pubdate_common::{DateError, ExtractOptions};

    fn job(url: &str, priority: Option<i32>) -> Job {
        Job::new(
            JobKey::new(url, false),
            ExtractOptions {
                priority,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn leases_by_priority_then_arrival() {
        let broker = InMemoryBroker::new();
        broker.enqueue(job("https://a.test/low", None)).await.unwrap();
        broker.enqueue(job("https://a.test/high", Some(5))).await.unwrap();
        broker.enqueue(job("https://a.test/low2", None)).await.unwrap();

        let order: Vec<String> = [
            broker.lease().await.unwrap().unwrap(),
            broker.lease().await.unwrap().unwrap(),
            broker.lease().await.unwrap().unwrap(),
        ]
        .into_iter()
        .map(|j| j.key.url)
        .collect();
        assert_eq!(
            order,
            ["https://a.test/high", "https://a.test/low", "https://a.test/low2"]
        );
    }

    #[tokio::test]
    async fn waiting_lease_wakes_on_enqueue() {
        let broker = InMemoryBroker::new();
        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.lease().await })
        };
        tokio::task::yield_now().await;
        broker.enqueue(job("https://a.test/1", None)).await.unwrap();
        let leased = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(leased.key.url, "https://a.test/1");
    }

    #[tokio::test(start_paused = true)]
    async fn retries_come_back_after_the_delay() {
        let broker = InMemoryBroker::new();
        broker
            .retry(job("https://a.test/1", None), Duration::from_secs(2))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        assert_eq!(broker.pending(), 0);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(broker.pending(), 1);
    }

    #[tokio::test]
    async fn close_releases_waiting_workers() {
        let broker = InMemoryBroker::new();
        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.lease().await })
        };
        tokio::task::yield_now().await;
        broker.close();
        assert!(waiter.await.unwrap().unwrap().is_none());
        assert!(broker.enqueue(job("https://a.test/1", None)).await.is_err());
    }

    #[tokio::test]
    async fn acks_are_published() {
        let broker = InMemoryBroker::new();
        let mut rx = broker.completions();
        let j = job("https://a.test/1", None);
        broker
            .ack(&j, Err(DateError::fetch("https://a.test/1", "boom")))
            .await
            .unwrap();
        let done = rx.recv().await.unwrap();
        assert_eq!(done.job_id, j.id);
        assert!(done.outcome.is_err());
    }
}
