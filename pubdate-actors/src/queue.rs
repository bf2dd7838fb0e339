//! Job queue actor: turns requests into broker jobs and fans outcomes back
//! out to every caller waiting on the same key.
use crate::actor::{Actor, Context};
use crate::broker::{Completion, JobBroker};
use crate::job::{Job, JobKey, JobOutcome};
use anyhow::Result;
use pubdate_common::{DateError, ExtractOptions};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

pub enum QueueMsg {
    Submit {
        key: JobKey,
        options: ExtractOptions,
        reply: oneshot::Sender<JobOutcome>,
    },
    Completed(Completion),
    /// Completions were lost; nobody still waiting can be answered.
    Resync,
}

pub struct JobQueue {
    broker: Arc<dyn JobBroker>,
    /// Callers per in-flight key; one broker job serves them all.
    waiting: HashMap<JobKey, Vec<oneshot::Sender<JobOutcome>>>,
}

impl JobQueue {
    pub fn new(broker: Arc<dyn JobBroker>) -> Self {
        Self {
            broker,
            waiting: HashMap::new(),
        }
    }
}

#[async_trait::async_trait]
impl Actor for JobQueue {
    type Msg = QueueMsg;

    async fn handle(&mut self, msg: QueueMsg, _ctx: &mut Context<Self>) -> Result<()> {
        match msg {
            QueueMsg::Submit {
                key,
                options,
                reply,
            } => {
                // A job whose callers all timed out still counts as in flight.
                if let Some(waiters) = self.waiting.get_mut(&key) {
                    waiters.retain(|w| !w.is_closed());
                    waiters.push(reply);
                    tracing::debug!(url = %key.url, waiters = waiters.len(), "queue.job.coalesced");
                    return Ok(());
                }
                let job = Job::new(key.clone(), options);
                match self.broker.enqueue(job).await {
                    Ok(()) => {
                        self.waiting.insert(key, vec![reply]);
                    }
                    Err(e) => {
                        tracing::error!(url = %key.url, error = %e, "queue.job.enqueue_failed");
                        let _ = reply.send(Err(DateError::internal(&key.url, e.to_string())));
                    }
                }
            }
            QueueMsg::Completed(done) => {
                let Some(waiters) = self.waiting.remove(&done.key) else {
                    return Ok(());
                };
                tracing::debug!(job_id = %done.job_id, waiters = waiters.len(), ok = done.outcome.is_ok(), "queue.job.delivered");
                for waiter in waiters {
                    let _ = waiter.send(done.outcome.clone());
                }
            }
            QueueMsg::Resync => {
                let orphaned = std::mem::take(&mut self.waiting);
                tracing::warn!(keys = orphaned.len(), "queue.waiters.resync");
                for (key, waiters) in orphaned {
                    for waiter in waiters {
                        let _ = waiter.send(Err(DateError::internal(
                            &key.url,
                            "job completion was lost",
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::spawn_actor;
    use crate::broker::InMemoryBroker;

    #[tokio::test]
    async fn duplicate_submissions_share_one_job() {
        let broker = InMemoryBroker::new();
        let handle = spawn_actor(JobQueue::new(Arc::new(broker.clone())), 8);
        let key = JobKey::new("https://a.test/1", false);

        let mut replies = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = oneshot::channel();
            handle
                .addr
                .send(QueueMsg::Submit {
                    key: key.clone(),
                    options: ExtractOptions::default(),
                    reply: tx,
                })
                .await
                .ok();
            replies.push(rx);
        }

        let job = broker.lease().await.unwrap().unwrap();
        assert_eq!(broker.pending(), 0);
        handle
            .addr
            .send(QueueMsg::Completed(Completion {
                job_id: job.id,
                key,
                outcome: Err(DateError::not_found("https://a.test/1", Default::default())),
            }))
            .await
            .ok();

        for rx in replies {
            assert!(rx.await.unwrap().is_err());
        }
    }

    #[tokio::test]
    async fn late_callers_join_a_job_whose_callers_left() {
        let broker = InMemoryBroker::new();
        let handle = spawn_actor(JobQueue::new(Arc::new(broker.clone())), 8);
        let key = JobKey::new("https://a.test/1", false);

        let (tx, rx) = oneshot::channel();
        handle
            .addr
            .send(QueueMsg::Submit {
                key: key.clone(),
                options: ExtractOptions::default(),
                reply: tx,
            })
            .await
            .ok();
        drop(rx);
        let (tx, late) = oneshot::channel();
        handle
            .addr
            .send(QueueMsg::Submit {
                key: key.clone(),
                options: ExtractOptions::default(),
                reply: tx,
            })
            .await
            .ok();

        let job = broker.lease().await.unwrap().unwrap();
        assert_eq!(broker.pending(), 0);
        handle
            .addr
            .send(QueueMsg::Completed(Completion {
                job_id: job.id,
                key,
                outcome: Err(DateError::fetch("https://a.test/1", "boom")),
            }))
            .await
            .ok();
        assert!(late.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn resync_releases_waiters_and_allows_a_fresh_job() {
        let broker = InMemoryBroker::new();
        let handle = spawn_actor(JobQueue::new(Arc::new(broker.clone())), 8);
        let key = JobKey::new("https://a.test/1", false);
        let submit = |tx| QueueMsg::Submit {
            key: key.clone(),
            options: ExtractOptions::default(),
            reply: tx,
        };

        let (tx, stuck) = oneshot::channel();
        handle.addr.send(submit(tx)).await.ok();
        handle.addr.send(QueueMsg::Resync).await.ok();
        let err = stuck.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), pubdate_common::ErrorKind::Internal);

        let (tx, _fresh) = oneshot::channel();
        handle.addr.send(submit(tx)).await.ok();
        let (tx, joined) = oneshot::channel();
        handle.addr.send(submit(tx)).await.ok();
        handle.addr.send(QueueMsg::Resync).await.ok();
        assert!(joined.await.unwrap().is_err());
        assert_eq!(broker.pending(), 2);
    }
}
