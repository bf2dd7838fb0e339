//! Task tracking and shutdown signaling for the service's long-lived tasks.
//!
//! Tasks subscribe to the broadcast channel for cooperative shutdown, while the
//! `JoinSet` ensures they are awaited during teardown.
use anyhow::Result;
use tokio::{sync::broadcast, task::JoinSet};

pub struct ActorSystem {
    joinset: JoinSet<Result<()>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorSystem {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(32);
        Self {
            joinset: JoinSet::new(),
            shutdown_tx,
        }
    }

    pub fn shutdown_notifier(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn track(&mut self, fut: impl std::future::Future<Output = Result<()>> + Send + 'static) {
        self.joinset.spawn(fut);
    }

    pub fn tracked(&self) -> usize {
        self.joinset.len()
    }

    /// Signal shutdown and wait for every tracked task. Failures are logged;
    /// the first one is returned.
    pub async fn graceful_shutdown(mut self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        let mut first_error = None;
        while let Some(res) = self.joinset.join_next().await {
            let failure = match res {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) => anyhow::Error::from(e),
            };
            tracing::warn!(error = ?failure, "system.task.failed");
            first_error.get_or_insert(failure);
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
