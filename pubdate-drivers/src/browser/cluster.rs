use crate::{BrowserSession, DriverError, RenderedPage, SessionLauncher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct ClusterConfig {
    /// Upper bound on concurrently open browser windows.
    pub max_concurrency: usize,
    /// Close idle sessions after this long without any render in flight.
    pub idle_close: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            idle_close: Duration::from_secs(60),
        }
    }
}

/// Lazily started pool of browser sessions shared by all workers.
///
/// Nothing is launched until the first render. At most `max_concurrency`
/// renders run at once, each on its own session; finished sessions go back
/// to an idle list for reuse. When no render has been in flight for
/// `idle_close`, every idle session is closed and the next render starts
/// a fresh one.
pub struct BrowserCluster<L: SessionLauncher> {
    inner: Arc<Inner<L>>,
}

impl<L: SessionLauncher> Clone for BrowserCluster<L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<L: SessionLauncher> {
    launcher: L,
    config: ClusterConfig,
    permits: Semaphore,
    idle: Mutex<Vec<L::Session>>,
    active: AtomicUsize,
    idle_timer: Mutex<Option<CancellationToken>>,
}

impl<L: SessionLauncher> Inner<L> {
    fn idle(&self) -> MutexGuard<'_, Vec<L::Session>> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cancel_idle_timer(&self) {
        let timer = self
            .idle_timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(token) = timer {
            token.cancel();
        }
    }

    async fn close_idle(&self) -> usize {
        let sessions = std::mem::take(&mut *self.idle());
        let count = sessions.len();
        for session in sessions {
            if let Err(e) = session.close().await {
                tracing::warn!(error = %e, "browser.session.close_failed");
            }
        }
        count
    }
}

impl<L: SessionLauncher> BrowserCluster<L> {
    pub fn new(launcher: L, config: ClusterConfig) -> Self {
        let max = config.max_concurrency.max(1);
        Self {
            inner: Arc::new(Inner {
                launcher,
                config,
                permits: Semaphore::new(max),
                idle: Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                idle_timer: Mutex::new(None),
            }),
        }
    }

    /// Number of open sessions waiting for work.
    pub fn idle_sessions(&self) -> usize {
        self.inner.idle().len()
    }

    /// Load `url` in a pooled session, giving up after `timeout`.
    ///
    /// A session that errors or times out is closed rather than reused.
    /// Dropping the returned future mid-render closes its session too.
    pub async fn render(&self, url: &str, timeout: Duration) -> Result<RenderedPage, DriverError> {
        let _activity = ActivityGuard::enter(self.inner.clone());
        let _permit = self
            .inner
            .permits
            .acquire()
            .await
            .map_err(|_| DriverError::Closed)?;

        let lease = SessionLease {
            inner: self.inner.clone(),
            session: Some(self.checkout().await?),
        };
        let Some(session) = lease.session.as_ref() else {
            return Err(DriverError::Closed);
        };

        let outcome = tokio::time::timeout(timeout, session.render(url)).await;
        match outcome {
            Ok(Ok(page)) => {
                lease.release();
                Ok(page)
            }
            Ok(Err(e)) => {
                tracing::debug!(url = %url, error = %e, "browser.render.failed");
                lease.discard().await;
                Err(e)
            }
            Err(_) => {
                tracing::debug!(url = %url, timeout_ms = timeout.as_millis() as u64, "browser.render.timeout");
                lease.discard().await;
                Err(DriverError::Timeout(timeout))
            }
        }
    }

    /// Close every idle session now. Later renders launch new ones.
    pub async fn close(&self) {
        self.inner.cancel_idle_timer();
        let closed = self.inner.close_idle().await;
        tracing::info!(sessions = closed, "browser.cluster.closed");
    }

    async fn checkout(&self) -> Result<L::Session, DriverError> {
        let reused = self.inner.idle().pop();
        if let Some(session) = reused {
            return Ok(session);
        }
        tracing::info!(
            active = self.inner.active.load(Ordering::SeqCst),
            "browser.cluster.launch"
        );
        self.inner.launcher.launch().await
    }
}

/// Session checked out of the pool. Closed on drop unless released.
struct SessionLease<L: SessionLauncher> {
    inner: Arc<Inner<L>>,
    session: Option<L::Session>,
}

impl<L: SessionLauncher> SessionLease<L> {
    fn release(mut self) {
        if let Some(session) = self.session.take() {
            self.inner.idle().push(session);
        }
    }

    async fn discard(mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                tracing::warn!(error = %e, "browser.session.close_failed");
            }
        }
    }
}

impl<L: SessionLauncher> Drop for SessionLease<L> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        tracing::warn!(error = %e, "browser.session.close_failed");
                    }
                });
            }
            Err(_) => tracing::warn!("browser.session.leaked"),
        }
    }
}

/// Counts renders in flight; the last one out arms the idle timer.
struct ActivityGuard<L: SessionLauncher> {
    inner: Arc<Inner<L>>,
}

impl<L: SessionLauncher> ActivityGuard<L> {
    fn enter(inner: Arc<Inner<L>>) -> Self {
        inner.active.fetch_add(1, Ordering::SeqCst);
        inner.cancel_idle_timer();
        Self { inner }
    }
}

impl<L: SessionLauncher> Drop for ActivityGuard<L> {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) != 1 {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let token = CancellationToken::new();
        let previous = self
            .inner
            .idle_timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let inner = self.inner.clone();
        let wait = inner.config.idle_close;
        handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(wait) => {
                    if inner.active.load(Ordering::SeqCst) == 0 {
                        let closed = inner.close_idle().await;
                        tracing::info!(sessions = closed, "browser.cluster.idle_close");
                    }
                }
            }
        });
    }
}
