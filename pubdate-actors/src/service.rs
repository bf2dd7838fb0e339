//! `DateService`: the single caller-facing `extract(url, options)` operation.
//!
//! Requests are validated, answered from the result cache when possible,
//! and otherwise submitted to the job queue actor. A pool of supervised
//! workers drains the broker; outcomes flow back through the broker's
//! completion channel to every waiting caller.
use crate::actor::{spawn_actor_with_shutdown, ActorHandle, Addr};
use crate::broker::{InMemoryBroker, JobBroker};
use crate::job::{JobKey, JobOutcome};
use crate::queue::{JobQueue, QueueMsg};
use crate::supervise::supervise;
use crate::system::ActorSystem;
use crate::worker::{run_worker, RetryPolicy, WorkerContext};
use anyhow::{Context as _, Result};
use pubdate_common::cache::BoundedCache;
use pubdate_common::clock::{system_clock, SharedClock};
use pubdate_common::{DateError, ExtractOptions};
use pubdate_config::PubdateConfig;
use pubdate_drivers::browser::fingerprint::UserAgentManager;
use pubdate_drivers::{BrowserCluster, ClusterConfig, FantocciniLauncher};
use pubdate_extract::{Engine, ExtractionResult};
use pubdate_http::HttpClient;
use pubdate_web::{
    validate_url, AcquireSettings, ClusterRenderer, HttpFetcher, PageAcquirer, PageFetcher,
    PageRenderer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};

const QUEUE_MAILBOX: usize = 256;

pub struct DateService {
    engine: Arc<Engine>,
    acquirer: PageAcquirer,
    results: BoundedCache<JobKey, JobOutcome>,
    broker: Arc<dyn JobBroker>,
    queue: Addr<JobQueue>,
    system: ActorSystem,
}

impl DateService {
    pub fn builder(config: PubdateConfig) -> DateServiceBuilder {
        DateServiceBuilder {
            config,
            clock: None,
            fetcher: None,
            renderer: None,
            broker: None,
        }
    }

    /// Publish (and optionally modify) date of the article at `url`.
    pub async fn extract(
        &self,
        url: &str,
        options: ExtractOptions,
    ) -> Result<ExtractionResult, DateError> {
        validate_url(url, self.engine.site_data())?;
        let key = JobKey::new(url, options.check_modified);
        if !options.disable_cache {
            if let Some(cached) = self.results.get(&key) {
                tracing::debug!(url = %key.url, "service.cache.hit");
                return cached;
            }
        }

        let timeout = options.timeout();
        let (reply, outcome) = oneshot::channel();
        self.queue
            .send(QueueMsg::Submit {
                key,
                options,
                reply,
            })
            .await
            .map_err(|_| DateError::internal(url, "job queue is not running"))?;

        match tokio::time::timeout(timeout, outcome).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(DateError::internal(url, "job was dropped")),
            Err(_) => {
                tracing::warn!(url = %url, timeout_ms = timeout.as_millis() as u64, "service.request.timeout");
                Err(DateError::fetch(
                    url,
                    format!("Request timed out after {} ms", timeout.as_millis()),
                ))
            }
        }
    }

    /// Close browser sessions now and optionally drop every cached result
    /// and fetch-method preference.
    pub async fn close(&self, clear_cache: bool) {
        self.acquirer.close().await;
        if clear_cache {
            self.results.clear();
            self.acquirer.clear_methods();
        }
        tracing::info!(clear_cache, "service.closed");
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Stop workers and the queue, then close the browser.
    pub async fn shutdown(self) -> Result<()> {
        self.broker.close();
        let outcome = self.system.graceful_shutdown().await;
        self.acquirer.close().await;
        outcome
    }
}

pub struct DateServiceBuilder {
    config: PubdateConfig,
    clock: Option<SharedClock>,
    fetcher: Option<Arc<dyn PageFetcher>>,
    renderer: Option<Option<Arc<dyn PageRenderer>>>,
    broker: Option<Arc<dyn JobBroker>>,
}

impl DateServiceBuilder {
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// `None` disables rendering.
    pub fn renderer(mut self, renderer: Option<Arc<dyn PageRenderer>>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn broker(mut self, broker: Arc<dyn JobBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Compile the engine and start the queue and workers. Must run inside
    /// a Tokio runtime. No browser is launched until a render is needed.
    pub fn build(self) -> Result<DateService> {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(system_clock);
        let engine = Arc::new(Engine::new(&config, clock).context("compiling extraction engine")?);

        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => default_fetcher(&config)?,
        };
        let renderer = match self.renderer {
            Some(renderer) => renderer,
            None => default_renderer(&config),
        };
        let acquirer = PageAcquirer::new(
            fetcher,
            renderer,
            AcquireSettings::from_config(&config.acquire, &config.service),
        );
        let broker = self
            .broker
            .unwrap_or_else(|| Arc::new(InMemoryBroker::new()));
        let results = BoundedCache::new(
            config.service.cache_ttl(),
            config.service.cache_max_entries,
        );

        let mut system = ActorSystem::new();
        let ActorHandle { addr: queue, task } = spawn_actor_with_shutdown(
            JobQueue::new(broker.clone()),
            QUEUE_MAILBOX,
            Some(system.shutdown_notifier()),
        );
        system.track(async move { task.await? });
        system.track(forward_completions(
            broker.completions(),
            queue.clone(),
            system.shutdown_notifier(),
        ));

        let ctx = Arc::new(WorkerContext {
            broker: broker.clone(),
            engine: engine.clone(),
            acquirer: acquirer.clone(),
            results: results.clone(),
            retry: RetryPolicy {
                max_attempts: config.service.max_attempts.max(1),
                backoff: Duration::from_millis(config.service.retry_backoff_ms),
            },
        });
        let workers = config.service.workers.max(1);
        for worker in 0..workers {
            let ctx = ctx.clone();
            system.track(supervise(
                "worker",
                move || run_worker(ctx.clone(), worker),
                system.shutdown_notifier(),
            ));
        }
        tracing::info!(workers, render = config.acquire.render_enabled, "service.started");

        Ok(DateService {
            engine,
            acquirer,
            results,
            broker,
            queue,
            system,
        })
    }
}

/// Relay broker completions into the queue actor's mailbox.
async fn forward_completions(
    mut completions: broadcast::Receiver<crate::broker::Completion>,
    queue: Addr<JobQueue>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            next = completions.recv() => match next {
                Ok(done) => {
                    if queue.send(QueueMsg::Completed(done)).await.is_err() {
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "queue.completions.lagged");
                    if queue.send(QueueMsg::Resync).await.is_err() {
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}

fn default_fetcher(config: &PubdateConfig) -> Result<Arc<dyn PageFetcher>> {
    let acquire = &config.acquire;
    let client = HttpClient::new()
        .context("building HTTP client")?
        .with_timeout(Duration::from_millis(acquire.fetch_timeout_ms))
        .with_user_agent(acquire.user_agent.clone())
        .with_fallback_user_agent(acquire.fallback_user_agent.clone());
    Ok(Arc::new(HttpFetcher::new(client)))
}

/// Rendered pages present the same user agent as fetches when one is configured.
fn launcher(config: &PubdateConfig) -> FantocciniLauncher {
    let browser = &config.browser;
    let launcher = FantocciniLauncher::new(browser.webdriver_url.clone(), browser.headless);
    match &config.acquire.user_agent {
        Some(ua) => launcher.with_user_agents(UserAgentManager::fixed(ua)),
        None => launcher,
    }
}

fn default_renderer(config: &PubdateConfig) -> Option<Arc<dyn PageRenderer>> {
    if !config.acquire.render_enabled {
        return None;
    }
    let browser = &config.browser;
    let cluster = BrowserCluster::new(
        launcher(config),
        ClusterConfig {
            max_concurrency: browser.max_concurrency,
            idle_close: Duration::from_millis(browser.idle_close_ms),
        },
    );
    Some(Arc::new(ClusterRenderer::new(
        cluster,
        Duration::from_millis(config.acquire.render_timeout_ms),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::spawn_actor;
    use crate::broker::Completion;
    use pubdate_common::ErrorKind;

    #[tokio::test]
    async fn lagged_completions_release_waiting_callers() {
        let broker = InMemoryBroker::new();
        let handle = spawn_actor(JobQueue::new(Arc::new(broker.clone())), 8);
        let (reply, waiting) = oneshot::channel();
        handle
            .addr
            .send(QueueMsg::Submit {
                key: JobKey::new("https://a.test/lost", false),
                options: ExtractOptions::default(),
                reply,
            })
            .await
            .ok();

        let (tx, rx) = broadcast::channel(1);
        for n in 0..3 {
            let url = format!("https://a.test/{n}");
            let _ = tx.send(Completion {
                job_id: n.to_string(),
                key: JobKey::new(&url, false),
                outcome: Err(DateError::fetch(&url, "boom")),
            });
        }
        let (_stop, stop_rx) = broadcast::channel(1);
        tokio::spawn(forward_completions(rx, handle.addr.clone(), stop_rx));

        let err = waiting.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.url(), "https://a.test/lost");
    }

    #[test]
    fn configured_user_agent_is_used_for_rendering() {
        let mut config = PubdateConfig::default();
        assert_ne!(launcher(&config).user_agents.pick().user_agent, "");
        config.acquire.user_agent = Some("HeraldBot/2.0".into());
        assert_eq!(launcher(&config).user_agents.pick().user_agent, "HeraldBot/2.0");
    }
}
