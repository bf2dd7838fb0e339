use crate::{AcquireError, PageFetcher, PageRenderer};
use pubdate_common::FetchMethod;
use pubdate_common::cache::BoundedCache;
use pubdate_config::{AcquireConfig, ServiceConfig, normalize_host};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Slack on top of the slowest configured source before a race is abandoned.
const RACE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct AcquireSettings {
    /// Head start given to the plain fetch before the browser is involved.
    pub render_delay: Duration,
    /// Upper bound on one acquisition, race or single method.
    pub race_timeout: Duration,
    pub method_ttl: Duration,
    pub method_cache_entries: usize,
}

impl Default for AcquireSettings {
    fn default() -> Self {
        Self {
            render_delay: Duration::from_millis(200),
            race_timeout: Duration::from_secs(30),
            method_ttl: Duration::from_secs(600),
            method_cache_entries: 1000,
        }
    }
}

impl AcquireSettings {
    pub fn from_config(acquire: &AcquireConfig, service: &ServiceConfig) -> Self {
        let render_delay = Duration::from_millis(acquire.render_delay_ms);
        let fetch = Duration::from_millis(acquire.fetch_timeout_ms);
        let render = render_delay + Duration::from_millis(acquire.render_timeout_ms);
        Self {
            render_delay,
            race_timeout: fetch.max(render) + RACE_GRACE,
            method_ttl: service.cache_ttl(),
            method_cache_entries: service.cache_max_entries,
        }
    }
}

/// Per-call acquisition knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcquireRequest {
    /// Use only this method (caller choice or site pin).
    pub forced: Option<FetchMethod>,
    /// Ignore and do not update the per-host method memo.
    pub disable_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredPage {
    pub html: String,
    pub method: FetchMethod,
}

/// Races a plain fetch against a delayed browser render and remembers,
/// per host, which one won.
#[derive(Clone)]
pub struct PageAcquirer {
    fetcher: Arc<dyn PageFetcher>,
    renderer: Option<Arc<dyn PageRenderer>>,
    methods: BoundedCache<String, FetchMethod>,
    settings: AcquireSettings,
}

impl PageAcquirer {
    /// `renderer: None` disables rendering; every page is fetched.
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        renderer: Option<Arc<dyn PageRenderer>>,
        settings: AcquireSettings,
    ) -> Self {
        Self {
            fetcher,
            renderer,
            methods: BoundedCache::new(settings.method_ttl, settings.method_cache_entries),
            settings,
        }
    }

    /// Memoized winning method for `host`.
    pub fn preferred_method(&self, host: &str) -> Option<FetchMethod> {
        self.methods.get(&normalize_host(host))
    }

    pub fn clear_methods(&self) {
        self.methods.clear();
    }

    /// Close the renderer's browser sessions.
    pub async fn close(&self) {
        if let Some(renderer) = &self.renderer {
            renderer.close().await;
        }
    }

    pub async fn acquire(
        &self,
        url: &Url,
        request: &AcquireRequest,
    ) -> Result<AcquiredPage, AcquireError> {
        let host = url.host_str().map(normalize_host).unwrap_or_default();
        let memoized = if request.disable_cache {
            None
        } else {
            self.methods.get(&host)
        };
        let pinned = request.forced.or(memoized);

        let run = async {
            match (pinned, &self.renderer) {
                (Some(method), _) => self.single(url.as_str(), method).await,
                (None, Some(renderer)) => self.race(url.as_str(), renderer.clone()).await,
                (None, None) => self.single(url.as_str(), FetchMethod::Fetch).await,
            }
        };
        let outcome = match tokio::time::timeout(self.settings.race_timeout, run).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AcquireError::Timeout(self.settings.race_timeout)),
        };

        match outcome {
            Ok(page) => {
                if pinned.is_none() && !request.disable_cache {
                    self.methods.insert(host.clone(), page.method);
                }
                tracing::debug!(host = %host, method = %page.method, bytes = page.html.len(), "acquire.page.ready");
                Ok(page)
            }
            Err(e) => {
                // Forget a memoized method that just failed.
                if request.forced.is_none() && memoized.is_some() {
                    self.methods.remove(&host);
                }
                Err(e)
            }
        }
    }

    async fn single(&self, url: &str, method: FetchMethod) -> Result<AcquiredPage, AcquireError> {
        tracing::debug!(url = %url, method = %method, "acquire.single");
        let html = match method {
            FetchMethod::Fetch => self.fetcher.fetch(url).await?,
            FetchMethod::Render => match &self.renderer {
                Some(renderer) => renderer.render(url).await?,
                None => return Err(AcquireError::RenderUnavailable),
            },
        };
        Ok(AcquiredPage { html, method })
    }

    /// Fetch starts now, render after `render_delay`. The first success
    /// cancels the other side; a render 404 ends the race as well.
    async fn race(
        &self,
        url: &str,
        renderer: Arc<dyn PageRenderer>,
    ) -> Result<AcquiredPage, AcquireError> {
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        let fetcher = self.fetcher.clone();
        let token = cancel.clone();
        let target = url.to_string();
        tasks.spawn(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => Err(AcquireError::Cancelled),
                r = fetcher.fetch(&target) => r,
            };
            (FetchMethod::Fetch, outcome)
        });

        let token = cancel.clone();
        let target = url.to_string();
        let delay = self.settings.render_delay;
        tasks.spawn(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => Err(AcquireError::Cancelled),
                r = async {
                    tokio::time::sleep(delay).await;
                    tracing::debug!(url = %target, "acquire.render.started");
                    renderer.render(&target).await
                } => r,
            };
            (FetchMethod::Render, outcome)
        });

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (method, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    failures.push(AcquireError::Task(e.to_string()));
                    continue;
                }
            };
            match outcome {
                Ok(html) => {
                    cancel.cancel();
                    tasks.shutdown().await;
                    tracing::info!(url = %url, method = %method, "acquire.race.winner");
                    return Ok(AcquiredPage { html, method });
                }
                Err(e) if e.is_not_found() => {
                    cancel.cancel();
                    tasks.shutdown().await;
                    tracing::info!(url = %url, "acquire.race.not_found");
                    return Err(e);
                }
                Err(e) => {
                    tracing::debug!(url = %url, method = %method, error = %e, "acquire.race.attempt_failed");
                    failures.push(e);
                }
            }
        }
        Err(pick_failure(failures))
    }
}

/// HTTP failures carry the status and page snippet, so they are reported
/// in preference to browser errors.
fn pick_failure(mut failures: Vec<AcquireError>) -> AcquireError {
    if failures.is_empty() {
        return AcquireError::Task("no acquisition attempt completed".into());
    }
    let idx = failures
        .iter()
        .position(|e| matches!(e, AcquireError::Http(_)))
        .unwrap_or(0);
    failures.swap_remove(idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubdate_drivers::DriverError;
    use pubdate_http::HttpError;

    #[test]
    fn http_failures_are_reported_first() {
        let picked = pick_failure(vec![
            AcquireError::Render(DriverError::Session("crashed".into())),
            AcquireError::Http(HttpError::Network("reset".into())),
        ]);
        assert!(matches!(picked, AcquireError::Http(_)));
        assert!(matches!(pick_failure(vec![]), AcquireError::Task(_)));
    }

    #[test]
    fn race_timeout_covers_the_slowest_source() {
        let acquire = AcquireConfig {
            render_delay_ms: 200,
            fetch_timeout_ms: 5_000,
            render_timeout_ms: 8_000,
            ..Default::default()
        };
        let settings = AcquireSettings::from_config(&acquire, &ServiceConfig::default());
        assert_eq!(settings.render_delay, Duration::from_millis(200));
        assert_eq!(settings.race_timeout, Duration::from_millis(9_200));
    }
}
