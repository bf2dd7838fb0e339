//! Worker loop: lease a job, acquire the page, extract, then ack or retry.
use crate::broker::JobBroker;
use crate::job::{Job, JobKey, JobOutcome};
use anyhow::Result;
use pubdate_common::cache::BoundedCache;
use pubdate_common::DateError;
use pubdate_extract::Engine;
use pubdate_web::{validate_url, AcquireError, AcquireRequest, PageAcquirer};
use std::sync::Arc;
use std::time::Duration;

/// Bounded retries with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Pause before the attempt following `completed` attempts.
    pub fn delay(&self, completed: u32) -> Duration {
        let exp = completed.saturating_sub(1).min(16);
        self.backoff * 2u32.pow(exp)
    }
}

/// Everything a worker needs; shared by all workers.
pub struct WorkerContext {
    pub broker: Arc<dyn JobBroker>,
    pub engine: Arc<Engine>,
    pub acquirer: PageAcquirer,
    pub results: BoundedCache<JobKey, JobOutcome>,
    pub retry: RetryPolicy,
}

/// Process jobs until the broker closes.
pub async fn run_worker(ctx: Arc<WorkerContext>, worker: usize) -> Result<()> {
    tracing::debug!(worker, "worker.started");
    while let Some(mut job) = ctx.broker.lease().await? {
        tracing::debug!(worker, job_id = %job.id, url = %job.key.url, attempt = job.attempt + 1, "worker.job.started");
        let outcome = run_isolated(&ctx, &job).await;
        job.attempt += 1;

        match outcome {
            Err(e) if e.kind().is_retryable() && job.attempt < ctx.retry.max_attempts => {
                let delay = ctx.retry.delay(job.attempt);
                tracing::warn!(
                    worker,
                    job_id = %job.id,
                    attempt = job.attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "queue.job.retry"
                );
                ctx.broker.retry(job, delay).await?;
            }
            outcome => {
                if !job.options.disable_cache {
                    ctx.results.insert(job.key.clone(), outcome.clone());
                }
                match &outcome {
                    Ok(result) => {
                        tracing::info!(worker, url = %job.key.url, strategy = ?result.strategy, "worker.job.succeeded")
                    }
                    Err(e) => {
                        tracing::info!(worker, url = %job.key.url, error_type = e.kind().as_str(), attempts = job.attempt, "worker.job.failed")
                    }
                }
                ctx.broker.ack(&job, outcome).await?;
            }
        }
    }
    tracing::debug!(worker, "worker.stopped");
    Ok(())
}

/// Runs one attempt on its own task so a panic becomes an internal error
/// instead of taking the worker down with the job's callers still waiting.
async fn run_isolated(ctx: &Arc<WorkerContext>, job: &Job) -> JobOutcome {
    let task = {
        let ctx = ctx.clone();
        let job = job.clone();
        tokio::spawn(async move { process(&ctx, &job).await })
    };
    match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(job_id = %job.id, error = %e, "worker.job.panicked");
            Err(DateError::internal(&job.key.url, "worker crashed"))
        }
    }
}

async fn process(ctx: &WorkerContext, job: &Job) -> JobOutcome {
    let raw = job.key.url.as_str();
    let url = validate_url(raw, ctx.engine.site_data())?;
    let pinned = url
        .host_str()
        .and_then(|host| ctx.engine.site_override(host))
        .and_then(|site| site.fetch);
    let request = AcquireRequest {
        forced: job.options.fetch_method.or(pinned),
        disable_cache: job.options.disable_cache,
    };

    let page = ctx
        .acquirer
        .acquire(&url, &request)
        .await
        .map_err(|e| acquisition_error(&ctx.engine, raw, e))?;
    ctx.engine.extract(&page.html, raw, job.key.check_modified)
}

/// Map an acquisition failure into the caller taxonomy. A rendered 404 is
/// final; everything else may succeed on another attempt.
fn acquisition_error(engine: &Engine, url: &str, err: AcquireError) -> DateError {
    let metadata = err
        .error_page()
        .map(|html| engine.metadata(html, url))
        .unwrap_or_default();
    match err {
        AcquireError::NotFound { .. } => DateError::not_found(url, metadata),
        AcquireError::Task(message) => DateError::internal(url, message),
        other => DateError::fetch_with_metadata(url, other.to_string(), metadata),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubdate_common::clock::FixedClock;
    use pubdate_common::ErrorKind;
    use pubdate_config::PubdateConfig;
    use pubdate_http::{HttpError, StatusCode};

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(1000));
        assert_eq!(policy.delay(3), Duration::from_millis(2000));
    }

    #[test]
    fn rendered_404_is_final_and_keeps_metadata() {
        let engine =
            Engine::new(&PubdateConfig::default(), Arc::new(FixedClock::on(2024, 6, 15))).unwrap();
        let err = acquisition_error(
            &engine,
            "https://herald.test/gone",
            AcquireError::NotFound {
                html: "<title>Page not found | Herald</title>".into(),
            },
        );
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            err.metadata().and_then(|m| m.title.as_deref()),
            Some("Page not found")
        );

        let err = acquisition_error(
            &engine,
            "https://herald.test/a",
            AcquireError::Timeout(Duration::from_secs(3)),
        );
        assert_eq!(err.kind(), ErrorKind::Fetch);
    }

    #[test]
    fn fetched_404_keeps_metadata_from_a_long_head() {
        let engine =
            Engine::new(&PubdateConfig::default(), Arc::new(FixedClock::on(2024, 6, 15))).unwrap();
        let preloads = "<link rel=\"preload\" href=\"/static/bundle.js\" as=\"script\">\n".repeat(10);
        let body = format!(
            "<!doctype html><html><head>{preloads}<title>Page not found | Herald</title></head></html>"
        );
        let err = acquisition_error(
            &engine,
            "https://herald.test/gone",
            AcquireError::Http(HttpError::Status {
                status: StatusCode::NOT_FOUND,
                body,
            }),
        );
        assert_eq!(err.kind(), ErrorKind::Fetch);
        assert_eq!(
            err.metadata().and_then(|m| m.title.as_deref()),
            Some("Page not found")
        );
    }
}
