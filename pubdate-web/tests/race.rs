use async_trait::async_trait;
use pubdate_common::FetchMethod;
use pubdate_drivers::DriverError;
use pubdate_web::{
    AcquireError, AcquireRequest, AcquireSettings, PageAcquirer, PageFetcher, PageRenderer,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

#[derive(Clone, Copy)]
enum Outcome {
    Html(&'static str),
    Fail,
    NotFound,
}

/// Counts how often a source was started and how often it ran to the end.
struct Spy {
    started: AtomicUsize,
    finished: AtomicUsize,
    delay: Duration,
    outcome: Outcome,
}

impl Spy {
    fn new(delay_ms: u64, outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            delay: Duration::from_millis(delay_ms),
            outcome,
        })
    }

    fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    async fn run(&self) -> Result<String, AcquireError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            Outcome::Html(html) => Ok(html.to_string()),
            Outcome::Fail => Err(AcquireError::Render(DriverError::Session("boom".into()))),
            Outcome::NotFound => Err(AcquireError::NotFound {
                html: "<title>Not here</title>".into(),
            }),
        }
    }
}

#[async_trait]
impl PageFetcher for Spy {
    async fn fetch(&self, _url: &str) -> Result<String, AcquireError> {
        self.run().await
    }
}

#[async_trait]
impl PageRenderer for Spy {
    async fn render(&self, _url: &str) -> Result<String, AcquireError> {
        self.run().await
    }
}

fn acquirer(fetch: &Arc<Spy>, render: Option<&Arc<Spy>>) -> PageAcquirer {
    let renderer = render.map(|r| r.clone() as Arc<dyn PageRenderer>);
    PageAcquirer::new(
        fetch.clone(),
        renderer,
        AcquireSettings {
            render_delay: Duration::from_millis(200),
            race_timeout: Duration::from_secs(60),
            ..Default::default()
        },
    )
}

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

#[tokio::test(start_paused = true)]
async fn fast_fetch_means_render_never_starts() {
    let fetch = Spy::new(50, Outcome::Html("<p>fetched</p>"));
    let render = Spy::new(10, Outcome::Html("<p>rendered</p>"));
    let acq = acquirer(&fetch, Some(&render));

    let page = acq
        .acquire(&url("https://news.test/a"), &AcquireRequest::default())
        .await
        .unwrap();
    assert_eq!(page.method, FetchMethod::Fetch);
    assert_eq!(page.html, "<p>fetched</p>");
    assert_eq!(render.started(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_loses_and_is_cancelled() {
    let fetch = Spy::new(5_000, Outcome::Html("<p>fetched</p>"));
    let render = Spy::new(100, Outcome::Html("<p>rendered</p>"));
    let acq = acquirer(&fetch, Some(&render));

    let page = acq
        .acquire(&url("https://news.test/a"), &AcquireRequest::default())
        .await
        .unwrap();
    assert_eq!(page.method, FetchMethod::Render);
    assert_eq!(fetch.started(), 1);
    assert_eq!(fetch.finished(), 0);
}

#[tokio::test(start_paused = true)]
async fn winner_is_memoized_per_host() {
    let fetch = Spy::new(5_000, Outcome::Html("<p>fetched</p>"));
    let render = Spy::new(100, Outcome::Html("<p>rendered</p>"));
    let acq = acquirer(&fetch, Some(&render));

    acq.acquire(&url("https://www.news.test/a"), &AcquireRequest::default())
        .await
        .unwrap();
    assert_eq!(acq.preferred_method("news.test"), Some(FetchMethod::Render));

    let page = acq
        .acquire(&url("https://news.test/b"), &AcquireRequest::default())
        .await
        .unwrap();
    assert_eq!(page.method, FetchMethod::Render);
    assert_eq!(fetch.started(), 1);
    assert_eq!(render.started(), 2);
}

#[tokio::test(start_paused = true)]
async fn disabled_cache_races_every_time() {
    let fetch = Spy::new(5_000, Outcome::Html("<p>fetched</p>"));
    let render = Spy::new(100, Outcome::Html("<p>rendered</p>"));
    let acq = acquirer(&fetch, Some(&render));
    let request = AcquireRequest {
        disable_cache: true,
        ..Default::default()
    };

    acq.acquire(&url("https://news.test/a"), &request).await.unwrap();
    assert_eq!(acq.preferred_method("news.test"), None);
    acq.acquire(&url("https://news.test/a"), &request).await.unwrap();
    assert_eq!(fetch.started(), 2);
}

#[tokio::test(start_paused = true)]
async fn forced_method_runs_alone() {
    let fetch = Spy::new(5_000, Outcome::Html("<p>fetched</p>"));
    let render = Spy::new(100, Outcome::Html("<p>rendered</p>"));
    let acq = acquirer(&fetch, Some(&render));
    let request = AcquireRequest {
        forced: Some(FetchMethod::Fetch),
        ..Default::default()
    };

    let page = acq.acquire(&url("https://news.test/a"), &request).await.unwrap();
    assert_eq!(page.method, FetchMethod::Fetch);
    assert_eq!(render.started(), 0);
    assert_eq!(acq.preferred_method("news.test"), None);
}

#[tokio::test(start_paused = true)]
async fn render_404_ends_the_race() {
    let fetch = Spy::new(5_000, Outcome::Html("<p>fetched</p>"));
    let render = Spy::new(100, Outcome::NotFound);
    let acq = acquirer(&fetch, Some(&render));

    let err = acq
        .acquire(&url("https://news.test/gone"), &AcquireRequest::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.error_page(), Some("<title>Not here</title>"));
    assert_eq!(fetch.finished(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_leaves_render_to_finish() {
    let fetch = Spy::new(10, Outcome::Fail);
    let render = Spy::new(100, Outcome::Html("<p>rendered</p>"));
    let acq = acquirer(&fetch, Some(&render));

    let page = acq
        .acquire(&url("https://news.test/a"), &AcquireRequest::default())
        .await
        .unwrap();
    assert_eq!(page.method, FetchMethod::Render);
}

#[tokio::test(start_paused = true)]
async fn both_failing_is_an_error() {
    let fetch = Spy::new(10, Outcome::Fail);
    let render = Spy::new(10, Outcome::Fail);
    let acq = acquirer(&fetch, Some(&render));

    let err = acq
        .acquire(&url("https://news.test/a"), &AcquireRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AcquireError::Render(_)));
    assert_eq!(acq.preferred_method("news.test"), None);
}

#[tokio::test(start_paused = true)]
async fn without_renderer_pages_are_fetched() {
    let fetch = Spy::new(10, Outcome::Html("<p>fetched</p>"));
    let acq = acquirer(&fetch, None);

    let page = acq
        .acquire(&url("https://news.test/a"), &AcquireRequest::default())
        .await
        .unwrap();
    assert_eq!(page.method, FetchMethod::Fetch);

    let forced = AcquireRequest {
        forced: Some(FetchMethod::Render),
        ..Default::default()
    };
    let err = acq
        .acquire(&url("https://news.test/a"), &forced)
        .await
        .unwrap_err();
    assert!(matches!(err, AcquireError::RenderUnavailable));
}

#[tokio::test(start_paused = true)]
async fn race_gives_up_after_its_timeout() {
    let fetch = Spy::new(600_000, Outcome::Html("<p>late</p>"));
    let render = Spy::new(600_000, Outcome::Html("<p>late</p>"));
    let acq = acquirer(&fetch, Some(&render));

    let err = acq
        .acquire(&url("https://news.test/a"), &AcquireRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AcquireError::Timeout(_)));
    assert_eq!(fetch.finished(), 0);
}
