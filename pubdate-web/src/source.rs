use crate::AcquireError;
use async_trait::async_trait;
use pubdate_drivers::{BrowserCluster, SessionLauncher};
use pubdate_http::{HttpClient, PageRequest};
use std::time::Duration;

/// Plain HTTP source of page HTML.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, AcquireError>;
}

/// Headless browser source of page HTML.
///
/// A 404 answer must surface as [`AcquireError::NotFound`] with the page
/// HTML so callers can still read the error page's metadata.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, AcquireError>;

    /// Release browser resources now; later renders start them again.
    async fn close(&self) {}
}

pub struct HttpFetcher {
    client: HttpClient,
}

impl HttpFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AcquireError> {
        let page = self.client.get_page(url, PageRequest::default()).await?;
        Ok(page.body)
    }
}

/// Renders through the shared browser cluster.
pub struct ClusterRenderer<L: SessionLauncher> {
    cluster: BrowserCluster<L>,
    timeout: Duration,
}

impl<L: SessionLauncher> ClusterRenderer<L> {
    pub fn new(cluster: BrowserCluster<L>, timeout: Duration) -> Self {
        Self { cluster, timeout }
    }
}

#[async_trait]
impl<L: SessionLauncher> PageRenderer for ClusterRenderer<L> {
    async fn render(&self, url: &str) -> Result<String, AcquireError> {
        let page = self.cluster.render(url, self.timeout).await?;
        if page.is_not_found() {
            tracing::debug!(url = %url, final_url = %page.final_url, "acquire.render.not_found");
            return Err(AcquireError::NotFound { html: page.html });
        }
        Ok(page.html)
    }

    async fn close(&self) {
        self.cluster.close().await;
    }
}
