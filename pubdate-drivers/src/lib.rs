//! Headless browser layer used to render pages the plain fetch cannot get.
//!
//! - [`browser::driver::FantocciniLauncher`]: starts WebDriver (Chromedriver) sessions
//! - [`browser::cluster::BrowserCluster`]: lazily started, size-capped pool of
//!   sessions shared by all workers, closed after an idle period
//! - [`browser::profile`]: Chrome launch arguments and content preferences
//! - [`browser::fingerprint::UserAgentManager`]: desktop user-agent profiles
//!
//! The [`SessionLauncher`] and [`BrowserSession`] traits are the seam tests
//! replace with spies.
pub mod browser;

pub use browser::cluster::{BrowserCluster, ClusterConfig};
pub use browser::driver::{FantocciniLauncher, WebDriverSession};

use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error)]
pub enum DriverError {
    #[error("webdriver connect failed: {0}")]
    Connect(String),
    #[error("browser session error: {0}")]
    Session(String),
    #[error("render timed out after {0:?}")]
    Timeout(Duration),
    #[error("browser cluster closed")]
    Closed,
}

/// HTML of a rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// Main document status when the browser exposes it.
    pub status: Option<u16>,
    pub html: String,
    pub final_url: String,
}

impl RenderedPage {
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

/// One browser window able to load a page at a time.
#[async_trait]
pub trait BrowserSession: Send + Sync + 'static {
    async fn render(&self, url: &str) -> Result<RenderedPage, DriverError>;
    async fn close(&self) -> Result<(), DriverError>;
}

#[async_trait]
pub trait SessionLauncher: Send + Sync + 'static {
    type Session: BrowserSession;

    async fn launch(&self) -> Result<Self::Session, DriverError>;
}
