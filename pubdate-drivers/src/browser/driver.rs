use crate::browser::{fingerprint::UserAgentManager, profile::capabilities};
use crate::{BrowserSession, DriverError, RenderedPage, SessionLauncher};
use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder};
use serde_json::Value;

/// Reads the main document's HTTP status from the Navigation Timing entry.
const STATUS_SCRIPT: &str = r#"
    const nav = performance.getEntriesByType('navigation')[0];
    return nav && nav.responseStatus ? nav.responseStatus : null;
"#;

/// Starts Chrome sessions through a running WebDriver service.
///
/// Default endpoint is `http://localhost:9515` (Chromedriver).
#[derive(Debug, Clone)]
pub struct FantocciniLauncher {
    pub webdriver_url: String,
    pub headless: bool,
    pub user_agents: UserAgentManager,
}

impl FantocciniLauncher {
    pub fn new(webdriver_url: impl Into<String>, headless: bool) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            headless,
            user_agents: UserAgentManager::new(),
        }
    }

    pub fn with_user_agents(mut self, user_agents: UserAgentManager) -> Self {
        self.user_agents = user_agents;
        self
    }
}

#[async_trait]
impl SessionLauncher for FantocciniLauncher {
    type Session = WebDriverSession;

    async fn launch(&self) -> Result<WebDriverSession, DriverError> {
        let profile = self.user_agents.pick();
        let client = ClientBuilder::native()
            .capabilities(capabilities(self.headless, &profile))
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| DriverError::Connect(e.to_string()))?;
        tracing::debug!(
            webdriver = %self.webdriver_url,
            user_agent = %profile.user_agent,
            "browser.session.started"
        );
        Ok(WebDriverSession { client })
    }
}

/// One WebDriver browser window.
pub struct WebDriverSession {
    client: Client,
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn render(&self, url: &str) -> Result<RenderedPage, DriverError> {
        self.client
            .goto(url)
            .await
            .map_err(|e| DriverError::Session(e.to_string()))?;

        // Best effort: older browsers do not expose responseStatus.
        let status = match self.client.execute(STATUS_SCRIPT, vec![]).await {
            Ok(Value::Number(n)) => n.as_u64().and_then(|s| u16::try_from(s).ok()),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "browser.render.status_unavailable");
                None
            }
        };

        let html = self
            .client
            .source()
            .await
            .map_err(|e| DriverError::Session(e.to_string()))?;
        let final_url = self
            .client
            .current_url()
            .await
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string());

        Ok(RenderedPage {
            status,
            html,
            final_url,
        })
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.client
            .clone()
            .close()
            .await
            .map_err(|e| DriverError::Session(e.to_string()))
    }
}
