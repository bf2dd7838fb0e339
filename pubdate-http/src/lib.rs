//! HTTP client for fetching article pages, with safe logging and retries.
//!
//! - Browser-like default headers (`accept`, `accept-language`, `cache-control`)
//! - Retries network failures, 429 and 5xx with exponential backoff
//! - When a page fails or comes back non-2xx, one more round is made with a
//!   fallback user agent and a `referer` of the page's origin, since some
//!   hosts vary their response by request headers
//! - Optional *raw* request/response logging via `PUBDATE_HTTP_RAW=1`
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), pubdate_http::HttpError> {
//! let client = pubdate_http::HttpClient::new()?;
//! let page = client
//!     .get_page("https://example.com/news/1", pubdate_http::PageRequest::default())
//!     .await?;
//! println!("{} bytes", page.body.len());
//! # Ok(()) }
//! ```
//!
//! Observability: structured `tracing` events are emitted for request start,
//! response headers, body snippets (truncated), retries, the header fallback
//! and final errors. Cookies and authorization headers are never logged.

use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, HeaderMap, HeaderValue, REFERER, RETRY_AFTER,
    USER_AGENT,
};
use reqwest::{Client, Url};
pub use reqwest::StatusCode;
use std::env;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

// ==============================
// Raw logging toggles
// ==============================

const RAW_ENV: &str = "PUBDATE_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024;
const SNIPPET_LEN: usize = 500;
/// Prefix of an error page kept for metadata scraping.
const ERROR_PAGE_MAX: usize = 256 * 1024;

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

const SENSITIVE_HEADERS: [&str; 4] = ["authorization", "cookie", "set-cookie", "proxy-authorization"];

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

/// Render a best-effort curl command for repro/debug, with secrets redacted.
fn make_curl(url: &Url, headers: &HeaderMap) -> String {
    let mut parts = vec!["curl".to_string(), "-XGET".to_string()];
    for (name, value) in redact_headers(headers) {
        parts.push(format!("-H '{}: {}'", name, value.replace('\'', r"'\''")));
    }
    parts.push(format!("'{}'", url.as_str()));
    parts.join(" ")
}

/// Redact sensitive headers for logging
fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let val = if SENSITIVE_HEADERS
                .iter()
                .any(|s| key.eq_ignore_ascii_case(s))
            {
                "<redacted>".to_string()
            } else {
                v.to_str().unwrap_or("").to_string()
            };
            (key, val)
        })
        .collect()
}

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("server returned {status}")]
    Status {
        status: StatusCode,
        /// Leading part of the error page, bounded to 256 KiB.
        body: String,
    },
}

impl HttpError {
    /// HTTP status for [`HttpError::Status`].
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short excerpt of the error page for logs.
    pub fn body_snippet(&self) -> Option<String> {
        match self {
            HttpError::Status { body, .. } => Some(snip_body(body.as_bytes())),
            _ => None,
        }
    }
}

// ==============================
// Request options & responses
// ==============================

/// Per-request tuning knobs.
///
/// ```
/// use pubdate_http::PageRequest;
/// use std::time::Duration;
///
/// let opts = PageRequest {
///     timeout: Some(Duration::from_secs(5)),
///     ..Default::default()
/// };
/// assert!(opts.retries.is_none());
/// assert!(opts.header_fallback);
/// ```
#[derive(Clone, Debug)]
pub struct PageRequest {
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    /// Retry once with the fallback user agent and a referer on failure.
    pub header_fallback: bool,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            timeout: None,
            retries: None,
            header_fallback: true,
        }
    }
}

/// A successfully fetched page.
#[derive(Clone, Debug)]
pub struct HttpPage {
    pub status: StatusCode,
    /// URL after redirects.
    pub final_url: Url,
    pub body: String,
}

// ==============================
// Client
// ==============================

#[derive(Clone)]
pub struct HttpClient {
    inner: Client,
    pub default_timeout: Duration,
    pub max_retries: usize,
    pub user_agent: Option<String>,
    pub fallback_user_agent: String,
}

impl HttpClient {
    /// Construct a client with a 15 second timeout and one retry.
    ///
    /// ```no_run
    /// use pubdate_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new()?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// assert_eq!(client.max_retries, 1);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new() -> Result<Self, HttpError> {
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            inner,
            default_timeout: Duration::from_secs(15),
            max_retries: 1,
            user_agent: None,
            fallback_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                (KHTML, like Gecko) Chrome/106.0.0.0 Safari/537.36"
                .to_string(),
        })
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_user_agent(mut self, ua: Option<String>) -> Self {
        self.user_agent = ua;
        self
    }

    pub fn with_fallback_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.fallback_user_agent = ua.into();
        self
    }

    /// GET an HTML page. Non-2xx answers are errors; the header fallback
    /// round runs first when enabled.
    pub async fn get_page(&self, url: &str, opts: PageRequest) -> Result<HttpPage, HttpError> {
        let url = Url::parse(url).map_err(|e| HttpError::Url(e.to_string()))?;

        let primary = self.get_with_retries(&url, self.default_headers()?, &opts).await;
        let first_error = match primary {
            Ok(page) if page.status.is_success() => return Ok(page),
            Ok(page) => status_error(page),
            Err(e) => e,
        };
        if !opts.header_fallback {
            return Err(first_error);
        }

        tracing::info!(
            host=%url.host_str().unwrap_or("-"),
            first_error=%first_error,
            "http.fetch.header_fallback"
        );
        let page = self
            .get_with_retries(&url, self.fallback_headers(&url)?, &opts)
            .await?;
        if page.status.is_success() {
            Ok(page)
        } else {
            Err(status_error(page))
        }
    }

    fn default_headers(&self) -> Result<HeaderMap, HttpError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        if let Some(ua) = &self.user_agent {
            headers.insert(USER_AGENT, header_value(ua)?);
        }
        Ok(headers)
    }

    fn fallback_headers(&self, url: &Url) -> Result<HeaderMap, HttpError> {
        let mut headers = self.default_headers()?;
        headers.insert(USER_AGENT, header_value(&self.fallback_user_agent)?);
        let origin = format!("{}/", url.origin().ascii_serialization());
        headers.insert(REFERER, header_value(&origin)?);
        Ok(headers)
    }

    // ==============================
    // Core request implementation
    // ==============================

    /// One round of attempts: network errors, 429 and 5xx are retried;
    /// any other status is returned to the caller as a page.
    async fn get_with_retries(
        &self,
        url: &Url,
        headers: HeaderMap,
        opts: &PageRequest,
    ) -> Result<HttpPage, HttpError> {
        let mut attempt = 0usize;
        let max_retries = opts.retries.unwrap_or(self.max_retries);
        let timeout = opts.timeout.unwrap_or(self.default_timeout);

        loop {
            let rb = self
                .inner
                .get(url.clone())
                .timeout(timeout)
                .headers(headers.clone());

            let req_id = format!(
                "r{:x}",
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos()
            );
            tracing::debug!(
                req_id=%req_id,
                attempt=attempt + 1,
                max_retries,
                host_path=%format!("{}{}", url.host_str().unwrap_or("-"), url.path()),
                timeout_ms=timeout.as_millis() as u64,
                "http.request.start"
            );
            if raw_enabled() {
                let curl = make_curl(url, &headers);
                tracing::debug!(target: "http.raw", %req_id, %curl, "request");
            }

            // ----- Send -----
            let t0 = std::time::Instant::now();
            let sent = match rb.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().clone();
                    let resp_headers = resp.headers().clone();
                    resp.bytes()
                        .await
                        .map(|bytes| (status, final_url, resp_headers, bytes))
                }
                Err(err) => Err(err),
            };
            let (status, final_url, resp_headers, bytes) = match sent {
                Ok(parts) => parts,
                Err(err) => {
                    let error = if err.is_timeout() {
                        HttpError::Timeout(timeout)
                    } else {
                        HttpError::Network(err.to_string())
                    };
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = backoff(attempt);
                        tracing::warn!(
                            req_id=%req_id,
                            attempt,
                            max_retries,
                            backoff_ms=delay.as_millis() as u64,
                            message=%error,
                            "http.retrying.network"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(
                        req_id=%req_id,
                        attempt,
                        max_retries,
                        message=%error,
                        "http.network_error"
                    );
                    return Err(error);
                }
            };
            let dur_ms = t0.elapsed().as_millis() as u64;

            tracing::debug!(
                req_id=%req_id,
                %status,
                duration_ms=dur_ms,
                body_len=bytes.len(),
                content_type=?resp_headers.get(reqwest::header::CONTENT_TYPE),
                "http.response.headers"
            );
            if raw_enabled() {
                let hdrs = redact_headers(&resp_headers);
                let mut body_snip = bytes.clone();
                let truncated = body_snip.len() > RAW_MAX_BODY;
                if truncated {
                    body_snip.truncate(RAW_MAX_BODY);
                }
                let text = String::from_utf8_lossy(&body_snip);
                tracing::info!(
                    target:"http.raw",
                    %req_id,
                    status=%status,
                    duration_ms=dur_ms,
                    headers=?hdrs,
                    body=%text,
                    truncated
                );
            }

            let is_429 = status == StatusCode::TOO_MANY_REQUESTS;
            if (is_429 || status.is_server_error()) && attempt < max_retries {
                attempt += 1;
                let delay = retry_after_delay_secs(&resp_headers)
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| backoff(attempt));
                tracing::warn!(
                    req_id=%req_id,
                    %status,
                    attempt,
                    max_retries,
                    backoff_ms=delay.as_millis() as u64,
                    body_snippet=%snip_body(&bytes),
                    "http.retrying"
                );
                sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                tracing::debug!(
                    req_id=%req_id,
                    %status,
                    body_snippet=%snip_body(&bytes),
                    "http.error"
                );
            }
            return Ok(HttpPage {
                status,
                final_url,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
    }
}

// ==============================
// Helpers
// ==============================

fn backoff(attempt: usize) -> Duration {
    Duration::from_millis(200u64.saturating_mul(1 << (attempt.saturating_sub(1)).min(16)))
}

fn header_value(raw: &str) -> Result<HeaderValue, HttpError> {
    HeaderValue::from_str(raw.trim()).map_err(|e| HttpError::Build(format!("invalid header: {e}")))
}

fn retry_after_delay_secs(h: &HeaderMap) -> Option<u64> {
    h.get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())?
        .parse()
        .ok()
}

fn status_error(page: HttpPage) -> HttpError {
    let mut body = page.body;
    if body.len() > ERROR_PAGE_MAX {
        let mut cut = ERROR_PAGE_MAX;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    HttpError::Status {
        status: page.status,
        body,
    }
}

fn snip_body(body: &[u8]) -> String {
    let mut snip = String::from_utf8_lossy(body).to_string();
    if snip.len() > SNIPPET_LEN {
        let mut cut = SNIPPET_LEN;
        while !snip.is_char_boundary(cut) {
            cut -= 1;
        }
        snip.truncate(cut);
        snip.push_str("...");
    }
    snip
}
