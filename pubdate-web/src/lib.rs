//! Page acquisition: turn an article URL into HTML.
//!
//! - URL validation before any network call (`validate`)
//! - Fetch and render sources behind async traits (`source`)
//! - The fetch-vs-render race with per-host method memoization (`acquire`)

pub mod acquire;
pub mod source;
pub mod validate;

pub use acquire::{AcquireRequest, AcquireSettings, AcquiredPage, PageAcquirer};
pub use source::{ClusterRenderer, HttpFetcher, PageFetcher, PageRenderer};
pub use validate::validate_url;

use pubdate_drivers::DriverError;
use pubdate_http::HttpError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Render(#[from] DriverError),
    /// The browser loaded the page and the site answered 404.
    #[error("page not found")]
    NotFound { html: String },
    #[error("rendering is disabled")]
    RenderUnavailable,
    #[error("page acquisition timed out after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
    #[error("acquisition task failed: {0}")]
    Task(String),
}

impl AcquireError {
    /// HTML the site served alongside the failure, if any.
    pub fn error_page(&self) -> Option<&str> {
        match self {
            AcquireError::NotFound { html } => Some(html),
            AcquireError::Http(HttpError::Status { body, .. }) => Some(body),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AcquireError::NotFound { .. })
    }
}
