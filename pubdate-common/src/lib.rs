//! Common types and utilities shared across pubdate crates.
//!
//! This crate defines the caller-facing request options, the closed error
//! taxonomy, the bounded result cache, the injectable clock and the logging
//! initialiser used throughout the workspace. It is intentionally lightweight
//! so that every crate can depend on it without heavy transitive costs.
//!
//! # Overview
//!
//! - [`ExtractOptions`]: per-request knobs accepted by `extract`
//! - [`FetchMethod`]: direct HTTP fetch vs headless render
//! - [`DateError`] and [`ErrorKind`]: error taxonomy and retry eligibility
//! - [`ArticleMetadata`]: best-effort organization/title/description
//! - [`cache`]: bounded key/value store with half-purge eviction
//! - [`clock`]: wall-clock abstraction so date heuristics are testable
//! - [`observability`]: centralised tracing/logging initialisation
//!
//! # Examples
//!
//! ```rust
//! use pubdate_common::{DateError, ErrorKind, ExtractOptions};
//!
//! let opts = ExtractOptions::default();
//! assert!(!opts.check_modified);
//! assert_eq!(opts.timeout_ms, 15_000);
//!
//! let err = DateError::not_found("https://example.com/a", Default::default());
//! assert_eq!(err.kind(), ErrorKind::NotFound);
//! assert!(!err.kind().is_retryable());
//! ```
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod cache;
pub mod clock;
pub mod observability;

/// Longest human-readable error message handed to callers.
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// How article HTML is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMethod {
    /// Plain HTTP GET.
    Fetch,
    /// Headless browser navigation.
    Render,
}

impl fmt::Display for FetchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchMethod::Fetch => f.write_str("fetch"),
            FetchMethod::Render => f.write_str("render"),
        }
    }
}

impl std::str::FromStr for FetchMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fetch" => Ok(FetchMethod::Fetch),
            "render" | "browser" | "puppeteer" => Ok(FetchMethod::Render),
            other => Err(format!("unknown fetch method: {other}")),
        }
    }
}

/// Options accepted by the single `extract(url, options)` operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Also look for a modification date.
    pub check_modified: bool,
    /// Neither read nor write the result and fetch-method caches.
    pub disable_cache: bool,
    /// Force one acquisition method instead of racing both.
    pub fetch_method: Option<FetchMethod>,
    /// Caller-side deadline for the whole request.
    pub timeout_ms: u64,
    /// Higher values are dequeued first.
    pub priority: Option<i32>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            check_modified: false,
            disable_cache: false,
            fetch_method: None,
            timeout_ms: 15_000,
            priority: None,
        }
    }
}

impl ExtractOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Best-effort article description returned with results and errors alike.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleMetadata {
    pub organization: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl ArticleMetadata {
    pub fn is_empty(&self) -> bool {
        self.organization.is_none() && self.title.is_none() && self.description.is_none()
    }
}

/// Coarse error class; the job queue decides retries from this alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Validation,
    Fetch,
    NotFound,
    Internal,
}

impl ErrorKind {
    /// A correctly executed negative result or a rejected input can never
    /// change on retry.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Fetch | ErrorKind::Internal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Fetch => "fetch",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Errors surfaced to callers of `extract`. Every variant echoes the URL.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "errorType", rename_all = "kebab-case")]
pub enum DateError {
    /// Malformed or unsupported URL; detected before any network call.
    #[error("{message} ({url})")]
    Validation { url: String, message: String },

    /// The page could not be retrieved.
    #[error("{message} ({url})")]
    Fetch {
        url: String,
        message: String,
        metadata: ArticleMetadata,
    },

    /// The page was parsed but no plausible date was found.
    #[error("No date found ({url})")]
    NotFound { url: String, metadata: ArticleMetadata },

    /// Anything else.
    #[error("{message} ({url})")]
    Internal { url: String, message: String },
}

impl DateError {
    pub fn validation(url: impl Into<String>, message: impl AsRef<str>) -> Self {
        DateError::Validation {
            url: url.into(),
            message: truncate_message(message.as_ref()),
        }
    }

    pub fn fetch(url: impl Into<String>, message: impl AsRef<str>) -> Self {
        DateError::Fetch {
            url: url.into(),
            message: truncate_message(message.as_ref()),
            metadata: ArticleMetadata::default(),
        }
    }

    pub fn fetch_with_metadata(
        url: impl Into<String>,
        message: impl AsRef<str>,
        metadata: ArticleMetadata,
    ) -> Self {
        DateError::Fetch {
            url: url.into(),
            message: truncate_message(message.as_ref()),
            metadata,
        }
    }

    pub fn not_found(url: impl Into<String>, metadata: ArticleMetadata) -> Self {
        DateError::NotFound {
            url: url.into(),
            metadata,
        }
    }

    pub fn internal(url: impl Into<String>, message: impl AsRef<str>) -> Self {
        DateError::Internal {
            url: url.into(),
            message: truncate_message(message.as_ref()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DateError::Validation { .. } => ErrorKind::Validation,
            DateError::Fetch { .. } => ErrorKind::Fetch,
            DateError::NotFound { .. } => ErrorKind::NotFound,
            DateError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            DateError::Validation { url, .. }
            | DateError::Fetch { url, .. }
            | DateError::NotFound { url, .. }
            | DateError::Internal { url, .. } => url,
        }
    }

    pub fn metadata(&self) -> Option<&ArticleMetadata> {
        match self {
            DateError::Fetch { metadata, .. } | DateError::NotFound { metadata, .. } => {
                Some(metadata)
            }
            _ => None,
        }
    }
}

/// Bound a message to [`MAX_ERROR_MESSAGE_LEN`] characters, trimming whitespace.
pub fn truncate_message(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return "API error".to_string();
    }
    trimmed.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
}

/// Convenient alias for results that use [`DateError`].
pub type Result<T> = std::result::Result<T, DateError>;
