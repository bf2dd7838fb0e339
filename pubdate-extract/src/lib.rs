//! Publication date extraction from article HTML.
//!
//! [`Engine`] runs an ordered chain of [`strategies`] over a page and hands
//! every raw value to the [`Normalizer`], which alone decides whether it is
//! a plausible date.
//!
//! ```
//! use std::sync::Arc;
//! use pubdate_common::clock::FixedClock;
//! use pubdate_config::PubdateConfig;
//! use pubdate_extract::{DateLocation, Engine};
//!
//! let engine = Engine::new(&PubdateConfig::default(), Arc::new(FixedClock::on(2024, 6, 15))).unwrap();
//! let html = r#"<meta property="article:published_time" content="2021-03-04T10:00:00Z">"#;
//! let result = engine.extract(html, "https://example.com/a", false).unwrap();
//! assert_eq!(result.location, Some(DateLocation::Meta));
//! ```

pub mod engine;
pub mod html;
pub mod metadata;
pub mod model;
pub mod normalize;
pub mod parts;
pub mod strategies;

pub use engine::{Engine, EngineError};
pub use model::{CandidateDate, DateLocation, ExtractionResult, ValidDate};
pub use normalize::Normalizer;
