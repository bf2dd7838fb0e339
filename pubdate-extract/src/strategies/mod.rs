//! Extraction strategies. Each one scans a single signal source and returns
//! at most one candidate; ordering and early exits belong to the engine.

use crate::model::CandidateDate;
use crate::normalize::Normalizer;
use pubdate_config::DateOrder;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;
use url::Url;

pub mod generic;
pub mod linked_data;
pub mod meta;
pub mod raw_html;
pub mod selector;
pub mod time;
pub mod url_path;

pub use generic::GenericSelectorStrategy;
pub use linked_data::LinkedDataStrategy;
pub use meta::MetaStrategy;
pub use raw_html::RawHtmlStrategy;
pub use selector::SelectorStrategy;
pub use time::TimeElementStrategy;
pub use url_path::UrlStrategy;

static LINKED_DATA_SCRIPTS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"], script[type="application/json"]"#)
        .expect("static selector")
});

/// One `<script>` block of structured data.
#[derive(Debug, Clone)]
pub enum LinkedBlock {
    Json(Value),
    /// Text that failed to parse as JSON.
    Raw(String),
}

impl LinkedBlock {
    /// Parse every structured-data block; top-level arrays are flattened.
    pub fn collect(document: &Html) -> Vec<LinkedBlock> {
        let mut blocks = Vec::new();
        for script in document.select(&LINKED_DATA_SCRIPTS) {
            let text: String = script.text().collect();
            match serde_json::from_str::<Value>(text.trim()) {
                Ok(Value::Array(items)) => blocks.extend(items.into_iter().map(LinkedBlock::Json)),
                Ok(v) => blocks.push(LinkedBlock::Json(v)),
                Err(_) => blocks.push(LinkedBlock::Raw(text)),
            }
        }
        blocks
    }
}

/// Everything a strategy may look at for one page and one pass.
pub struct PageContext<'a> {
    pub html: &'a str,
    pub document: &'a Html,
    pub url: &'a Url,
    /// Host without `www.`.
    pub host: &'a str,
    pub order: DateOrder,
    pub check_modified: bool,
    pub linked_data: &'a [LinkedBlock],
}

pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy runs at all for the page and pass.
    fn applies(&self, _page: &PageContext<'_>) -> bool {
        true
    }

    fn find(&self, page: &PageContext<'_>, dates: &Normalizer) -> Option<CandidateDate>;
}

/// `{ "key": "value" }` as shown to callers for JSON-derived fragments.
pub fn format_date_json(key: &str, value: &str) -> String {
    let key = key.trim().trim_matches(|c| c == '"' || c == '\'');
    let value = value.trim();
    if value.is_empty() {
        format!("{{ {key} }}")
    } else {
        format!(r#"{{ "{key}": "{value}" }}"#)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use pubdate_common::clock::FixedClock;
    use pubdate_config::{SiteData, Thresholds};
    use std::sync::Arc;

    pub fn normalizer() -> Normalizer {
        Normalizer::new(
            Thresholds::default(),
            &SiteData::default().months,
            Arc::new(FixedClock::on(2024, 6, 15)),
        )
        .unwrap()
    }

    /// Owns what a [`PageContext`] borrows.
    pub struct Fixture {
        pub html: String,
        pub document: Html,
        pub url: Url,
        pub host: String,
        pub linked: Vec<LinkedBlock>,
    }

    impl Fixture {
        pub fn new(url: &str, html: &str) -> Self {
            let document = Html::parse_document(html);
            let url = Url::parse(url).unwrap();
            let host = pubdate_config::normalize_host(url.host_str().unwrap_or_default());
            let linked = LinkedBlock::collect(&document);
            Self {
                html: html.to_string(),
                document,
                url,
                host,
                linked,
            }
        }

        pub fn page(&self, check_modified: bool) -> PageContext<'_> {
            PageContext {
                html: &self.html,
                document: &self.document,
                url: &self.url,
                host: &self.host,
                order: DateOrder::Mdy,
                check_modified,
                linked_data: &self.linked,
            }
        }
    }
}
