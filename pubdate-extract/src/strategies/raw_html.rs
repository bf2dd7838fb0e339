use super::{format_date_json, PageContext, Strategy};
use crate::model::{CandidateDate, DateLocation};
use crate::normalize::Normalizer;
use pubdate_config::{DateOrder, KeySet, SiteData};
use regex::Regex;
use std::sync::LazyLock;

static PAIR_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:["'] ?: ?["'])([ :.a-zA-Z0-9_-]*)(?:["'])"#).expect("static regex")
});
static PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']?([^"':{]+)["']? ?: ?["']([^"']+)["']"#).expect("static regex"));

/// Regex over a JSON-ish `"key": "value"` pair for any of `keys`.
pub fn key_pattern(keys: &[String]) -> Result<Regex, regex::Error> {
    let alternatives = keys
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(
        r#"(?i)(?:'|"|\b)(?:{alternatives})(?:'|")?: ?(?:'|")([a-zA-Z0-9_.\-:+, /]*)(?:'|")"#
    ))
}

/// Scans the unparsed HTML for JSON-style date pairs. Fast and usually
/// right, but blind to which article a pair belongs to.
pub struct RawHtmlStrategy {
    publish: Regex,
    modify: Regex,
}

impl RawHtmlStrategy {
    pub fn new(json_keys: &KeySet) -> Result<Self, regex::Error> {
        Ok(Self {
            publish: key_pattern(&json_keys.publish)?,
            modify: key_pattern(&json_keys.modify)?,
        })
    }

    pub fn from_site_data(data: &SiteData) -> Result<Self, regex::Error> {
        Self::new(&data.json_keys)
    }

    /// Run `pattern` over `text`. A match whose key mentions "publish" is
    /// preferred over the first one.
    pub fn scan(
        pattern: &Regex,
        text: &str,
        order: DateOrder,
        dates: &Normalizer,
    ) -> Option<CandidateDate> {
        let matches: Vec<&str> = pattern.find_iter(text).map(|m| m.as_str()).collect();
        let first = *matches.first()?;
        let chosen = matches
            .iter()
            .copied()
            .find(|m| m.to_ascii_lowercase().contains("publish"))
            .unwrap_or(first);

        if let Some(value) = PAIR_VALUE.captures(chosen).map(|c| c.get(1).map_or("", |m| m.as_str()))
        {
            if let Some(date) = dates.parse(value, order) {
                return Some(CandidateDate::new(date, DateLocation::HtmlString, tidy_pair(chosen)));
            }
        }

        let caps = pattern.captures(text)?;
        let value = caps.get(1)?.as_str();
        let date = dates.parse(value, order)?;
        Some(CandidateDate::new(date, DateLocation::HtmlString, value))
    }
}

/// `"datePublished":"2021-03-04"` -> `{ "datePublished": "2021-03-04" }`.
pub fn tidy_pair(fragment: &str) -> String {
    match PAIR.captures(fragment) {
        Some(c) => format_date_json(&c[1], &c[2]),
        None => fragment.trim().to_string(),
    }
}

impl Strategy for RawHtmlStrategy {
    fn name(&self) -> &'static str {
        "raw-html"
    }

    fn find(&self, page: &PageContext<'_>, dates: &Normalizer) -> Option<CandidateDate> {
        let pattern = if page.check_modified {
            &self.modify
        } else {
            &self.publish
        };
        Self::scan(pattern, page.html, page.order, dates)
    }
}
