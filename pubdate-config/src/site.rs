//! Site tables: keyword lists, TLD preferences, domain lists and per-host
//! overrides.
//!
//! Every list has a built-in default so an empty configuration file still
//! yields a working extractor. A YAML file replaces whole lists; it never
//! appends to them.

use pubdate_common::FetchMethod;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;

/// Ordering of ambiguous numeric date parts, e.g. `03-04-2021`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateOrder {
    #[default]
    Mdy,
    Dmy,
    Ymd,
}

/// Publish and modify variants of the same keyword list.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct KeySet {
    pub publish: Vec<String>,
    pub modify: Vec<String>,
}

impl KeySet {
    pub fn for_pass(&self, check_modified: bool) -> &[String] {
        if check_modified {
            &self.modify
        } else {
            &self.publish
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteData {
    /// JSON keys searched in raw HTML and linked data.
    pub json_keys: KeySet,
    /// `<meta>` name/property values that carry dates.
    pub meta_attributes: KeySet,
    /// Attribute, class and id prefixes that mark date elements.
    pub selectors: KeySet,
    /// Broad selectors trusted only when they match exactly once.
    pub generic_selectors: Vec<String>,
    pub months: Vec<String>,
    pub tlds: HashMap<String, DateOrder>,
    /// Hosts whose embedded JSON and URLs are unreliable.
    pub html_only_domains: Vec<String>,
    /// URL substrings for which the URL date is never trusted.
    pub url_skip_patterns: Vec<String>,
    /// Hosts rejected before any network call.
    pub ignore_domains: Vec<String>,
    pub sites: HashMap<String, SiteOverrideSpec>,
}

impl Default for SiteData {
    fn default() -> Self {
        Self {
            json_keys: KeySet {
                publish: strings(&[
                    "datePublished",
                    "dateCreated",
                    "publishDate",
                    "publishedDate",
                    "published_at",
                    "publishedAt",
                    "publish_date",
                    "pubDate",
                    "datePosted",
                    "uploadDate",
                    "firstPublishDate",
                    "displayDate",
                    "created_at",
                ]),
                modify: strings(&[
                    "dateModified",
                    "modifiedDate",
                    "modified_at",
                    "modifiedAt",
                    "dateUpdated",
                    "updatedAt",
                    "updated_at",
                    "lastModified",
                    "last_modified",
                    "updateDate",
                ]),
            },
            meta_attributes: KeySet {
                publish: strings(&[
                    "article:published_time",
                    "article:published",
                    "og:published_time",
                    "og:article:published_time",
                    "datePublished",
                    "dateCreated",
                    "pubdate",
                    "publishdate",
                    "publish-date",
                    "publish_date",
                    "published_time",
                    "published-date",
                    "parsely-pub-date",
                    "sailthru.date",
                    "dc.date",
                    "dc.date.issued",
                    "dcterms.created",
                    "dcterms.date",
                    "date",
                    "displaydate",
                    "original-publish-date",
                    "release_date",
                ]),
                modify: strings(&[
                    "article:modified_time",
                    "article:modified",
                    "og:updated_time",
                    "og:modified_time",
                    "dateModified",
                    "modified_time",
                    "last-modified",
                    "lastmod",
                    "revised",
                    "dc.date.modified",
                    "dcterms.modified",
                    "parsely-updated-date",
                ]),
            },
            selectors: KeySet {
                publish: strings(&[
                    "datePublished",
                    "dateCreated",
                    "published",
                    "pubdate",
                    "publish-date",
                    "publish_date",
                    "publishdate",
                    "date-published",
                    "post-date",
                    "post_date",
                    "postdate",
                    "posted-on",
                    "entry-date",
                    "article-date",
                    "article__date",
                    "story-date",
                    "byline-date",
                    "meta-date",
                    "dateline",
                    "timestamp",
                ]),
                modify: strings(&[
                    "dateModified",
                    "date-modified",
                    "modified",
                    "updated",
                    "last-updated",
                    "lastupdated",
                    "update-date",
                    "article-updated",
                ]),
            },
            generic_selectors: strings(&[
                ".date",
                "#date",
                ".byline",
                ".data",
                ".datetime",
                ".submitted",
            ]),
            months: strings(&[
                "january",
                "february",
                "march",
                "april",
                "may",
                "june",
                "july",
                "august",
                "september",
                "october",
                "november",
                "december",
                "jan",
                "feb",
                "mar",
                "apr",
                "jun",
                "jul",
                "aug",
                "sept",
                "sep",
                "oct",
                "nov",
                "dec",
            ]),
            tlds: default_tlds(),
            html_only_domains: strings(&["msn.com"]),
            url_skip_patterns: strings(&["cnn.com/videos"]),
            ignore_domains: strings(&[
                "reddit.com",
                "redd.it",
                "imgur.com",
                "twitter.com",
                "x.com",
                "facebook.com",
                "instagram.com",
            ]),
            sites: HashMap::new(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_tlds() -> HashMap<String, DateOrder> {
    let dmy = [
        "uk", "au", "nz", "ie", "in", "za", "de", "fr", "es", "it", "nl", "be", "br", "pt", "ru",
        "pl",
    ];
    let ymd = ["jp", "cn", "kr", "tw", "hu", "se", "lt"];
    dmy.iter()
        .map(|t| (t.to_string(), DateOrder::Dmy))
        .chain(ymd.iter().map(|t| (t.to_string(), DateOrder::Ymd)))
        .collect()
}

/// Which strategy a site override runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum OverrideMethod {
    #[default]
    #[serde(rename = "selector")]
    Selector,
    #[serde(rename = "html")]
    Html,
    #[serde(rename = "linkedData", alias = "linked_data")]
    LinkedData,
}

/// Raw override as written in configuration: a bare selector or an object.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SiteOverrideSpec {
    Selector(String),
    Detailed(SiteOverrideFields),
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SiteOverrideFields {
    pub method: OverrideMethod,
    pub key: Option<String>,
    /// Attribute to read from the selected element, or `innerText`.
    pub attribute: Option<String>,
    /// Case-insensitive regex over the URL path.
    pub path: Option<String>,
    pub fetch: Option<FetchMethod>,
    pub stop_if_not_found: bool,
    pub apply_to_modified: bool,
}

/// Compiled override strategy; each variant carries only what it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideRule {
    Selector {
        selector: String,
        attribute: Option<String>,
    },
    RawHtml {
        key: String,
    },
    LinkedData {
        path: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct SiteOverride {
    /// `None` when the entry only pins a fetch method.
    pub rule: Option<OverrideRule>,
    pub path: Option<Regex>,
    pub fetch: Option<FetchMethod>,
    pub stop_if_not_found: bool,
    pub apply_to_modified: bool,
}

impl SiteOverride {
    /// Whether the rule should run for this URL path and pass.
    pub fn applies(&self, url_path: &str, check_modified: bool) -> bool {
        if self.rule.is_none() || (check_modified && !self.apply_to_modified) {
            return false;
        }
        self.path.as_ref().is_none_or(|re| re.is_match(url_path))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OverrideError {
    #[error("site override for {host}: invalid path pattern: {source}")]
    Path {
        host: String,
        #[source]
        source: regex::Error,
    },
    #[error("site override for {host}: method {method:?} requires a key")]
    MissingKey { host: String, method: OverrideMethod },
}

impl SiteOverrideSpec {
    pub fn compile(&self, host: &str) -> Result<SiteOverride, OverrideError> {
        let fields = match self {
            SiteOverrideSpec::Selector(selector) => {
                return Ok(SiteOverride {
                    rule: Some(OverrideRule::Selector {
                        selector: selector.clone(),
                        attribute: None,
                    }),
                    path: None,
                    fetch: None,
                    stop_if_not_found: true,
                    apply_to_modified: false,
                });
            }
            SiteOverrideSpec::Detailed(fields) => fields,
        };

        let key = fields.key.clone().filter(|k| !k.trim().is_empty());
        let rule = match (fields.method, key) {
            (OverrideMethod::LinkedData, path) => Some(OverrideRule::LinkedData { path }),
            (OverrideMethod::Selector, Some(selector)) => Some(OverrideRule::Selector {
                selector,
                attribute: fields.attribute.clone(),
            }),
            (OverrideMethod::Html, Some(key)) => Some(OverrideRule::RawHtml { key }),
            (method, None) if fields.fetch.is_none() => {
                return Err(OverrideError::MissingKey {
                    host: host.to_string(),
                    method,
                });
            }
            (_, None) => None,
        };

        let path = fields
            .path
            .as_deref()
            .map(|p| Regex::new(&format!("(?i){p}")))
            .transpose()
            .map_err(|source| OverrideError::Path {
                host: host.to_string(),
                source,
            })?;

        Ok(SiteOverride {
            rule,
            path,
            fetch: fields.fetch,
            stop_if_not_found: fields.stop_if_not_found,
            apply_to_modified: fields.apply_to_modified,
        })
    }
}

impl SiteData {
    /// Compile every site override, keyed by host without a `www.` prefix.
    pub fn compile_sites(&self) -> Result<HashMap<String, SiteOverride>, OverrideError> {
        self.sites
            .iter()
            .map(|(host, spec)| {
                let host = normalize_host(host);
                spec.compile(&host).map(|o| (host, o))
            })
            .collect()
    }

    pub fn date_order_for_host(&self, host: &str) -> DateOrder {
        host.rsplit('.')
            .next()
            .and_then(|tld| self.tlds.get(&tld.to_ascii_lowercase()))
            .copied()
            .unwrap_or_default()
    }

    pub fn is_html_only(&self, host: &str) -> bool {
        self.html_only_domains.iter().any(|d| host.contains(d.as_str()))
    }

    pub fn is_ignored(&self, host: &str) -> bool {
        let host = normalize_host(host);
        self.ignore_domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    }

    pub fn skips_url_date(&self, url: &str) -> bool {
        self.url_skip_patterns.iter().any(|p| url.contains(p.as_str()))
    }
}

/// Lowercase and strip a leading `www.`.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}
