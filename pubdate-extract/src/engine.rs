//! Extraction Engine: runs the strategies in a fixed order over one page.
//!
//! Order per pass: site override, raw HTML scan, URL date (kept only if
//! recent, otherwise held back), structured data, meta tags, selectors,
//! `<time>` elements, generic single-match selectors, and finally the held
//! URL date.

use crate::metadata::article_metadata;
use crate::model::{CandidateDate, DateLocation, ExtractionResult, ValidDate};
use crate::normalize::Normalizer;
use crate::strategies::raw_html::{key_pattern, tidy_pair};
use crate::strategies::{
    GenericSelectorStrategy, LinkedBlock, LinkedDataStrategy, MetaStrategy, PageContext,
    RawHtmlStrategy, SelectorStrategy, Strategy, TimeElementStrategy, UrlStrategy,
};
use pubdate_common::clock::SharedClock;
use pubdate_common::{ArticleMetadata, DateError};
use pubdate_config::{
    normalize_host, OverrideError, OverrideRule, PubdateConfig, SiteData, SiteOverride, Thresholds,
};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashMap;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid selector {selector:?} (site: {host:?})")]
    InvalidSelector {
        host: Option<String>,
        selector: String,
    },
    #[error(transparent)]
    Override(#[from] OverrideError),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// A site override with its selector or key regex compiled up front.
struct CompiledOverride {
    site: SiteOverride,
    selector: Option<Selector>,
    raw_pattern: Option<Regex>,
}

impl CompiledOverride {
    fn compile(host: &str, site: SiteOverride) -> Result<Self, EngineError> {
        let (selector, raw_pattern) = match &site.rule {
            Some(OverrideRule::Selector { selector, .. }) => {
                let parsed =
                    Selector::parse(selector).map_err(|_| EngineError::InvalidSelector {
                        host: Some(host.to_string()),
                        selector: selector.clone(),
                    })?;
                (Some(parsed), None)
            }
            Some(OverrideRule::RawHtml { key }) => (None, Some(key_pattern(&[key.clone()])?)),
            _ => (None, None),
        };
        Ok(Self {
            site,
            selector,
            raw_pattern,
        })
    }
}

struct Hit {
    date: CandidateDate,
    strategy: &'static str,
}

pub struct Engine {
    data: SiteData,
    thresholds: Thresholds,
    overrides: HashMap<String, CompiledOverride>,
    normalizer: Normalizer,
    raw_html: RawHtmlStrategy,
    url: UrlStrategy,
    linked: LinkedDataStrategy,
    /// Meta, selector, time and generic strategies, in that order.
    cascade: Vec<Box<dyn Strategy>>,
}

impl Engine {
    pub fn new(config: &PubdateConfig, clock: SharedClock) -> Result<Self, EngineError> {
        let data = config.data.clone();
        let overrides = data
            .compile_sites()?
            .into_iter()
            .map(|(host, site)| CompiledOverride::compile(&host, site).map(|c| (host, c)))
            .collect::<Result<HashMap<_, _>, _>>()?;

        let generic = GenericSelectorStrategy::new(&data.generic_selectors).map_err(|selector| {
            EngineError::InvalidSelector {
                host: None,
                selector,
            }
        })?;
        let cascade: Vec<Box<dyn Strategy>> = vec![
            Box::new(MetaStrategy::new(&data.meta_attributes)?),
            Box::new(SelectorStrategy::new(&data.selectors)),
            Box::new(TimeElementStrategy),
            Box::new(generic),
        ];

        Ok(Self {
            normalizer: Normalizer::new(config.thresholds, &data.months, clock)?,
            raw_html: RawHtmlStrategy::from_site_data(&data)?,
            url: UrlStrategy::new(&data.url_skip_patterns),
            linked: LinkedDataStrategy::new(&data.json_keys)?,
            thresholds: config.thresholds,
            overrides,
            cascade,
            data,
        })
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn site_data(&self) -> &SiteData {
        &self.data
    }

    /// Override configured for `host` (with or without `www.`).
    pub fn site_override(&self, host: &str) -> Option<&SiteOverride> {
        self.overrides.get(&normalize_host(host)).map(|c| &c.site)
    }

    /// Article metadata only, e.g. for an error page.
    pub fn metadata(&self, html: &str, url: &str) -> ArticleMetadata {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(normalize_host))
            .unwrap_or_default();
        let document = Html::parse_document(html);
        let linked = LinkedBlock::collect(&document);
        article_metadata(&document, &linked, &host)
    }

    /// Extract the publish date (and, when asked, a later modify date) from
    /// `html` served at `url`.
    pub fn extract(
        &self,
        html: &str,
        url: &str,
        check_modified: bool,
    ) -> Result<ExtractionResult, DateError> {
        let parsed =
            Url::parse(url).map_err(|e| DateError::validation(url, format!("Invalid URL: {e}")))?;
        let host = normalize_host(parsed.host_str().unwrap_or_default());
        let document = Html::parse_document(html);
        let linked = LinkedBlock::collect(&document);
        let metadata = article_metadata(&document, &linked, &host);
        let site = self.overrides.get(&host);

        let mut page = PageContext {
            html,
            document: &document,
            url: &parsed,
            host: &host,
            order: self.data.date_order_for_host(&host),
            check_modified: false,
            linked_data: &linked,
        };

        let Some(publish) = self.run_pass(&page, site) else {
            tracing::debug!(url=%url, host=%host, "engine.not_found");
            return Err(DateError::not_found(url, metadata));
        };
        tracing::debug!(
            url=%url,
            strategy=publish.strategy,
            location=%publish.date.source_location(),
            date=%publish.date.value(),
            "engine.strategy.hit"
        );

        let modify_date = if check_modified {
            page.check_modified = true;
            self.run_pass(&page, site)
                .map(|hit| hit.date)
                .filter(|d| d.value() > publish.date.value())
        } else {
            None
        };

        let fragment = publish.date.raw_fragment();
        let debug_html = if publish.date.source_location() == DateLocation::HtmlString
            && !publish.date.has_structured_origin()
        {
            tidy_pair(fragment)
        } else {
            fragment.to_string()
        };

        Ok(ExtractionResult {
            location: Some(publish.date.source_location()),
            debug_html: Some(debug_html),
            strategy: Some(publish.strategy),
            modify_date,
            organization: metadata.organization,
            title: metadata.title,
            description: metadata.description,
            publish_date: Some(publish.date),
        })
    }

    fn run_pass(&self, page: &PageContext<'_>, site: Option<&CompiledOverride>) -> Option<Hit> {
        let dates = &self.normalizer;

        if let Some(site) = site.filter(|s| s.site.applies(page.url.path(), page.check_modified)) {
            let found = self.run_override(site, page);
            if found.is_some() || site.site.stop_if_not_found {
                return found.map(|date| Hit {
                    date,
                    strategy: "override",
                });
            }
        }

        // Html-only hosts embed unrelated JSON and misleading URL dates.
        let html_only = self.data.is_html_only(page.host);
        if !html_only {
            if let Some(date) = self.raw_html.find(page, dates) {
                return Some(Hit {
                    date,
                    strategy: self.raw_html.name(),
                });
            }
        }

        let mut held = None;
        if !html_only && self.url.applies(page) {
            if let Some(date) = self.url.find(page, dates) {
                let days = self.thresholds.recent_url_days;
                if dates.is_recent(ValidDate::new(date.value()), days) {
                    return Some(Hit {
                        date,
                        strategy: self.url.name(),
                    });
                }
                held = Some(date);
            }
        }

        let ordered = std::iter::once(&self.linked as &dyn Strategy)
            .chain(self.cascade.iter().map(|s| s.as_ref()));
        for strategy in ordered {
            if !strategy.applies(page) {
                continue;
            }
            if let Some(date) = strategy.find(page, dates) {
                return Some(Hit {
                    date,
                    strategy: strategy.name(),
                });
            }
        }

        held.map(|date| Hit {
            date,
            strategy: self.url.name(),
        })
    }

    fn run_override(&self, site: &CompiledOverride, page: &PageContext<'_>) -> Option<CandidateDate> {
        let dates = &self.normalizer;
        match site.site.rule.as_ref()? {
            OverrideRule::Selector { attribute, .. } => {
                let selector = site.selector.as_ref()?;
                SelectorStrategy::find_in(page, dates, selector, attribute.as_deref())
            }
            OverrideRule::RawHtml { .. } => {
                let pattern = site.raw_pattern.as_ref()?;
                RawHtmlStrategy::scan(pattern, page.html, page.order, dates)
            }
            OverrideRule::LinkedData { path } => {
                self.linked.find_with_path(page, dates, path.as_deref())
            }
        }
    }
}
