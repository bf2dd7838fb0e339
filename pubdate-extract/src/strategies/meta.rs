use super::{PageContext, Strategy};
use crate::html::meta_fragment;
use crate::model::{CandidateDate, DateLocation};
use crate::normalize::Normalizer;
use pubdate_config::KeySet;
use regex::Regex;
use scraper::Selector;
use std::sync::LazyLock;

static META: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta").expect("static selector"));

const NAME_ATTRIBUTES: [&str; 4] = ["name", "property", "itemprop", "http-equiv"];

fn name_union(names: &[String]) -> Result<Regex, regex::Error> {
    let joined = names
        .iter()
        .map(|n| regex::escape(n.trim()))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i)^(?:{joined})$"))
}

/// `<meta>` tags whose name-like attribute is a known date name.
pub struct MetaStrategy {
    publish: Regex,
    modify: Regex,
}

impl MetaStrategy {
    pub fn new(attributes: &KeySet) -> Result<Self, regex::Error> {
        Ok(Self {
            publish: name_union(&attributes.publish)?,
            modify: name_union(&attributes.modify)?,
        })
    }
}

impl Strategy for MetaStrategy {
    fn name(&self) -> &'static str {
        "meta"
    }

    fn find(&self, page: &PageContext<'_>, dates: &Normalizer) -> Option<CandidateDate> {
        let names = if page.check_modified {
            &self.modify
        } else {
            &self.publish
        };

        for meta in page.document.select(&META) {
            let el = meta.value();
            let Some(content) = el.attr("content") else {
                continue;
            };
            for attr in NAME_ATTRIBUTES {
                let Some(value) = el.attr(attr) else {
                    continue;
                };
                if !names.is_match(value.trim()) {
                    continue;
                }
                if let Some(date) = dates.parse(content, page.order) {
                    return Some(CandidateDate::new(
                        date,
                        DateLocation::Meta,
                        meta_fragment(attr, value, content),
                    ));
                }
            }
        }
        None
    }
}
