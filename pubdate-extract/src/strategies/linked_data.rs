use super::raw_html::{key_pattern, RawHtmlStrategy};
use super::{format_date_json, LinkedBlock, PageContext, Strategy};
use crate::model::{CandidateDate, DateLocation};
use crate::normalize::Normalizer;
use pubdate_config::KeySet;
use regex::Regex;
use serde_json::Value;

/// Resolve a dotted path with numeric indices: `@graph.0.datePublished`,
/// `itemListElement[1].item.datePublished`.
pub fn json_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let mut cur = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let (name, indices) = match segment.find('[') {
            Some(i) => segment.split_at(i),
            None => (segment, ""),
        };
        if !name.is_empty() {
            cur = match (cur, name.parse::<usize>()) {
                (Value::Array(items), Ok(i)) => items.get(i)?,
                _ => cur.get(name)?,
            };
        }
        for idx in indices
            .split(['[', ']'])
            .filter(|s| !s.is_empty())
        {
            cur = cur.get(idx.parse::<usize>().ok()?)?;
        }
    }
    Some(cur)
}

/// The object itself plus anything under its `@graph`.
fn graph_nodes(value: &Value) -> Vec<&Value> {
    let mut nodes = vec![value];
    if let Some(Value::Array(items)) = value.get("@graph") {
        nodes.extend(items.iter());
    }
    nodes
}

/// `application/ld+json` and `application/json` script blocks.
pub struct LinkedDataStrategy {
    keys: KeySet,
    publish_pattern: Regex,
    modify_pattern: Regex,
}

impl LinkedDataStrategy {
    pub fn new(json_keys: &KeySet) -> Result<Self, regex::Error> {
        Ok(Self {
            keys: json_keys.clone(),
            publish_pattern: key_pattern(&json_keys.publish)?,
            modify_pattern: key_pattern(&json_keys.modify)?,
        })
    }

    /// Search the blocks, trying `path` first in each block when given.
    pub fn find_with_path(
        &self,
        page: &PageContext<'_>,
        dates: &Normalizer,
        path: Option<&str>,
    ) -> Option<CandidateDate> {
        let keys = self.keys.for_pass(page.check_modified);
        let pattern = if page.check_modified {
            &self.modify_pattern
        } else {
            &self.publish_pattern
        };

        for block in page.linked_data {
            match block {
                LinkedBlock::Json(value) => {
                    if let Some(path) = path {
                        if let Some(Value::String(s)) = json_path(value, path) {
                            if let Some(date) = dates.parse(s, page.order) {
                                return Some(CandidateDate::structured(
                                    date,
                                    DateLocation::StructuredData,
                                    format_date_json(path, s),
                                ));
                            }
                        }
                    }
                    for node in graph_nodes(value) {
                        for key in keys {
                            let Some(Value::String(s)) = node.get(key) else {
                                continue;
                            };
                            if let Some(date) = dates.parse(s, page.order) {
                                return Some(CandidateDate::structured(
                                    date,
                                    DateLocation::StructuredData,
                                    format_date_json(key, s),
                                ));
                            }
                        }
                    }
                }
                LinkedBlock::Raw(text) => {
                    if let Some(found) = RawHtmlStrategy::scan(pattern, text, page.order, dates) {
                        let fragment = found.raw_fragment().to_string();
                        return Some(CandidateDate::new(
                            crate::model::ValidDate::new(found.value()),
                            DateLocation::JsonString,
                            fragment,
                        ));
                    }
                }
            }
        }
        None
    }
}

impl Strategy for LinkedDataStrategy {
    fn name(&self) -> &'static str {
        "linked-data"
    }

    fn find(&self, page: &PageContext<'_>, dates: &Normalizer) -> Option<CandidateDate> {
        self.find_with_path(page, dates, None)
    }
}
