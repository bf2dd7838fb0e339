//! Best-effort article metadata, collected whether or not a date is found.

use crate::html::inner_text;
use crate::strategies::LinkedBlock;
use pubdate_common::ArticleMetadata;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;

static META: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta[content]").expect("static selector"));
static HEADLINE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article h1").expect("static selector"));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("static selector"));
static SITE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" ?[-|][^-|]+$").expect("static regex"));

const ORGANIZATION_TYPES: [&str; 3] = ["Organization", "NewsMediaOrganization", "WebSite"];

/// Organization, title and description from structured data, then `<meta>`
/// tags, then the document itself. `host` is the last resort organization.
pub fn article_metadata(document: &Html, linked: &[LinkedBlock], host: &str) -> ArticleMetadata {
    let mut meta = from_linked_data(linked);

    if meta.organization.is_none() {
        meta.organization = meta_content(document, &["og:site_name", "application-name"])
            .or_else(|| (!host.is_empty()).then(|| host.to_string()));
    }
    if meta.title.is_none() {
        meta.title = meta_content(document, &["og:title", "twitter:title"])
            .or_else(|| first_text(document, &HEADLINE))
            .or_else(|| {
                first_text(document, &TITLE).map(|t| SITE_SUFFIX.replace(&t, "").trim().to_string())
            })
            .filter(|t| !t.is_empty());
    }
    if meta.description.is_none() {
        meta.description =
            meta_content(document, &["og:description", "twitter:description", "description"]);
    }

    if let (Some(org), Some(title)) = (meta.organization.as_deref(), meta.title.as_deref()) {
        let stripped = strip_organization(title, org);
        meta.title = Some(stripped);
    }
    meta
}

fn from_linked_data(linked: &[LinkedBlock]) -> ArticleMetadata {
    let mut meta = ArticleMetadata::default();
    let nodes = linked.iter().filter_map(|b| match b {
        LinkedBlock::Json(v) => Some(v),
        LinkedBlock::Raw(_) => None,
    });
    for value in nodes {
        let graph = value.get("@graph").and_then(Value::as_array);
        for node in std::iter::once(value).chain(graph.into_iter().flatten()) {
            if meta.organization.is_none() {
                meta.organization = publisher_name(node).or_else(|| {
                    is_organization(node)
                        .then(|| string_field(node, "name"))
                        .flatten()
                });
            }
            if meta.title.is_none() {
                meta.title = string_field(node, "headline");
            }
            if meta.description.is_none() && !is_organization(node) {
                meta.description = string_field(node, "description");
            }
        }
    }
    meta
}

fn string_field(node: &Value, key: &str) -> Option<String> {
    node.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn publisher_name(node: &Value) -> Option<String> {
    match node.get("publisher")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => items.first().and_then(|p| string_field(p, "name")),
        other => string_field(other, "name"),
    }
}

fn is_organization(node: &Value) -> bool {
    match node.get("@type") {
        Some(Value::String(t)) => ORGANIZATION_TYPES.contains(&t.as_str()),
        Some(Value::Array(ts)) => ts
            .iter()
            .filter_map(Value::as_str)
            .any(|t| ORGANIZATION_TYPES.contains(&t)),
        _ => false,
    }
}

fn meta_content(document: &Html, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        document
            .select(&META)
            .find(|m| {
                let e = m.value();
                [e.attr("property"), e.attr("name")]
                    .into_iter()
                    .flatten()
                    .any(|v| v.eq_ignore_ascii_case(name))
            })
            .and_then(|m| m.value().attr("content"))
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
    })
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(inner_text)
        .filter(|t| !t.is_empty())
}

/// Drop `Org - ` / ` | Org` decorations around a title.
fn strip_organization(title: &str, organization: &str) -> String {
    let separators = |c: char| c.is_whitespace() || matches!(c, '-' | '|' | ':' | '–' | '—');
    let n = organization.len();
    let same = |s: Option<&str>| s.is_some_and(|s| s.to_lowercase() == organization.to_lowercase());
    let out = if title.len() <= n {
        title
    } else if same(title.get(..n)) {
        title[n..].trim_start_matches(separators)
    } else if same(title.get(title.len() - n..)) {
        title[..title.len() - n].trim_end_matches(separators)
    } else {
        title
    };
    if out.is_empty() {
        title.to_string()
    } else {
        out.to_string()
    }
}
