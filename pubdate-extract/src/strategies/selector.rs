use super::{PageContext, Strategy};
use crate::html::{child_fragments, first_attr, has_attr_prefix, inner_text};
use crate::model::{CandidateDate, DateLocation};
use crate::normalize::Normalizer;
use pubdate_config::KeySet;
use regex::Regex;
use scraper::{CaseSensitivity, ElementRef, Selector};
use std::sync::LazyLock;

static ALL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("*").expect("static selector"));
static TIME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("time").expect("static selector"));
static PUBLISH_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:class|id)\s*=\s*["']([^"']*(?:byline|publish)[^"']*)["']"#)
        .expect("static regex")
});
static MODIFY_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:class|id)\s*=\s*["']([^"']*(?:byline|update|modify)[^"']*)["']"#)
        .expect("static regex")
});

/// Attribute names as the HTML parser stores them (lowercased).
const TIME_ATTRIBUTES: [&str; 3] = ["datetime", "content", "datepublished"];

/// Date for one element: a `datetime`-style attribute on it or on a nested
/// `<time>`, then its visible text (or `value` for inputs), then each child.
pub(crate) fn element_date(
    el: ElementRef<'_>,
    page: &PageContext<'_>,
    dates: &Normalizer,
) -> Option<CandidateDate> {
    let time = if el.value().name() == "time" {
        Some(el)
    } else {
        el.select(&TIME).next()
    };
    for holder in time.into_iter().chain(std::iter::once(el)) {
        if let Some(value) = first_attr(holder, &TIME_ATTRIBUTES) {
            if let Some(date) = dates.parse(value, page.order) {
                return Some(CandidateDate::new(date, DateLocation::Attribute, holder.html()));
            }
        }
    }
    text_date(el, page, dates)
}

/// Visible text, then the text of each direct child.
pub(crate) fn text_date(
    el: ElementRef<'_>,
    page: &PageContext<'_>,
    dates: &Normalizer,
) -> Option<CandidateDate> {
    if el.value().name() == "input" {
        if let Some(value) = el.value().attr("value") {
            if let Some(date) = dates.from_text(value, page.order) {
                return Some(CandidateDate::new(date, DateLocation::Attribute, el.html()));
            }
        }
    }
    let text = inner_text(el);
    if let Some(date) = dates.from_text(&text, page.order) {
        return Some(CandidateDate::new(date, DateLocation::Element, el.html()));
    }
    child_fragments(el)
        .into_iter()
        .find_map(|(text, html)| {
            dates
                .from_text(&text, page.order)
                .map(|date| CandidateDate::new(date, DateLocation::Element, html))
        })
}

/// Class and id tokens in the raw markup that look date-related.
fn discovered_tokens(html: &str, check_modified: bool) -> Vec<String> {
    let (pattern, keywords): (&Regex, &[&str]) = if check_modified {
        (&MODIFY_TOKENS, &["byline", "update", "modify"])
    } else {
        (&PUBLISH_TOKENS, &["byline", "publish"])
    };
    let mut tokens: Vec<String> = Vec::new();
    for caps in pattern.captures_iter(html) {
        for word in caps[1].split_whitespace() {
            let word = word.to_ascii_lowercase();
            if keywords.iter().any(|k| word.contains(k)) && !tokens.contains(&word) {
                tokens.push(word);
            }
        }
    }
    tokens
}

fn has_class_or_id(el: ElementRef<'_>, token: &str) -> bool {
    let e = el.value();
    e.has_class(token, CaseSensitivity::AsciiCaseInsensitive)
        || e.id().is_some_and(|id| id.eq_ignore_ascii_case(token))
}

/// Elements whose `itemprop`, `class` or `id` starts with a configured
/// token, then elements carrying a discovered byline/publish class or id.
pub struct SelectorStrategy {
    tokens: KeySet,
}

impl SelectorStrategy {
    pub fn new(selectors: &KeySet) -> Self {
        let lower = |v: &[String]| v.iter().map(|s| s.trim().to_ascii_lowercase()).collect();
        Self {
            tokens: KeySet {
                publish: lower(&selectors.publish),
                modify: lower(&selectors.modify),
            },
        }
    }

    /// Override lookup with an explicit CSS selector. With `attribute` set,
    /// only the first match is read: its attribute value, or its visible
    /// text when the attribute is `innerText`.
    pub fn find_in(
        page: &PageContext<'_>,
        dates: &Normalizer,
        selector: &Selector,
        attribute: Option<&str>,
    ) -> Option<CandidateDate> {
        let mut matches = page.document.select(selector);
        match attribute {
            Some(attr) => {
                let el = matches.next()?;
                let (value, location) = if attr.eq_ignore_ascii_case("innertext") {
                    (inner_text(el), DateLocation::Element)
                } else {
                    (el.value().attr(attr)?.to_string(), DateLocation::Attribute)
                };
                let date = dates.parse_unbounded(&value, page.order)?;
                Some(CandidateDate::new(date, location, el.html()))
            }
            None => matches.find_map(|el| element_date(el, page, dates)),
        }
    }
}

impl Strategy for SelectorStrategy {
    fn name(&self) -> &'static str {
        "selector"
    }

    fn find(&self, page: &PageContext<'_>, dates: &Normalizer) -> Option<CandidateDate> {
        let elements: Vec<ElementRef<'_>> = page.document.select(&ALL).collect();

        for token in self.tokens.for_pass(page.check_modified) {
            let hit = elements
                .iter()
                .filter(|el| has_attr_prefix(**el, token))
                .find_map(|el| element_date(*el, page, dates));
            if hit.is_some() {
                return hit;
            }
        }

        for token in discovered_tokens(page.html, page.check_modified) {
            let hit = elements
                .iter()
                .filter(|el| has_class_or_id(**el, &token))
                .find_map(|el| element_date(*el, page, dates));
            if hit.is_some() {
                return hit;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::testing::{normalizer, Fixture};
    use pubdate_config::SiteData;

    fn find(html: &str, check_modified: bool) -> Option<CandidateDate> {
        let fx = Fixture::new("https://a.test/x", html);
        SelectorStrategy::new(&SiteData::default().selectors).find(&fx.page(check_modified), &normalizer())
    }

    #[test]
    fn nested_time_attribute_first() {
        let hit = find(
            r#"<div class="published-on">Posted <time datetime="2021-03-04T08:00:00Z">yesterday</time></div>"#,
            false,
        )
        .unwrap();
        assert_eq!(hit.value().to_string(), "2021-03-04");
        assert_eq!(hit.source_location(), DateLocation::Attribute);
        assert!(hit.raw_fragment().starts_with("<time"));
    }

    #[test]
    fn visible_text_and_itemprop_prefix() {
        let hit = find(r#"<span itemprop="datePublishedText">March 4, 2021</span>"#, false).unwrap();
        assert_eq!(hit.value().to_string(), "2021-03-04");
        assert_eq!(hit.source_location(), DateLocation::Element);
    }

    #[test]
    fn long_container_text() {
        let html = r#"<div class="post-date-wrapper">
            <span>By a staff writer with a long byline that goes on and on and on and on about nothing at all</span>
            <span>June 2, 2022</span></div>"#;
        let hit = find(html, false).unwrap();
        assert_eq!(hit.value().to_string(), "2022-06-02");
    }

    #[test]
    fn discovered_byline_classes() {
        let html = r#"<p class="story-meta c-byline__when">12 May 2023</p>"#;
        let hit = find(html, false).unwrap();
        assert_eq!(hit.value().to_string(), "2023-05-12");
    }

    #[test]
    fn modify_tokens() {
        let html = r#"<span class="published">Jan 5, 2023</span><span class="updated">Feb 7, 2023</span>"#;
        assert_eq!(find(html, true).unwrap().value().to_string(), "2023-02-07");
        assert_eq!(find(html, false).unwrap().value().to_string(), "2023-01-05");
    }

    #[test]
    fn explicit_selector_and_attribute() {
        let fx = Fixture::new(
            "https://a.test/x",
            r#"<div class="stamp" data-ts="2021-03-04">Mar 9, 2021</div>"#,
        );
        let page = fx.page(false);
        let sel = Selector::parse(".stamp").unwrap();
        let n = normalizer();
        let by_attr = SelectorStrategy::find_in(&page, &n, &sel, Some("data-ts")).unwrap();
        assert_eq!(by_attr.value().to_string(), "2021-03-04");
        let by_text = SelectorStrategy::find_in(&page, &n, &sel, Some("innerText")).unwrap();
        assert_eq!(by_text.value().to_string(), "2021-03-09");
        let cascade = SelectorStrategy::find_in(&page, &n, &sel, None).unwrap();
        assert_eq!(cascade.value().to_string(), "2021-03-09");
    }
}
