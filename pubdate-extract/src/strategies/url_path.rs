use super::{PageContext, Strategy};
use crate::model::{CandidateDate, DateLocation};
use crate::normalize::Normalizer;
use regex::Regex;
use std::sync::LazyLock;

static DATED_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([\./\-_]{0,1}(19|20)\d{2})[\./\-_]{0,1}(([0-3]{0,1}[0-9][\./\-_])|(\w{3,5}[\./\-_]))([0-3]{0,1}[0-9][\./\-]{0,1})",
    )
    .expect("static regex")
});
static EIGHT_DIGIT_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d{8})/").expect("static regex"));

/// Dates embedded in the article URL, e.g. `/2021/03/04/` or `/20210304/`.
pub struct UrlStrategy {
    skip_patterns: Vec<String>,
}

impl UrlStrategy {
    pub fn new(skip_patterns: &[String]) -> Self {
        Self {
            skip_patterns: skip_patterns.to_vec(),
        }
    }
}

impl Strategy for UrlStrategy {
    fn name(&self) -> &'static str {
        "url"
    }

    fn applies(&self, page: &PageContext<'_>) -> bool {
        let url = page.url.as_str();
        !page.check_modified && !self.skip_patterns.iter().any(|p| url.contains(p.as_str()))
    }

    fn find(&self, page: &PageContext<'_>, dates: &Normalizer) -> Option<CandidateDate> {
        let url = page.url.as_str();
        [&*DATED_PATH, &*EIGHT_DIGIT_SEGMENT]
            .into_iter()
            .filter_map(|re| re.find(url))
            .find_map(|m| dates.parse(m.as_str(), page.order))
            .map(|date| CandidateDate::new(date, DateLocation::Url, url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::testing::{normalizer, Fixture};
    use pubdate_config::SiteData;

    fn find(url: &str) -> Option<String> {
        let fx = Fixture::new(url, "<html></html>");
        let page = fx.page(false);
        let s = UrlStrategy::new(&SiteData::default().url_skip_patterns);
        if !s.applies(&page) {
            return None;
        }
        s.find(&page, &normalizer()).map(|c| c.value().to_string())
    }

    #[test]
    fn slash_separated_path() {
        assert_eq!(
            find("https://example.com/2021/03/04/headline").as_deref(),
            Some("2021-03-04")
        );
    }

    #[test]
    fn month_name_and_compact_segments() {
        assert_eq!(
            find("https://paper.test/2020/sep/21/story").as_deref(),
            Some("2020-09-21")
        );
        assert_eq!(
            find("https://paper.test/news/20210304/story").as_deref(),
            Some("2021-03-04")
        );
    }

    #[test]
    fn skip_list_and_undated_urls() {
        assert_eq!(find("https://www.cnn.com/videos/2021/03/04/clip"), None);
        assert_eq!(find("https://example.com/world/headline"), None);
    }
}
