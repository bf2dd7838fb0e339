use super::selector::element_date;
use super::{PageContext, Strategy};
use crate::model::CandidateDate;
use crate::normalize::Normalizer;
use scraper::Selector;

/// Broad selectors such as `.date`, trusted only when exactly one element
/// on the page matches.
pub struct GenericSelectorStrategy {
    selectors: Vec<Selector>,
}

impl GenericSelectorStrategy {
    /// Fails with the first selector that does not parse.
    pub fn new(selectors: &[String]) -> Result<Self, String> {
        let selectors = selectors
            .iter()
            .map(|s| Selector::parse(s).map_err(|_| s.clone()))
            .collect::<Result<_, _>>()?;
        Ok(Self { selectors })
    }
}

impl Strategy for GenericSelectorStrategy {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn applies(&self, page: &PageContext<'_>) -> bool {
        !page.check_modified
    }

    fn find(&self, page: &PageContext<'_>, dates: &Normalizer) -> Option<CandidateDate> {
        self.selectors.iter().find_map(|selector| {
            let mut matches = page.document.select(selector);
            let only = matches.next()?;
            if matches.next().is_some() {
                return None;
            }
            element_date(only, page, dates)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::testing::{normalizer, Fixture};
    use pubdate_config::SiteData;

    fn strategy() -> GenericSelectorStrategy {
        GenericSelectorStrategy::new(&SiteData::default().generic_selectors).unwrap()
    }

    #[test]
    fn single_match_fires() {
        let fx = Fixture::new("https://a.test/x", r#"<p class="date">May 3, 2020</p>"#);
        let hit = strategy().find(&fx.page(false), &normalizer()).unwrap();
        assert_eq!(hit.value().to_string(), "2020-05-03");
    }

    #[test]
    fn two_matches_never_fire() {
        let fx = Fixture::new(
            "https://a.test/x",
            r#"<p class="date">May 3, 2020</p><p class="date">June 9, 2020</p>"#,
        );
        assert!(strategy().find(&fx.page(false), &normalizer()).is_none());
    }

    #[test]
    fn skipped_for_modify_pass() {
        let fx = Fixture::new("https://a.test/x", r#"<p class="date">May 3, 2020</p>"#);
        assert!(!strategy().applies(&fx.page(true)));
    }

    #[test]
    fn bad_selector_is_reported() {
        let err = GenericSelectorStrategy::new(&["p[".to_string()]).err();
        assert_eq!(err.as_deref(), Some("p["));
    }
}
