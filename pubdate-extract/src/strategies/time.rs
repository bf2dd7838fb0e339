use super::selector::text_date;
use super::{PageContext, Strategy};
use crate::html::first_attr;
use crate::model::{CandidateDate, DateLocation};
use crate::normalize::Normalizer;
use scraper::Selector;
use std::sync::LazyLock;

static PUBLISH_TIMES: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("article time[datetime], time[pubdate]").expect("static selector")
});
static MODIFY_TIMES: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("time[updatedate], time[modifydate], time[dt-updated]")
        .expect("static selector")
});

const PUBLISH_ATTRIBUTES: [&str; 2] = ["pubdate", "datetime"];
const MODIFY_ATTRIBUTES: [&str; 4] = ["updatedate", "modifydate", "dt-updated", "datetime"];

/// `<time>` elements inside an article or carrying a pass-specific
/// attribute.
pub struct TimeElementStrategy;

impl Strategy for TimeElementStrategy {
    fn name(&self) -> &'static str {
        "time"
    }

    fn find(&self, page: &PageContext<'_>, dates: &Normalizer) -> Option<CandidateDate> {
        let (selector, attributes): (&Selector, &[&str]) = if page.check_modified {
            (&MODIFY_TIMES, &MODIFY_ATTRIBUTES)
        } else {
            (&PUBLISH_TIMES, &PUBLISH_ATTRIBUTES)
        };

        page.document.select(selector).find_map(|el| {
            first_attr(el, attributes)
                .and_then(|value| dates.parse(value, page.order))
                .map(|date| CandidateDate::new(date, DateLocation::Attribute, el.html()))
                .or_else(|| text_date(el, page, dates))
        })
    }
}
