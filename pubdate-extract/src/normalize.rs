//! Date Normalizer: turns date-like text into a plausibility-checked date.
//!
//! Parsing is forgiving. A string is tried as-is, then per `|`
//! segment, then with ordinals, labels and timezone suffixes removed, then as
//! a month-name window, then as a run of bare digits. Every candidate must
//! pass [`Normalizer::accept`] before it leaves this module.

use crate::model::ValidDate;
use crate::parts::{resolve_ambiguous_parts, resolve_tokens};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use pubdate_common::clock::SharedClock;
use pubdate_config::{DateOrder, Thresholds};
use regex::Regex;
use std::sync::LazyLock;

const TIMEZONES: [&str; 8] = ["est", "cst", "mst", "pst", "edt", "cdt", "mdt", "pdt"];

const ENGLISH_MONTHS: [&str; 12] = [
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
];

macro_rules! static_regex {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($re).expect("static regex"));
    };
}

static_regex!(ORDINAL, r"(?i)(\d+)(st|nd|rd|th)");
static_regex!(LABEL_PREFIX, r"(?i)^.*(from|original|published|modified)[^ ]*");
static_regex!(FOUR_DIGITS, r"\d{4}");
static_regex!(FOUR_DIGIT_WORD, r"\b\d{4}\b");
static_regex!(BOUNDED_DIGITS, r"\b(\d{6}|\d{8})\b");
static_regex!(EIGHT_DIGITS, r"\d{8}");
static_regex!(ISO_PREFIX, r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})(?:$|\D)");
static_regex!(COMPACT_ISO, r"^(\d{4})(\d{2})(\d{2})(?:$|T\d)");
static_regex!(NUMERIC_TRIPLE, r"^(\d{1,2})[-/.](\d{1,2})[-/.](\d{2,4})(?:$|\D)");
static_regex!(NUMERIC_DATE, r"^\d{1,2}[./-]\d{1,2}[./-]\d{1,4}$");
static_regex!(
    CLOCK_TIME,
    r"(?i)\b\d{1,2}:\d{2}(?::\d{2})?(?:\.\d+)?\s*(?:[ap]\.?m\.?)?"
);
static_regex!(TIME_TAIL, r"\b\d{1,2}:\d{1,2}.*");
static_regex!(YEAR_TAIL, r"([-/]\d{2,4}) .*");
static_regex!(PUBLISHED_LABEL, r"(?i)published:? (.*$)");
static_regex!(
    WEEKDAY_PREFIX,
    r"(?i).*(monday|tuesday|wednesday|thursday|friday|saturday|sunday)"
);
static_regex!(FILLER_WORDS, r"(?i)\b(?:at|on)\b|,");
static_regex!(AFTER_YEAR, r"(\d{4}).*");
static_regex!(POSTED_LABEL, r"(?i)posted:*");
static_regex!(
    RELATIVE,
    r"(?i)\b(\d+|an?|one)\s+(second|minute|hour|day|week|month|year)s?\s+ago\b"
);
static_regex!(YESTERDAY, r"(?i)\byesterday\b");

/// Month number for an English month name or abbreviation (`sept`, `mar.`).
fn month_number(token: &str) -> Option<u32> {
    let token = token.trim_end_matches('.').to_ascii_lowercase();
    if token.len() < 3 || !token.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    ENGLISH_MONTHS
        .iter()
        .position(|m| m.starts_with(&token))
        .map(|i| i as u32 + 1)
}

fn digit_count(s: &str) -> usize {
    s.chars().filter(char::is_ascii_digit).count()
}

fn years_before(date: NaiveDate, years: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MIN)
}

pub struct Normalizer {
    thresholds: Thresholds,
    clock: SharedClock,
    /// Lowercased configured month names, longest first.
    months: Vec<String>,
    /// `March 4, 2021` or `4 March 2021`.
    month_window: Regex,
    /// `March 4, 2021` and `Mar 4 21` inside longer text.
    month_phrase: Regex,
}

impl Normalizer {
    pub fn new(
        thresholds: Thresholds,
        months: &[String],
        clock: SharedClock,
    ) -> Result<Self, regex::Error> {
        let mut months: Vec<String> = months
            .iter()
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();
        months.sort_by_key(|m| std::cmp::Reverse(m.len()));
        months.dedup();

        let joined = months
            .iter()
            .map(|m| regex::escape(m))
            .collect::<Vec<_>>()
            .join("|");
        let month_window = Regex::new(&format!(
            r"(?i)((((?:{joined})\.?\s+\d{{1,2}})|(\d{{1,2}}\s+(?:{joined})\.?)),?\s+\d{{2,4}}\b)"
        ))?;
        let month_phrase = Regex::new(&format!(
            r"(?i)(?:{joined})\w*\b \d{{1,2}},? {{1,2}}(?:\d{{4}}|\d{{2}})"
        ))?;

        Ok(Self {
            thresholds,
            clock,
            months,
            month_window,
            month_phrase,
        })
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Today plus the timezone buffer.
    pub fn tomorrow(&self) -> NaiveDate {
        self.today() + Duration::days(self.thresholds.future_buffer_days)
    }

    /// Whether `date` falls within the last `days` days (inclusive of the
    /// timezone buffer).
    pub fn is_recent(&self, date: ValidDate, days: i64) -> bool {
        let tomorrow = self.tomorrow();
        let from = tomorrow - Duration::days(days);
        (from..=tomorrow).contains(&date.date())
    }

    /// Parse a short date-like value such as an attribute or JSON field.
    pub fn parse(&self, raw: &str, order: DateOrder) -> Option<ValidDate> {
        self.parse_with(raw, order, false)
    }

    /// Like [`Normalizer::parse`] but without the input length cap.
    pub fn parse_unbounded(&self, raw: &str, order: DateOrder) -> Option<ValidDate> {
        self.parse_with(raw, order, true)
    }

    fn parse_with(&self, raw: &str, order: DateOrder, ignore_length: bool) -> Option<ValidDate> {
        let raw = raw.trim();
        if raw.is_empty()
            || (!ignore_length && raw.chars().count() > self.thresholds.max_input_len)
        {
            return None;
        }

        if let Some(d) = self.attempt(raw, order) {
            return Some(d);
        }

        if raw.contains('|') {
            if let Some(d) = raw
                .split('|')
                .find_map(|part| self.parse_with(part, order, ignore_length))
            {
                return Some(d);
            }
        }

        let without_ordinals = ORDINAL.replace_all(raw, "$1");
        let stripped = LABEL_PREFIX.replace(&without_ordinals, "");
        let s = stripped.trim();
        if s.is_empty() {
            return None;
        }
        if s != raw {
            if let Some(d) = self.attempt(s, order) {
                return Some(d);
            }
        }

        let lower = s.to_ascii_lowercase();
        for tz in TIMEZONES {
            if let Some(idx) = lower.find(tz) {
                if let Some(d) = self.attempt(&s[..idx], order) {
                    return Some(d);
                }
            }
        }

        if let Some(m) = self.month_window.find(s) {
            if let Some(d) = self.attempt(m.as_str(), order) {
                return Some(d);
            }
        }

        for month in &self.months {
            if let Some(d) = self.month_substring(s, &lower, month, order) {
                return Some(d);
            }
        }

        let compact: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '.' | '/' | '-'))
            .collect();
        if let Some(d) = self.digit_only(&compact, order) {
            return Some(d);
        }

        self.relative(s)
    }

    /// Parse free text such as an element's visible content.
    pub fn from_text(&self, raw: &str, order: DateOrder) -> Option<ValidDate> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }
        if let Some(d) = self.parse(s, order) {
            return Some(d);
        }

        let no_time = TIME_TAIL.replace(s, "");
        let trimmed = YEAR_TAIL.replace(&no_time, "$1");
        let s = trimmed.trim();
        if s.is_empty() {
            return None;
        }
        if let Some(d) = self.parse(s, order) {
            return Some(d);
        }

        if let Some(date) = resolve_ambiguous_parts(s, order, self.tomorrow()) {
            if let Some(d) = self.accept(date, s) {
                return Some(d);
            }
        }

        if NUMERIC_DATE.is_match(s) {
            if let Some(d) = self.parse(s, order) {
                return Some(d);
            }
        }

        if let Some(c) = PUBLISHED_LABEL.captures(s) {
            if let Some(d) = self.parse(&c[1], order) {
                return Some(d);
            }
        }

        if let Some(m) = self.month_phrase.find(s) {
            if let Some(d) = self.parse(m.as_str(), order) {
                return Some(d);
            }
        }

        let cleaned = WEEKDAY_PREFIX.replace(s, "");
        let cleaned = FILLER_WORDS.replace_all(&cleaned, "");
        let cleaned = AFTER_YEAR.replace(&cleaned, "$1");
        let cleaned = ORDINAL.replace_all(&cleaned, "$1");
        let cleaned = POSTED_LABEL.replace_all(&cleaned, "");
        self.parse(cleaned.trim(), order)
    }

    /// Plausibility filter. `input` is the exact text the date came from.
    pub fn accept(&self, date: NaiveDate, input: &str) -> Option<ValidDate> {
        let today = self.today();
        let mut date = date;
        if date < years_before(today, self.thresholds.missing_year_age_years)
            && !FOUR_DIGIT_WORD.is_match(input)
        {
            date = date.with_year(today.year())?;
        }
        if !self.in_range(date) {
            return None;
        }
        let input = input.trim();
        if input.chars().count() < self.thresholds.min_fragment_len
            || digit_count(input) < self.thresholds.min_fragment_digits
        {
            return None;
        }
        Some(ValidDate::new(date))
    }

    fn in_range(&self, date: NaiveDate) -> bool {
        let today = self.today();
        let tomorrow = self.tomorrow();
        let jan_first = NaiveDate::from_ymd_opt(today.year(), 1, 1);
        if tomorrow.month() != 1 && Some(date) == jan_first {
            return false;
        }
        date <= tomorrow && date >= years_before(today, self.thresholds.max_age_years)
    }

    fn attempt(&self, s: &str, order: DateOrder) -> Option<ValidDate> {
        let date = self.parse_calendar(s, order)?;
        self.accept(date, s)
    }

    /// Window from a month name (optionally preceded by a number) to the end
    /// of the first four digit year.
    fn month_substring(
        &self,
        s: &str,
        lower: &str,
        month: &str,
        order: DateOrder,
    ) -> Option<ValidDate> {
        let month_idx = lower.find(month)?;
        let before = &s[..month_idx];
        let lead = before
            .strip_suffix(' ')
            .map(|b| b.len() - b.chars().rev().take_while(char::is_ascii_digit).count())
            .filter(|&start| start < month_idx.saturating_sub(1) && month_idx - 1 - start <= 4);
        let start = lead.unwrap_or(month_idx);
        let end = FOUR_DIGITS
            .find(s)
            .map(|m| m.start() + 4)
            .unwrap_or(s.len());
        let (from, to) = if start <= end { (start, end) } else { (end, start) };
        self.attempt(&s[from..to], order)
    }

    fn digit_only(&self, compact: &str, order: DateOrder) -> Option<ValidDate> {
        let tomorrow = self.tomorrow();
        let Some(m) = BOUNDED_DIGITS.find(compact) else {
            let run = EIGHT_DIGITS.find(compact)?.as_str();
            let date = NaiveDate::parse_from_str(run, "%Y%m%d").ok()?;
            return self.accept(date, run);
        };
        let digits = m.as_str();
        let (a, rest) = digits.split_at(2);
        let splits: Vec<[&str; 3]> = if digits.len() == 6 {
            let (b, c) = rest.split_at(2);
            vec![[a, b, c]]
        } else {
            let (b, c) = rest.split_at(2);
            let (y, md) = digits.split_at(4);
            let (mo, d) = md.split_at(2);
            vec![[a, b, c], [y, mo, d]]
        };
        splits.iter().find_map(|tokens| {
            resolve_tokens(tokens, order, tomorrow).and_then(|date| self.accept(date, digits))
        })
    }

    fn relative(&self, s: &str) -> Option<ValidDate> {
        let now = self.clock.now();
        let lower = s.to_ascii_lowercase();
        if lower.contains("today") {
            return Some(ValidDate::new(now.date()));
        }
        if YESTERDAY.is_match(s) {
            return Some(ValidDate::new(now.date() - Duration::days(1)));
        }
        let caps = RELATIVE.captures(s)?;
        let amount: i64 = match caps[1].to_ascii_lowercase().as_str() {
            "a" | "an" | "one" => 1,
            n => n.parse().ok()?,
        };
        let unit = caps[2].to_ascii_lowercase();
        let date = match unit.as_str() {
            "second" => now.checked_sub_signed(Duration::try_seconds(amount)?)?.date(),
            "minute" => now.checked_sub_signed(Duration::try_minutes(amount)?)?.date(),
            "hour" => now.checked_sub_signed(Duration::try_hours(amount)?)?.date(),
            "day" => now.date().checked_sub_signed(Duration::try_days(amount)?)?,
            "week" => now.date().checked_sub_signed(Duration::try_weeks(amount)?)?,
            "month" => now
                .date()
                .checked_sub_months(Months::new(u32::try_from(amount).ok()?))?,
            "year" => years_before(now.date(), u32::try_from(amount).ok()?),
            _ => return None,
        };
        self.in_range(date).then_some(ValidDate::new(date))
    }

    /// Calendar parsing of a single, already isolated value.
    fn parse_calendar(&self, raw: &str, order: DateOrder) -> Option<NaiveDate> {
        let s = raw
            .trim()
            .trim_matches(|c| matches!(c, '/' | '.' | '-' | '_'))
            .trim();
        if s.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.date_naive());
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
            return Some(dt.date_naive());
        }
        if let Some(c) = ISO_PREFIX.captures(s) {
            return NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
        }
        if let Some(c) = COMPACT_ISO.captures(s) {
            return NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
        }
        if let Some(c) = NUMERIC_TRIPLE.captures(s) {
            return resolve_tokens(&[&c[1], &c[2], &c[3]], order, self.tomorrow());
        }
        if let Some(date) = self.parse_month_words(s) {
            return Some(date);
        }
        if s.chars().all(|c| c.is_ascii_digit()) || !FOUR_DIGITS.is_match(s) {
            return None;
        }
        dateparser::parse_with_timezone(s, &Utc)
            .ok()
            .map(|dt| dt.date_naive())
    }

    /// `March 4, 2021`, `4 Mar. 2021`, `Thu, March 4th 2021 10:00 AM`.
    fn parse_month_words(&self, s: &str) -> Option<NaiveDate> {
        let without_time = CLOCK_TIME.replace_all(s, " ");
        let without_ordinals = ORDINAL.replace_all(&without_time, "$1");
        let tokens: Vec<&str> = without_ordinals
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let (month_pos, month) = tokens
            .iter()
            .enumerate()
            .find_map(|(i, t)| month_number(t).map(|m| (i, m)))?;

        let is_day = |t: &str| {
            t.len() <= 2
                && t.chars().all(|c| c.is_ascii_digit())
                && t.parse::<u32>().is_ok_and(|d| (1..=31).contains(&d))
        };
        let year = tokens
            .iter()
            .find(|t| t.len() == 4 && t.chars().all(|c| c.is_ascii_digit()))
            .and_then(|t| t.parse::<i32>().ok());
        let after = tokens.get(month_pos + 1).copied().filter(|t| is_day(t));
        let before = month_pos
            .checked_sub(1)
            .and_then(|i| tokens.get(i).copied())
            .filter(|t| is_day(t));
        let day = after.or(before).and_then(|t| t.parse::<u32>().ok());

        match (day, year) {
            (None, None) => None,
            (day, year) => NaiveDate::from_ymd_opt(
                year.unwrap_or_else(|| self.today().year()),
                month,
                day.unwrap_or(1),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubdate_common::clock::FixedClock;
    use pubdate_config::SiteData;
    use std::sync::Arc;

    fn normalizer_on(y: i32, m: u32, d: u32) -> Normalizer {
        Normalizer::new(
            Thresholds::default(),
            &SiteData::default().months,
            Arc::new(FixedClock::on(y, m, d)),
        )
        .unwrap()
    }

    fn n() -> Normalizer {
        normalizer_on(2024, 6, 15)
    }

    fn day(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn parse(s: &str) -> Option<NaiveDate> {
        n().parse(s, DateOrder::Mdy).map(ValidDate::date)
    }

    fn text(s: &str) -> Option<NaiveDate> {
        n().from_text(s, DateOrder::Mdy).map(ValidDate::date)
    }

    #[test]
    fn structured_formats() {
        assert_eq!(parse("2021-03-04T10:00:00Z"), day(2021, 3, 4));
        assert_eq!(parse("2021-03-04T23:30:00-05:00"), day(2021, 3, 4));
        assert_eq!(parse("Thu, 04 Mar 2021 10:00:00 GMT"), day(2021, 3, 4));
        assert_eq!(parse("2021-03-04"), day(2021, 3, 4));
        assert_eq!(parse("2021/03/04 10:00"), day(2021, 3, 4));
        assert_eq!(parse("20210304"), day(2021, 3, 4));
    }

    #[test]
    fn month_name_formats() {
        assert_eq!(parse("March 4, 2021"), day(2021, 3, 4));
        assert_eq!(parse("4 March 2021"), day(2021, 3, 4));
        assert_eq!(parse("Sept. 21st, 2020"), day(2020, 9, 21));
        assert_eq!(parse("Published on Mar 4th 2021 at 10:30 am"), day(2021, 3, 4));
        assert_eq!(parse("Updated 10:30 AM EST, Thu March 4, 2021"), day(2021, 3, 4));
    }

    #[test]
    fn pipe_segments_are_tried_individually() {
        assert_eq!(parse("News | Politics | 2021-03-04"), day(2021, 3, 4));
    }

    #[test]
    fn length_cap_applies_unless_unbounded() {
        let long = format!("{} 2021-03-04", "x".repeat(120));
        assert_eq!(n().parse(&long, DateOrder::Mdy), None);
        assert!(n().parse_unbounded(&long, DateOrder::Mdy).is_some());
    }

    #[test]
    fn plausibility_bounds() {
        assert_eq!(parse("2024-06-16"), day(2024, 6, 16), "tomorrow is allowed");
        assert_eq!(parse("2024-06-17"), None, "later than tomorrow");
        assert_eq!(parse("2005-06-16"), day(2005, 6, 16));
        assert_eq!(parse("2004-06-14"), None, "older than 19 years");
        assert_eq!(parse("2024-01-01"), None, "Jan 1 of this year");
        assert_eq!(parse("2023-01-01"), day(2023, 1, 1));
    }

    #[test]
    fn jan_first_is_fine_in_january() {
        let n = normalizer_on(2024, 1, 10);
        assert_eq!(
            n.parse("2024-01-01", DateOrder::Mdy).map(ValidDate::date),
            day(2024, 1, 1)
        );
    }

    #[test]
    fn short_fragments_are_rejected() {
        assert_eq!(text("5/6"), None);
        assert_eq!(n().accept(day(2021, 3, 4).unwrap(), "3/4"), None);
    }

    #[test]
    fn locale_order_applies_to_numeric_strings() {
        let n = n();
        assert_eq!(
            n.parse("03/04/2021", DateOrder::Mdy).map(ValidDate::date),
            day(2021, 3, 4)
        );
        assert_eq!(
            n.parse("03/04/2021", DateOrder::Dmy).map(ValidDate::date),
            day(2021, 4, 3)
        );
    }

    #[test]
    fn free_text() {
        assert_eq!(text("Posted: Thursday, March 4, 2021"), day(2021, 3, 4));
        assert_eq!(text("By Jane Doe | 03/04/2021 10:15 PM"), day(2021, 3, 4));
        assert_eq!(text("Published: 2021-03-04"), day(2021, 3, 4));
        assert_eq!(text("no dates here"), None);
    }

    #[test]
    fn relative_dates_follow_the_clock() {
        assert_eq!(text("today"), day(2024, 6, 15));
        assert_eq!(text("Updated yesterday"), day(2024, 6, 14));
        assert_eq!(text("3 days ago"), day(2024, 6, 12));
        assert_eq!(text("an hour ago"), day(2024, 6, 15));
        assert_eq!(text("30 years ago"), None);
    }

    #[test]
    fn oversized_relative_amounts_are_rejected() {
        assert_eq!(text("Updated 100000000000 days ago"), None);
        assert_eq!(text("99999999999999 weeks ago"), None);
        assert_eq!(text("9223372036854775807 seconds ago"), None);
        assert_eq!(text("9223372036854775807 hours ago"), None);
        assert_eq!(text("4294967295 months ago"), None);
        assert_eq!(text("99999999999999999999 days ago"), None);
    }

    #[test]
    fn missing_year_age_is_configurable() {
        let strict = Normalizer::new(
            Thresholds {
                missing_year_age_years: 2,
                ..Thresholds::default()
            },
            &SiteData::default().months,
            Arc::new(FixedClock::on(2024, 6, 15)),
        )
        .unwrap();
        let five_years_back = NaiveDate::from_ymd_opt(2019, 3, 4).unwrap();
        assert_eq!(
            strict.accept(five_years_back, "March 4 at 10:30").map(ValidDate::date),
            day(2024, 3, 4)
        );
        assert_eq!(
            n().accept(five_years_back, "March 4 at 10:30").map(ValidDate::date),
            day(2019, 3, 4)
        );
    }

    #[test]
    fn recent_window() {
        let n = n();
        let d = n.parse("2024-06-13", DateOrder::Mdy).unwrap();
        assert!(n.is_recent(d, 3));
        let old = n.parse("2024-06-01", DateOrder::Mdy).unwrap();
        assert!(!n.is_recent(old, 3));
    }
}
