//! Day/month/year assignment for purely numeric dates such as `03-04-21`.

use chrono::{Datelike, NaiveDate};
use pubdate_config::DateOrder;
use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\n\r]+|\s{2,}").expect("static regex"));

/// Leading integer of `s`, ignoring leading whitespace, like a lenient
/// `parseInt`.
fn leading_int(s: &str) -> Option<(u32, usize)> {
    let s = s.trim_start();
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok().map(|n| (n, digits.len()))
}

fn expand_year(two_digits: u32, reference_year: i32) -> i32 {
    (reference_year / 100) * 100 + two_digits as i32
}

/// Resolve three (or two) numeric tokens separated by `-`, `/` or `.` into a
/// calendar date.
///
/// A leading four digit token makes the input year-first regardless of
/// `order`; otherwise the last token is the year and `order` decides which
/// of the first two is the month. A missing year means the year of
/// `tomorrow`. Month values above 12 and dates past `tomorrow` trigger a
/// day/month swap.
///
/// ```
/// use chrono::NaiveDate;
/// use pubdate_config::DateOrder;
/// use pubdate_extract::parts::resolve_ambiguous_parts;
///
/// let tomorrow = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
/// assert_eq!(
///     resolve_ambiguous_parts("03-04-2021", DateOrder::Mdy, tomorrow),
///     NaiveDate::from_ymd_opt(2021, 3, 4)
/// );
/// assert_eq!(
///     resolve_ambiguous_parts("03-04-2021", DateOrder::Dmy, tomorrow),
///     NaiveDate::from_ymd_opt(2021, 4, 3)
/// );
/// ```
pub fn resolve_ambiguous_parts(
    input: &str,
    order: DateOrder,
    tomorrow: NaiveDate,
) -> Option<NaiveDate> {
    let collapsed = WHITESPACE.replace_all(input, " ");
    let unified: String = collapsed
        .trim()
        .chars()
        .map(|c| if matches!(c, '.' | '/') { '-' } else { c })
        .collect();
    let mut tokens: Vec<&str> = unified.split('-').collect();
    if tokens.len() > 1 {
        // "Posted 03" -> "03"
        if let Some(last_word) = tokens[0].rsplit(char::is_whitespace).next() {
            tokens[0] = last_word;
        }
    }
    resolve_tokens(&tokens, order, tomorrow)
}

pub(crate) fn resolve_tokens(
    tokens: &[&str],
    order: DateOrder,
    tomorrow: NaiveDate,
) -> Option<NaiveDate> {
    let (a, a_len) = leading_int(tokens.first()?)?;
    let (b, _) = leading_int(tokens.get(1)?)?;
    let current_year = tomorrow.year();

    let third = tokens.get(2).and_then(|t| leading_int(t));
    let (year, mut month, mut day) = match third {
        Some((c, c_len)) => {
            if a_len == 4 {
                if c_len >= 4 {
                    return None;
                }
                (a as i32, b, c)
            } else if !(2..=4).contains(&c_len) {
                return None;
            } else if order == DateOrder::Ymd && a_len == 2 && c_len == 2 {
                (expand_year(a, current_year), b, c)
            } else {
                let year = if c_len == 2 {
                    expand_year(c, current_year)
                } else {
                    c as i32
                };
                match order {
                    DateOrder::Dmy => (year, b, a),
                    DateOrder::Mdy | DateOrder::Ymd => (year, a, b),
                }
            }
        }
        None => match order {
            DateOrder::Dmy => (current_year, b, a),
            DateOrder::Mdy | DateOrder::Ymd => (current_year, a, b),
        },
    };

    if month > 12 {
        std::mem::swap(&mut day, &mut month);
    }

    if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
        if date > tomorrow {
            if let Some(swapped) = NaiveDate::from_ymd_opt(year, day, month) {
                if swapped <= tomorrow {
                    std::mem::swap(&mut day, &mut month);
                }
            }
        }
    }

    if day == 0 || month == 0 || day > 31 || month > 12 || year > current_year || year < 1000 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}
