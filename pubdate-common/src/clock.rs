//! Wall-clock abstraction.
//!
//! Plausibility bounds ("no later than tomorrow", "no older than N years") and
//! relative dates ("3 hours ago") depend on the current time. Everything that
//! needs it takes a `Clock` so tests can pin the date.
use chrono::{Local, NaiveDate, NaiveDateTime};
use std::sync::Arc;

pub trait Clock: Send + Sync {
    /// Current local date-time, timezone naive.
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Reads the host's local clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Always returns the same instant.
///
/// ```
/// use chrono::NaiveDate;
/// use pubdate_common::clock::{Clock, FixedClock};
///
/// let clock = FixedClock::on(2021, 3, 5);
/// assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2021, 3, 5).unwrap());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl FixedClock {
    /// Noon on the given day; falls back to the Unix epoch for impossible dates.
    pub fn on(year: i32, month: u32, day: u32) -> Self {
        let at = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap_or_default();
        Self(at)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

pub type SharedClock = Arc<dyn Clock>;

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
