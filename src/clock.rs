use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

/// Source of "now" for date-relative rules. Everything that buckets by date
/// takes a clock so tests can pin the instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    /// Midnight UTC of the given day.
    pub fn on(date: NaiveDate) -> Self {
        Self(date.and_time(chrono::NaiveTime::MIN).and_utc())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// `date` moved by `days`, or `None` when the result leaves chrono's range.
pub fn offset_date(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    TimeDelta::try_days(days).and_then(|delta| date.checked_add_signed(delta))
}

/// Start of a trailing window of `since_days` days. Windows reaching past
/// the earliest representable date start there.
pub fn cutoff_date(clock: &dyn Clock, since_days: i64) -> NaiveDate {
    offset_date(clock.today(), -since_days.max(1)).unwrap_or(NaiveDate::MIN)
}
