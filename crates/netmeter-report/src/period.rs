//! Period resolution and quota selection.

use chrono::{Datelike, Local, NaiveDate, TimeZone};

use netmeter_config::QuotaConfig;

use crate::error::ReportError;
use crate::report::QuotaType;

/// An inclusive date range. `end >= start` always holds after resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Number of calendar days spanned, counting both boundary days.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn is_single_day(&self) -> bool {
        self.start == self.end
    }

    /// Unix timestamp of the range start (local midnight).
    pub fn start_ts(&self) -> i64 {
        day_start_ts(self.start)
    }

    /// Unix timestamp just past the range end (local midnight of the
    /// following day), making `[start_ts, end_ts)` half-open.
    pub fn end_ts(&self) -> i64 {
        day_start_ts(self.end + chrono::Days::new(1))
    }

    /// Iterate the calendar days in the range.
    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take(self.days() as usize)
    }
}

/// A requested reporting period, before resolution against the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Today,
    Yesterday,
    LastSevenDays,
    CurrentMonth,
    /// A full calendar month.
    Month { year: i32, month: u32 },
    AllTime,
    /// Arbitrary user-chosen range; single-day views are customs with
    /// `start == end`.
    Custom { start: NaiveDate, end: NaiveDate },
}

impl Period {
    /// Parse an artifact key as served over HTTP.
    pub fn from_key(key: &str) -> Result<Self, ReportError> {
        match key {
            "today" => return Ok(Self::Today),
            "yesterday" => return Ok(Self::Yesterday),
            "last-7-days" => return Ok(Self::LastSevenDays),
            "current-month" => return Ok(Self::CurrentMonth),
            "all-time" => return Ok(Self::AllTime),
            _ => {}
        }
        if let Some(rest) = key.strip_prefix("month-") {
            let parts: Vec<&str> = rest.splitn(2, '-').collect();
            if let [year, month] = parts[..] {
                let year: i32 = year
                    .parse()
                    .map_err(|_| ReportError::UnknownKey(key.to_string()))?;
                let month: u32 = month
                    .parse()
                    .map_err(|_| ReportError::UnknownKey(key.to_string()))?;
                if (1..=12).contains(&month) {
                    return Ok(Self::Month { year, month });
                }
            }
            return Err(ReportError::UnknownKey(key.to_string()));
        }
        if let Some(rest) = key.strip_prefix("custom-") {
            if let Some((start, end)) = rest.split_once('_') {
                return Self::custom(start, end);
            }
        }
        Err(ReportError::UnknownKey(key.to_string()))
    }

    /// Build a custom period from `YYYY-MM-DD` boundary strings.
    pub fn custom(start: &str, end: &str) -> Result<Self, ReportError> {
        let start = parse_date(start)?;
        let end = parse_date(end)?;
        if end < start {
            return Err(ReportError::InvalidPeriod(format!(
                "end {end} is before start {start}"
            )));
        }
        Ok(Self::Custom { start, end })
    }

    /// Deterministic artifact key, also the cache file stem.
    pub fn key(&self) -> String {
        match self {
            Self::Today => "today".to_string(),
            Self::Yesterday => "yesterday".to_string(),
            Self::LastSevenDays => "last-7-days".to_string(),
            Self::CurrentMonth => "current-month".to_string(),
            Self::Month { year, month } => format!("month-{year:04}-{month:02}"),
            Self::AllTime => "all-time".to_string(),
            Self::Custom { start, end } => format!("custom-{start}_{end}"),
        }
    }

    /// Canonical periods are scheduler-maintained; customs are generated
    /// on demand through the job queue.
    pub fn is_canonical(&self) -> bool {
        !matches!(self, Self::Custom { .. })
    }

    /// A completed calendar month's artifact is immutable.
    pub fn is_completed_month(&self, today: NaiveDate) -> bool {
        match self {
            Self::Month { year, month } => match month_end(*year, *month) {
                Some(end) => end < today,
                None => false,
            },
            _ => false,
        }
    }

    /// Resolve to concrete boundary dates. `coverage_start` is the date of
    /// the earliest collected sample, used by all-time; an all-time period
    /// over an empty store degenerates to today (and yields an
    /// empty-but-valid report, not an error).
    pub fn resolve(
        &self,
        today: NaiveDate,
        coverage_start: Option<NaiveDate>,
    ) -> Result<DateRange, ReportError> {
        let range = match self {
            Self::Today => DateRange {
                start: today,
                end: today,
            },
            Self::Yesterday => {
                let y = today - chrono::Days::new(1);
                DateRange { start: y, end: y }
            }
            Self::LastSevenDays => DateRange {
                start: today - chrono::Days::new(6),
                end: today,
            },
            Self::CurrentMonth => DateRange {
                start: first_of_month(today),
                end: today,
            },
            Self::Month { year, month } => {
                let start = NaiveDate::from_ymd_opt(*year, *month, 1).ok_or_else(|| {
                    ReportError::InvalidPeriod(format!("no such month: {year:04}-{month:02}"))
                })?;
                let end = month_end(*year, *month).ok_or_else(|| {
                    ReportError::InvalidPeriod(format!("no such month: {year:04}-{month:02}"))
                })?;
                // The running month only aggregates up to today.
                DateRange {
                    start,
                    end: end.min(today),
                }
            }
            Self::AllTime => DateRange {
                start: coverage_start.unwrap_or(today).min(today),
                end: today,
            },
            Self::Custom { start, end } => {
                if end < start {
                    return Err(ReportError::InvalidPeriod(format!(
                        "end {end} is before start {start}"
                    )));
                }
                DateRange {
                    start: *start,
                    end: *end,
                }
            }
        };
        Ok(range)
    }
}

/// Pick the quota ceiling a report is judged against.
///
/// Month-to-date views (any period starting on the 1st) always report the
/// monthly quota, even a few days into the month. Otherwise: 1 day is
/// daily, up to a week is weekly, anything longer is monthly.
pub fn select_quota(range: &DateRange, quota: &QuotaConfig) -> (u64, QuotaType) {
    if range.start.day() == 1 {
        return (quota.monthly_gb, QuotaType::Monthly);
    }
    match range.days() {
        1 => (quota.daily_gb, QuotaType::Daily),
        2..=7 => (quota.weekly_gb, QuotaType::Weekly),
        _ => (quota.monthly_gb, QuotaType::Monthly),
    }
}

/// Local-midnight unix timestamp for a calendar day.
pub fn day_start_ts(date: NaiveDate) -> i64 {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    match Local.from_local_datetime(&midnight).earliest() {
        Some(dt) => dt.timestamp(),
        // Midnight skipped by a DST jump; fall back to the UTC reading.
        None => midnight.and_utc().timestamp(),
    }
}

/// Calendar day a timestamp falls on, by the router's local clock.
pub fn ts_to_date(ts: i64) -> Option<NaiveDate> {
    Local.timestamp_opt(ts, 0).single().map(|dt| dt.date_naive())
}

pub(crate) fn first_of_month(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

pub(crate) fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let next_first = NaiveDate::from_ymd_opt(next_year, next_month, 1)?;
    Some(next_first - chrono::Days::new(1))
}

fn parse_date(s: &str) -> Result<NaiveDate, ReportError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| ReportError::InvalidPeriod(format!("bad date: {s}")))
}
