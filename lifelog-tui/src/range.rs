//! Calendar range algebra.
//!
//! Pure date-interval math used by every lane: aligning a range to calendar
//! units, tiling it into fetch-sized chunks and measuring its width.
//! All timestamps are UTC with millisecond precision at unit ends.

use chrono::{DateTime, Datelike, Duration, Months, NaiveTime, Timelike, Utc};
use thiserror::Error;

/// A point on the timeline
pub type Timestamp = DateTime<Utc>;

/// Returned when a range would end before it starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("range end {end} is before start {start}")]
pub struct InvalidRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

/// Granularity used to align and chunk a range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    Hour,
    Day,
    IsoWeek,
    Month,
    Year,
    Decade,
}

impl Interval {
    pub fn name(&self) -> &'static str {
        match self {
            Interval::Hour => "hour",
            Interval::Day => "day",
            Interval::IsoWeek => "isoWeek",
            Interval::Month => "month",
            Interval::Year => "year",
            Interval::Decade => "decade",
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An immutable `[start, end]` window with `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    start: Timestamp,
    end: Timestamp,
}

impl Range {
    /// Create a range, rejecting `end < start`
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, InvalidRange> {
        if end < start {
            return Err(InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Create a range from two instants in either order
    pub fn between(a: Timestamp, b: Timestamp) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    /// Zero-width ranges are dropped from chunk sets
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// True unless the range lies entirely before `start` or after `end`
    pub fn intersects(&self, start: Timestamp, end: Timestamp) -> bool {
        !(self.end < start || self.start > end)
    }

    /// Move the window by a fraction of its own width (negative = earlier).
    ///
    /// A move that would leave the navigable years keeps the current window.
    pub fn pan(&self, fraction: f64) -> Self {
        let width_ms = self.duration().num_milliseconds() as f64;
        Duration::try_milliseconds((width_ms * fraction) as i64)
            .and_then(|shift| {
                navigable(
                    self.start.checked_add_signed(shift)?,
                    self.end.checked_add_signed(shift)?,
                )
            })
            .unwrap_or(*self)
    }

    /// Scale the window around its centre; `factor < 1` zooms in.
    ///
    /// The width stays between [`MIN_WINDOW_MS`] and [`MAX_WINDOW_DAYS`].
    pub fn zoom(&self, factor: f64) -> Self {
        let width_ms = self.duration().num_milliseconds() as f64;
        let max_ms = (MAX_WINDOW_DAYS * MS_PER_DAY) as f64;
        let target_ms = (width_ms * factor).clamp(MIN_WINDOW_MS as f64, max_ms);
        let half = Duration::milliseconds((target_ms / 2.0) as i64);
        let centre = self.start + Duration::milliseconds((width_ms / 2.0) as i64);
        centre
            .checked_sub_signed(half)
            .zip(centre.checked_add_signed(half))
            .and_then(|(start, end)| navigable(start, end))
            .unwrap_or(*self)
    }
}

/// Widest window pan and zoom produce, about fifty years
pub const MAX_WINDOW_DAYS: i64 = 50 * 366;
/// Narrowest window zoom produces
pub const MIN_WINDOW_MS: i64 = 60_000;
const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;
/// 0001-01-01T00:00:00Z
const FIRST_NAVIGABLE_SECOND: i64 = -62_135_596_800;
/// 9999-12-31T23:59:59Z
const LAST_NAVIGABLE_SECOND: i64 = 253_402_300_799;

/// The window, if it lies within years 1 to 9999
fn navigable(start: Timestamp, end: Timestamp) -> Option<Range> {
    let first = DateTime::from_timestamp(FIRST_NAVIGABLE_SECOND, 0)?;
    let last = DateTime::from_timestamp(LAST_NAVIGABLE_SECOND, 0)?;
    (first <= start && end <= last).then(|| Range::between(start, end))
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} → {}",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M")
        )
    }
}

fn start_of_day(t: Timestamp) -> Timestamp {
    t.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Floor `t` to the first instant of its `unit`
pub fn floor_to_unit(t: Timestamp, unit: Interval) -> Timestamp {
    let day = start_of_day(t);
    match unit {
        Interval::Hour => day + Duration::hours(i64::from(t.hour())),
        Interval::Day => day,
        Interval::IsoWeek => day - Duration::days(i64::from(t.weekday().num_days_from_monday())),
        Interval::Month => day - Duration::days(i64::from(t.day0())),
        Interval::Year => day - Duration::days(i64::from(t.ordinal0())),
        Interval::Decade => {
            let year_start = day - Duration::days(i64::from(t.ordinal0()));
            let back = t.year().rem_euclid(10) as u32;
            year_start - Months::new(12 * back)
        }
    }
}

/// Add one `unit` to `t`; month-based units clamp the day of month
pub fn add_unit(t: Timestamp, unit: Interval) -> Timestamp {
    match unit {
        Interval::Hour => t + Duration::hours(1),
        Interval::Day => t + Duration::days(1),
        Interval::IsoWeek => t + Duration::weeks(1),
        Interval::Month => t + Months::new(1),
        Interval::Year => t + Months::new(12),
        Interval::Decade => t + Months::new(120),
    }
}

/// The first boundary of `unit` strictly after the unit containing `t`
pub fn next_boundary(t: Timestamp, unit: Interval) -> Timestamp {
    floor_to_unit(add_unit(t, unit), unit)
}

/// The last instant (millisecond) of the unit containing `t`
pub fn end_of_unit(t: Timestamp, unit: Interval) -> Timestamp {
    add_unit(floor_to_unit(t, unit), unit) - Duration::milliseconds(1)
}

/// Earliest of `t` and `now`
pub fn cap_now(t: Timestamp, now: Timestamp) -> Timestamp {
    t.min(now)
}

pub fn expand_to_interval(range: Range, unit: Interval) -> Range {
    Range {
        start: floor_to_unit(range.start, unit),
        end: end_of_unit(range.end, unit),
    }
}

pub fn expand_to_month(range: Range) -> Range {
    expand_to_interval(range, Interval::Month)
}

pub fn expand_to_year(range: Range) -> Range {
    expand_to_interval(range, Interval::Year)
}

/// Start of the year nine years before `range.start`'s year, through the
/// last instant of `range.end`'s year.
pub fn expand_to_decade(range: Range) -> Range {
    Range {
        start: floor_to_unit(range.start, Interval::Year) - Months::new(12 * 9),
        end: end_of_unit(range.end, Interval::Year),
    }
}

/// Signed fractional days from start to end
pub fn diff_days(range: Range) -> f64 {
    range.duration().num_milliseconds() as f64 / MS_PER_DAY as f64
}

/// Signed fractional weeks from start to end
pub fn diff_weeks(range: Range) -> f64 {
    diff_days(range) / 7.0
}

pub fn over_days(n: f64, range: Range) -> bool {
    diff_days(range).abs() > n
}

pub fn over_weeks(n: f64, range: Range) -> bool {
    diff_weeks(range).abs() > n
}

/// Tile `range` into calendar-aligned sub-ranges of `unit`.
///
/// A range narrower than one unit comes back unchanged. Otherwise the result
/// is an optional short leading chunk, full aligned chunks, and an optional
/// short trailing chunk; each one is an independent outbound query.
pub fn chunk_range(range: Range, unit: Interval) -> Vec<Range> {
    let Range { start, end } = range;
    if add_unit(start, unit) > end {
        return vec![range];
    }

    let first = Range {
        start,
        end: next_boundary(start, unit),
    };
    let last = Range {
        start: floor_to_unit(end, unit),
        end,
    };

    let mut chunks = vec![first];
    let mut cur = Range {
        start: first.end,
        end: next_boundary(first.end, unit),
    };
    while cur.end <= last.start {
        chunks.push(cur);
        cur = Range {
            start: cur.end,
            end: next_boundary(cur.end, unit),
        };
    }
    chunks.push(last);

    chunks.retain(|chunk| !chunk.is_empty());
    chunks
}
