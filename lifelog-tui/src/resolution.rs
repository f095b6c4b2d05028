//! Resolution selection: how much detail a window of a given width gets.

use crate::range::{
    chunk_range, expand_to_decade, expand_to_interval, over_days, over_weeks, Interval, Range,
    Timestamp,
};

/// Weeks beyond which only yearly summaries are fetched (five years)
pub const YEAR_SUMMARY_WEEKS: f64 = 52.0 * 5.0;
/// Weeks beyond which monthly summaries are fetched
pub const MONTH_SUMMARY_WEEKS: f64 = 52.0;
/// Days beyond which daily summaries are fetched
pub const DAY_SUMMARY_DAYS: f64 = 5.0;

/// Granularity of the records returned for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// Raw per-event rows
    Detail,
    DaySummary,
    MonthSummary,
    YearSummary,
}

/// Outcome of resolution selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The range misses the source's data span entirely; nothing is fetched
    Empty,
    Fetch(Resolution),
}

/// How a resolution expands and tiles a requested range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    Interval(Interval),
    Decade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub expand: Expansion,
    pub chunk: Interval,
}

impl ChunkPlan {
    /// Expand `range` and tile it into the chunks that become queries
    pub fn chunks(&self, range: Range) -> Vec<Range> {
        let expanded = match self.expand {
            Expansion::Interval(unit) => expand_to_interval(range, unit),
            Expansion::Decade => expand_to_decade(range),
        };
        chunk_range(expanded, self.chunk)
    }
}

impl Resolution {
    /// Coarseness rank, 0 = finest
    pub fn rank(&self) -> u8 {
        match self {
            Resolution::Detail => 0,
            Resolution::DaySummary => 1,
            Resolution::MonthSummary => 2,
            Resolution::YearSummary => 3,
        }
    }

    pub fn is_summary(&self) -> bool {
        !matches!(self, Resolution::Detail)
    }

    /// Chunk plan; `detail` supplies the source-specific plan for raw rows
    pub fn plan(&self, detail: ChunkPlan) -> ChunkPlan {
        match self {
            Resolution::Detail => detail,
            Resolution::DaySummary => ChunkPlan {
                expand: Expansion::Interval(Interval::Month),
                chunk: Interval::Month,
            },
            Resolution::MonthSummary => ChunkPlan {
                expand: Expansion::Interval(Interval::Year),
                chunk: Interval::Year,
            },
            Resolution::YearSummary => ChunkPlan {
                expand: Expansion::Decade,
                chunk: Interval::Year,
            },
        }
    }

    /// Width of one summary bucket
    pub fn bucket(&self) -> Option<Interval> {
        match self {
            Resolution::Detail => None,
            Resolution::DaySummary => Some(Interval::Day),
            Resolution::MonthSummary => Some(Interval::Month),
            Resolution::YearSummary => Some(Interval::Year),
        }
    }

    /// SQLite `strftime` pattern that groups rows into buckets
    pub fn bucket_format(&self) -> Option<&'static str> {
        match self {
            Resolution::Detail => None,
            Resolution::DaySummary => Some("%Y-%m-%d"),
            Resolution::MonthSummary => Some("%Y-%m-01"),
            Resolution::YearSummary => Some("%Y-01-01"),
        }
    }

    /// chrono pattern for the human label of a bucket
    pub fn period_label_format(&self) -> &'static str {
        match self {
            Resolution::Detail => "%-d %b %y %H:%M",
            Resolution::DaySummary => "%-d %b %y",
            Resolution::MonthSummary => "%b %y",
            Resolution::YearSummary => "%Y",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Resolution::Detail => "detail",
            Resolution::DaySummary => "day-summary",
            Resolution::MonthSummary => "month-summary",
            Resolution::YearSummary => "year-summary",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Pick the resolution for `range` against a source's `[source_start, source_end]`.
///
/// Checks run widest first and every threshold is exclusive.
pub fn select_resolution(range: Range, source_start: Timestamp, source_end: Timestamp) -> Selection {
    if !range.intersects(source_start, source_end) {
        return Selection::Empty;
    }
    let resolution = if over_weeks(YEAR_SUMMARY_WEEKS, range) {
        Resolution::YearSummary
    } else if over_weeks(MONTH_SUMMARY_WEEKS, range) {
        Resolution::MonthSummary
    } else if over_days(DAY_SUMMARY_DAYS, range) {
        Resolution::DaySummary
    } else {
        Resolution::Detail
    };
    Selection::Fetch(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn at(y: i32, m: u32, d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn span() -> (Timestamp, Timestamp) {
        (at(2012, 10, 1), at(2030, 1, 1))
    }

    fn select(start: Timestamp, days: i64) -> Selection {
        let (s, e) = span();
        select_resolution(Range::new(start, start + Duration::days(days)).unwrap(), s, e)
    }

    #[test]
    fn test_three_days_is_detail() {
        assert_eq!(select(at(2024, 1, 1), 3), Selection::Fetch(Resolution::Detail));
    }

    #[test]
    fn test_four_hundred_days_is_month_summary() {
        assert_eq!(select(at(2022, 1, 1), 400), Selection::Fetch(Resolution::MonthSummary));
    }

    #[test]
    fn test_thresholds_are_exclusive() {
        assert_eq!(select(at(2024, 1, 1), 5), Selection::Fetch(Resolution::Detail));
        assert_eq!(select(at(2024, 1, 1), 6), Selection::Fetch(Resolution::DaySummary));
        assert_eq!(select(at(2020, 1, 1), 52 * 7), Selection::Fetch(Resolution::DaySummary));
        assert_eq!(select(at(2015, 1, 1), 260 * 7), Selection::Fetch(Resolution::MonthSummary));
        assert_eq!(select(at(2015, 1, 1), 260 * 7 + 1), Selection::Fetch(Resolution::YearSummary));
    }

    #[test]
    fn test_outside_source_span_is_empty() {
        assert_eq!(select(at(2001, 1, 1), 30), Selection::Empty);
        assert_eq!(select(at(2031, 1, 1), 3), Selection::Empty);
    }

    #[test]
    fn test_widening_never_gets_finer() {
        let start = at(2014, 3, 1);
        let mut previous = 0;
        for days in (0..3000).step_by(7) {
            if let Selection::Fetch(resolution) = select(start, days) {
                assert!(resolution.rank() >= previous, "{} days went finer", days);
                previous = resolution.rank();
            }
        }
        assert_eq!(previous, Resolution::YearSummary.rank());
    }

    #[test]
    fn test_summary_plans() {
        let detail = ChunkPlan {
            expand: Expansion::Interval(Interval::Day),
            chunk: Interval::Hour,
        };
        assert_eq!(Resolution::Detail.plan(detail), detail);
        let year = Resolution::YearSummary.plan(detail);
        assert_eq!(year.expand, Expansion::Decade);
        assert_eq!(year.chunk, Interval::Year);

        let r = Range::new(at(2023, 5, 5), at(2024, 2, 2)).unwrap();
        let chunks = Resolution::YearSummary.plan(detail).chunks(r);
        assert_eq!(chunks.len(), 11);
        assert_eq!(chunks[0].start(), at(2014, 1, 1));
    }
}
