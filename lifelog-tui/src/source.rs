//! Static per-dataset configuration.
//!
//! A [`SourceDescriptor`] is built once at startup and shared by every
//! request for its lane. It tells the loader where the data lives, how the
//! rows are shaped and how to turn them into display text.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::query::{AggregateFunction, DateFormat};
use crate::range::{Interval, Timestamp};
use crate::records::{GraphHints, GraphStyle, LaneShape, TimelineHints};
use crate::resolution::{ChunkPlan, Expansion};

/// A raw row as returned by the detail query
#[derive(Debug, Clone, Deserialize)]
pub struct DetailRow {
    pub date_time: Value,
    #[serde(default)]
    pub date_time_end: Option<Value>,
    #[serde(default)]
    pub value: Option<f64>,
    /// Every other column, for formatters
    #[serde(flatten)]
    pub columns: Map<String, Value>,
}

impl DetailRow {
    pub fn start(&self, format: DateFormat) -> Option<Timestamp> {
        parse_timestamp(&self.date_time, format)
    }

    pub fn end(&self, format: DateFormat) -> Option<Timestamp> {
        self.date_time_end
            .as_ref()
            .and_then(|value| parse_timestamp(value, format))
    }

    /// A text column, if present and a string
    pub fn text(&self, column: &str) -> Option<&str> {
        self.columns.get(column).and_then(Value::as_str)
    }
}

/// One aggregated bucket as returned by the summary queries
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryRow {
    pub day: String,
    #[serde(default)]
    pub aggregate: Option<f64>,
}

impl SummaryRow {
    pub fn start(&self) -> Option<Timestamp> {
        NaiveDate::parse_from_str(&self.day, "%Y-%m-%d")
            .ok()
            .map(|date| date.and_time(NaiveTime::MIN).and_utc())
    }

    /// Aggregate rendered without a trailing `.0` for whole numbers
    pub fn aggregate_label(&self) -> String {
        match self.aggregate {
            Some(v) if v.fract() == 0.0 => format!("{}", v as i64),
            Some(v) => format!("{v:.1}"),
            None => "–".to_string(),
        }
    }
}

/// Parse a `date_time`-style column. Numbers (and digit strings) are epoch
/// seconds; other strings are tried as RFC 3339, `YYYY-MM-DD HH:MM:SS` and
/// plain dates.
pub fn parse_timestamp(value: &Value, format: DateFormat) -> Option<Timestamp> {
    match value {
        Value::Number(n) => {
            let secs = n.as_f64()?;
            DateTime::from_timestamp(secs.trunc() as i64, (secs.fract() * 1e9) as u32)
        }
        Value::String(s) => {
            let s = s.trim();
            if format == DateFormat::UnixEpoch {
                if let Ok(secs) = s.parse::<i64>() {
                    return DateTime::from_timestamp(secs, 0);
                }
            }
            if let Ok(t) = DateTime::parse_from_rfc3339(s) {
                return Some(t.with_timezone(&Utc));
            }
            for pattern in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
                if let Ok(t) = NaiveDateTime::parse_from_str(s, pattern) {
                    return Some(t.and_utc());
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        }
        _ => None,
    }
}

/// Turns rows into display text; one method per text a record carries
pub trait RecordFormatter: Send + Sync {
    fn detail_content(&self, detail: &DetailRow, source: &SourceDescriptor) -> String;
    fn detail_title(&self, detail: &DetailRow, source: &SourceDescriptor) -> String;
    fn summary_content(&self, summary: &SummaryRow, period: &str, source: &SourceDescriptor) -> String;
    fn summary_title(&self, summary: &SummaryRow, period: &str, source: &SourceDescriptor) -> String;
}

/// Configuration of one Datasette-backed lane
#[derive(Clone)]
pub struct SourceDescriptor {
    /// Lane name, also used as the record group
    pub group: String,
    /// Query endpoint, possibly with its own query string
    pub base_api: String,
    /// `with data as (...)` prefix normalising the source table
    pub base_sql: String,
    /// First instant with data
    pub start: Timestamp,
    /// Last instant with data; `None` means "now" at request time
    pub end: Option<Timestamp>,
    pub aggregate: AggregateFunction,
    pub date_format: DateFormat,
    /// Expansion and chunking for raw detail requests
    pub detail_plan: ChunkPlan,
    /// Shape of detail results; summaries are always graphs
    pub detail_shape: LaneShape,
    pub graph: GraphHints,
    pub timeline: TimelineHints,
    pub formatter: Arc<dyn RecordFormatter>,
}

impl std::fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("group", &self.group)
            .field("base_api", &self.base_api)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("aggregate", &self.aggregate)
            .field("date_format", &self.date_format)
            .field("detail_plan", &self.detail_plan)
            .field("detail_shape", &self.detail_shape)
            .field("timeline", &self.timeline)
            .finish_non_exhaustive()
    }
}

impl SourceDescriptor {
    /// Descriptor with the common defaults: count aggregate, epoch dates,
    /// month expansion and chunks, timeline-shaped detail, open-ended span.
    pub fn new(
        group: impl Into<String>,
        base_api: impl Into<String>,
        base_sql: impl Into<String>,
        start: Timestamp,
        formatter: Arc<dyn RecordFormatter>,
    ) -> Self {
        Self {
            group: group.into(),
            base_api: base_api.into(),
            base_sql: base_sql.into(),
            start,
            end: None,
            aggregate: AggregateFunction::default(),
            date_format: DateFormat::default(),
            detail_plan: ChunkPlan {
                expand: Expansion::Interval(Interval::Month),
                chunk: Interval::Month,
            },
            detail_shape: LaneShape::Timeline,
            graph: GraphHints::default(),
            timeline: TimelineHints::default(),
            formatter,
        }
    }

    pub fn until(mut self, end: Timestamp) -> Self {
        self.end = Some(end);
        self
    }

    pub fn aggregate(mut self, aggregate: AggregateFunction) -> Self {
        self.aggregate = aggregate;
        self
    }

    pub fn date_format(mut self, format: DateFormat) -> Self {
        self.date_format = format;
        self
    }

    pub fn detail_plan(mut self, expand: Interval, chunk: Interval) -> Self {
        self.detail_plan = ChunkPlan {
            expand: Expansion::Interval(expand),
            chunk,
        };
        self
    }

    /// Draw detail rows as a graph of `value`
    pub fn graph_detail(mut self, style: GraphStyle) -> Self {
        self.detail_shape = LaneShape::Graph;
        self.graph = GraphHints { style };
        self
    }

    /// Let overlapping timeline records share one row
    pub fn unstacked(mut self) -> Self {
        self.timeline = TimelineHints { stack: false };
        self
    }

    pub fn data_end(&self, now: Timestamp) -> Timestamp {
        self.end.unwrap_or(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 9, 14, 30, 0).unwrap();
        assert_eq!(parse_timestamp(&json!(1709994600), DateFormat::UnixEpoch), Some(expected));
        assert_eq!(parse_timestamp(&json!("1709994600"), DateFormat::UnixEpoch), Some(expected));
        assert_eq!(parse_timestamp(&json!("2024-03-09 14:30:00"), DateFormat::Iso), Some(expected));
        assert_eq!(parse_timestamp(&json!("2024-03-09T14:30:00.000"), DateFormat::Iso), Some(expected));
        assert_eq!(parse_timestamp(&json!("2024-03-09T15:30:00+01:00"), DateFormat::Iso), Some(expected));
        assert_eq!(
            parse_timestamp(&json!("2024-03-09"), DateFormat::Iso),
            Some(Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp(&json!(null), DateFormat::Iso), None);
        assert_eq!(parse_timestamp(&json!("yesterday"), DateFormat::Iso), None);
    }

    #[test]
    fn test_detail_row_keeps_extra_columns() {
        let row: DetailRow = serde_json::from_value(json!({
            "date_time": 1709994600,
            "date_time_end": 1709994900,
            "value": 1,
            "title": "A long read",
            "image": "a.png"
        }))
        .unwrap();
        assert_eq!(row.text("title"), Some("A long read"));
        assert_eq!(row.value, Some(1.0));
        assert_eq!(
            row.end(DateFormat::UnixEpoch).unwrap() - row.start(DateFormat::UnixEpoch).unwrap(),
            chrono::Duration::minutes(5)
        );
    }

    #[test]
    fn test_summary_row() {
        let row: SummaryRow = serde_json::from_value(json!({"day": "2024-02-01", "aggregate": 12})).unwrap();
        assert_eq!(row.start(), Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()));
        assert_eq!(row.aggregate_label(), "12");

        let avg: SummaryRow = serde_json::from_value(json!({"day": "2024-02-01", "aggregate": 61.34})).unwrap();
        assert_eq!(avg.aggregate_label(), "61.3");
        let up: SummaryRow = serde_json::from_value(json!({"day": "2024-02-01", "aggregate": 61.35})).unwrap();
        assert_eq!(up.aggregate_label(), "61.4");

        let empty: SummaryRow = serde_json::from_value(json!({"day": "2024-02-01", "aggregate": null})).unwrap();
        assert_eq!(empty.aggregate, None);
    }
}
