//! Display records and lane payloads.
//!
//! Loaders reshape query rows into these; the TUI only ever sees
//! [`LaneData`].

use crate::range::{Range, Timestamp};

/// Title carried by every error placeholder
pub const ERROR_TITLE: &str = "Loading Error";

/// Timeline items are point events or intervals, graph items are samples
#[derive(Debug, Clone, PartialEq)]
pub enum RecordKind {
    Event,
    /// A plotted value; `y` is `None` for error placeholders
    Sample { x: Timestamp, y: Option<f64> },
}

/// One renderable item in a lane
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRecord {
    pub group: String,
    pub content: String,
    pub title: String,
    pub start: Timestamp,
    pub end: Option<Timestamp>,
    pub kind: RecordKind,
    pub is_error: bool,
}

impl DisplayRecord {
    pub fn event(
        group: impl Into<String>,
        content: impl Into<String>,
        title: impl Into<String>,
        start: Timestamp,
        end: Option<Timestamp>,
    ) -> Self {
        Self {
            group: group.into(),
            content: content.into(),
            title: title.into(),
            start,
            end,
            kind: RecordKind::Event,
            is_error: false,
        }
    }

    pub fn sample(
        group: impl Into<String>,
        content: impl Into<String>,
        title: impl Into<String>,
        start: Timestamp,
        end: Option<Timestamp>,
        y: Option<f64>,
    ) -> Self {
        Self {
            group: group.into(),
            content: content.into(),
            title: title.into(),
            start,
            end,
            kind: RecordKind::Sample { x: start, y },
            is_error: false,
        }
    }

    /// Placeholder for a chunk whose fetch failed; spans exactly `range`
    pub fn error(group: impl Into<String>, reason: impl Into<String>, range: Range, shape: LaneShape) -> Self {
        let kind = match shape {
            LaneShape::Timeline => RecordKind::Event,
            LaneShape::Graph => RecordKind::Sample {
                x: range.start(),
                y: None,
            },
        };
        Self {
            group: group.into(),
            content: reason.into(),
            title: ERROR_TITLE.to_string(),
            start: range.start(),
            end: Some(range.end()),
            kind,
            is_error: true,
        }
    }

    /// The span covered by this record; point events have zero width
    pub fn range(&self) -> Range {
        Range::between(self.start, self.end.unwrap_or(self.start))
    }

    pub fn value(&self) -> Option<f64> {
        match self.kind {
            RecordKind::Sample { y, .. } => y,
            RecordKind::Event => None,
        }
    }
}

/// Which widget a lane must be drawn with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneShape {
    Timeline,
    Graph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphStyle {
    #[default]
    Bar,
    Line,
}

/// Rendering hints a source attaches to its graph lanes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphHints {
    pub style: GraphStyle,
}

/// Rendering hints a source attaches to its timeline lanes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineHints {
    /// One row per record; unstacked records all share the top row
    pub stack: bool,
}

impl Default for TimelineHints {
    fn default() -> Self {
        Self { stack: true }
    }
}

/// Records for one lane, tagged with the shape they must be drawn in
#[derive(Debug, Clone, PartialEq)]
pub enum LaneData {
    Timeline {
        records: Vec<DisplayRecord>,
        hints: TimelineHints,
    },
    Graph {
        records: Vec<DisplayRecord>,
        hints: GraphHints,
    },
}

impl LaneData {
    pub fn empty() -> Self {
        LaneData::Timeline {
            records: Vec::new(),
            hints: TimelineHints::default(),
        }
    }

    pub fn shape(&self) -> LaneShape {
        match self {
            LaneData::Timeline { .. } => LaneShape::Timeline,
            LaneData::Graph { .. } => LaneShape::Graph,
        }
    }

    pub fn records(&self) -> &[DisplayRecord] {
        match self {
            LaneData::Timeline { records, .. } | LaneData::Graph { records, .. } => records,
        }
    }

    pub fn error_count(&self) -> usize {
        self.records().iter().filter(|r| r.is_error).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_error_record_round_trips_chunk_range() {
        let chunk = Range::new(
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();

        for shape in [LaneShape::Timeline, LaneShape::Graph] {
            let record = DisplayRecord::error("Music", "HTTP 502", chunk, shape);
            assert!(record.is_error);
            assert_eq!(record.title, ERROR_TITLE);
            assert_eq!(record.content, "HTTP 502");
            assert_eq!(record.range(), chunk);
            assert_eq!(record.value(), None);
        }
    }

    #[test]
    fn test_lane_shape_tag() {
        let graph = LaneData::Graph {
            records: vec![],
            hints: GraphHints::default(),
        };
        assert_eq!(graph.shape(), LaneShape::Graph);
        assert_eq!(LaneData::empty().shape(), LaneShape::Timeline);
        assert!(LaneData::empty().records().is_empty());
    }
}
