//! Chunked fetch orchestration.
//!
//! A load picks a resolution for the window, expands and tiles it into
//! calendar chunks, fetches every chunk concurrently and reassembles the
//! rows in chunk order. Each chunk settles on its own: a failed chunk turns
//! into a single error record spanning it and never affects its siblings.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::{ttl_for, FetchError, PagedClient};
use crate::query::{detail_sql, query_url, summary_sql};
use crate::range::{add_unit, cap_now, Range, Timestamp};
use crate::records::{DisplayRecord, LaneData, LaneShape};
use crate::resolution::{select_resolution, Resolution, Selection};
use crate::source::{DetailRow, SourceDescriptor, SummaryRow};

/// Produces the records of one lane for a window and search text
#[async_trait]
pub trait Loader: Send + Sync {
    fn group(&self) -> &str;
    async fn load(&self, range: Range, search: &str) -> LaneData;
}

/// Loader for any source exposed through a Datasette `sql=` endpoint
#[derive(Clone)]
pub struct DatasetteLoader {
    source: Arc<SourceDescriptor>,
    client: PagedClient,
    clock: fn() -> Timestamp,
}

impl DatasetteLoader {
    pub fn new(source: Arc<SourceDescriptor>, client: PagedClient) -> Self {
        Self {
            source,
            client,
            clock: Utc::now,
        }
    }

    /// Replace the wall clock used for open-ended spans and cache hints
    pub fn with_clock(mut self, clock: fn() -> Timestamp) -> Self {
        self.clock = clock;
        self
    }

    pub fn source(&self) -> &SourceDescriptor {
        &self.source
    }

    async fn fetch_chunk(
        &self,
        chunk: Range,
        search: &str,
        resolution: Resolution,
        shape: LaneShape,
        now: Timestamp,
    ) -> Result<Vec<DisplayRecord>, FetchError> {
        let source = &self.source;
        if !chunk.intersects(source.start, source.data_end(now)) {
            tracing::trace!(group = %source.group, %chunk, "chunk outside data span, skipped");
            return Ok(Vec::new());
        }

        let sql = match summary_sql(
            &source.base_sql,
            chunk,
            search,
            source.date_format,
            resolution,
            source.aggregate,
        ) {
            Some(sql) => sql,
            None => detail_sql(&source.base_sql, chunk, search, source.date_format),
        };
        let url = query_url(&source.base_api, &sql)?;

        tracing::debug!(group = %source.group, %resolution, %chunk, "fetching chunk");
        let rows = self.client.fetch_all_pages(url, ttl_for(chunk, now)).await?;

        match resolution.bucket() {
            Some(_) => Ok(decode::<SummaryRow>(rows)?
                .iter()
                .filter_map(|row| self.summary_record(row, resolution, now))
                .collect()),
            None => Ok(decode::<DetailRow>(rows)?
                .iter()
                .filter_map(|row| self.detail_record(row, shape))
                .collect()),
        }
    }

    fn detail_record(&self, row: &DetailRow, shape: LaneShape) -> Option<DisplayRecord> {
        let source = &self.source;
        let Some(start) = row.start(source.date_format) else {
            tracing::warn!(group = %source.group, date_time = %row.date_time, "skipping row with unreadable timestamp");
            return None;
        };
        let end = row.end(source.date_format);
        let content = source.formatter.detail_content(row, source);
        let title = source.formatter.detail_title(row, source);

        Some(match shape {
            LaneShape::Timeline => DisplayRecord::event(&source.group, content, title, start, end),
            LaneShape::Graph => DisplayRecord::sample(&source.group, content, title, start, end, row.value),
        })
    }

    fn summary_record(&self, row: &SummaryRow, resolution: Resolution, now: Timestamp) -> Option<DisplayRecord> {
        let source = &self.source;
        let bucket = resolution.bucket()?;
        let Some(start) = row.start() else {
            tracing::warn!(group = %source.group, day = %row.day, "skipping bucket with unreadable day");
            return None;
        };
        let period = start.format(resolution.period_label_format()).to_string();
        let end = cap_now(add_unit(start, bucket), now);

        Some(DisplayRecord::sample(
            &source.group,
            source.formatter.summary_content(row, &period, source),
            source.formatter.summary_title(row, &period, source),
            start,
            Some(end),
            row.aggregate,
        ))
    }
}

fn decode<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, FetchError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(|e| FetchError::Decode(e.to_string())))
        .collect()
}

#[async_trait]
impl Loader for DatasetteLoader {
    fn group(&self) -> &str {
        &self.source.group
    }

    async fn load(&self, range: Range, search: &str) -> LaneData {
        let now = (self.clock)();
        let source = &self.source;

        let resolution = match select_resolution(range, source.start, source.data_end(now)) {
            Selection::Empty => {
                tracing::debug!(group = %source.group, %range, "window outside data span");
                return LaneData::empty();
            }
            Selection::Fetch(resolution) => resolution,
        };

        let chunks = resolution.plan(source.detail_plan).chunks(range);
        let shape = if resolution.is_summary() {
            LaneShape::Graph
        } else {
            source.detail_shape
        };

        let results = join_all(
            chunks
                .iter()
                .map(|chunk| self.fetch_chunk(*chunk, search, resolution, shape, now)),
        )
        .await;

        let mut records = Vec::new();
        for (chunk, result) in chunks.iter().zip(results) {
            match result {
                Ok(mut chunk_records) => records.append(&mut chunk_records),
                Err(e) => {
                    tracing::warn!(group = %source.group, %chunk, error = %e, "chunk failed");
                    records.push(DisplayRecord::error(&source.group, e.to_string(), *chunk, shape));
                }
            }
        }

        tracing::debug!(
            group = %source.group,
            %resolution,
            chunks = chunks.len(),
            records = records.len(),
            "lane loaded"
        );

        match shape {
            LaneShape::Timeline => LaneData::Timeline {
                records,
                hints: source.timeline,
            },
            LaneShape::Graph => LaneData::Graph {
                records,
                hints: source.graph,
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::tests::FakeTransport;
    use crate::api::{with_ttl, FetchGate};
    use crate::query::DateFormat;
    use crate::range::Interval;
    use crate::records::{GraphStyle, RecordKind};
    use crate::source::RecordFormatter;
    use chrono::TimeZone;
    use serde_json::json;

    pub(crate) struct PlainFormatter;

    impl RecordFormatter for PlainFormatter {
        fn detail_content(&self, detail: &DetailRow, _source: &SourceDescriptor) -> String {
            detail.text("title").unwrap_or_default().to_string()
        }
        fn detail_title(&self, detail: &DetailRow, _source: &SourceDescriptor) -> String {
            detail.text("title").unwrap_or_default().to_string()
        }
        fn summary_content(&self, summary: &SummaryRow, period: &str, _source: &SourceDescriptor) -> String {
            format!("{} during {period}", summary.aggregate_label())
        }
        fn summary_title(&self, summary: &SummaryRow, _period: &str, _source: &SourceDescriptor) -> String {
            summary.aggregate_label()
        }
    }

    const BASE: &str = "https://api.example/db.json";

    fn at(y: i32, m: u32, d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn fixed_now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn source(start: Timestamp) -> SourceDescriptor {
        SourceDescriptor::new("Read", BASE, "with data as (select 1)", start, Arc::new(PlainFormatter))
    }

    fn loader(source: SourceDescriptor, transport: Arc<FakeTransport>) -> DatasetteLoader {
        DatasetteLoader::new(Arc::new(source), PagedClient::new(transport, FetchGate::new(4)))
            .with_clock(fixed_now)
    }

    /// The exact URL the loader requests for `chunk`
    fn chunk_url(source: &SourceDescriptor, chunk: Range, resolution: Resolution) -> String {
        let sql = summary_sql(
            &source.base_sql,
            chunk,
            "",
            source.date_format,
            resolution,
            source.aggregate,
        )
        .unwrap_or_else(|| detail_sql(&source.base_sql, chunk, "", source.date_format));
        with_ttl(query_url(&source.base_api, &sql).unwrap(), ttl_for(chunk, fixed_now())).to_string()
    }

    #[tokio::test]
    async fn test_range_before_source_start_issues_no_requests() {
        let transport = Arc::new(FakeTransport::default());
        let loader = loader(source(at(2020, 1, 1)), transport.clone());

        let data = loader
            .load(Range::new(at(2015, 1, 1), at(2015, 1, 3)).unwrap(), "")
            .await;

        assert_eq!(data, LaneData::empty());
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_chunk_becomes_one_error_record() {
        let transport = Arc::new(FakeTransport::default());
        let src = source(at(2012, 10, 1));
        let window = Range::new(at(2024, 1, 15), at(2024, 3, 10)).unwrap();
        let chunks = Resolution::DaySummary.plan(src.detail_plan).chunks(window);
        assert_eq!(chunks.len(), 3);

        transport.serve(
            &chunk_url(&src, chunks[0], Resolution::DaySummary),
            json!([{"day": "2024-01-20", "aggregate": 3}, {"day": "2024-01-02", "aggregate": 1}]),
            None,
        );
        transport.fail(
            &chunk_url(&src, chunks[1], Resolution::DaySummary),
            FetchError::Status {
                status: 502,
                body: "bad gateway".into(),
            },
        );
        transport.serve(
            &chunk_url(&src, chunks[2], Resolution::DaySummary),
            json!([{"day": "2024-03-05", "aggregate": 2}]),
            None,
        );

        let data = loader(src, transport.clone()).load(window, "").await;

        assert_eq!(transport.request_count(), 3);
        assert_eq!(data.shape(), LaneShape::Graph);
        let records = data.records();
        assert_eq!(records.len(), 4);
        assert_eq!(data.error_count(), 1);

        assert_eq!(records[0].start, at(2024, 1, 20));
        assert_eq!(records[0].end, Some(at(2024, 1, 21)));
        assert_eq!(records[0].value(), Some(3.0));
        assert_eq!(records[0].content, "3 during 20 Jan 24");
        assert_eq!(records[1].start, at(2024, 1, 2));

        let error = &records[2];
        assert!(error.is_error);
        assert_eq!(error.range(), chunks[1]);
        assert_eq!(error.content, "HTTP 502: bad gateway");
        assert_eq!(error.kind, RecordKind::Sample { x: chunks[1].start(), y: None });

        assert_eq!(records[3].start, at(2024, 3, 5));
    }

    #[tokio::test]
    async fn test_chunks_outside_span_are_skipped() {
        let transport = Arc::new(FakeTransport::default());
        let loader = loader(source(at(2024, 2, 10)), transport.clone());

        let data = loader
            .load(Range::new(at(2024, 1, 15), at(2024, 3, 10)).unwrap(), "")
            .await;

        assert_eq!(data.error_count(), 0);
        // January ends before the data starts
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_summary_end_is_capped_at_now() {
        let transport = Arc::new(FakeTransport::default());
        let src = source(at(2012, 10, 1));
        let window = Range::new(at(2023, 1, 1), at(2024, 6, 1)).unwrap();
        let chunks = Resolution::MonthSummary.plan(src.detail_plan).chunks(window);
        assert_eq!(chunks.len(), 2);

        transport.serve(
            &chunk_url(&src, chunks[1], Resolution::MonthSummary),
            json!([{"day": "2024-06-01", "aggregate": 40}]),
            None,
        );

        let data = loader(src, transport).load(window, "").await;
        let records = data.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].end, Some(fixed_now()));
        assert_eq!(records[0].title, "40");
    }

    #[tokio::test]
    async fn test_detail_rows_as_graph_samples() {
        let transport = Arc::new(FakeTransport::default());
        let src = source(at(2016, 6, 1))
            .date_format(DateFormat::Iso)
            .detail_plan(Interval::Day, Interval::Hour)
            .graph_detail(GraphStyle::Line);
        let window = Range::new(
            Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 9, 13, 0, 0).unwrap(),
        )
        .unwrap();
        let chunks = Resolution::Detail.plan(src.detail_plan).chunks(window);
        assert_eq!(chunks.len(), 24);

        transport.serve(
            &chunk_url(&src, chunks[11], Resolution::Detail),
            json!([
                {"date_time": "2024-03-09 11:30:00", "value": 72},
                {"date_time": "not a time", "value": 80}
            ]),
            None,
        );

        let data = loader(src, transport.clone()).load(window, "").await;

        assert_eq!(transport.request_count(), 24);
        let LaneData::Graph { records, hints } = data else {
            panic!("expected a graph lane");
        };
        assert_eq!(hints.style, GraphStyle::Line);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value(), Some(72.0));
        assert_eq!(records[0].start, Utc.with_ymd_and_hms(2024, 3, 9, 11, 30, 0).unwrap());
    }

    #[tokio::test]
    async fn test_detail_rows_as_timeline_events() {
        let transport = Arc::new(FakeTransport::default());
        let src = source(at(2012, 10, 1));
        let window = Range::new(at(2024, 3, 8), at(2024, 3, 10)).unwrap();
        let chunks = Resolution::Detail.plan(src.detail_plan).chunks(window);
        assert_eq!(chunks.len(), 1);

        transport.serve(
            &chunk_url(&src, chunks[0], Resolution::Detail),
            json!([{"date_time": 1709994600, "date_time_end": 1709994900, "title": "Song"}]),
            None,
        );

        let data = loader(src, transport).load(window, "").await;
        assert_eq!(data.shape(), LaneShape::Timeline);
        let records = data.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, RecordKind::Event);
        assert_eq!(records[0].title, "Song");
        assert!(records[0].end.is_some());
    }

    #[tokio::test]
    async fn test_non_object_rows_fail_the_chunk() {
        let transport = Arc::new(FakeTransport::default());
        let src = source(at(2012, 10, 1));
        let window = Range::new(at(2024, 3, 8), at(2024, 3, 10)).unwrap();
        let chunk = Resolution::Detail.plan(src.detail_plan).chunks(window)[0];
        transport.serve(&chunk_url(&src, chunk, Resolution::Detail), json!([1, 2]), None);

        let data = loader(src, transport).load(window, "").await;
        assert_eq!(data.records().len(), 1);
        assert!(data.records()[0].content.starts_with("malformed response"));
        assert_eq!(data.records()[0].range(), chunk);
    }
}
