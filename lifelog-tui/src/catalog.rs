//! The lanes the dashboard knows about.
//!
//! Each lane is a [`Loader`]; Datasette lanes are described by a
//! [`SourceDescriptor`] plus a formatter, the family tree has its own loader.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{TimeZone, Utc};
use url::Url;

use crate::api::PagedClient;
use crate::family::FamilyLoader;
use crate::loader::{DatasetteLoader, Loader};
use crate::query::{AggregateFunction, DateFormat};
use crate::range::{Interval, Range, Timestamp};
use crate::records::{GraphStyle, LaneData};
use crate::source::{DetailRow, RecordFormatter, SourceDescriptor, SummaryRow};
use crate::view::ViewRequest;

const READ_API: &str = "https://api-read.jamesst.one/readingList.json";
const MUSIC_API: &str = "https://lastfm.jamesst.one/music.json?_json=image&_json=image:1";
const GARMIN_API: &str = "https://garmin.jamesst.one/garmin.json";
const GARMIN_MONITORING_API: &str = "https://garmin.jamesst.one/garmin_monitoring.json";
const WAKATIME_API: &str = "https://wakatime.jamesst.one/wakatime.json";
const FAMILY_API: &str = "https://family.jamesst.one/individualsAPI.json";

/// Languages with their own coding-time lane
pub const LANGUAGES: [&str; 4] = ["JavaScript", "TypeScript", "SQL", "Java"];

/// A completed load, tagged with the view it was requested for
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub request: ViewRequest,
    pub data: LaneData,
}

fn first_of(year: i32, month: u32) -> Timestamp {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

fn epoch(secs: i64) -> Timestamp {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

/// Reading list: articles saved, with their titles
pub struct ReadFormatter;

impl RecordFormatter for ReadFormatter {
    fn detail_content(&self, detail: &DetailRow, _source: &SourceDescriptor) -> String {
        detail.text("title").unwrap_or_default().chars().take(30).collect()
    }

    fn detail_title(&self, detail: &DetailRow, _source: &SourceDescriptor) -> String {
        detail.text("title").unwrap_or_default().to_string()
    }

    fn summary_content(&self, summary: &SummaryRow, period: &str, _source: &SourceDescriptor) -> String {
        format!("Read {} articles during {period}", summary.aggregate_label())
    }

    fn summary_title(&self, summary: &SummaryRow, _period: &str, _source: &SourceDescriptor) -> String {
        format!("Read {}", summary.aggregate_label())
    }
}

/// Last.fm scrobbles: track then artist
pub struct MusicFormatter;

impl RecordFormatter for MusicFormatter {
    fn detail_content(&self, detail: &DetailRow, _source: &SourceDescriptor) -> String {
        match (detail.text("name"), detail.text("name:1")) {
            (Some(track), Some(artist)) => format!("{track} · {artist}"),
            (Some(track), None) => track.to_string(),
            _ => "Unknown track".to_string(),
        }
    }

    fn detail_title(&self, detail: &DetailRow, _source: &SourceDescriptor) -> String {
        detail.text("name").unwrap_or("Unknown track").to_string()
    }

    fn summary_content(&self, summary: &SummaryRow, period: &str, _source: &SourceDescriptor) -> String {
        format!("Listened to {} songs during {period}", summary.aggregate_label())
    }

    fn summary_title(&self, summary: &SummaryRow, _period: &str, _source: &SourceDescriptor) -> String {
        format!("Listened: {}", summary.aggregate_label())
    }
}

/// Numeric series (biometrics, coding time) labelled with a unit
pub struct MetricFormatter {
    pub unit: &'static str,
}

impl MetricFormatter {
    fn value(&self, value: Option<f64>) -> String {
        match value {
            Some(v) if v.fract() == 0.0 => format!("{}{}", v as i64, self.unit),
            Some(v) => format!("{v:.1}{}", self.unit),
            None => "–".to_string(),
        }
    }
}

impl RecordFormatter for MetricFormatter {
    fn detail_content(&self, detail: &DetailRow, source: &SourceDescriptor) -> String {
        let at = detail
            .start(source.date_format)
            .map(|t| t.format(" at %-d %b %y %H:%M").to_string())
            .unwrap_or_default();
        format!("{} {}{at}", source.group, self.value(detail.value))
    }

    fn detail_title(&self, detail: &DetailRow, source: &SourceDescriptor) -> String {
        format!("{}: {}", source.group, self.value(detail.value))
    }

    fn summary_content(&self, summary: &SummaryRow, period: &str, source: &SourceDescriptor) -> String {
        format!(
            "{} {} ({}) during {period}",
            source.group,
            self.value(summary.aggregate),
            source.aggregate.sql()
        )
    }

    fn summary_title(&self, summary: &SummaryRow, _period: &str, source: &SourceDescriptor) -> String {
        format!("{}: {}", source.group, self.value(summary.aggregate))
    }
}

pub fn read_source() -> SourceDescriptor {
    SourceDescriptor::new(
        "Read",
        READ_API,
        "with data as (select
    unixepoch(date) as date_time,
    title || ' ' || description as search,
    1 as value,
    title as title
  from read)",
        first_of(2012, 10),
        Arc::new(ReadFormatter),
    )
}

pub fn music_source() -> SourceDescriptor {
    SourceDescriptor::new(
        "Music",
        MUSIC_API,
        "with data as (select
    date_uts as date_time,
    case when avg_estimated_duration is null then date_uts + 5 * 60
         else date_uts + avg_estimated_duration end as date_time_end,
    name || ' ' || \"name:2\" as search,
    1 as value,
    *
  from listen_details)",
        first_of(2012, 10),
        Arc::new(MusicFormatter),
    )
    .unstacked()
}

/// Garmin series: ISO timestamps, hourly detail chunks, drawn as lines
fn garmin_source(
    group: &str,
    base_api: &str,
    base_sql: &str,
    start: Timestamp,
    aggregate: AggregateFunction,
    unit: &'static str,
) -> SourceDescriptor {
    SourceDescriptor::new(group, base_api, base_sql, start, Arc::new(MetricFormatter { unit }))
        .date_format(DateFormat::Iso)
        .aggregate(aggregate)
        .detail_plan(Interval::Day, Interval::Hour)
        .graph_detail(GraphStyle::Line)
}

pub fn heart_rate_source() -> SourceDescriptor {
    garmin_source(
        "Heart rate",
        GARMIN_MONITORING_API,
        "with data as (select
    timestamp as date_time,
    'heart_rate' as search,
    hr.heart_rate as value
  from monitoring_hr hr)",
        epoch(1_464_933_600 - 1),
        AggregateFunction::Avg,
        " bpm",
    )
}

pub fn stress_level_source() -> SourceDescriptor {
    garmin_source(
        "Stress level",
        GARMIN_API,
        "with data as (select
    timestamp as date_time,
    'stress_level' as search,
    case when stress <= 0 then null else stress end as value
  from stress)",
        epoch(1_506_186_180 - 1),
        AggregateFunction::Avg,
        "",
    )
}

pub fn steps_source() -> SourceDescriptor {
    garmin_source(
        "Steps",
        GARMIN_MONITORING_API,
        "with data as (select
    timestamp as date_time,
    'steps' as search,
    case when steps is null then 0 else steps end as value
  from monitoring)",
        epoch(1_506_186_180 - 1),
        AggregateFunction::Sum,
        " steps",
    )
}

/// Daily WakaTime totals for one language column
pub fn language_source(language: &str) -> SourceDescriptor {
    let base_sql = format!(
        "with data as (select
    unixepoch(date) as date_time,
    unixepoch(date, '+1 day') as date_time_end,
    '{language}' as search,
    \"{language}\" as value
  from languages
  where \"{language}\" is not null)"
    );
    SourceDescriptor::new(
        language,
        WAKATIME_API,
        base_sql,
        first_of(2019, 3),
        Arc::new(MetricFormatter { unit: " s" }),
    )
    .aggregate(AggregateFunction::Sum)
    .graph_detail(GraphStyle::Line)
}

/// Every lane, in display order
#[derive(Clone)]
pub struct Catalog {
    loaders: Vec<Arc<dyn Loader>>,
}

impl Catalog {
    pub fn new(loaders: Vec<Arc<dyn Loader>>) -> Self {
        Self { loaders }
    }

    /// The full dashboard, all lanes sharing `client`'s gate and cache
    pub fn standard(client: PagedClient) -> Result<Self> {
        let mut sources = vec![
            read_source(),
            music_source(),
            heart_rate_source(),
            stress_level_source(),
            steps_source(),
        ];
        sources.extend(LANGUAGES.iter().map(|language| language_source(language)));

        let mut loaders: Vec<Arc<dyn Loader>> = sources
            .into_iter()
            .map(|source| {
                Arc::new(DatasetteLoader::new(Arc::new(source), client.clone())) as Arc<dyn Loader>
            })
            .collect();

        let family_url = Url::parse(FAMILY_API).context("Failed to parse family tree URL")?;
        loaders.push(Arc::new(FamilyLoader::new("Family", family_url, client)));

        Ok(Self::new(loaders))
    }

    /// Keep only `groups`, in the order given
    pub fn only(self, groups: &[String]) -> Result<Self> {
        let loaders = groups
            .iter()
            .map(|group| {
                self.loader(group)
                    .ok_or_else(|| anyhow!("Unknown lane '{group}' (known: {})", self.groups().join(", ")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(loaders))
    }

    pub fn groups(&self) -> Vec<&str> {
        self.loaders.iter().map(|loader| loader.group()).collect()
    }

    pub fn loader(&self, group: &str) -> Option<Arc<dyn Loader>> {
        self.loaders
            .iter()
            .find(|loader| loader.group() == group)
            .cloned()
    }

    /// Records for `group` over `range`, filtered by `search`
    pub async fn load(&self, group: &str, range: Range, search: &str) -> Result<LaneData> {
        let loader = self
            .loader(group)
            .with_context(|| format!("No lane named '{group}'"))?;
        Ok(loader.load(range, search).await)
    }

    /// Serve a lane request, keeping the request alongside its data
    pub async fn run(&self, request: ViewRequest) -> Result<LoadOutcome> {
        let data = self.load(&request.group, request.range, &request.search).await?;
        Ok(LoadOutcome { request, data })
    }
}
