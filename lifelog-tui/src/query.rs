//! SQL and URL construction for Datasette query endpoints.
//!
//! Each source exposes a `with data as (...)` prefix that normalises its table
//! to `date_time`, optional `date_time_end`, `search` and `value` columns; the
//! builders here only ever query that `data` view.

use chrono::Duration;
use url::Url;

use crate::api::FetchError;
use crate::range::{Range, Timestamp};
use crate::resolution::Resolution;

/// How a source stores `date_time`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFormat {
    /// Seconds since the epoch
    #[default]
    UnixEpoch,
    /// `YYYY-MM-DD HH:MM:SS` text
    Iso,
}

/// SQL aggregate applied to `value` in summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregateFunction {
    #[default]
    Count,
    Sum,
    Avg,
}

impl AggregateFunction {
    pub fn sql(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
        }
    }
}

/// Render a bound as a SQL literal in the source's date representation
pub fn date_literal(t: Timestamp, format: DateFormat) -> String {
    match format {
        DateFormat::Iso => format!("'{}'", t.format("%Y-%m-%d %H:%M:%S")),
        DateFormat::UnixEpoch => t.timestamp().to_string(),
    }
}

pub fn escape_sql_string(s: &str) -> String {
    s.replace('\'', "''")
}

/// Smallest whole second after every instant of `[.., end]`.
///
/// Unit ends sit on `..:59.999`; both literal forms drop the fraction, so the
/// bound is rounded up to the next second to keep that final second's rows.
fn exclusive_end(end: Timestamp) -> Timestamp {
    match end.timestamp_subsec_nanos() {
        0 => end,
        nanos => end - Duration::nanoseconds(i64::from(nanos)) + Duration::seconds(1),
    }
}

fn bounds(chunk: Range, format: DateFormat) -> String {
    format!(
        "where date_time < {}\n  and date_time >= {}",
        date_literal(exclusive_end(chunk.end()), format),
        date_literal(chunk.start(), format)
    )
}

/// Raw rows for one chunk, newest first
pub fn detail_sql(base_sql: &str, chunk: Range, search: &str, format: DateFormat) -> String {
    format!(
        "{base_sql} select *\nfrom data\n{}\n  and search like '%{}%'\norder by date_time desc",
        bounds(chunk, format),
        escape_sql_string(search)
    )
}

/// Per-bucket aggregates for one chunk; `None` for [`Resolution::Detail`]
pub fn summary_sql(
    base_sql: &str,
    chunk: Range,
    search: &str,
    format: DateFormat,
    resolution: Resolution,
    aggregate: AggregateFunction,
) -> Option<String> {
    let bucket = resolution.bucket_format()?;
    let column = match format {
        DateFormat::UnixEpoch => "datetime(date_time, 'unixepoch')",
        DateFormat::Iso => "date_time",
    };
    Some(format!(
        "{base_sql} select\n  strftime('{bucket}', {column}) AS day,\n  {}(value) AS aggregate\nfrom data\n{}\n  and search like '%{}%'\ngroup by 1\norder by 1 desc",
        aggregate.sql(),
        bounds(chunk, format),
        escape_sql_string(search)
    ))
}

/// `base_api?_shape=array&sql=...`, keeping any query the base already has
pub fn query_url(base_api: &str, sql: &str) -> Result<Url, FetchError> {
    let mut url = Url::parse(base_api).map_err(|e| FetchError::InvalidUrl(format!("{base_api}: {e}")))?;
    url.query_pairs_mut()
        .append_pair("_shape", "array")
        .append_pair("sql", sql);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn chunk() -> Range {
        Range::new(
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_detail_sql_unix_bounds() {
        let sql = detail_sql("with data as (select 1)", chunk(), "", DateFormat::UnixEpoch);
        assert!(sql.starts_with("with data as (select 1) select *"));
        assert!(sql.contains("date_time < 1709251200"));
        assert!(sql.contains("date_time >= 1706745600"));
        assert!(sql.contains("search like '%%'"));
        assert!(sql.ends_with("order by date_time desc"));
    }

    #[test]
    fn test_unit_end_keeps_final_second() {
        let month = crate::range::expand_to_month(chunk());
        assert_eq!(month.end(), Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap() + Duration::milliseconds(999));

        let unix = detail_sql("", month, "", DateFormat::UnixEpoch);
        assert!(unix.contains("date_time < 1711929600"), "{unix}");
        assert!(unix.contains("date_time >= 1706745600"));

        let iso = detail_sql("", month, "", DateFormat::Iso);
        assert!(iso.contains("date_time < '2024-04-01 00:00:00'"), "{iso}");
    }

    #[test]
    fn test_summary_sql_iso_and_escaping() {
        let sql = summary_sql(
            "",
            chunk(),
            "o'brien",
            DateFormat::Iso,
            Resolution::MonthSummary,
            AggregateFunction::Avg,
        )
        .unwrap();
        assert!(sql.contains("strftime('%Y-%m-01', date_time) AS day"));
        assert!(sql.contains("avg(value) AS aggregate"));
        assert!(sql.contains("date_time < '2024-03-01 00:00:00'"));
        assert!(sql.contains("search like '%o''brien%'"));
        assert!(summary_sql("", chunk(), "", DateFormat::Iso, Resolution::Detail, AggregateFunction::Count).is_none());
    }

    #[test]
    fn test_summary_sql_unix_bucket_column() {
        let sql = summary_sql(
            "",
            chunk(),
            "",
            DateFormat::UnixEpoch,
            Resolution::DaySummary,
            AggregateFunction::Count,
        )
        .unwrap();
        assert!(sql.contains("strftime('%Y-%m-%d', datetime(date_time, 'unixepoch')) AS day"));
    }

    #[test]
    fn test_query_url_encodes_and_keeps_base_query() {
        let url = query_url("https://music.example/music.json?_json=image", "select 1+1 as two").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("_json".to_string(), "image".to_string()),
                ("_shape".to_string(), "array".to_string()),
                ("sql".to_string(), "select 1+1 as two".to_string()),
            ]
        );
        assert!(url.as_str().contains("1%2B1"));
        assert!(query_url("not a url", "select 1").is_err());
    }
}
