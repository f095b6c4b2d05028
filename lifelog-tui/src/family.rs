//! Family tree lane.
//!
//! Unlike the Datasette lanes this one is a single JSON document listing
//! every individual, fetched once and cached for a week. Each person with a
//! known birth date becomes a lifespan on the timeline.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::api::{FetchError, PagedClient, PAST_TTL};
use crate::loader::Loader;
use crate::query::DateFormat;
use crate::range::{Range, Timestamp};
use crate::records::{DisplayRecord, LaneData, LaneShape, TimelineHints};
use crate::source::parse_timestamp;

#[derive(Debug, Deserialize)]
struct FamilyDocument {
    data: FamilyData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FamilyData {
    all_individual: Individuals,
}

#[derive(Debug, Deserialize)]
struct Individuals {
    nodes: Vec<Individual>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonName {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct LifeEvent {
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Individual {
    pub id: String,
    name: PersonName,
    #[serde(default)]
    birth: Option<LifeEvent>,
    #[serde(default)]
    death: Option<LifeEvent>,
}

impl Individual {
    pub fn full_name(&self) -> &str {
        &self.name.full_name
    }

    pub fn born(&self) -> Option<Timestamp> {
        life_date(self.birth.as_ref()?.date.as_deref()?)
    }

    pub fn died(&self) -> Option<Timestamp> {
        life_date(self.death.as_ref()?.date.as_deref()?)
    }

    pub fn matches(&self, search: &str) -> bool {
        self.full_name()
            .to_lowercase()
            .contains(&search.to_lowercase())
    }
}

/// Genealogy dates are often partial: accept full timestamps, `YYYY-MM` and `YYYY`
fn life_date(raw: &str) -> Option<Timestamp> {
    if let Some(t) = parse_timestamp(&Value::String(raw.to_string()), DateFormat::Iso) {
        return Some(t);
    }
    let padded = match raw.trim().len() {
        4 => format!("{}-01-01", raw.trim()),
        7 => format!("{}-01", raw.trim()),
        _ => return None,
    };
    NaiveDate::parse_from_str(&padded, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

pub struct FamilyLoader {
    group: String,
    url: Url,
    client: PagedClient,
}

impl FamilyLoader {
    pub fn new(group: impl Into<String>, url: Url, client: PagedClient) -> Self {
        Self {
            group: group.into(),
            url,
            client,
        }
    }

    async fn individuals(&self) -> Result<Vec<Individual>, FetchError> {
        let body = self.client.fetch_json(self.url.clone(), PAST_TTL).await?;
        let document: FamilyDocument =
            serde_json::from_value(body).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(document.data.all_individual.nodes)
    }
}

#[async_trait]
impl Loader for FamilyLoader {
    fn group(&self) -> &str {
        &self.group
    }

    async fn load(&self, range: Range, search: &str) -> LaneData {
        let individuals = match self.individuals().await {
            Ok(individuals) => individuals,
            Err(e) => {
                tracing::warn!(group = %self.group, error = %e, "family tree unavailable");
                return LaneData::Timeline {
                    records: vec![DisplayRecord::error(
                        &self.group,
                        e.to_string(),
                        range,
                        LaneShape::Timeline,
                    )],
                    hints: TimelineHints::default(),
                };
            }
        };

        let records = individuals
            .iter()
            .filter(|person| person.matches(search))
            .filter_map(|person| {
                let born = person.born()?;
                Some(DisplayRecord::event(
                    &self.group,
                    person.full_name(),
                    person.full_name(),
                    born,
                    person.died(),
                ))
            })
            .collect();

        LaneData::Timeline {
            records,
            hints: TimelineHints::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::FakeTransport;
    use crate::api::FetchGate;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;

    const URL: &str = "https://family.example/individuals.json";

    fn document() -> Value {
        json!({
            "data": {"allIndividual": {"nodes": [
                {"id": "a", "name": {"fullName": "Ada Stone"},
                 "birth": {"date": "1901-04-02", "born": true},
                 "death": {"date": "1980", "died": true}},
                {"id": "b", "name": {"fullName": "Bert Stone"},
                 "birth": {"date": "1930-07", "born": true}, "death": null},
                {"id": "c", "name": {"fullName": "Cora Hill"},
                 "birth": {"date": null}, "death": null},
                {"id": "d", "name": {"fullName": "Dan Hill"}, "birth": null, "death": null}
            ]}}
        })
    }

    fn loader(transport: Arc<FakeTransport>) -> FamilyLoader {
        FamilyLoader::new(
            "Family",
            Url::parse(URL).unwrap(),
            PagedClient::new(transport, FetchGate::new(1)),
        )
    }

    fn window() -> Range {
        Range::new(
            Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_people_without_birth_dates_are_skipped() {
        let transport = Arc::new(FakeTransport::default());
        transport.serve(URL, document(), None);

        let data = loader(transport).load(window(), "").await;
        let records = data.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].content, "Ada Stone");
        assert_eq!(records[0].start, Utc.with_ymd_and_hms(1901, 4, 2, 0, 0, 0).unwrap());
        assert_eq!(records[0].end, Some(Utc.with_ymd_and_hms(1980, 1, 1, 0, 0, 0).unwrap()));
        assert_eq!(records[1].start, Utc.with_ymd_and_hms(1930, 7, 1, 0, 0, 0).unwrap());
        assert_eq!(records[1].end, None);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let transport = Arc::new(FakeTransport::default());
        transport.serve(URL, document(), None);
        let loader = loader(transport.clone());

        let data = loader.load(window(), "BERT").await;
        assert_eq!(data.records().len(), 1);
        assert_eq!(data.records()[0].title, "Bert Stone");

        assert!(loader.load(window(), "hill").await.records().is_empty());
        // document is cached after the first load
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_spans_requested_range() {
        let transport = Arc::new(FakeTransport::default());
        transport.fail(URL, FetchError::Network("connection refused".into()));

        let data = loader(transport).load(window(), "").await;
        assert_eq!(data.error_count(), 1);
        assert_eq!(data.records()[0].range(), window());
        assert_eq!(data.records()[0].content, "network error: connection refused");
    }

    #[tokio::test]
    async fn test_unexpected_document_is_a_decode_error() {
        let transport = Arc::new(FakeTransport::default());
        transport.serve(URL, json!({"data": null}), None);

        let data = loader(transport).load(window(), "").await;
        assert_eq!(data.error_count(), 1);
        assert!(data.records()[0].content.starts_with("malformed response"));
    }
}
