//! Meetup group events via the site's GraphQL persisted query.

use async_trait::async_trait;
use calsync_core::{EventRecord, EventSource, SyncError, SyncResult};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, warn};

use crate::{default_enabled, ensure_success, parse_timestamp};

pub const GQL_URL: &str = "https://www.meetup.com/gql2";
const QUERY_HASH: &str = "e1a588d73cb23d2cff73d5f6afa677d26e1e905835d084afb93ae5c456cc4812";
const PAGE_SIZE: u32 = 50;
const DEFAULT_DURATION_MINUTES: i64 = 120;

#[derive(Debug, Clone, Deserialize)]
pub struct MeetupConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Group url names, e.g. `rust-nyc`
    #[serde(default = "default_groups")]
    pub groups: Vec<String>,
}

fn default_groups() -> Vec<String> {
    [
        "fat-cat-fab-lab",
        "new-york-c-c-meetup-group",
        "papers-we-love",
        "nycultimate",
        "rust-nyc",
        "hackmanhattan",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for MeetupConfig {
    fn default() -> Self {
        MeetupConfig {
            enabled: true,
            groups: default_groups(),
        }
    }
}

pub struct MeetupSource {
    client: reqwest::Client,
    config: MeetupConfig,
    endpoint: String,
}

impl MeetupSource {
    pub fn new(client: reqwest::Client, config: MeetupConfig) -> Self {
        MeetupSource {
            client,
            config,
            endpoint: GQL_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn fetch_group(&self, group: &str, after: DateTime<Utc>) -> SyncResult<Vec<EventRecord>> {
        let body = json!({
            "operationName": "getUpcomingGroupEvents",
            "variables": {
                "urlname": group,
                "afterDateTime": after.to_rfc3339(),
                "first": PAGE_SIZE,
            },
            "extensions": {
                "persistedQuery": {
                    "version": 1,
                    "sha256Hash": QUERY_HASH,
                }
            }
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::source_failed("meetup", e))?;
        let response = ensure_success(response, "meetup", &format!("Group '{}'", group)).await?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| SyncError::source_failed("meetup", e))?;

        Ok(parse_group_events(&payload, group))
    }
}

#[async_trait]
impl EventSource for MeetupSource {
    fn identifier(&self) -> &str {
        "meetup"
    }

    async fn fetch(&self, horizon_days: u32) -> SyncResult<Vec<EventRecord>> {
        let now = Utc::now();
        let until = now + Duration::days(i64::from(horizon_days));
        let mut records = Vec::new();

        for group in &self.config.groups {
            match self.fetch_group(group, now).await {
                Ok(events) => {
                    debug!(group = %group, count = events.len(), "Fetched Meetup group");
                    records.extend(events);
                }
                Err(e) => error!(group = %group, error = %e, "Failed to fetch Meetup group"),
            }
        }

        Ok(crate::within(records, now, until))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeetupEvent {
    id: Value,
    title: String,
    date_time: String,
    duration: Option<Value>,
    description: Option<String>,
    venue: Option<Venue>,
    event_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Venue {
    name: Option<String>,
    address: Option<String>,
    city: Option<String>,
    state: Option<String>,
}

impl Venue {
    fn display(&self) -> String {
        [&self.name, &self.address, &self.city, &self.state]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Records from one `getUpcomingGroupEvents` response. Malformed edges are
/// logged and skipped.
pub fn parse_group_events(payload: &Value, group: &str) -> Vec<EventRecord> {
    let edges = payload
        .pointer("/data/groupByUrlname/events/edges")
        .and_then(Value::as_array);

    let Some(edges) = edges else {
        warn!(group, "Meetup response has no events");
        return Vec::new();
    };

    edges
        .iter()
        .filter_map(|edge| {
            let node = edge.get("node")?;
            match record_from_node(node) {
                Ok(record) => Some(record),
                Err(e) => {
                    error!(group, error = %e, "Error parsing Meetup event");
                    None
                }
            }
        })
        .collect()
}

fn record_from_node(node: &Value) -> SyncResult<EventRecord> {
    let event: MeetupEvent = serde_json::from_value(node.clone())
        .map_err(|e| SyncError::Parse(format!("Unexpected Meetup event shape: {}", e)))?;

    let start = parse_timestamp(&event.date_time)
        .ok_or_else(|| SyncError::Parse(format!("Invalid Meetup dateTime '{}'", event.date_time)))?;
    let minutes = event
        .duration
        .as_ref()
        .and_then(duration_minutes)
        .unwrap_or(DEFAULT_DURATION_MINUTES);
    let end = start + Duration::minutes(minutes);

    let id = match &event.id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    Ok(EventRecord::new(event.title, start, end)?
        .with_description(event.description)
        .with_location(event.venue.as_ref().map(Venue::display))
        .with_url(event.event_url)
        .with_confirmed(false)
        .with_source("meetup".to_string(), id))
}

/// Duration as minutes, given either a number of minutes or an ISO 8601
/// duration such as `PT1H30M`.
fn duration_minutes(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    let iso = value.as_str()?.strip_prefix("PT")?;

    let mut minutes = 0;
    let mut digits = String::new();
    for c in iso.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: i64 = digits.parse().ok()?;
        digits.clear();
        match c {
            'H' => minutes += n * 60,
            'M' => minutes += n,
            'S' => minutes += n / 60,
            _ => return None,
        }
    }
    digits.is_empty().then_some(minutes)
}
