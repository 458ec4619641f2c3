//! Eventbrite organizer events.
//!
//! Event ids are scraped from each organizer page's embedded server data,
//! then resolved in one call to the destination API.

use async_trait::async_trait;
use calsync_core::{EventRecord, EventSource, SyncError, SyncResult};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::{default_enabled, ensure_success, parse_timestamp};

pub const SITE_URL: &str = "https://www.eventbrite.com";
const DESTINATION_PATH: &str = "/api/v3/destination/events/";
const EXPAND: &str =
    "event_sales_status,image,primary_venue,saves,series,ticket_availability,primary_organizer";
const DEFAULT_TIMEZONE: &str = "America/New_York";

#[derive(Debug, Clone, Deserialize)]
pub struct EventbriteConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_organizers")]
    pub organizer_ids: Vec<String>,
}

fn default_organizers() -> Vec<String> {
    vec![
        "29377900795".to_string(), // Project Nutype
        "86136754923".to_string(), // Lectures on Tap
    ]
}

impl Default for EventbriteConfig {
    fn default() -> Self {
        EventbriteConfig {
            enabled: true,
            organizer_ids: default_organizers(),
        }
    }
}

pub struct EventbriteSource {
    client: reqwest::Client,
    config: EventbriteConfig,
    site_url: String,
}

impl EventbriteSource {
    pub fn new(client: reqwest::Client, config: EventbriteConfig) -> Self {
        EventbriteSource {
            client,
            config,
            site_url: SITE_URL.to_string(),
        }
    }

    pub fn with_site_url(mut self, site_url: impl Into<String>) -> Self {
        self.site_url = site_url.into();
        self
    }

    async fn organizer_event_ids(&self, organizer_id: &str) -> SyncResult<Vec<String>> {
        let url = format!("{}/o/{}", self.site_url, organizer_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SyncError::source_failed("eventbrite", e))?;
        let response =
            ensure_success(response, "eventbrite", &format!("Organizer page {}", organizer_id)).await?;
        let html = response
            .text()
            .await
            .map_err(|e| SyncError::source_failed("eventbrite", e))?;

        parse_organizer_page(&html)
    }

    async fn event_details(&self, event_ids: &[String]) -> SyncResult<Vec<Value>> {
        let referer = self
            .config
            .organizer_ids
            .first()
            .map(|id| format!("{}/o/{}", self.site_url, id))
            .unwrap_or_else(|| self.site_url.clone());

        let response = self
            .client
            .get(format!("{}{}", self.site_url, DESTINATION_PATH))
            .query(&[
                ("event_ids", event_ids.join(",").as_str()),
                ("expand", EXPAND),
                ("page_size", "50"),
                ("include_parent_events", "true"),
            ])
            .header("Accept-Language", "en-US")
            .header("Accept", "*/*")
            .header("Referer", referer)
            .send()
            .await
            .map_err(|e| SyncError::source_failed("eventbrite", e))?;
        let response = ensure_success(response, "eventbrite", "Event details").await?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| SyncError::source_failed("eventbrite", e))?;

        Ok(payload
            .get("events")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl EventSource for EventbriteSource {
    fn identifier(&self) -> &str {
        "eventbrite"
    }

    async fn fetch(&self, horizon_days: u32) -> SyncResult<Vec<EventRecord>> {
        let mut event_ids = Vec::new();
        for organizer_id in &self.config.organizer_ids {
            match self.organizer_event_ids(organizer_id).await {
                Ok(ids) => {
                    debug!(organizer = %organizer_id, count = ids.len(), "Found Eventbrite events");
                    event_ids.extend(ids);
                }
                Err(e) => error!(organizer = %organizer_id, error = %e, "Failed to read organizer page"),
            }
        }

        if event_ids.is_empty() {
            return Ok(Vec::new());
        }

        let details = self.event_details(&event_ids).await?;
        let now = Utc::now();
        Ok(parse_event_details(&details, now, now + Duration::days(i64::from(horizon_days))))
    }
}

/// Future event ids from an organizer page's `window.__SERVER_DATA__`.
pub fn parse_organizer_page(html: &str) -> SyncResult<Vec<String>> {
    let re = Regex::new(r"(?s)window\.__SERVER_DATA__\s*=\s*(\{.*?\});")
        .map_err(|e| SyncError::Parse(e.to_string()))?;

    let Some(captures) = re.captures(html) else {
        warn!("Organizer page has no embedded server data");
        return Ok(Vec::new());
    };

    let data: Value = serde_json::from_str(&captures[1])
        .map_err(|e| SyncError::Parse(format!("Invalid organizer server data: {}", e)))?;

    let ids = data
        .pointer("/view_data/events/future_events")
        .and_then(Value::as_array)
        .map(|events| {
            events
                .iter()
                .filter_map(|event| match event.get("id")? {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ids)
}

#[derive(Debug, Deserialize)]
struct EventbriteEvent {
    id: String,
    name: String,
    summary: Option<String>,
    url: Option<String>,
    timezone: Option<String>,
    start_date: Option<String>,
    start_time: Option<String>,
    end_date: Option<String>,
    end_time: Option<String>,
    primary_venue: Option<Venue>,
    series: Option<Series>,
}

#[derive(Debug, Deserialize)]
struct Venue {
    name: Option<String>,
    address: Option<Address>,
}

#[derive(Debug, Deserialize)]
struct Address {
    localized_address_display: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    next_dates: Vec<SeriesDate>,
}

#[derive(Debug, Deserialize)]
struct SeriesDate {
    id: String,
    start: String,
    end: String,
}

impl Venue {
    fn display(&self) -> Option<String> {
        let name = self.name.as_deref().unwrap_or_default();
        let address = self
            .address
            .as_ref()
            .and_then(|a| a.localized_address_display.as_deref())
            .unwrap_or_default();
        let joined = format!("{}, {}", name, address);
        let trimmed = joined.trim_matches(|c| c == ',' || c == ' ');
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// Records for every event (and every upcoming series occurrence) starting
/// within `[from, to]`.
pub fn parse_event_details(events: &[Value], from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<EventRecord> {
    let mut records = Vec::new();

    for raw in events {
        let event: EventbriteEvent = match serde_json::from_value(raw.clone()) {
            Ok(event) => event,
            Err(e) => {
                error!(error = %e, "Error parsing Eventbrite event");
                continue;
            }
        };

        let occurrences = match &event.series {
            Some(series) if !series.next_dates.is_empty() => series_occurrences(&event, series),
            _ => single_occurrence(&event).map(|r| vec![r]),
        };

        match occurrences {
            Ok(found) => records.extend(found),
            Err(e) => error!(event = %event.id, error = %e, "Error parsing Eventbrite event"),
        }
    }

    crate::within(records, from, to)
}

fn series_occurrences(event: &EventbriteEvent, series: &Series) -> SyncResult<Vec<EventRecord>> {
    series
        .next_dates
        .iter()
        .map(|date| {
            let start = parse_timestamp(&date.start)
                .ok_or_else(|| SyncError::Parse(format!("Invalid series start '{}'", date.start)))?;
            let end = parse_timestamp(&date.end)
                .ok_or_else(|| SyncError::Parse(format!("Invalid series end '{}'", date.end)))?;
            build_record(event, start, end, date.id.clone())
        })
        .collect()
}

fn single_occurrence(event: &EventbriteEvent) -> SyncResult<EventRecord> {
    let tz_name = event.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE);
    let tz: Tz = tz_name
        .parse()
        .map_err(|_| SyncError::Parse(format!("Unknown timezone '{}'", tz_name)))?;

    let start = local_datetime(tz, event.start_date.as_deref(), event.start_time.as_deref())?;
    let end = local_datetime(tz, event.end_date.as_deref(), event.end_time.as_deref())?;
    build_record(event, start, end, event.id.clone())
}

fn local_datetime(tz: Tz, date: Option<&str>, time: Option<&str>) -> SyncResult<DateTime<Utc>> {
    let (Some(date), Some(time)) = (date, time) else {
        return Err(SyncError::Parse("Missing start/end date or time".to_string()));
    };
    let naive = NaiveDateTime::parse_from_str(&format!("{}T{}", date, time), "%Y-%m-%dT%H:%M")
        .map_err(|e| SyncError::Parse(format!("Invalid datetime {} {}: {}", date, time, e)))?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| SyncError::Parse(format!("Nonexistent local time {} {}", date, time)))
}

fn build_record(
    event: &EventbriteEvent,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    source_id: String,
) -> SyncResult<EventRecord> {
    Ok(EventRecord::new(event.name.clone(), start, end)?
        .with_description(event.summary.clone())
        .with_location(event.primary_venue.as_ref().and_then(Venue::display))
        .with_url(event.url.clone())
        .with_confirmed(false)
        .with_source("eventbrite".to_string(), source_id))
}
