//! Partiful RSVPs for the configured account.
//!
//! Authenticates with a long-lived Firebase refresh token, then lists every
//! event the account has responded to. Going means confirmed.

use async_trait::async_trait;
use calsync_core::ics::parse_records;
use calsync_core::{EventRecord, EventSource, SyncError, SyncResult};
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{default_enabled, ensure_success, parse_timestamp};

pub const API_URL: &str = "https://api.partiful.com/getMyRsvps";
pub const TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";
const FIREBASE_APP_ID: &str = "1:939741910890:web:5cca435c4b26209b8a7713";
const DEFAULT_DURATION_HOURS: i64 = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct PartifulConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub refresh_token: Option<String>,
    /// Firebase web API key
    pub api_key: Option<String>,
    /// Import each event's own calendar file instead of the RSVP fields
    #[serde(default)]
    pub use_calendar_files: bool,
}

impl Default for PartifulConfig {
    fn default() -> Self {
        PartifulConfig {
            enabled: true,
            refresh_token: None,
            api_key: None,
            use_calendar_files: false,
        }
    }
}

pub struct PartifulSource {
    client: reqwest::Client,
    config: PartifulConfig,
    api_url: String,
    token_url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Session {
    id_token: String,
    user_id: String,
}

impl PartifulSource {
    pub fn new(client: reqwest::Client, config: PartifulConfig) -> Self {
        PartifulSource {
            client,
            config,
            api_url: API_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
        }
    }

    pub fn with_endpoints(mut self, api_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self.token_url = token_url.into();
        self
    }

    fn credentials(&self) -> SyncResult<(&str, &str)> {
        match (self.config.refresh_token.as_deref(), self.config.api_key.as_deref()) {
            (Some(token), Some(key)) if !token.is_empty() && !key.is_empty() => Ok((token, key)),
            _ => Err(SyncError::source_failed(
                "partiful",
                "missing refresh_token or api_key",
            )),
        }
    }

    async fn refresh_session(&self) -> SyncResult<Session> {
        let (refresh_token, api_key) = self.credentials()?;

        let response = self
            .client
            .post(&self.token_url)
            .query(&[("key", api_key)])
            .header("X-Firebase-Gmpid", FIREBASE_APP_ID)
            .header("X-Client-Version", "Chrome/JsCore/11.2.0/FirebaseCore-web")
            .header("Origin", "https://partiful.com")
            .header("Referer", "https://partiful.com/")
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .send()
            .await
            .map_err(|e| SyncError::source_failed("partiful", e))?;
        let response = ensure_success(response, "partiful", "Token refresh").await?;

        let session: Session = response
            .json()
            .await
            .map_err(|e| SyncError::source_failed("partiful", e))?;
        info!("Refreshed Partiful session");
        Ok(session)
    }

    async fn request_rsvps(&self, session: &Session) -> SyncResult<reqwest::Response> {
        self.client
            .post(&self.api_url)
            .bearer_auth(&session.id_token)
            .header("Origin", "https://partiful.com")
            .header("Referer", "https://partiful.com/")
            .header("Idempotency-Key", format!("\"{}\"", idempotency_key()))
            .json(&json!({ "data": { "params": {}, "userId": session.user_id } }))
            .send()
            .await
            .map_err(|e| SyncError::source_failed("partiful", e))
    }

    /// Raw RSVP list, refreshing the session once on 401.
    async fn rsvps(&self) -> SyncResult<Vec<Value>> {
        let session = self.refresh_session().await?;
        let mut response = self.request_rsvps(&session).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            info!("Partiful token expired, refreshing");
            let session = self.refresh_session().await?;
            response = self.request_rsvps(&session).await?;
        }
        let response = ensure_success(response, "partiful", "getMyRsvps").await?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| SyncError::source_failed("partiful", e))?;

        Ok(payload
            .pointer("/result/data/events")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn calendar_file_records(&self, events: &[Value], now: DateTime<Utc>) -> Vec<EventRecord> {
        let mut records = Vec::new();

        for event in events {
            let Ok(rsvp) = serde_json::from_value::<Rsvp>(event.clone()) else {
                continue;
            };
            if !rsvp.is_upcoming(now) {
                continue;
            }
            let Some(url) = rsvp.calendar_file.as_deref() else {
                warn!(event = %rsvp.id, "No calendar file for event, skipping");
                continue;
            };

            match self.download_calendar(url, rsvp.is_going()).await {
                Ok(found) => records.extend(found),
                Err(e) => error!(event = %rsvp.id, error = %e, "Error downloading calendar file"),
            }
        }

        records
    }

    async fn download_calendar(&self, url: &str, is_confirmed: bool) -> SyncResult<Vec<EventRecord>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::source_failed("partiful", e))?;
        let response = ensure_success(response, "partiful", "Calendar file").await?;
        let ics = response
            .text()
            .await
            .map_err(|e| SyncError::source_failed("partiful", e))?;

        parse_records(&ics, is_confirmed, "partiful")
    }
}

#[async_trait]
impl EventSource for PartifulSource {
    fn identifier(&self) -> &str {
        "partiful"
    }

    async fn fetch(&self, horizon_days: u32) -> SyncResult<Vec<EventRecord>> {
        let events = self.rsvps().await?;
        debug!(count = events.len(), "Fetched Partiful RSVPs");

        let now = Utc::now();
        let until = now + Duration::days(i64::from(horizon_days));

        let records = if self.config.use_calendar_files {
            self.calendar_file_records(&events, now).await
        } else {
            parse_rsvps(&events, now)
        };

        Ok(crate::within(records, now, until))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Rsvp {
    id: String,
    title: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    description: Option<String>,
    location: Option<Value>,
    guest: Option<Guest>,
    calendar_file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Guest {
    status: Option<String>,
}

impl Rsvp {
    fn start(&self) -> Option<DateTime<Utc>> {
        self.start_date.as_deref().and_then(parse_timestamp)
    }

    fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.start().is_some_and(|start| start >= now)
    }

    fn is_going(&self) -> bool {
        self.guest
            .as_ref()
            .and_then(|g| g.status.as_deref())
            .is_some_and(|s| s == "GOING")
    }

    /// Location is usually a string; older events carry an object.
    fn location_text(&self) -> Option<String> {
        match self.location.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => obj
                .get("name")
                .or_else(|| obj.get("address"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    }

    fn to_record(&self) -> SyncResult<EventRecord> {
        let raw_start = self.start_date.as_deref().unwrap_or_default();
        let start = parse_timestamp(raw_start)
            .ok_or_else(|| SyncError::Parse(format!("Invalid startDate '{}'", raw_start)))?;
        let end = match self.end_date.as_deref() {
            Some(raw) => parse_timestamp(raw)
                .ok_or_else(|| SyncError::Parse(format!("Invalid endDate '{}'", raw)))?,
            None => start + Duration::hours(DEFAULT_DURATION_HOURS),
        };
        let title = self
            .title
            .clone()
            .ok_or_else(|| SyncError::Parse(format!("Event {} has no title", self.id)))?;

        Ok(EventRecord::new(title, start, end)?
            .with_description(self.description.clone())
            .with_location(self.location_text())
            .with_url(format!("https://partiful.com/e/{}", self.id))
            .with_confirmed(self.is_going())
            .with_source("partiful".to_string(), self.id.clone()))
    }
}

/// Records for every RSVP that has not started yet.
pub fn parse_rsvps(events: &[Value], now: DateTime<Utc>) -> Vec<EventRecord> {
    events
        .iter()
        .filter_map(|raw| {
            let rsvp: Rsvp = match serde_json::from_value(raw.clone()) {
                Ok(rsvp) => rsvp,
                Err(e) => {
                    error!(error = %e, "Error parsing Partiful event");
                    return None;
                }
            };
            if !rsvp.is_upcoming(now) {
                return None;
            }
            match rsvp.to_record() {
                Ok(record) => Some(record),
                Err(e) => {
                    error!(event = %rsvp.id, error = %e, "Error parsing Partiful event");
                    None
                }
            }
        })
        .collect()
}

/// Random 19-digit key, the shape the web client sends.
fn idempotency_key() -> u128 {
    Uuid::new_v4().as_u128() % 9_000_000_000_000_000_000 + 1_000_000_000_000_000_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_rsvps() {
        let events = vec![
            json!({
                "id": "abc123",
                "title": "Rooftop Party",
                "startDate": "2025-06-01T23:00:00.000Z",
                "description": "Bring snacks",
                "location": "123 Main St, Brooklyn",
                "guest": { "status": "GOING" }
            }),
            json!({
                "id": "def456",
                "title": "Board Games",
                "startDate": "2025-06-05T22:00:00.000Z",
                "endDate": "2025-06-06T01:30:00.000Z",
                "guest": { "status": "MAYBE" }
            }),
            json!({
                "id": "old",
                "title": "Last Year",
                "startDate": "2024-06-05T22:00:00.000Z",
                "guest": { "status": "GOING" }
            }),
            json!({ "id": "nodate", "title": "Someday" }),
        ];

        let records = parse_rsvps(&events, now());
        assert_eq!(records.len(), 2, "Past and undated events are skipped");

        let party = &records[0];
        assert!(party.is_confirmed());
        assert_eq!(party.end() - party.start(), Duration::hours(3));
        assert_eq!(party.url(), Some("https://partiful.com/e/abc123"));
        assert_eq!(party.location(), Some("123 Main St, Brooklyn"));
        assert_eq!(party.source_id(), Some("abc123"));

        let games = &records[1];
        assert!(!games.is_confirmed());
        assert_eq!(
            games.end(),
            Utc.with_ymd_and_hms(2025, 6, 6, 1, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_idempotency_key_has_nineteen_digits() {
        for _ in 0..20 {
            assert_eq!(idempotency_key().to_string().len(), 19);
        }
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_the_source() {
        let source = PartifulSource::new(reqwest::Client::new(), PartifulConfig::default());
        let result = source.fetch(90).await;
        assert!(matches!(result, Err(SyncError::Source { .. })), "Got {:?}", result);
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(query_param("key", "api-key"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access",
                "id_token": "id-token",
                "user_id": "user-1"
            })))
            .mount(server)
            .await;
    }

    fn source_for(server: &MockServer, use_calendar_files: bool) -> PartifulSource {
        let config = PartifulConfig {
            enabled: true,
            refresh_token: Some("refresh".to_string()),
            api_key: Some("api-key".to_string()),
            use_calendar_files,
        };
        PartifulSource::new(reqwest::Client::new(), config)
            .with_endpoints(format!("{}/getMyRsvps", server.uri()), format!("{}/token", server.uri()))
    }

    #[tokio::test]
    async fn test_fetch_refreshes_token_and_lists_rsvps() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        let start = Utc::now() + Duration::days(2);

        Mock::given(method("POST"))
            .and(path("/getMyRsvps"))
            .and(header("Authorization", "Bearer id-token"))
            .and(body_partial_json(json!({ "data": { "userId": "user-1" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "data": { "events": [
                    { "id": "e1", "title": "Dinner", "startDate": start.to_rfc3339(),
                      "guest": { "status": "GOING" } }
                ] } }
            })))
            .mount(&server)
            .await;

        let records = source_for(&server, false).fetch(90).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_confirmed());
    }

    #[tokio::test]
    async fn test_fetch_with_calendar_files() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        let start = Utc::now() + Duration::days(2);
        let stamp = start.format("%Y%m%dT%H%M%SZ").to_string();

        Mock::given(method("POST"))
            .and(path("/getMyRsvps"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "data": { "events": [
                    { "id": "e1", "title": "Dinner", "startDate": start.to_rfc3339(),
                      "guest": { "status": "GOING" },
                      "calendarFile": format!("{}/ics/e1.ics", server.uri()) },
                    { "id": "e2", "title": "No file", "startDate": start.to_rfc3339() }
                ] } }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ics/e1.ics"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:partiful\r\nBEGIN:VEVENT\r\nUID:e1@partiful\r\nSUMMARY:Dinner at Lucali\r\nDTSTART:{}\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
                stamp
            )))
            .mount(&server)
            .await;

        let records = source_for(&server, true).fetch(90).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title(), "Dinner at Lucali");
        assert_eq!(records[0].source_id(), Some("e1@partiful"));
        assert!(records[0].is_confirmed());
    }
}
