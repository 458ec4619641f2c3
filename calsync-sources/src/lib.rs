//! Event sources for calsync.
//!
//! Each source fetches what it can from one site and hands back normalized
//! [`EventRecord`]s. Parsing is kept apart from HTTP so it can be exercised
//! on captured payloads.

pub mod eventbrite;
pub mod meetup;
pub mod nycsystems;
pub mod partiful;

use std::time::Duration;

use calsync_core::{Aggregator, EventRecord, SyncError, SyncResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

pub use eventbrite::{EventbriteConfig, EventbriteSource};
pub use meetup::{MeetupConfig, MeetupSource};
pub use nycsystems::{NycSystemsConfig, NycSystemsSource};
pub use partiful::{PartifulConfig, PartifulSource};

/// Browser user agent; several of the sites refuse obvious bots.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.6478.127 Safari/537.36";

/// Per-source settings, one table per source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub meetup: MeetupConfig,
    #[serde(default)]
    pub eventbrite: EventbriteConfig,
    #[serde(default)]
    pub partiful: PartifulConfig,
    #[serde(default)]
    pub nycsystems: NycSystemsConfig,
}

fn default_enabled() -> bool {
    true
}

/// Shared HTTP client for all sources.
pub fn http_client(timeout: Duration) -> SyncResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| SyncError::Http(format!("Failed to create HTTP client: {}", e)))
}

/// Build an aggregator holding every enabled source, in a fixed order.
pub fn build_aggregator(config: &SourcesConfig, client: &reqwest::Client) -> Aggregator {
    let mut aggregator = Aggregator::new();

    if config.meetup.enabled {
        aggregator.push(Box::new(MeetupSource::new(client.clone(), config.meetup.clone())));
    }
    if config.partiful.enabled {
        aggregator.push(Box::new(PartifulSource::new(client.clone(), config.partiful.clone())));
    }
    if config.eventbrite.enabled {
        aggregator.push(Box::new(EventbriteSource::new(client.clone(), config.eventbrite.clone())));
    }
    if config.nycsystems.enabled {
        aggregator.push(Box::new(NycSystemsSource::new(client.clone(), config.nycsystems.clone())));
    }

    aggregator
}

/// Parse the timestamp shapes the sites hand out.
///
/// Accepts RFC 3339 with or without seconds. Values without an offset are
/// read as UTC.
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Fail with the response body when the status is not a success.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    source: &str,
    what: &str,
) -> SyncResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::source_failed(
        source,
        format!("{} failed (status {}): {}", what, status, truncate(&body, 200)),
    ))
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Keep records starting inside `[from, to]`.
pub(crate) fn within(records: Vec<EventRecord>, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<EventRecord> {
    records
        .into_iter()
        .filter(|r| r.start() >= from && r.start() <= to)
        .collect()
}
