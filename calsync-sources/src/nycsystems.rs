//! NYC Systems talk schedule, scraped from the series homepage.

use async_trait::async_trait;
use calsync_core::{EventRecord, EventSource, SyncError, SyncResult};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{default_enabled, ensure_success};

pub const BASE_URL: &str = "https://nycsystems.xyz";

const DESCRIPTION: &str = "NYC Systems is an independent tech talk series focused on systems programming. It is entirely community-run, not affiliated with any company.

Topics include:
• Compilers, parsers, virtual machines, IDEs, profiling
• Databases, storage, networking, distributed systems
• Large scale infrastructure, low latency, high availability services
• Formal methods, verification
• Browsers, kernel development, security

Previous talks available at: https://youtube.com/@NYCSystems";

const LOCATION: &str = "Trail of Bits Office, New York";
const DURATION_HOURS: i64 = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct NycSystemsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Year the schedule's "Month DD" dates fall in; defaults to the current year
    pub year: Option<i32>,
}

impl Default for NycSystemsConfig {
    fn default() -> Self {
        NycSystemsConfig {
            enabled: true,
            year: None,
        }
    }
}

pub struct NycSystemsSource {
    client: reqwest::Client,
    config: NycSystemsConfig,
    base_url: String,
}

impl NycSystemsSource {
    pub fn new(client: reqwest::Client, config: NycSystemsConfig) -> Self {
        NycSystemsSource {
            client,
            config,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl EventSource for NycSystemsSource {
    fn identifier(&self) -> &str {
        "nycsystems"
    }

    async fn fetch(&self, horizon_days: u32) -> SyncResult<Vec<EventRecord>> {
        let response = self
            .client
            .get(&self.base_url)
            .send()
            .await
            .map_err(|e| SyncError::source_failed("nycsystems", e))?;
        let response = ensure_success(response, "nycsystems", "Schedule page").await?;
        let html = response
            .text()
            .await
            .map_err(|e| SyncError::source_failed("nycsystems", e))?;

        let now = Utc::now();
        let year = self.config.year.unwrap_or_else(|| now.with_timezone(&New_York).year());
        let records = parse_schedule(&html, &self.base_url, year)?;
        debug!(count = records.len(), year, "Parsed NYC Systems schedule");

        Ok(crate::within(records, now, now + Duration::days(i64::from(horizon_days))))
    }
}

/// Rows of the first table on the page as cell texts, plus the first link
/// found in each row's date cell.
struct ScheduleRow {
    date: String,
    speakers: String,
    link: Option<String>,
}

/// Records for every readable row of the schedule table.
pub fn parse_schedule(html: &str, base_url: &str, year: i32) -> SyncResult<Vec<EventRecord>> {
    let rows = schedule_rows(html)?;
    if rows.is_empty() {
        warn!("Could not find schedule table on NYC Systems page");
    }

    let base = Url::parse(base_url).ok();
    let mut records = Vec::new();

    for row in rows {
        let Some(start) = talk_start(&row.date, year) else {
            debug!(date = %row.date, "Skipping row without a readable date");
            continue;
        };

        let tbd = row.speakers.eq_ignore_ascii_case("tbd");
        let title = if tbd {
            format!("NYC Systems Talk - {}", row.date)
        } else {
            format!("NYC Systems Talk - {}", row.speakers)
        };
        let url = row
            .link
            .as_deref()
            .and_then(|href| base.as_ref()?.join(href).ok())
            .map(|u| u.to_string())
            .unwrap_or_else(|| base_url.to_string());
        let source_id = format!("nycsystems_{}", start.format("%Y%m%d"));

        let record = EventRecord::new(title, start, start + Duration::hours(DURATION_HOURS))?
            .with_description(DESCRIPTION.to_string())
            .with_location(LOCATION.to_string())
            .with_url(url)
            .with_confirmed(!tbd)
            .with_source("nycsystems".to_string(), source_id);
        records.push(record);
    }

    Ok(records)
}

fn schedule_rows(html: &str) -> SyncResult<Vec<ScheduleRow>> {
    let table_re = compile(r"(?is)<table[^>]*>(.*?)</table>")?;
    let row_re = compile(r"(?is)<tr[^>]*>(.*?)</tr>")?;
    let cell_re = compile(r"(?is)<td[^>]*>(.*?)</td>")?;
    let href_re = compile(r#"(?i)href\s*=\s*["']([^"']+)["']"#)?;
    let tag_re = compile(r"(?s)<[^>]+>")?;

    let Some(table) = table_re.captures(html) else {
        return Ok(Vec::new());
    };

    let rows = row_re
        .captures_iter(&table[1])
        .filter_map(|row| {
            let cells: Vec<&str> = cell_re
                .captures_iter(&row[1])
                .filter_map(|c| c.get(1).map(|m| m.as_str()))
                .collect();
            if cells.len() < 2 {
                return None;
            }
            Some(ScheduleRow {
                date: cell_text(&tag_re, cells[0]),
                speakers: cell_text(&tag_re, cells[1]),
                link: href_re.captures(cells[0]).map(|c| c[1].to_string()),
            })
        })
        .collect();

    Ok(rows)
}

fn compile(pattern: &str) -> SyncResult<Regex> {
    Regex::new(pattern).map_err(|e| SyncError::Parse(e.to_string()))
}

fn cell_text(tag_re: &Regex, cell: &str) -> String {
    let stripped = tag_re.replace_all(cell, "");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 18:30 New York time on "Month DD" of `year`.
fn talk_start(date: &str, year: i32) -> Option<DateTime<Utc>> {
    let day = NaiveDate::parse_from_str(&format!("{} {}", date, year), "%B %d %Y").ok()?;
    let local = day.and_time(NaiveTime::from_hms_opt(18, 30, 0)?);
    New_York
        .from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
