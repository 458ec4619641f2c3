//! Event sources and their aggregation.

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::SyncResult;
use crate::event::EventRecord;

/// Anything that can produce upcoming event records.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Short stable name used in logs and as `X-EVENT-SOURCE`.
    fn identifier(&self) -> &str;

    /// Fetch events starting within the next `horizon_days` days.
    async fn fetch(&self, horizon_days: u32) -> SyncResult<Vec<EventRecord>>;
}

/// Runs every enabled source in turn and concatenates their records.
#[derive(Default)]
pub struct Aggregator {
    sources: Vec<Box<dyn EventSource>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: Box<dyn EventSource>) {
        self.sources.push(source);
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.identifier()).collect()
    }

    /// Fetch from all sources sequentially. A failing source is logged and
    /// contributes nothing; the others still run.
    pub async fn fetch_all(&self, horizon_days: u32) -> Vec<EventRecord> {
        let mut records = Vec::new();

        for source in &self.sources {
            match source.fetch(horizon_days).await {
                Ok(fetched) => {
                    info!(source = source.identifier(), count = fetched.len(), "Fetched events");
                    records.extend(fetched);
                }
                Err(e) => {
                    error!(source = source.identifier(), error = %e, "Source failed, skipping");
                }
            }
        }

        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use chrono::{Duration, TimeZone, Utc};

    struct FixedSource {
        name: &'static str,
        titles: Vec<&'static str>,
    }

    #[async_trait]
    impl EventSource for FixedSource {
        fn identifier(&self) -> &str {
            self.name
        }

        async fn fetch(&self, _horizon_days: u32) -> SyncResult<Vec<EventRecord>> {
            let start = Utc.with_ymd_and_hms(2025, 3, 20, 22, 0, 0).unwrap();
            self.titles
                .iter()
                .map(|t| EventRecord::new(*t, start, start + Duration::hours(1)))
                .collect()
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl EventSource for BrokenSource {
        fn identifier(&self) -> &str {
            "broken"
        }

        async fn fetch(&self, _horizon_days: u32) -> SyncResult<Vec<EventRecord>> {
            Err(SyncError::source_failed("broken", "HTTP 503"))
        }
    }

    #[tokio::test]
    async fn test_fetch_all_skips_failing_sources() {
        let mut aggregator = Aggregator::new();
        aggregator.push(Box::new(FixedSource {
            name: "first",
            titles: vec!["A", "B"],
        }));
        aggregator.push(Box::new(BrokenSource));
        aggregator.push(Box::new(FixedSource {
            name: "last",
            titles: vec!["C"],
        }));

        let records = aggregator.fetch_all(90).await;
        let titles: Vec<&str> = records.iter().map(|r| r.title()).collect();

        assert_eq!(titles, vec!["A", "B", "C"]);
        assert_eq!(aggregator.identifiers(), vec!["first", "broken", "last"]);
    }

    #[tokio::test]
    async fn test_empty_aggregator_yields_nothing() {
        let aggregator = Aggregator::new();
        assert!(aggregator.is_empty());
        assert!(aggregator.fetch_all(90).await.is_empty());
    }
}
