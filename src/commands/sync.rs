use anyhow::{Context, Result};
use calsync_core::store::MemoryStore;
use calsync_core::{CalendarStore, Reconciler, RunReport};
use calsync_sources::{build_aggregator, http_client};
use calsync_store_caldav::CalDavStore;
use tracing::{info, warn};

use crate::config::AppConfig;

/// One full pass: resolve both calendars, fetch every enabled source, then
/// reconcile each record.
///
/// Only startup failures are errors. Sources and records that fail are
/// logged and counted in the report.
pub async fn run(config: &AppConfig, dry_run: bool) -> Result<RunReport> {
    if dry_run {
        info!("Dry run: reconciling into an in-memory store");
        let store = MemoryStore::new();
        return sync_into(&store, config).await;
    }

    let (url, username, password) = config.caldav.credentials()?;
    let store = CalDavStore::connect(url, username, password, config.caldav.timeout())
        .await
        .with_context(|| format!("Failed to connect to CalDAV server at {}", url))?;

    sync_into(&store, config).await
}

async fn sync_into<S: CalendarStore>(store: &S, config: &AppConfig) -> Result<RunReport> {
    let reconciler = Reconciler::connect(store, &config.calendars, config.sync.dedup_threshold)
        .await
        .context("Failed to resolve target calendars")?;

    let client = http_client(config.sync.http_timeout())?;
    let aggregator = build_aggregator(&config.sources, &client);
    if aggregator.is_empty() {
        warn!("No sources are enabled");
    }

    info!(
        sources = ?aggregator.identifiers(),
        days = config.sync.max_future_days,
        "Fetching events"
    );
    let records = aggregator.fetch_all(config.sync.max_future_days).await;
    info!(count = records.len(), "Fetched events");

    Ok(reconciler.run(&records).await)
}
