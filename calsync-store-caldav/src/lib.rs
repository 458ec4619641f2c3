//! CalDAV calendar store for calsync, built on libdav.
//!
//! Connecting discovers the calendar home:
//! 1. `current-user-principal` on the base URL
//! 2. `calendar-home-set` on the principal
//! 3. PROPFIND/MKCALENDAR under the home to resolve calendars by name
//!
//! Searches use a `calendar-query` REPORT with a time-range filter so only
//! entries near a record's start travel over the wire. Every href held by
//! the store is a path on the server.

pub mod caldav;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use calsync_core::date_range::DateRange;
use calsync_core::ics::{parse_stored_event, parse_uid};
use calsync_core::{CalendarHandle, CalendarStore, StoredEntry, SyncError, SyncResult};
use libdav::caldav::FindCalendarHomeSet;
use libdav::dav::{PutResource, mime_types};
use tracing::{debug, info, warn};

use crate::caldav::{
    DavClient, DeleteResource, GetCalendarResourcesInRange, ListCalendars, MakeCalendar,
    create_caldav_client, event_url, slugify, url_to_href,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CalDavStore {
    caldav: DavClient,
    /// Calendar home collection path, always ending in `/`
    home: String,
    timeout: Duration,
}

impl CalDavStore {
    /// Connect to a CalDAV server and discover the calendar home.
    ///
    /// Falls back to the base URL's path when the server does not advertise
    /// a principal or a calendar home.
    pub async fn connect(
        base_url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let caldav = create_caldav_client(base_url, username, password)?;
        let mut store = CalDavStore {
            home: with_trailing_slash(caldav.base_url().path()),
            caldav,
            timeout,
        };

        let principal = store
            .within(store.caldav.find_current_user_principal())
            .await
            .map_err(discovery_failed)?;

        if let Some(principal) = principal {
            debug!(principal = %principal.path(), "Found principal");
            let home_sets = store
                .within(store.caldav.request(FindCalendarHomeSet::new(&principal)))
                .await
                .map_err(discovery_failed)?
                .home_sets;
            if let Some(home) = home_sets.into_iter().next() {
                store.home = with_trailing_slash(home.path());
            }
        }

        info!(home = %store.home, "Connected to CalDAV server");
        Ok(store)
    }

    pub fn home(&self) -> &str {
        &self.home
    }

    /// Await a request, failing it once the configured timeout passes.
    async fn within<T, E: std::fmt::Display>(
        &self,
        request: impl Future<Output = Result<T, E>>,
    ) -> Result<T, String> {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("request timed out after {:?}", self.timeout)),
        }
    }

    async fn create_calendar(&self, name: &str) -> SyncResult<String> {
        let href = format!("{}{}/", self.home, slugify(name));

        self.within(self.caldav.request(MakeCalendar::new(&href, name)))
            .await
            .map_err(|e| SyncError::write(name, format!("MKCALENDAR {} failed: {}", href, e)))?;

        info!(calendar = name, href = %href, "Created calendar");
        Ok(href)
    }
}

#[async_trait]
impl CalendarStore for CalDavStore {
    async fn find_or_create_calendar(&self, name: &str) -> SyncResult<CalendarHandle> {
        let existing = self
            .within(self.caldav.request(ListCalendars::new(&self.home)))
            .await
            .map_err(|e| SyncError::query(name, format!("Failed to list calendars: {}", e)))?
            .into_iter()
            .find(|c| c.display_name.as_deref() == Some(name));

        let href = match existing {
            Some(collection) => collection.href,
            None => self.create_calendar(name).await?,
        };

        Ok(CalendarHandle::new(name, href))
    }

    async fn search(&self, calendar: &CalendarHandle, range: &DateRange) -> SyncResult<Vec<StoredEntry>> {
        let (start, end) = (range.from_caldav(), range.to_caldav());
        let resources = self
            .within(
                self.caldav
                    .request(GetCalendarResourcesInRange::new(&calendar.href, &start, &end)),
            )
            .await
            .map_err(|e| SyncError::query(&calendar.name, e))?;

        let mut entries = Vec::new();
        for resource in resources {
            match parse_stored_event(&resource.data) {
                Ok(event) => entries.push(StoredEntry {
                    calendar: calendar.name.clone(),
                    href: resource.href,
                    etag: resource.etag,
                    event,
                }),
                Err(e) => {
                    warn!(calendar = %calendar, href = %resource.href, error = %e, "Skipping unreadable entry");
                }
            }
        }

        debug!(calendar = %calendar, count = entries.len(), "Searched calendar");
        Ok(entries)
    }

    async fn insert(&self, calendar: &CalendarHandle, ics: &str) -> SyncResult<()> {
        let uid = parse_uid(ics)
            .ok_or_else(|| SyncError::write(&calendar.name, "calendar object has no UID"))?;
        let href = url_to_href(&event_url(&calendar.href, &uid));

        // create() sends If-None-Match: * so an existing resource is never overwritten
        self.within(
            self.caldav
                .request(PutResource::new(&href).create(ics, mime_types::CALENDAR)),
        )
        .await
        .map_err(|e| SyncError::write(&calendar.name, format!("PUT {} failed: {}", href, e)))?;

        Ok(())
    }

    async fn delete(&self, entry: &StoredEntry) -> SyncResult<()> {
        // A 404 means someone else removed it; the caller decides whether that matters
        self.within(
            self.caldav
                .request(DeleteResource::new(&entry.href, entry.etag.as_deref())),
        )
        .await
        .map_err(|e| SyncError::write(&entry.calendar, format!("DELETE {} failed: {}", entry.href, e)))
    }
}

fn discovery_failed(message: String) -> SyncError {
    SyncError::Http(format!(
        "CalDAV discovery failed: {}. Check the URL, username and password.",
        message
    ))
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calsync_core::EventRecord;
    use calsync_core::ics::generate_ics;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PRINCIPAL: &str = r#"<d:multistatus xmlns:d="DAV:"><d:response><d:href>/</d:href>
<d:propstat><d:prop><d:current-user-principal><d:href>/principals/me/</d:href></d:current-user-principal></d:prop>
<d:status>HTTP/1.1 200 OK</d:status></d:propstat>
</d:response></d:multistatus>"#;

    const HOME: &str = r#"<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav"><d:response><d:href>/principals/me/</d:href>
<d:propstat><d:prop><c:calendar-home-set><d:href>/calendars/me/</d:href></c:calendar-home-set></d:prop>
<d:status>HTTP/1.1 200 OK</d:status></d:propstat>
</d:response></d:multistatus>"#;

    const CALENDARS: &str = r#"<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
<d:response><d:href>/calendars/me/</d:href><d:propstat><d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop>
<d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>
<d:response><d:href>/calendars/me/confirmed-events/</d:href><d:propstat><d:prop>
<d:displayname>Confirmed Events</d:displayname><d:resourcetype><d:collection/><c:calendar/></d:resourcetype>
</d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>
</d:multistatus>"#;

    fn multistatus(body: impl Into<String>) -> ResponseTemplate {
        ResponseTemplate::new(207)
            .insert_header("Content-Type", "application/xml; charset=utf-8")
            .set_body_string(body.into())
    }

    // Matched on body rather than path: libdav may ask the base or the root
    async fn mount_discovery(server: &MockServer) {
        Mock::given(method("PROPFIND"))
            .and(body_string_contains("current-user-principal"))
            .respond_with(multistatus(PRINCIPAL))
            .mount(server)
            .await;
        Mock::given(method("PROPFIND"))
            .and(body_string_contains("calendar-home-set"))
            .respond_with(multistatus(HOME))
            .mount(server)
            .await;
        Mock::given(method("PROPFIND"))
            .and(path("/calendars/me/"))
            .and(body_string_contains("displayname"))
            .respond_with(multistatus(CALENDARS))
            .mount(server)
            .await;
    }

    async fn connect(server: &MockServer) -> CalDavStore {
        CalDavStore::connect(&format!("{}/", server.uri()), "me", "secret", DEFAULT_TIMEOUT)
            .await
            .expect("Should connect")
    }

    fn sample_ics(uid: &str) -> String {
        let start = Utc.with_ymd_and_hms(2025, 3, 20, 22, 30, 0).unwrap();
        let record = EventRecord::new("Rust NYC", start, start + ChronoDuration::hours(2)).unwrap();
        generate_ics(&record, uid)
    }

    #[tokio::test]
    async fn test_connect_discovers_calendar_home() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;

        let store = connect(&server).await;
        assert_eq!(store.home(), "/calendars/me/");
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("PROPFIND"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = CalDavStore::connect(&server.uri(), "me", "wrong", DEFAULT_TIMEOUT).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let result = CalDavStore::connect("not a url", "me", "secret", DEFAULT_TIMEOUT).await;
        assert!(matches!(result, Err(SyncError::Config(_))), "Got {:?}", result.err());
    }

    #[tokio::test]
    async fn test_find_existing_calendar_by_display_name() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        let store = connect(&server).await;

        let handle = store.find_or_create_calendar("Confirmed Events").await.unwrap();
        assert_eq!(handle.name, "Confirmed Events");
        assert_eq!(handle.href, "/calendars/me/confirmed-events/");
    }

    #[tokio::test]
    async fn test_missing_calendar_is_created() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        Mock::given(method("MKCALENDAR"))
            .and(path("/calendars/me/possible-events/"))
            .and(body_string_contains("<D:displayname>Possible Events</D:displayname>"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        let store = connect(&server).await;

        let handle = store.find_or_create_calendar("Possible Events").await.unwrap();
        assert_eq!(handle.href, "/calendars/me/possible-events/");
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        Mock::given(method("REPORT"))
            .respond_with(multistatus("<d:multistatus xmlns:d=\"DAV:\"/>").set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        let store = CalDavStore::connect(
            &format!("{}/", server.uri()),
            "me",
            "secret",
            Duration::from_millis(300),
        )
        .await
        .expect("Should connect");

        let handle = CalendarHandle::new("Confirmed Events", "/calendars/me/confirmed-events/");
        let result = store.search(&handle, &DateRange::upcoming(1)).await;
        match result {
            Err(SyncError::StoreQuery { calendar, message }) => {
                assert_eq!(calendar, "Confirmed Events");
                assert!(message.contains("timed out"), "Got {}", message);
            }
            other => panic!("Expected a query error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_parses_entries_and_skips_unreadable_ones() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        let report = format!(
            r#"<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
<d:response><d:href>/calendars/me/confirmed-events/a.ics</d:href><d:propstat><d:prop>
<d:getetag>"1"</d:getetag><c:calendar-data>{}</c:calendar-data></d:prop></d:propstat></d:response>
<d:response><d:href>/calendars/me/confirmed-events/b.ics</d:href><d:propstat><d:prop>
<d:getetag>"2"</d:getetag><c:calendar-data>BEGIN:VCALENDAR
BEGIN:VEVENT
UID:b
SUMMARY:No start
END:VEVENT
END:VCALENDAR</c:calendar-data></d:prop></d:propstat></d:response>
</d:multistatus>"#,
            sample_ics("a")
        );
        Mock::given(method("REPORT"))
            .and(path("/calendars/me/confirmed-events/"))
            .and(header("Depth", "1"))
            .and(body_string_contains("time-range start=\"20250319T223000Z\""))
            .respond_with(multistatus(report))
            .mount(&server)
            .await;
        let store = connect(&server).await;
        let handle = store.find_or_create_calendar("Confirmed Events").await.unwrap();

        let center = Utc.with_ymd_and_hms(2025, 3, 20, 22, 30, 0).unwrap();
        let range = DateRange::around(center, ChronoDuration::days(1));
        let entries = store.search(&handle, &range).await.unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].calendar, "Confirmed Events");
        assert_eq!(entries[0].event.summary, "Rust NYC");
        assert_eq!(entries[0].etag.as_deref(), Some("\"1\""));
        assert_eq!(entries[0].href, "/calendars/me/confirmed-events/a.ics");
    }

    #[tokio::test]
    async fn test_search_failure_is_a_query_error() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        Mock::given(method("REPORT"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let store = connect(&server).await;
        let handle = store.find_or_create_calendar("Confirmed Events").await.unwrap();

        let result = store.search(&handle, &DateRange::upcoming(1)).await;
        assert!(matches!(result, Err(SyncError::StoreQuery { .. })), "Got {:?}", result);
    }

    #[tokio::test]
    async fn test_insert_puts_under_uid_with_credentials() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        Mock::given(method("PUT"))
            .and(path("/calendars/me/confirmed-events/uid-1.ics"))
            .and(header("If-None-Match", "*"))
            .and(header("Authorization", "Basic bWU6c2VjcmV0"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        let store = connect(&server).await;
        let handle = store.find_or_create_calendar("Confirmed Events").await.unwrap();

        store.insert(&handle, &sample_ics("uid-1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_conflict_is_a_write_error() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(412))
            .mount(&server)
            .await;
        let store = connect(&server).await;
        let handle = store.find_or_create_calendar("Confirmed Events").await.unwrap();

        let result = store.insert(&handle, &sample_ics("uid-1")).await;
        match result {
            Err(SyncError::StoreWrite { calendar, .. }) => assert_eq!(calendar, "Confirmed Events"),
            other => panic!("Expected a write error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_sends_etag_and_names_calendar_on_failure() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        Mock::given(method("DELETE"))
            .and(path("/calendars/me/confirmed-events/a.ics"))
            .and(header("If-Match", "\"1\""))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/calendars/me/confirmed-events/gone.ics"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let store = connect(&server).await;

        let entry = |name: &str, etag: Option<&str>| StoredEntry {
            calendar: "Confirmed Events".to_string(),
            href: format!("/calendars/me/confirmed-events/{}", name),
            etag: etag.map(str::to_string),
            event: Default::default(),
        };

        store.delete(&entry("a.ics", Some("\"1\""))).await.unwrap();
        match store.delete(&entry("gone.ics", None)).await {
            Err(SyncError::StoreWrite { calendar, message }) => {
                assert_eq!(calendar, "Confirmed Events");
                assert!(message.contains("gone.ics"), "Got {}", message);
            }
            other => panic!("Expected a write error, got {:?}", other),
        }
    }
}
