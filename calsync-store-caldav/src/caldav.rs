//! libdav client construction and the CalDAV requests libdav does not ship.
//!
//! Discovery and PUT go through libdav's own requests. Time-range queries,
//! calendar listing by display name, MKCALENDAR and conditional DELETE are
//! custom [`DavRequest`]s parsed with roxmltree.

use calsync_core::{SyncError, SyncResult};
use http::{Method, Uri};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use libdav::CalDavClient;
use libdav::dav::WebDavClient;
use libdav::requests::{DavRequest, ParseResponseError, PreparedRequest};
use tower::ServiceBuilder;
use tower_http::{auth::AddAuthorization, follow_redirect::FollowRedirect};
use tracing::warn;

type HttpClient = FollowRedirect<
    AddAuthorization<
        Client<
            hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
            String,
        >,
    >,
>;

pub type DavClient = CalDavClient<HttpClient>;

/// Create a libdav client with basic auth that follows redirects.
pub fn create_caldav_client(base_url: &str, username: &str, password: &str) -> SyncResult<DavClient> {
    let uri: Uri = base_url
        .parse()
        .map_err(|e| SyncError::Config(format!("Invalid CalDAV URL '{}': {}", base_url, e)))?;

    let builder = match HttpsConnectorBuilder::new().with_native_roots() {
        Ok(builder) => builder,
        Err(e) => {
            warn!(error = %e, "No native TLS roots, using bundled roots");
            HttpsConnectorBuilder::new().with_webpki_roots()
        }
    };
    let https_connector = builder.https_or_http().enable_http1().build();

    let http_client = Client::builder(TokioExecutor::new()).build(https_connector);
    let auth_client = AddAuthorization::basic(http_client, username, password);
    let client = ServiceBuilder::new()
        .layer(tower_http::follow_redirect::FollowRedirectLayer::new())
        .service(auth_client);

    let webdav = WebDavClient::new(uri, client);
    Ok(CalDavClient::new(webdav))
}

/// Build the href for an event resource.
pub fn event_url(calendar_href: &str, event_uid: &str) -> String {
    let base = calendar_href.trim_end_matches('/');
    format!("{}/{}.ics", base, event_uid)
}

/// Path part of `url`; hrefs that are already paths pass through.
pub fn url_to_href(url: &str) -> String {
    match url.parse::<Uri>() {
        Ok(uri) if uri.scheme().is_some() => uri.path().to_string(),
        _ => url.to_string(),
    }
}

/// Path segment for a new calendar collection.
pub fn slugify(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "calendar".to_string()
    } else {
        slug.to_string()
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn ensure_success(parts: &http::response::Parts) -> Result<(), ParseResponseError> {
    if parts.status.is_success() {
        Ok(())
    } else {
        Err(ParseResponseError::BadStatusCode(parts.status))
    }
}

// ============================================================================
// Time-range calendar-query
// ============================================================================

/// calendar-query REPORT selecting VEVENTs that intersect a time range.
pub struct GetCalendarResourcesInRange<'a> {
    collection_href: &'a str,
    start: &'a str,
    end: &'a str,
}

impl<'a> GetCalendarResourcesInRange<'a> {
    /// `start` and `end` must be in CalDAV format: `YYYYMMDDTHHMMSSZ`
    pub fn new(collection_href: &'a str, start: &'a str, end: &'a str) -> Self {
        Self {
            collection_href,
            start,
            end,
        }
    }
}

/// A fetched calendar resource with its ICS data.
#[derive(Debug)]
pub struct CalendarResource {
    pub href: String,
    pub etag: Option<String>,
    pub data: String,
}

impl DavRequest for GetCalendarResourcesInRange<'_> {
    type Response = Vec<CalendarResource>;
    type ParseError = ParseResponseError;
    type Error<E> = libdav::dav::WebDavError<E>;

    fn prepare_request(&self) -> Result<PreparedRequest, http::Error> {
        let body = format!(
            r#"<C:calendar-query xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <prop>
        <getetag/>
        <C:calendar-data/>
    </prop>
    <C:filter>
        <C:comp-filter name="VCALENDAR">
            <C:comp-filter name="VEVENT">
                <C:time-range start="{}" end="{}"/>
            </C:comp-filter>
        </C:comp-filter>
    </C:filter>
</C:calendar-query>"#,
            self.start, self.end
        );

        Ok(PreparedRequest {
            method: Method::from_bytes(b"REPORT")?,
            path: self.collection_href.to_string(),
            body,
            headers: vec![("Depth".to_string(), "1".to_string())],
        })
    }

    fn parse_response(
        &self,
        parts: &http::response::Parts,
        body: &[u8],
    ) -> Result<Self::Response, ParseResponseError> {
        ensure_success(parts)?;
        parse_calendar_resources(body)
    }
}

fn child_text<'a>(node: roxmltree::Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.descendants()
        .find(|n| n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(str::trim)
}

/// Calendar resources in a REPORT multistatus. Responses without calendar
/// data are skipped.
pub fn parse_calendar_resources(body: &[u8]) -> Result<Vec<CalendarResource>, ParseResponseError> {
    let text = std::str::from_utf8(body)?;
    let doc = roxmltree::Document::parse(text)?;

    let resources = doc
        .root_element()
        .descendants()
        .filter(|n| n.tag_name().name() == "response")
        .filter_map(|response| {
            let href = url_to_href(child_text(response, "href")?);
            let data = response
                .descendants()
                .find(|n| n.tag_name().name() == "calendar-data")
                .and_then(|n| n.text())?
                .to_string();
            let etag = child_text(response, "getetag").map(str::to_string);
            Some(CalendarResource { href, etag, data })
        })
        .collect();

    Ok(resources)
}

// ============================================================================
// Calendar collections by display name
// ============================================================================

/// Depth-1 PROPFIND on the calendar home for display names and resource types.
pub struct ListCalendars<'a> {
    home_href: &'a str,
}

impl<'a> ListCalendars<'a> {
    pub fn new(home_href: &'a str) -> Self {
        Self { home_href }
    }
}

/// A calendar collection found under the calendar home.
#[derive(Debug, PartialEq, Eq)]
pub struct CalendarCollection {
    pub href: String,
    pub display_name: Option<String>,
}

impl DavRequest for ListCalendars<'_> {
    type Response = Vec<CalendarCollection>;
    type ParseError = ParseResponseError;
    type Error<E> = libdav::dav::WebDavError<E>;

    fn prepare_request(&self) -> Result<PreparedRequest, http::Error> {
        let body = r#"<propfind xmlns="DAV:">
    <prop>
        <displayname/>
        <resourcetype/>
    </prop>
</propfind>"#;

        Ok(PreparedRequest {
            method: Method::from_bytes(b"PROPFIND")?,
            path: self.home_href.to_string(),
            body: body.to_string(),
            headers: vec![("Depth".to_string(), "1".to_string())],
        })
    }

    fn parse_response(
        &self,
        parts: &http::response::Parts,
        body: &[u8],
    ) -> Result<Self::Response, ParseResponseError> {
        ensure_success(parts)?;
        parse_calendar_collections(body)
    }
}

/// Calendar collections in a depth-1 PROPFIND response.
///
/// Only responses whose `resourcetype` includes `calendar` are returned, so
/// the home collection itself and plain collections are skipped.
pub fn parse_calendar_collections(body: &[u8]) -> Result<Vec<CalendarCollection>, ParseResponseError> {
    let text = std::str::from_utf8(body)?;
    let doc = roxmltree::Document::parse(text)?;

    let collections = doc
        .root_element()
        .descendants()
        .filter(|n| n.tag_name().name() == "response")
        .filter(|response| {
            response
                .descendants()
                .find(|n| n.tag_name().name() == "resourcetype")
                .is_some_and(|rt| rt.children().any(|c| c.tag_name().name() == "calendar"))
        })
        .filter_map(|response| {
            let href = url_to_href(child_text(response, "href")?);
            let display_name = child_text(response, "displayname")
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            Some(CalendarCollection { href, display_name })
        })
        .collect();

    Ok(collections)
}

// ============================================================================
// MKCALENDAR and DELETE
// ============================================================================

/// MKCALENDAR for a VEVENT calendar with a display name.
pub struct MakeCalendar<'a> {
    href: &'a str,
    display_name: &'a str,
}

impl<'a> MakeCalendar<'a> {
    pub fn new(href: &'a str, display_name: &'a str) -> Self {
        Self { href, display_name }
    }
}

impl DavRequest for MakeCalendar<'_> {
    type Response = ();
    type ParseError = ParseResponseError;
    type Error<E> = libdav::dav::WebDavError<E>;

    fn prepare_request(&self) -> Result<PreparedRequest, http::Error> {
        let body = format!(
            r#"<C:mkcalendar xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:set>
    <D:prop>
      <D:displayname>{}</D:displayname>
      <C:supported-calendar-component-set>
        <C:comp name="VEVENT"/>
      </C:supported-calendar-component-set>
    </D:prop>
  </D:set>
</C:mkcalendar>"#,
            xml_escape(self.display_name)
        );

        Ok(PreparedRequest {
            method: Method::from_bytes(b"MKCALENDAR")?,
            path: self.href.to_string(),
            body,
            headers: Vec::new(),
        })
    }

    fn parse_response(
        &self,
        parts: &http::response::Parts,
        _body: &[u8],
    ) -> Result<Self::Response, ParseResponseError> {
        ensure_success(parts)
    }
}

/// DELETE a resource, guarded by `If-Match` when the etag is known.
pub struct DeleteResource<'a> {
    href: &'a str,
    etag: Option<&'a str>,
}

impl<'a> DeleteResource<'a> {
    pub fn new(href: &'a str, etag: Option<&'a str>) -> Self {
        Self { href, etag }
    }
}

impl DavRequest for DeleteResource<'_> {
    type Response = ();
    type ParseError = ParseResponseError;
    type Error<E> = libdav::dav::WebDavError<E>;

    fn prepare_request(&self) -> Result<PreparedRequest, http::Error> {
        let headers = self
            .etag
            .map(|etag| vec![("If-Match".to_string(), etag.to_string())])
            .unwrap_or_default();

        Ok(PreparedRequest {
            method: Method::DELETE,
            path: self.href.to_string(),
            body: String::new(),
            headers,
        })
    }

    fn parse_response(
        &self,
        parts: &http::response::Parts,
        _body: &[u8],
    ) -> Result<Self::Response, ParseResponseError> {
        ensure_success(parts)
    }
}
