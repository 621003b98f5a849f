/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! End-to-end protocol scenarios driven through the request handlers
//! against a temporary data root.

use dav::{Autocreate, DavMethod, HttpResponse, Server, ServerConfig};
use dav_proto::RequestHeaders;

struct TestServer {
    server: Server,
    _tmp: tempfile::TempDir,
}

fn test_server() -> TestServer {
    let tmp = tempfile::tempdir().unwrap();
    let server = Server::new(ServerConfig {
        data_root: tmp.path().to_path_buf(),
        current_user_principal: Some("/alice/".to_string()),
        autocreate: Autocreate::Defaults,
        index_threshold: 2,
        ..ServerConfig::default()
    });
    TestServer { server, _tmp: tmp }
}

async fn request(
    server: &Server,
    method: DavMethod,
    uri: &str,
    extra: &[(&str, &str)],
    body: &str,
) -> HttpResponse {
    let mut headers = RequestHeaders::new(uri);
    for (name, value) in extra {
        headers.parse(name, value);
    }
    server
        .handle_request(method, &headers, body.as_bytes().to_vec(), None)
        .await
}

fn etag_header(response: &HttpResponse) -> String {
    response
        .headers()
        .iter()
        .find(|(name, _)| *name == "ETag")
        .map(|(_, value)| value.clone())
        .expect("response carries an ETag")
}

fn event(uid: &str, dtstart: &str) -> String {
    format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\n\
         BEGIN:VEVENT\r\nUID:{uid}\r\nDTSTAMP:20240101T000000Z\r\n\
         DTSTART:{dtstart}\r\nDTEND:{dtstart}\r\nSUMMARY:Event {uid}\r\n\
         END:VEVENT\r\nEND:VCALENDAR\r\n"
    )
}

#[tokio::test]
async fn propfind_depth_zero_names_the_calendar() {
    let fixture = test_server();
    let response = request(
        &fixture.server,
        DavMethod::PROPFIND,
        "/alice/calendars/calendar/",
        &[("Depth", "0")],
        r#"<propfind xmlns="DAV:"><prop><displayname/><resourcetype/></prop></propfind>"#,
    )
    .await;

    assert_eq!(response.status().as_u16(), 207);
    let xml = response.xml();
    assert_eq!(xml.matches("<D:response>").count(), 1);
    assert!(xml.contains("<D:href>/alice/calendars/calendar/</D:href>"));
    assert!(xml.contains("<D:displayname>calendar</D:displayname>"));
    assert!(xml.contains("<D:collection/>"));
    assert!(xml.contains("<A:calendar/>"));
}

#[tokio::test]
async fn conditional_put_returns_etag_and_enforces_if_match() {
    let fixture = test_server();
    let body = event("evt-1", "20240115T120000Z");
    let created = request(
        &fixture.server,
        DavMethod::PUT,
        "/alice/calendars/calendar/evt-1.ics",
        &[("Content-Type", "text/calendar")],
        &body,
    )
    .await;
    assert_eq!(created.status().as_u16(), 201);
    let etag = etag_header(&created);
    assert!(etag.starts_with('"') && etag.ends_with('"'));

    let conflicted = request(
        &fixture.server,
        DavMethod::PUT,
        "/alice/calendars/calendar/evt-1.ics",
        &[("If-Match", "\"0000000000\"")],
        &event("evt-1", "20240116T120000Z"),
    )
    .await;
    assert_eq!(conflicted.status().as_u16(), 412);

    // Unchanged: a GET still returns the original bytes and tag.
    let fetched = request(
        &fixture.server,
        DavMethod::GET,
        "/alice/calendars/calendar/evt-1.ics",
        &[],
        "",
    )
    .await;
    assert_eq!(fetched.status().as_u16(), 200);
    assert_eq!(etag_header(&fetched), etag);

    let updated = request(
        &fixture.server,
        DavMethod::PUT,
        "/alice/calendars/calendar/evt-1.ics",
        &[("If-Match", etag.as_str())],
        &event("evt-1", "20240117T120000Z"),
    )
    .await;
    assert_eq!(updated.status().as_u16(), 204);
    assert_ne!(etag_header(&updated), etag);
}

#[tokio::test]
async fn uid_conflict_is_a_409_with_precondition() {
    let fixture = test_server();
    let first = request(
        &fixture.server,
        DavMethod::PUT,
        "/alice/calendars/calendar/evt-1.ics",
        &[],
        &event("evt-1", "20240115T120000Z"),
    )
    .await;
    assert_eq!(first.status().as_u16(), 201);

    let copy = request(
        &fixture.server,
        DavMethod::PUT,
        "/alice/calendars/calendar/copy.ics",
        &[],
        &event("evt-1", "20240120T120000Z"),
    )
    .await;
    assert_eq!(copy.status().as_u16(), 409);
    assert!(copy.xml().contains("<A:no-uid-conflict>"));
    assert!(copy.xml().contains("evt-1.ics"));

    let listing = request(
        &fixture.server,
        DavMethod::PROPFIND,
        "/alice/calendars/calendar/",
        &[("Depth", "1")],
        r#"<propfind xmlns="DAV:"><prop><getetag/></prop></propfind>"#,
    )
    .await;
    assert!(listing.xml().contains("evt-1.ics"));
    assert!(!listing.xml().contains("copy.ics"));
}

#[tokio::test]
async fn calendar_query_time_range_selects_january_only() {
    let fixture = test_server();
    for (name, dtstart) in [
        ("jan.ics", "20240115T120000Z"),
        ("feb.ics", "20240215T120000Z"),
    ] {
        let response = request(
            &fixture.server,
            DavMethod::PUT,
            &format!("/alice/calendars/calendar/{name}"),
            &[],
            &event(name.trim_end_matches(".ics"), dtstart),
        )
        .await;
        assert_eq!(response.status().as_u16(), 201);
    }

    let body = r#"<?xml version="1.0" encoding="utf-8"?>
        <C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
          <D:prop><D:getetag/></D:prop>
          <C:filter>
            <C:comp-filter name="VCALENDAR">
              <C:comp-filter name="VEVENT">
                <C:time-range start="20240101T000000Z" end="20240201T000000Z"/>
              </C:comp-filter>
            </C:comp-filter>
          </C:filter>
        </C:calendar-query>"#;
    let response = request(
        &fixture.server,
        DavMethod::REPORT,
        "/alice/calendars/calendar/",
        &[("Depth", "1")],
        body,
    )
    .await;

    assert_eq!(response.status().as_u16(), 207);
    let xml = response.xml();
    assert!(xml.contains("jan.ics"));
    assert!(!xml.contains("feb.ics"));
}

#[tokio::test]
async fn sync_collection_reports_exact_deltas() {
    let fixture = test_server();
    for name in ["a", "b", "c"] {
        request(
            &fixture.server,
            DavMethod::PUT,
            &format!("/alice/calendars/calendar/{name}.ics"),
            &[],
            &event(name, "20240115T120000Z"),
        )
        .await;
    }

    let initial = request(
        &fixture.server,
        DavMethod::REPORT,
        "/alice/calendars/calendar/",
        &[],
        r#"<D:sync-collection xmlns:D="DAV:">
             <D:sync-token/>
             <D:sync-level>1</D:sync-level>
             <D:prop><D:getetag/></D:prop>
           </D:sync-collection>"#,
    )
    .await;
    assert_eq!(initial.status().as_u16(), 207);
    let xml = initial.xml().to_string();
    assert_eq!(xml.matches("<D:response>").count(), 3);
    let token_start = xml.find("<D:sync-token>").unwrap() + "<D:sync-token>".len();
    let token_end = xml[token_start..].find("</D:sync-token>").unwrap() + token_start;
    let token_one = xml[token_start..token_end].to_string();
    assert!(token_one.starts_with("vsync-1:"));

    request(
        &fixture.server,
        DavMethod::PUT,
        "/alice/calendars/calendar/d.ics",
        &[],
        &event("d", "20240118T120000Z"),
    )
    .await;
    request(
        &fixture.server,
        DavMethod::DELETE,
        "/alice/calendars/calendar/b.ics",
        &[],
        "",
    )
    .await;

    let delta = request(
        &fixture.server,
        DavMethod::REPORT,
        "/alice/calendars/calendar/",
        &[],
        &format!(
            r#"<D:sync-collection xmlns:D="DAV:">
                 <D:sync-token>{token_one}</D:sync-token>
                 <D:sync-level>1</D:sync-level>
                 <D:prop><D:getetag/></D:prop>
               </D:sync-collection>"#
        ),
    )
    .await;
    assert_eq!(delta.status().as_u16(), 207);
    let xml = delta.xml();
    assert_eq!(xml.matches("<D:response>").count(), 2);
    assert!(xml.contains("d.ics"));
    assert!(xml.contains("b.ics"));
    assert!(xml.contains("404 Not Found"));
    assert!(!xml.contains(&token_one));
    assert!(xml.contains("<D:sync-token>vsync-1:"));

    // A token from nowhere is stale.
    let stale = request(
        &fixture.server,
        DavMethod::REPORT,
        "/alice/calendars/calendar/",
        &[],
        r#"<D:sync-collection xmlns:D="DAV:">
             <D:sync-token>vsync-1:ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff</D:sync-token>
             <D:sync-level>1</D:sync-level>
             <D:prop><D:getetag/></D:prop>
           </D:sync-collection>"#,
    )
    .await;
    assert_eq!(stale.status().as_u16(), 403);
    assert!(stale.xml().contains("<D:valid-sync-token/>"));
}

#[tokio::test]
async fn autocreate_defaults_builds_home_sets() {
    let fixture = test_server();
    let options = request(&fixture.server, DavMethod::OPTIONS, "/alice/", &[], "").await;
    assert_eq!(options.status().as_u16(), 200);
    let dav_header = options
        .headers()
        .iter()
        .find(|(name, _)| *name == "DAV")
        .map(|(_, value)| value.clone())
        .unwrap();
    assert!(dav_header.contains("calendar-access"));
    assert!(dav_header.contains("addressbook"));
    assert!(dav_header.contains("extended-mkcol"));

    let listing = request(
        &fixture.server,
        DavMethod::PROPFIND,
        "/alice/",
        &[("Depth", "1")],
        r#"<propfind xmlns="DAV:"><prop><resourcetype/></prop></propfind>"#,
    )
    .await;
    assert_eq!(listing.status().as_u16(), 207);
    let xml = listing.xml();
    assert!(xml.contains("<D:href>/alice/calendars/</D:href>"));
    assert!(xml.contains("<D:href>/alice/contacts/</D:href>"));

    let deep = request(
        &fixture.server,
        DavMethod::PROPFIND,
        "/alice/",
        &[("Depth", "infinity")],
        r#"<propfind xmlns="DAV:"><prop><resourcetype/></prop></propfind>"#,
    )
    .await;
    let xml = deep.xml();
    assert!(xml.contains("<D:href>/alice/calendars/calendar/</D:href>"));
    assert!(xml.contains("<D:href>/alice/contacts/addressbook/</D:href>"));
}

#[tokio::test]
async fn copy_and_move_between_collections() {
    let fixture = test_server();
    fixture
        .server
        .backend
        .ensure_principal("alice", true)
        .unwrap();
    // Second calendar next to the default one.
    let mkcal = request(
        &fixture.server,
        DavMethod::MKCALENDAR,
        "/alice/calendars/work/",
        &[],
        "",
    )
    .await;
    assert_eq!(mkcal.status().as_u16(), 201);

    request(
        &fixture.server,
        DavMethod::PUT,
        "/alice/calendars/calendar/evt.ics",
        &[],
        &event("evt", "20240115T120000Z"),
    )
    .await;

    let copy = request(
        &fixture.server,
        DavMethod::COPY,
        "/alice/calendars/calendar/evt.ics",
        &[("Destination", "/alice/calendars/work/evt.ics")],
        "",
    )
    .await;
    assert_eq!(copy.status().as_u16(), 201);

    // Copy again without overwrite permission.
    let blocked = request(
        &fixture.server,
        DavMethod::COPY,
        "/alice/calendars/calendar/evt.ics",
        &[
            ("Destination", "/alice/calendars/work/evt.ics"),
            ("Overwrite", "F"),
        ],
        "",
    )
    .await;
    assert_eq!(blocked.status().as_u16(), 412);

    let moved = request(
        &fixture.server,
        DavMethod::MOVE,
        "/alice/calendars/calendar/evt.ics",
        &[("Destination", "/alice/calendars/work/moved.ics")],
        "",
    )
    .await;
    // The UID already exists in the destination collection.
    assert_eq!(moved.status().as_u16(), 409);

    let renamed = request(
        &fixture.server,
        DavMethod::MOVE,
        "/alice/calendars/calendar/evt.ics",
        &[("Destination", "/alice/calendars/calendar/renamed.ics")],
        "",
    )
    .await;
    assert_eq!(renamed.status().as_u16(), 201);
    let gone = request(
        &fixture.server,
        DavMethod::GET,
        "/alice/calendars/calendar/evt.ics",
        &[],
        "",
    )
    .await;
    assert_eq!(gone.status().as_u16(), 404);
}

#[tokio::test]
async fn proppatch_round_trips_and_refuses_protected() {
    let fixture = test_server();
    let patch = request(
        &fixture.server,
        DavMethod::PROPPATCH,
        "/alice/calendars/calendar/",
        &[],
        r#"<D:propertyupdate xmlns:D="DAV:" xmlns:IC="http://apple.com/ns/ical/">
             <D:set><D:prop>
               <D:displayname>Family</D:displayname>
               <IC:calendar-color>#ff0000ff</IC:calendar-color>
             </D:prop></D:set>
           </D:propertyupdate>"#,
    )
    .await;
    assert_eq!(patch.status().as_u16(), 207);
    assert!(patch.xml().contains("HTTP/1.1 200 OK"));

    let read_back = request(
        &fixture.server,
        DavMethod::PROPFIND,
        "/alice/calendars/calendar/",
        &[("Depth", "0")],
        r#"<D:propfind xmlns:D="DAV:" xmlns:IC="http://apple.com/ns/ical/">
             <D:prop><D:displayname/><IC:calendar-color/></D:prop></D:propfind>"#,
    )
    .await;
    assert!(read_back.xml().contains("<D:displayname>Family</D:displayname>"));
    assert!(read_back.xml().contains("#ff0000ff"));

    // Protected properties and unknown names both refuse the whole batch.
    let refused = request(
        &fixture.server,
        DavMethod::PROPPATCH,
        "/alice/calendars/calendar/",
        &[],
        r#"<D:propertyupdate xmlns:D="DAV:">
             <D:set><D:prop>
               <D:getetag>forged</D:getetag>
               <D:displayname>ignored</D:displayname>
             </D:prop></D:set>
           </D:propertyupdate>"#,
    )
    .await;
    assert_eq!(refused.status().as_u16(), 207);
    let xml = refused.xml();
    assert!(xml.contains("HTTP/1.1 403 Forbidden"));
    assert!(xml.contains("<D:cannot-modify-protected-property/>"));
    assert!(xml.contains("424 Failed Dependency"));

    let unchanged = request(
        &fixture.server,
        DavMethod::PROPFIND,
        "/alice/calendars/calendar/",
        &[("Depth", "0")],
        r#"<propfind xmlns="DAV:"><prop><displayname/></prop></propfind>"#,
    )
    .await;
    assert!(unchanged.xml().contains("<D:displayname>Family</D:displayname>"));
}

#[tokio::test]
async fn post_add_member_allocates_a_name() {
    let fixture = test_server();
    let response = request(
        &fixture.server,
        DavMethod::POST,
        "/alice/calendars/calendar/",
        &[("Content-Type", "text/calendar")],
        &event("fresh-uid", "20240115T120000Z"),
    )
    .await;
    assert_eq!(response.status().as_u16(), 201);
    let location = response
        .headers()
        .iter()
        .find(|(name, _)| *name == "Location")
        .map(|(_, value)| value.clone())
        .unwrap();
    assert_eq!(location, "/alice/calendars/calendar/fresh-uid.ics");

    let fetched = request(&fixture.server, DavMethod::GET, &location, &[], "").await;
    assert_eq!(fetched.status().as_u16(), 200);
}

#[tokio::test]
async fn addressbook_query_matches_text() {
    let fixture = test_server();
    let card = "BEGIN:VCARD\r\nVERSION:3.0\r\nUID:c1\r\nFN:Jane Doe\r\n\
                NICKNAME:jd\r\nEMAIL:jane@example.com\r\nEND:VCARD\r\n";
    let put = request(
        &fixture.server,
        DavMethod::PUT,
        "/alice/contacts/addressbook/c1.vcf",
        &[("Content-Type", "text/vcard")],
        card,
    )
    .await;
    assert_eq!(put.status().as_u16(), 201);

    let report = request(
        &fixture.server,
        DavMethod::REPORT,
        "/alice/contacts/addressbook/",
        &[],
        r#"<C:addressbook-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:carddav">
             <D:prop><D:getetag/><C:address-data/></D:prop>
             <C:filter>
               <C:prop-filter name="NICKNAME">
                 <C:text-match collation="i;ascii-casemap" match-type="equals">jd</C:text-match>
               </C:prop-filter>
             </C:filter>
           </C:addressbook-query>"#,
    )
    .await;
    assert_eq!(report.status().as_u16(), 207);
    assert!(report.xml().contains("c1.vcf"));
    assert!(report.xml().contains("BEGIN:VCARD"));

    let miss = request(
        &fixture.server,
        DavMethod::REPORT,
        "/alice/contacts/addressbook/",
        &[],
        r#"<C:addressbook-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:carddav">
             <D:prop><D:getetag/></D:prop>
             <C:filter>
               <C:prop-filter name="NICKNAME">
                 <C:text-match match-type="equals">nonesuch</C:text-match>
               </C:prop-filter>
             </C:filter>
           </C:addressbook-query>"#,
    )
    .await;
    assert!(!miss.xml().contains("c1.vcf"));
}

#[tokio::test]
async fn free_busy_query_reports_busy_periods() {
    let fixture = test_server();
    request(
        &fixture.server,
        DavMethod::PUT,
        "/alice/calendars/calendar/busy.ics",
        &[],
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:busy\r\n\
         DTSTAMP:20240101T000000Z\r\nDTSTART:20240115T120000Z\r\n\
         DTEND:20240115T130000Z\r\nSUMMARY:Busy block\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
    )
    .await;

    let response = request(
        &fixture.server,
        DavMethod::REPORT,
        "/alice/calendars/calendar/",
        &[],
        r#"<C:free-busy-query xmlns:C="urn:ietf:params:xml:ns:caldav">
             <C:time-range start="20240101T000000Z" end="20240201T000000Z"/>
           </C:free-busy-query>"#,
    )
    .await;
    assert_eq!(response.status().as_u16(), 200);
    let (status, _, content_type, bytes) = response.body_bytes();
    assert_eq!(status.as_u16(), 200);
    assert!(content_type.starts_with("text/calendar"));
    let body = String::from_utf8(bytes).unwrap();
    assert!(body.contains("BEGIN:VFREEBUSY"));
    assert!(body.contains("20240115T120000Z/20240115T130000Z"));
}

#[tokio::test]
async fn lock_is_advertised_unimplemented() {
    let fixture = test_server();
    let response = request(
        &fixture.server,
        DavMethod::LOCK,
        "/alice/calendars/calendar/",
        &[],
        "",
    )
    .await;
    assert_eq!(response.status().as_u16(), 501);
}
