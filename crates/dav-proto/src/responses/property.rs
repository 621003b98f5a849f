/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::fmt::Display;

use super::escape;
use crate::schema::{
    Namespace,
    property::{
        CalDavProperty, CardDavProperty, DavProperty, DavPropertyValue, DavValue,
        PrincipalProperty, ReportSet, ResourceType, WebDavProperty,
    },
};

impl DavProperty {
    /// The namespace and local name this property serialises under.
    pub fn tag(&self) -> (Namespace, &str) {
        match self {
            DavProperty::WebDav(prop) => match prop {
                WebDavProperty::CreationDate => (Namespace::Dav, "creationdate"),
                WebDavProperty::DisplayName => (Namespace::Dav, "displayname"),
                WebDavProperty::GetContentLanguage => (Namespace::Dav, "getcontentlanguage"),
                WebDavProperty::GetContentLength => (Namespace::Dav, "getcontentlength"),
                WebDavProperty::GetContentType => (Namespace::Dav, "getcontenttype"),
                WebDavProperty::GetETag => (Namespace::Dav, "getetag"),
                WebDavProperty::GetLastModified => (Namespace::Dav, "getlastmodified"),
                WebDavProperty::ResourceType => (Namespace::Dav, "resourcetype"),
                WebDavProperty::LockDiscovery => (Namespace::Dav, "lockdiscovery"),
                WebDavProperty::SupportedLock => (Namespace::Dav, "supportedlock"),
                WebDavProperty::SupportedReportSet => (Namespace::Dav, "supported-report-set"),
                WebDavProperty::CurrentUserPrincipal => {
                    (Namespace::Dav, "current-user-principal")
                }
                WebDavProperty::PrincipalUrl => (Namespace::Dav, "principal-URL"),
                WebDavProperty::SyncToken => (Namespace::Dav, "sync-token"),
                WebDavProperty::AddMember => (Namespace::Dav, "add-member"),
                WebDavProperty::GetCTag => (Namespace::CalendarServer, "getctag"),
                WebDavProperty::Source => (Namespace::CalendarServer, "source"),
                WebDavProperty::RefreshRate => (Namespace::CalendarServer, "refreshrate"),
                WebDavProperty::CalendarColor => (Namespace::AppleIcal, "calendar-color"),
                WebDavProperty::CalendarOrder => (Namespace::AppleIcal, "calendar-order"),
            },
            DavProperty::Cal(prop) => match prop {
                CalDavProperty::CalendarDescription => {
                    (Namespace::CalDav, "calendar-description")
                }
                CalDavProperty::CalendarTimezone => (Namespace::CalDav, "calendar-timezone"),
                CalDavProperty::SupportedCalendarComponentSet => {
                    (Namespace::CalDav, "supported-calendar-component-set")
                }
                CalDavProperty::SupportedCalendarData => {
                    (Namespace::CalDav, "supported-calendar-data")
                }
                CalDavProperty::SupportedCollationSet => {
                    (Namespace::CalDav, "supported-collation-set")
                }
                CalDavProperty::MaxResourceSize => (Namespace::CalDav, "max-resource-size"),
                CalDavProperty::MinDateTime => (Namespace::CalDav, "min-date-time"),
                CalDavProperty::MaxDateTime => (Namespace::CalDav, "max-date-time"),
                CalDavProperty::MaxInstances => (Namespace::CalDav, "max-instances"),
                CalDavProperty::MaxAttendeesPerInstance => {
                    (Namespace::CalDav, "max-attendees-per-instance")
                }
                CalDavProperty::CalendarData(_) => (Namespace::CalDav, "calendar-data"),
            },
            DavProperty::Card(prop) => match prop {
                CardDavProperty::AddressbookDescription => {
                    (Namespace::CardDav, "addressbook-description")
                }
                CardDavProperty::SupportedAddressData => {
                    (Namespace::CardDav, "supported-address-data")
                }
                CardDavProperty::SupportedCollationSet => {
                    (Namespace::CardDav, "supported-collation-set")
                }
                CardDavProperty::MaxResourceSize => (Namespace::CardDav, "max-resource-size"),
                CardDavProperty::AddressData(_) => (Namespace::CardDav, "address-data"),
            },
            DavProperty::Principal(prop) => match prop {
                PrincipalProperty::CalendarHomeSet => (Namespace::CalDav, "calendar-home-set"),
                PrincipalProperty::AddressbookHomeSet => {
                    (Namespace::CardDav, "addressbook-home-set")
                }
                PrincipalProperty::CalendarUserAddressSet => {
                    (Namespace::CalDav, "calendar-user-address-set")
                }
                PrincipalProperty::ScheduleInboxUrl => (Namespace::CalDav, "schedule-inbox-URL"),
                PrincipalProperty::ScheduleOutboxUrl => {
                    (Namespace::CalDav, "schedule-outbox-URL")
                }
                PrincipalProperty::GroupMembership => (Namespace::Dav, "group-membership"),
            },
            DavProperty::Dead(tag) => (Namespace::Dav, tag.name.as_str()),
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.tag().0
    }
}

impl Display for DavPropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let DavProperty::Dead(tag) = &self.property {
            // Dead names round-trip with their own namespace declaration.
            return match &tag.ns {
                Some(ns) => write!(f, "<{} xmlns=\"{}\"/>", tag.name, escape(ns)),
                None => write!(f, "<{}/>", tag.name),
            };
        }

        let (ns, name) = self.property.tag();
        let prefix = ns.prefix();
        if matches!(self.value, DavValue::Null) {
            return write!(f, "<{prefix}:{name}/>");
        }

        write!(f, "<{prefix}:{name}>")?;
        match &self.value {
            DavValue::Null => unreachable!(),
            DavValue::String(value) => write!(f, "{}", escape(value))?,
            DavValue::Uint64(value) => write!(f, "{value}")?,
            DavValue::Rfc3339Date(ts) => {
                if let Some(dt) = chrono::DateTime::from_timestamp(*ts, 0) {
                    write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%SZ"))?;
                }
            }
            DavValue::Rfc1123Date(ts) => {
                if let Some(dt) = chrono::DateTime::from_timestamp(*ts, 0) {
                    write!(f, "{}", dt.format("%a, %d %b %Y %H:%M:%S GMT"))?;
                }
            }
            DavValue::CData(value) => write_cdata(f, value)?,
            DavValue::Href(hrefs) => {
                for href in hrefs {
                    href.fmt(f)?;
                }
            }
            DavValue::ResourceTypes(types) => {
                for typ in types {
                    typ.fmt(f)?;
                }
            }
            DavValue::ReportSets(reports) => {
                for report in reports {
                    write!(f, "<D:supported-report><D:report>{report}</D:report></D:supported-report>")?;
                }
            }
            DavValue::Components(components) => {
                for component in components {
                    write!(f, "<A:comp name=\"{}\"/>", component.as_str())?;
                }
            }
            DavValue::Collations(collations) => {
                let prefix = ns.prefix();
                for collation in collations {
                    write!(
                        f,
                        "<{prefix}:supported-collation>{collation}</{prefix}:supported-collation>"
                    )?;
                }
            }
            DavValue::SupportedCalendarData => {
                write!(
                    f,
                    "<A:calendar-data content-type=\"text/calendar\" version=\"2.0\"/>"
                )?;
            }
            DavValue::SupportedAddressData => {
                write!(
                    f,
                    "<B:address-data content-type=\"text/vcard\" version=\"3.0\"/>\
                     <B:address-data content-type=\"text/vcard\" version=\"4.0\"/>"
                )?;
            }
            DavValue::Responses(responses) => {
                for response in responses {
                    response.fmt(f)?;
                }
            }
        }
        write!(f, "</{prefix}:{name}>")
    }
}

impl Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Collection => write!(f, "<D:collection/>"),
            ResourceType::Principal => write!(f, "<D:principal/>"),
            ResourceType::Calendar => write!(f, "<A:calendar/>"),
            ResourceType::Addressbook => write!(f, "<B:addressbook/>"),
            ResourceType::ScheduleInbox => write!(f, "<A:schedule-inbox/>"),
            ResourceType::ScheduleOutbox => write!(f, "<A:schedule-outbox/>"),
            ResourceType::Subscribed => write!(f, "<CS:subscribed/>"),
        }
    }
}

impl Display for ReportSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportSet::SyncCollection => write!(f, "<D:sync-collection/>"),
            ReportSet::ExpandProperty => write!(f, "<D:expand-property/>"),
            ReportSet::PrincipalMatch => write!(f, "<D:principal-match/>"),
            ReportSet::CalendarQuery => write!(f, "<A:calendar-query/>"),
            ReportSet::CalendarMultiGet => write!(f, "<A:calendar-multiget/>"),
            ReportSet::FreeBusyQuery => write!(f, "<A:free-busy-query/>"),
            ReportSet::AddressbookQuery => write!(f, "<B:addressbook-query/>"),
            ReportSet::AddressbookMultiGet => write!(f, "<B:addressbook-multiget/>"),
        }
    }
}

/// Writes raw payload bytes inside CDATA, splitting any `]]>` the payload
/// itself contains.
fn write_cdata(f: &mut std::fmt::Formatter<'_>, value: &str) -> std::fmt::Result {
    write!(f, "<![CDATA[")?;
    let mut rest = value;
    while let Some(pos) = rest.find("]]>") {
        write!(f, "{}]]]]><![CDATA[>", &rest[..pos])?;
        rest = &rest[pos + 3..];
    }
    write!(f, "{rest}]]>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        Namespaces,
        property::{DavProperty, DavValue, WebDavProperty},
        response::{MultiStatus, PropStat, Response},
    };
    use hyper::StatusCode;

    #[test]
    fn serialises_propstat_multistatus() {
        let mut multistatus = MultiStatus::new().with_namespace(Namespace::CalDav);
        multistatus.add_response(Response::new_propstat(
            "/alice/calendars/calendar/",
            vec![
                PropStat::with_status(
                    vec![DavPropertyValue::empty(DavProperty::WebDav(
                        WebDavProperty::GetContentLength,
                    ))],
                    StatusCode::NOT_FOUND,
                ),
                PropStat::ok(vec![DavPropertyValue::new(
                    DavProperty::WebDav(WebDavProperty::DisplayName),
                    DavValue::String("calendar".to_string()),
                )]),
            ],
        ));

        let xml = multistatus.to_string();
        assert!(xml.starts_with(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <D:multistatus xmlns:D=\"DAV:\" xmlns:A=\"urn:ietf:params:xml:ns:caldav\">"
        ));
        // 200 propstat is emitted before the 404 one.
        let ok = xml.find("HTTP/1.1 200 OK").unwrap();
        let not_found = xml.find("HTTP/1.1 404 Not Found").unwrap();
        assert!(ok < not_found);
        assert!(xml.contains("<D:displayname>calendar</D:displayname>"));
        assert!(xml.contains("<D:getcontentlength/>"));
    }

    #[test]
    fn escapes_text_and_cdata() {
        let value = DavPropertyValue::new(
            DavProperty::WebDav(WebDavProperty::DisplayName),
            DavValue::String("a <b> & c".to_string()),
        );
        assert_eq!(
            value.to_string(),
            "<D:displayname>a &lt;b&gt; &amp; c</D:displayname>"
        );

        let value = DavPropertyValue::new(
            DavProperty::Cal(crate::schema::property::CalDavProperty::CalendarData(
                Default::default(),
            )),
            DavValue::CData("BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n".to_string()),
        );
        assert!(value.to_string().contains("<![CDATA[BEGIN:VCALENDAR"));
    }

    #[test]
    fn namespace_declarations_follow_flags() {
        let mut namespaces = Namespaces::default();
        namespaces.set(Namespace::CardDav);
        namespaces.set(Namespace::CalendarServer);
        assert_eq!(
            namespaces.to_string(),
            "xmlns:D=\"DAV:\" xmlns:B=\"urn:ietf:params:xml:ns:carddav\" \
             xmlns:CS=\"http://calendarserver.org/ns/\""
        );
    }
}
