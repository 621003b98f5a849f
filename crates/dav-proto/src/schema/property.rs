/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use calcard::{
    icalendar::{ICalendarComponentType, ICalendarProperty},
    vcard::VCardProperty,
};

use super::{Collation, Namespace, NamedElement, response::Href};

/// A property name as it appears in `prop`, `set`, `remove` and report
/// bodies. Unknown names are retained verbatim so they can be echoed back
/// with a 404 (PROPFIND) or refused with a 403 (PROPPATCH).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DavProperty {
    WebDav(WebDavProperty),
    Cal(CalDavProperty),
    Card(CardDavProperty),
    Principal(PrincipalProperty),
    Dead(DeadElementTag),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebDavProperty {
    CreationDate,
    DisplayName,
    GetContentLanguage,
    GetContentLength,
    GetContentType,
    GetETag,
    GetLastModified,
    ResourceType,
    LockDiscovery,
    SupportedLock,
    SupportedReportSet,
    CurrentUserPrincipal,
    PrincipalUrl,
    SyncToken,
    AddMember,
    // calendarserver.org extensions
    GetCTag,
    Source,
    RefreshRate,
    // apple.com/ns/ical
    CalendarColor,
    CalendarOrder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalDavProperty {
    CalendarDescription,
    CalendarTimezone,
    SupportedCalendarComponentSet,
    SupportedCalendarData,
    SupportedCollationSet,
    MaxResourceSize,
    MinDateTime,
    MaxDateTime,
    MaxInstances,
    MaxAttendeesPerInstance,
    CalendarData(CalendarData),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardDavProperty {
    AddressbookDescription,
    SupportedAddressData,
    SupportedCollationSet,
    MaxResourceSize,
    AddressData(Vec<CardPropertyName>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalProperty {
    CalendarHomeSet,
    AddressbookHomeSet,
    CalendarUserAddressSet,
    ScheduleInboxUrl,
    ScheduleOutboxUrl,
    GroupMembership,
}

/// An element name the schema does not know, kept for echoing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadElementTag {
    pub ns: Option<String>,
    pub name: String,
}

/// The sub-element structure of `{CALDAV:}calendar-data` in reports.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CalendarData {
    pub properties: Vec<CalPropertyName>,
    pub expand: Option<TimeRange>,
    pub limit_recurrence: Option<TimeRange>,
    pub limit_freebusy: Option<TimeRange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalPropertyName {
    pub component: Option<ICalendarComponentType>,
    pub name: Option<ICalendarProperty>,
    pub no_value: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardPropertyName {
    pub group: Option<String>,
    pub name: VCardProperty,
    pub no_value: bool,
}

/// A UTC time window. Open bounds use the integer extremes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn open() -> Self {
        TimeRange {
            start: i64::MIN,
            end: i64::MAX,
        }
    }

    /// RFC 4791 section 9.9 overlap: zero-length instants match when they
    /// sit on the start boundary, spans when they intersect half-open.
    pub fn overlaps(&self, start: i64, end: i64) -> bool {
        if start == end {
            self.start <= start && self.end > start
        } else {
            self.start < end && self.end > start
        }
    }
}

/// A property paired with a serialisable value, the unit a `propstat`
/// groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavPropertyValue {
    pub property: DavProperty,
    pub value: DavValue,
}

impl DavPropertyValue {
    pub fn new(property: DavProperty, value: DavValue) -> Self {
        DavPropertyValue { property, value }
    }

    pub fn empty(property: DavProperty) -> Self {
        DavPropertyValue {
            property,
            value: DavValue::Null,
        }
    }
}

/// Serialisable property values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DavValue {
    Null,
    String(String),
    Uint64(u64),
    /// RFC 3339, used by `creationdate`.
    Rfc3339Date(i64),
    /// RFC 1123, used by `getlastmodified`.
    Rfc1123Date(i64),
    /// Raw calendar/address payload, emitted CDATA-escaped.
    CData(String),
    Href(Vec<Href>),
    ResourceTypes(Vec<ResourceType>),
    ReportSets(Vec<ReportSet>),
    Components(Vec<ICalendarComponentType>),
    Collations(Vec<Collation>),
    SupportedCalendarData,
    SupportedAddressData,
    /// Nested responses produced by the expand-property report.
    Responses(Vec<super::response::Response>),
}

impl From<String> for DavValue {
    fn from(value: String) -> Self {
        DavValue::String(value)
    }
}

impl From<&str> for DavValue {
    fn from(value: &str) -> Self {
        DavValue::String(value.to_string())
    }
}

impl From<u64> for DavValue {
    fn from(value: u64) -> Self {
        DavValue::Uint64(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Collection,
    Principal,
    Calendar,
    Addressbook,
    ScheduleInbox,
    ScheduleOutbox,
    Subscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportSet {
    SyncCollection,
    ExpandProperty,
    PrincipalMatch,
    CalendarQuery,
    CalendarMultiGet,
    FreeBusyQuery,
    AddressbookQuery,
    AddressbookMultiGet,
}

impl ReportSet {
    pub fn calendar() -> Vec<ReportSet> {
        vec![
            ReportSet::SyncCollection,
            ReportSet::ExpandProperty,
            ReportSet::PrincipalMatch,
            ReportSet::CalendarQuery,
            ReportSet::CalendarMultiGet,
            ReportSet::FreeBusyQuery,
        ]
    }

    pub fn addressbook() -> Vec<ReportSet> {
        vec![
            ReportSet::SyncCollection,
            ReportSet::ExpandProperty,
            ReportSet::PrincipalMatch,
            ReportSet::AddressbookQuery,
            ReportSet::AddressbookMultiGet,
        ]
    }

    pub fn collection() -> Vec<ReportSet> {
        vec![
            ReportSet::SyncCollection,
            ReportSet::ExpandProperty,
            ReportSet::PrincipalMatch,
        ]
    }
}

impl DavProperty {
    pub fn from_element(name: NamedElement) -> Option<DavProperty> {
        use super::Element;
        Some(match (name.ns, name.element) {
            (Namespace::Dav, Element::Creationdate) => {
                DavProperty::WebDav(WebDavProperty::CreationDate)
            }
            (Namespace::Dav, Element::Displayname) => {
                DavProperty::WebDav(WebDavProperty::DisplayName)
            }
            (Namespace::Dav, Element::Getcontentlanguage) => {
                DavProperty::WebDav(WebDavProperty::GetContentLanguage)
            }
            (Namespace::Dav, Element::Getcontentlength) => {
                DavProperty::WebDav(WebDavProperty::GetContentLength)
            }
            (Namespace::Dav, Element::Getcontenttype) => {
                DavProperty::WebDav(WebDavProperty::GetContentType)
            }
            (Namespace::Dav, Element::Getetag) => DavProperty::WebDav(WebDavProperty::GetETag),
            (Namespace::Dav, Element::Getlastmodified) => {
                DavProperty::WebDav(WebDavProperty::GetLastModified)
            }
            (Namespace::Dav, Element::Resourcetype) => {
                DavProperty::WebDav(WebDavProperty::ResourceType)
            }
            (Namespace::Dav, Element::Lockdiscovery) => {
                DavProperty::WebDav(WebDavProperty::LockDiscovery)
            }
            (Namespace::Dav, Element::SupportedLock) => {
                DavProperty::WebDav(WebDavProperty::SupportedLock)
            }
            (Namespace::Dav, Element::SupportedReportSet) => {
                DavProperty::WebDav(WebDavProperty::SupportedReportSet)
            }
            (Namespace::Dav, Element::CurrentUserPrincipal) => {
                DavProperty::WebDav(WebDavProperty::CurrentUserPrincipal)
            }
            (Namespace::Dav, Element::PrincipalUrl) => {
                DavProperty::WebDav(WebDavProperty::PrincipalUrl)
            }
            (Namespace::Dav, Element::SyncToken) => DavProperty::WebDav(WebDavProperty::SyncToken),
            (Namespace::Dav, Element::AddMember) => DavProperty::WebDav(WebDavProperty::AddMember),
            (Namespace::Dav, Element::GroupMembership) => {
                DavProperty::Principal(PrincipalProperty::GroupMembership)
            }
            (Namespace::CalendarServer, Element::Getctag) => {
                DavProperty::WebDav(WebDavProperty::GetCTag)
            }
            (Namespace::CalendarServer, Element::Source) => {
                DavProperty::WebDav(WebDavProperty::Source)
            }
            (Namespace::CalendarServer, Element::Refreshrate) => {
                DavProperty::WebDav(WebDavProperty::RefreshRate)
            }
            (Namespace::AppleIcal, Element::CalendarColor) => {
                DavProperty::WebDav(WebDavProperty::CalendarColor)
            }
            (Namespace::AppleIcal, Element::CalendarOrder) => {
                DavProperty::WebDav(WebDavProperty::CalendarOrder)
            }
            (Namespace::CalDav, Element::CalendarDescription) => {
                DavProperty::Cal(CalDavProperty::CalendarDescription)
            }
            (Namespace::CalDav, Element::CalendarTimezone) => {
                DavProperty::Cal(CalDavProperty::CalendarTimezone)
            }
            (Namespace::CalDav, Element::SupportedCalendarComponentSet) => {
                DavProperty::Cal(CalDavProperty::SupportedCalendarComponentSet)
            }
            (Namespace::CalDav, Element::SupportedCalendarData) => {
                DavProperty::Cal(CalDavProperty::SupportedCalendarData)
            }
            (Namespace::CalDav, Element::SupportedCollationSet) => {
                DavProperty::Cal(CalDavProperty::SupportedCollationSet)
            }
            (Namespace::CalDav, Element::MaxResourceSize) => {
                DavProperty::Cal(CalDavProperty::MaxResourceSize)
            }
            (Namespace::CalDav, Element::MinDateTime) => {
                DavProperty::Cal(CalDavProperty::MinDateTime)
            }
            (Namespace::CalDav, Element::MaxDateTime) => {
                DavProperty::Cal(CalDavProperty::MaxDateTime)
            }
            (Namespace::CalDav, Element::MaxInstances) => {
                DavProperty::Cal(CalDavProperty::MaxInstances)
            }
            (Namespace::CalDav, Element::MaxAttendeesPerInstance) => {
                DavProperty::Cal(CalDavProperty::MaxAttendeesPerInstance)
            }
            (Namespace::CalDav, Element::CalendarData) => {
                DavProperty::Cal(CalDavProperty::CalendarData(CalendarData::default()))
            }
            (Namespace::CalDav, Element::CalendarHomeSet) => {
                DavProperty::Principal(PrincipalProperty::CalendarHomeSet)
            }
            (Namespace::CalDav, Element::CalendarUserAddressSet) => {
                DavProperty::Principal(PrincipalProperty::CalendarUserAddressSet)
            }
            (Namespace::CalDav, Element::ScheduleInboxUrl) => {
                DavProperty::Principal(PrincipalProperty::ScheduleInboxUrl)
            }
            (Namespace::CalDav, Element::ScheduleOutboxUrl) => {
                DavProperty::Principal(PrincipalProperty::ScheduleOutboxUrl)
            }
            (Namespace::CardDav, Element::AddressbookDescription) => {
                DavProperty::Card(CardDavProperty::AddressbookDescription)
            }
            (Namespace::CardDav, Element::SupportedAddressData) => {
                DavProperty::Card(CardDavProperty::SupportedAddressData)
            }
            (Namespace::CardDav, Element::SupportedCollationSet) => {
                DavProperty::Card(CardDavProperty::SupportedCollationSet)
            }
            (Namespace::CardDav, Element::MaxResourceSize) => {
                DavProperty::Card(CardDavProperty::MaxResourceSize)
            }
            (Namespace::CardDav, Element::AddressData) => {
                DavProperty::Card(CardDavProperty::AddressData(Vec::new()))
            }
            (Namespace::CardDav, Element::AddressbookHomeSet) => {
                DavProperty::Principal(PrincipalProperty::AddressbookHomeSet)
            }
            _ => return None,
        })
    }

    /// True when two names refer to the same property, disregarding any
    /// sub-element payload (`calendar-data` selections and the like).
    pub fn same_name(&self, other: &DavProperty) -> bool {
        match (self, other) {
            (DavProperty::Cal(CalDavProperty::CalendarData(_)), DavProperty::Cal(CalDavProperty::CalendarData(_))) => true,
            (DavProperty::Card(CardDavProperty::AddressData(_)), DavProperty::Card(CardDavProperty::AddressData(_))) => true,
            (a, b) => a == b,
        }
    }
}

impl From<DavProperty> for DavPropertyValue {
    fn from(property: DavProperty) -> Self {
        DavPropertyValue {
            property,
            value: DavValue::Null,
        }
    }
}
