/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod property;
pub mod request;
pub mod response;

use std::borrow::Cow;
use std::fmt::Display;

/// XML namespaces understood by the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Dav,
    CalDav,
    CardDav,
    CalendarServer,
    AppleIcal,
}

impl Namespace {
    pub fn try_parse(ns: &[u8]) -> Option<Self> {
        match ns {
            b"DAV:" => Some(Namespace::Dav),
            b"urn:ietf:params:xml:ns:caldav" => Some(Namespace::CalDav),
            b"urn:ietf:params:xml:ns:carddav" => Some(Namespace::CardDav),
            b"http://calendarserver.org/ns/" => Some(Namespace::CalendarServer),
            b"http://apple.com/ns/ical/" => Some(Namespace::AppleIcal),
            _ => None,
        }
    }

    pub fn namespace(&self) -> &'static str {
        match self {
            Namespace::Dav => "DAV:",
            Namespace::CalDav => "urn:ietf:params:xml:ns:caldav",
            Namespace::CardDav => "urn:ietf:params:xml:ns:carddav",
            Namespace::CalendarServer => "http://calendarserver.org/ns/",
            Namespace::AppleIcal => "http://apple.com/ns/ical/",
        }
    }

    /// Prefix used when serialising responses.
    pub fn prefix(&self) -> &'static str {
        match self {
            Namespace::Dav => "D",
            Namespace::CalDav => "A",
            Namespace::CardDav => "B",
            Namespace::CalendarServer => "CS",
            Namespace::AppleIcal => "IC",
        }
    }
}

/// Namespace declarations emitted on a response root element. `DAV:` is
/// always declared; the others only when a property in the body needs them.
#[derive(Debug, Default, Clone, Copy)]
pub struct Namespaces {
    pub cal: bool,
    pub card: bool,
    pub cs: bool,
    pub apple: bool,
}

impl Namespaces {
    pub fn set(&mut self, ns: Namespace) {
        match ns {
            Namespace::Dav => {}
            Namespace::CalDav => self.cal = true,
            Namespace::CardDav => self.card = true,
            Namespace::CalendarServer => self.cs = true,
            Namespace::AppleIcal => self.apple = true,
        }
    }
}

impl Display for Namespaces {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "xmlns:D=\"DAV:\"")?;
        if self.cal {
            write!(f, " xmlns:A=\"urn:ietf:params:xml:ns:caldav\"")?;
        }
        if self.card {
            write!(f, " xmlns:B=\"urn:ietf:params:xml:ns:carddav\"")?;
        }
        if self.cs {
            write!(f, " xmlns:CS=\"http://calendarserver.org/ns/\"")?;
        }
        if self.apple {
            write!(f, " xmlns:IC=\"http://apple.com/ns/ical/\"")?;
        }
        Ok(())
    }
}

/// Local element names that appear in request bodies. The pair of a
/// `Namespace` and an `Element` identifies an element; the same local name
/// may occur under more than one namespace (`filter`, `prop`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    AddMember,
    AddressData,
    Addressbook,
    AddressbookDescription,
    AddressbookHomeSet,
    AddressbookMultiget,
    AddressbookQuery,
    Allprop,
    Calendar,
    CalendarColor,
    CalendarData,
    CalendarDescription,
    CalendarHomeSet,
    CalendarMultiget,
    CalendarOrder,
    CalendarQuery,
    CalendarTimezone,
    CalendarUserAddressSet,
    Collection,
    Comp,
    CompFilter,
    Creationdate,
    CurrentUserPrincipal,
    Displayname,
    Expand,
    ExpandProperty,
    Filter,
    FreeBusyQuery,
    Getcontentlanguage,
    Getcontentlength,
    Getcontenttype,
    Getctag,
    Getetag,
    Getlastmodified,
    GroupMembership,
    Href,
    Include,
    IsNotDefined,
    Limit,
    LimitFreebusySet,
    LimitRecurrenceSet,
    Lockdiscovery,
    MaxAttendeesPerInstance,
    MaxDateTime,
    MaxInstances,
    MaxResourceSize,
    MinDateTime,
    Mkcalendar,
    Mkcol,
    Multistatus,
    Nresults,
    ParamFilter,
    Principal,
    PrincipalMatch,
    PrincipalProperty,
    PrincipalUrl,
    Prop,
    PropFilter,
    Property,
    Propertyupdate,
    Propfind,
    Propname,
    Refreshrate,
    Remove,
    Resourcetype,
    ScheduleInboxUrl,
    ScheduleOutboxUrl,
    Self_,
    Set,
    Source,
    SupportedAddressData,
    SupportedCalendarComponentSet,
    SupportedCalendarData,
    SupportedCollationSet,
    SupportedLock,
    SupportedReportSet,
    SyncCollection,
    SyncLevel,
    SyncToken,
    TextMatch,
    TimeRange,
    Timezone,
    TimezoneId,
}

impl Element {
    pub fn try_parse(name: &[u8]) -> Option<Self> {
        match name {
            b"add-member" => Some(Element::AddMember),
            b"address-data" => Some(Element::AddressData),
            b"addressbook" => Some(Element::Addressbook),
            b"addressbook-description" => Some(Element::AddressbookDescription),
            b"addressbook-home-set" => Some(Element::AddressbookHomeSet),
            b"addressbook-multiget" => Some(Element::AddressbookMultiget),
            b"addressbook-query" => Some(Element::AddressbookQuery),
            b"allprop" => Some(Element::Allprop),
            b"calendar" => Some(Element::Calendar),
            b"calendar-color" => Some(Element::CalendarColor),
            b"calendar-data" => Some(Element::CalendarData),
            b"calendar-description" => Some(Element::CalendarDescription),
            b"calendar-home-set" => Some(Element::CalendarHomeSet),
            b"calendar-multiget" => Some(Element::CalendarMultiget),
            b"calendar-order" => Some(Element::CalendarOrder),
            b"calendar-query" => Some(Element::CalendarQuery),
            b"calendar-timezone" => Some(Element::CalendarTimezone),
            b"calendar-user-address-set" => Some(Element::CalendarUserAddressSet),
            b"collection" => Some(Element::Collection),
            b"comp" => Some(Element::Comp),
            b"comp-filter" => Some(Element::CompFilter),
            b"creationdate" => Some(Element::Creationdate),
            b"current-user-principal" => Some(Element::CurrentUserPrincipal),
            b"displayname" => Some(Element::Displayname),
            b"expand" => Some(Element::Expand),
            b"expand-property" => Some(Element::ExpandProperty),
            b"filter" => Some(Element::Filter),
            b"free-busy-query" => Some(Element::FreeBusyQuery),
            b"getcontentlanguage" => Some(Element::Getcontentlanguage),
            b"getcontentlength" => Some(Element::Getcontentlength),
            b"getcontenttype" => Some(Element::Getcontenttype),
            b"getctag" => Some(Element::Getctag),
            b"getetag" => Some(Element::Getetag),
            b"getlastmodified" => Some(Element::Getlastmodified),
            b"group-membership" => Some(Element::GroupMembership),
            b"href" => Some(Element::Href),
            b"include" => Some(Element::Include),
            b"is-not-defined" => Some(Element::IsNotDefined),
            b"limit" => Some(Element::Limit),
            b"limit-freebusy-set" => Some(Element::LimitFreebusySet),
            b"limit-recurrence-set" => Some(Element::LimitRecurrenceSet),
            b"lockdiscovery" => Some(Element::Lockdiscovery),
            b"max-attendees-per-instance" => Some(Element::MaxAttendeesPerInstance),
            b"max-date-time" => Some(Element::MaxDateTime),
            b"max-instances" => Some(Element::MaxInstances),
            b"max-resource-size" => Some(Element::MaxResourceSize),
            b"min-date-time" => Some(Element::MinDateTime),
            b"mkcalendar" => Some(Element::Mkcalendar),
            b"mkcol" => Some(Element::Mkcol),
            b"multistatus" => Some(Element::Multistatus),
            b"nresults" => Some(Element::Nresults),
            b"param-filter" => Some(Element::ParamFilter),
            b"principal" => Some(Element::Principal),
            b"principal-match" => Some(Element::PrincipalMatch),
            b"principal-property" => Some(Element::PrincipalProperty),
            b"principal-URL" => Some(Element::PrincipalUrl),
            b"prop" => Some(Element::Prop),
            b"prop-filter" => Some(Element::PropFilter),
            b"property" => Some(Element::Property),
            b"propertyupdate" => Some(Element::Propertyupdate),
            b"propfind" => Some(Element::Propfind),
            b"propname" => Some(Element::Propname),
            b"refreshrate" => Some(Element::Refreshrate),
            b"remove" => Some(Element::Remove),
            b"resourcetype" => Some(Element::Resourcetype),
            b"schedule-inbox-URL" => Some(Element::ScheduleInboxUrl),
            b"schedule-outbox-URL" => Some(Element::ScheduleOutboxUrl),
            b"self" => Some(Element::Self_),
            b"set" => Some(Element::Set),
            b"source" => Some(Element::Source),
            b"supported-address-data" => Some(Element::SupportedAddressData),
            b"supported-calendar-component-set" => Some(Element::SupportedCalendarComponentSet),
            b"supported-calendar-data" => Some(Element::SupportedCalendarData),
            b"supported-collation-set" => Some(Element::SupportedCollationSet),
            b"supportedlock" => Some(Element::SupportedLock),
            b"supported-report-set" => Some(Element::SupportedReportSet),
            b"sync-collection" => Some(Element::SyncCollection),
            b"sync-level" => Some(Element::SyncLevel),
            b"sync-token" => Some(Element::SyncToken),
            b"text-match" => Some(Element::TextMatch),
            b"time-range" => Some(Element::TimeRange),
            b"timezone" => Some(Element::Timezone),
            b"timezone-id" => Some(Element::TimezoneId),
            _ => None,
        }
    }
}

/// A namespace-qualified element name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamedElement {
    pub ns: Namespace,
    pub element: Element,
}

impl NamedElement {
    pub fn dav(element: Element) -> Self {
        NamedElement {
            ns: Namespace::Dav,
            element,
        }
    }

    pub fn caldav(element: Element) -> Self {
        NamedElement {
            ns: Namespace::CalDav,
            element,
        }
    }

    pub fn carddav(element: Element) -> Self {
        NamedElement {
            ns: Namespace::CardDav,
            element,
        }
    }
}

/// Text collations for `text-match` (RFC 4790 registry subset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Collation {
    #[default]
    AsciiCasemap,
    Octet,
    UnicodeCasemap,
}

impl Collation {
    pub fn try_parse(value: &str) -> Option<Self> {
        match value {
            "i;ascii-casemap" => Some(Collation::AsciiCasemap),
            "i;octet" => Some(Collation::Octet),
            "i;unicode-casemap" => Some(Collation::UnicodeCasemap),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Collation::AsciiCasemap => "i;ascii-casemap",
            Collation::Octet => "i;octet",
            Collation::UnicodeCasemap => "i;unicode-casemap",
        }
    }
}

impl Display for Collation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchType {
    #[default]
    Contains,
    Equals,
    StartsWith,
    EndsWith,
}

impl MatchType {
    pub fn try_parse(value: &str) -> Option<Self> {
        hashify::tiny_map!(value.as_bytes(),
            "contains" => MatchType::Contains,
            "equals" => MatchType::Equals,
            "starts-with" => MatchType::StartsWith,
            "ends-with" => MatchType::EndsWith
        )
    }
}

/// A decoded XML attribute on a filter or data element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute<T> {
    Name(T),
    Collation(Collation),
    MatchType(MatchType),
    NegateCondition(bool),
    NoValue(bool),
    TestAllOf(bool),
    Start(i64),
    End(i64),
}

/// Types that can be read out of a `name="..."` attribute.
pub trait AttributeValue: Sized {
    fn from_attr(s: &str) -> Option<Self>;
}

impl AttributeValue for String {
    fn from_attr(s: &str) -> Option<Self> {
        Some(s.to_string())
    }
}

impl<T: AttributeValue> Attribute<T> {
    pub fn from_param(key: &[u8], value: Cow<'_, str>) -> Option<Self> {
        match key {
            b"name" => T::from_attr(&value).map(Attribute::Name),
            b"collation" => Collation::try_parse(&value).map(Attribute::Collation),
            b"match-type" => MatchType::try_parse(&value).map(Attribute::MatchType),
            b"negate-condition" => Some(Attribute::NegateCondition(value.as_ref() == "yes")),
            b"novalue" => Some(Attribute::NoValue(value.as_ref() == "yes")),
            b"test" => Some(Attribute::TestAllOf(value.as_ref() == "allof")),
            b"start" => parse_ical_utc(&value).map(Attribute::Start),
            b"end" => parse_ical_utc(&value).map(Attribute::End),
            _ => None,
        }
    }
}

/// Parses the `start`/`end` attribute format of RFC 4791 (`YYYYMMDDTHHMMSSZ`,
/// with a date-only fallback) into a UTC timestamp.
pub(crate) fn parse_ical_utc(value: &str) -> Option<i64> {
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ") {
        Some(dt.and_utc().timestamp())
    } else {
        chrono::NaiveDate::parse_from_str(value, "%Y%m%d")
            .ok()
            .map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp())
    }
}

/// Formats a UTC timestamp in the RFC 5545 UTC form used on the wire.
pub fn format_ical_utc(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y%m%dT%H%M%SZ").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_attribute_round_trip() {
        let ts = parse_ical_utc("20240115T120000Z").unwrap();
        assert_eq!(format_ical_utc(ts), "20240115T120000Z");
        assert_eq!(parse_ical_utc("20240115"), parse_ical_utc("20240115T000000Z"));
        assert_eq!(parse_ical_utc("not-a-date"), None);
    }

    #[test]
    fn element_lookup_is_case_sensitive() {
        assert_eq!(Element::try_parse(b"propfind"), Some(Element::Propfind));
        assert_eq!(Element::try_parse(b"PROPFIND"), None);
        assert_eq!(Element::try_parse(b"principal-URL"), Some(Element::PrincipalUrl));
    }
}
