/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use calcard::{
    icalendar::{ICalendarComponentType, ICalendarParameterName, ICalendarProperty},
    vcard::{VCardParameterName, VCardProperty},
};

use super::{
    Collation, MatchType,
    property::{DavProperty, DavPropertyValue, TimeRange},
};

/// Parsed `{DAV:}propfind` body. An absent body is treated as `allprop`
/// (RFC 4918 section 9.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropFind {
    PropName,
    AllProp(Vec<DavProperty>),
    Prop(Vec<DavProperty>),
}

impl Default for PropFind {
    fn default() -> Self {
        PropFind::AllProp(Vec::new())
    }
}

/// Parsed `{DAV:}propertyupdate` body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PropertyUpdate {
    pub set: Vec<DavPropertyValue>,
    pub remove: Vec<DavProperty>,
}

/// Parsed extended MKCOL (RFC 5689) or MKCALENDAR (RFC 4791) body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MkCol {
    pub is_mkcalendar: bool,
    pub props: Vec<DavPropertyValue>,
}

/// The REPORT bodies this server executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    CalendarQuery(CalendarQuery),
    CalendarMultiGet(MultiGet),
    FreeBusyQuery(FreeBusyQuery),
    AddressbookQuery(AddressbookQuery),
    AddressbookMultiGet(MultiGet),
    SyncCollection(SyncCollection),
    ExpandProperty(ExpandProperty),
    PrincipalMatch(PrincipalMatch),
}

impl Report {
    pub fn name(&self) -> &'static str {
        match self {
            Report::CalendarQuery(_) => "calendar-query",
            Report::CalendarMultiGet(_) => "calendar-multiget",
            Report::FreeBusyQuery(_) => "free-busy-query",
            Report::AddressbookQuery(_) => "addressbook-query",
            Report::AddressbookMultiGet(_) => "addressbook-multiget",
            Report::SyncCollection(_) => "sync-collection",
            Report::ExpandProperty(_) => "expand-property",
            Report::PrincipalMatch(_) => "principal-match",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarQuery {
    pub properties: PropFind,
    pub filter: Vec<CompFilter>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressbookQuery {
    pub properties: PropFind,
    pub all_of: bool,
    pub filter: Vec<CardPropFilter>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiGet {
    pub properties: PropFind,
    pub hrefs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeBusyQuery {
    pub range: Option<TimeRange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCollection {
    pub sync_token: Option<String>,
    pub sync_level_infinite: bool,
    pub limit: Option<u32>,
    pub properties: PropFind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandProperty {
    pub properties: Vec<ExpandPropertyItem>,
}

/// One `{DAV:}property` element; nested items expand the hrefs found in
/// the parent property's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandPropertyItem {
    pub property: DavProperty,
    pub children: Vec<ExpandPropertyItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalMatch {
    pub self_: bool,
    pub properties: Vec<DavProperty>,
}

/// CalDAV `comp-filter`: a recursive predicate over one component scope
/// (RFC 4791 section 9.7.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompFilter {
    pub name: ICalendarComponentType,
    pub is_not_defined: bool,
    pub time_range: Option<TimeRange>,
    pub prop_filters: Vec<PropFilter>,
    pub comp_filters: Vec<CompFilter>,
}

impl CompFilter {
    pub fn named(name: ICalendarComponentType) -> Self {
        CompFilter {
            name,
            is_not_defined: false,
            time_range: None,
            prop_filters: Vec::new(),
            comp_filters: Vec::new(),
        }
    }
}

/// CalDAV `prop-filter` (RFC 4791 section 9.7.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropFilter {
    pub name: ICalendarProperty,
    pub is_not_defined: bool,
    pub time_range: Option<TimeRange>,
    pub text_match: Option<TextMatch>,
    pub param_filters: Vec<ParamFilter>,
}

impl PropFilter {
    pub fn named(name: ICalendarProperty) -> Self {
        PropFilter {
            name,
            is_not_defined: false,
            time_range: None,
            text_match: None,
            param_filters: Vec::new(),
        }
    }
}

/// CalDAV `param-filter` (RFC 4791 section 9.7.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamFilter {
    pub name: ICalendarParameterName,
    pub is_not_defined: bool,
    pub text_match: Option<TextMatch>,
}

/// CardDAV `prop-filter` (RFC 6352 section 10.5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardPropFilter {
    pub name: VCardProperty,
    pub group: Option<String>,
    pub all_of: bool,
    pub is_not_defined: bool,
    pub text_matches: Vec<TextMatch>,
    pub param_filters: Vec<CardParamFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardParamFilter {
    pub name: VCardParameterName,
    pub is_not_defined: bool,
    pub text_match: Option<TextMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    pub value: String,
    pub collation: Collation,
    pub match_type: MatchType,
    pub negate: bool,
}

impl TextMatch {
    pub fn contains(value: impl Into<String>) -> Self {
        TextMatch {
            value: value.into(),
            collation: Collation::AsciiCasemap,
            match_type: MatchType::Contains,
            negate: false,
        }
    }
}
