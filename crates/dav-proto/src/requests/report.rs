/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use calcard::{
    icalendar::{ICalendarComponentType, ICalendarParameterName},
    vcard::VCardParameterName,
};

use crate::{
    parser::{
        DavParser, RawElement, Result, Token,
        property::{VCardPropertyWithGroup, time_range_from_attrs},
        tokenizer::Tokenizer,
    },
    schema::{
        Attribute, Collation, Element, MatchType, NamedElement, Namespace,
        property::DavProperty,
        request::{
            AddressbookQuery, CalendarQuery, CardParamFilter, CardPropFilter, CompFilter,
            ExpandProperty, ExpandPropertyItem, FreeBusyQuery, MultiGet, ParamFilter,
            PrincipalMatch, PropFilter, PropFind, Report, SyncCollection, TextMatch,
        },
    },
};

impl DavParser for Report {
    fn parse(stream: &mut Tokenizer<'_>) -> Result<Self> {
        match stream.unwrap_named_element()? {
            NamedElement {
                ns: Namespace::CalDav,
                element: Element::CalendarQuery,
            } => CalendarQuery::parse_body(stream).map(Report::CalendarQuery),
            NamedElement {
                ns: Namespace::CalDav,
                element: Element::CalendarMultiget,
            } => MultiGet::parse_body(stream).map(Report::CalendarMultiGet),
            NamedElement {
                ns: Namespace::CalDav,
                element: Element::FreeBusyQuery,
            } => FreeBusyQuery::parse_body(stream).map(Report::FreeBusyQuery),
            NamedElement {
                ns: Namespace::CardDav,
                element: Element::AddressbookQuery,
            } => AddressbookQuery::parse_body(stream).map(Report::AddressbookQuery),
            NamedElement {
                ns: Namespace::CardDav,
                element: Element::AddressbookMultiget,
            } => MultiGet::parse_body(stream).map(Report::AddressbookMultiGet),
            NamedElement {
                ns: Namespace::Dav,
                element: Element::SyncCollection,
            } => SyncCollection::parse_body(stream).map(Report::SyncCollection),
            NamedElement {
                ns: Namespace::Dav,
                element: Element::ExpandProperty,
            } => ExpandProperty::parse_body(stream).map(Report::ExpandProperty),
            NamedElement {
                ns: Namespace::Dav,
                element: Element::PrincipalMatch,
            } => PrincipalMatch::parse_body(stream).map(Report::PrincipalMatch),
            name => Err(name.into_unexpected()),
        }
    }
}

impl CalendarQuery {
    fn parse_body(stream: &mut Tokenizer<'_>) -> Result<Self> {
        let mut query = CalendarQuery {
            properties: PropFind::AllProp(Vec::new()),
            filter: Vec::new(),
            timezone: None,
        };

        loop {
            match stream.token()? {
                Token::ElementStart { name, .. } => match name {
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::Prop,
                    } => {
                        query.properties = PropFind::Prop(stream.collect_properties(Vec::new())?);
                    }
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::Propname,
                    } => {
                        query.properties = PropFind::PropName;
                        stream.expect_element_end()?;
                    }
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::Allprop,
                    } => {
                        stream.expect_element_end()?;
                    }
                    NamedElement {
                        ns: Namespace::CalDav,
                        element: Element::Filter,
                    } => {
                        query.filter = parse_comp_filters(stream)?;
                    }
                    NamedElement {
                        ns: Namespace::CalDav,
                        element: Element::Timezone,
                    }
                    | NamedElement {
                        ns: Namespace::CalDav,
                        element: Element::TimezoneId,
                    } => {
                        query.timezone = stream.collect_string_value()?;
                    }
                    name => return Err(name.into_unexpected()),
                },
                Token::UnknownElement(_) => stream.seek_element_end()?,
                Token::ElementEnd | Token::Eof => break,
                token => return Err(token.into_unexpected()),
            }
        }

        Ok(query)
    }
}

/// Parses the `comp-filter` children of a `filter` (or enclosing
/// `comp-filter`) element; the stream is positioned inside the parent.
fn parse_comp_filters(stream: &mut Tokenizer<'_>) -> Result<Vec<CompFilter>> {
    let mut filters = Vec::new();
    loop {
        match stream.token()? {
            Token::ElementStart { name, raw } => {
                if name.ns == Namespace::CalDav && name.element == Element::CompFilter {
                    filters.push(parse_comp_filter(stream, &raw)?);
                } else {
                    stream.seek_element_end()?;
                }
            }
            Token::UnknownElement(_) => stream.seek_element_end()?,
            Token::ElementEnd => break,
            token => return Err(token.into_unexpected()),
        }
    }
    Ok(filters)
}

fn parse_comp_filter(stream: &mut Tokenizer<'_>, raw: &RawElement<'_>) -> Result<CompFilter> {
    let mut filter = CompFilter::named(ICalendarComponentType::VCalendar);
    for attr in raw.attributes::<ICalendarComponentType>()? {
        if let Attribute::Name(name) = attr {
            filter.name = name;
        }
    }

    loop {
        match stream.token()? {
            Token::ElementStart { name, raw } => match name {
                NamedElement {
                    ns: Namespace::CalDav,
                    element: Element::IsNotDefined,
                } => {
                    filter.is_not_defined = true;
                    stream.expect_element_end()?;
                }
                NamedElement {
                    ns: Namespace::CalDav,
                    element: Element::TimeRange,
                } => {
                    filter.time_range = time_range_from_attrs(&raw)?;
                    stream.seek_element_end()?;
                }
                NamedElement {
                    ns: Namespace::CalDav,
                    element: Element::CompFilter,
                } => {
                    filter.comp_filters.push(parse_comp_filter(stream, &raw)?);
                }
                NamedElement {
                    ns: Namespace::CalDav,
                    element: Element::PropFilter,
                } => {
                    filter.prop_filters.push(parse_prop_filter(stream, &raw)?);
                }
                name => return Err(name.into_unexpected()),
            },
            Token::UnknownElement(_) => stream.seek_element_end()?,
            Token::ElementEnd => break,
            token => return Err(token.into_unexpected()),
        }
    }
    Ok(filter)
}

fn parse_prop_filter(stream: &mut Tokenizer<'_>, raw: &RawElement<'_>) -> Result<PropFilter> {
    let mut filter = PropFilter::named(calcard::icalendar::ICalendarProperty::Uid);
    for attr in raw.attributes::<calcard::icalendar::ICalendarProperty>()? {
        if let Attribute::Name(name) = attr {
            filter.name = name;
        }
    }

    loop {
        match stream.token()? {
            Token::ElementStart { name, raw } => match name {
                NamedElement {
                    ns: Namespace::CalDav,
                    element: Element::IsNotDefined,
                } => {
                    filter.is_not_defined = true;
                    stream.expect_element_end()?;
                }
                NamedElement {
                    ns: Namespace::CalDav,
                    element: Element::TimeRange,
                } => {
                    filter.time_range = time_range_from_attrs(&raw)?;
                    stream.seek_element_end()?;
                }
                NamedElement {
                    ns: Namespace::CalDav,
                    element: Element::TextMatch,
                } => {
                    filter.text_match = Some(parse_text_match(stream, &raw)?);
                }
                NamedElement {
                    ns: Namespace::CalDav,
                    element: Element::ParamFilter,
                } => {
                    let mut param = ParamFilter {
                        name: ICalendarParameterName::parse("TZID"),
                        is_not_defined: false,
                        text_match: None,
                    };
                    for attr in raw.attributes::<ICalendarParameterName>()? {
                        if let Attribute::Name(name) = attr {
                            param.name = name;
                        }
                    }
                    parse_param_filter_children(
                        stream,
                        &mut param.is_not_defined,
                        &mut param.text_match,
                        Namespace::CalDav,
                    )?;
                    filter.param_filters.push(param);
                }
                name => return Err(name.into_unexpected()),
            },
            Token::UnknownElement(_) => stream.seek_element_end()?,
            Token::ElementEnd => break,
            token => return Err(token.into_unexpected()),
        }
    }
    Ok(filter)
}

fn parse_param_filter_children(
    stream: &mut Tokenizer<'_>,
    is_not_defined: &mut bool,
    text_match: &mut Option<TextMatch>,
    ns: Namespace,
) -> Result<()> {
    loop {
        match stream.token()? {
            Token::ElementStart { name, raw } => {
                if name.ns == ns && name.element == Element::IsNotDefined {
                    *is_not_defined = true;
                    stream.expect_element_end()?;
                } else if name.ns == ns && name.element == Element::TextMatch {
                    *text_match = Some(parse_text_match(stream, &raw)?);
                } else {
                    stream.seek_element_end()?;
                }
            }
            Token::UnknownElement(_) => stream.seek_element_end()?,
            Token::ElementEnd => break,
            token => return Err(token.into_unexpected()),
        }
    }
    Ok(())
}

fn parse_text_match(stream: &mut Tokenizer<'_>, raw: &RawElement<'_>) -> Result<TextMatch> {
    let mut text_match = TextMatch {
        value: String::new(),
        collation: Collation::AsciiCasemap,
        match_type: MatchType::Contains,
        negate: false,
    };
    for attr in raw.attributes::<String>()? {
        match attr {
            Attribute::Collation(collation) => text_match.collation = collation,
            Attribute::MatchType(match_type) => text_match.match_type = match_type,
            Attribute::NegateCondition(negate) => text_match.negate = negate,
            _ => {}
        }
    }
    text_match.value = stream.collect_string_value()?.unwrap_or_default();
    Ok(text_match)
}

impl AddressbookQuery {
    fn parse_body(stream: &mut Tokenizer<'_>) -> Result<Self> {
        let mut query = AddressbookQuery {
            properties: PropFind::AllProp(Vec::new()),
            all_of: false,
            filter: Vec::new(),
            limit: None,
        };

        loop {
            match stream.token()? {
                Token::ElementStart { name, raw } => match name {
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::Prop,
                    } => {
                        query.properties = PropFind::Prop(stream.collect_properties(Vec::new())?);
                    }
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::Propname,
                    } => {
                        query.properties = PropFind::PropName;
                        stream.expect_element_end()?;
                    }
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::Allprop,
                    } => {
                        stream.expect_element_end()?;
                    }
                    NamedElement {
                        ns: Namespace::CardDav,
                        element: Element::Filter,
                    } => {
                        for attr in raw.attributes::<String>()? {
                            if let Attribute::TestAllOf(all_of) = attr {
                                query.all_of = all_of;
                            }
                        }
                        query.filter = parse_card_prop_filters(stream)?;
                    }
                    NamedElement {
                        ns: Namespace::CardDav,
                        element: Element::Limit,
                    } => {
                        stream.expect_named_element(NamedElement::carddav(Element::Nresults))?;
                        query.limit = stream.parse_value::<u32>()?;
                        stream.expect_element_end()?;
                    }
                    name => return Err(name.into_unexpected()),
                },
                Token::UnknownElement(_) => stream.seek_element_end()?,
                Token::ElementEnd | Token::Eof => break,
                token => return Err(token.into_unexpected()),
            }
        }

        Ok(query)
    }
}

fn parse_card_prop_filters(stream: &mut Tokenizer<'_>) -> Result<Vec<CardPropFilter>> {
    let mut filters = Vec::new();
    loop {
        match stream.token()? {
            Token::ElementStart { name, raw } => {
                if name.ns == Namespace::CardDav && name.element == Element::PropFilter {
                    filters.push(parse_card_prop_filter(stream, &raw)?);
                } else {
                    stream.seek_element_end()?;
                }
            }
            Token::UnknownElement(_) => stream.seek_element_end()?,
            Token::ElementEnd => break,
            token => return Err(token.into_unexpected()),
        }
    }
    Ok(filters)
}

fn parse_card_prop_filter(
    stream: &mut Tokenizer<'_>,
    raw: &RawElement<'_>,
) -> Result<CardPropFilter> {
    let mut filter = CardPropFilter {
        name: calcard::vcard::VCardProperty::Uid,
        group: None,
        all_of: false,
        is_not_defined: false,
        text_matches: Vec::new(),
        param_filters: Vec::new(),
    };
    for attr in raw.attributes::<VCardPropertyWithGroup>()? {
        match attr {
            Attribute::Name(name) => {
                filter.name = name.name;
                filter.group = name.group;
            }
            Attribute::TestAllOf(all_of) => filter.all_of = all_of,
            _ => {}
        }
    }

    loop {
        match stream.token()? {
            Token::ElementStart { name, raw } => match name {
                NamedElement {
                    ns: Namespace::CardDav,
                    element: Element::IsNotDefined,
                } => {
                    filter.is_not_defined = true;
                    stream.expect_element_end()?;
                }
                NamedElement {
                    ns: Namespace::CardDav,
                    element: Element::TextMatch,
                } => {
                    filter.text_matches.push(parse_text_match(stream, &raw)?);
                }
                NamedElement {
                    ns: Namespace::CardDav,
                    element: Element::ParamFilter,
                } => {
                    let mut param = CardParamFilter {
                        name: VCardParameterName::parse("TYPE"),
                        is_not_defined: false,
                        text_match: None,
                    };
                    for attr in raw.attributes::<VCardParameterName>()? {
                        if let Attribute::Name(name) = attr {
                            param.name = name;
                        }
                    }
                    parse_param_filter_children(
                        stream,
                        &mut param.is_not_defined,
                        &mut param.text_match,
                        Namespace::CardDav,
                    )?;
                    filter.param_filters.push(param);
                }
                name => return Err(name.into_unexpected()),
            },
            Token::UnknownElement(_) => stream.seek_element_end()?,
            Token::ElementEnd => break,
            token => return Err(token.into_unexpected()),
        }
    }
    Ok(filter)
}

impl MultiGet {
    fn parse_body(stream: &mut Tokenizer<'_>) -> Result<Self> {
        let mut multiget = MultiGet {
            properties: PropFind::AllProp(Vec::new()),
            hrefs: Vec::new(),
        };

        loop {
            match stream.token()? {
                Token::ElementStart { name, .. } => match name {
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::Prop,
                    } => {
                        multiget.properties =
                            PropFind::Prop(stream.collect_properties(Vec::new())?);
                    }
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::Propname,
                    } => {
                        multiget.properties = PropFind::PropName;
                        stream.expect_element_end()?;
                    }
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::Allprop,
                    } => {
                        stream.expect_element_end()?;
                    }
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::Href,
                    } => {
                        if let Some(href) = stream.collect_string_value()? {
                            multiget.hrefs.push(href);
                        }
                    }
                    name => return Err(name.into_unexpected()),
                },
                Token::UnknownElement(_) => stream.seek_element_end()?,
                Token::ElementEnd | Token::Eof => break,
                token => return Err(token.into_unexpected()),
            }
        }

        Ok(multiget)
    }
}

impl FreeBusyQuery {
    fn parse_body(stream: &mut Tokenizer<'_>) -> Result<Self> {
        let mut range = None;
        loop {
            match stream.token()? {
                Token::ElementStart { name, raw } => {
                    if name.ns == Namespace::CalDav && name.element == Element::TimeRange {
                        range = time_range_from_attrs(&raw)?;
                    }
                    stream.seek_element_end()?;
                }
                Token::UnknownElement(_) => stream.seek_element_end()?,
                Token::ElementEnd | Token::Eof => break,
                token => return Err(token.into_unexpected()),
            }
        }
        Ok(FreeBusyQuery { range })
    }
}

impl SyncCollection {
    fn parse_body(stream: &mut Tokenizer<'_>) -> Result<Self> {
        let mut sync = SyncCollection {
            sync_token: None,
            sync_level_infinite: false,
            limit: None,
            properties: PropFind::AllProp(Vec::new()),
        };

        loop {
            match stream.token()? {
                Token::ElementStart { name, .. } => match name {
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::SyncToken,
                    } => {
                        sync.sync_token = stream.collect_string_value()?.filter(|t| !t.is_empty());
                    }
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::SyncLevel,
                    } => {
                        sync.sync_level_infinite = stream
                            .collect_string_value()?
                            .is_some_and(|level| level.eq_ignore_ascii_case("infinite"));
                    }
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::Limit,
                    } => {
                        stream.expect_named_element(NamedElement::dav(Element::Nresults))?;
                        sync.limit = stream.parse_value::<u32>()?;
                        stream.expect_element_end()?;
                    }
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::Prop,
                    } => {
                        sync.properties = PropFind::Prop(stream.collect_properties(Vec::new())?);
                    }
                    name => return Err(name.into_unexpected()),
                },
                Token::UnknownElement(_) => stream.seek_element_end()?,
                Token::ElementEnd | Token::Eof => break,
                token => return Err(token.into_unexpected()),
            }
        }

        Ok(sync)
    }
}

impl ExpandProperty {
    fn parse_body(stream: &mut Tokenizer<'_>) -> Result<Self> {
        Ok(ExpandProperty {
            properties: parse_expand_items(stream)?,
        })
    }
}

fn parse_expand_items(stream: &mut Tokenizer<'_>) -> Result<Vec<ExpandPropertyItem>> {
    let mut items = Vec::new();
    loop {
        match stream.token()? {
            Token::ElementStart { name, raw } => {
                if name.ns == Namespace::Dav && name.element == Element::Property {
                    let mut property = None;
                    let mut ns = Namespace::Dav;
                    for attr in raw.attributes::<String>()? {
                        match attr {
                            Attribute::Name(name) => property = Some(name),
                            _ => {}
                        }
                    }
                    // RFC 3253 section 3.8 carries the namespace in a
                    // `namespace` attribute; default is DAV:.
                    for attr in raw.element.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() == b"namespace" {
                            if let Some(parsed) = Namespace::try_parse(attr.value.as_ref()) {
                                ns = parsed;
                            }
                        }
                    }
                    let children = parse_expand_items(stream)?;
                    if let Some(property) = property
                        .as_deref()
                        .map(str::as_bytes)
                        .and_then(Element::try_parse)
                        .and_then(|element| {
                            DavProperty::from_element(NamedElement { ns, element })
                        })
                    {
                        items.push(ExpandPropertyItem { property, children });
                    }
                } else {
                    stream.seek_element_end()?;
                }
            }
            Token::UnknownElement(_) => stream.seek_element_end()?,
            Token::ElementEnd | Token::Eof => break,
            token => return Err(token.into_unexpected()),
        }
    }
    Ok(items)
}

impl PrincipalMatch {
    fn parse_body(stream: &mut Tokenizer<'_>) -> Result<Self> {
        let mut report = PrincipalMatch {
            self_: false,
            properties: Vec::new(),
        };
        loop {
            match stream.token()? {
                Token::ElementStart { name, .. } => match name {
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::Self_,
                    } => {
                        report.self_ = true;
                        stream.expect_element_end()?;
                    }
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::Prop,
                    } => {
                        report.properties = stream.collect_properties(Vec::new())?;
                    }
                    _ => stream.seek_element_end()?,
                },
                Token::UnknownElement(_) => stream.seek_element_end()?,
                Token::ElementEnd | Token::Eof => break,
                token => return Err(token.into_unexpected()),
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::property::{DavProperty, WebDavProperty};

    #[test]
    fn parses_calendar_query_with_nested_filters() {
        let body = br#"<?xml version="1.0" encoding="utf-8" ?>
            <C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
              <D:prop><D:getetag/><C:calendar-data/></D:prop>
              <C:filter>
                <C:comp-filter name="VCALENDAR">
                  <C:comp-filter name="VEVENT">
                    <C:time-range start="20240101T000000Z" end="20240201T000000Z"/>
                    <C:prop-filter name="SUMMARY">
                      <C:text-match collation="i;ascii-casemap">meeting</C:text-match>
                    </C:prop-filter>
                  </C:comp-filter>
                </C:comp-filter>
              </C:filter>
            </C:calendar-query>"#;
        let Report::CalendarQuery(query) = Report::parse(&mut Tokenizer::new(body)).unwrap() else {
            panic!("wrong report type");
        };

        assert_eq!(query.filter.len(), 1);
        let root = &query.filter[0];
        assert_eq!(root.name, ICalendarComponentType::VCalendar);
        let event = &root.comp_filters[0];
        assert_eq!(event.name, ICalendarComponentType::VEvent);
        let range = event.time_range.unwrap();
        assert_eq!(range.start, 1704067200);
        assert_eq!(range.end, 1706745600);
        assert_eq!(
            event.prop_filters[0].text_match.as_ref().unwrap().value,
            "meeting"
        );
    }

    #[test]
    fn parses_addressbook_query() {
        let body = br#"<?xml version="1.0"?>
            <C:addressbook-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:carddav">
              <D:prop><D:getetag/><C:address-data/></D:prop>
              <C:filter test="anyof">
                <C:prop-filter name="NICKNAME">
                  <C:text-match collation="i;unicode-casemap" match-type="equals">me</C:text-match>
                </C:prop-filter>
              </C:filter>
              <C:limit><C:nresults>10</C:nresults></C:limit>
            </C:addressbook-query>"#;
        let Report::AddressbookQuery(query) = Report::parse(&mut Tokenizer::new(body)).unwrap()
        else {
            panic!("wrong report type");
        };
        assert!(!query.all_of);
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.filter.len(), 1);
        assert_eq!(query.filter[0].name, calcard::vcard::VCardProperty::Nickname);
        assert_eq!(query.filter[0].text_matches[0].match_type, MatchType::Equals);
    }

    #[test]
    fn parses_sync_collection() {
        let body = br#"<?xml version="1.0"?>
            <D:sync-collection xmlns:D="DAV:">
              <D:sync-token>vsync-1:0123abcd</D:sync-token>
              <D:sync-level>1</D:sync-level>
              <D:limit><D:nresults>100</D:nresults></D:limit>
              <D:prop><D:getetag/></D:prop>
            </D:sync-collection>"#;
        let Report::SyncCollection(sync) = Report::parse(&mut Tokenizer::new(body)).unwrap() else {
            panic!("wrong report type");
        };
        assert_eq!(sync.sync_token.as_deref(), Some("vsync-1:0123abcd"));
        assert!(!sync.sync_level_infinite);
        assert_eq!(sync.limit, Some(100));
        assert_eq!(
            sync.properties,
            PropFind::Prop(vec![DavProperty::WebDav(WebDavProperty::GetETag)])
        );
    }

    #[test]
    fn parses_free_busy_query() {
        let body = br#"<C:free-busy-query xmlns:C="urn:ietf:params:xml:ns:caldav">
              <C:time-range start="20240101T000000Z" end="20240201T000000Z"/>
            </C:free-busy-query>"#;
        let Report::FreeBusyQuery(query) = Report::parse(&mut Tokenizer::new(body)).unwrap() else {
            panic!("wrong report type");
        };
        assert!(query.range.is_some());
    }
}
