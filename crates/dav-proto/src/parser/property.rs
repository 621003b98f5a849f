/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use calcard::{
    icalendar::{ICalendarComponentType, ICalendarParameterName, ICalendarProperty},
    vcard::{VCardParameterName, VCardProperty},
};

use super::{Result, Token, tokenizer::Tokenizer};
use crate::schema::{
    Attribute, AttributeValue, Element, NamedElement, Namespace,
    property::{
        CalDavProperty, CalPropertyName, CalendarData, CardDavProperty, CardPropertyName,
        DavProperty, DeadElementTag, TimeRange,
    },
};

impl AttributeValue for ICalendarComponentType {
    fn from_attr(s: &str) -> Option<Self> {
        Some(
            ICalendarComponentType::try_from(s.as_bytes())
                .unwrap_or_else(|_| ICalendarComponentType::Other(s.to_string())),
        )
    }
}

impl AttributeValue for ICalendarProperty {
    fn from_attr(s: &str) -> Option<Self> {
        Some(
            ICalendarProperty::try_from(s.as_bytes())
                .unwrap_or_else(|_| ICalendarProperty::Other(s.to_string())),
        )
    }
}

impl AttributeValue for ICalendarParameterName {
    fn from_attr(s: &str) -> Option<Self> {
        Some(ICalendarParameterName::parse(s))
    }
}

/// A vCard property name with its optional grouping prefix (`HOME.TEL`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VCardPropertyWithGroup {
    pub group: Option<String>,
    pub name: VCardProperty,
}

impl AttributeValue for VCardPropertyWithGroup {
    fn from_attr(s: &str) -> Option<Self> {
        let (group, name) = match s.split_once('.') {
            Some((group, name)) => (Some(group.to_string()), name),
            None => (None, s),
        };
        Some(VCardPropertyWithGroup {
            group,
            name: VCardProperty::try_from(name.as_bytes())
                .unwrap_or_else(|_| VCardProperty::Other(name.to_string())),
        })
    }
}

impl AttributeValue for VCardParameterName {
    fn from_attr(s: &str) -> Option<Self> {
        Some(VCardParameterName::parse(s))
    }
}

impl Tokenizer<'_> {
    /// Parses the children of a `{DAV:}prop` element into property names,
    /// keeping unknown names as dead tags. Consumes the closing tag of the
    /// `prop` element.
    pub fn collect_properties(&mut self, mut props: Vec<DavProperty>) -> Result<Vec<DavProperty>> {
        loop {
            match self.token()? {
                Token::ElementStart { name, raw } => match name {
                    NamedElement {
                        ns: Namespace::CalDav,
                        element: Element::CalendarData,
                    } => {
                        let data = self.parse_calendar_data(&raw)?;
                        props.push(DavProperty::Cal(CalDavProperty::CalendarData(data)));
                    }
                    NamedElement {
                        ns: Namespace::CardDav,
                        element: Element::AddressData,
                    } => {
                        let names = self.parse_address_data()?;
                        props.push(DavProperty::Card(CardDavProperty::AddressData(names)));
                    }
                    name => {
                        if let Some(prop) = DavProperty::from_element(name) {
                            props.push(prop);
                        } else {
                            props.push(DavProperty::Dead(DeadElementTag {
                                ns: Some(name.ns.namespace().to_string()),
                                name: raw.local_name(),
                            }));
                        }
                        self.seek_element_end()?;
                    }
                },
                Token::UnknownElement(raw) => {
                    props.push(DavProperty::Dead(DeadElementTag {
                        ns: raw.namespace_str(),
                        name: raw.local_name(),
                    }));
                    self.seek_element_end()?;
                }
                Token::ElementEnd => break,
                token => return Err(token.into_unexpected()),
            }
        }
        Ok(props)
    }

    // calendar-data in a report may carry comp/expand/limit children; the
    // attribute form (content-type/version) is not interpreted.
    fn parse_calendar_data(&mut self, _raw: &super::RawElement<'_>) -> Result<CalendarData> {
        let mut data = CalendarData::default();
        struct Frame {
            component: Option<ICalendarComponentType>,
            selected: bool,
        }
        let mut stack: Vec<Frame> = Vec::new();
        let mut depth = 1;

        loop {
            match self.token()? {
                Token::ElementStart { name, raw } => match name.element {
                    Element::Comp if name.ns == Namespace::CalDav => {
                        let mut component = None;
                        for attr in raw.attributes::<ICalendarComponentType>()? {
                            if let Attribute::Name(name) = attr {
                                component = Some(name);
                            }
                        }
                        if let Some(frame) = stack.last_mut() {
                            frame.selected = true;
                        }
                        stack.push(Frame {
                            component,
                            selected: false,
                        });
                        depth += 1;
                    }
                    Element::Prop if name.ns == Namespace::CalDav => {
                        let mut prop = None;
                        let mut no_value = false;
                        for attr in raw.attributes::<ICalendarProperty>()? {
                            match attr {
                                Attribute::Name(name) => prop = Some(name),
                                Attribute::NoValue(v) => no_value = v,
                                _ => {}
                            }
                        }
                        if let Some(prop) = prop {
                            if let Some(frame) = stack.last_mut() {
                                frame.selected = true;
                            }
                            data.properties.push(CalPropertyName {
                                component: stack
                                    .iter()
                                    .rev()
                                    .find_map(|frame| frame.component.clone()),
                                name: Some(prop),
                                no_value,
                            });
                        }
                        self.seek_element_end()?;
                    }
                    Element::Expand if name.ns == Namespace::CalDav => {
                        data.expand = time_range_from_attrs(&raw)?;
                        self.seek_element_end()?;
                    }
                    Element::LimitRecurrenceSet if name.ns == Namespace::CalDav => {
                        data.limit_recurrence = time_range_from_attrs(&raw)?;
                        self.seek_element_end()?;
                    }
                    Element::LimitFreebusySet if name.ns == Namespace::CalDav => {
                        data.limit_freebusy = time_range_from_attrs(&raw)?;
                        self.seek_element_end()?;
                    }
                    _ => {
                        self.seek_element_end()?;
                    }
                },
                Token::UnknownElement(_) => self.seek_element_end()?,
                Token::ElementEnd => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    if let Some(frame) = stack.pop() {
                        // A comp with no selections of its own means the
                        // whole component (RFC 4791 section 9.6.1).
                        if let (Some(component), false) = (frame.component, frame.selected) {
                            if component != ICalendarComponentType::VCalendar {
                                data.properties.push(CalPropertyName {
                                    component: Some(component),
                                    name: None,
                                    no_value: false,
                                });
                            }
                        }
                    }
                }
                Token::Text(_) | Token::Bytes(_) => {}
                token => return Err(token.into_unexpected()),
            }
        }
        Ok(data)
    }

    fn parse_address_data(&mut self) -> Result<Vec<CardPropertyName>> {
        let mut names = Vec::new();
        loop {
            match self.token()? {
                Token::ElementStart { name, raw } => {
                    if name.ns == Namespace::CardDav && name.element == Element::Prop {
                        let mut prop = None;
                        let mut no_value = false;
                        for attr in raw.attributes::<VCardPropertyWithGroup>()? {
                            match attr {
                                Attribute::Name(name) => prop = Some(name),
                                Attribute::NoValue(v) => no_value = v,
                                _ => {}
                            }
                        }
                        if let Some(prop) = prop {
                            names.push(CardPropertyName {
                                group: prop.group,
                                name: prop.name,
                                no_value,
                            });
                        }
                    }
                    self.seek_element_end()?;
                }
                Token::UnknownElement(_) => self.seek_element_end()?,
                Token::ElementEnd => break,
                Token::Text(_) | Token::Bytes(_) => {}
                token => return Err(token.into_unexpected()),
            }
        }
        Ok(names)
    }
}

/// Reads `start`/`end` attributes into a [`TimeRange`]; absent bounds stay
/// open.
pub(crate) fn time_range_from_attrs(raw: &super::RawElement<'_>) -> Result<Option<TimeRange>> {
    let mut range = TimeRange::open();
    let mut seen = false;
    for attr in raw.attributes::<String>()? {
        match attr {
            Attribute::Start(ts) => {
                range.start = ts;
                seen = true;
            }
            Attribute::End(ts) => {
                range.end = ts;
                seen = true;
            }
            _ => {}
        }
    }
    Ok(seen.then_some(range))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::property::WebDavProperty;

    #[test]
    fn collects_known_and_dead_properties() {
        let body = br#"<D:prop xmlns:D="DAV:" xmlns:X="urn:example:x">
            <D:displayname/><D:getetag/><X:frobnicate/><D:no-such-prop/>
        </D:prop>"#;
        let mut tokenizer = Tokenizer::new(body);
        tokenizer.unwrap_named_element().unwrap();
        let props = tokenizer.collect_properties(Vec::new()).unwrap();
        assert_eq!(
            props,
            vec![
                DavProperty::WebDav(WebDavProperty::DisplayName),
                DavProperty::WebDav(WebDavProperty::GetETag),
                DavProperty::Dead(DeadElementTag {
                    ns: Some("urn:example:x".to_string()),
                    name: "frobnicate".to_string(),
                }),
                DavProperty::Dead(DeadElementTag {
                    ns: Some("DAV:".to_string()),
                    name: "no-such-prop".to_string(),
                }),
            ]
        );
    }

    #[test]
    fn parses_calendar_data_selection() {
        let body = br#"<C:calendar-data xmlns:C="urn:ietf:params:xml:ns:caldav">
            <C:comp name="VCALENDAR">
              <C:prop name="VERSION"/>
              <C:comp name="VEVENT">
                <C:prop name="SUMMARY"/>
                <C:prop name="UID"/>
              </C:comp>
            </C:comp>
        </C:calendar-data>"#;
        let mut tokenizer = Tokenizer::new(body);
        tokenizer.unwrap_named_element().unwrap();
        let data = tokenizer
            .parse_calendar_data(&super::super::RawElement::default())
            .unwrap();
        assert_eq!(data.properties.len(), 3);
        assert_eq!(
            data.properties[2].component,
            Some(ICalendarComponentType::VEvent)
        );
        assert_eq!(data.properties[2].name, Some(ICalendarProperty::Uid));
    }
}
