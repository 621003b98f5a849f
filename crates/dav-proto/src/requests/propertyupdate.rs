/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use calcard::icalendar::ICalendarComponentType;

use crate::{
    parser::{DavParser, Result, Token, tokenizer::Tokenizer},
    schema::{
        Attribute, Element, NamedElement, Namespace,
        property::{DavProperty, DavPropertyValue, DavValue, DeadElementTag, ResourceType},
        request::PropertyUpdate,
    },
};

impl DavParser for PropertyUpdate {
    fn parse(stream: &mut Tokenizer<'_>) -> Result<Self> {
        stream.expect_named_element(NamedElement::dav(Element::Propertyupdate))?;
        let mut update = PropertyUpdate::default();

        loop {
            match stream.token()? {
                Token::ElementStart { name, .. } => match name {
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::Set,
                    } => {
                        stream.expect_named_element(NamedElement::dav(Element::Prop))?;
                        stream.collect_property_values(&mut update.set)?;
                        stream.expect_element_end()?;
                    }
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::Remove,
                    } => {
                        stream.expect_named_element(NamedElement::dav(Element::Prop))?;
                        update.remove = stream.collect_properties(std::mem::take(&mut update.remove))?;
                        stream.expect_element_end()?;
                    }
                    name => return Err(name.into_unexpected()),
                },
                Token::UnknownElement(_) => stream.seek_element_end()?,
                Token::ElementEnd | Token::Eof => break,
                token => return Err(token.into_unexpected()),
            }
        }

        Ok(update)
    }
}

impl Tokenizer<'_> {
    /// Parses the children of a `prop` element in a `set` context, keeping
    /// the value each property is being set to. Consumes the closing tag.
    pub fn collect_property_values(&mut self, out: &mut Vec<DavPropertyValue>) -> Result<()> {
        loop {
            match self.token()? {
                Token::ElementStart { name, raw } => {
                    if let Some(property) = DavProperty::from_element(name) {
                        let value = match name {
                            NamedElement {
                                ns: Namespace::Dav,
                                element: Element::Resourcetype,
                            } => self.collect_resource_types()?,
                            NamedElement {
                                ns: Namespace::CalDav,
                                element: Element::SupportedCalendarComponentSet,
                            } => self.collect_component_set()?,
                            _ => match self.collect_string_value()? {
                                Some(text) => DavValue::String(text),
                                None => DavValue::Null,
                            },
                        };
                        out.push(DavPropertyValue::new(property, value));
                    } else {
                        out.push(DavPropertyValue::empty(DavProperty::Dead(DeadElementTag {
                            ns: Some(name.ns.namespace().to_string()),
                            name: raw.local_name(),
                        })));
                        self.seek_element_end()?;
                    }
                }
                Token::UnknownElement(raw) => {
                    out.push(DavPropertyValue::empty(DavProperty::Dead(DeadElementTag {
                        ns: raw.namespace_str(),
                        name: raw.local_name(),
                    })));
                    self.seek_element_end()?;
                }
                Token::ElementEnd => break,
                token => return Err(token.into_unexpected()),
            }
        }
        Ok(())
    }

    fn collect_resource_types(&mut self) -> Result<DavValue> {
        let mut types = Vec::new();
        loop {
            match self.token()? {
                Token::ElementStart { name, .. } => {
                    match (name.ns, name.element) {
                        (Namespace::Dav, Element::Collection) => {
                            types.push(ResourceType::Collection)
                        }
                        (Namespace::Dav, Element::Principal) => types.push(ResourceType::Principal),
                        (Namespace::CalDav, Element::Calendar) => types.push(ResourceType::Calendar),
                        (Namespace::CardDav, Element::Addressbook) => {
                            types.push(ResourceType::Addressbook)
                        }
                        (Namespace::CalendarServer, Element::Source) => {
                            types.push(ResourceType::Subscribed)
                        }
                        _ => {}
                    }
                    self.seek_element_end()?;
                }
                Token::UnknownElement(_) => self.seek_element_end()?,
                Token::ElementEnd => break,
                Token::Text(_) | Token::Bytes(_) => {}
                token => return Err(token.into_unexpected()),
            }
        }
        Ok(DavValue::ResourceTypes(types))
    }

    fn collect_component_set(&mut self) -> Result<DavValue> {
        let mut components = Vec::new();
        loop {
            match self.token()? {
                Token::ElementStart { name, raw } => {
                    if name.ns == Namespace::CalDav && name.element == Element::Comp {
                        for attr in raw.attributes::<ICalendarComponentType>()? {
                            if let Attribute::Name(component) = attr {
                                components.push(component);
                            }
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
        Ok(DavValue::Components(components))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::property::WebDavProperty;

    #[test]
    fn parses_set_and_remove() {
        let body = br#"<?xml version="1.0"?>
            <D:propertyupdate xmlns:D="DAV:" xmlns:IC="http://apple.com/ns/ical/">
              <D:set><D:prop>
                <D:displayname>Family calendar</D:displayname>
                <IC:calendar-color>#ff0000</IC:calendar-color>
              </D:prop></D:set>
              <D:remove><D:prop><D:getcontentlanguage/></D:prop></D:remove>
            </D:propertyupdate>"#;
        let update = PropertyUpdate::parse(&mut Tokenizer::new(body)).unwrap();
        assert_eq!(update.set.len(), 2);
        assert_eq!(
            update.set[0],
            DavPropertyValue::new(
                DavProperty::WebDav(WebDavProperty::DisplayName),
                DavValue::String("Family calendar".to_string())
            )
        );
        assert_eq!(
            update.set[1].property,
            DavProperty::WebDav(WebDavProperty::CalendarColor)
        );
        assert_eq!(
            update.remove,
            vec![DavProperty::WebDav(WebDavProperty::GetContentLanguage)]
        );
    }
}
