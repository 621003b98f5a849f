/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use quick_xml::{NsReader, events::Event, name::ResolveResult};

use super::{Error, RawElement, Result, Token, XmlValueParser};
use crate::schema::{Attribute, AttributeValue, Element, NamedElement, Namespace};

/// Streaming tokenizer over a request body. Namespace resolution happens
/// here; parsers above it only see qualified [`NamedElement`]s. External
/// entities are never resolved, which keeps the reader XXE-safe.
pub struct Tokenizer<'x> {
    xml: NsReader<&'x [u8]>,
    pending_end: bool,
}

impl<'x> Tokenizer<'x> {
    pub fn new(input: &'x [u8]) -> Self {
        let mut xml = NsReader::from_reader(input);
        xml.config_mut().trim_text(true);
        Tokenizer {
            xml,
            pending_end: false,
        }
    }

    pub fn token(&mut self) -> Result<Token<'x>> {
        if self.pending_end {
            self.pending_end = false;
            return Ok(Token::ElementEnd);
        }

        loop {
            let (ns, event) = self.xml.read_resolved_event()?;
            let tag = match event {
                Event::Start(tag) => tag,
                Event::Empty(tag) => {
                    // An empty element is reported as a start immediately
                    // followed by a synthetic end.
                    self.pending_end = true;
                    tag
                }
                Event::End(_) => return Ok(Token::ElementEnd),
                Event::Text(text) if !text.iter().all(|ch| ch.is_ascii_whitespace()) => {
                    return text
                        .unescape()
                        .map(Token::Text)
                        .map_err(|err| Error::Xml(Box::new(err)));
                }
                Event::CData(data) => return Ok(Token::Bytes(data.into_inner())),
                Event::Eof => return Ok(Token::Eof),
                _ => continue,
            };

            let token = match ns {
                ResolveResult::Bound(raw_ns) if !raw_ns.as_ref().is_empty() => {
                    match (
                        Namespace::try_parse(raw_ns.as_ref()),
                        Element::try_parse(tag.local_name().as_ref()),
                    ) {
                        (Some(ns), Some(element)) => Token::ElementStart {
                            name: NamedElement { ns, element },
                            raw: RawElement::new(tag),
                        },
                        _ => Token::UnknownElement(
                            RawElement::new(tag).with_namespace(std::borrow::Cow::Owned(
                                raw_ns.as_ref().to_vec(),
                            )),
                        ),
                    }
                }
                ResolveResult::Unknown(prefix) => {
                    return Err(Error::Xml(Box::new(quick_xml::Error::Namespace(
                        quick_xml::name::NamespaceError::UnknownPrefix(prefix),
                    ))));
                }
                _ => Token::UnknownElement(RawElement::new(tag)),
            };
            return Ok(token);
        }
    }

    /// Returns the next element start, failing on anything else.
    pub fn unwrap_named_element(&mut self) -> Result<NamedElement> {
        match self.token()? {
            Token::ElementStart { name, .. } => Ok(name),
            found => Err(found.into_unexpected()),
        }
    }

    pub fn expect_named_element(&mut self, expected: NamedElement) -> Result<()> {
        match self.token()? {
            Token::ElementStart { name, .. } if name == expected => Ok(()),
            found => Err(Error::UnexpectedToken {
                expected: None,
                found: format!("{} (expected {expected:?})", found.describe()),
            }),
        }
    }

    pub fn expect_element_end(&mut self) -> Result<()> {
        match self.token()? {
            Token::ElementEnd => Ok(()),
            found => Err(Error::UnexpectedToken {
                expected: Some("element end"),
                found: found.describe(),
            }),
        }
    }

    /// Skips to the end of the current element, consuming any subtree.
    pub fn seek_element_end(&mut self) -> Result<()> {
        let mut depth = 1;
        loop {
            match self.token()? {
                Token::ElementStart { .. } | Token::UnknownElement(_) => depth += 1,
                Token::ElementEnd => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Token::Eof => return Err(Token::Eof.into_unexpected()),
                _ => {}
            }
        }
    }

    /// Collects the text content of the current element, ignoring markup.
    pub fn collect_string_value(&mut self) -> Result<Option<String>> {
        let mut depth = 1;
        let mut value = None;
        loop {
            match self.token()? {
                Token::ElementStart { .. } | Token::UnknownElement(_) => depth += 1,
                Token::ElementEnd => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                Token::Text(text) => value = Some(text.into_owned()),
                Token::Bytes(bytes) => {
                    value = Some(String::from_utf8_lossy(&bytes).into_owned())
                }
                Token::Eof => return Err(Token::Eof.into_unexpected()),
            }
        }
        Ok(value)
    }

    pub fn parse_value<T: XmlValueParser>(&mut self) -> Result<Option<T>> {
        Ok(self
            .collect_string_value()?
            .as_deref()
            .and_then(T::parse_text))
    }
}

impl RawElement<'_> {
    /// Decodes the attributes of this element into typed [`Attribute`]s,
    /// skipping namespace declarations and anything unknown.
    pub fn attributes<T: AttributeValue>(&self) -> Result<Vec<Attribute<T>>> {
        let mut attributes = Vec::new();
        for attr in self.element.attributes() {
            let attr = attr?;
            if attr.key.as_ref().starts_with(b"xmlns") {
                continue;
            }
            let value = attr
                .unescape_value()
                .map_err(|err| Error::Xml(Box::new(err)))?;
            if let Some(attribute) = Attribute::from_param(attr.key.as_ref(), value) {
                attributes.push(attribute);
            }
        }
        Ok(attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Collation, MatchType};

    #[derive(Debug, PartialEq)]
    enum Flat {
        Start(Namespace, Element),
        Attr(Attribute<String>),
        End,
        Text(String),
    }

    fn flatten(input: &str) -> Vec<Flat> {
        let mut tokenizer = Tokenizer::new(input.as_bytes());
        let mut out = Vec::new();
        loop {
            match tokenizer.token().unwrap() {
                Token::ElementStart { name, raw } => {
                    out.push(Flat::Start(name.ns, name.element));
                    for attr in raw.attributes::<String>().unwrap() {
                        out.push(Flat::Attr(attr));
                    }
                }
                Token::UnknownElement(_) => {}
                Token::ElementEnd => out.push(Flat::End),
                Token::Text(text) => out.push(Flat::Text(text.into_owned())),
                Token::Bytes(_) => {}
                Token::Eof => break,
            }
        }
        out
    }

    #[test]
    fn tokenizes_calendar_query() {
        let out = flatten(
            r#"<?xml version="1.0" encoding="utf-8" ?>
               <C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
                 <D:prop><D:getetag/><C:calendar-data/></D:prop>
                 <C:filter>
                   <C:comp-filter name="VCALENDAR">
                     <C:comp-filter name="VEVENT">
                       <C:time-range start="20240101T000000Z" end="20240201T000000Z"/>
                     </C:comp-filter>
                   </C:comp-filter>
                 </C:filter>
               </C:calendar-query>"#,
        );
        assert_eq!(
            out,
            vec![
                Flat::Start(Namespace::CalDav, Element::CalendarQuery),
                Flat::Start(Namespace::Dav, Element::Prop),
                Flat::Start(Namespace::Dav, Element::Getetag),
                Flat::End,
                Flat::Start(Namespace::CalDav, Element::CalendarData),
                Flat::End,
                Flat::End,
                Flat::Start(Namespace::CalDav, Element::Filter),
                Flat::Start(Namespace::CalDav, Element::CompFilter),
                Flat::Attr(Attribute::Name("VCALENDAR".to_string())),
                Flat::Start(Namespace::CalDav, Element::CompFilter),
                Flat::Attr(Attribute::Name("VEVENT".to_string())),
                Flat::Start(Namespace::CalDav, Element::TimeRange),
                Flat::Attr(Attribute::Start(1704067200)),
                Flat::Attr(Attribute::End(1706745600)),
                Flat::End,
                Flat::End,
                Flat::End,
                Flat::End,
                Flat::End,
            ]
        );
    }

    #[test]
    fn tokenizes_text_match_attributes() {
        let out = flatten(
            r#"<C:text-match xmlns:C="urn:ietf:params:xml:ns:carddav"
                 collation="i;octet" match-type="equals"
                 negate-condition="yes">me</C:text-match>"#,
        );
        assert_eq!(
            out,
            vec![
                Flat::Start(Namespace::CardDav, Element::TextMatch),
                Flat::Attr(Attribute::Collation(Collation::Octet)),
                Flat::Attr(Attribute::MatchType(MatchType::Equals)),
                Flat::Attr(Attribute::NegateCondition(true)),
                Flat::Text("me".to_string()),
                Flat::End,
            ]
        );
    }

    #[test]
    fn unknown_elements_are_reported_not_fatal() {
        let mut tokenizer =
            Tokenizer::new(br#"<x:custom xmlns:x="urn:example:x"><x:inner/></x:custom>"#.as_slice());
        assert!(matches!(
            tokenizer.token().unwrap(),
            Token::UnknownElement(_)
        ));
        tokenizer.seek_element_end().unwrap();
        assert!(matches!(tokenizer.token().unwrap(), Token::Eof));
    }
}
