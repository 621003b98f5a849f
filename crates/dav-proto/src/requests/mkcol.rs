/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::{
    parser::{DavParser, Result, Token, tokenizer::Tokenizer},
    schema::{Element, NamedElement, Namespace, request::MkCol},
};

impl DavParser for MkCol {
    fn parse(stream: &mut Tokenizer<'_>) -> Result<Self> {
        let mut mkcol = match stream.unwrap_named_element()? {
            NamedElement {
                ns: Namespace::Dav,
                element: Element::Mkcol,
            } => MkCol::default(),
            NamedElement {
                ns: Namespace::CalDav,
                element: Element::Mkcalendar,
            } => MkCol {
                is_mkcalendar: true,
                ..MkCol::default()
            },
            name => return Err(name.into_unexpected()),
        };

        loop {
            match stream.token()? {
                Token::ElementStart { name, .. } => {
                    if name.ns == Namespace::Dav && name.element == Element::Set {
                        stream.expect_named_element(NamedElement::dav(Element::Prop))?;
                        stream.collect_property_values(&mut mkcol.props)?;
                        stream.expect_element_end()?;
                    } else {
                        stream.seek_element_end()?;
                    }
                }
                Token::UnknownElement(_) => stream.seek_element_end()?,
                Token::ElementEnd | Token::Eof => break,
                token => return Err(token.into_unexpected()),
            }
        }

        Ok(mkcol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::property::{DavProperty, DavValue, ResourceType, WebDavProperty};

    #[test]
    fn parses_extended_mkcol() {
        let body = br#"<?xml version="1.0"?>
            <D:mkcol xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
              <D:set><D:prop>
                <D:resourcetype><D:collection/><C:calendar/></D:resourcetype>
                <D:displayname>Work</D:displayname>
              </D:prop></D:set>
            </D:mkcol>"#;
        let mkcol = MkCol::parse(&mut Tokenizer::new(body)).unwrap();
        assert!(!mkcol.is_mkcalendar);
        assert_eq!(
            mkcol.props[0].value,
            DavValue::ResourceTypes(vec![ResourceType::Collection, ResourceType::Calendar])
        );
        assert_eq!(
            mkcol.props[1].property,
            DavProperty::WebDav(WebDavProperty::DisplayName)
        );
    }

    #[test]
    fn parses_mkcalendar() {
        let body = br#"<C:mkcalendar xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
              <D:set><D:prop><D:displayname>calendar</D:displayname></D:prop></D:set>
            </C:mkcalendar>"#;
        let mkcol = MkCol::parse(&mut Tokenizer::new(body)).unwrap();
        assert!(mkcol.is_mkcalendar);
        assert_eq!(mkcol.props.len(), 1);
    }
}
