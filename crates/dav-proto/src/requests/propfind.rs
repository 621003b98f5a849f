/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::{
    parser::{DavParser, Result, Token, tokenizer::Tokenizer},
    schema::{Element, NamedElement, Namespace, request::PropFind},
};

impl DavParser for PropFind {
    fn parse(stream: &mut Tokenizer<'_>) -> Result<Self> {
        stream.expect_named_element(NamedElement::dav(Element::Propfind))?;
        let mut propfind = PropFind::AllProp(Vec::new());

        loop {
            match stream.token()? {
                Token::ElementStart { name, .. } => match name {
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::Propname,
                    } => {
                        propfind = PropFind::PropName;
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
                        element: Element::Include,
                    } => {
                        // allprop may carry an include list (RFC 4918
                        // section 9.1); merge it into the property set.
                        let extra = stream.collect_properties(Vec::new())?;
                        if let PropFind::AllProp(include) = &mut propfind {
                            include.extend(extra);
                        }
                    }
                    NamedElement {
                        ns: Namespace::Dav,
                        element: Element::Prop,
                    } => {
                        propfind = PropFind::Prop(stream.collect_properties(Vec::new())?);
                    }
                    name => return Err(name.into_unexpected()),
                },
                Token::UnknownElement(_) => stream.seek_element_end()?,
                Token::ElementEnd | Token::Eof => break,
                token => return Err(token.into_unexpected()),
            }
        }

        Ok(propfind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::property::{DavProperty, WebDavProperty};

    #[test]
    fn parses_prop_list() {
        let body = br#"<?xml version="1.0" encoding="utf-8"?>
            <propfind xmlns="DAV:"><prop><displayname/><resourcetype/></prop></propfind>"#;
        let parsed = PropFind::parse(&mut Tokenizer::new(body)).unwrap();
        assert_eq!(
            parsed,
            PropFind::Prop(vec![
                DavProperty::WebDav(WebDavProperty::DisplayName),
                DavProperty::WebDav(WebDavProperty::ResourceType),
            ])
        );
    }

    #[test]
    fn parses_allprop_and_propname() {
        let body = br#"<D:propfind xmlns:D="DAV:"><D:allprop/></D:propfind>"#;
        assert_eq!(
            PropFind::parse(&mut Tokenizer::new(body)).unwrap(),
            PropFind::AllProp(Vec::new())
        );
        let body = br#"<D:propfind xmlns:D="DAV:"><D:propname/></D:propfind>"#;
        assert_eq!(
            PropFind::parse(&mut Tokenizer::new(body)).unwrap(),
            PropFind::PropName
        );
    }
}
