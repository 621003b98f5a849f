/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod header;
pub mod property;
pub mod tokenizer;

use std::borrow::Cow;
use std::fmt::Display;

use quick_xml::events::BytesStart;

use crate::schema::NamedElement;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Xml(Box<quick_xml::Error>),
    UnexpectedToken {
        expected: Option<&'static str>,
        found: String,
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Xml(err) => write!(f, "invalid XML: {err}"),
            Error::UnexpectedToken { expected, found } => {
                if let Some(expected) = expected {
                    write!(f, "expected {expected}, found {found}")
                } else {
                    write!(f, "unexpected {found}")
                }
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(Box::new(err))
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::Xml(Box::new(err.into()))
    }
}

/// An element start event carrying its undecoded attributes, plus the raw
/// namespace for elements the schema does not know.
#[derive(Debug)]
pub struct RawElement<'x> {
    pub element: BytesStart<'x>,
    pub namespace: Option<Cow<'x, [u8]>>,
}

impl Default for RawElement<'_> {
    fn default() -> Self {
        RawElement {
            element: BytesStart::new(""),
            namespace: None,
        }
    }
}

impl<'x> RawElement<'x> {
    pub fn new(element: BytesStart<'x>) -> Self {
        RawElement {
            element,
            namespace: None,
        }
    }

    pub fn with_namespace(mut self, ns: Cow<'x, [u8]>) -> Self {
        self.namespace = Some(ns);
        self
    }

    pub fn local_name(&self) -> String {
        String::from_utf8_lossy(self.element.local_name().as_ref()).into_owned()
    }

    pub fn namespace_str(&self) -> Option<String> {
        self.namespace
            .as_deref()
            .map(|ns| String::from_utf8_lossy(ns).into_owned())
    }
}

#[derive(Debug)]
pub enum Token<'x> {
    ElementStart {
        name: NamedElement,
        raw: RawElement<'x>,
    },
    UnknownElement(RawElement<'x>),
    ElementEnd,
    Text(Cow<'x, str>),
    Bytes(Cow<'x, [u8]>),
    Eof,
}

impl Token<'_> {
    pub fn describe(&self) -> String {
        match self {
            Token::ElementStart { name, .. } => format!("element {name:?}"),
            Token::UnknownElement(raw) => format!("element <{}>", raw.local_name()),
            Token::ElementEnd => "element end".to_string(),
            Token::Text(text) => format!("text {text:?}"),
            Token::Bytes(_) => "cdata".to_string(),
            Token::Eof => "end of document".to_string(),
        }
    }

    pub fn into_unexpected(self) -> Error {
        Error::UnexpectedToken {
            expected: None,
            found: self.describe(),
        }
    }
}

impl NamedElement {
    pub fn into_unexpected(self) -> Error {
        Error::UnexpectedToken {
            expected: None,
            found: format!("{self:?}"),
        }
    }
}

/// A request body type that parses itself off a token stream.
pub trait DavParser: Sized {
    fn parse(stream: &mut tokenizer::Tokenizer<'_>) -> Result<Self>;
}

/// Typed element text content.
pub trait XmlValueParser: Sized {
    fn parse_text(text: &str) -> Option<Self>;
}

impl XmlValueParser for u32 {
    fn parse_text(text: &str) -> Option<Self> {
        text.trim().parse().ok()
    }
}

impl XmlValueParser for u64 {
    fn parse_text(text: &str) -> Option<Self> {
        text.trim().parse().ok()
    }
}
