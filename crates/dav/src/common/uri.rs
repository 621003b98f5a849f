/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Request-URI normalisation (RFC 3986): percent-decoding, fragment and
//! query stripping, route-prefix removal, and href construction for
//! responses.

use hyper::StatusCode;
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use crate::{DavError, Result};

/// Characters escaped when emitting hrefs; everything a path segment must
/// not contain raw.
const HREF_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'#')
    .add(b'?')
    .add(b'%')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^')
    .add(b'[')
    .add(b']')
    .add(b'`');

/// A normalised, decoded request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavPath {
    pub segments: Vec<String>,
    /// The request spelled the path with a trailing slash.
    pub collection_form: bool,
}

impl DavPath {
    /// Parses a request-URI or `Destination` value. Absolute URIs lose
    /// their scheme and authority; fragments and queries are stripped per
    /// RFC 3986 section 3.5.
    pub fn parse(uri: &str, route_prefix: &str) -> Result<DavPath> {
        let mut path = uri;
        if let Some(rest) = path.split_once("://").map(|(_, rest)| rest) {
            path = rest.split_once('/').map(|(_, p)| p).unwrap_or("");
            return Self::parse_path(&format!("/{path}"), route_prefix);
        }
        Self::parse_path(path, route_prefix)
    }

    fn parse_path(path: &str, route_prefix: &str) -> Result<DavPath> {
        let path = path
            .split_once('#')
            .map(|(path, _)| path)
            .unwrap_or(path);
        let path = path
            .split_once('?')
            .map(|(path, _)| path)
            .unwrap_or(path);

        let path = if route_prefix.is_empty() || route_prefix == "/" {
            path
        } else {
            path.strip_prefix(route_prefix)
                .ok_or(DavError::Code(StatusCode::NOT_FOUND))?
        };

        let collection_form = path.ends_with('/') || path.is_empty();
        let mut segments = Vec::new();
        for raw in path.split('/') {
            if raw.is_empty() {
                continue;
            }
            let segment = percent_decode_str(raw)
                .decode_utf8()
                .map_err(|_| DavError::Code(StatusCode::BAD_REQUEST))?
                .into_owned();
            match segment.as_str() {
                "." => {}
                ".." => {
                    // Upward traversal never escapes the root.
                    if segments.pop().is_none() {
                        return Err(DavError::Code(StatusCode::BAD_REQUEST));
                    }
                }
                _ => segments.push(segment),
            }
        }
        Ok(DavPath {
            segments,
            collection_form,
        })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn parent(&self) -> Option<DavPath> {
        if self.segments.is_empty() {
            None
        } else {
            Some(DavPath {
                segments: self.segments[..self.segments.len() - 1].to_vec(),
                collection_form: true,
            })
        }
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The encoded href for this path, optionally in collection form.
    pub fn href(&self, route_prefix: &str, collection: bool) -> String {
        let mut out = String::new();
        if !route_prefix.is_empty() && route_prefix != "/" {
            out.push_str(route_prefix);
        }
        for segment in &self.segments {
            out.push('/');
            out.push_str(&utf8_percent_encode(segment, HREF_ENCODE).to_string());
        }
        if collection || self.segments.is_empty() {
            out.push('/');
        }
        out
    }

    pub fn child(&self, name: &str) -> DavPath {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        DavPath {
            segments,
            collection_form: false,
        }
    }
}

/// Joins a member name onto a collection href the way multistatus
/// responses spell members.
pub fn member_href(collection_href: &str, name: &str) -> String {
    let mut href = collection_href.trim_end_matches('/').to_string();
    href.push('/');
    href.push_str(&utf8_percent_encode(name, HREF_ENCODE).to_string());
    href
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_and_normalises() {
        let path = DavPath::parse("/alice/calendars/My%20Calendar/", "").unwrap();
        assert_eq!(path.segments, vec!["alice", "calendars", "My Calendar"]);
        assert!(path.collection_form);
        assert_eq!(
            path.href("", true),
            "/alice/calendars/My%20Calendar/"
        );
    }

    #[test]
    fn strips_fragment_and_query() {
        let path = DavPath::parse("/alice/cal/#frag", "").unwrap();
        assert_eq!(path.segments, vec!["alice", "cal"]);
        let path = DavPath::parse("/alice/cal?x=1", "").unwrap();
        assert_eq!(path.segments, vec!["alice", "cal"]);
    }

    #[test]
    fn applies_route_prefix() {
        let path = DavPath::parse("/dav/alice/", "/dav").unwrap();
        assert_eq!(path.segments, vec!["alice"]);
        assert!(DavPath::parse("/other/alice/", "/dav").is_err());
        assert_eq!(path.href("/dav", true), "/dav/alice/");
    }

    #[test]
    fn absolute_destination_uris_lose_authority() {
        let path =
            DavPath::parse("https://dav.example.com/alice/calendars/cal/x.ics", "").unwrap();
        assert_eq!(path.segments, vec!["alice", "calendars", "cal", "x.ics"]);
        assert!(!path.collection_form);
    }

    #[test]
    fn rejects_escaping_traversal() {
        assert!(DavPath::parse("/../etc/passwd", "").is_err());
        let path = DavPath::parse("/alice/./cal/../cal2/", "").unwrap();
        assert_eq!(path.segments, vec!["alice", "cal2"]);
    }
}
