/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! XML and header codecs for the WebDAV family of protocols: core WebDAV
//! (RFC 4918), extended MKCOL (RFC 5689), sync-collection (RFC 6578),
//! CalDAV (RFC 4791) and CardDAV (RFC 6352), plus the calendarserver and
//! Apple presentation extensions clients expect.

pub mod parser;
pub mod requests;
pub mod responses;
pub mod schema;

/// The WebDAV request headers the protocol engine interprets, borrowed
/// from the incoming request.
#[derive(Debug, PartialEq, Eq)]
pub struct RequestHeaders<'x> {
    pub uri: &'x str,
    pub depth: Depth,
    pub content_type: Option<&'x str>,
    pub destination: Option<&'x str>,
    /// `Overwrite: F`: fail instead of replacing the destination.
    pub overwrite_fail: bool,
    pub if_match: TagCondition<'x>,
    pub if_none_match: TagCondition<'x>,
    /// An RFC 4918 `If` header was present; its tagged lists are not
    /// interpreted by this server.
    pub has_if: bool,
    /// `Prefer: return=minimal` (RFC 8144).
    pub prefer_minimal: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
    #[default]
    None,
}

/// An `If-Match`/`If-None-Match` condition.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum TagCondition<'x> {
    #[default]
    None,
    Any,
    Tags(Vec<&'x str>),
}
