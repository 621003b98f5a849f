/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::{Depth, RequestHeaders, TagCondition};

impl<'x> RequestHeaders<'x> {
    pub fn new(uri: &'x str) -> Self {
        RequestHeaders {
            uri,
            depth: Depth::None,
            content_type: None,
            destination: None,
            overwrite_fail: false,
            if_match: TagCondition::None,
            if_none_match: TagCondition::None,
            has_if: false,
            prefer_minimal: false,
        }
    }

    /// Feeds one HTTP header. Unrecognised headers are ignored; the caller
    /// iterates the whole header map through here.
    pub fn parse(&mut self, name: &str, value: &'x str) {
        if name.eq_ignore_ascii_case("depth") {
            self.depth = Depth::parse(value.trim());
        } else if name.eq_ignore_ascii_case("content-type") {
            self.content_type = Some(value.trim());
        } else if name.eq_ignore_ascii_case("destination") {
            self.destination = Some(value.trim());
        } else if name.eq_ignore_ascii_case("overwrite") {
            self.overwrite_fail = value.trim().eq_ignore_ascii_case("F");
        } else if name.eq_ignore_ascii_case("if-match") {
            self.if_match = TagCondition::parse(value);
        } else if name.eq_ignore_ascii_case("if-none-match") {
            self.if_none_match = TagCondition::parse(value);
        } else if name.eq_ignore_ascii_case("if") {
            // The tagged-list production of RFC 4918 section 10.4 is not
            // interpreted; its presence fails conditional checks.
            self.has_if = true;
        } else if name.eq_ignore_ascii_case("prefer") {
            for directive in value.split(',') {
                if directive.trim().eq_ignore_ascii_case("return=minimal") {
                    self.prefer_minimal = true;
                }
            }
        }
    }
}

impl Depth {
    pub fn parse(value: &str) -> Depth {
        match value {
            "0" => Depth::Zero,
            "1" => Depth::One,
            _ if value.eq_ignore_ascii_case("infinity") => Depth::Infinity,
            _ => Depth::None,
        }
    }
}

impl<'x> TagCondition<'x> {
    /// Parses an `If-Match`/`If-None-Match` value: `*` or a comma separated
    /// list of entity tags. Weak tags never take part in the strong
    /// comparison this server performs, so they are dropped here.
    pub fn parse(value: &'x str) -> Self {
        let value = value.trim();
        if value == "*" {
            return TagCondition::Any;
        }
        let mut tags = Vec::new();
        for part in value.split(',') {
            let part = part.trim();
            if part.starts_with("W/") {
                continue;
            }
            let tag = part.strip_prefix('"').and_then(|t| t.strip_suffix('"'));
            match tag {
                Some(tag) => tags.push(tag),
                None if !part.is_empty() => tags.push(part),
                None => {}
            }
        }
        TagCondition::Tags(tags)
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, TagCondition::None)
    }

    /// Strong comparison against the current entity tag, unquoted form.
    pub fn matches(&self, etag: &str) -> bool {
        match self {
            TagCondition::None => false,
            TagCondition::Any => true,
            TagCondition::Tags(tags) => tags.iter().any(|tag| *tag == etag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conditional_headers() {
        let mut headers = RequestHeaders::new("/alice/calendars/calendar/a.ics");
        headers.parse("Depth", "0");
        headers.parse("If-Match", "\"abc\", W/\"weak\", \"def\"");
        headers.parse("If-None-Match", "*");
        headers.parse("Overwrite", "F");
        headers.parse("Prefer", "return=minimal, depth-noroot");

        assert_eq!(headers.depth, Depth::Zero);
        assert!(headers.if_match.matches("abc"));
        assert!(headers.if_match.matches("def"));
        assert!(!headers.if_match.matches("weak"));
        assert!(matches!(headers.if_none_match, TagCondition::Any));
        assert!(headers.overwrite_fail);
        assert!(headers.prefer_minimal);
    }

    #[test]
    fn if_header_presence_is_flagged() {
        let mut headers = RequestHeaders::new("/");
        assert!(!headers.has_if);
        headers.parse("If", "(<urn:uuid:lock>)");
        assert!(headers.has_if);
    }
}
