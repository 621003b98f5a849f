/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Text collations of RFC 4790 as CalDAV/CardDAV use them. `i;octet`
//! compares raw bytes; the casemap collations fold case before comparing.

use dav_proto::schema::{Collation, MatchType, request::TextMatch};

/// Applies a `text-match` condition to a candidate value, including the
/// negate-condition flag.
pub fn text_matches(text_match: &TextMatch, value: &str) -> bool {
    let matched = match text_match.collation {
        Collation::Octet => {
            compare(value.as_bytes(), text_match.value.as_bytes(), text_match.match_type)
        }
        Collation::AsciiCasemap => compare(
            value.to_ascii_lowercase().as_bytes(),
            text_match.value.to_ascii_lowercase().as_bytes(),
            text_match.match_type,
        ),
        Collation::UnicodeCasemap => compare(
            value.to_lowercase().as_bytes(),
            text_match.value.to_lowercase().as_bytes(),
            text_match.match_type,
        ),
    };
    matched != text_match.negate
}

fn compare(haystack: &[u8], needle: &[u8], match_type: MatchType) -> bool {
    match match_type {
        MatchType::Equals => haystack == needle,
        MatchType::StartsWith => haystack.starts_with(needle),
        MatchType::EndsWith => haystack.ends_with(needle),
        MatchType::Contains => {
            needle.is_empty()
                || (needle.len() <= haystack.len()
                    && haystack.windows(needle.len()).any(|window| window == needle))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tm(value: &str, collation: Collation, match_type: MatchType, negate: bool) -> TextMatch {
        TextMatch {
            value: value.to_string(),
            collation,
            match_type,
            negate,
        }
    }

    #[test]
    fn casemap_folds_ascii_only() {
        assert!(text_matches(
            &tm("MEETING", Collation::AsciiCasemap, MatchType::Contains, false),
            "Weekly meeting notes"
        ));
        assert!(!text_matches(
            &tm("meeting", Collation::Octet, MatchType::Contains, false),
            "Weekly MEETING notes"
        ));
    }

    #[test]
    fn match_types_and_negation() {
        assert!(text_matches(
            &tm("wee", Collation::AsciiCasemap, MatchType::StartsWith, false),
            "Weekly"
        ));
        assert!(text_matches(
            &tm("LY", Collation::AsciiCasemap, MatchType::EndsWith, false),
            "Weekly"
        ));
        assert!(text_matches(
            &tm("weekly", Collation::AsciiCasemap, MatchType::Equals, false),
            "Weekly"
        ));
        assert!(text_matches(
            &tm("absent", Collation::AsciiCasemap, MatchType::Contains, true),
            "Weekly"
        ));
        assert!(!text_matches(
            &tm("Weekly", Collation::Octet, MatchType::Equals, true),
            "Weekly"
        ));
    }

    #[test]
    fn contains_with_longer_needle_than_haystack() {
        assert!(!text_matches(
            &tm("longer than value", Collation::Octet, MatchType::Contains, false),
            "short"
        ));
        assert!(text_matches(
            &tm("", Collation::Octet, MatchType::Contains, false),
            "anything"
        ));
    }
}
