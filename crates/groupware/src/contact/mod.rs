/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod filter;

use calcard::{Entry, Parser, vcard::VCard};

/// Parses vCard bytes that already passed import validation; `None` means
/// the member silently drops out of query results.
pub fn parse_vcard(bytes: &[u8]) -> Option<VCard> {
    let text = std::str::from_utf8(bytes).ok()?;
    match Parser::new(text).entry() {
        Entry::VCard(vcard) => Some(vcard),
        _ => None,
    }
}
