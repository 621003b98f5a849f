/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Evaluation of CardDAV addressbook-query filters (RFC 6352 section 10.5)
//! against a parsed vCard.

use calcard::vcard::{VCard, VCardEntry};
use dav_proto::schema::request::{CardParamFilter, CardPropFilter};

use crate::collation::text_matches;

/// Applies the filter set of an addressbook-query. The `test` attribute of
/// the filter element selects anyof/allof across prop-filters; prop-filter
/// children combine the same way via their own `test` attribute.
pub fn matches_vcard(vcard: &VCard, filters: &[CardPropFilter], all_of: bool) -> bool {
    if filters.is_empty() {
        return true;
    }
    if all_of {
        filters.iter().all(|filter| match_prop_filter(vcard, filter))
    } else {
        filters.iter().any(|filter| match_prop_filter(vcard, filter))
    }
}

fn match_prop_filter(vcard: &VCard, filter: &CardPropFilter) -> bool {
    let entries: Vec<&VCardEntry> = vcard
        .entries
        .iter()
        .filter(|entry| {
            entry.name == filter.name
                && (filter.group.is_none()
                    || entry.group.as_deref().map(str::to_ascii_uppercase)
                        == filter.group.as_deref().map(str::to_ascii_uppercase))
        })
        .collect();

    if filter.is_not_defined {
        return entries.is_empty();
    }
    if entries.is_empty() {
        return false;
    }

    let mut conditions = Vec::with_capacity(
        filter.text_matches.len() + filter.param_filters.len(),
    );
    for text_match in &filter.text_matches {
        conditions.push(entries.iter().any(|entry| {
            entry.values.iter().any(|value| {
                value
                    .as_text()
                    .is_some_and(|text| text_matches(text_match, text))
            })
        }));
    }
    for param_filter in &filter.param_filters {
        conditions.push(entries.iter().any(|entry| match_param_filter(entry, param_filter)));
    }

    if conditions.is_empty() {
        true
    } else if filter.all_of {
        conditions.into_iter().all(|ok| ok)
    } else {
        conditions.into_iter().any(|ok| ok)
    }
}

fn match_param_filter(entry: &VCardEntry, filter: &CardParamFilter) -> bool {
    let mut params = entry
        .params
        .iter()
        .filter(|param| param.matches_name(&filter.name))
        .peekable();

    if filter.is_not_defined {
        return params.peek().is_none();
    }
    if params.peek().is_none() {
        return false;
    }
    match &filter.text_match {
        Some(text_match) => params.any(|param| {
            param
                .as_text()
                .is_some_and(|text| text_matches(text_match, text))
        }),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::parse_vcard;
    use calcard::vcard::{VCardParameterName, VCardProperty};
    use dav_proto::schema::request::TextMatch;

    fn card() -> VCard {
        parse_vcard(
            b"BEGIN:VCARD\r\nVERSION:3.0\r\nUID:c1\r\nFN:Jane Doe\r\n\
              NICKNAME:jd\r\nEMAIL;TYPE=WORK:jane@example.com\r\nEND:VCARD\r\n",
        )
        .unwrap()
    }

    fn prop_filter(name: VCardProperty) -> CardPropFilter {
        CardPropFilter {
            name,
            group: None,
            all_of: false,
            is_not_defined: false,
            text_matches: Vec::new(),
            param_filters: Vec::new(),
        }
    }

    #[test]
    fn text_match_on_property_value() {
        let card = card();
        let mut filter = prop_filter(VCardProperty::Fn);
        filter.text_matches.push(TextMatch::contains("jane"));
        assert!(matches_vcard(&card, &[filter], false));

        let mut miss = prop_filter(VCardProperty::Fn);
        miss.text_matches.push(TextMatch::contains("nonesuch"));
        assert!(!matches_vcard(&card, &[miss], false));
    }

    #[test]
    fn param_filter_on_type() {
        let card = card();
        let mut filter = prop_filter(VCardProperty::Email);
        filter.param_filters.push(CardParamFilter {
            name: VCardParameterName::parse("TYPE"),
            is_not_defined: false,
            text_match: Some(TextMatch::contains("work")),
        });
        assert!(matches_vcard(&card, &[filter], false));
    }

    #[test]
    fn anyof_vs_allof_across_prop_filters() {
        let card = card();
        let mut hit = prop_filter(VCardProperty::Nickname);
        hit.text_matches.push(TextMatch::contains("jd"));
        let mut miss = prop_filter(VCardProperty::Fn);
        miss.text_matches.push(TextMatch::contains("nonesuch"));

        assert!(matches_vcard(&card, &[hit.clone(), miss.clone()], false));
        assert!(!matches_vcard(&card, &[hit, miss], true));
    }

    #[test]
    fn is_not_defined_matches_absent_property() {
        let card = card();
        let mut filter = prop_filter(VCardProperty::Tel);
        filter.is_not_defined = true;
        assert!(matches_vcard(&card, &[filter], false));
    }
}
