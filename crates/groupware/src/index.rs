/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Index-assisted filtering. An index maps a member to a vector of values
//! per *index key*, where keys name a path into the object: `C=` segments
//! for components, `P=` for properties, `A=` for parameters, as in
//! `C=VCALENDAR/C=VEVENT/P=DTSTART`. Checking a filter against the index
//! is three-valued: `Some(true)`/`Some(false)` only when the decision is
//! guaranteed to agree with a full parse, `None` otherwise.
//!
//! Datetime and duration values are stored pre-resolved (epoch seconds
//! against the collection timezone) under a sentinel prefix that keeps
//! them out of text matching. Anything involving recurrence falls back to
//! the parser: the index records rule presence and declines to decide.

use ahash::AHashMap;
use calcard::{
    common::timezone::Tz,
    icalendar::{ICalendar, ICalendarParameterName, ICalendarProperty},
    vcard::{VCard, VCardParameterName},
};
use dav_proto::schema::{
    property::TimeRange,
    request::{CardPropFilter, CompFilter, PropFilter},
};

use crate::{
    calendar::{entry_duration_seconds, entry_timestamp},
    collation::text_matches,
};

pub type IndexKey = String;
pub type IndexValues = AHashMap<IndexKey, Vec<String>>;

/// Wire-format name of a parameter, round-tripping `ICalendarParameterName::parse`.
/// `calcard` exposes the parser but not the reverse mapping.
trait ParameterNameStr {
    fn as_str(&self) -> &str;
}

impl ParameterNameStr for ICalendarParameterName {
    fn as_str(&self) -> &str {
        match self {
            ICalendarParameterName::Altrep => "ALTREP",
            ICalendarParameterName::Cn => "CN",
            ICalendarParameterName::Cutype => "CUTYPE",
            ICalendarParameterName::DelegatedFrom => "DELEGATED-FROM",
            ICalendarParameterName::DelegatedTo => "DELEGATED-TO",
            ICalendarParameterName::Dir => "DIR",
            ICalendarParameterName::Fmttype => "FMTTYPE",
            ICalendarParameterName::Fbtype => "FBTYPE",
            ICalendarParameterName::Language => "LANGUAGE",
            ICalendarParameterName::Member => "MEMBER",
            ICalendarParameterName::Partstat => "PARTSTAT",
            ICalendarParameterName::Range => "RANGE",
            ICalendarParameterName::Related => "RELATED",
            ICalendarParameterName::Reltype => "RELTYPE",
            ICalendarParameterName::Role => "ROLE",
            ICalendarParameterName::Rsvp => "RSVP",
            ICalendarParameterName::ScheduleAgent => "SCHEDULE-AGENT",
            ICalendarParameterName::ScheduleForceSend => "SCHEDULE-FORCE-SEND",
            ICalendarParameterName::ScheduleStatus => "SCHEDULE-STATUS",
            ICalendarParameterName::SentBy => "SENT-BY",
            ICalendarParameterName::Tzid => "TZID",
            ICalendarParameterName::Value => "VALUE",
            ICalendarParameterName::Display => "DISPLAY",
            ICalendarParameterName::Email => "EMAIL",
            ICalendarParameterName::Feature => "FEATURE",
            ICalendarParameterName::Label => "LABEL",
            ICalendarParameterName::Size => "SIZE",
            ICalendarParameterName::Filename => "FILENAME",
            ICalendarParameterName::ManagedId => "MANAGED-ID",
            ICalendarParameterName::Order => "ORDER",
            ICalendarParameterName::Schema => "SCHEMA",
            ICalendarParameterName::Derived => "DERIVED",
            ICalendarParameterName::Gap => "GAP",
            ICalendarParameterName::Linkrel => "LINKREL",
            ICalendarParameterName::Other(name) => name,
        }
    }
}

impl ParameterNameStr for VCardParameterName {
    fn as_str(&self) -> &str {
        match self {
            VCardParameterName::Language => "LANGUAGE",
            VCardParameterName::Value => "VALUE",
            VCardParameterName::Pref => "PREF",
            VCardParameterName::Altid => "ALTID",
            VCardParameterName::Pid => "PID",
            VCardParameterName::Type => "TYPE",
            VCardParameterName::Mediatype => "MEDIATYPE",
            VCardParameterName::Calscale => "CALSCALE",
            VCardParameterName::SortAs => "SORT-AS",
            VCardParameterName::Geo => "GEO",
            VCardParameterName::Tz => "TZ",
            VCardParameterName::Index => "INDEX",
            VCardParameterName::Level => "LEVEL",
            VCardParameterName::Group => "GROUP",
            VCardParameterName::Cc => "CC",
            VCardParameterName::Author => "AUTHOR",
            VCardParameterName::AuthorName => "AUTHOR-NAME",
            VCardParameterName::Created => "CREATED",
            VCardParameterName::Derived => "DERIVED",
            VCardParameterName::Label => "LABEL",
            VCardParameterName::Phonetic => "PHONETIC",
            VCardParameterName::PropId => "PROP-ID",
            VCardParameterName::Script => "SCRIPT",
            VCardParameterName::ServiceType => "SERVICE-TYPE",
            VCardParameterName::Username => "USERNAME",
            VCardParameterName::Jsptr => "JSPTR",
            VCardParameterName::Other(name) => name,
        }
    }
}

const TS_PREFIX: &str = "\u{0}ts:";
const DUR_PREFIX: &str = "\u{0}dur:";

const RECURRENCE_PROPS: [ICalendarProperty; 4] = [
    ICalendarProperty::Rrule,
    ICalendarProperty::Rdate,
    ICalendarProperty::Exdate,
    ICalendarProperty::RecurrenceId,
];

/// Keys that must be indexed to decide `filters` without parsing.
pub fn calendar_filter_keys(filters: &[CompFilter]) -> Vec<IndexKey> {
    let mut keys = Vec::new();
    for filter in filters {
        comp_filter_keys(filter, "", &mut keys);
    }
    keys.sort();
    keys.dedup();
    keys
}

fn comp_filter_keys(filter: &CompFilter, parent: &str, keys: &mut Vec<IndexKey>) {
    let path = format!("{parent}C={}/", filter.name.as_str());
    keys.push(comp_key(&path));
    if filter.time_range.is_some() {
        for prop in ["DTSTART", "DTEND", "DUE", "DURATION", "FREEBUSY"] {
            keys.push(format!("{path}P={prop}"));
        }
        for prop in &RECURRENCE_PROPS {
            keys.push(format!("{path}P={}", prop.as_str()));
        }
    }
    for prop_filter in &filter.prop_filters {
        let prop_key = format!("{path}P={}", prop_filter.name.as_str());
        for param_filter in &prop_filter.param_filters {
            keys.push(format!("{prop_key}/A={}", param_filter.name.as_str()));
        }
        keys.push(prop_key);
    }
    for child in &filter.comp_filters {
        comp_filter_keys(child, &path, keys);
    }
}

fn comp_key(path: &str) -> IndexKey {
    path.trim_end_matches('/').to_string()
}

/// Extracts the values for `keys` from a parsed calendar object. Walking
/// is driven by the object itself; only paths under `keys` are recorded.
pub fn extract_calendar_values(ical: &ICalendar, keys: &[IndexKey], tz: Tz) -> IndexValues {
    let mut values = IndexValues::new();
    if let Some(root) = ical.components.first() {
        extract_component(ical, root, 0, "", keys, tz, &mut values);
    }
    values
}

fn extract_component(
    ical: &ICalendar,
    comp: &calcard::icalendar::ICalendarComponent,
    depth: usize,
    parent: &str,
    keys: &[IndexKey],
    tz: Tz,
    values: &mut IndexValues,
) {
    if depth > 8 {
        return;
    }
    let path = format!("{parent}C={}/", comp.component_type.as_str());
    let marker = comp_key(&path);
    if keys.iter().any(|key| *key == marker) {
        // One marker value per occurrence; the checker needs the count to
        // stay sound when a type repeats in the same scope.
        values.entry(marker).or_default().push(String::new());
    }

    for entry in &comp.entries {
        let prop_key = format!("{path}P={}", entry.name.as_str());
        if keys.iter().any(|key| *key == prop_key) {
            let slot = values.entry(prop_key.clone()).or_default();
            for value in &entry.values {
                if let Some(text) = value.as_text() {
                    slot.push(text.to_string());
                }
            }
            if let Some(ts) = entry_timestamp(entry, tz) {
                slot.push(format!("{TS_PREFIX}{ts}"));
            }
            if let Some(seconds) = entry_duration_seconds(entry) {
                slot.push(format!("{DUR_PREFIX}{seconds}"));
            }
        }
        for key in keys {
            if let Some(param_name) = key.strip_prefix(&prop_key).and_then(|rest| rest.strip_prefix("/A=")) {
                let name = calcard::icalendar::ICalendarParameterName::parse(param_name);
                let slot = values.entry(key.clone()).or_default();
                for param in entry.params.iter().filter(|param| param.matches_name(&name)) {
                    if let Some(text) = param.as_text() {
                        slot.push(text.to_string());
                    } else {
                        slot.push(String::new());
                    }
                }
            }
        }
    }

    for child_id in &comp.component_ids {
        if let Some(child) = ical.components.get(*child_id as usize) {
            extract_component(ical, child, depth + 1, &path, keys, tz, values);
        }
    }
}

/// Decides `filters` from indexed values alone, or returns `None` when a
/// full parse is required.
pub fn check_calendar_filter(
    values: &IndexValues,
    covered: &[IndexKey],
    filters: &[CompFilter],
) -> Option<bool> {
    for filter in filters {
        match check_comp_filter(values, covered, filter, "") {
            Some(true) => {}
            other => return other,
        }
    }
    Some(true)
}

fn check_comp_filter(
    values: &IndexValues,
    covered: &[IndexKey],
    filter: &CompFilter,
    parent: &str,
) -> Option<bool> {
    let path = format!("{parent}C={}/", filter.name.as_str());
    let marker = comp_key(&path);
    if !covered.contains(&marker) {
        return None;
    }
    let occurrences = values.get(&marker).map_or(0, Vec::len);
    let present = occurrences > 0;
    if filter.is_not_defined {
        return Some(!present);
    }
    if !present {
        return Some(false);
    }
    if occurrences > 1
        && (filter.time_range.is_some()
            || !filter.prop_filters.is_empty()
            || !filter.comp_filters.is_empty())
    {
        // The flat index merges same-type components, so conjunctive
        // conditions cannot be paired to one component any more.
        return None;
    }

    if let Some(range) = &filter.time_range {
        match check_time_range(values, covered, &path, filter, range) {
            Some(true) => {}
            other => return other,
        }
    }
    for prop_filter in &filter.prop_filters {
        match check_prop_filter(values, covered, &path, prop_filter) {
            Some(true) => {}
            other => return other,
        }
    }
    for child in &filter.comp_filters {
        match check_comp_filter(values, covered, child, &path) {
            Some(true) => {}
            other => return other,
        }
    }
    Some(true)
}

/// Time-range over the index is only attempted for plain, non-recurring
/// VEVENTs carrying pre-resolved DTSTART and an explicit end or duration.
fn check_time_range(
    values: &IndexValues,
    covered: &[IndexKey],
    path: &str,
    filter: &CompFilter,
    range: &TimeRange,
) -> Option<bool> {
    if filter.name.as_str() != "VEVENT" {
        return None;
    }
    for prop in &RECURRENCE_PROPS {
        let key = format!("{path}P={}", prop.as_str());
        if !covered.contains(&key) {
            return None;
        }
        if values.contains_key(&key) {
            // Recurring: only expansion can answer.
            return None;
        }
    }

    let start = indexed_timestamp(values, &format!("{path}P=DTSTART"))?;
    let end = indexed_timestamp(values, &format!("{path}P=DTEND"))
        .or_else(|| {
            indexed_duration(values, &format!("{path}P=DURATION"))
                .map(|seconds| start + seconds)
        })?;
    Some(range.overlaps(start, end))
}

fn indexed_timestamp(values: &IndexValues, key: &str) -> Option<i64> {
    values.get(key)?.iter().find_map(|value| {
        value.strip_prefix(TS_PREFIX).and_then(|ts| ts.parse().ok())
    })
}

fn indexed_duration(values: &IndexValues, key: &str) -> Option<i64> {
    values.get(key)?.iter().find_map(|value| {
        value.strip_prefix(DUR_PREFIX).and_then(|d| d.parse().ok())
    })
}

fn check_prop_filter(
    values: &IndexValues,
    covered: &[IndexKey],
    path: &str,
    filter: &PropFilter,
) -> Option<bool> {
    let key = format!("{path}P={}", filter.name.as_str());
    if !covered.contains(&key) {
        return None;
    }
    let present = values.contains_key(&key);
    if filter.is_not_defined {
        return Some(!present);
    }
    if !present {
        return Some(false);
    }
    if filter.time_range.is_some() {
        // Property time ranges need the owning entry, not a value bag.
        return None;
    }
    if !filter.param_filters.is_empty() {
        // Conditions must hold on one and the same entry; the flattened
        // index cannot pair values across entries sharing a property
        // name. Only the single positive parameter condition is safe.
        let [param_filter] = filter.param_filters.as_slice() else {
            return None;
        };
        if filter.text_match.is_some() || param_filter.is_not_defined {
            return None;
        }
        let param_key = format!("{key}/A={}", param_filter.name.as_str());
        if !covered.contains(&param_key) {
            return None;
        }
        if !values.contains_key(&param_key) {
            return Some(false);
        }
        return match &param_filter.text_match {
            Some(text_match) => Some(values.get(&param_key).is_some_and(|texts| {
                texts.iter().any(|text| text_matches(text_match, text))
            })),
            None => Some(true),
        };
    }
    if let Some(text_match) = &filter.text_match {
        let matched = values.get(&key).is_some_and(|texts| {
            texts
                .iter()
                .filter(|text| !text.starts_with('\u{0}'))
                .any(|text| text_matches(text_match, text))
        });
        return Some(matched);
    }
    Some(true)
}

/// Keys for an addressbook-query filter.
pub fn card_filter_keys(filters: &[CardPropFilter]) -> Vec<IndexKey> {
    let mut keys = Vec::new();
    for filter in filters {
        let key = format!("P={}", filter.name.as_str());
        for param_filter in &filter.param_filters {
            keys.push(format!("{key}/A={}", param_filter.name.as_str()));
        }
        keys.push(key);
    }
    keys.sort();
    keys.dedup();
    keys
}

pub fn extract_card_values(vcard: &VCard, keys: &[IndexKey]) -> IndexValues {
    let mut values = IndexValues::new();
    for entry in &vcard.entries {
        let key = format!("P={}", entry.name.as_str());
        if keys.iter().any(|k| *k == key) {
            let slot = values.entry(key.clone()).or_default();
            for value in &entry.values {
                if let Some(text) = value.as_text() {
                    slot.push(text.to_string());
                }
            }
        }
        for wanted in keys {
            if let Some(param_name) = wanted.strip_prefix(&key).and_then(|rest| rest.strip_prefix("/A=")) {
                let name = calcard::vcard::VCardParameterName::parse(param_name);
                let slot = values.entry(wanted.clone()).or_default();
                for param in entry.params.iter().filter(|param| param.matches_name(&name)) {
                    if let Some(text) = param.as_text() {
                        slot.push(text.to_string());
                    } else {
                        slot.push(String::new());
                    }
                }
            }
        }
    }
    values
}

/// Card filters have no grouping or per-entry pairing subtleties beyond
/// the ones declined below, so most queries decide straight off the index.
pub fn check_card_filter(
    values: &IndexValues,
    covered: &[IndexKey],
    filters: &[CardPropFilter],
    all_of: bool,
) -> Option<bool> {
    if filters.is_empty() {
        return Some(true);
    }
    let mut any = false;
    for filter in filters {
        let result = check_card_prop_filter(values, covered, filter)?;
        if result {
            any = true;
        } else if all_of {
            return Some(false);
        }
    }
    Some(any || filters.is_empty())
}

fn check_card_prop_filter(
    values: &IndexValues,
    covered: &[IndexKey],
    filter: &CardPropFilter,
) -> Option<bool> {
    if filter.group.is_some() {
        // Group-qualified names are rare; the index is name-keyed only.
        return None;
    }
    let key = format!("P={}", filter.name.as_str());
    if !covered.contains(&key) {
        return None;
    }
    let present = values.contains_key(&key);
    if filter.is_not_defined {
        return Some(!present);
    }
    if !present {
        return Some(false);
    }
    if !filter.param_filters.is_empty() {
        // Same pairing caveat as the calendar side.
        return None;
    }
    if filter.text_matches.is_empty() {
        return Some(true);
    }
    let mut conditions = filter.text_matches.iter().map(|text_match| {
        values
            .get(&key)
            .is_some_and(|texts| texts.iter().any(|text| text_matches(text_match, text)))
    });
    Some(if filter.all_of {
        conditions.all(|ok| ok)
    } else {
        conditions.any(|ok| ok)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::parse_ical;
    use crate::{CalendarFilterEvaluator, contact::parse_vcard, matches_vcard};
    use calcard::icalendar::ICalendarComponentType;
    use dav_proto::schema::request::TextMatch;

    fn event(extra: &str) -> ICalendar {
        parse_ical(
            format!(
                "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:x\r\n\
                 DTSTART:20240115T120000Z\r\nDTEND:20240115T130000Z\r\n\
                 SUMMARY:Budget meeting\r\n{extra}END:VEVENT\r\nEND:VCALENDAR\r\n"
            )
            .as_bytes(),
        )
        .unwrap()
    }

    fn query(range: Option<TimeRange>, summary: Option<&str>) -> Vec<CompFilter> {
        let mut event = CompFilter::named(ICalendarComponentType::VEvent);
        event.time_range = range;
        if let Some(summary) = summary {
            let mut prop = PropFilter::named(ICalendarProperty::Summary);
            prop.text_match = Some(TextMatch::contains(summary));
            event.prop_filters.push(prop);
        }
        let mut root = CompFilter::named(ICalendarComponentType::VCalendar);
        root.comp_filters.push(event);
        vec![root]
    }

    #[test]
    fn index_decision_agrees_with_full_parse() {
        let january = TimeRange {
            start: 1704067200,
            end: 1706745600,
        };
        let march = TimeRange {
            start: 1709251200,
            end: 1711929600,
        };
        let cases = [
            (event(""), query(Some(january), None), true),
            (event(""), query(Some(march), None), false),
            (event(""), query(None, Some("budget")), true),
            (event(""), query(None, Some("standup")), false),
        ];
        for (ical, filters, expected) in &cases {
            let keys = calendar_filter_keys(filters);
            let values = extract_calendar_values(ical, &keys, Tz::UTC);
            let indexed = check_calendar_filter(&values, &keys, filters);
            let full = CalendarFilterEvaluator::new(ical, Tz::UTC).matches(filters);
            assert_eq!(indexed, Some(*expected));
            assert_eq!(full, *expected);
        }
    }

    #[test]
    fn recurring_events_fall_back_to_parse() {
        let recurring = event("RRULE:FREQ=WEEKLY;COUNT=10\r\n");
        let filters = query(
            Some(TimeRange {
                start: 1704067200,
                end: 1706745600,
            }),
            None,
        );
        let keys = calendar_filter_keys(&filters);
        let values = extract_calendar_values(&recurring, &keys, Tz::UTC);
        assert_eq!(check_calendar_filter(&values, &keys, &filters), None);
    }

    #[test]
    fn uncovered_keys_are_undecidable() {
        let filters = query(None, Some("budget"));
        let keys = calendar_filter_keys(&filters);
        let values = extract_calendar_values(&event(""), &keys, Tz::UTC);
        assert_eq!(check_calendar_filter(&values, &[], &filters), None);
    }

    #[test]
    fn card_index_checks_text_and_presence() {
        let card = parse_vcard(
            b"BEGIN:VCARD\r\nVERSION:3.0\r\nUID:c1\r\nFN:Jane Doe\r\nEND:VCARD\r\n",
        )
        .unwrap();
        let mut filter = CardPropFilter {
            name: calcard::vcard::VCardProperty::Fn,
            group: None,
            all_of: false,
            is_not_defined: false,
            text_matches: vec![TextMatch::contains("jane")],
            param_filters: Vec::new(),
        };
        let filters = vec![filter.clone()];
        let keys = card_filter_keys(&filters);
        let values = extract_card_values(&card, &keys);
        assert_eq!(check_card_filter(&values, &keys, &filters, false), Some(true));
        assert!(matches_vcard(&card, &filters, false));

        filter.text_matches = vec![TextMatch::contains("nonesuch")];
        let filters = vec![filter];
        assert_eq!(check_card_filter(&values, &keys, &filters, false), Some(false));
        assert!(!matches_vcard(&card, &filters, false));
    }
}
