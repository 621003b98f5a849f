/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod availability;
pub mod filter;
pub mod freebusy;

use calcard::{
    Entry, Parser,
    common::timezone::Tz,
    icalendar::{
        ICalendar, ICalendarComponent, ICalendarEntry, ICalendarPeriod, ICalendarProperty,
        ICalendarValue,
    },
};
use chrono::DateTime;
use std::str::FromStr;

/// Resolves an `ICalendarPeriod` (RANGE or DURATION form) to a concrete
/// `(start, end)` pair in the given timezone. Not provided by `calcard`
/// itself, which only exposes the raw `PartialDateTime`/`ICalendarDuration`
/// fields.
pub trait PeriodTimeRange {
    fn time_range(&self, tz: Tz) -> Option<(DateTime<Tz>, DateTime<Tz>)>;
}

impl PeriodTimeRange for ICalendarPeriod {
    fn time_range(&self, tz: Tz) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
        match self {
            ICalendarPeriod::Range { start, end } => {
                let start = start.to_date_time()?.to_date_time_with_tz(tz)?;
                let end = end.to_date_time()?.to_date_time_with_tz(tz)?;
                Some((start, end))
            }
            ICalendarPeriod::Duration { start, duration } => {
                let start = start.to_date_time()?.to_date_time_with_tz(tz)?;
                let end = start + duration.to_time_delta()?;
                Some((start, end))
            }
        }
    }
}

/// Ceiling on recurrence instances produced for any single object. Open
/// ended rules stop here, which stands in for the far-future sentinel of
/// unbounded queries.
pub const MAX_EXPANSIONS: usize = 4096;

/// Parses calendar bytes that already passed import validation. Returns
/// `None` instead of failing: a member that stopped parsing (object store
/// corruption) simply never matches a query.
pub fn parse_ical(bytes: &[u8]) -> Option<ICalendar> {
    let text = std::str::from_utf8(bytes).ok()?;
    match Parser::new(text).entry() {
        Entry::ICalendar(ical) => Some(ical),
        _ => None,
    }
}

/// Resolves a collection's default timezone from its stored VTIMEZONE
/// payload or timezone identifier, UTC when unset.
pub fn collection_timezone(stored: Option<&str>) -> Tz {
    let Some(stored) = stored else {
        return Tz::UTC;
    };
    if stored.contains("BEGIN:") {
        if let Entry::ICalendar(ical) = Parser::new(stored).entry() {
            if let Some(tz) = ical
                .timezones()
                .filter_map(|tz| tz.timezone().map(|(_, tz)| tz))
                .next()
            {
                return tz;
            }
        }
        Tz::UTC
    } else {
        Tz::from_str(stored).unwrap_or(Tz::UTC)
    }
}

/// One occurrence of a component after recurrence expansion, in UTC
/// seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instance {
    pub comp_id: u16,
    pub start: i64,
    pub end: i64,
}

/// Expands every recurring component of `ical`, bounded by
/// [`MAX_EXPANSIONS`].
pub fn expand_instances(ical: &ICalendar, tz: Tz) -> Vec<Instance> {
    let expanded = ical.expand_dates(tz, MAX_EXPANSIONS);
    if !expanded.errors.is_empty() {
        tracing::debug!(errors = expanded.errors.len(), "recurrence rule expansion errors");
    }
    expanded
        .events
        .into_iter()
        .map(|event| {
            let start = event.start.timestamp();
            let end = match event.end {
                calcard::icalendar::dates::TimeOrDelta::Time(time) => time.timestamp(),
                calcard::icalendar::dates::TimeOrDelta::Delta(delta) => {
                    start + delta.num_seconds()
                }
            };
            Instance {
                comp_id: event.comp_id,
                start,
                end,
            }
        })
        .collect()
}

/// First datetime value of an entry as a UTC timestamp, honouring a TZID
/// parameter and falling back to the collection default.
pub(crate) fn entry_timestamp(entry: &ICalendarEntry, default_tz: Tz) -> Option<i64> {
    let tz = entry
        .tz_id()
        .and_then(|tz_id| Tz::from_str(tz_id).ok())
        .unwrap_or(default_tz);
    entry.values.iter().find_map(|value| {
        if let ICalendarValue::PartialDateTime(date) = value {
            date.to_date_time()
                .and_then(|date| date.to_date_time_with_tz(tz))
                .map(|date| date.timestamp())
        } else {
            None
        }
    })
}

pub(crate) fn find_entry<'x>(
    comp: &'x ICalendarComponent,
    name: &ICalendarProperty,
) -> Option<&'x ICalendarEntry> {
    comp.entries.iter().find(|entry| &entry.name == name)
}

pub(crate) fn entry_duration_seconds(entry: &ICalendarEntry) -> Option<i64> {
    entry.values.iter().find_map(|value| {
        if let ICalendarValue::Duration(duration) = value {
            Some(duration.as_seconds())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_weekly_rule_within_bounds() {
        let ical = parse_ical(
            b"BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:w\r\n\
              DTSTART:20240101T100000Z\r\nDTEND:20240101T110000Z\r\n\
              RRULE:FREQ=WEEKLY;COUNT=4\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
        )
        .unwrap();
        let instances = expand_instances(&ical, Tz::UTC);
        assert_eq!(instances.len(), 4);
        assert_eq!(instances[0].start, 1704103200);
        assert!(instances.iter().all(|i| i.end - i.start == 3600));
        // Weekly cadence.
        let mut starts: Vec<i64> = instances.iter().map(|i| i.start).collect();
        starts.sort_unstable();
        assert_eq!(starts[1] - starts[0], 7 * 86400);
    }

    #[test]
    fn collection_timezone_parses_identifiers() {
        assert_eq!(collection_timezone(None), Tz::UTC);
        assert_eq!(collection_timezone(Some("UTC")), Tz::UTC);
        assert_ne!(collection_timezone(Some("Europe/Amsterdam")), Tz::UTC);
    }
}
