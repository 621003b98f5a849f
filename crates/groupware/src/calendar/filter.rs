/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Evaluation of the CalDAV filter tree (RFC 4791 section 9.7) against a
//! parsed iCalendar object. The walk is conjunctive top-down; time-range
//! conditions on components consult the recurrence expansion, computed once
//! per object and shared across the tree.

use calcard::{
    common::timezone::Tz,
    icalendar::{
        ICalendar, ICalendarComponent, ICalendarComponentType, ICalendarEntry, ICalendarValue,
    },
};
use dav_proto::schema::{
    property::TimeRange,
    request::{CompFilter, ParamFilter, PropFilter},
};

use super::{Instance, PeriodTimeRange, entry_timestamp, expand_instances, find_entry};
use crate::collation::text_matches;

pub struct CalendarFilterEvaluator<'x> {
    ical: &'x ICalendar,
    tz: Tz,
    instances: Option<Vec<Instance>>,
}

impl<'x> CalendarFilterEvaluator<'x> {
    pub fn new(ical: &'x ICalendar, tz: Tz) -> Self {
        CalendarFilterEvaluator {
            ical,
            tz,
            instances: None,
        }
    }

    /// Applies the root filters; all of them must match (RFC 4791 reduces
    /// this to the single VCALENDAR comp-filter in practice).
    pub fn matches(&mut self, filters: &[CompFilter]) -> bool {
        let ical = self.ical;
        let Some(root) = ical.components.first() else {
            return false;
        };
        filters
            .iter()
            .all(|filter| self.match_component(0, root, filter))
    }

    fn match_component(
        &mut self,
        comp_id: u16,
        comp: &'x ICalendarComponent,
        filter: &CompFilter,
    ) -> bool {
        if filter.is_not_defined {
            return comp.component_type != filter.name;
        }
        if comp.component_type != filter.name {
            return false;
        }
        if let Some(range) = &filter.time_range {
            if !self.component_in_range(comp_id, comp, range) {
                return false;
            }
        }
        for prop_filter in &filter.prop_filters {
            if !match_prop_filter(comp, prop_filter, self.tz) {
                return false;
            }
        }
        let ical = self.ical;
        for comp_filter in &filter.comp_filters {
            let mut children = comp
                .component_ids
                .iter()
                .filter_map(|child_id| Some((*child_id, ical.components.get(*child_id as usize)?)));
            let matched = if comp_filter.is_not_defined {
                // No child of the named type may exist in this scope.
                children.all(|(_, child)| child.component_type != comp_filter.name)
            } else {
                children.any(|(child_id, child)| self.match_component(child_id, child, comp_filter))
            };
            if !matched {
                return false;
            }
        }
        true
    }

    fn component_in_range(
        &mut self,
        comp_id: u16,
        comp: &ICalendarComponent,
        range: &TimeRange,
    ) -> bool {
        match comp.component_type {
            ICalendarComponentType::VFreebusy => freebusy_in_range(comp, range, self.tz),
            ICalendarComponentType::VAlarm => false,
            _ => {
                let tz = self.tz;
                let ical = self.ical;
                let instances = self
                    .instances
                    .get_or_insert_with(|| expand_instances(ical, tz));
                instances.iter().any(|instance| {
                    instance.comp_id == comp_id && range.overlaps(instance.start, instance.end)
                })
            }
        }
    }
}

/// RFC 4791 section 9.9 for VFREEBUSY: DTSTART/DTEND when present,
/// otherwise any FREEBUSY period overlapping.
fn freebusy_in_range(comp: &ICalendarComponent, range: &TimeRange, tz: Tz) -> bool {
    let dtstart = find_entry(comp, &calcard::icalendar::ICalendarProperty::Dtstart)
        .and_then(|entry| entry_timestamp(entry, tz));
    let dtend = find_entry(comp, &calcard::icalendar::ICalendarProperty::Dtend)
        .and_then(|entry| entry_timestamp(entry, tz));
    if let (Some(start), Some(end)) = (dtstart, dtend) {
        return range.overlaps(start, end);
    }

    comp.entries
        .iter()
        .filter(|entry| entry.name == calcard::icalendar::ICalendarProperty::Freebusy)
        .any(|entry| {
            entry.values.iter().any(|value| {
                if let ICalendarValue::Period(period) = value {
                    period
                        .time_range(tz)
                        .is_some_and(|(start, end)| {
                            range.overlaps(start.timestamp(), end.timestamp())
                        })
                } else {
                    false
                }
            })
        })
}

fn match_prop_filter(comp: &ICalendarComponent, filter: &PropFilter, tz: Tz) -> bool {
    let mut entries = comp
        .entries
        .iter()
        .filter(|entry| entry.name == filter.name)
        .peekable();

    if filter.is_not_defined {
        return entries.peek().is_none();
    }
    if entries.peek().is_none() {
        return false;
    }
    entries.any(|entry| {
        if let Some(range) = &filter.time_range {
            // A property time range brackets the property's own datetime.
            let in_range = entry_timestamp(entry, tz)
                .is_some_and(|ts| ts >= range.start && ts <= range.end);
            if !in_range {
                return false;
            }
        }
        if let Some(text_match) = &filter.text_match {
            if !entry_text_matches(entry, text_match) {
                return false;
            }
        }
        filter
            .param_filters
            .iter()
            .all(|param_filter| match_param_filter(entry, param_filter))
    })
}

fn entry_text_matches(
    entry: &ICalendarEntry,
    text_match: &dav_proto::schema::request::TextMatch,
) -> bool {
    entry.values.iter().any(|value| {
        value
            .as_text()
            .is_some_and(|text| text_matches(text_match, text))
    })
}

fn match_param_filter(entry: &ICalendarEntry, filter: &ParamFilter) -> bool {
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
    use crate::calendar::parse_ical;
    use calcard::icalendar::{ICalendarParameterName, ICalendarProperty};
    use dav_proto::schema::request::TextMatch;

    fn calendar(body: &str) -> ICalendar {
        parse_ical(
            format!("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n{body}END:VCALENDAR\r\n").as_bytes(),
        )
        .unwrap()
    }

    fn vcalendar_filter(child: CompFilter) -> Vec<CompFilter> {
        let mut root = CompFilter::named(ICalendarComponentType::VCalendar);
        root.comp_filters.push(child);
        vec![root]
    }

    fn event_january() -> ICalendar {
        calendar(
            "BEGIN:VEVENT\r\nUID:jan\r\nDTSTART:20240115T120000Z\r\n\
             DTEND:20240115T130000Z\r\nSUMMARY:January meeting\r\n\
             ORGANIZER;CN=Alice:mailto:alice@example.com\r\nEND:VEVENT\r\n",
        )
    }

    #[test]
    fn time_range_selects_overlapping_events_only() {
        let range = TimeRange {
            start: 1704067200, // 20240101T000000Z
            end: 1706745600,   // 20240201T000000Z
        };
        let mut event_filter = CompFilter::named(ICalendarComponentType::VEvent);
        event_filter.time_range = Some(range);
        let filters = vcalendar_filter(event_filter);

        assert!(CalendarFilterEvaluator::new(&event_january(), Tz::UTC).matches(&filters));

        let feb = calendar(
            "BEGIN:VEVENT\r\nUID:feb\r\nDTSTART:20240215T120000Z\r\n\
             DTEND:20240215T130000Z\r\nSUMMARY:February\r\nEND:VEVENT\r\n",
        );
        assert!(!CalendarFilterEvaluator::new(&feb, Tz::UTC).matches(&filters));
    }

    #[test]
    fn recurring_event_matches_through_expansion() {
        let weekly = calendar(
            "BEGIN:VEVENT\r\nUID:w\r\nDTSTART:20231204T100000Z\r\n\
             DTEND:20231204T110000Z\r\nRRULE:FREQ=WEEKLY;COUNT=10\r\n\
             SUMMARY:Standup\r\nEND:VEVENT\r\n",
        );
        // The seed instance is in December but later instances land in
        // January.
        let mut event_filter = CompFilter::named(ICalendarComponentType::VEvent);
        event_filter.time_range = Some(TimeRange {
            start: 1704067200,
            end: 1706745600,
        });
        assert!(CalendarFilterEvaluator::new(&weekly, Tz::UTC).matches(&vcalendar_filter(event_filter)));

        let mut march_filter = CompFilter::named(ICalendarComponentType::VEvent);
        march_filter.time_range = Some(TimeRange {
            start: 1709251200,
            end: 1711929600,
        });
        assert!(
            !CalendarFilterEvaluator::new(&weekly, Tz::UTC)
                .matches(&vcalendar_filter(march_filter))
        );
    }

    #[test]
    fn prop_and_param_filters() {
        let ical = event_january();

        let mut summary = PropFilter::named(ICalendarProperty::Summary);
        summary.text_match = Some(TextMatch::contains("january"));
        let mut event_filter = CompFilter::named(ICalendarComponentType::VEvent);
        event_filter.prop_filters.push(summary);
        assert!(CalendarFilterEvaluator::new(&ical, Tz::UTC).matches(&vcalendar_filter(event_filter.clone())));

        let mut organizer = PropFilter::named(ICalendarProperty::Organizer);
        organizer.param_filters.push(ParamFilter {
            name: ICalendarParameterName::parse("CN"),
            is_not_defined: false,
            text_match: Some(TextMatch::contains("alice")),
        });
        let mut with_param = CompFilter::named(ICalendarComponentType::VEvent);
        with_param.prop_filters.push(organizer);
        assert!(CalendarFilterEvaluator::new(&ical, Tz::UTC).matches(&vcalendar_filter(with_param)));

        let mut missing = PropFilter::named(ICalendarProperty::Location);
        missing.is_not_defined = true;
        let mut not_defined = CompFilter::named(ICalendarComponentType::VEvent);
        not_defined.prop_filters.push(missing);
        assert!(CalendarFilterEvaluator::new(&ical, Tz::UTC).matches(&vcalendar_filter(not_defined)));
    }

    #[test]
    fn is_not_defined_on_component() {
        let ical = event_january();
        let mut no_todos = CompFilter::named(ICalendarComponentType::VTodo);
        no_todos.is_not_defined = true;
        assert!(CalendarFilterEvaluator::new(&ical, Tz::UTC).matches(&vcalendar_filter(no_todos)));

        let mut no_events = CompFilter::named(ICalendarComponentType::VEvent);
        no_events.is_not_defined = true;
        assert!(!CalendarFilterEvaluator::new(&ical, Tz::UTC).matches(&vcalendar_filter(no_events)));
    }
}
