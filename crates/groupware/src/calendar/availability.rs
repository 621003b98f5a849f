/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! RFC 7953 availability processing. VAVAILABILITY components mark spans
//! of baseline busy time (default BUSY-UNAVAILABLE) with AVAILABLE
//! subcomponents opening free windows inside them. Components are
//! resolved by priority: PRIORITY 1 is strongest, 9 weakest, 0 or absent
//! weakest of all. At equal priority the busier classification prevails.

use calcard::{
    common::timezone::Tz,
    icalendar::{ICalendar, ICalendarComponent, ICalendarComponentType, ICalendarProperty,
        ICalendarValue},
};
use dav_proto::schema::property::TimeRange;

use super::{Instance, entry_duration_seconds, entry_timestamp, expand_instances, find_entry};
use crate::calendar::freebusy::{BusyKind, BusyPeriod};

/// One availability layer: a busy span, its free windows, and the
/// strength it competes with.
#[derive(Debug, Clone)]
struct Layer {
    /// Lower ranks win; derived from PRIORITY (1..=9, 0/absent => 10).
    rank: u8,
    kind: BusyKind,
    span: (i64, i64),
    free: Vec<(i64, i64)>,
}

/// Extracts the availability layers of one object, clamped to `range`.
fn collect_layers(ical: &ICalendar, range: &TimeRange, tz: Tz, layers: &mut Vec<Layer>) {
    let mut instances: Option<Vec<Instance>> = None;
    for comp in &ical.components {
        if comp.component_type != ICalendarComponentType::VAvailability {
            continue;
        }
        let start = find_entry(comp, &ICalendarProperty::Dtstart)
            .and_then(|entry| entry_timestamp(entry, tz))
            .unwrap_or(range.start);
        let end = find_entry(comp, &ICalendarProperty::Dtend)
            .and_then(|entry| entry_timestamp(entry, tz))
            .or_else(|| {
                find_entry(comp, &ICalendarProperty::Duration)
                    .and_then(entry_duration_seconds)
                    .map(|seconds| start + seconds)
            })
            .unwrap_or(range.end);
        let span = (start.max(range.start), end.min(range.end));
        if span.0 >= span.1 {
            continue;
        }

        let mut free = Vec::new();
        for child_id in &comp.component_ids {
            let Some(child) = ical.components.get(*child_id as usize) else {
                continue;
            };
            if child.component_type != ICalendarComponentType::Available {
                continue;
            }
            let windows = available_windows(
                ical,
                *child_id,
                child,
                &mut instances,
                tz,
            );
            for (start, end) in windows {
                let window = (start.max(span.0), end.min(span.1));
                if window.0 < window.1 {
                    free.push(window);
                }
            }
        }

        layers.push(Layer {
            rank: priority_rank(comp),
            kind: busy_type(comp),
            span,
            free,
        });
    }
}

/// The windows an AVAILABLE subcomponent opens: its recurrence expansion
/// when the rule engine produced instances for it, otherwise its plain
/// DTSTART with DTEND or DURATION.
fn available_windows(
    ical: &ICalendar,
    comp_id: u16,
    comp: &ICalendarComponent,
    instances: &mut Option<Vec<Instance>>,
    tz: Tz,
) -> Vec<(i64, i64)> {
    let expanded = instances.get_or_insert_with(|| expand_instances(ical, tz));
    let windows: Vec<(i64, i64)> = expanded
        .iter()
        .filter(|instance| instance.comp_id == comp_id)
        .map(|instance| (instance.start, instance.end))
        .collect();
    if !windows.is_empty() {
        return windows;
    }

    let Some(start) =
        find_entry(comp, &ICalendarProperty::Dtstart).and_then(|entry| entry_timestamp(entry, tz))
    else {
        return Vec::new();
    };
    let end = find_entry(comp, &ICalendarProperty::Dtend)
        .and_then(|entry| entry_timestamp(entry, tz))
        .or_else(|| {
            find_entry(comp, &ICalendarProperty::Duration)
                .and_then(entry_duration_seconds)
                .map(|seconds| start + seconds)
        });
    match end {
        Some(end) if end > start => vec![(start, end)],
        _ => Vec::new(),
    }
}

fn priority_rank(comp: &ICalendarComponent) -> u8 {
    let priority = find_entry(comp, &ICalendarProperty::Priority)
        .and_then(|entry| {
            entry.values.iter().find_map(|value| match value {
                ICalendarValue::Integer(n) => Some(*n),
                _ => value.as_text().and_then(|text| text.parse().ok()),
            })
        })
        .unwrap_or(0);
    if (1..=9).contains(&priority) {
        priority as u8
    } else {
        10
    }
}

fn busy_type(comp: &ICalendarComponent) -> BusyKind {
    find_entry(comp, &ICalendarProperty::Busytype)
        .and_then(|entry| entry.values.iter().find_map(ICalendarValue::as_text))
        .map(|text| match text.to_ascii_uppercase().as_str() {
            "BUSY" => BusyKind::Busy,
            "BUSY-TENTATIVE" => BusyKind::BusyTentative,
            _ => BusyKind::BusyUnavailable,
        })
        // RFC 7953 section 3.2: BUSYTYPE defaults to BUSY-UNAVAILABLE.
        .unwrap_or(BusyKind::BusyUnavailable)
}

/// Resolves availability layers from any number of objects into concrete
/// busy periods over `range`. For every elementary interval the winning
/// layer is the one with the lowest rank; ties go to the busier kind.
pub struct AvailabilityResolver {
    layers: Vec<Layer>,
}

impl AvailabilityResolver {
    pub fn new() -> Self {
        AvailabilityResolver { layers: Vec::new() }
    }

    pub fn add(&mut self, ical: &ICalendar, range: &TimeRange, tz: Tz) {
        collect_layers(ical, range, tz, &mut self.layers);
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn resolve(&self, range: &TimeRange) -> Vec<BusyPeriod> {
        if self.layers.is_empty() {
            return Vec::new();
        }

        // Elementary intervals between all boundaries touching the range.
        let mut bounds = Vec::new();
        for layer in &self.layers {
            bounds.push(layer.span.0);
            bounds.push(layer.span.1);
            for (start, end) in &layer.free {
                bounds.push(*start);
                bounds.push(*end);
            }
        }
        bounds.push(range.start);
        bounds.push(range.end);
        bounds.retain(|b| *b >= range.start && *b <= range.end);
        bounds.sort_unstable();
        bounds.dedup();

        let mut periods = Vec::new();
        for pair in bounds.windows(2) {
            let (start, end) = (pair[0], pair[1]);
            if start >= end {
                continue;
            }
            let winner = self
                .layers
                .iter()
                .filter(|layer| layer.span.0 <= start && layer.span.1 >= end)
                .map(|layer| {
                    let kind = if layer
                        .free
                        .iter()
                        .any(|(free_start, free_end)| *free_start <= start && *free_end >= end)
                    {
                        BusyKind::Free
                    } else {
                        layer.kind
                    };
                    (layer.rank, kind)
                })
                .min();
            if let Some((_, kind)) = winner {
                if kind != BusyKind::Free {
                    periods.push(BusyPeriod { kind, start, end });
                }
            }
        }
        periods
    }
}

impl Default for AvailabilityResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::parse_ical;

    fn range() -> TimeRange {
        TimeRange {
            start: 1704067200, // 2024-01-01T00:00Z
            end: 1704672000,   // 2024-01-08T00:00Z
        }
    }

    fn availability(body: &str) -> ICalendar {
        parse_ical(
            format!("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n{body}END:VCALENDAR\r\n").as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn available_window_opens_a_hole() {
        let ical = availability(
            "BEGIN:VAVAILABILITY\r\nUID:av1\r\n\
             DTSTART:20240101T000000Z\r\nDTEND:20240108T000000Z\r\n\
             BEGIN:AVAILABLE\r\nUID:av1-a\r\n\
             DTSTART:20240102T090000Z\r\nDTEND:20240102T170000Z\r\n\
             END:AVAILABLE\r\nEND:VAVAILABILITY\r\n",
        );
        let mut resolver = AvailabilityResolver::new();
        resolver.add(&ical, &range(), Tz::UTC);
        let periods = resolver.resolve(&range());

        // Busy before the window, free inside it, busy after.
        assert_eq!(periods.len(), 2);
        assert!(periods.iter().all(|p| p.kind == BusyKind::BusyUnavailable));
        assert_eq!(periods[0].end, 1704186000); // window start 09:00
        assert_eq!(periods[1].start, 1704214800); // window end 17:00
    }

    #[test]
    fn priority_resolution_prefers_lower_numbers() {
        let strong = availability(
            "BEGIN:VAVAILABILITY\r\nUID:strong\r\nPRIORITY:1\r\nBUSYTYPE:BUSY\r\n\
             DTSTART:20240102T000000Z\r\nDTEND:20240103T000000Z\r\n\
             END:VAVAILABILITY\r\n",
        );
        let weak = availability(
            "BEGIN:VAVAILABILITY\r\nUID:weak\r\nPRIORITY:5\r\n\
             DTSTART:20240101T000000Z\r\nDTEND:20240108T000000Z\r\n\
             BEGIN:AVAILABLE\r\nUID:weak-a\r\n\
             DTSTART:20240102T000000Z\r\nDTEND:20240104T000000Z\r\n\
             END:AVAILABLE\r\nEND:VAVAILABILITY\r\n",
        );
        let mut resolver = AvailabilityResolver::new();
        resolver.add(&strong, &range(), Tz::UTC);
        resolver.add(&weak, &range(), Tz::UTC);
        let periods = resolver.resolve(&range());

        // Jan 2: the priority-1 BUSY span wins over the weaker free
        // window; Jan 3: the weaker layer's free window applies.
        assert!(periods
            .iter()
            .any(|p| p.kind == BusyKind::Busy && p.start == 1704153600 && p.end == 1704240000));
        assert!(!periods
            .iter()
            .any(|p| p.start >= 1704240000 && p.start < 1704326400));
    }

    #[test]
    fn equal_priority_busier_kind_wins() {
        let busy = availability(
            "BEGIN:VAVAILABILITY\r\nUID:one\r\nPRIORITY:5\r\nBUSYTYPE:BUSY\r\n\
             DTSTART:20240102T000000Z\r\nDTEND:20240103T000000Z\r\nEND:VAVAILABILITY\r\n",
        );
        let tentative = availability(
            "BEGIN:VAVAILABILITY\r\nUID:two\r\nPRIORITY:5\r\nBUSYTYPE:BUSY-TENTATIVE\r\n\
             DTSTART:20240102T000000Z\r\nDTEND:20240103T000000Z\r\nEND:VAVAILABILITY\r\n",
        );
        let mut resolver = AvailabilityResolver::new();
        resolver.add(&busy, &range(), Tz::UTC);
        resolver.add(&tentative, &range(), Tz::UTC);
        let periods = resolver.resolve(&range());
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].kind, BusyKind::Busy);
    }
}
