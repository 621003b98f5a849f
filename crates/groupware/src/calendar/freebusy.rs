/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Free-busy synthesis over a calendar collection: opaque events and
//! VFREEBUSY periods become busy time, availability components supply the
//! baseline, and the result is a single VFREEBUSY reply.

use calcard::{
    common::{PartialDateTime, timezone::Tz},
    icalendar::{
        ICalendar, ICalendarComponent, ICalendarComponentType, ICalendarEntry,
        ICalendarFreeBusyType, ICalendarParameter, ICalendarPeriod, ICalendarProperty,
        ICalendarStatus, ICalendarTransparency, ICalendarValue,
    },
};
use dav_proto::schema::property::TimeRange;

use super::{PeriodTimeRange, expand_instances};

/// Busy classification in descending precedence: when periods of equal
/// priority overlap, the earlier variant wins (RFC 7953 section 4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BusyKind {
    Busy,
    BusyUnavailable,
    BusyTentative,
    Free,
}

impl BusyKind {
    fn fbtype(&self) -> ICalendarFreeBusyType {
        match self {
            BusyKind::Busy => ICalendarFreeBusyType::Busy,
            BusyKind::BusyUnavailable => ICalendarFreeBusyType::BusyUnavailable,
            BusyKind::BusyTentative => ICalendarFreeBusyType::BusyTentative,
            BusyKind::Free => ICalendarFreeBusyType::Free,
        }
    }

    fn from_fbtype(fbtype: &ICalendarFreeBusyType) -> BusyKind {
        match fbtype {
            ICalendarFreeBusyType::Free => BusyKind::Free,
            ICalendarFreeBusyType::BusyUnavailable => BusyKind::BusyUnavailable,
            ICalendarFreeBusyType::BusyTentative => BusyKind::BusyTentative,
            _ => BusyKind::Busy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyPeriod {
    pub kind: BusyKind,
    pub start: i64,
    pub end: i64,
}

/// Collects the busy contribution of one calendar object within `range`:
/// expanded VEVENT instances that are neither transparent nor cancelled,
/// and the periods of any VFREEBUSY components.
pub fn collect_busy(ical: &ICalendar, range: &TimeRange, tz: Tz, out: &mut Vec<BusyPeriod>) {
    let mut instances = None;
    for (comp_id, comp) in ical.components.iter().enumerate() {
        match comp.component_type {
            ICalendarComponentType::VEvent => {
                if comp
                    .transparency()
                    .is_some_and(|t| t == &ICalendarTransparency::Transparent)
                {
                    continue;
                }
                let kind = match comp.status() {
                    Some(ICalendarStatus::Cancelled) => continue,
                    Some(ICalendarStatus::Tentative) => BusyKind::BusyTentative,
                    _ => BusyKind::Busy,
                };
                let instances =
                    instances.get_or_insert_with(|| expand_instances(ical, tz));
                for instance in instances.iter() {
                    if instance.comp_id == comp_id as u16
                        && range.overlaps(instance.start, instance.end)
                    {
                        out.push(BusyPeriod {
                            kind,
                            start: instance.start.max(range.start),
                            end: instance.end.min(range.end),
                        });
                    }
                }
            }
            ICalendarComponentType::VFreebusy => {
                for entry in comp
                    .entries
                    .iter()
                    .filter(|entry| entry.name == ICalendarProperty::Freebusy)
                {
                    let kind = entry
                        .params
                        .iter()
                        .find_map(|param| {
                            if let ICalendarParameter::Fbtype(fbtype) = param {
                                Some(BusyKind::from_fbtype(fbtype))
                            } else {
                                None
                            }
                        })
                        .unwrap_or(BusyKind::Busy);
                    if kind == BusyKind::Free {
                        continue;
                    }
                    for (start, end) in entry_periods(entry, tz) {
                        if range.overlaps(start, end) {
                            out.push(BusyPeriod {
                                kind,
                                start: start.max(range.start),
                                end: end.min(range.end),
                            });
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

/// The concrete periods of a FREEBUSY property in UTC seconds.
pub fn entry_periods(entry: &ICalendarEntry, tz: Tz) -> Vec<(i64, i64)> {
    entry
        .values
        .iter()
        .filter_map(|value| {
            if let ICalendarValue::Period(period) = value {
                period
                    .time_range(tz)
                    .map(|(start, end)| (start.timestamp(), end.timestamp()))
            } else {
                None
            }
        })
        .collect()
}

/// Merges overlapping or adjacent periods of the same kind.
pub fn merge_periods(mut periods: Vec<BusyPeriod>) -> Vec<BusyPeriod> {
    periods.sort_by_key(|period| (period.kind, period.start, period.end));
    let mut merged: Vec<BusyPeriod> = Vec::with_capacity(periods.len());
    for period in periods {
        if period.start >= period.end {
            continue;
        }
        match merged.last_mut() {
            Some(last) if last.kind == period.kind && period.start <= last.end => {
                last.end = last.end.max(period.end);
            }
            _ => merged.push(period),
        }
    }
    merged.sort_by_key(|period| (period.start, period.kind, period.end));
    merged
}

/// Builds the synthetic VFREEBUSY reply for a free-busy REPORT.
pub fn build_vfreebusy(
    periods: &[BusyPeriod],
    range: &TimeRange,
    now: i64,
    prodid: &str,
) -> ICalendar {
    let mut entries = vec![
        date_entry(ICalendarProperty::Dtstart, range.start),
        date_entry(ICalendarProperty::Dtend, range.end),
        date_entry(ICalendarProperty::Dtstamp, now),
    ];

    // Stable output: group by kind in precedence order, periods sorted.
    let mut by_kind: Vec<(BusyKind, Vec<ICalendarValue>)> = Vec::new();
    for period in periods {
        if period.kind == BusyKind::Free {
            continue;
        }
        let value = ICalendarValue::Period(ICalendarPeriod::Range {
            start: PartialDateTime::from_utc_timestamp(period.start),
            end: PartialDateTime::from_utc_timestamp(period.end),
        });
        match by_kind.iter_mut().find(|(kind, _)| *kind == period.kind) {
            Some((_, values)) => values.push(value),
            None => by_kind.push((period.kind, vec![value])),
        }
    }
    by_kind.sort_by_key(|(kind, _)| *kind);
    for (kind, values) in by_kind {
        entries.push(ICalendarEntry {
            name: ICalendarProperty::Freebusy,
            params: vec![ICalendarParameter::Fbtype(kind.fbtype())],
            values,
        });
    }

    ICalendar {
        components: vec![
            ICalendarComponent {
                component_type: ICalendarComponentType::VCalendar,
                entries: vec![
                    ICalendarEntry {
                        name: ICalendarProperty::Version,
                        params: vec![],
                        values: vec![ICalendarValue::Text("2.0".to_string())],
                    },
                    ICalendarEntry {
                        name: ICalendarProperty::Prodid,
                        params: vec![],
                        values: vec![ICalendarValue::Text(prodid.to_string())],
                    },
                ],
                component_ids: vec![1],
            },
            ICalendarComponent {
                component_type: ICalendarComponentType::VFreebusy,
                entries,
                component_ids: vec![],
            },
        ],
    }
}

fn date_entry(name: ICalendarProperty, ts: i64) -> ICalendarEntry {
    ICalendarEntry {
        name,
        params: vec![],
        values: vec![ICalendarValue::PartialDateTime(Box::new(
            PartialDateTime::from_utc_timestamp(ts),
        ))],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::parse_ical;

    fn range() -> TimeRange {
        TimeRange {
            start: 1704067200, // 2024-01-01
            end: 1706745600,   // 2024-02-01
        }
    }

    #[test]
    fn transparent_and_cancelled_events_are_skipped() {
        let ical = parse_ical(
            b"BEGIN:VCALENDAR\r\nVERSION:2.0\r\n\
              BEGIN:VEVENT\r\nUID:a\r\nDTSTART:20240110T100000Z\r\nDTEND:20240110T110000Z\r\n\
              TRANSP:TRANSPARENT\r\nEND:VEVENT\r\n\
              BEGIN:VEVENT\r\nUID:b\r\nDTSTART:20240111T100000Z\r\nDTEND:20240111T110000Z\r\n\
              STATUS:CANCELLED\r\nEND:VEVENT\r\n\
              BEGIN:VEVENT\r\nUID:c\r\nDTSTART:20240112T100000Z\r\nDTEND:20240112T110000Z\r\n\
              STATUS:TENTATIVE\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
        )
        .unwrap();

        let mut periods = Vec::new();
        collect_busy(&ical, &range(), Tz::UTC, &mut periods);
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].kind, BusyKind::BusyTentative);
    }

    #[test]
    fn merge_joins_overlaps_within_a_kind() {
        let merged = merge_periods(vec![
            BusyPeriod {
                kind: BusyKind::Busy,
                start: 100,
                end: 200,
            },
            BusyPeriod {
                kind: BusyKind::Busy,
                start: 150,
                end: 300,
            },
            BusyPeriod {
                kind: BusyKind::BusyTentative,
                start: 150,
                end: 160,
            },
            BusyPeriod {
                kind: BusyKind::Busy,
                start: 400,
                end: 500,
            },
        ]);
        assert_eq!(
            merged,
            vec![
                BusyPeriod {
                    kind: BusyKind::Busy,
                    start: 100,
                    end: 300
                },
                BusyPeriod {
                    kind: BusyKind::BusyTentative,
                    start: 150,
                    end: 160
                },
                BusyPeriod {
                    kind: BusyKind::Busy,
                    start: 400,
                    end: 500
                },
            ]
        );
    }

    #[test]
    fn vfreebusy_reply_serialises_grouped_periods() {
        let reply = build_vfreebusy(
            &[
                BusyPeriod {
                    kind: BusyKind::Busy,
                    start: 1705320000,
                    end: 1705323600,
                },
                BusyPeriod {
                    kind: BusyKind::BusyTentative,
                    start: 1705406400,
                    end: 1705410000,
                },
            ],
            &range(),
            1706000000,
            "-//vestry//EN",
        );
        let text = reply.to_string();
        assert!(text.contains("BEGIN:VFREEBUSY"));
        assert!(text.contains("FBTYPE=BUSY"));
        assert!(text.contains("FBTYPE=BUSY-TENTATIVE"));
        assert!(text.contains("20240115T120000Z/20240115T130000Z"));
    }
}
