/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! CalDAV reports: calendar-query with index assistance, calendar-multiget,
//! free-busy-query, and the partial-retrieval serialisation of
//! `calendar-data`.

use std::hash::{Hash, Hasher};

use calcard::{
    common::timezone::Tz,
    icalendar::{ICalendar, ICalendarComponentType, ICalendarEntry, ICalendarProperty},
};
use dav_proto::{
    RequestHeaders,
    schema::{
        property::{CalDavProperty, CalendarData, DavProperty, DavValue, TimeRange},
        request::{PropFind, Report},
    },
};
use groupware::{
    CalendarFilterEvaluator,
    calendar::{
        self, Instance, PeriodTimeRange, availability::AvailabilityResolver, expand_instances,
        freebusy, parse_ical,
    },
    index as calindex,
};
use hyper::StatusCode;
use store::index::IndexEntry;

use crate::{
    DavError, HttpResponse, Result, Server,
    propfind::{DataProvider, full_namespace_multistatus, member_or_missing},
    resource::{CollectionRef, Resolved},
    server::PROD_ID,
};

pub(crate) fn run_calendar_query(
    server: &Server,
    headers: &RequestHeaders<'_>,
    report: &Report,
    principal: Option<&str>,
) -> Result<HttpResponse> {
    let Report::CalendarQuery(query) = report else {
        return Err(DavError::Code(StatusCode::BAD_REQUEST));
    };
    let (_, resolved) = server.resolve_existing(headers.uri)?;

    let mut multistatus = full_namespace_multistatus();
    match resolved {
        Resolved::Collection(collection) => {
            let tz = query_timezone(&collection, query.timezone.as_deref());
            let members = collection.store.list()?;
            let index = query_index(server, &collection, &query.filter, &members, tz)?;

            for (name, _etag) in &members {
                if !name.ends_with(".ics") {
                    continue;
                }
                let indexed = index.as_ref().and_then(|entry| {
                    entry.members.get(name).and_then(|values| {
                        calindex::check_calendar_filter(values, &entry.keys, &query.filter)
                    })
                });
                let matched = match indexed {
                    Some(decision) => decision,
                    None => {
                        let Ok(item) = collection.store.get(name) else {
                            continue;
                        };
                        parse_ical(&item.bytes).is_some_and(|ical| {
                            CalendarFilterEvaluator::new(&ical, tz).matches(&query.filter)
                        })
                    }
                };
                if matched {
                    let provider = item_data_provider(&collection, name);
                    multistatus.add_response(member_or_missing(
                        server,
                        &collection,
                        name,
                        &query.properties,
                        principal,
                        provider.as_deref(),
                    ));
                }
            }
        }
        Resolved::Item {
            collection, name, ..
        } => {
            let tz = query_timezone(&collection, query.timezone.as_deref());
            let item = collection.store.get(&name)?;
            let matched = parse_ical(&item.bytes)
                .is_some_and(|ical| CalendarFilterEvaluator::new(&ical, tz).matches(&query.filter));
            if matched {
                let provider = item_data_provider(&collection, &name);
                multistatus.add_response(member_or_missing(
                    server,
                    &collection,
                    &name,
                    &query.properties,
                    principal,
                    provider.as_deref(),
                ));
            }
        }
        _ => return Err(DavError::Code(StatusCode::METHOD_NOT_ALLOWED)),
    }

    Ok(HttpResponse::multistatus(multistatus))
}

/// Fetches (or builds) the index snapshot for this collection and filter,
/// when the collection is large enough to be worth it.
fn query_index(
    server: &Server,
    collection: &CollectionRef,
    filter: &[dav_proto::schema::request::CompFilter],
    members: &[(String, String)],
    tz: Tz,
) -> Result<Option<std::sync::Arc<IndexEntry>>> {
    if members.len() < server.config.index_threshold {
        return Ok(None);
    }
    let needed = calindex::calendar_filter_keys(filter);
    if needed.is_empty() {
        return Ok(None);
    }
    let cache_key = index_cache_key(collection)?;
    if let Some(entry) = server.index.get(&cache_key) {
        if needed.iter().all(|key| entry.keys.contains(key)) {
            return Ok(Some(entry));
        }
    }

    // (Re)build, folding in previously cached keys so repeated queries
    // with different shapes converge on one entry.
    let mut keys = needed;
    if let Some(previous) = server.index.get(&cache_key) {
        for key in &previous.keys {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys.sort();
    }
    let mut entry = IndexEntry {
        keys,
        members: Default::default(),
    };
    for (name, _etag) in members {
        if !name.ends_with(".ics") {
            continue;
        }
        let Ok(item) = collection.store.get(name) else {
            continue;
        };
        if let Some(ical) = parse_ical(&item.bytes) {
            entry.members.insert(
                name.clone(),
                calindex::extract_calendar_values(&ical, &entry.keys, tz),
            );
        }
    }
    Ok(Some(server.index.insert(cache_key, entry)))
}

/// Index entries are valid for one (tree, timezone) pair: the ctag keys
/// content, and the timezone salt invalidates pre-resolved datetimes when
/// the collection timezone is reconfigured.
fn index_cache_key(collection: &CollectionRef) -> Result<String> {
    let ctag = collection.store.ctag()?;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    collection.config.timezone().unwrap_or_default().hash(&mut hasher);
    Ok(format!("{ctag}:{:x}", hasher.finish()))
}

fn query_timezone(collection: &CollectionRef, requested: Option<&str>) -> Tz {
    match requested {
        Some(text) => calendar::collection_timezone(Some(text)),
        None => calendar::collection_timezone(collection.config.timezone()),
    }
}

pub(crate) fn run_calendar_multiget(
    server: &Server,
    headers: &RequestHeaders<'_>,
    report: &Report,
    principal: Option<&str>,
) -> Result<HttpResponse> {
    let Report::CalendarMultiGet(request) = report else {
        return Err(DavError::Code(StatusCode::BAD_REQUEST));
    };
    run_multiget(server, headers, &request.hrefs, &request.properties, principal)
}

/// Shared by both multiget flavours: each href resolves within the target
/// collection or reports its own 404.
pub(crate) fn run_multiget(
    server: &Server,
    headers: &RequestHeaders<'_>,
    hrefs: &[String],
    properties: &PropFind,
    principal: Option<&str>,
) -> Result<HttpResponse> {
    let (_, resolved) = server.resolve_existing(headers.uri)?;
    let mut multistatus = full_namespace_multistatus();

    match resolved {
        Resolved::Collection(collection) => {
            for href in hrefs {
                let name = match member_name_of(&collection, href, server) {
                    Some(name) => name,
                    None => {
                        multistatus.add_response(
                            dav_proto::schema::response::Response::new_status(
                                href.clone(),
                                StatusCode::NOT_FOUND,
                            ),
                        );
                        continue;
                    }
                };
                let provider = item_data_provider(&collection, &name);
                multistatus.add_response(member_or_missing(
                    server,
                    &collection,
                    &name,
                    properties,
                    principal,
                    provider.as_deref(),
                ));
            }
        }
        _ => return Err(DavError::Code(StatusCode::METHOD_NOT_ALLOWED)),
    }
    Ok(HttpResponse::multistatus(multistatus))
}

/// The member name of an href that points inside `collection`.
fn member_name_of(collection: &CollectionRef, href: &str, server: &Server) -> Option<String> {
    let path = crate::common::uri::DavPath::parse(href, &server.config.route_prefix).ok()?;
    let (name, parent) = path.segments.split_last()?;
    if parent == collection.path.segments.as_slice() {
        Some(name.clone())
    } else {
        None
    }
}

pub(crate) fn run_freebusy_query(
    server: &Server,
    headers: &RequestHeaders<'_>,
    report: &Report,
    _principal: Option<&str>,
) -> Result<HttpResponse> {
    let Report::FreeBusyQuery(request) = report else {
        return Err(DavError::Code(StatusCode::BAD_REQUEST));
    };
    let range = request
        .range
        .ok_or(DavError::Code(StatusCode::BAD_REQUEST))?;
    let (_, resolved) = server.resolve_existing(headers.uri)?;
    let Resolved::Collection(collection) = resolved else {
        return Err(DavError::Code(StatusCode::METHOD_NOT_ALLOWED));
    };

    let tz = query_timezone(&collection, None);
    let mut events = Vec::new();
    let mut availability = AvailabilityResolver::new();
    for (name, _etag) in collection.store.list()? {
        if !name.ends_with(".ics") {
            continue;
        }
        let Ok(item) = collection.store.get(&name) else {
            continue;
        };
        if let Some(ical) = parse_ical(&item.bytes) {
            freebusy::collect_busy(&ical, &range, tz, &mut events);
            availability.add(&ical, &range, tz);
        }
    }

    let mut periods = availability.resolve(&range);
    periods.append(&mut events);
    let periods = freebusy::merge_periods(periods);

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();
    let reply = freebusy::build_vfreebusy(&periods, &range, now, PROD_ID);
    Ok(HttpResponse::new(StatusCode::OK)
        .with_content("text/calendar; charset=utf-8", reply.to_string().into_bytes()))
}

/// Answers `calendar-data` (and, through the card module, `address-data`)
/// for one member during propstat assembly.
pub(crate) fn item_data_provider(
    collection: &CollectionRef,
    name: &str,
) -> Option<Box<DataProvider<'static>>> {
    let collection = collection.clone();
    let name = name.to_string();
    Some(Box::new(move |property: &DavProperty| match property {
        DavProperty::Cal(CalDavProperty::CalendarData(data)) => {
            if !name.ends_with(".ics") {
                return Some(None);
            }
            let Ok(item) = collection.store.get(&name) else {
                return Some(None);
            };
            let Some(ical) = parse_ical(&item.bytes) else {
                return Some(None);
            };
            let tz = calendar::collection_timezone(collection.config.timezone());
            Some(Some(DavValue::CData(serialize_calendar_data(
                &ical, data, tz,
            ))))
        }
        DavProperty::Card(dav_proto::schema::property::CardDavProperty::AddressData(names)) => {
            super::card::address_data_value(&collection, &name, names)
        }
        _ => None,
    }))
}

/// Renders an object for a `calendar-data` request: whole when no
/// selection applies, otherwise rebuilt component by component honouring
/// the selection, expansion and limit windows.
pub(crate) fn serialize_calendar_data(
    ical: &ICalendar,
    data: &CalendarData,
    tz: Tz,
) -> String {
    if data.properties.is_empty()
        && data.expand.is_none()
        && data.limit_recurrence.is_none()
        && data.limit_freebusy.is_none()
    {
        return ical.to_string();
    }

    let instances = if data.expand.is_some() || data.limit_recurrence.is_some() {
        Some(expand_instances(ical, tz))
    } else {
        None
    };

    let mut out = String::new();
    if let Some(root) = ical.components.first() {
        write_component(ical, root, 0, data, tz, instances.as_deref(), &mut out);
    }
    out
}

fn wanted_component(data: &CalendarData, comp: &ICalendarComponentType) -> bool {
    if data.properties.is_empty() || *comp == ICalendarComponentType::VCalendar {
        return true;
    }
    if *comp == ICalendarComponentType::VTimezone {
        // Timezones stay unless the reply is expanded to UTC.
        return data.expand.is_none();
    }
    data.properties
        .iter()
        .any(|prop| prop.component.as_ref().is_none_or(|c| c == comp))
}

fn wanted_entry(
    data: &CalendarData,
    comp: &ICalendarComponentType,
    name: &ICalendarProperty,
) -> Option<bool> {
    if data.properties.is_empty() || *comp == ICalendarComponentType::VCalendar {
        return Some(true);
    }
    data.properties
        .iter()
        .find(|prop| {
            prop.component.as_ref().is_none_or(|c| c == comp)
                && prop.name.as_ref().is_none_or(|n| n == name)
        })
        .map(|prop| !prop.no_value)
}

fn write_component(
    ical: &ICalendar,
    comp: &calcard::icalendar::ICalendarComponent,
    comp_id: u16,
    data: &CalendarData,
    tz: Tz,
    instances: Option<&[Instance]>,
    out: &mut String,
) {
    let comp_type = &comp.component_type;
    if !wanted_component(data, comp_type) {
        return;
    }

    // limit-recurrence-set: drop override instances entirely outside the
    // window (RFC 4791 section 9.6.6).
    if let (Some(window), Some(instances)) = (&data.limit_recurrence, instances) {
        if comp.is_recurrence_override()
            && !instances.iter().any(|instance| {
                instance.comp_id == comp_id && window.overlaps(instance.start, instance.end)
            })
        {
            return;
        }
    }
    if let Some(window) = &data.limit_freebusy {
        if *comp_type == ICalendarComponentType::VFreebusy
            && !freebusy_overlaps(comp, window, tz)
        {
            return;
        }
    }

    if let (Some(window), Some(instances), true) = (
        &data.expand,
        instances,
        comp_type.has_time_ranges() && *comp_type != ICalendarComponentType::VFreebusy,
    ) {
        write_expanded(comp, comp_id, window, instances, data, out);
        return;
    }

    let name = comp_type.as_str();
    out.push_str("BEGIN:");
    out.push_str(name);
    out.push_str("\r\n");
    for entry in &comp.entries {
        match wanted_entry(data, comp_type, &entry.name) {
            Some(true) => {
                if let (Some(window), ICalendarProperty::Freebusy) =
                    (&data.limit_freebusy, &entry.name)
                {
                    write_limited_freebusy(entry, window, tz, out);
                } else {
                    let _ = entry.write_to(out);
                }
            }
            Some(false) => {
                let mut stripped = entry.clone();
                stripped.values.clear();
                let _ = stripped.write_to(out);
            }
            None => {}
        }
    }
    for child_id in &comp.component_ids {
        if let Some(child) = ical.components.get(*child_id as usize) {
            write_component(ical, child, *child_id, data, tz, instances, out);
        }
    }
    out.push_str("END:");
    out.push_str(name);
    out.push_str("\r\n");
}

/// Expansion rewrites each instance in the window as its own component
/// with concrete UTC times and no recurrence properties.
fn write_expanded(
    comp: &calcard::icalendar::ICalendarComponent,
    comp_id: u16,
    window: &TimeRange,
    instances: &[Instance],
    data: &CalendarData,
    out: &mut String,
) {
    let comp_type = &comp.component_type;
    let name = comp_type.as_str();
    let recurrent = comp.is_recurrent() || comp.is_recurrence_override();

    let mut in_window: Vec<&Instance> = instances
        .iter()
        .filter(|instance| {
            instance.comp_id == comp_id && window.overlaps(instance.start, instance.end)
        })
        .collect();
    in_window.sort_by_key(|instance| instance.start);

    for instance in in_window {
        out.push_str("BEGIN:");
        out.push_str(name);
        out.push_str("\r\n");
        let _ = date_property(ICalendarProperty::Dtstart, instance.start).write_to(out);
        if recurrent {
            let _ = date_property(ICalendarProperty::RecurrenceId, instance.start).write_to(out);
        }
        let _ = date_property(ICalendarProperty::Dtend, instance.end).write_to(out);
        for entry in &comp.entries {
            if matches!(
                entry.name,
                ICalendarProperty::Dtstart
                    | ICalendarProperty::Dtend
                    | ICalendarProperty::Duration
                    | ICalendarProperty::Rrule
                    | ICalendarProperty::Rdate
                    | ICalendarProperty::Exdate
                    | ICalendarProperty::Exrule
                    | ICalendarProperty::RecurrenceId
            ) {
                continue;
            }
            match wanted_entry(data, comp_type, &entry.name) {
                Some(true) => {
                    let _ = entry.write_to(out);
                }
                Some(false) => {
                    let mut stripped = entry.clone();
                    stripped.values.clear();
                    let _ = stripped.write_to(out);
                }
                None => {}
            }
        }
        out.push_str("END:");
        out.push_str(name);
        out.push_str("\r\n");
    }
}

fn date_property(name: ICalendarProperty, ts: i64) -> ICalendarEntry {
    ICalendarEntry {
        name,
        params: vec![],
        values: vec![calcard::icalendar::ICalendarValue::PartialDateTime(
            Box::new(calcard::common::PartialDateTime::from_utc_timestamp(ts)),
        )],
    }
}

fn freebusy_overlaps(
    comp: &calcard::icalendar::ICalendarComponent,
    window: &TimeRange,
    tz: Tz,
) -> bool {
    comp.entries
        .iter()
        .filter(|entry| entry.name == ICalendarProperty::Freebusy)
        .any(|entry| {
            freebusy::entry_periods(entry, tz)
                .iter()
                .any(|(start, end)| window.overlaps(*start, *end))
        })
}

fn write_limited_freebusy(entry: &ICalendarEntry, window: &TimeRange, tz: Tz, out: &mut String) {
    let keep: Vec<calcard::icalendar::ICalendarValue> = entry
        .values
        .iter()
        .filter(|value| {
            if let calcard::icalendar::ICalendarValue::Period(period) = value {
                period.time_range(tz).is_some_and(|(start, end)| {
                    window.overlaps(start.timestamp(), end.timestamp())
                })
            } else {
                false
            }
        })
        .cloned()
        .collect();
    if !keep.is_empty() {
        let mut filtered = entry.clone();
        filtered.values = keep;
        let _ = filtered.write_to(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dav_proto::schema::property::CalPropertyName;

    fn weekly_event() -> ICalendar {
        parse_ical(
            b"BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\n\
              BEGIN:VEVENT\r\nUID:w\r\nDTSTAMP:20240101T000000Z\r\n\
              DTSTART:20240101T100000Z\r\nDTEND:20240101T110000Z\r\n\
              RRULE:FREQ=WEEKLY;COUNT=8\r\nSUMMARY:Standup\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
        )
        .unwrap()
    }

    #[test]
    fn whole_object_without_selection() {
        let ical = weekly_event();
        let data = CalendarData::default();
        assert_eq!(serialize_calendar_data(&ical, &data, Tz::UTC), ical.to_string());
    }

    #[test]
    fn property_selection_prunes_entries() {
        let ical = weekly_event();
        let data = CalendarData {
            properties: vec![
                CalPropertyName {
                    component: Some(ICalendarComponentType::VEvent),
                    name: Some(ICalendarProperty::Uid),
                    no_value: false,
                },
                CalPropertyName {
                    component: Some(ICalendarComponentType::VEvent),
                    name: Some(ICalendarProperty::Summary),
                    no_value: false,
                },
            ],
            ..CalendarData::default()
        };
        let out = serialize_calendar_data(&ical, &data, Tz::UTC);
        assert!(out.contains("UID:w"));
        assert!(out.contains("SUMMARY:Standup"));
        assert!(!out.contains("DTSTAMP"));
        assert!(out.starts_with("BEGIN:VCALENDAR"));
        assert!(out.contains("END:VCALENDAR"));
    }

    #[test]
    fn expand_rewrites_instances_in_window() {
        let ical = weekly_event();
        let data = CalendarData {
            expand: Some(TimeRange {
                start: 1704585600, // 2024-01-07
                end: 1705795200,   // 2024-01-21
            }),
            ..CalendarData::default()
        };
        let out = serialize_calendar_data(&ical, &data, Tz::UTC);
        // Two of the eight instances fall in the window.
        assert_eq!(out.matches("BEGIN:VEVENT").count(), 2);
        assert_eq!(out.matches("RECURRENCE-ID").count(), 2);
        assert!(out.contains("DTSTART:20240108T100000Z"));
        assert!(out.contains("DTSTART:20240115T100000Z"));
        assert!(!out.contains("RRULE"));
    }
}
