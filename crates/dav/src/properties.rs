/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! The live-property registry. Properties are table entries carrying
//! their read and (optionally) write behaviour; nothing outside this
//! table defines what a property means. Dead property storage is not
//! offered: an unknown name is a 404 on read and a 403 on write.

use calcard::icalendar::ICalendarComponentType;
use dav_proto::schema::property::{
    CalDavProperty, CardDavProperty, DavProperty, DavValue, PrincipalProperty, ReportSet,
    ResourceType, WebDavProperty,
};
use dav_proto::schema::response::Href;
use store::CollectionType;

use crate::{
    Server,
    resource::{CollectionRef, Resolved},
};

pub struct PropContext<'x> {
    pub server: &'x Server,
    pub resource: &'x Resolved,
    pub href: &'x str,
    /// Authenticated principal name, when any.
    pub principal: Option<&'x str>,
}

impl PropContext<'_> {
    fn collection(&self) -> Option<&CollectionRef> {
        match self.resource {
            Resolved::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    fn calendar(&self) -> Option<&CollectionRef> {
        self.collection().filter(|c| c.is_calendar())
    }

    fn addressbook(&self) -> Option<&CollectionRef> {
        self.collection().filter(|c| c.is_addressbook())
    }

    fn principal_href(&self) -> Option<String> {
        self.principal
            .map(|name| self.server.principal_href(name))
    }
}

pub enum PropGet {
    Value(DavValue),
    NotFound,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SetError {
    Protected,
    Forbidden,
}

pub type SetResult = Result<(), SetError>;

pub struct LiveProperty {
    pub name: DavProperty,
    pub in_allprop: bool,
    pub protected: bool,
    pub get: fn(&PropContext<'_>) -> PropGet,
    pub set: Option<fn(&PropContext<'_>, &DavValue) -> SetResult>,
}

pub struct PropertyRegistry {
    entries: Vec<LiveProperty>,
}

impl PropertyRegistry {
    pub fn lookup(&self, name: &DavProperty) -> Option<&LiveProperty> {
        self.entries.iter().find(|entry| entry.name.same_name(name))
    }

    pub fn all_prop(&self) -> impl Iterator<Item = &LiveProperty> {
        self.entries.iter().filter(|entry| entry.in_allprop)
    }

    pub fn entries(&self) -> impl Iterator<Item = &LiveProperty> {
        self.entries.iter()
    }

    /// The complete live-property table.
    pub fn core() -> Self {
        use DavProperty::{Cal, Card, Principal, WebDav};

        let entries = vec![
            LiveProperty {
                name: WebDav(WebDavProperty::ResourceType),
                in_allprop: true,
                protected: true,
                get: get_resourcetype,
                set: None,
            },
            LiveProperty {
                name: WebDav(WebDavProperty::DisplayName),
                in_allprop: true,
                protected: false,
                get: get_displayname,
                set: Some(set_displayname),
            },
            LiveProperty {
                name: WebDav(WebDavProperty::GetETag),
                in_allprop: true,
                protected: true,
                get: get_etag,
                set: None,
            },
            LiveProperty {
                name: WebDav(WebDavProperty::GetContentType),
                in_allprop: true,
                protected: true,
                get: get_contenttype,
                set: None,
            },
            LiveProperty {
                name: WebDav(WebDavProperty::GetContentLength),
                in_allprop: true,
                protected: true,
                get: get_contentlength,
                set: None,
            },
            LiveProperty {
                name: WebDav(WebDavProperty::GetContentLanguage),
                in_allprop: true,
                protected: true,
                get: |_| PropGet::NotFound,
                set: None,
            },
            LiveProperty {
                name: WebDav(WebDavProperty::GetLastModified),
                in_allprop: true,
                protected: true,
                get: get_lastmodified,
                set: None,
            },
            LiveProperty {
                name: WebDav(WebDavProperty::CreationDate),
                in_allprop: true,
                protected: true,
                get: get_creationdate,
                set: None,
            },
            // Lock capability is advertised empty: no lock support.
            LiveProperty {
                name: WebDav(WebDavProperty::SupportedLock),
                in_allprop: true,
                protected: true,
                get: |_| PropGet::Value(DavValue::Null),
                set: None,
            },
            LiveProperty {
                name: WebDav(WebDavProperty::LockDiscovery),
                in_allprop: true,
                protected: true,
                get: |_| PropGet::Value(DavValue::Null),
                set: None,
            },
            LiveProperty {
                name: WebDav(WebDavProperty::SupportedReportSet),
                in_allprop: false,
                protected: true,
                get: get_supported_report_set,
                set: None,
            },
            LiveProperty {
                name: WebDav(WebDavProperty::CurrentUserPrincipal),
                in_allprop: false,
                protected: true,
                get: get_current_user_principal,
                set: None,
            },
            LiveProperty {
                name: WebDav(WebDavProperty::PrincipalUrl),
                in_allprop: false,
                protected: true,
                get: get_principal_url,
                set: None,
            },
            LiveProperty {
                name: WebDav(WebDavProperty::SyncToken),
                in_allprop: false,
                protected: true,
                get: get_sync_token,
                set: None,
            },
            LiveProperty {
                name: WebDav(WebDavProperty::GetCTag),
                in_allprop: false,
                protected: true,
                get: get_ctag,
                set: None,
            },
            LiveProperty {
                name: WebDav(WebDavProperty::AddMember),
                in_allprop: false,
                protected: true,
                get: get_add_member,
                set: None,
            },
            LiveProperty {
                name: WebDav(WebDavProperty::Source),
                in_allprop: false,
                protected: false,
                get: |ctx| get_config_value(ctx, "source"),
                set: Some(|ctx, value| set_config_value(ctx, "source", value)),
            },
            LiveProperty {
                name: WebDav(WebDavProperty::RefreshRate),
                in_allprop: false,
                protected: false,
                get: |ctx| get_config_value(ctx, "refreshrate"),
                set: Some(|ctx, value| set_config_value(ctx, "refreshrate", value)),
            },
            LiveProperty {
                name: WebDav(WebDavProperty::CalendarColor),
                in_allprop: false,
                protected: false,
                get: |ctx| get_config_value(ctx, "color"),
                set: Some(|ctx, value| set_config_value(ctx, "color", value)),
            },
            LiveProperty {
                name: WebDav(WebDavProperty::CalendarOrder),
                in_allprop: false,
                protected: false,
                get: |ctx| get_config_value(ctx, "order"),
                set: Some(|ctx, value| set_config_value(ctx, "order", value)),
            },
            LiveProperty {
                name: Principal(PrincipalProperty::CalendarHomeSet),
                in_allprop: false,
                protected: true,
                get: |ctx| get_home_set(ctx, "calendars"),
                set: None,
            },
            LiveProperty {
                name: Principal(PrincipalProperty::AddressbookHomeSet),
                in_allprop: false,
                protected: true,
                get: |ctx| get_home_set(ctx, "contacts"),
                set: None,
            },
            LiveProperty {
                name: Principal(PrincipalProperty::CalendarUserAddressSet),
                in_allprop: false,
                protected: true,
                get: get_calendar_user_address_set,
                set: None,
            },
            LiveProperty {
                name: Principal(PrincipalProperty::ScheduleInboxUrl),
                in_allprop: false,
                protected: true,
                get: |ctx| get_schedule_url(ctx, "inbox"),
                set: None,
            },
            LiveProperty {
                name: Principal(PrincipalProperty::ScheduleOutboxUrl),
                in_allprop: false,
                protected: true,
                get: |ctx| get_schedule_url(ctx, "outbox"),
                set: None,
            },
            LiveProperty {
                name: Principal(PrincipalProperty::GroupMembership),
                in_allprop: false,
                protected: true,
                get: |ctx| match ctx.resource {
                    Resolved::Principal { .. } => PropGet::Value(DavValue::Href(Vec::new())),
                    _ => PropGet::NotFound,
                },
                set: None,
            },
            LiveProperty {
                name: Cal(CalDavProperty::CalendarDescription),
                in_allprop: false,
                protected: false,
                get: |ctx| match ctx.calendar() {
                    Some(_) => get_config_value(ctx, "description"),
                    None => PropGet::NotFound,
                },
                set: Some(|ctx, value| {
                    if ctx.calendar().is_some() {
                        set_config_value(ctx, "description", value)
                    } else {
                        Err(SetError::Forbidden)
                    }
                }),
            },
            LiveProperty {
                name: Cal(CalDavProperty::CalendarTimezone),
                in_allprop: false,
                protected: false,
                get: |ctx| match ctx.calendar().and_then(|c| c.config.timezone()) {
                    Some(tz) => PropGet::Value(DavValue::CData(tz.to_string())),
                    None => PropGet::NotFound,
                },
                set: Some(|ctx, value| {
                    if ctx.calendar().is_some() {
                        set_config_value(ctx, "timezone", value)
                    } else {
                        Err(SetError::Forbidden)
                    }
                }),
            },
            LiveProperty {
                name: Cal(CalDavProperty::SupportedCalendarComponentSet),
                in_allprop: false,
                protected: false,
                get: get_component_set,
                set: Some(set_component_set),
            },
            LiveProperty {
                name: Cal(CalDavProperty::SupportedCalendarData),
                in_allprop: false,
                protected: true,
                get: |ctx| match ctx.calendar() {
                    Some(_) => PropGet::Value(DavValue::SupportedCalendarData),
                    None => PropGet::NotFound,
                },
                set: None,
            },
            LiveProperty {
                name: Cal(CalDavProperty::SupportedCollationSet),
                in_allprop: false,
                protected: true,
                get: |ctx| match ctx.calendar() {
                    Some(_) => PropGet::Value(supported_collations()),
                    None => PropGet::NotFound,
                },
                set: None,
            },
            LiveProperty {
                name: Cal(CalDavProperty::MaxResourceSize),
                in_allprop: false,
                protected: true,
                get: |ctx| match ctx.calendar() {
                    Some(_) => PropGet::Value(DavValue::Uint64(MAX_RESOURCE_SIZE)),
                    None => PropGet::NotFound,
                },
                set: None,
            },
            LiveProperty {
                name: Cal(CalDavProperty::MinDateTime),
                in_allprop: false,
                protected: true,
                get: |ctx| match ctx.calendar() {
                    Some(_) => PropGet::Value(DavValue::String(MIN_DATE_TIME.to_string())),
                    None => PropGet::NotFound,
                },
                set: None,
            },
            LiveProperty {
                name: Cal(CalDavProperty::MaxDateTime),
                in_allprop: false,
                protected: true,
                get: |ctx| match ctx.calendar() {
                    Some(_) => PropGet::Value(DavValue::String(MAX_DATE_TIME.to_string())),
                    None => PropGet::NotFound,
                },
                set: None,
            },
            LiveProperty {
                name: Cal(CalDavProperty::MaxInstances),
                in_allprop: false,
                protected: true,
                get: |ctx| match ctx.calendar() {
                    Some(_) => {
                        PropGet::Value(DavValue::Uint64(groupware::calendar::MAX_EXPANSIONS as u64))
                    }
                    None => PropGet::NotFound,
                },
                set: None,
            },
            LiveProperty {
                name: Cal(CalDavProperty::MaxAttendeesPerInstance),
                in_allprop: false,
                protected: true,
                get: |ctx| match ctx.calendar() {
                    Some(_) => PropGet::Value(DavValue::Uint64(MAX_ATTENDEES_PER_INSTANCE)),
                    None => PropGet::NotFound,
                },
                set: None,
            },
            LiveProperty {
                name: Card(CardDavProperty::AddressbookDescription),
                in_allprop: false,
                protected: false,
                get: |ctx| match ctx.addressbook() {
                    Some(_) => get_config_value(ctx, "description"),
                    None => PropGet::NotFound,
                },
                set: Some(|ctx, value| {
                    if ctx.addressbook().is_some() {
                        set_config_value(ctx, "description", value)
                    } else {
                        Err(SetError::Forbidden)
                    }
                }),
            },
            LiveProperty {
                name: Card(CardDavProperty::SupportedAddressData),
                in_allprop: false,
                protected: true,
                get: |ctx| match ctx.addressbook() {
                    Some(_) => PropGet::Value(DavValue::SupportedAddressData),
                    None => PropGet::NotFound,
                },
                set: None,
            },
            LiveProperty {
                name: Card(CardDavProperty::SupportedCollationSet),
                in_allprop: false,
                protected: true,
                get: |ctx| match ctx.addressbook() {
                    Some(_) => PropGet::Value(supported_collations()),
                    None => PropGet::NotFound,
                },
                set: None,
            },
            LiveProperty {
                name: Card(CardDavProperty::MaxResourceSize),
                in_allprop: false,
                protected: true,
                get: |ctx| match ctx.addressbook() {
                    Some(_) => PropGet::Value(DavValue::Uint64(MAX_RESOURCE_SIZE)),
                    None => PropGet::NotFound,
                },
                set: None,
            },
        ];
        PropertyRegistry { entries }
    }
}

pub const MAX_RESOURCE_SIZE: u64 = 10 * 1024 * 1024;
pub const MAX_ATTENDEES_PER_INSTANCE: u64 = 100;
const MIN_DATE_TIME: &str = "00010101T000000Z";
const MAX_DATE_TIME: &str = "99991231T235959Z";

fn supported_collations() -> DavValue {
    DavValue::Collations(vec![
        dav_proto::schema::Collation::AsciiCasemap,
        dav_proto::schema::Collation::Octet,
    ])
}

fn get_resourcetype(ctx: &PropContext<'_>) -> PropGet {
    let types = match ctx.resource {
        Resolved::Root | Resolved::CollectionSet { .. } => vec![ResourceType::Collection],
        Resolved::Principal { .. } => {
            vec![ResourceType::Collection, ResourceType::Principal]
        }
        Resolved::Collection(collection) => {
            let mut types = vec![ResourceType::Collection];
            match collection.collection_type() {
                CollectionType::Calendar => types.push(ResourceType::Calendar),
                CollectionType::Addressbook => types.push(ResourceType::Addressbook),
                CollectionType::ScheduleInbox => types.push(ResourceType::ScheduleInbox),
                CollectionType::ScheduleOutbox => types.push(ResourceType::ScheduleOutbox),
                CollectionType::Subscription => types.push(ResourceType::Subscribed),
                CollectionType::Other => {}
            }
            types
        }
        Resolved::Item { .. } => Vec::new(),
    };
    PropGet::Value(DavValue::ResourceTypes(types))
}

fn get_displayname(ctx: &PropContext<'_>) -> PropGet {
    match ctx.resource {
        Resolved::Collection(collection) => {
            PropGet::Value(DavValue::String(collection.displayname()))
        }
        Resolved::Principal { name, .. } => PropGet::Value(DavValue::String(name.clone())),
        Resolved::CollectionSet { path, .. } => PropGet::Value(DavValue::String(
            path.last().unwrap_or_default().to_string(),
        )),
        Resolved::Root | Resolved::Item { .. } => PropGet::NotFound,
    }
}

fn set_displayname(ctx: &PropContext<'_>, value: &DavValue) -> SetResult {
    set_config_value(ctx, "displayname", value)
}

fn get_etag(ctx: &PropContext<'_>) -> PropGet {
    match ctx.resource {
        Resolved::Item { etag, .. } => PropGet::Value(DavValue::String(format!("\"{etag}\""))),
        _ => PropGet::NotFound,
    }
}

fn get_contenttype(ctx: &PropContext<'_>) -> PropGet {
    match ctx.resource {
        Resolved::Item { name, .. } => PropGet::Value(DavValue::String(
            store::media::MediaKind::from_name(name)
                .content_type()
                .to_string(),
        )),
        _ => PropGet::NotFound,
    }
}

fn get_contentlength(ctx: &PropContext<'_>) -> PropGet {
    match ctx.resource {
        Resolved::Item {
            collection, name, ..
        } => match collection.store.get(name) {
            // The raw stored octets; what GET returns.
            Ok(item) => PropGet::Value(DavValue::Uint64(item.bytes.len() as u64)),
            Err(_) => PropGet::NotFound,
        },
        _ => PropGet::NotFound,
    }
}

fn get_lastmodified(ctx: &PropContext<'_>) -> PropGet {
    match ctx.resource {
        Resolved::Item {
            collection, name, ..
        } => match collection.store.get(name) {
            Ok(item) => PropGet::Value(DavValue::Rfc1123Date(item.modified.unwrap_or_default())),
            Err(_) => PropGet::NotFound,
        },
        _ => PropGet::NotFound,
    }
}

fn get_creationdate(ctx: &PropContext<'_>) -> PropGet {
    match ctx.resource {
        Resolved::Item {
            collection, name, ..
        } => match collection.store.get(name) {
            Ok(item) => PropGet::Value(DavValue::Rfc3339Date(item.created.unwrap_or_default())),
            Err(_) => PropGet::NotFound,
        },
        _ => PropGet::NotFound,
    }
}

fn get_supported_report_set(ctx: &PropContext<'_>) -> PropGet {
    let reports = match ctx.resource {
        Resolved::Collection(collection) => match collection.collection_type() {
            CollectionType::Calendar => ReportSet::calendar(),
            CollectionType::Addressbook => ReportSet::addressbook(),
            _ => ReportSet::collection(),
        },
        Resolved::Principal { .. } | Resolved::CollectionSet { .. } | Resolved::Root => {
            ReportSet::collection()
        }
        Resolved::Item { .. } => return PropGet::NotFound,
    };
    PropGet::Value(DavValue::ReportSets(reports))
}

fn get_current_user_principal(ctx: &PropContext<'_>) -> PropGet {
    match ctx.principal_href() {
        Some(href) => PropGet::Value(DavValue::Href(vec![Href(href)])),
        None => PropGet::NotFound,
    }
}

fn get_principal_url(ctx: &PropContext<'_>) -> PropGet {
    match ctx.resource {
        Resolved::Principal { href, .. } => {
            PropGet::Value(DavValue::Href(vec![Href(href.clone())]))
        }
        _ => PropGet::NotFound,
    }
}

fn get_sync_token(ctx: &PropContext<'_>) -> PropGet {
    match ctx.resource {
        Resolved::Collection(collection) => {
            PropGet::Value(DavValue::String(ctx.server.sync_token(collection)))
        }
        _ => PropGet::NotFound,
    }
}

fn get_ctag(ctx: &PropContext<'_>) -> PropGet {
    match ctx.resource {
        Resolved::Collection(collection) => match collection.store.ctag() {
            Ok(ctag) => PropGet::Value(DavValue::String(ctag)),
            Err(_) => PropGet::NotFound,
        },
        _ => PropGet::NotFound,
    }
}

fn get_add_member(ctx: &PropContext<'_>) -> PropGet {
    match ctx.resource {
        Resolved::Collection(collection) => {
            PropGet::Value(DavValue::Href(vec![Href(collection.href.clone())]))
        }
        _ => PropGet::NotFound,
    }
}

fn get_home_set(ctx: &PropContext<'_>, home: &str) -> PropGet {
    match ctx.resource {
        Resolved::Principal { href, .. } => {
            PropGet::Value(DavValue::Href(vec![Href(format!("{href}{home}/"))]))
        }
        _ => PropGet::NotFound,
    }
}

fn get_calendar_user_address_set(ctx: &PropContext<'_>) -> PropGet {
    match ctx.resource {
        Resolved::Principal { href, .. } => {
            PropGet::Value(DavValue::Href(vec![Href(href.clone())]))
        }
        _ => PropGet::NotFound,
    }
}

fn get_schedule_url(ctx: &PropContext<'_>, which: &str) -> PropGet {
    match ctx.resource {
        Resolved::Principal { href, .. } => {
            PropGet::Value(DavValue::Href(vec![Href(format!("{href}calendars/{which}/"))]))
        }
        _ => PropGet::NotFound,
    }
}

fn get_component_set(ctx: &PropContext<'_>) -> PropGet {
    let Some(calendar) = ctx.calendar() else {
        return PropGet::NotFound;
    };
    let components = calendar
        .config
        .components()
        .map(|names| {
            names
                .iter()
                .map(|name| {
                    ICalendarComponentType::try_from(name.as_bytes())
                        .unwrap_or_else(|_| ICalendarComponentType::Other(name.clone()))
                })
                .collect()
        })
        .unwrap_or_else(|| {
            vec![
                ICalendarComponentType::VEvent,
                ICalendarComponentType::VTodo,
                ICalendarComponentType::VJournal,
            ]
        });
    PropGet::Value(DavValue::Components(components))
}

fn set_component_set(ctx: &PropContext<'_>, value: &DavValue) -> SetResult {
    let Some(calendar) = ctx.calendar() else {
        return Err(SetError::Forbidden);
    };
    let DavValue::Components(components) = value else {
        return Err(SetError::Forbidden);
    };
    let mut config = calendar.config.clone();
    let names: Vec<String> = components
        .iter()
        .map(|component| component.as_str().to_string())
        .collect();
    config.set_components(&names);
    calendar
        .store
        .set_config(config)
        .map_err(|_| SetError::Forbidden)
}

fn get_config_value(ctx: &PropContext<'_>, key: &str) -> PropGet {
    match ctx.collection().and_then(|c| c.config.get(key)) {
        Some(value) => PropGet::Value(DavValue::String(value.to_string())),
        None => PropGet::NotFound,
    }
}

fn set_config_value(ctx: &PropContext<'_>, key: &str, value: &DavValue) -> SetResult {
    let Some(collection) = ctx.collection() else {
        return Err(SetError::Forbidden);
    };
    let mut config = collection.config.clone();
    match value {
        DavValue::Null => {
            config.unset(key);
        }
        DavValue::String(text) => config.set(key, text.clone()),
        DavValue::CData(text) => config.set(key, text.clone()),
        DavValue::Uint64(number) => config.set(key, number.to_string()),
        _ => return Err(SetError::Forbidden),
    }
    collection
        .store
        .set_config(config)
        .map_err(|_| SetError::Forbidden)
}
