/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! MKCOL, extended MKCOL (RFC 5689) and MKCALENDAR (RFC 4791
//! section 5.3.1). The initial property set is applied atomically: if any
//! property is refused the collection is not created and the failure comes
//! back in a mkcol-response body.

use dav_proto::{
    RequestHeaders,
    schema::{
        Namespace,
        property::{DavProperty, DavPropertyValue, DavValue, ResourceType, WebDavProperty},
        request::MkCol,
        response::{MkColResponse, PropStat},
    },
};
use hyper::StatusCode;
use store::{CollectionConfig, CollectionType};

use crate::{
    DavError, HttpResponse, Result, Server,
    resource::Resolved,
};

pub(crate) trait MkColRequestHandler: Sync + Send {
    fn handle_mkcol(
        &self,
        headers: &RequestHeaders<'_>,
        request: MkCol,
    ) -> impl Future<Output = Result<HttpResponse>> + Send;
}

impl MkColRequestHandler for Server {
    async fn handle_mkcol(
        &self,
        headers: &RequestHeaders<'_>,
        request: MkCol,
    ) -> Result<HttpResponse> {
        let (path, resolved) = self.resolve_uri(headers.uri)?;
        if resolved.is_some() {
            return Err(DavError::Code(StatusCode::METHOD_NOT_ALLOWED));
        }
        // Dotted names are reserved for control data and never resolve.
        if path.segments.iter().any(|segment| segment.starts_with('.')) {
            return Err(DavError::Code(StatusCode::FORBIDDEN));
        }
        let parent_path = path
            .parent()
            .ok_or(DavError::Code(StatusCode::FORBIDDEN))?;
        let parent = self
            .backend
            .resolve(&parent_path, &self.config.route_prefix)?;
        // The parent must exist and be a plain container; collections do
        // not nest inside calendars or addressbooks.
        match parent {
            Some(Resolved::Principal { .. } | Resolved::CollectionSet { .. }) => {}
            Some(Resolved::Collection(_) | Resolved::Item { .. } | Resolved::Root) | None => {
                return Err(DavError::Code(StatusCode::CONFLICT));
            }
        }

        let mut config = CollectionConfig::default();
        let mut collection_type = if request.is_mkcalendar {
            CollectionType::Calendar
        } else {
            CollectionType::Other
        };
        let mut deferred: Vec<&DavPropertyValue> = Vec::new();
        let mut rejected: Vec<DavProperty> = Vec::new();

        for prop in &request.props {
            match (&prop.property, &prop.value) {
                (
                    DavProperty::WebDav(WebDavProperty::ResourceType),
                    DavValue::ResourceTypes(types),
                ) => {
                    let typed: Vec<&ResourceType> = types
                        .iter()
                        .filter(|typ| !matches!(typ, ResourceType::Collection))
                        .collect();
                    collection_type = match typed.as_slice() {
                        [] => CollectionType::Other,
                        [ResourceType::Calendar] => CollectionType::Calendar,
                        [ResourceType::Addressbook] => CollectionType::Addressbook,
                        [ResourceType::Subscribed] => CollectionType::Subscription,
                        _ => {
                            rejected.push(prop.property.clone());
                            continue;
                        }
                    };
                }
                _ => deferred.push(prop),
            }
        }

        config.set_collection_type(collection_type);

        // Validate the deferred properties against the registry before
        // anything is created.
        for prop in &deferred {
            match self.properties.lookup(&prop.property) {
                Some(live) if !live.protected && live.set.is_some() => {}
                _ => rejected.push(prop.property.clone()),
            }
        }

        if !rejected.is_empty() {
            let response = MkColResponse::new(vec![
                PropStat::with_status(
                    rejected.into_iter().map(DavPropertyValue::empty).collect(),
                    StatusCode::FORBIDDEN,
                ),
            ])
            .with_namespace(Namespace::CalDav)
            .with_namespace(Namespace::CardDav);
            return Ok(HttpResponse::new(StatusCode::FORBIDDEN)
                .with_xml_body(response.to_string()));
        }

        for prop in &deferred {
            apply_initial_prop(&mut config, prop);
        }

        let dir = self
            .backend
            .root()
            .join(path.segments.join(std::path::MAIN_SEPARATOR_STR));
        self.backend.create_collection(&dir, config)?;

        Ok(HttpResponse::new(StatusCode::CREATED))
    }
}

/// Initial properties land straight in the sidecar; the store does not
/// exist yet when they are validated.
fn apply_initial_prop(config: &mut CollectionConfig, prop: &DavPropertyValue) {
    use dav_proto::schema::property::CalDavProperty;
    let key = match &prop.property {
        DavProperty::WebDav(WebDavProperty::DisplayName) => "displayname",
        DavProperty::WebDav(WebDavProperty::CalendarColor) => "color",
        DavProperty::WebDav(WebDavProperty::CalendarOrder) => "order",
        DavProperty::WebDav(WebDavProperty::Source) => "source",
        DavProperty::Cal(CalDavProperty::CalendarDescription) => "description",
        DavProperty::Card(dav_proto::schema::property::CardDavProperty::AddressbookDescription) => {
            "description"
        }
        DavProperty::Cal(CalDavProperty::CalendarTimezone) => "timezone",
        DavProperty::Cal(CalDavProperty::SupportedCalendarComponentSet) => {
            if let DavValue::Components(components) = &prop.value {
                let names: Vec<String> =
                    components.iter().map(|c| c.as_str().to_string()).collect();
                config.set_components(&names);
            }
            return;
        }
        _ => return,
    };
    match &prop.value {
        DavValue::String(text) | DavValue::CData(text) => config.set(key, text.clone()),
        DavValue::Uint64(number) => config.set(key, number.to_string()),
        _ => {}
    }
}
