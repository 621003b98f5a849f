/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! CardDAV reports: addressbook-query with its result limit, and
//! addressbook-multiget. `address-data` sub-element selection rebuilds
//! the card with the requested properties only.

use calcard::vcard::{VCard, VCardProperty};
use dav_proto::{
    RequestHeaders,
    schema::{
        property::{CardPropertyName, DavValue},
        request::Report,
        response::BaseCondition,
    },
};
use groupware::{contact::parse_vcard, index as cardindex, matches_vcard};
use hyper::StatusCode;

use crate::{
    DavError, HttpResponse, Result, Server,
    propfind::{full_namespace_multistatus, member_or_missing},
    resource::{CollectionRef, Resolved},
};

pub(crate) fn run_addressbook_query(
    server: &Server,
    headers: &RequestHeaders<'_>,
    report: &Report,
    principal: Option<&str>,
) -> Result<HttpResponse> {
    let Report::AddressbookQuery(query) = report else {
        return Err(DavError::Code(StatusCode::BAD_REQUEST));
    };
    let (_, resolved) = server.resolve_existing(headers.uri)?;
    let Resolved::Collection(collection) = resolved else {
        return Err(DavError::Code(StatusCode::METHOD_NOT_ALLOWED));
    };

    let members = collection.store.list()?;
    let index = query_index(server, &collection, query, &members)?;

    let mut multistatus = full_namespace_multistatus();
    let mut matched = 0u32;
    let mut truncated = false;
    for (name, _etag) in &members {
        if !name.ends_with(".vcf") {
            continue;
        }
        if query.limit.is_some_and(|limit| matched >= limit) {
            truncated = true;
            break;
        }
        let indexed = index.as_ref().and_then(|entry| {
            entry.members.get(name).and_then(|values| {
                cardindex::check_card_filter(values, &entry.keys, &query.filter, query.all_of)
            })
        });
        let hit = match indexed {
            Some(decision) => decision,
            None => {
                let Ok(item) = collection.store.get(name) else {
                    continue;
                };
                parse_vcard(&item.bytes)
                    .is_some_and(|vcard| matches_vcard(&vcard, &query.filter, query.all_of))
            }
        };
        if hit {
            matched += 1;
            let provider = super::calendar::item_data_provider(&collection, name);
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

    if truncated {
        // The result set was cut at the client's nresults; the trailing
        // 507 response signals the truncation (RFC 6352 section 8.6.2).
        multistatus.add_response(
            dav_proto::schema::response::Response::new_status(
                headers.uri.to_string(),
                StatusCode::INSUFFICIENT_STORAGE,
            )
            .with_error(BaseCondition::NumberOfMatchesWithinLimits),
        );
    }
    Ok(HttpResponse::multistatus(multistatus))
}

fn query_index(
    server: &Server,
    collection: &CollectionRef,
    query: &dav_proto::schema::request::AddressbookQuery,
    members: &[(String, String)],
) -> Result<Option<std::sync::Arc<store::index::IndexEntry>>> {
    if members.len() < server.config.index_threshold {
        return Ok(None);
    }
    let keys = cardindex::card_filter_keys(&query.filter);
    if keys.is_empty() {
        return Ok(None);
    }
    let cache_key = format!("{}:vcf", collection.store.ctag()?);
    if let Some(entry) = server.index.get(&cache_key) {
        if keys.iter().all(|key| entry.keys.contains(key)) {
            return Ok(Some(entry));
        }
    }

    let mut entry = store::index::IndexEntry {
        keys,
        members: Default::default(),
    };
    for (name, _etag) in members {
        if !name.ends_with(".vcf") {
            continue;
        }
        let Ok(item) = collection.store.get(name) else {
            continue;
        };
        if let Some(vcard) = parse_vcard(&item.bytes) {
            entry.members.insert(
                name.clone(),
                cardindex::extract_card_values(&vcard, &entry.keys),
            );
        }
    }
    Ok(Some(server.index.insert(cache_key, entry)))
}

pub(crate) fn run_addressbook_multiget(
    server: &Server,
    headers: &RequestHeaders<'_>,
    report: &Report,
    principal: Option<&str>,
) -> Result<HttpResponse> {
    let Report::AddressbookMultiGet(request) = report else {
        return Err(DavError::Code(StatusCode::BAD_REQUEST));
    };
    super::calendar::run_multiget(server, headers, &request.hrefs, &request.properties, principal)
}

/// The `address-data` value for one member, `Some(None)` when the member
/// is not a readable card.
pub(crate) fn address_data_value(
    collection: &CollectionRef,
    name: &str,
    names: &[CardPropertyName],
) -> Option<Option<DavValue>> {
    if !name.ends_with(".vcf") {
        return Some(None);
    }
    let Ok(item) = collection.store.get(name) else {
        return Some(None);
    };
    let Some(vcard) = parse_vcard(&item.bytes) else {
        return Some(None);
    };
    Some(Some(DavValue::CData(serialize_address_data(&vcard, names))))
}

/// Whole card when no selection applies; otherwise the selected
/// properties, with VERSION and UID always retained so the result stays a
/// valid card.
fn serialize_address_data(vcard: &VCard, names: &[CardPropertyName]) -> String {
    if names.is_empty() {
        return vcard.to_string();
    }
    let mut filtered = vcard.clone();
    filtered.entries.retain(|entry| {
        matches!(entry.name, VCardProperty::Version | VCardProperty::Uid)
            || names.iter().any(|wanted| {
                wanted.name == entry.name
                    && (wanted.group.is_none() || wanted.group == entry.group)
            })
    });
    for entry in &mut filtered.entries {
        if names
            .iter()
            .any(|wanted| wanted.name == entry.name && wanted.no_value)
        {
            entry.values.clear();
        }
    }
    filtered.to_string()
}
