/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! The report registry and the reports that are not media-specific:
//! sync-collection (RFC 6578), expand-property (RFC 3253 section 3.8) and
//! the principal-match stub.

pub mod calendar;
pub mod card;

use dav_proto::{
    RequestHeaders,
    schema::{
        property::{DavProperty, DavValue},
        request::{ExpandPropertyItem, PropFind, Report, SyncCollection},
        response::{BaseCondition, Response},
    },
};
use hyper::StatusCode;
use store::ObjectId;

use crate::{
    DavError, DavErrorCondition, HttpResponse, Result, Server,
    common::uri::member_href,
    propfind::{full_namespace_multistatus, member_or_missing},
    resource::Resolved,
    server::SYNC_TOKEN_PREFIX,
};

pub(crate) trait ReportRequestHandler: Sync + Send {
    fn handle_report(
        &self,
        headers: &RequestHeaders<'_>,
        report: Report,
        principal: Option<&str>,
    ) -> impl Future<Output = Result<HttpResponse>> + Send;
}

impl ReportRequestHandler for Server {
    async fn handle_report(
        &self,
        headers: &RequestHeaders<'_>,
        report: Report,
        principal: Option<&str>,
    ) -> Result<HttpResponse> {
        let handler = self
            .reports
            .lookup(report.name())
            .ok_or(DavError::Code(StatusCode::FORBIDDEN))?;
        (handler.run)(self, headers, &report, principal)
    }
}

pub type ReportFn =
    fn(&Server, &RequestHeaders<'_>, &Report, Option<&str>) -> Result<HttpResponse>;

/// One named REPORT implementation.
pub struct ReportHandler {
    pub name: &'static str,
    pub run: ReportFn,
}

/// Table of the reports this server executes, keyed by the root element
/// of the request body.
pub struct ReportRegistry {
    handlers: Vec<ReportHandler>,
}

impl ReportRegistry {
    pub fn lookup(&self, name: &str) -> Option<&ReportHandler> {
        self.handlers.iter().find(|handler| handler.name == name)
    }

    pub fn core() -> Self {
        ReportRegistry {
            handlers: vec![
                ReportHandler {
                    name: "calendar-query",
                    run: calendar::run_calendar_query,
                },
                ReportHandler {
                    name: "calendar-multiget",
                    run: calendar::run_calendar_multiget,
                },
                ReportHandler {
                    name: "free-busy-query",
                    run: calendar::run_freebusy_query,
                },
                ReportHandler {
                    name: "addressbook-query",
                    run: card::run_addressbook_query,
                },
                ReportHandler {
                    name: "addressbook-multiget",
                    run: card::run_addressbook_multiget,
                },
                ReportHandler {
                    name: "sync-collection",
                    run: run_sync_collection,
                },
                ReportHandler {
                    name: "expand-property",
                    run: run_expand_property,
                },
                ReportHandler {
                    name: "principal-match",
                    run: run_principal_match,
                },
            ],
        }
    }
}

fn run_sync_collection(
    server: &Server,
    headers: &RequestHeaders<'_>,
    report: &Report,
    principal: Option<&str>,
) -> Result<HttpResponse> {
    let Report::SyncCollection(request) = report else {
        return Err(DavError::Code(StatusCode::BAD_REQUEST));
    };
    let (_, resolved) = server.resolve_existing(headers.uri)?;
    let Resolved::Collection(collection) = resolved else {
        return Err(DavError::Code(StatusCode::METHOD_NOT_ALLOWED));
    };

    let old_commit = parse_sync_token(request)?;
    let head = collection.store.sync_commit()?;

    let mut multistatus = full_namespace_multistatus();
    let new_token = server.sync_token(&collection);

    let changes = match &head {
        Some(head) => collection
            .store
            .changes_between(old_commit.as_ref(), head)?,
        None => {
            // Nothing was ever written; an unknown client token is still
            // stale.
            if old_commit.is_some() {
                return Err(stale_token());
            }
            Vec::new()
        }
    };

    let emit = match request.limit {
        Some(limit) if changes.len() > limit as usize => &changes[..limit as usize],
        _ => &changes[..],
    };
    let truncated = emit.len() < changes.len();

    for change in emit {
        if change.is_deletion() {
            // Tombstones carry only a 404 status (RFC 6578 section 3.3).
            multistatus.add_response(Response::new_status(
                member_href(&collection.href, &change.name),
                StatusCode::NOT_FOUND,
            ));
        } else {
            let provider = calendar::item_data_provider(&collection, &change.name);
            multistatus.add_response(member_or_missing(
                server,
                &collection,
                &change.name,
                &request.properties,
                principal,
                provider.as_deref(),
            ));
        }
    }

    // A truncated delta must not hand out the new token, or the client
    // would believe it is caught up.
    if !truncated {
        multistatus.set_sync_token(new_token);
    }
    Ok(HttpResponse::multistatus(multistatus))
}

fn parse_sync_token(request: &SyncCollection) -> Result<Option<ObjectId>> {
    match request.sync_token.as_deref() {
        None => Ok(None),
        Some(token) => {
            let payload = token.strip_prefix(SYNC_TOKEN_PREFIX).ok_or_else(stale_token)?;
            if payload == "0" {
                return Ok(None);
            }
            ObjectId::from_hex(payload)
                .map(Some)
                .ok_or_else(stale_token)
        }
    }
}

fn stale_token() -> DavError {
    DavErrorCondition::new(StatusCode::FORBIDDEN, BaseCondition::ValidSyncToken).into()
}

fn run_expand_property(
    server: &Server,
    headers: &RequestHeaders<'_>,
    report: &Report,
    principal: Option<&str>,
) -> Result<HttpResponse> {
    let Report::ExpandProperty(request) = report else {
        return Err(DavError::Code(StatusCode::BAD_REQUEST));
    };
    let (_, resolved) = server.resolve_existing(headers.uri)?;

    let mut multistatus = full_namespace_multistatus();
    multistatus.add_response(expand_response(
        server,
        &resolved,
        &request.properties,
        principal,
        0,
    )?);
    Ok(HttpResponse::multistatus(multistatus))
}

/// Builds the response for one resource, recursively expanding href-valued
/// properties into nested responses.
fn expand_response(
    server: &Server,
    resolved: &Resolved,
    items: &[ExpandPropertyItem],
    principal: Option<&str>,
    depth: usize,
) -> Result<Response> {
    if depth > 8 {
        return Err(DavError::Code(StatusCode::BAD_REQUEST));
    }
    let names: Vec<DavProperty> = items.iter().map(|item| item.property.clone()).collect();
    let mut response =
        server.prop_response(resolved, &PropFind::Prop(names), principal, false, None);

    if let dav_proto::schema::response::ResponseBody::PropStat(propstats) = &mut response.body {
        for propstat in propstats {
            for prop in &mut propstat.prop {
                let Some(item) = items
                    .iter()
                    .find(|item| item.property.same_name(&prop.property))
                else {
                    continue;
                };
                if item.children.is_empty() {
                    continue;
                }
                if let DavValue::Href(hrefs) = &prop.value {
                    let mut nested = Vec::new();
                    for href in hrefs {
                        if let (_, Some(target)) = server.resolve_uri(&href.0)? {
                            nested.push(expand_response(
                                server,
                                &target,
                                &item.children,
                                principal,
                                depth + 1,
                            )?);
                        }
                    }
                    prop.value = DavValue::Responses(nested);
                }
            }
        }
    }
    Ok(response)
}

/// Principal matching is only offered in its self form: the authenticated
/// principal reports itself.
fn run_principal_match(
    server: &Server,
    _headers: &RequestHeaders<'_>,
    report: &Report,
    principal: Option<&str>,
) -> Result<HttpResponse> {
    let Report::PrincipalMatch(request) = report else {
        return Err(DavError::Code(StatusCode::BAD_REQUEST));
    };
    let mut multistatus = full_namespace_multistatus();
    if let Some(name) = principal {
        let resolved = Resolved::Principal {
            name: name.to_string(),
            href: server.principal_href(name),
        };
        let properties = if request.properties.is_empty() {
            PropFind::AllProp(Vec::new())
        } else {
            PropFind::Prop(request.properties.clone())
        };
        multistatus.add_response(server.prop_response(
            &resolved,
            &properties,
            principal,
            false,
            None,
        ));
    }
    Ok(HttpResponse::multistatus(multistatus))
}
