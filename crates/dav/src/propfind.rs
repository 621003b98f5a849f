/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! PROPFIND: walks the resource graph to the requested depth and renders
//! one multistatus response per resource, propstats grouped by status.
//! The propstat builder here is shared with the REPORT handlers, which
//! add their body-bearing properties through a provider hook.

use dav_proto::{
    Depth, RequestHeaders,
    schema::{
        Namespace,
        property::{DavProperty, DavPropertyValue, DavValue},
        request::PropFind,
        response::{MultiStatus, PropStat, Response},
    },
};
use hyper::StatusCode;

use crate::{
    HttpResponse, Result, Server,
    common::uri::member_href,
    properties::{PropContext, PropGet},
    resource::Resolved,
};

pub(crate) trait PropFindRequestHandler: Sync + Send {
    fn handle_propfind(
        &self,
        headers: &RequestHeaders<'_>,
        request: PropFind,
        principal: Option<&str>,
    ) -> impl Future<Output = Result<HttpResponse>> + Send;
}

impl PropFindRequestHandler for Server {
    async fn handle_propfind(
        &self,
        headers: &RequestHeaders<'_>,
        request: PropFind,
        principal: Option<&str>,
    ) -> Result<HttpResponse> {
        let (_, resolved) = self.resolve_existing(headers.uri)?;

        let mut multistatus = full_namespace_multistatus();
        // RFC 4918 section 9.1: a missing Depth header means infinity.
        let depth = match headers.depth {
            Depth::None => Depth::Infinity,
            depth => depth,
        };

        self.walk(
            &resolved,
            depth,
            &mut |server, resource| {
                let response = server.prop_response(
                    resource,
                    &request,
                    principal,
                    headers.prefer_minimal,
                    None,
                );
                multistatus.add_response(response);
                Ok(())
            },
        )?;

        Ok(HttpResponse::multistatus(multistatus))
    }
}

pub(crate) fn full_namespace_multistatus() -> MultiStatus {
    MultiStatus::new()
        .with_namespace(Namespace::CalDav)
        .with_namespace(Namespace::CardDav)
        .with_namespace(Namespace::CalendarServer)
        .with_namespace(Namespace::AppleIcal)
}

/// A hook letting REPORT handlers answer properties the registry does not
/// serve, calendar-data and address-data above all.
pub(crate) type DataProvider<'x> = dyn Fn(&DavProperty) -> Option<Option<DavValue>> + 'x;

impl Server {
    /// Visits `resolved` and, depth permitting, its descendants in
    /// traversal order.
    pub(crate) fn walk(
        &self,
        resolved: &Resolved,
        depth: Depth,
        visit: &mut impl FnMut(&Server, &Resolved) -> Result<()>,
    ) -> Result<()> {
        visit(self, resolved)?;
        if matches!(depth, Depth::Zero) {
            return Ok(());
        }
        let child_depth = match depth {
            Depth::One => Depth::Zero,
            depth => depth,
        };
        for child in self.children(resolved)? {
            self.walk(&child, child_depth, visit)?;
        }
        Ok(())
    }

    pub(crate) fn children(&self, resolved: &Resolved) -> Result<Vec<Resolved>> {
        match resolved {
            Resolved::Root => {
                let mut children = Vec::new();
                for name in self.backend.principals()? {
                    children.push(Resolved::Principal {
                        href: self.principal_href(&name),
                        name,
                    });
                }
                Ok(children)
            }
            Resolved::Principal { name, .. } => {
                self.dir_children(&self.backend.root().join(name), &[name.as_str()])
            }
            Resolved::CollectionSet { path, dir, .. } => {
                let segments: Vec<&str> =
                    path.segments.iter().map(String::as_str).collect();
                self.dir_children(dir, &segments)
            }
            Resolved::Collection(collection) => {
                let mut children = Vec::new();
                for (name, etag) in collection.store.list()? {
                    children.push(Resolved::Item {
                        collection: collection.clone(),
                        name,
                        etag,
                    });
                }
                Ok(children)
            }
            Resolved::Item { .. } => Ok(Vec::new()),
        }
    }

    fn dir_children(&self, dir: &std::path::Path, segments: &[&str]) -> Result<Vec<Resolved>> {
        let mut children = Vec::new();
        for (name, child_dir, is_store) in self.backend.list_dirs(dir)? {
            let path = crate::common::uri::DavPath {
                segments: segments
                    .iter()
                    .map(|s| s.to_string())
                    .chain(std::iter::once(name.clone()))
                    .collect(),
                collection_form: true,
            };
            let href = path.href(&self.config.route_prefix, true);
            if is_store {
                let store = self.backend.open_collection(&child_dir)?;
                let config = store.config()?;
                children.push(Resolved::Collection(crate::resource::CollectionRef {
                    path,
                    href,
                    dir: child_dir,
                    store,
                    config,
                }));
            } else {
                children.push(Resolved::CollectionSet {
                    path,
                    href,
                    dir: child_dir,
                });
            }
        }
        Ok(children)
    }

    /// Builds the response element for one resource.
    pub(crate) fn prop_response(
        &self,
        resolved: &Resolved,
        request: &PropFind,
        principal: Option<&str>,
        prefer_minimal: bool,
        provider: Option<&DataProvider<'_>>,
    ) -> Response {
        let href = resolved.href();
        let ctx = PropContext {
            server: self,
            resource: resolved,
            href: &href,
            principal,
        };

        match request {
            PropFind::PropName => {
                let mut found = Vec::new();
                for live in self.properties.entries() {
                    if matches!((live.get)(&ctx), PropGet::Value(_)) {
                        found.push(DavPropertyValue::empty(live.name.clone()));
                    }
                }
                Response::new_propstat(href.clone(), vec![PropStat::ok(found)])
            }
            PropFind::AllProp(include) => {
                let mut found = Vec::new();
                for live in self.properties.all_prop() {
                    if let PropGet::Value(value) = (live.get)(&ctx) {
                        found.push(DavPropertyValue::new(live.name.clone(), value));
                    }
                }
                let mut not_found = Vec::new();
                for name in include {
                    self.eval_prop(&ctx, name, provider, &mut found, &mut not_found);
                }
                finish_propstats(href, found, not_found, prefer_minimal)
            }
            PropFind::Prop(names) => {
                let mut found = Vec::new();
                let mut not_found = Vec::new();
                for name in names {
                    self.eval_prop(&ctx, name, provider, &mut found, &mut not_found);
                }
                finish_propstats(href, found, not_found, prefer_minimal)
            }
        }
    }

    fn eval_prop(
        &self,
        ctx: &PropContext<'_>,
        name: &DavProperty,
        provider: Option<&DataProvider<'_>>,
        found: &mut Vec<DavPropertyValue>,
        not_found: &mut Vec<DavProperty>,
    ) {
        if let Some(answer) = provider.and_then(|provider| provider(name)) {
            match answer {
                Some(value) => found.push(DavPropertyValue::new(name.clone(), value)),
                None => not_found.push(name.clone()),
            }
            return;
        }
        match self.properties.lookup(name) {
            Some(live) => match (live.get)(ctx) {
                PropGet::Value(value) => {
                    found.push(DavPropertyValue::new(name.clone(), value))
                }
                PropGet::NotFound => not_found.push(name.clone()),
            },
            None => not_found.push(name.clone()),
        }
    }
}

fn finish_propstats(
    href: String,
    found: Vec<DavPropertyValue>,
    not_found: Vec<DavProperty>,
    prefer_minimal: bool,
) -> Response {
    let mut propstats = Vec::new();
    if !found.is_empty() || not_found.is_empty() || prefer_minimal {
        propstats.push(PropStat::ok(found));
    }
    if !not_found.is_empty() && !prefer_minimal {
        propstats.push(PropStat::with_status(
            not_found
                .into_iter()
                .map(DavPropertyValue::empty)
                .collect(),
            StatusCode::NOT_FOUND,
        ));
    }
    Response::new_propstat(href, propstats)
}

/// Shared by multiget-style reports: the response for one member by name,
/// with a 404 status response when it is gone.
pub(crate) fn member_or_missing(
    server: &Server,
    collection: &crate::resource::CollectionRef,
    name: &str,
    request: &PropFind,
    principal: Option<&str>,
    provider: Option<&DataProvider<'_>>,
) -> Response {
    match collection.store.etag(name) {
        Ok(Some(etag)) => {
            let resolved = Resolved::Item {
                collection: collection.clone(),
                name: name.to_string(),
                etag,
            };
            server.prop_response(&resolved, request, principal, false, provider)
        }
        _ => Response::new_status(member_href(&collection.href, name), StatusCode::NOT_FOUND),
    }
}
