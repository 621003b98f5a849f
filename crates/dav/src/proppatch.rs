/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! PROPPATCH: applies set/remove instructions as a unit (RFC 4918
//! section 9.2). When any instruction fails, none are applied and the
//! would-have-succeeded ones report 424 Failed Dependency.

use dav_proto::{
    RequestHeaders,
    schema::{
        property::{DavProperty, DavPropertyValue, DavValue},
        request::PropertyUpdate,
        response::{BaseCondition, PropStat, Response},
    },
};
use hyper::StatusCode;

use crate::{
    HttpResponse, Result, Server,
    common::conditions::assert_preconditions,
    properties::{PropContext, SetError},
    propfind::full_namespace_multistatus,
    resource::Resolved,
};

pub(crate) trait PropPatchRequestHandler: Sync + Send {
    fn handle_proppatch(
        &self,
        headers: &RequestHeaders<'_>,
        request: PropertyUpdate,
        principal: Option<&str>,
    ) -> impl Future<Output = Result<HttpResponse>> + Send;
}

enum Instruction {
    Set(DavPropertyValue),
    Remove(DavProperty),
}

impl PropPatchRequestHandler for Server {
    async fn handle_proppatch(
        &self,
        headers: &RequestHeaders<'_>,
        request: PropertyUpdate,
        principal: Option<&str>,
    ) -> Result<HttpResponse> {
        let (_, resolved) = self.resolve_existing(headers.uri)?;
        if let Resolved::Item { etag, .. } = &resolved {
            assert_preconditions(headers, Some(etag))?;
        } else {
            assert_preconditions(headers, None)?;
        }

        let href = resolved.href();
        let ctx = PropContext {
            server: self,
            resource: &resolved,
            href: &href,
            principal,
        };

        let instructions: Vec<Instruction> = request
            .set
            .into_iter()
            .map(Instruction::Set)
            .chain(request.remove.into_iter().map(Instruction::Remove))
            .collect();

        // First pass: decide per-property outcomes without writing.
        let mut failures = Vec::new();
        for instruction in &instructions {
            let name = match instruction {
                Instruction::Set(value) => &value.property,
                Instruction::Remove(name) => name,
            };
            let status = match self.properties.lookup(name) {
                // Live set refused: protected, or no write contract at all.
                Some(live) if live.protected || live.set.is_none() => {
                    Some(StatusCode::FORBIDDEN)
                }
                Some(_) => None,
                // Dead property storage is not offered (RFC 4918
                // section 9.2.1 failure semantics).
                None => Some(StatusCode::FORBIDDEN),
            };
            if let Some(status) = status {
                failures.push((name.clone(), status));
            }
        }

        let mut propstats = Vec::new();
        if failures.is_empty() {
            let mut applied = Vec::new();
            for instruction in &instructions {
                let (name, value) = match instruction {
                    Instruction::Set(value) => (&value.property, &value.value),
                    Instruction::Remove(name) => (name, &DavValue::Null),
                };
                let live = self
                    .properties
                    .lookup(name)
                    .expect("validated in first pass");
                let set = live.set.expect("validated in first pass");
                match set(&ctx, value) {
                    Ok(()) => applied.push(DavPropertyValue::empty(name.clone())),
                    Err(SetError::Protected) => {
                        failures.push((name.clone(), StatusCode::FORBIDDEN))
                    }
                    Err(SetError::Forbidden) => {
                        failures.push((name.clone(), StatusCode::FORBIDDEN))
                    }
                }
            }
            if failures.is_empty() {
                propstats.push(PropStat::ok(applied));
            }
        }

        if !failures.is_empty() {
            // Atomicity: everything not itself failing reports 424.
            let mut forbidden = Vec::new();
            for (name, _) in &failures {
                forbidden.push(DavPropertyValue::empty(name.clone()));
            }
            let mut dependent = Vec::new();
            for instruction in &instructions {
                let name = match instruction {
                    Instruction::Set(value) => &value.property,
                    Instruction::Remove(name) => name,
                };
                if !failures.iter().any(|(failed, _)| failed.same_name(name)) {
                    dependent.push(DavPropertyValue::empty(name.clone()));
                }
            }
            propstats.push(
                PropStat::with_status(forbidden, StatusCode::FORBIDDEN)
                    .with_error(BaseCondition::CannotModifyProtectedProperty),
            );
            if !dependent.is_empty() {
                propstats.push(PropStat::with_status(
                    dependent,
                    StatusCode::FAILED_DEPENDENCY,
                ));
            }
        }

        let mut multistatus = full_namespace_multistatus();
        multistatus.add_response(Response::new_propstat(href.clone(), propstats));
        Ok(HttpResponse::multistatus(multistatus))
    }
}
