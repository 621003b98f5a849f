/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! DELETE: members are removed with one commit; deleting a collection
//! removes it and everything it transitively holds.

use dav_proto::RequestHeaders;
use hyper::StatusCode;

use crate::{
    DavError, HttpResponse, Result, Server,
    common::conditions::{assert_preconditions, write_preconditions},
    resource::Resolved,
};

pub(crate) trait DeleteRequestHandler: Sync + Send {
    fn handle_delete(
        &self,
        headers: &RequestHeaders<'_>,
        principal: Option<&str>,
    ) -> impl Future<Output = Result<HttpResponse>> + Send;
}

impl DeleteRequestHandler for Server {
    async fn handle_delete(
        &self,
        headers: &RequestHeaders<'_>,
        principal: Option<&str>,
    ) -> Result<HttpResponse> {
        let (_, resolved) = self.resolve_existing(headers.uri)?;
        match resolved {
            Resolved::Item {
                collection,
                name,
                etag,
            } => {
                let preconditions = write_preconditions(headers, Some(&etag))?;
                collection.store.delete(
                    &name,
                    &preconditions,
                    principal.unwrap_or("anonymous"),
                )?;
                Ok(HttpResponse::new(StatusCode::NO_CONTENT))
            }
            Resolved::Collection(collection) => {
                assert_preconditions(headers, None)?;
                self.backend.remove_tree(&collection.dir)?;
                Ok(HttpResponse::new(StatusCode::NO_CONTENT))
            }
            Resolved::CollectionSet { dir, .. } => {
                assert_preconditions(headers, None)?;
                self.backend.remove_tree(&dir)?;
                Ok(HttpResponse::new(StatusCode::NO_CONTENT))
            }
            // Principals go away by administrative action only.
            Resolved::Principal { .. } | Resolved::Root => {
                Err(DavError::Code(StatusCode::FORBIDDEN))
            }
        }
    }
}
