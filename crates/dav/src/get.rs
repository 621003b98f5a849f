/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! GET/HEAD for stored items, plus a plain-text landing page on the root
//! so a browser poke shows something sensible.

use dav_proto::RequestHeaders;
use hyper::StatusCode;

use crate::{
    DavError, HttpResponse, Result, Server,
    common::conditions::assert_preconditions,
    resource::Resolved,
};

pub(crate) trait GetRequestHandler: Sync + Send {
    fn handle_get(
        &self,
        headers: &RequestHeaders<'_>,
        is_head: bool,
    ) -> impl Future<Output = Result<HttpResponse>> + Send;
}

impl GetRequestHandler for Server {
    async fn handle_get(
        &self,
        headers: &RequestHeaders<'_>,
        is_head: bool,
    ) -> Result<HttpResponse> {
        let (_, resolved) = self.resolve_existing(headers.uri)?;
        match resolved {
            Resolved::Item {
                collection, name, ..
            } => {
                let item = collection.store.get(&name)?;

                if headers.if_none_match.matches(&item.etag) {
                    return Ok(HttpResponse::new(StatusCode::NOT_MODIFIED)
                        .with_etag(&item.etag));
                }
                assert_preconditions(headers, Some(&item.etag))?;

                let mut response = HttpResponse::new(StatusCode::OK).with_etag(&item.etag);
                if let Some(modified) = item.modified {
                    if let Some(formatted) = chrono::DateTime::from_timestamp(modified, 0) {
                        response = response.with_header(
                            "Last-Modified",
                            formatted.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
                        );
                    }
                }
                if is_head {
                    Ok(response
                        .with_header("Content-Type", item.content_type)
                        .with_header("Content-Length", item.bytes.len().to_string()))
                } else {
                    Ok(response.with_content(item.content_type, item.bytes))
                }
            }
            Resolved::Root => {
                let mut body = String::from("vestry calendar and contact server\n\n");
                for principal in self.backend.principals()? {
                    body.push_str(&self.principal_href(&principal));
                    body.push('\n');
                }
                Ok(HttpResponse::new(StatusCode::OK)
                    .with_content("text/plain; charset=utf-8", body.into_bytes()))
            }
            _ => Err(DavError::Code(StatusCode::METHOD_NOT_ALLOWED)),
        }
    }
}
