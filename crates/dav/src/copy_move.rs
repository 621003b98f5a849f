/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! COPY and MOVE for stored items. A move across collections is two
//! commits (destination add, then source delete) and is therefore not
//! atomic. Same-collection renames serialise under one write lock.

use dav_proto::RequestHeaders;
use hyper::StatusCode;
use store::Preconditions;

use crate::{
    DavError, HttpResponse, Result, Server,
    common::conditions::assert_preconditions,
    resource::Resolved,
    update::map_write_error,
};

pub(crate) trait CopyMoveRequestHandler: Sync + Send {
    fn handle_copy_move(
        &self,
        headers: &RequestHeaders<'_>,
        is_move: bool,
        principal: Option<&str>,
    ) -> impl Future<Output = Result<HttpResponse>> + Send;
}

impl CopyMoveRequestHandler for Server {
    async fn handle_copy_move(
        &self,
        headers: &RequestHeaders<'_>,
        is_move: bool,
        principal: Option<&str>,
    ) -> Result<HttpResponse> {
        let (_, resolved) = self.resolve_existing(headers.uri)?;
        let Resolved::Item {
            collection: source_collection,
            name: source_name,
            etag,
        } = resolved
        else {
            // Collection COPY/MOVE is not offered.
            return Err(DavError::Code(StatusCode::FORBIDDEN));
        };
        assert_preconditions(headers, Some(&etag))?;

        let destination = headers
            .destination
            .ok_or(DavError::Code(StatusCode::BAD_REQUEST))?;
        let (dest_path, dest_resolved) = self.resolve_uri(destination)?;

        let (dest_collection, dest_name, dest_exists) = match dest_resolved {
            Some(Resolved::Item {
                collection, name, ..
            }) => (collection, name, true),
            Some(_) => return Err(DavError::Code(StatusCode::METHOD_NOT_ALLOWED)),
            None => {
                let parent = dest_path
                    .parent()
                    .ok_or(DavError::Code(StatusCode::CONFLICT))?;
                match self.backend.resolve(&parent, &self.config.route_prefix)? {
                    Some(Resolved::Collection(collection)) => {
                        let name = dest_path
                            .last()
                            .ok_or(DavError::Code(StatusCode::CONFLICT))?
                            .to_string();
                        (collection, name, false)
                    }
                    _ => return Err(DavError::Code(StatusCode::CONFLICT)),
                }
            }
        };

        if dest_collection.dir == source_collection.dir && dest_name == source_name {
            return Err(DavError::Code(StatusCode::FORBIDDEN));
        }
        if dest_exists && headers.overwrite_fail {
            return Err(DavError::Code(StatusCode::PRECONDITION_FAILED));
        }

        let author = principal.unwrap_or("anonymous");
        let item = source_collection.store.get(&source_name)?;

        let preconditions = if dest_exists {
            Preconditions::none()
        } else {
            Preconditions::create_only()
        };
        // Same-collection MOVE: drop the source first so its UID does not
        // collide with itself at the destination name.
        let same_collection = dest_collection.dir == source_collection.dir;
        if is_move && same_collection {
            source_collection
                .store
                .delete(&source_name, &Preconditions::if_match(&item.etag), author)?;
        }

        match dest_collection
            .store
            .put(&dest_name, &item.bytes, &preconditions, author)
        {
            Ok(_) => {}
            Err(err) => {
                if is_move && same_collection {
                    // Put the source back; the delete above committed.
                    let _ = source_collection.store.put(
                        &source_name,
                        &item.bytes,
                        &Preconditions::create_only(),
                        author,
                    );
                }
                return Err(map_write_error(&dest_collection, err));
            }
        }

        if is_move && !same_collection {
            source_collection
                .store
                .delete(&source_name, &Preconditions::if_match(&item.etag), author)?;
        }

        Ok(HttpResponse::new(if dest_exists {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::CREATED
        }))
    }
}
