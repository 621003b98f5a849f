/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! PUT and POST-to-create (RFC 5995 add-member). Bodies are validated for
//! the collection's media type; UID conflicts surface as the no-uid-conflict
//! precondition with the href of the existing member.

use dav_proto::{
    RequestHeaders,
    schema::response::{CalCondition, CardCondition, Href},
};
use hyper::StatusCode;
use store::{CollectionType, StoreError, media::MediaKind};

use crate::{
    DavError, DavErrorCondition, HttpResponse, Result, Server,
    common::{conditions::write_preconditions, uri::member_href},
    resource::{CollectionRef, Resolved},
};

pub(crate) trait UpdateRequestHandler: Sync + Send {
    fn handle_put(
        &self,
        headers: &RequestHeaders<'_>,
        body: Vec<u8>,
        principal: Option<&str>,
    ) -> impl Future<Output = Result<HttpResponse>> + Send;

    fn handle_post(
        &self,
        headers: &RequestHeaders<'_>,
        body: Vec<u8>,
        principal: Option<&str>,
    ) -> impl Future<Output = Result<HttpResponse>> + Send;
}

impl UpdateRequestHandler for Server {
    async fn handle_put(
        &self,
        headers: &RequestHeaders<'_>,
        body: Vec<u8>,
        principal: Option<&str>,
    ) -> Result<HttpResponse> {
        let (path, resolved) = self.resolve_uri(headers.uri)?;
        let (collection, name, current_etag) = match resolved {
            Some(Resolved::Item {
                collection,
                name,
                etag,
            }) => (collection, name, Some(etag)),
            Some(_) => return Err(DavError::Code(StatusCode::METHOD_NOT_ALLOWED)),
            None => {
                let parent_path = path
                    .parent()
                    .ok_or(DavError::Code(StatusCode::CONFLICT))?;
                match self
                    .backend
                    .resolve(&parent_path, &self.config.route_prefix)?
                {
                    Some(Resolved::Collection(collection)) => {
                        let name = path
                            .last()
                            .ok_or(DavError::Code(StatusCode::CONFLICT))?
                            .to_string();
                        (collection, name, None)
                    }
                    // RFC 4918 section 9.7.1: all ancestors must exist.
                    _ => return Err(DavError::Code(StatusCode::CONFLICT)),
                }
            }
        };

        check_media_type(&collection, &name, headers, self.config.strict)?;
        let preconditions = write_preconditions(headers, current_etag.as_deref())?;
        let author = principal.unwrap_or("anonymous");

        match collection.store.put(&name, &body, &preconditions, author) {
            Ok((etag, _ctag)) => Ok(HttpResponse::new(if current_etag.is_some() {
                StatusCode::NO_CONTENT
            } else {
                StatusCode::CREATED
            })
            .with_etag(etag)),
            Err(err) => Err(map_write_error(&collection, err)),
        }
    }

    /// POST with an add-member body: store under a fresh server-chosen
    /// name and point the client at it.
    async fn handle_post(
        &self,
        headers: &RequestHeaders<'_>,
        body: Vec<u8>,
        principal: Option<&str>,
    ) -> Result<HttpResponse> {
        let (_, resolved) = self.resolve_existing(headers.uri)?;
        let Resolved::Collection(collection) = resolved else {
            return Err(DavError::Code(StatusCode::METHOD_NOT_ALLOWED));
        };

        let extension = match collection.collection_type() {
            CollectionType::Calendar => ".ics",
            CollectionType::Addressbook => ".vcf",
            _ => return Err(DavError::Code(StatusCode::METHOD_NOT_ALLOWED)),
        };
        let name = self.allocate_member_name(&collection, &body, extension)?;
        check_media_type(&collection, &name, headers, self.config.strict)?;

        let author = principal.unwrap_or("anonymous");
        let preconditions = store::Preconditions::create_only();
        match collection.store.put(&name, &body, &preconditions, author) {
            Ok((etag, _)) => Ok(HttpResponse::new(StatusCode::CREATED)
                .with_etag(etag)
                .with_location(member_href(&collection.href, &name))),
            Err(err) => Err(map_write_error(&collection, err)),
        }
    }
}

impl Server {
    /// Prefers `<uid>.<ext>` when the body names a usable UID that is still
    /// free; falls back to a random name.
    fn allocate_member_name(
        &self,
        collection: &CollectionRef,
        body: &[u8],
        extension: &str,
    ) -> Result<String> {
        if let Ok(Some(uid)) = store::media::validate(&format!("probe{extension}"), body) {
            if uid.len() <= 64
                && !uid.starts_with('.')
                && uid
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '@' | '.'))
            {
                let candidate = format!("{uid}{extension}");
                if collection.store.etag(&candidate)?.is_none() {
                    return Ok(candidate);
                }
            }
        }
        Ok(format!("{}{extension}", uuid::Uuid::new_v4()))
    }
}

/// A body that does not fit the collection's media type is an
/// unsupported-media-type error before the store ever sees it.
fn check_media_type(
    collection: &CollectionRef,
    name: &str,
    headers: &RequestHeaders<'_>,
    strict: bool,
) -> Result<()> {
    let media = MediaKind::from_name(name);
    let matches_collection = match collection.collection_type() {
        CollectionType::Calendar | CollectionType::ScheduleInbox | CollectionType::ScheduleOutbox => {
            media == MediaKind::Calendar
        }
        CollectionType::Addressbook => media == MediaKind::Contact,
        CollectionType::Subscription | CollectionType::Other => true,
    };
    if !matches_collection {
        return Err(DavError::Code(StatusCode::UNSUPPORTED_MEDIA_TYPE));
    }

    if strict {
        let expected = match media {
            MediaKind::Calendar => Some("text/calendar"),
            MediaKind::Contact => Some("text/vcard"),
            MediaKind::Other => None,
        };
        if let Some(expected) = expected {
            let matches_header = headers
                .content_type
                .is_some_and(|value| value.starts_with(expected));
            if !matches_header {
                return Err(DavError::Code(StatusCode::UNSUPPORTED_MEDIA_TYPE));
            }
        }
    }
    Ok(())
}

/// Store write failures carry protocol-level preconditions where the RFCs
/// define one.
pub(crate) fn map_write_error(collection: &CollectionRef, err: StoreError) -> DavError {
    match err {
        StoreError::DuplicateUid { existing, .. } => {
            let href = Href(member_href(&collection.href, &existing));
            if collection.is_addressbook() {
                DavErrorCondition::new(StatusCode::CONFLICT, CardCondition::NoUidConflict(href))
                    .into()
            } else {
                DavErrorCondition::new(StatusCode::CONFLICT, CalCondition::NoUidConflict(href))
                    .into()
            }
        }
        StoreError::Invalid(_) if collection.is_addressbook() => {
            DavErrorCondition::new(StatusCode::BAD_REQUEST, CardCondition::ValidAddressData).into()
        }
        StoreError::Invalid(_) => {
            DavErrorCondition::new(StatusCode::BAD_REQUEST, CalCondition::ValidCalendarObjectResource)
                .into()
        }
        StoreError::UnsupportedMedia(_) if collection.is_addressbook() => {
            DavErrorCondition::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                CardCondition::SupportedAddressData,
            )
            .into()
        }
        StoreError::UnsupportedMedia(_) => DavErrorCondition::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            CalCondition::SupportedCalendarData,
        )
        .into(),
        err => err.into(),
    }
}
