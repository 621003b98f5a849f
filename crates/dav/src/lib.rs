/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! The protocol state machine: URI resolution over the collection stores,
//! the live-property and report registries, per-verb request handlers and
//! multistatus assembly.

pub mod common;
pub mod copy_move;
pub mod delete;
pub mod get;
pub mod http;
pub mod mkcol;
pub mod properties;
pub mod propfind;
pub mod proppatch;
pub mod report;
pub mod resource;
pub mod server;
pub mod update;

pub use http::HttpResponse;
pub use server::{Autocreate, Server, ServerConfig};

use dav_proto::schema::response::{Condition, ErrorResponse};
use hyper::StatusCode;
use store::StoreError;

pub type Result<T> = std::result::Result<T, DavError>;

#[derive(Debug)]
pub enum DavError {
    Parse(dav_proto::parser::Error),
    Store(StoreError),
    Condition(DavErrorCondition),
    Code(StatusCode),
}

#[derive(Debug)]
pub struct DavErrorCondition {
    pub code: StatusCode,
    pub condition: Condition,
}

impl DavErrorCondition {
    pub fn new(code: StatusCode, condition: impl Into<Condition>) -> Self {
        DavErrorCondition {
            code,
            condition: condition.into(),
        }
    }
}

impl From<DavErrorCondition> for DavError {
    fn from(value: DavErrorCondition) -> Self {
        DavError::Condition(value)
    }
}

impl From<dav_proto::parser::Error> for DavError {
    fn from(err: dav_proto::parser::Error) -> Self {
        DavError::Parse(err)
    }
}

impl From<StoreError> for DavError {
    fn from(err: StoreError) -> Self {
        DavError::Store(err)
    }
}

impl DavError {
    pub fn into_response(self) -> HttpResponse {
        match self {
            DavError::Parse(err) => {
                tracing::debug!(%err, "request body failed to parse");
                HttpResponse::new(StatusCode::BAD_REQUEST)
            }
            DavError::Code(code) => HttpResponse::new(code),
            DavError::Condition(condition) => HttpResponse::new(condition.code)
                .with_xml_body(ErrorResponse::new(condition.condition).to_string()),
            DavError::Store(err) => store_error_response(err),
        }
    }
}

fn store_error_response(err: StoreError) -> HttpResponse {
    use dav_proto::schema::response::BaseCondition;
    match err {
        StoreError::NotFound(_) | StoreError::NotStore(_) => {
            HttpResponse::new(StatusCode::NOT_FOUND)
        }
        StoreError::PreconditionFailed { .. } => {
            HttpResponse::new(StatusCode::PRECONDITION_FAILED)
        }
        StoreError::DuplicateUid { .. } => HttpResponse::new(StatusCode::CONFLICT),
        StoreError::Invalid(reason) => {
            tracing::debug!(%reason, "invalid resource body");
            HttpResponse::new(StatusCode::BAD_REQUEST)
        }
        StoreError::UnsupportedMedia(_) => HttpResponse::new(StatusCode::UNSUPPORTED_MEDIA_TYPE),
        StoreError::Forbidden => HttpResponse::new(StatusCode::FORBIDDEN),
        StoreError::TokenStale => HttpResponse::new(StatusCode::FORBIDDEN)
            .with_xml_body(ErrorResponse::new(BaseCondition::ValidSyncToken).to_string()),
        StoreError::AlreadyExists(_) => HttpResponse::new(StatusCode::METHOD_NOT_ALLOWED),
        StoreError::Corrupt(detail) => {
            // Correlate in the log, never in the response body.
            let correlation = uuid::Uuid::new_v4();
            tracing::error!(%correlation, %detail, "object database corruption");
            HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR)
        }
        StoreError::Io(err) => {
            let correlation = uuid::Uuid::new_v4();
            tracing::error!(%correlation, %err, "storage failure");
            HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum DavMethod {
    GET,
    HEAD,
    PUT,
    POST,
    DELETE,
    OPTIONS,
    PROPFIND,
    PROPPATCH,
    REPORT,
    MKCOL,
    MKCALENDAR,
    COPY,
    MOVE,
    LOCK,
    UNLOCK,
}

impl DavMethod {
    pub fn parse(method: &str) -> Option<Self> {
        hashify::tiny_map!(method.as_bytes(),
            "GET" => DavMethod::GET,
            "HEAD" => DavMethod::HEAD,
            "PUT" => DavMethod::PUT,
            "POST" => DavMethod::POST,
            "DELETE" => DavMethod::DELETE,
            "OPTIONS" => DavMethod::OPTIONS,
            "PROPFIND" => DavMethod::PROPFIND,
            "PROPPATCH" => DavMethod::PROPPATCH,
            "REPORT" => DavMethod::REPORT,
            "MKCOL" => DavMethod::MKCOL,
            "MKCALENDAR" => DavMethod::MKCALENDAR,
            "COPY" => DavMethod::COPY,
            "MOVE" => DavMethod::MOVE,
            "LOCK" => DavMethod::LOCK,
            "UNLOCK" => DavMethod::UNLOCK
        )
    }

    pub fn has_body(&self) -> bool {
        matches!(
            self,
            DavMethod::PUT
                | DavMethod::POST
                | DavMethod::PROPFIND
                | DavMethod::PROPPATCH
                | DavMethod::REPORT
                | DavMethod::MKCOL
                | DavMethod::MKCALENDAR
        )
    }
}
