/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Verb dispatch. The outer layer hands in a parsed method, the WebDAV
//! request headers, the body and the pre-authenticated principal; what
//! comes back is a complete response.

use std::path::PathBuf;
use std::time::Instant;

use dav_proto::{
    RequestHeaders,
    parser::{DavParser, tokenizer::Tokenizer},
    schema::request::{MkCol, PropFind, PropertyUpdate, Report},
};
use hyper::StatusCode;
use store::index::IndexCache;

use crate::{
    DavError, DavMethod, HttpResponse, Result,
    common::uri::DavPath,
    copy_move::CopyMoveRequestHandler,
    delete::DeleteRequestHandler,
    get::GetRequestHandler,
    mkcol::MkColRequestHandler,
    properties::PropertyRegistry,
    propfind::PropFindRequestHandler,
    proppatch::PropPatchRequestHandler,
    report::{ReportRegistry, ReportRequestHandler},
    resource::{Backend, CollectionRef, Resolved},
    update::UpdateRequestHandler,
};

pub const DAV_CAPABILITIES: &str =
    "1, 3, access-control, calendar-access, addressbook, extended-mkcol, calendar-schedule";

pub const SYNC_TOKEN_PREFIX: &str = "vsync-1:";

pub const PROD_ID: &str = "-//vestry//calendar server//EN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Autocreate {
    #[default]
    None,
    Principal,
    Defaults,
}

impl Autocreate {
    pub fn parse(value: &str) -> Option<Autocreate> {
        match value {
            "none" => Some(Autocreate::None),
            "principal" => Some(Autocreate::Principal),
            "defaults" => Some(Autocreate::Defaults),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_root: PathBuf,
    pub route_prefix: String,
    /// Principal assumed for requests without a forwarded identity, e.g.
    /// `/alice/`.
    pub current_user_principal: Option<String>,
    pub autocreate: Autocreate,
    /// When off, minor client deviations (missing content types, the
    /// unicode collation alias) are tolerated.
    pub strict: bool,
    /// Collections at or above this member count consult the index
    /// before parsing bodies.
    pub index_threshold: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            data_root: PathBuf::from("."),
            route_prefix: String::new(),
            current_user_principal: None,
            autocreate: Autocreate::None,
            strict: false,
            index_threshold: 8,
        }
    }
}

pub struct Server {
    pub config: ServerConfig,
    pub backend: Backend,
    pub properties: PropertyRegistry,
    pub reports: ReportRegistry,
    pub index: IndexCache,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let backend = Backend::new(config.data_root.clone());
        Server {
            backend,
            properties: PropertyRegistry::core(),
            reports: ReportRegistry::core(),
            index: IndexCache::new(64),
            config,
        }
    }

    /// The principal name requests fall back to when the outer layer
    /// forwarded no identity.
    pub fn default_principal(&self) -> Option<&str> {
        self.config
            .current_user_principal
            .as_deref()
            .map(|path| path.trim_matches('/'))
            .filter(|name| !name.is_empty())
    }

    pub fn principal_href(&self, name: &str) -> String {
        DavPath {
            segments: vec![name.to_string()],
            collection_form: true,
        }
        .href(&self.config.route_prefix, true)
    }

    pub fn sync_token(&self, collection: &CollectionRef) -> String {
        match collection.store.sync_commit() {
            Ok(Some(commit)) => format!("{SYNC_TOKEN_PREFIX}{commit}"),
            _ => format!("{SYNC_TOKEN_PREFIX}0"),
        }
    }

    pub fn resolve_uri(&self, uri: &str) -> Result<(DavPath, Option<Resolved>)> {
        let path = DavPath::parse(uri, &self.config.route_prefix)?;
        let resolved = self.backend.resolve(&path, &self.config.route_prefix)?;
        Ok((path, resolved))
    }

    pub fn resolve_existing(&self, uri: &str) -> Result<(DavPath, Resolved)> {
        let (path, resolved) = self.resolve_uri(uri)?;
        match resolved {
            Some(resolved) => Ok((path, resolved)),
            None => Err(DavError::Code(StatusCode::NOT_FOUND)),
        }
    }

    /// Entry point. `principal` is the identity the outer layer derived,
    /// already authenticated; anonymous requests fall back to the
    /// configured user.
    pub async fn handle_request(
        &self,
        method: DavMethod,
        headers: &RequestHeaders<'_>,
        body: Vec<u8>,
        principal: Option<&str>,
    ) -> HttpResponse {
        let started = Instant::now();
        let principal = principal.or_else(|| self.default_principal());
        let response = match self
            .dispatch(method, headers, body, principal)
            .await
        {
            Ok(response) => response,
            Err(err) => err.into_response(),
        };
        tracing::info!(
            method = ?method,
            uri = headers.uri,
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request"
        );
        response
    }

    async fn dispatch(
        &self,
        method: DavMethod,
        headers: &RequestHeaders<'_>,
        body: Vec<u8>,
        principal: Option<&str>,
    ) -> Result<HttpResponse> {
        if self.config.autocreate != Autocreate::None {
            if let Some(name) = self.default_principal() {
                self.backend
                    .ensure_principal(name, self.config.autocreate == Autocreate::Defaults)?;
            }
        }

        if principal.is_none() && method != DavMethod::OPTIONS {
            return Err(DavError::Code(StatusCode::UNAUTHORIZED));
        }

        match method {
            DavMethod::OPTIONS => self.handle_options(headers),
            DavMethod::LOCK | DavMethod::UNLOCK => {
                // Advertised unimplemented; see the capability header.
                Err(DavError::Code(StatusCode::NOT_IMPLEMENTED))
            }
            DavMethod::PROPFIND => {
                let request = if body.is_empty() {
                    PropFind::AllProp(Vec::new())
                } else {
                    PropFind::parse(&mut Tokenizer::new(&body))?
                };
                self.handle_propfind(headers, request, principal).await
            }
            DavMethod::PROPPATCH => {
                let request = PropertyUpdate::parse(&mut Tokenizer::new(&body))?;
                self.handle_proppatch(headers, request, principal).await
            }
            DavMethod::MKCOL | DavMethod::MKCALENDAR => {
                let request = if body.is_empty() {
                    MkCol {
                        is_mkcalendar: method == DavMethod::MKCALENDAR,
                        props: Vec::new(),
                    }
                } else {
                    let mut request = MkCol::parse(&mut Tokenizer::new(&body))?;
                    if method == DavMethod::MKCALENDAR && !request.is_mkcalendar {
                        return Err(DavError::Code(StatusCode::BAD_REQUEST));
                    }
                    request.is_mkcalendar |= method == DavMethod::MKCALENDAR;
                    request
                };
                self.handle_mkcol(headers, request).await
            }
            DavMethod::GET | DavMethod::HEAD => {
                self.handle_get(headers, method == DavMethod::HEAD).await
            }
            DavMethod::PUT => self.handle_put(headers, body, principal).await,
            DavMethod::POST => self.handle_post(headers, body, principal).await,
            DavMethod::DELETE => self.handle_delete(headers, principal).await,
            DavMethod::COPY => self.handle_copy_move(headers, false, principal).await,
            DavMethod::MOVE => self.handle_copy_move(headers, true, principal).await,
            DavMethod::REPORT => {
                // A well-formed body naming a report outside the registry
                // is refused, not malformed (RFC 3253 section 3.6).
                let report = Report::parse(&mut Tokenizer::new(&body)).map_err(|err| match err {
                    dav_proto::parser::Error::UnexpectedToken { .. } => {
                        DavError::Code(StatusCode::FORBIDDEN)
                    }
                    err => DavError::Parse(err),
                })?;
                self.handle_report(headers, report, principal).await
            }
        }
    }

    fn handle_options(&self, headers: &RequestHeaders<'_>) -> Result<HttpResponse> {
        let (_, resolved) = self.resolve_uri(headers.uri)?;
        let allow = match &resolved {
            Some(Resolved::Item { .. }) => {
                "OPTIONS, GET, HEAD, PUT, DELETE, COPY, MOVE, PROPFIND, PROPPATCH, REPORT"
            }
            Some(Resolved::Collection(_)) => {
                "OPTIONS, POST, DELETE, PROPFIND, PROPPATCH, REPORT"
            }
            Some(Resolved::Root) => "OPTIONS, GET, PROPFIND, REPORT",
            Some(Resolved::Principal { .. } | Resolved::CollectionSet { .. }) => {
                "OPTIONS, PROPFIND, REPORT, MKCOL, MKCALENDAR"
            }
            None => "OPTIONS, PUT, MKCOL, MKCALENDAR",
        };
        Ok(HttpResponse::new(StatusCode::OK)
            .with_header("DAV", DAV_CAPABILITIES)
            .with_header("Allow", allow))
    }
}
