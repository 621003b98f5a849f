/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::fmt::Display;

use hyper::StatusCode;

use super::escape;
use crate::schema::{
    Namespace, Namespaces,
    property::DavPropertyValue,
    response::{
        Condition, Href, MultiStatus, PropStat, Response, ResponseBody, ResponseDescription,
        Status, SyncToken,
    },
};

impl MultiStatus {
    pub fn new() -> Self {
        MultiStatus {
            namespaces: Namespaces::default(),
            responses: Vec::new(),
            sync_token: None,
            response_description: None,
        }
    }

    pub fn with_namespace(mut self, ns: Namespace) -> Self {
        self.namespaces.set(ns);
        self
    }

    pub fn set_namespace(&mut self, ns: Namespace) {
        self.namespaces.set(ns);
    }

    pub fn add_response(&mut self, response: Response) {
        self.responses.push(response);
    }

    pub fn set_sync_token(&mut self, token: impl Into<String>) {
        self.sync_token = Some(SyncToken(token.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

impl Default for MultiStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for MultiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><D:multistatus {}>",
            self.namespaces
        )?;
        for response in &self.responses {
            response.fmt(f)?;
        }
        if let Some(sync_token) = &self.sync_token {
            sync_token.fmt(f)?;
        }
        if let Some(description) = &self.response_description {
            description.fmt(f)?;
        }
        write!(f, "</D:multistatus>")
    }
}

impl Response {
    /// A response carrying propstats grouped by status, 200 first.
    pub fn new_propstat(href: impl Into<Href>, mut propstat: Vec<PropStat>) -> Self {
        propstat.sort_by_key(|ps| ps.status.0.as_u16());
        Response {
            href: href.into(),
            body: ResponseBody::PropStat(propstat),
            error: None,
            location: None,
        }
    }

    pub fn new_status(href: impl Into<Href>, status: StatusCode) -> Self {
        Response {
            href: href.into(),
            body: ResponseBody::Status(Status(status)),
            error: None,
            location: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<Condition>) -> Self {
        self.error = Some(error.into());
        self
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<D:response>")?;
        self.href.fmt(f)?;
        match &self.body {
            ResponseBody::PropStat(propstat) => {
                for propstat in propstat {
                    propstat.fmt(f)?;
                }
            }
            ResponseBody::Status(status) => status.fmt(f)?,
        }
        if let Some(error) = &self.error {
            error.fmt(f)?;
        }
        if let Some(location) = &self.location {
            write!(f, "<D:location>{location}</D:location>")?;
        }
        write!(f, "</D:response>")
    }
}

impl PropStat {
    pub fn ok(prop: Vec<DavPropertyValue>) -> Self {
        PropStat {
            prop,
            status: Status(StatusCode::OK),
            error: None,
        }
    }

    pub fn with_status(props: Vec<DavPropertyValue>, status: StatusCode) -> Self {
        PropStat {
            prop: props,
            status: Status(status),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<Condition>) -> Self {
        self.error = Some(error.into());
        self
    }
}

impl Display for PropStat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<D:propstat><D:prop>")?;
        for prop in &self.prop {
            prop.fmt(f)?;
        }
        write!(f, "</D:prop>")?;
        self.status.fmt(f)?;
        if let Some(error) = &self.error {
            error.fmt(f)?;
        }
        write!(f, "</D:propstat>")
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<D:status>HTTP/1.1 {} {}</D:status>",
            self.0.as_u16(),
            self.0.canonical_reason().unwrap_or_default()
        )
    }
}

impl Display for Href {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<D:href>{}</D:href>", escape(&self.0))
    }
}

impl Display for SyncToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<D:sync-token>{}</D:sync-token>", escape(&self.0))
    }
}

impl Display for ResponseDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<D:responsedescription>{}</D:responsedescription>",
            escape(&self.0)
        )
    }
}
