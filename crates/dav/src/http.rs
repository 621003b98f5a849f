/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! The response the protocol engine hands back to the transport layer.
//! The outer HTTP server only has to copy status, headers and body.

use hyper::StatusCode;

#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: Vec<(&'static str, String)>,
    body: Option<HttpBody>,
}

#[derive(Debug)]
pub enum HttpBody {
    Xml(String),
    Content {
        content_type: String,
        bytes: Vec<u8>,
    },
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn multistatus(body: impl ToString) -> Self {
        HttpResponse::new(StatusCode::MULTI_STATUS).with_xml_body(body.to_string())
    }

    pub fn with_xml_body(mut self, body: String) -> Self {
        self.body = Some(HttpBody::Xml(body));
        self
    }

    pub fn with_content(mut self, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.body = Some(HttpBody::Content {
            content_type: content_type.into(),
            bytes,
        });
        self
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Strong entity tag, quoted on the wire.
    pub fn with_etag(self, etag: impl AsRef<str>) -> Self {
        let etag = etag.as_ref();
        self.with_header("ETag", format!("\"{etag}\""))
    }

    pub fn with_location(self, href: impl Into<String>) -> Self {
        self.with_header("Location", href.into())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &[(&'static str, String)] {
        &self.headers
    }

    pub fn body(&self) -> Option<&HttpBody> {
        self.body.as_ref()
    }

    pub fn into_parts(self) -> (StatusCode, Vec<(&'static str, String)>, Option<HttpBody>) {
        (self.status, self.headers, self.body)
    }

    /// Body bytes and content type for the transport.
    pub fn body_bytes(self) -> (StatusCode, Vec<(&'static str, String)>, String, Vec<u8>) {
        let (status, headers, body) = self.into_parts();
        match body {
            Some(HttpBody::Xml(xml)) => (
                status,
                headers,
                "application/xml; charset=utf-8".to_string(),
                xml.into_bytes(),
            ),
            Some(HttpBody::Content {
                content_type,
                bytes,
            }) => (status, headers, content_type, bytes),
            None => (status, headers, String::new(), Vec::new()),
        }
    }

    /// The XML body, when the response carries one.
    pub fn xml(&self) -> &str {
        match self.body.as_ref() {
            Some(HttpBody::Xml(xml)) => xml,
            _ => "",
        }
    }
}
