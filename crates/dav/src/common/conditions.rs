/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Conditional-request arbitration (RFC 7232 as RFC 4918 applies it).
//! ETag comparison is strong and octet-exact; the RFC 4918 `If` header's
//! tagged lists are not interpreted and fail the request outright.

use dav_proto::RequestHeaders;
use hyper::StatusCode;
use store::Preconditions;

use crate::{DavError, Result};

/// Builds the store-level preconditions a write must re-check under the
/// collection lock. A tag list is resolved against the entity tag observed
/// at resolution time and the write pinned to it; the store re-checks
/// under the lock, closing the race.
pub fn write_preconditions(
    headers: &RequestHeaders<'_>,
    current_etag: Option<&str>,
) -> Result<Preconditions> {
    reject_if_header(headers)?;
    let mut preconditions = Preconditions::none();
    match &headers.if_match {
        dav_proto::TagCondition::None => {}
        dav_proto::TagCondition::Any => preconditions.must_exist = true,
        condition => match current_etag {
            Some(etag) if condition.matches(etag) => {
                preconditions.if_match = Some(etag.to_string());
            }
            _ => return Err(DavError::Code(StatusCode::PRECONDITION_FAILED)),
        },
    }
    match (&headers.if_none_match, current_etag) {
        (dav_proto::TagCondition::None, _) => {}
        (dav_proto::TagCondition::Any, _) => preconditions.must_not_exist = true,
        (condition, Some(etag)) if condition.matches(etag) => {
            return Err(DavError::Code(StatusCode::PRECONDITION_FAILED));
        }
        _ => {}
    }
    Ok(preconditions)
}

/// Evaluates read-style conditionals against the current entity tag.
pub fn assert_preconditions(
    headers: &RequestHeaders<'_>,
    current_etag: Option<&str>,
) -> Result<()> {
    reject_if_header(headers)?;
    match (&headers.if_match, current_etag) {
        (dav_proto::TagCondition::None, _) => {}
        (condition, Some(etag)) if condition.matches(etag) => {}
        _ => return Err(DavError::Code(StatusCode::PRECONDITION_FAILED)),
    }
    match (&headers.if_none_match, current_etag) {
        (dav_proto::TagCondition::None, _) => Ok(()),
        (condition, Some(etag)) if condition.matches(etag) => {
            Err(DavError::Code(StatusCode::PRECONDITION_FAILED))
        }
        _ => Ok(()),
    }
}

fn reject_if_header(headers: &RequestHeaders<'_>) -> Result<()> {
    if headers.has_if {
        // Tagged-list conditionals are lock-oriented; with locks absent
        // they cannot evaluate to true here.
        Err(DavError::Code(StatusCode::PRECONDITION_FAILED))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers<'x>(pairs: &[(&'static str, &'x str)]) -> RequestHeaders<'x> {
        let mut headers = RequestHeaders::new("/");
        for (name, value) in pairs {
            headers.parse(name, value);
        }
        headers
    }

    #[test]
    fn write_preconditions_translate_headers() {
        let h = headers(&[("If-Match", "\"abc\", \"def\"")]);
        let p = write_preconditions(&h, Some("def")).unwrap();
        assert_eq!(p.if_match.as_deref(), Some("def"));
        assert!(!p.must_not_exist);
        assert!(write_preconditions(&h, Some("ghi")).is_err());
        assert!(write_preconditions(&h, None).is_err());

        let h = headers(&[("If-None-Match", "*")]);
        let p = write_preconditions(&h, None).unwrap();
        assert!(p.must_not_exist);

        let h = headers(&[("If", "(<opaquelocktoken:x>)")]);
        assert!(write_preconditions(&h, None).is_err());
    }

    #[test]
    fn read_preconditions_compare_strongly() {
        let h = headers(&[("If-Match", "\"abc\"")]);
        assert!(assert_preconditions(&h, Some("abc")).is_ok());
        assert!(assert_preconditions(&h, Some("def")).is_err());
        assert!(assert_preconditions(&h, None).is_err());

        let h = headers(&[("If-None-Match", "\"abc\"")]);
        assert!(assert_preconditions(&h, Some("abc")).is_err());
        assert!(assert_preconditions(&h, Some("def")).is_ok());
        assert!(assert_preconditions(&h, None).is_ok());
    }
}
