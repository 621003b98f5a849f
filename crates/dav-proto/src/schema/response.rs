/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use hyper::StatusCode;

use super::{Namespaces, property::DavPropertyValue};

/// `{DAV:}multistatus` response body.
pub struct MultiStatus {
    pub namespaces: Namespaces,
    pub responses: Vec<Response>,
    pub sync_token: Option<SyncToken>,
    pub response_description: Option<ResponseDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub href: Href,
    pub body: ResponseBody,
    pub error: Option<Condition>,
    pub location: Option<Href>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    PropStat(Vec<PropStat>),
    Status(Status),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropStat {
    pub prop: Vec<DavPropertyValue>,
    pub status: Status,
    pub error: Option<Condition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub StatusCode);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Href(pub String);

pub struct SyncToken(pub String);

pub struct ResponseDescription(pub String);

/// Extended MKCOL failure body (RFC 5689 section 3.2).
pub struct MkColResponse {
    pub namespaces: Namespaces,
    pub propstat: Vec<PropStat>,
}

/// `{DAV:}error` body with a precondition/postcondition element.
pub struct ErrorResponse {
    pub namespaces: Namespaces,
    pub error: Condition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Base(BaseCondition),
    Cal(CalCondition),
    Card(CardCondition),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseCondition {
    ValidSyncToken,
    NumberOfMatchesWithinLimits,
    ResourceMustBeNull,
    CannotModifyProtectedProperty,
    ValidResourceType,
    PropFindFiniteDepth,
    NoExternalEntities,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalCondition {
    CalendarCollectionLocationOk,
    ValidCalendarData,
    ValidCalendarObjectResource,
    ValidFilter,
    SupportedCalendarData,
    SupportedCalendarComponent,
    SupportedCollation(String),
    NoUidConflict(Href),
    MaxResourceSize(u32),
    MinDateTime,
    MaxDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardCondition {
    AddressbookCollectionLocationOk,
    ValidAddressData,
    SupportedAddressData,
    SupportedFilter,
    SupportedCollation(String),
    NoUidConflict(Href),
    MaxResourceSize(u32),
}

impl From<BaseCondition> for Condition {
    fn from(value: BaseCondition) -> Self {
        Condition::Base(value)
    }
}

impl From<CalCondition> for Condition {
    fn from(value: CalCondition) -> Self {
        Condition::Cal(value)
    }
}

impl From<CardCondition> for Condition {
    fn from(value: CardCondition) -> Self {
        Condition::Card(value)
    }
}

impl From<String> for Href {
    fn from(value: String) -> Self {
        Href(value)
    }
}

impl From<&str> for Href {
    fn from(value: &str) -> Self {
        Href(value.to_string())
    }
}
