/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::fmt::Display;

use super::escape;
use crate::schema::{
    Namespace, Namespaces,
    response::{
        BaseCondition, CalCondition, CardCondition, Condition, ErrorResponse, MkColResponse,
    },
};

impl ErrorResponse {
    pub fn new(error: impl Into<Condition>) -> Self {
        let error = error.into();
        let mut namespaces = Namespaces::default();
        match &error {
            Condition::Cal(_) => namespaces.set(Namespace::CalDav),
            Condition::Card(_) => namespaces.set(Namespace::CardDav),
            Condition::Base(_) => {}
        }
        ErrorResponse { namespaces, error }
    }
}

impl Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><D:error {}>{}</D:error>",
            self.namespaces, self.error
        )
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::Base(condition) => condition.fmt(f),
            Condition::Cal(condition) => condition.fmt(f),
            Condition::Card(condition) => condition.fmt(f),
        }
    }
}

impl Display for BaseCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BaseCondition::ValidSyncToken => write!(f, "<D:valid-sync-token/>"),
            BaseCondition::NumberOfMatchesWithinLimits => {
                write!(f, "<D:number-of-matches-within-limits/>")
            }
            BaseCondition::ResourceMustBeNull => write!(f, "<D:resource-must-be-null/>"),
            BaseCondition::CannotModifyProtectedProperty => {
                write!(f, "<D:cannot-modify-protected-property/>")
            }
            BaseCondition::ValidResourceType => write!(f, "<D:valid-resourcetype/>"),
            BaseCondition::PropFindFiniteDepth => write!(f, "<D:propfind-finite-depth/>"),
            BaseCondition::NoExternalEntities => write!(f, "<D:no-external-entities/>"),
        }
    }
}

impl Display for CalCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalCondition::CalendarCollectionLocationOk => {
                write!(f, "<A:calendar-collection-location-ok/>")
            }
            CalCondition::ValidCalendarData => write!(f, "<A:valid-calendar-data/>"),
            CalCondition::ValidCalendarObjectResource => {
                write!(f, "<A:valid-calendar-object-resource/>")
            }
            CalCondition::ValidFilter => write!(f, "<A:valid-filter/>"),
            CalCondition::SupportedCalendarData => write!(f, "<A:supported-calendar-data/>"),
            CalCondition::SupportedCalendarComponent => {
                write!(f, "<A:supported-calendar-component/>")
            }
            CalCondition::SupportedCollation(collation) => write!(
                f,
                "<A:supported-collation>{}</A:supported-collation>",
                escape(collation)
            ),
            CalCondition::NoUidConflict(href) => {
                write!(f, "<A:no-uid-conflict>{href}</A:no-uid-conflict>")
            }
            CalCondition::MaxResourceSize(size) => {
                write!(f, "<A:max-resource-size>{size}</A:max-resource-size>")
            }
            CalCondition::MinDateTime => write!(f, "<A:min-date-time/>"),
            CalCondition::MaxDateTime => write!(f, "<A:max-date-time/>"),
        }
    }
}

impl Display for CardCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CardCondition::AddressbookCollectionLocationOk => {
                write!(f, "<B:addressbook-collection-location-ok/>")
            }
            CardCondition::ValidAddressData => write!(f, "<B:valid-address-data/>"),
            CardCondition::SupportedAddressData => write!(f, "<B:supported-address-data/>"),
            CardCondition::SupportedFilter => write!(f, "<B:supported-filter/>"),
            CardCondition::SupportedCollation(collation) => write!(
                f,
                "<B:supported-collation>{}</B:supported-collation>",
                escape(collation)
            ),
            CardCondition::NoUidConflict(href) => {
                write!(f, "<B:no-uid-conflict>{href}</B:no-uid-conflict>")
            }
            CardCondition::MaxResourceSize(size) => {
                write!(f, "<B:max-resource-size>{size}</B:max-resource-size>")
            }
        }
    }
}

impl MkColResponse {
    pub fn new(propstat: Vec<crate::schema::response::PropStat>) -> Self {
        MkColResponse {
            namespaces: Namespaces::default(),
            propstat,
        }
    }

    pub fn with_namespace(mut self, ns: Namespace) -> Self {
        self.namespaces.set(ns);
        self
    }
}

impl Display for MkColResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><D:mkcol-response {}>",
            self.namespaces
        )?;
        for propstat in &self.propstat {
            propstat.fmt(f)?;
        }
        write!(f, "</D:mkcol-response>")
    }
}
