/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Query-time calendar and contact semantics: evaluation of CalDAV and
//! CardDAV filters against parsed objects, recurrence expansion bounded by
//! a window, free-busy and availability processing, and the property index
//! used to skip full parses on large collections.

pub mod calendar;
pub mod collation;
pub mod contact;
pub mod index;

pub use calendar::{filter::CalendarFilterEvaluator, freebusy};
pub use contact::filter::matches_vcard;
