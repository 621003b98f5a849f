/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Import validation for the media types a collection stores. Every `.ics`
//! member must be a well-formed iCalendar object whose components share one
//! UID; every `.vcf` member a well-formed vCard with a UID.

use calcard::{Entry, Parser};

use crate::{Result, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Calendar,
    Contact,
    Other,
}

impl MediaKind {
    pub fn from_name(name: &str) -> MediaKind {
        if name.ends_with(".ics") {
            MediaKind::Calendar
        } else if name.ends_with(".vcf") {
            MediaKind::Contact
        } else {
            MediaKind::Other
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            MediaKind::Calendar => "text/calendar; charset=utf-8",
            MediaKind::Contact => "text/vcard; charset=utf-8",
            MediaKind::Other => "application/octet-stream",
        }
    }

    pub fn extension(&self) -> Option<&'static str> {
        match self {
            MediaKind::Calendar => Some(".ics"),
            MediaKind::Contact => Some(".vcf"),
            MediaKind::Other => None,
        }
    }
}

/// Validates `bytes` for the media kind implied by `name` and returns the
/// resource UID. Names outside the calendar/contact conventions are
/// accepted opaquely with no UID.
pub fn validate(name: &str, bytes: &[u8]) -> Result<Option<String>> {
    match MediaKind::from_name(name) {
        MediaKind::Calendar => validate_ical(name, bytes).map(Some),
        MediaKind::Contact => validate_vcard(name, bytes).map(Some),
        MediaKind::Other => Ok(None),
    }
}

fn validate_ical(name: &str, bytes: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| StoreError::UnsupportedMedia(name.to_string()))?;
    let ical = match Parser::new(text).entry() {
        Entry::ICalendar(ical) => ical,
        _ => return Err(StoreError::UnsupportedMedia(name.to_string())),
    };

    let mut uids = ical.uids();
    let uid = uids
        .next()
        .ok_or_else(|| StoreError::Invalid(format!("{name}: missing UID")))?
        .to_string();
    if uids.any(|other| other != uid) {
        return Err(StoreError::Invalid(format!(
            "{name}: components disagree on UID"
        )));
    }
    Ok(uid)
}

fn validate_vcard(name: &str, bytes: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| StoreError::UnsupportedMedia(name.to_string()))?;
    let vcard = match Parser::new(text).entry() {
        Entry::VCard(vcard) => vcard,
        _ => return Err(StoreError::UnsupportedMedia(name.to_string())),
    };
    vcard
        .uid()
        .map(|uid| uid.to_string())
        .ok_or_else(|| StoreError::Invalid(format!("{name}: missing UID")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\n\
        BEGIN:VEVENT\r\nUID:evt-1\r\nDTSTAMP:20240101T000000Z\r\n\
        DTSTART:20240115T120000Z\r\nSUMMARY:Lunch\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    #[test]
    fn accepts_valid_event_and_extracts_uid() {
        assert_eq!(
            validate("evt-1.ics", EVENT.as_bytes()).unwrap(),
            Some("evt-1".to_string())
        );
    }

    #[test]
    fn rejects_vcard_payload_in_ics() {
        let vcf = "BEGIN:VCARD\r\nVERSION:3.0\r\nUID:c1\r\nFN:Jane\r\nEND:VCARD\r\n";
        assert!(matches!(
            validate("x.ics", vcf.as_bytes()),
            Err(StoreError::UnsupportedMedia(_))
        ));
        assert_eq!(
            validate("x.vcf", vcf.as_bytes()).unwrap(),
            Some("c1".to_string())
        );
    }

    #[test]
    fn rejects_missing_uid() {
        let bad = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\n\
            DTSTART:20240115T120000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        assert!(matches!(
            validate("bad.ics", bad.as_bytes()),
            Err(StoreError::Invalid(_))
        ));
    }
}
