/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! The INI-style sidecar holding a collection's type and presentation
//! properties. It lives beside the object database, outside the content
//! tree, so editing it never moves the ctag.

use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionType {
    Calendar,
    Addressbook,
    ScheduleInbox,
    ScheduleOutbox,
    Subscription,
    #[default]
    Other,
}

impl CollectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionType::Calendar => "calendar",
            CollectionType::Addressbook => "addressbook",
            CollectionType::ScheduleInbox => "schedule-inbox",
            CollectionType::ScheduleOutbox => "schedule-outbox",
            CollectionType::Subscription => "subscription",
            CollectionType::Other => "other",
        }
    }

    pub fn parse(value: &str) -> CollectionType {
        match value {
            "calendar" => CollectionType::Calendar,
            "addressbook" => CollectionType::Addressbook,
            "schedule-inbox" => CollectionType::ScheduleInbox,
            "schedule-outbox" => CollectionType::ScheduleOutbox,
            "subscription" => CollectionType::Subscription,
            _ => CollectionType::Other,
        }
    }
}

/// Parsed `[collection]` section of the sidecar file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionConfig {
    values: BTreeMap<String, String>,
}

impl CollectionConfig {
    pub fn parse(text: &str) -> CollectionConfig {
        let mut values = BTreeMap::new();
        let mut in_section = false;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                in_section = section.trim() == "collection";
                continue;
            }
            if !in_section {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                values.insert(
                    key.trim().to_string(),
                    unescape_value(value.trim()),
                );
            }
        }
        CollectionConfig { values }
    }

    pub fn serialize(&self) -> String {
        let mut out = String::from("[collection]\n");
        for (key, value) in &self.values {
            let _ = writeln!(out, "{key} = {}", escape_value(value));
        }
        out
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn unset(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn collection_type(&self) -> CollectionType {
        self.get("type").map(CollectionType::parse).unwrap_or_default()
    }

    pub fn set_collection_type(&mut self, typ: CollectionType) {
        self.set("type", typ.as_str());
    }

    pub fn displayname(&self) -> Option<&str> {
        self.get("displayname")
    }

    pub fn description(&self) -> Option<&str> {
        self.get("description")
    }

    pub fn color(&self) -> Option<&str> {
        self.get("color")
    }

    pub fn order(&self) -> Option<&str> {
        self.get("order")
    }

    pub fn source(&self) -> Option<&str> {
        self.get("source")
    }

    pub fn timezone(&self) -> Option<&str> {
        self.get("timezone")
    }

    /// Component names a calendar accepts, e.g. `VEVENT,VTODO`.
    pub fn components(&self) -> Option<Vec<String>> {
        self.get("components").map(|list| {
            list.split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect()
        })
    }

    pub fn set_components(&mut self, components: &[String]) {
        self.set("components", components.join(","));
    }
}

/// Multi-line values (a VTIMEZONE payload) are stored with encoded
/// line breaks, INI being line-oriented.
fn escape_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\r', "\\r").replace('\n', "\\n")
}

fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_values() {
        let mut config = CollectionConfig::default();
        config.set_collection_type(CollectionType::Calendar);
        config.set("displayname", "Family");
        config.set("color", "#ff0000");
        config.set("timezone", "BEGIN:VTIMEZONE\r\nEND:VTIMEZONE\r\n");

        let parsed = CollectionConfig::parse(&config.serialize());
        assert_eq!(parsed, config);
        assert_eq!(parsed.collection_type(), CollectionType::Calendar);
        assert_eq!(parsed.displayname(), Some("Family"));
        assert_eq!(
            parsed.timezone(),
            Some("BEGIN:VTIMEZONE\r\nEND:VTIMEZONE\r\n")
        );
    }

    #[test]
    fn ignores_foreign_sections_and_comments() {
        let parsed = CollectionConfig::parse(
            "# sidecar\n[other]\ntype = nope\n[collection]\n; note\ntype = addressbook\n",
        );
        assert_eq!(parsed.collection_type(), CollectionType::Addressbook);
        assert_eq!(parsed.get("nope"), None);
    }
}
