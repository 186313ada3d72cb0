//! WHOIS response parsing

use super::types::{SourceFamily, WhoisField};
use super::{is_comment, sanitize_value};
use serde::Serialize;
use std::collections::BTreeMap;

/// Attribute that starts a new AS object in RPSL responses
const RECORD_START: &str = "aut-num";

/// Flat WHOIS record for one ASN
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WhoisRecord {
    fields: BTreeMap<WhoisField, String>,

    /// Unmodified lines of the object that was kept
    pub raw_output: String,
}

impl WhoisRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: WhoisField) -> Option<&str> {
        self.fields.get(&field).map(|s| s.as_str())
    }

    pub fn contains(&self, field: WhoisField) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn set(&mut self, field: WhoisField, value: impl Into<String>) {
        self.fields.insert(field, value.into());
    }

    /// Iterate over present fields in column order
    pub fn fields(&self) -> impl Iterator<Item = (WhoisField, &str)> {
        self.fields.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Add a parsed value; repeated attributes are joined by newlines, except the
    /// country which is overwritten
    fn collect(&mut self, field: WhoisField, value: String) {
        match self.fields.get_mut(&field) {
            Some(existing) if field != WhoisField::Country => {
                existing.push('\n');
                existing.push_str(value.as_str());
            }
            _ => {
                self.fields.insert(field, value);
            }
        }
    }

    /// Fill in fields that can be derived from others
    ///
    /// The last address line is normally the country and the one before it the
    /// state or province. Records without an AS name fall back to the org ID.
    pub fn finalize(&mut self) {
        let address_lines: Option<Vec<String>> = self
            .get(WhoisField::Address)
            .map(|a| a.split('\n').map(|l| l.to_string()).collect());

        if let Some(lines) = address_lines {
            if !self.contains(WhoisField::Country) {
                if let Some(last) = lines.last() {
                    self.set(WhoisField::Country, last.clone());
                }
            }
            if !self.contains(WhoisField::StateProv) && lines.len() >= 2 {
                self.set(WhoisField::StateProv, lines[lines.len() - 2].clone());
            }
        }

        if !self.contains(WhoisField::AsName) {
            if let Some(org_id) = self.get(WhoisField::OrgId).map(|s| s.to_string()) {
                self.set(WhoisField::AsName, org_id);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollectState {
    Collecting { after_break: bool },
    Stopped,
}

impl SourceFamily {
    /// Whether the first line after a break ends the object before it is read
    fn stops_before(&self, record: &WhoisRecord, after_break: bool) -> bool {
        match self {
            // the owner block is followed by contact objects
            SourceFamily::LacnicLike => after_break && record.contains(WhoisField::OrgName),
            SourceFamily::Arin | SourceFamily::RipeLike => false,
        }
    }

    /// Whether the line just collected ends the object
    fn stops_after(
        &self,
        field: Option<WhoisField>,
        prev: Option<WhoisField>,
        record: &WhoisRecord,
        after_break: bool,
    ) -> bool {
        let has_address = record.contains(WhoisField::Address);
        let country_with_address = field == Some(WhoisField::Country) && has_address;

        match self {
            SourceFamily::Arin | SourceFamily::LacnicLike => country_with_address,
            SourceFamily::RipeLike => {
                let address_run_ended = has_address
                    && prev == Some(WhoisField::Address)
                    && field != Some(WhoisField::Address);

                country_with_address
                    || (address_run_ended && (record.contains(WhoisField::Country) || after_break))
            }
        }
    }
}

/// Incremental parser for a single WHOIS response
///
/// Lines are fed one at a time, as they arrive from the `whois` client.
pub struct WhoisParser {
    family: SourceFamily,
    record: WhoisRecord,
    raw: String,
    prev_field: Option<WhoisField>,
    state: CollectState,
}

impl WhoisParser {
    pub fn new(family: SourceFamily) -> Self {
        Self {
            family,
            record: WhoisRecord::new(),
            raw: String::new(),
            prev_field: None,
            state: CollectState::Collecting { after_break: false },
        }
    }

    /// Parse a complete response
    pub fn parse_lines<I, S>(family: SourceFamily, lines: I) -> WhoisRecord
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parser = WhoisParser::new(family);
        for line in lines {
            parser.feed_line(line.as_ref());
        }
        parser.finish()
    }

    pub fn family(&self) -> SourceFamily {
        self.family
    }

    /// Whether a field was read from the response so far, before any derived
    /// fields are filled in
    pub fn collected(&self, field: WhoisField) -> bool {
        self.record.contains(field)
    }

    pub fn feed_line(&mut self, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']);
        if is_comment(line) {
            return;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            self.mark_break();
            self.push_raw(line);
            return;
        }

        let Some((attr, value)) = trimmed.split_once(": ") else {
            self.push_raw(line);
            return;
        };
        let attr = attr.trim();

        if attr == RECORD_START {
            self.record = WhoisRecord::new();
            self.raw.clear();
            self.prev_field = None;
            self.state = CollectState::Collecting { after_break: false };
        }
        self.push_raw(line);

        let CollectState::Collecting { after_break } = self.state else {
            return;
        };

        if self.family.stops_before(&self.record, after_break) {
            self.state = CollectState::Stopped;
            return;
        }

        let field = self.family.map_attribute(attr);
        if let Some(field) = field {
            self.record.collect(field, sanitize_value(value));
        }

        if self
            .family
            .stops_after(field, self.prev_field, &self.record, after_break)
        {
            self.state = CollectState::Stopped;
        }
        self.prev_field = field;
    }

    /// Complete the record, applying the derived-field rules
    pub fn finish(self) -> WhoisRecord {
        let mut record = self.record;
        record.raw_output = self.raw.trim().to_string();
        record.finalize();
        record
    }

    fn mark_break(&mut self) {
        if let CollectState::Collecting { .. } = self.state {
            self.state = CollectState::Collecting { after_break: true };
        }
    }

    fn push_raw(&mut self, line: &str) {
        self.raw.push_str(line);
        self.raw.push('\n');
    }
}
