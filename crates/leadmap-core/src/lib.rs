//! Core domain model, field normalization, and dedup for leadmap.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "leadmap-core";

/// One extracted business listing. Every field is optional because the
/// upstream extractor may fail to find any of them; a record without a
/// business name is dropped before it reaches the collector.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BusinessRecord {
    pub business_name: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub mobile: Option<String>,
    pub whatsapp: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub source_url: Option<String>,
    pub source_site: Option<String>,
}

impl BusinessRecord {
    /// Column order shared by every tabular export of a record set.
    pub const COLUMNS: [&'static str; 9] = [
        "business_name",
        "category",
        "location",
        "mobile",
        "whatsapp",
        "email",
        "website",
        "source_url",
        "source_site",
    ];

    pub fn has_name(&self) -> bool {
        self.business_name
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty())
    }

    /// Field values in [`Self::COLUMNS`] order, empty string for absent fields.
    pub fn column_values(&self) -> [String; 9] {
        let cell = |field: &Option<String>| field.clone().unwrap_or_default();
        [
            cell(&self.business_name),
            cell(&self.category),
            cell(&self.location),
            cell(&self.mobile),
            cell(&self.whatsapp),
            cell(&self.email),
            cell(&self.website),
            cell(&self.source_url),
            cell(&self.source_site),
        ]
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("business_name is empty; caller must filter nameless records")]
    EmptyBusinessName,
}

/// Trims and collapses internal newlines, tabs, and carriage returns into
/// single spaces. Idempotent.
pub fn clean_text(input: &str) -> String {
    input
        .split(['\n', '\r', '\t'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Strips parentheses, hyphens, spaces, and plus signs from a phone number.
/// Purely cosmetic; no digit-count or locale validation.
pub fn clean_phone(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | '-' | ' ' | '+'))
        .collect::<String>()
        .trim()
        .to_string()
}

// Punctuation is removed outright, not turned into spaces: "Al-Noor"
// normalizes to "alnoor", a different business than "Al Noor".
fn normalize_name_fragment(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Derives the identity used to collapse duplicate listings: the normalized
/// business name, with the mobile digits appended when there are enough of
/// them to be a real phone number (more than 7 digits).
pub fn dedup_key(record: &BusinessRecord) -> Result<String, NormalizeError> {
    let name = record
        .business_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(NormalizeError::EmptyBusinessName)?;
    let name_key = normalize_name_fragment(name);

    let digits: String = record
        .mobile
        .as_deref()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();

    if digits.len() > 7 {
        Ok(format!("{name_key}_{digits}"))
    } else {
        Ok(name_key)
    }
}

/// Accumulates records in first-seen order, rejecting any whose dedup key
/// has already been accepted.
#[derive(Debug, Default)]
pub struct DedupCollector {
    records: Vec<BusinessRecord>,
    seen: HashSet<String>,
}

impl DedupCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers a record. Returns true when the record was new and accepted.
    /// Nameless records and duplicates are rejected silently.
    pub fn offer(&mut self, record: BusinessRecord) -> bool {
        let Ok(key) = dedup_key(&record) else {
            return false;
        };
        if !self.seen.insert(key) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[BusinessRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<BusinessRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, mobile: Option<&str>) -> BusinessRecord {
        BusinessRecord {
            business_name: Some(name.to_string()),
            mobile: mobile.map(ToString::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn clean_text_collapses_and_is_idempotent() {
        let once = clean_text("  Al Noor\nCafe\t\tDubai\r\n ");
        assert_eq!(once, "Al Noor Cafe Dubai");
        assert_eq!(clean_text(&once), once);
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn clean_phone_strips_formatting_only() {
        assert_eq!(clean_phone("+971 (4) 123-4567"), "97141234567");
        assert_eq!(clean_phone(""), "");
        // Not validation: letters survive untouched.
        assert_eq!(clean_phone("call 4-123"), "call4123");
    }

    #[test]
    fn dedup_key_ignores_case_and_whitespace() {
        let a = dedup_key(&named("Al Noor Cafe", None)).unwrap();
        let b = dedup_key(&named("al   NOOR cafe", None)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "al noor cafe");
    }

    #[test]
    fn dedup_key_removes_punctuation_without_splitting_words() {
        // Trailing punctuation is cosmetic, but an embedded hyphen joins
        // the fragments into a different name.
        let spaced = dedup_key(&named("Al Noor Cafe", None)).unwrap();
        assert_eq!(dedup_key(&named("Al Noor Cafe!", None)).unwrap(), spaced);

        let hyphenated = dedup_key(&named("Al-Noor Cafe", None)).unwrap();
        assert_eq!(hyphenated, "alnoor cafe");
        assert_ne!(hyphenated, spaced);
    }

    #[test]
    fn dedup_key_appends_phone_digits_only_past_seven() {
        let short = dedup_key(&named("Cafe", Some("1234567"))).unwrap();
        assert_eq!(short, "cafe");
        let long = dedup_key(&named("Cafe", Some("+971 4 123 4567"))).unwrap();
        assert_eq!(long, "cafe_97141234567");
    }

    #[test]
    fn dedup_key_rejects_empty_name() {
        assert_eq!(
            dedup_key(&BusinessRecord::default()),
            Err(NormalizeError::EmptyBusinessName)
        );
        assert_eq!(
            dedup_key(&named("   ", None)),
            Err(NormalizeError::EmptyBusinessName)
        );
    }

    #[test]
    fn collector_keeps_first_seen_order_with_distinct_keys() {
        let mut collector = DedupCollector::new();
        assert!(collector.offer(named("Al Noor Cafe", Some("0501234567"))));
        assert!(collector.offer(named("Marina Bakery", None)));
        // Same name, same digits in a different format: duplicate.
        assert!(!collector.offer(named("AL NOOR CAFE", Some("+050-123-4567"))));
        // Same name, different number: distinct business.
        assert!(collector.offer(named("Al Noor Cafe", Some("0559876543"))));

        let names: Vec<_> = collector
            .records()
            .iter()
            .map(|r| r.business_name.clone().unwrap())
            .collect();
        assert_eq!(
            names,
            vec!["Al Noor Cafe", "Marina Bakery", "Al Noor Cafe"]
        );

        let mut keys = HashSet::new();
        for record in collector.records() {
            assert!(keys.insert(dedup_key(record).unwrap()));
        }
    }

    #[test]
    fn collector_silently_ignores_nameless_records() {
        let mut collector = DedupCollector::new();
        assert!(!collector.offer(BusinessRecord::default()));
        assert!(collector.is_empty());
    }
}
