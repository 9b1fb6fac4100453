//! Record identity and payload types.
//!
//! A [`Record`] is the unit of ingestion. It is created once from a validated
//! [`NewRecord`](crate::validation::NewRecord) and never mutated afterwards;
//! pipeline stages pass it by value and the read cache keeps its own clone.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique record identifier, assigned at ingestion.
///
/// Serializes as the bare hyphenated UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generates a fresh random (v4) identifier.
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for RecordId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A single ingested entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub name: String,
    pub nickname: String,
    /// Calendar date, `YYYY-MM-DD` on the wire.
    pub birth_date: NaiveDate,
    pub tags: Vec<String>,
}

impl Record {
    /// Text that search queries are matched against: name, nickname and every
    /// tag joined by single spaces.
    ///
    /// Storage backends persist or compute this verbatim so that a term is
    /// found by the in-memory and the relational backend alike.
    #[must_use]
    pub fn search_text(&self) -> String {
        let mut text = String::with_capacity(
            self.name.len()
                + self.nickname.len()
                + self.tags.iter().map(|t| t.len() + 1).sum::<usize>()
                + 1,
        );
        text.push_str(&self.name);
        text.push(' ');
        text.push_str(&self.nickname);
        for tag in &self.tags {
            text.push(' ');
            text.push_str(tag);
        }
        text
    }

    /// Whether `term` occurs literally in [`search_text`](Self::search_text).
    ///
    /// Matching is case-sensitive and treats `%` and `_` as ordinary characters.
    #[must_use]
    pub fn matches_term(&self, term: &str) -> bool {
        self.search_text().contains(term)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Builds a record with a fresh id and the given name.
    pub fn record(name: &str) -> Record {
        Record {
            id: RecordId::new_v4(),
            name: name.to_string(),
            nickname: format!("{name}-nick"),
            birth_date: NaiveDate::from_ymd_opt(1990, 5, 17).unwrap(),
            tags: vec!["rust".to_string(), "postgres".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::record;
    use super::*;

    #[test]
    fn record_id_round_trips_through_display() {
        let id = RecordId::new_v4();
        let parsed: RecordId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn record_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<RecordId>().is_err());
        assert!("".parse::<RecordId>().is_err());
    }

    #[test]
    fn record_serializes_with_plain_date_and_id() {
        let rec = record("ada");
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["id"], rec.id.to_string());
        assert_eq!(json["birth_date"], "1990-05-17");
        assert_eq!(json["tags"], serde_json::json!(["rust", "postgres"]));
    }

    #[test]
    fn search_text_joins_fields() {
        let rec = record("ada");
        assert_eq!(rec.search_text(), "ada ada-nick rust postgres");
    }

    #[test]
    fn search_text_without_tags() {
        let mut rec = record("ada");
        rec.tags.clear();
        assert_eq!(rec.search_text(), "ada ada-nick");
    }

    #[test]
    fn matches_term_is_literal_and_case_sensitive() {
        let rec = record("ada");
        assert!(rec.matches_term("postg"));
        assert!(rec.matches_term("nick rust"));
        assert!(!rec.matches_term("Rust"));
        assert!(!rec.matches_term("%"));
    }
}
