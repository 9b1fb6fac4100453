//! Boundary validation for submitted records.
//!
//! Payloads are parsed leniently (every field optional) so that a missing or
//! `null` field surfaces as a readable validation error instead of an opaque
//! deserialization failure. Only syntactically broken JSON or wrongly typed
//! fields fail at [`NewRecord::from_json`].

use chrono::NaiveDate;
use serde::Deserialize;

use crate::record::{Record, RecordId};

/// Wire format of `birth_date`.
pub const BIRTH_DATE_FORMAT: &str = "%Y-%m-%d";

/// Field length limits, counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    pub max_name_chars: usize,
    pub max_nickname_chars: usize,
    pub max_tag_chars: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_name_chars: 100,
            max_nickname_chars: 32,
            max_tag_chars: 32,
        }
    }
}

/// Unvalidated record payload as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    /// `null` and absent both mean "no tags".
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Result of validating a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// The payload can become a [`Record`].
    Valid,
    /// The payload violates one or more rules.
    Invalid {
        /// Human-readable descriptions of each failure, in field order.
        errors: Vec<String>,
    },
}

impl ValidationResult {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    #[must_use]
    pub fn errors(&self) -> &[String] {
        match self {
            Self::Valid => &[],
            Self::Invalid { errors } => errors,
        }
    }
}

impl NewRecord {
    /// Parses a JSON body.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed JSON, a non-object body, or
    /// fields of the wrong JSON type.
    pub fn from_json(body: &[u8]) -> serde_json::Result<Self> {
        // A derived struct visitor would also take a positional array.
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(body)?;
        serde_json::from_value(serde_json::Value::Object(object))
    }

    /// Checks every field rule and collects all failures.
    #[must_use]
    pub fn validate(&self, limits: &ValidationLimits) -> ValidationResult {
        let mut errors = Vec::new();

        check_text(&mut errors, "name", self.name.as_deref(), limits.max_name_chars);
        check_text(
            &mut errors,
            "nickname",
            self.nickname.as_deref(),
            limits.max_nickname_chars,
        );

        match self.birth_date.as_deref() {
            None => errors.push("birth_date is required".to_string()),
            Some(raw) => {
                if parse_birth_date(raw).is_none() {
                    errors.push(format!("birth_date must be a YYYY-MM-DD date, got {raw:?}"));
                }
            }
        }

        if let Some(tags) = &self.tags {
            for (i, tag) in tags.iter().enumerate() {
                if tag.trim().is_empty() {
                    errors.push(format!("tags[{i}] must not be blank"));
                } else if tag.chars().count() > limits.max_tag_chars {
                    errors.push(format!(
                        "tags[{i}] exceeds {} characters",
                        limits.max_tag_chars
                    ));
                }
            }
        }

        if errors.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid { errors }
        }
    }

    /// Validates the payload and turns it into a [`Record`] with the given id.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationResult::Invalid`] describing every violated rule.
    pub fn accept(self, id: RecordId, limits: &ValidationLimits) -> Result<Record, ValidationResult> {
        let result = self.validate(limits);
        if !result.is_valid() {
            return Err(result);
        }

        // validate() guarantees presence and format of every required field.
        match (
            self.name,
            self.nickname,
            self.birth_date.as_deref().and_then(parse_birth_date),
        ) {
            (Some(name), Some(nickname), Some(birth_date)) => Ok(Record {
                id,
                name,
                nickname,
                birth_date,
                tags: self.tags.unwrap_or_default(),
            }),
            _ => Err(ValidationResult::Invalid {
                errors: vec!["record is incomplete".to_string()],
            }),
        }
    }
}

fn check_text(errors: &mut Vec<String>, field: &str, value: Option<&str>, max_chars: usize) {
    match value {
        None => errors.push(format!("{field} is required")),
        Some(v) if v.trim().is_empty() => errors.push(format!("{field} must not be blank")),
        Some(v) if v.chars().count() > max_chars => {
            errors.push(format!("{field} exceeds {max_chars} characters"));
        }
        Some(_) => {}
    }
}

/// Strict `YYYY-MM-DD` parse; rejects extended years and trailing input.
fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(raw, BIRTH_DATE_FORMAT).ok()
}
