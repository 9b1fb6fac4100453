//! Storage error taxonomy.
//!
//! The writer pool only needs one decision from an error: retry it or not.
//! [`StorageError::is_transient`] makes that decision; everything else is
//! carried as text so errors stay `Clone` and can travel with dead letters.

/// Errors returned by a [`StorageBackend`](crate::traits::StorageBackend).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Connection, pool, or server-side resource trouble. Worth retrying.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// The store refused the data (constraint violation, bad value). Retrying
    /// the same request cannot succeed.
    #[error("storage rejected the request: {0}")]
    Rejected(String),
    /// A stored row could not be turned back into a record.
    #[error("stored row could not be decoded: {0}")]
    Decode(String),
    /// The backend could not be configured (bad URL, bad options).
    #[error("invalid storage configuration: {0}")]
    Config(String),
}

impl StorageError {
    /// Whether the same request may succeed if repeated later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Stable label for metrics and structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Rejected(_) => "rejected",
            Self::Decode(_) => "decode",
            Self::Config(_) => "config",
        }
    }
}

/// SQLSTATE classes that describe the server or connection rather than the data:
/// connection exceptions, transaction rollbacks (serialization failures,
/// deadlocks), insufficient resources, and operator intervention (shutdown).
#[cfg(feature = "postgres")]
const TRANSIENT_SQLSTATE_PREFIXES: [&str; 4] = ["08", "40", "53", "57P"];

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Configuration(_) => Self::Config(err.to_string()),
            sqlx::Error::Database(db) => {
                let transient = db.code().is_some_and(|code| {
                    TRANSIENT_SQLSTATE_PREFIXES
                        .iter()
                        .any(|prefix| code.starts_with(prefix))
                });
                if transient {
                    Self::Unavailable(err.to_string())
                } else {
                    Self::Rejected(err.to_string())
                }
            }
            sqlx::Error::RowNotFound
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_) => Self::Decode(err.to_string()),
            _ => Self::Unavailable(err.to_string()),
        }
    }
}
