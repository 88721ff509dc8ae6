//! Error types shared by the decoder, the ingestion path, and the stores.
//!
//! Each error maps to a stable [`ErrorKind`] so callers (and the HTTP layer)
//! can branch on the failure class without matching on message text.

use serde::Serialize;
use thiserror::Error;

// ---

/// Stable error classification exposed at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidEncoding,
    UnsupportedLength,
    MalformedPayload,
    TimestampFormatError,
    FieldCountMismatch,
    InvalidNumber,
    StorageError,
    NotFound,
    UnknownTopic,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidEncoding => "invalid_encoding",
            Self::UnsupportedLength => "unsupported_length",
            Self::MalformedPayload => "malformed_payload",
            Self::TimestampFormatError => "timestamp_format_error",
            Self::FieldCountMismatch => "field_count_mismatch",
            Self::InvalidNumber => "invalid_number",
            Self::StorageError => "storage_error",
            Self::NotFound => "not_found",
            Self::UnknownTopic => "unknown_topic",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a frame could not be turned into a [`crate::Reading`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid hex encoding: {0}")]
    InvalidEncoding(String),

    #[error("unsupported frame length: {len} bytes")]
    UnsupportedLength { len: usize },

    #[error("malformed payload: need {needed} bytes at offset {offset}, have {len}")]
    MalformedPayload {
        offset: usize,
        needed: usize,
        len: usize,
    },
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidEncoding(_) => ErrorKind::InvalidEncoding,
            Self::UnsupportedLength { .. } => ErrorKind::UnsupportedLength,
            Self::MalformedPayload { .. } => ErrorKind::MalformedPayload,
        }
    }
}

/// Persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("could not assign a test group label for '{0}' after repeated conflicts")]
    LabelConflict(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Database(_) | Self::LabelConflict(_) => ErrorKind::StorageError,
        }
    }

    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }
}

/// Failures while turning one transport message into stored rows.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("expected {expected} fields, got {actual}")]
    FieldCountMismatch { expected: &'static str, actual: usize },

    #[error("invalid timestamp '{0}', expected YYYY-MM-DD HH:MM:SS")]
    TimestampFormat(String),

    #[error("invalid number in field '{field}': '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("empty payload")]
    EmptyPayload,

    #[error("unhandled topic: {0}")]
    UnknownTopic(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FieldCountMismatch { .. } | Self::EmptyPayload => ErrorKind::FieldCountMismatch,
            Self::TimestampFormat(_) => ErrorKind::TimestampFormatError,
            Self::InvalidNumber { .. } => ErrorKind::InvalidNumber,
            Self::UnknownTopic(_) => ErrorKind::UnknownTopic,
            Self::Decode(e) => e.kind(),
            Self::Store(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_stable() {
        assert_eq!(
            DecodeError::UnsupportedLength { len: 3 }.kind().as_str(),
            "unsupported_length"
        );
        assert_eq!(
            IngestError::TimestampFormat("x".into()).kind(),
            ErrorKind::TimestampFormatError
        );
        assert_eq!(
            IngestError::from(StoreError::not_found("test group", "Test #9")).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::FieldCountMismatch).unwrap(),
            "\"field_count_mismatch\""
        );
    }
}
