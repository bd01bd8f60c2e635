// src/error.rs  -  Ingestion + transport error taxonomy
use thiserror::Error;

/// Coarse classification used by the ingestion pipeline to decide how loudly
/// to log a rejected row. Neither kind halts the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed row: missing field, bad range, unparsable value.
    Validation,
    /// Well-formed row that would break a store invariant if kept.
    StateInvariantViolation,
}

/// Why a report or participant row was refused at ingestion time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("{field} out of range: {value} (expected {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min:   i64,
        max:   i64,
    },

    #[error("invalid callsign {0:?}")]
    InvalidCallsign(String),

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("invalid coordinates lat={lat} lng={lng}")]
    InvalidCoordinates { lat: f64, lng: f64 },

    #[error("{0} cannot report hearing itself")]
    SelfReport(String),

    #[error("row for {found} does not belong to {expected}")]
    OutOfScope { expected: String, found: String },
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::SelfReport(_) | IngestError::OutOfScope { .. } => {
                ErrorKind::StateInvariantViolation
            }
            _ => ErrorKind::Validation,
        }
    }
}

/// Failures of the persistence / realtime collaborator. Surfaced to the
/// caller; the core never retries on its own.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("bulk fetch failed: {0}")]
    Fetch(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("insert failed: {0}")]
    Insert(String),

    #[error("change stream disconnected")]
    Disconnected,
}

/// Submitting a new report: refused locally, or the insert call failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] IngestError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
