//! Error taxonomy for block ingestion.

use crate::{rpc::TransportError, verify::EncodeError};

/// Fatal ingestion errors.
///
/// Local per-block defects (missing receipts, pruned traces, root mismatches on
/// enrichment data) never surface here; they truncate the batch instead.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Network failure that survived retries and bisection.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The server answered a call with an error the call site does not tolerate.
    #[error("{method} failed with rpc error {code}: {message}")]
    Rpc {
        method: &'static str,
        code: i64,
        message: String,
    },
    /// A response did not match the shape the call site expects.
    #[error("malformed {method} response: {reason}")]
    Validation {
        method: &'static str,
        reason: String,
    },
    /// Cross-field consistency broke inside a block that was otherwise served.
    #[error("data invariant violated: {0}")]
    Invariant(String),
    /// A transaction or receipt kind the verification engine does not know.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl IngestError {
    pub(crate) fn invariant(reason: impl Into<String>) -> Self {
        Self::Invariant(reason.into())
    }
}
