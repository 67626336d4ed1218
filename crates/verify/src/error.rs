//! Error types for the verification engine.
//!
//! Every failure is fatal to the scenario that raised it. The variants map
//! one-to-one onto the failure classes a run can report:
//!
//! | Variant | Raised by | Meaning |
//! |---------|-----------|---------|
//! | `Transport` | clients | connection failure, timeout or non-2xx status |
//! | `UnexpectedResponse` | clients | 2xx body without the expected shape |
//! | `CountMismatch` | scenarios | origin and proxy disagree on a count |
//! | `ConvergenceTimeout` | poller | deadline elapsed before the condition held |
//! | `AuditFieldMismatch` | comparator | an audit field failed its projection check |
//! | `MalformedFixture` | fixture model | expected-audit fixture has the wrong shape |
//! | `FixtureIo` / `FixtureParse` | loader | fixture file unreadable or not JSON |
//! | `InvalidPollPolicy` | poller | deadline/interval combination rejected |

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::path::PathBuf;

use thiserror::Error;

use crate::audit::AuditFieldMismatch;

/// The error type for all verification operations.
#[derive(Error, Debug)]
pub enum VerifyError {
    /// HTTP-layer failure. Never retried by the engine itself.
    #[error("transport error calling {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    /// The backend answered successfully but the body is not usable.
    #[error("unexpected response from {endpoint}: {message}")]
    UnexpectedResponse { endpoint: String, message: String },

    /// Origin server and proxy report different counts.
    #[error(
        "number of {resource_type} resources for {patient_id} do not match: server {server}, proxy {proxy}"
    )]
    CountMismatch {
        resource_type: String,
        patient_id: String,
        server: u64,
        proxy: u64,
    },

    /// A poll deadline elapsed without the condition holding.
    #[error(
        "condition '{expectation}' not reached after {attempts} attempts ({waited_secs}s); last observed {last_observed}"
    )]
    ConvergenceTimeout {
        expectation: String,
        last_observed: String,
        attempts: u32,
        waited_secs: u64,
    },

    /// An audit-event field failed comparison.
    #[error(transparent)]
    AuditFieldMismatch(#[from] AuditFieldMismatch),

    /// Expected-audit fixture is not a list of objects, or is too short.
    #[error("malformed audit fixture {source_name}: {reason}")]
    MalformedFixture { source_name: String, reason: String },

    /// Fixture file could not be read.
    #[error("failed to read fixture {}: {source}", .path.display())]
    FixtureIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fixture file is not valid JSON.
    #[error("failed to parse fixture {}: {source}", .path.display())]
    FixtureParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Poll deadline/interval combination rejected.
    #[error("invalid poll policy: {reason}")]
    InvalidPollPolicy { reason: String },
}

/// Result type for verification operations.
pub type VerifyResult<T> = Result<T, VerifyError>;

impl From<reqwest::Error> for VerifyError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|url| url.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        VerifyError::Transport {
            endpoint,
            message: err.to_string(),
        }
    }
}

impl VerifyError {
    /// Returns true for failures caused by the backend being unreachable or
    /// answering with an error status.
    pub fn is_transport(&self) -> bool {
        matches!(self, VerifyError::Transport { .. })
    }

    /// Returns true if this error is an audit-field comparison failure.
    pub fn is_audit_mismatch(&self) -> bool {
        matches!(self, VerifyError::AuditFieldMismatch(_))
    }
}
