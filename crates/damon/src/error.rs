#![forbid(unsafe_code)]

use config::Interface;
use std::path::PathBuf;
use std::time::Duration;

/// Malformed human readable quantity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid unit suffix `{suffix}` in `{text}`")]
    BadSuffix { text: String, suffix: String },

    #[error("Invalid magnitude in `{0}`")]
    BadMagnitude(String),
}

/// A key-value tree that cannot be turned back into an entity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("{entity}: missing required field `{field}`")]
    MissingField {
        entity: &'static str,
        field: &'static str,
    },

    #[error("{entity}: field `{field}` is not a {expected}")]
    UnexpectedShape {
        entity: &'static str,
        field: &'static str,
        expected: &'static str,
    },

    #[error("{entity}: invalid `{field}`: {source}")]
    Invalid {
        entity: &'static str,
        field: &'static str,
        #[source]
        source: ParseError,
    },

    #[error("Unknown {kind} `{value}`")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("{entity}: minimum {min} is larger than maximum {max}")]
    InvalidRange {
        entity: &'static str,
        min: u64,
        max: u64,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("DAMON {interface} interface does not support {operation}")]
    Unsupported {
        interface: Interface,
        operation: &'static str,
    },

    #[error("Failed to access {path}: {source}")]
    KernelIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected content in {path}: `{content}`")]
    KernelData { path: PathBuf, content: String },

    #[error("Failed to initialize DAMON: {0}")]
    Initialization(#[source] Box<Error>),

    #[error("Kdamonds {names:?} were not turned {state} within {elapsed:?}")]
    Timeout {
        names: Vec<String>,
        state: crate::model::KdamondState,
        elapsed: Duration,
    },

    #[error("Waiting for kdamonds to be turned {0} was cancelled")]
    Cancelled(crate::model::KdamondState),

    #[error("No kdamond named `{0}`")]
    NoSuchKdamond(String),

    #[error("Root permission is required to control DAMON")]
    PermissionDenied,
}

impl Error {
    pub(crate) fn kernel_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::KernelIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn kernel_data(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self::KernelData {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Whether the failure leaves the whole tool unusable, as opposed to
    /// failing only the operation that returned it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Initialization(_) | Self::PermissionDenied)
    }
}
