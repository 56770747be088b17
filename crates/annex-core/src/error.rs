//! Error taxonomy shared by every store operation.

use std::path::{Path, PathBuf};

/// Errors from annex operations.
///
/// Absence of an object is not an error at the backend level: `get` returns
/// `Ok(false)`. `NotFound` is only raised by callers that need the content.
#[derive(Debug, thiserror::Error)]
pub enum AnnexError {
    /// The object is absent from every configured store.
    #[error("object {0} not found in annex")]
    NotFound(String),

    /// Filesystem failure on a specific path.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Network failure or non-success HTTP status other than 404.
    #[error("failed to fetch {target}: {reason}")]
    Transport { target: String, reason: String },

    /// The backend structurally cannot perform this operation.
    #[error("'{operation}' is not supported by the {backend} annex")]
    Unsupported {
        operation: &'static str,
        backend: &'static str,
    },

    /// An insertion time in a sidecar matches no known shape.
    #[error("unknown date format in metadata of {object}: {value}")]
    MalformedMetadata { object: String, value: String },

    /// A sidecar that is not a valid metadata document.
    #[error("cannot parse metadata {}: {reason}", path.display())]
    Metadata { path: PathBuf, reason: String },

    /// Text that is not a 32 or 64 character hex digest.
    #[error("invalid object identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias for annex operations.
pub type AnnexResult<T> = Result<T, AnnexError>;

impl AnnexError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        AnnexError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn unsupported(operation: &'static str, backend: &'static str) -> Self {
        AnnexError::Unsupported { operation, backend }
    }

    /// Process exit status for this error, errno-style.
    pub fn exit_code(&self) -> i32 {
        match self {
            AnnexError::Unsupported { .. } => 95, // ENOTSUP
            AnnexError::NotFound(_) => 2,         // ENOENT
            AnnexError::Config(_) | AnnexError::InvalidIdentifier(_) => 22, // EINVAL
            _ => 1,
        }
    }
}
