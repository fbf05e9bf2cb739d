//! The single error type threaded through every collaborator trait and the
//! bridge itself.

use thiserror::Error;

/// Errors raised anywhere in the content store bridge or its collaborators.
///
/// Variants mirror a gRPC-style status taxonomy rather than wrapping every
/// possible I/O failure individually: callers across an async boundary need
/// to branch on *kind*, not on the originating library's error type.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A digest or CID named a hash algorithm this store does not support.
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A digest string failed to parse (wrong length, bad hex, wrong prefix).
    #[error("malformed digest: {0}")]
    MalformedDigest(String),

    /// A CID string or byte sequence failed to parse or decode.
    #[error("malformed cid: {0}")]
    MalformedCid(String),

    /// The requested blob, manifest, or name does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An ingest was started for a digest that is already present.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The operation's preconditions were not met (size/digest mismatch on
    /// commit, write after close, etc).
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// The operation was cancelled by its caller or superseded by a newer one.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The operation is recognised but deliberately not implemented (e.g.
    /// Docker Schema 1 manifests, `Update`).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A read or stat was attempted against a directory-shaped entry.
    #[error("is a directory: {0}")]
    IsDirectory(String),

    /// A `ReaderAt` offset fell outside `[0, size)` or moved backward.
    #[error("invalid offset: {0}")]
    InvalidOffset(String),

    /// Underlying I/O failure (local disk, pipe, temp file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by the remote peer/transport collaborator.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BridgeError>;
