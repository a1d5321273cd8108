//! Error kinds per the scraper's error-handling policy: `Extract` errors are
//! recovered locally (logged, sub-record skipped); everything else unwinds to
//! the progression controller.

use std::path::PathBuf;

/// Top-level error type for every fallible operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Transport or decode failure of an RPC call. Recoverable by the
    /// controller: retried on the next iteration.
    #[error("rpc call failed: {0}")]
    Rpc(#[from] RpcError),

    /// Malformed trace/log shape. Logged and the offending sub-record is
    /// skipped; never aborts the whole block.
    #[error("failed to extract appearance: {0}")]
    Extract(#[from] ExtractError),

    /// Filesystem failure while writing ripe/staging/finalized/ts.bin. Aborts
    /// the current batch and triggers temp-folder cleanup.
    #[error("io error at {path}: {source}")]
    Io {
        /// Path the failing operation was acting on.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Post-pipeline check found missing blocks in the requested range.
    #[error("integrity check failed: {missing} block(s) in [{start}, {end}) produced no ripe file")]
    Integrity {
        /// First block of the requested range.
        start: u64,
        /// One past the last block of the requested range.
        end: u64,
        /// Count of blocks with no ripe/unripe file.
        missing: usize,
    },

    /// The controller was invoked with invalid configuration. Fatal.
    #[error("invalid configuration: {0}")]
    Usage(String),
}

impl IndexError {
    /// Wraps a plain I/O error with the path that triggered it.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors the controller should retry after its normal sleep,
    /// as opposed to ones that should end the process.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexError::Rpc(_))
    }
}

/// Errors from the RPC client.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The underlying HTTP/JSON-RPC transport failed.
    #[error("transport error calling {method}: {message}")]
    Transport {
        /// JSON-RPC method that failed.
        method: &'static str,
        /// Error message from the transport layer.
        message: String,
    },
    /// The response could not be decoded into the expected shape.
    #[error("failed to decode response from {method}: {message}")]
    Decode {
        /// JSON-RPC method whose response failed to decode.
        method: &'static str,
        /// Decode error message.
        message: String,
    },
}

/// Errors surfaced while extracting appearances from a single trace or log.
/// These are always recovered locally — see the module docs.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// A trace's `type` field did not match any of `call`/`reward`/`suicide`/`create`.
    #[error("unknown trace type: {0}")]
    UnknownTraceType(String),
    /// A reward trace's `rewardType` did not match `block`/`uncle`/`external`.
    #[error("unknown reward type: {0}")]
    UnknownRewardType(String),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, IndexError>;
