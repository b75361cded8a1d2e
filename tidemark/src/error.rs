//! Error types for the tidemark telemetry cache.

use thiserror::Error;

use crate::bounds::Bounds;
use crate::channel::ChannelKey;
use crate::series::DataType;

/// The main error type for all cache operations.
///
/// The taxonomy follows the cache's failure model: registry errors are misuse
/// (programmer bugs, never retried), integrity errors are corruption (fatal
/// and expected to be unreachable), series errors are construction-time
/// validation failures, and retrieval errors are external failures surfaced
/// unchanged from the channel metadata collaborator.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Misuse of the cache registry.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Invalid series construction.
    #[error("series error: {0}")]
    Series(#[from] SeriesError),

    /// Corruption of the static cache's stored state.
    #[error("cache integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    /// Channel metadata retrieval failed. The underlying error is passed
    /// through from the external retriever without interpretation or retry.
    #[error("channel retrieval failed: {0}")]
    Retrieval(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CacheError {
    /// Wraps an external retriever error.
    ///
    /// Intended for [`ChannelRetriever`](crate::channel::ChannelRetriever)
    /// implementations surfacing transport or decoding failures.
    pub fn retrieval(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Retrieval(Box::new(err))
    }
}

/// Misuse errors raised by the cache registry.
///
/// These indicate a caller bug, not a recoverable I/O condition: callers must
/// populate a channel before reading it and must not touch a closed registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No cache entry exists for the requested channel. Callers must invoke
    /// `populate_missing` for a key before calling `get` on it.
    #[error("missing cache entry for channel {key}")]
    EntryNotFound {
        /// The channel key that was never populated.
        key: ChannelKey,
    },

    /// The registry was used after `close()`.
    #[error("cache registry used after close")]
    Closed,
}

/// Errors raised when constructing a series from raw sample bytes.
#[derive(Error, Debug)]
pub enum SeriesError {
    /// The raw buffer length is not a whole number of samples.
    #[error(
        "buffer of {byte_len} bytes is not a whole number of {data_type} samples \
         (element width {width})"
    )]
    UnalignedBuffer {
        /// The offending buffer length in bytes.
        byte_len: usize,
        /// The declared sample type.
        data_type: DataType,
        /// The element width of that type in bytes.
        width: usize,
    },
}

/// Fatal corruption errors raised by the static cache's integrity check.
///
/// A correct insertion plan can never produce overlapping stored bounds, so
/// this error is a canary for plan-computation bugs rather than a normal
/// runtime path.
#[derive(Error, Debug)]
pub enum IntegrityError {
    /// Two stored series occupy overlapping (or out-of-order) alignment
    /// bounds.
    #[error("invalid cache state: stored bounds {a} and {b} overlap or are out of order")]
    OverlappingBounds {
        /// Bounds of the earlier stored entry.
        a: Bounds,
        /// Bounds of the later stored entry.
        b: Bounds,
    },
}

/// Type alias for `Result<T, CacheError>`.
pub type Result<T> = std::result::Result<T, CacheError>;
