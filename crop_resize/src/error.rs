//! Error types for crop-and-resize operations.

use thiserror::Error;

/// Errors surfaced by the crop-and-resize ops.
///
/// Every failure is reported once for the whole call; none are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed shapes, non-positive dimensions or a wrong method string.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A box index references a batch position outside `[0, batch_size)`.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// The compute stage itself failed.
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub(crate) fn box_index_out_of_range() -> Self {
        Error::OutOfRange("box_index has values outside [0, batch_size)".to_string())
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }

    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Error::OutOfRange(_))
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Internal(_))
    }
}
