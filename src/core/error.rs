//! Errors surfaced by `OrderedArray` operations.

use thiserror::Error;

use crate::ports::TableError;

/// Errors from array operations
#[derive(Debug, Error)]
pub enum ArrayError {
    /// A position or amount argument could not be coerced to a non-negative integer
    #[error("{what} must be a non-negative integer, got {input:?}")]
    InvalidArgument { what: &'static str, input: String },

    /// `push` found the highest position already at `usize::MAX`
    #[error("array is full: highest position is usize::MAX")]
    PositionOverflow,

    /// The backing table failed
    #[error("table error: {0}")]
    Table(#[from] TableError),

    /// A value could not be converted to or from its stored form
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A background snapshot rebuild panicked or was cancelled
    #[error("snapshot refresh failed: {0}")]
    Refresh(#[from] tokio::task::JoinError),
}

impl ArrayError {
    pub(crate) fn invalid(what: &'static str, input: impl ToString) -> Self {
        ArrayError::InvalidArgument {
            what,
            input: input.to_string(),
        }
    }

    /// True for argument errors, which are never worth retrying
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, ArrayError::InvalidArgument { .. })
    }
}

pub type ArrayResult<T> = Result<T, ArrayError>;
