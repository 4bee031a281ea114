use std::fmt;

use thiserror::Error;

/// Errors that can occur when operating on the containers in this crate.
///
/// Every error is reported before any state is modified, so the container that returned it is
/// left exactly as it was before the call.
#[derive(Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The caller asked for a key that is not present in the container.
    #[error("key not found")]
    KeyNotFound,

    /// The caller tried to add a key that is already present in the container.
    #[error("key already present")]
    DuplicateKey,

    /// The caller tried to shrink a [`Sparse2D`][crate::Sparse2D] in a way that would discard
    /// a row or column that still holds items.
    #[error("cannot remove {axis} {index} because it still holds items")]
    LineNotEmpty {
        /// Whether the offending line is a row or a column.
        axis: Axis,

        /// Index of the first offending line.
        index: usize,
    },
}

/// Identifies one of the two directions of a [`Sparse2D`][crate::Sparse2D].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[expect(clippy::exhaustive_enums, reason = "a plane has exactly two axes")]
pub enum Axis {
    /// A horizontal line, addressed by the first coordinate.
    Row,

    /// A vertical line, addressed by the second coordinate.
    Column,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Row => write!(f, "row"),
            Self::Column => write!(f, "column"),
        }
    }
}

/// A specialized `Result` type for container operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn line_not_empty_mentions_axis_and_index() {
        let error = Error::LineNotEmpty {
            axis: Axis::Column,
            index: 7,
        };

        assert_eq!(
            error.to_string(),
            "cannot remove column 7 because it still holds items"
        );
    }

    #[test]
    fn key_errors_are_distinct() {
        assert_ne!(Error::KeyNotFound, Error::DuplicateKey);

        let result: Result<()> = Err(Error::KeyNotFound);
        assert_eq!(result, Err(Error::KeyNotFound));
    }
}
