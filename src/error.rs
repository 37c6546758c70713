//! Error taxonomy shared by every container in the crate.

use std::collections::TryReserveError;
use thiserror::Error;

/// Failure reported by a fallible container operation.
///
/// Every fallible operation reports exactly one of these. Closures handed to
/// `try_for_each`/`try_retain`/`map_into` and user policies report failure
/// with the same type; containers return those errors unchanged.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// A required input was zero-sized or otherwise unusable.
    #[error("invalid argument")]
    InvalidArgument,
    /// The call is structurally inconsistent with the receiver's state,
    /// e.g. reserving below the current length.
    #[error("data error")]
    Data,
    /// Index out of range.
    #[error("index out of range")]
    Index,
    /// An allocation failed, or no prime capacity is large enough.
    #[error("insufficient memory")]
    InsufficientMemory,
    /// A user-supplied copy policy reported failure.
    #[error("copy policy failed")]
    Copy,
    /// Two containers with incompatible element layouts were combined.
    #[error("incompatible element types")]
    Type,
    /// Lookup or removal of a key that is not present.
    #[error("missing key")]
    MissingKey,
    /// A count did not match what the caller expected.
    #[error("count mismatch")]
    Count,
    /// Unclassified failure.
    #[error("unknown error")]
    Unknown,
}

impl Error {
    /// Stable, machine-readable identifier for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::Data => "DATA_ERROR",
            Self::Index => "INDEX_ERROR",
            Self::InsufficientMemory => "INSUFFICIENT_MEMORY",
            Self::Copy => "COPY_ERROR",
            Self::Type => "TYPE_ERROR",
            Self::MissingKey => "MISSING_KEY",
            Self::Count => "COUNT_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::InsufficientMemory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn codes_are_distinct() {
        let all = [
            Error::InvalidArgument,
            Error::Data,
            Error::Index,
            Error::InsufficientMemory,
            Error::Copy,
            Error::Type,
            Error::MissingKey,
            Error::Count,
            Error::Unknown,
        ];
        let codes: BTreeSet<&str> = all.iter().map(Error::code).collect();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn reserve_failure_maps_to_insufficient_memory() {
        let mut v: Vec<u64> = Vec::new();
        let err = v.try_reserve(usize::MAX).unwrap_err();
        assert_eq!(Error::from(err), Error::InsufficientMemory);
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(Error::MissingKey.to_string(), "missing key");
        assert_eq!(Error::Index.to_string(), "index out of range");
    }
}
