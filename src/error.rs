use thiserror::Error;

/// Errors returned by [`WavlMap`](crate::WavlMap) operations.
///
/// None of them leave the map modified.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// An insertion found the key already present.
    #[error("key already present")]
    DuplicateKey,

    /// A deletion did not find the key.
    #[error("key not found")]
    KeyNotFound,

    /// A selection asked for a position outside `1..=len`.
    #[error("index {index} out of range for map of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
