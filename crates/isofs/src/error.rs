//! The error type returned by every fallible entry point of this crate.

use alloc::string::String;

/// Errors that can occur while parsing, mutating, or mastering an ISO image.
///
/// Every fallible call in this crate returns this single type rather than a
/// bare [`isofs_io::Error`], wrapping I/O errors behind a crate-level enum.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An API call was made before `new`/`open`, or after `close`.
    #[error("image is not initialized")]
    NotInitialized,

    /// `new`/`open` was called on an image that is already live.
    #[error("image is already initialized")]
    AlreadyInitialized,

    /// The byte stream being parsed violates an ECMA-119/SUSP/El-Torito
    /// invariant that this crate does not tolerate.
    #[error("malformed image: {0}")]
    MalformedImage(String),

    /// A caller-supplied argument was invalid for the operation attempted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The image or operation relies on a feature this crate does not implement.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Two non-associated siblings would share an identifier.
    #[error("duplicate directory entry: {0}")]
    Duplicate(String),

    /// The underlying byte source/sink failed.
    #[error(transparent)]
    Io(#[from] isofs_io::Error),
}

impl Error {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedImage(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn duplicate(msg: impl Into<String>) -> Self {
        Self::Duplicate(msg.into())
    }
}

pub type Result<T> = core::result::Result<T, Error>;
