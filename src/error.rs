//! Error types for decoding multipart file trees.
//!
//! Every fallible operation in the library returns [`Result<T>`], an alias for
//! `Result<T, Error>`.
//!
//! # Error Categories
//!
//! - **Protocol violations**: [`PushbackOccupied`], [`UndrainedChild`]
//! - **Malformed input**: [`MediaType`], [`Io`]
//! - **Usage errors**: [`NotADirectory`], [`NoCurrentEntry`], [`NotSupported`]
//!
//! Whether a part belongs to the directory being read is decided internally and never shows up
//! here.
//!
//! [`PushbackOccupied`]: Error::PushbackOccupied
//! [`UndrainedChild`]: Error::UndrainedChild
//! [`MediaType`]: Error::MediaType
//! [`Io`]: Error::Io
//! [`NotADirectory`]: Error::NotADirectory
//! [`NoCurrentEntry`]: Error::NoCurrentEntry
//! [`NotSupported`]: Error::NotSupported

use std::{io, sync::Arc};

use thiserror::Error;

use crate::mediatype::MediaTypeError;

/// Result type alias for operations that may return an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while decoding a multipart file tree.
///
/// The type is `Clone` so that an iterator which stopped on an error can keep reporting it.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A root directory was requested for a media type that is not a directory type.
    #[error("media type {0:?} is not a directory type")]
    NotADirectory(String),

    /// A `Content-Type` or `Content-Disposition` value could not be parsed.
    #[error(transparent)]
    MediaType(#[from] MediaTypeError),

    /// A part was pushed back while another one was still pending.
    #[error("cannot put back more than one part")]
    PushbackOccupied,

    /// Strict mode only: a part belongs to a subdirectory that was abandoned before it was drained.
    #[error("part {0:?} belongs to a subdirectory that was not drained")]
    UndrainedChild(String),

    /// The current entry was requested without a successful advance.
    #[error("no current entry")]
    NoCurrentEntry,

    /// The operation is not supported on a streaming node.
    #[error("operation not supported")]
    NotSupported,

    /// Reading from the underlying transport or a part body failed.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl Error {
    /// Returns the [`io::ErrorKind`] for I/O errors.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Error::Io(err) => Some(err.kind()),
            _ => None,
        }
    }
}
