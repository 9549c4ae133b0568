//! Failures of a resolve-and-stream request.
//!
//! Every variant is terminal for the request; nothing is retried.

use std::io;
use thiserror::Error;

use crate::zip::ArchiveError;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid URL segments or query parameters.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The attachment backend refused the caller.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The wiki page or the attachment does not exist.
    #[error("not found: {0}")]
    DocumentNotFound(String),

    /// The archive has no entry with the requested name.
    #[error("entry {0} not found in archive")]
    EntryNotFound(String),

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// Reading the attachment's bytes failed.
    #[error("attachment unavailable: {0}")]
    SourceUnavailable(#[source] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<ArchiveError> for Error {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Corrupt(msg) => Error::CorruptArchive(msg),
            ArchiveError::Source(e) => Error::SourceUnavailable(e),
        }
    }
}
