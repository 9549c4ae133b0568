use std::io;
use thiserror::Error;

/// Failure to scan or read a zip archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The bytes are not a zip archive we can read.
    #[error("corrupt archive: {0}")]
    Corrupt(String),

    /// The raw byte source failed underneath us.
    #[error("failed to read archive source: {0}")]
    Source(#[source] io::Error),
}

impl ArchiveError {
    /// Classify an I/O error raised while reading archive bytes.
    ///
    /// Truncation and undecodable data mean a corrupt archive; any other
    /// kind comes from the source. An `ArchiveError` that was wrapped into an
    /// `io::Error` by [`EntryStream`](super::EntryStream) is unwrapped again.
    pub fn from_io(err: io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<ArchiveError>()) {
            if let Some(inner) = err.into_inner() {
                if let Ok(archive) = inner.downcast::<ArchiveError>() {
                    return *archive;
                }
            }
            return ArchiveError::Corrupt("unreadable entry".into());
        }

        match err.kind() {
            io::ErrorKind::UnexpectedEof => ArchiveError::Corrupt("unexpected end of archive".into()),
            io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => {
                ArchiveError::Corrupt(err.to_string())
            }
            _ => ArchiveError::Source(err),
        }
    }
}

impl From<io::Error> for ArchiveError {
    fn from(err: io::Error) -> Self {
        ArchiveError::from_io(err)
    }
}

impl From<ArchiveError> for io::Error {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Source(inner) => inner,
            corrupt => io::Error::new(io::ErrorKind::InvalidData, corrupt),
        }
    }
}
