//! Sequential lookup of one named entry.
//!
//! The archive is consumed front to back as a stream of local file headers,
//! the way an unzip pipe reads it. The central directory at the tail is never
//! consulted: reaching it simply means no entry matched.

use std::io::{BufReader, Read};
use tracing::{debug, trace};

use super::entry::{EntryStream, skip_payload};
use super::error::ArchiveError;
use super::structures::*;

/// Read buffer for the raw source; also the granularity of source reads.
const SOURCE_BUFFER_SIZE: usize = 32 * 1024;

/// Result of looking an entry up by name.
pub enum Lookup<R> {
    /// Stream positioned at the start of the entry's decompressed content.
    Found(EntryStream<R>),
    /// No entry carries the requested name. The source has been released.
    NotFound(String),
}

impl<R> Lookup<R> {
    pub fn found(self) -> Option<EntryStream<R>> {
        match self {
            Lookup::Found(stream) => Some(stream),
            Lookup::NotFound(_) => None,
        }
    }
}

impl<R> std::fmt::Debug for Lookup<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lookup::Found(stream) => f.debug_tuple("Found").field(stream).finish(),
            Lookup::NotFound(path) => f.debug_tuple("NotFound").field(path).finish(),
        }
    }
}

/// Scan `source` for the first entry named exactly `inner_path`.
///
/// Names are compared byte-for-byte, without normalisation or case folding.
/// Entries before the match are skipped without being buffered; the match
/// itself is not read until the returned stream is.
///
/// # Errors
///
/// [`ArchiveError::Corrupt`] when the input is not a readable zip stream,
/// including input that does not start with a zip signature at all.
/// [`ArchiveError::Source`] when the source fails while being read.
pub fn open<R: Read>(source: R, inner_path: &str) -> Result<Lookup<R>, ArchiveError> {
    let mut reader = BufReader::with_capacity(SOURCE_BUFFER_SIZE, source);
    let mut scanned = 0usize;

    loop {
        let Some(signature) = read_signature(&mut reader, scanned == 0)? else {
            debug!(scanned, inner_path, "archive ended without central directory");
            return Ok(Lookup::NotFound(inner_path.to_string()));
        };

        if &signature[..] == CDFH_SIGNATURE || &signature[..] == EOCD_SIGNATURE {
            debug!(scanned, inner_path, "reached central directory without a match");
            return Ok(Lookup::NotFound(inner_path.to_string()));
        }
        if &signature[..] != LFH_SIGNATURE {
            return Err(ArchiveError::Corrupt(if scanned == 0 {
                "not a zip archive".to_string()
            } else {
                format!("unexpected signature after entry {scanned}")
            }));
        }

        let header = LocalFileHeader::read_from(&mut reader)?;
        scanned += 1;

        if header.file_name == inner_path.as_bytes() {
            debug!(
                entry = %header.name_lossy(),
                method = header.compression_method.as_u16(),
                deferred_sizes = header.has_data_descriptor(),
                "matched archive entry"
            );
            return EntryStream::new(reader, header).map(Lookup::Found);
        }

        trace!(entry = %header.name_lossy(), "skipping archive entry");
        skip_payload(&mut reader, &header)?;
    }
}

/// Read the next 4-byte record signature.
///
/// `None` on a clean end of input between entries. An empty source is not
/// an archive.
fn read_signature<R: Read>(
    reader: &mut BufReader<R>,
    at_start: bool,
) -> Result<Option<[u8; 4]>, ArchiveError> {
    let mut signature = [0u8; 4];
    let mut filled = 0;

    while filled < signature.len() {
        match reader.read(&mut signature[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ArchiveError::from_io(e)),
        }
    }

    match filled {
        4 => Ok(Some(signature)),
        0 if !at_start => Ok(None),
        0 => Err(ArchiveError::Corrupt("empty archive source".into())),
        _ => Err(ArchiveError::Corrupt("truncated record signature".into())),
    }
}
