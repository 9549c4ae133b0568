use flate2::Crc;
use flate2::bufread::DeflateDecoder;
use std::io::{self, BufRead, BufReader, Read, Take};

use super::error::ArchiveError;
use super::structures::{CompressionMethod, DataDescriptor, LocalFileHeader};

/// Decompression state for the matched entry.
///
/// Both variants read through a [`Take`] over the buffered source, capped at
/// the entry's compressed size when the header knows it. With deferred sizes
/// the DEFLATE stream itself marks the end.
enum Payload<R> {
    Stored(Take<BufReader<R>>),
    Deflated(DeflateDecoder<Take<BufReader<R>>>),
}

impl<R: Read> Payload<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Payload::Stored(reader) => reader.read(buf),
            Payload::Deflated(decoder) => decoder.read(buf),
        }
    }

    /// Bytes still allowed through the cap.
    fn remaining(&self) -> u64 {
        match self {
            Payload::Stored(reader) => reader.limit(),
            Payload::Deflated(decoder) => decoder.get_ref().limit(),
        }
    }

    /// Buffered source positioned right after the consumed payload.
    fn source(&mut self) -> &mut BufReader<R> {
        match self {
            Payload::Stored(reader) => reader.get_mut(),
            Payload::Deflated(decoder) => decoder.get_mut().get_mut(),
        }
    }
}

struct OpenEntry<R> {
    payload: Payload<R>,
    /// Cap the payload reader started with
    limit: u64,
    header: LocalFileHeader,
    crc: Crc,
    produced: u64,
    finished: bool,
    /// Set once the entry failed verification; every later read repeats it.
    failed: Option<String>,
}

impl<R: Read> OpenEntry<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(reason) = &self.failed {
            return Err(ArchiveError::Corrupt(reason.clone()).into());
        }
        if self.finished || buf.is_empty() {
            return Ok(0);
        }

        let n = self.payload.read(buf)?;
        if n == 0 {
            if let Err(e) = self.verify() {
                return Err(self.fail(e));
            }
            self.finished = true;
            return Ok(0);
        }

        self.crc.update(&buf[..n]);
        self.produced += n as u64;
        if !self.header.has_data_descriptor() && self.produced > self.header.uncompressed_size {
            let err = ArchiveError::Corrupt(format!(
                "entry {} inflates past its declared size",
                self.header.name_lossy()
            ));
            return Err(self.fail(err));
        }
        Ok(n)
    }

    fn fail(&mut self, err: ArchiveError) -> io::Error {
        if let ArchiveError::Corrupt(reason) = &err {
            self.failed = Some(reason.clone());
        }
        err.into()
    }

    /// Check the decompressed bytes against the header or trailing descriptor.
    fn verify(&mut self) -> Result<(), ArchiveError> {
        let consumed = self.limit - self.payload.remaining();
        let (expected_crc, expected_compressed, expected_size) =
            if self.header.has_data_descriptor() {
                let descriptor =
                    DataDescriptor::read_from(self.payload.source(), self.header.is_zip64)?;
                (
                    descriptor.crc32,
                    descriptor.compressed_size,
                    descriptor.uncompressed_size,
                )
            } else {
                (
                    self.header.crc32,
                    self.header.compressed_size,
                    self.header.uncompressed_size,
                )
            };

        if consumed != expected_compressed {
            return Err(ArchiveError::Corrupt(format!(
                "entry {} occupies {} bytes but declares {}",
                self.header.name_lossy(),
                consumed,
                expected_compressed
            )));
        }

        if self.produced != expected_size {
            return Err(ArchiveError::Corrupt(format!(
                "entry {} ended after {} of {} bytes",
                self.header.name_lossy(),
                self.produced,
                expected_size
            )));
        }
        if self.crc.sum() != expected_crc {
            return Err(ArchiveError::Corrupt(format!(
                "CRC mismatch in entry {}",
                self.header.name_lossy()
            )));
        }
        Ok(())
    }
}

/// Forward-only reader over one matched archive entry.
///
/// Owns the raw source it was opened over. Reads decompress lazily and
/// stop at the entry boundary; the next entry's bytes are never returned.
/// When the payload is exhausted the CRC-32 and size are checked and a
/// mismatch surfaces as an [`io::ErrorKind::InvalidData`] error carrying an
/// [`ArchiveError::Corrupt`].
///
/// [`close`](Self::close) releases the decoder and the source. It may be
/// called any number of times; reads after closing report end of stream.
/// Dropping the stream closes it.
pub struct EntryStream<R> {
    name: String,
    uncompressed_size: Option<u64>,
    entry: Option<OpenEntry<R>>,
}

impl<R: Read> EntryStream<R> {
    /// Bind a stream to the entry whose header was just read from `reader`.
    pub(crate) fn new(
        reader: BufReader<R>,
        header: LocalFileHeader,
    ) -> Result<Self, ArchiveError> {
        if header.is_encrypted() {
            return Err(ArchiveError::Corrupt(format!(
                "entry {} is encrypted",
                header.name_lossy()
            )));
        }

        let limit = if header.has_data_descriptor() {
            u64::MAX
        } else {
            header.compressed_size
        };

        let payload = match header.compression_method {
            CompressionMethod::Stored if header.has_data_descriptor() => {
                return Err(ArchiveError::Corrupt(format!(
                    "stored entry {} has no size in its header",
                    header.name_lossy()
                )));
            }
            CompressionMethod::Stored => Payload::Stored(reader.take(limit)),
            CompressionMethod::Deflate => Payload::Deflated(DeflateDecoder::new(reader.take(limit))),
            CompressionMethod::Unknown(method) => {
                return Err(ArchiveError::Corrupt(format!(
                    "entry {} uses unsupported compression method {}",
                    header.name_lossy(),
                    method
                )));
            }
        };

        let uncompressed_size = (!header.has_data_descriptor()).then_some(header.uncompressed_size);

        Ok(Self {
            name: header.name_lossy(),
            uncompressed_size,
            entry: Some(OpenEntry {
                payload,
                limit,
                header,
                crc: Crc::new(),
                produced: 0,
                finished: false,
                failed: None,
            }),
        })
    }

    /// Name of the matched entry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decompressed length, when the local header declares it.
    pub fn uncompressed_size(&self) -> Option<u64> {
        self.uncompressed_size
    }

    /// Release the decompression state and the raw source.
    pub fn close(&mut self) {
        self.entry = None;
    }

    pub fn is_closed(&self) -> bool {
        self.entry.is_none()
    }
}

impl<R: Read> Read for EntryStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.entry.as_mut() {
            Some(entry) => entry.read(buf),
            None => Ok(0),
        }
    }
}

impl<R> std::fmt::Debug for EntryStream<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStream")
            .field("name", &self.name)
            .field("uncompressed_size", &self.uncompressed_size)
            .field("closed", &self.entry.is_none())
            .finish()
    }
}

/// Consume the payload of an entry that did not match.
pub(crate) fn skip_payload<R: BufRead>(
    reader: &mut R,
    header: &LocalFileHeader,
) -> Result<(), ArchiveError> {
    if !header.has_data_descriptor() {
        let mut payload = (&mut *reader).take(header.compressed_size);
        let skipped = io::copy(&mut payload, &mut io::sink())?;
        if skipped < header.compressed_size {
            return Err(ArchiveError::Corrupt(format!(
                "entry {} is truncated",
                header.name_lossy()
            )));
        }
        return Ok(());
    }

    match header.compression_method {
        CompressionMethod::Deflate if !header.is_encrypted() => {
            let mut decoder = DeflateDecoder::new(&mut *reader);
            io::copy(&mut decoder, &mut io::sink())?;
        }
        _ => {
            return Err(ArchiveError::Corrupt(format!(
                "cannot find the end of entry {} without its size",
                header.name_lossy()
            )));
        }
    }

    DataDescriptor::read_from(reader, header.is_zip64)?;
    Ok(())
}
