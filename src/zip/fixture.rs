//! In-memory archives and instrumented sources for tests.

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::structures::{
    CDFH_SIGNATURE, CompressionMethod, DATA_DESCRIPTOR_SIGNATURE, EOCD_SIGNATURE, LFH_SIGNATURE,
};

const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// Writes a zip archive the way common tools lay it out: local headers and
/// payloads, then the central directory and its end record.
#[derive(Default)]
pub struct ArchiveBuilder {
    body: Vec<u8>,
    central: Vec<u8>,
    entries: u16,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(mut self, name: &str, data: &[u8]) -> Self {
        self.entry(name, CompressionMethod::Stored, 0, data, data.to_vec());
        self
    }

    pub fn deflated(mut self, name: &str, data: &[u8]) -> Self {
        self.entry(name, CompressionMethod::Deflate, 0, data, deflate(data));
        self
    }

    /// Deflated entry whose CRC and sizes trail the payload.
    pub fn deflated_streaming(mut self, name: &str, data: &[u8]) -> Self {
        self.entry(
            name,
            CompressionMethod::Deflate,
            FLAG_DATA_DESCRIPTOR,
            data,
            deflate(data),
        );
        self
    }

    /// Deflated entry whose trailing descriptor misstates the compressed size.
    pub fn deflated_streaming_bad_size(mut self, name: &str, data: &[u8]) -> Self {
        self = self.deflated_streaming(name, data);
        let csize_at = self.body.len() - 8;
        self.body[csize_at] = self.body[csize_at].wrapping_add(1);
        self
    }

    /// Deflated entry whose header claims a CRC that does not match.
    pub fn deflated_bad_crc(mut self, name: &str, data: &[u8]) -> Self {
        let start = self.body.len();
        self.entry(name, CompressionMethod::Deflate, 0, data, deflate(data));
        let crc_at = start + 14;
        self.body[crc_at] ^= 0xFF;
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        let cd_offset = self.body.len() as u32;
        let cd_size = self.central.len() as u32;
        self.body.extend_from_slice(&self.central);

        self.body.extend_from_slice(EOCD_SIGNATURE);
        self.body.write_u16::<LittleEndian>(0).unwrap();
        self.body.write_u16::<LittleEndian>(0).unwrap();
        self.body.write_u16::<LittleEndian>(self.entries).unwrap();
        self.body.write_u16::<LittleEndian>(self.entries).unwrap();
        self.body.write_u32::<LittleEndian>(cd_size).unwrap();
        self.body.write_u32::<LittleEndian>(cd_offset).unwrap();
        self.body.write_u16::<LittleEndian>(0).unwrap();
        self.body
    }

    fn entry(
        &mut self,
        name: &str,
        method: CompressionMethod,
        flags: u16,
        data: &[u8],
        payload: Vec<u8>,
    ) {
        let offset = self.body.len() as u32;
        let crc = crc32(data);
        let deferred = flags & FLAG_DATA_DESCRIPTOR != 0;
        let (header_crc, header_csize, header_usize) = if deferred {
            (0, 0, 0)
        } else {
            (crc, payload.len() as u32, data.len() as u32)
        };

        let out = &mut self.body;
        out.extend_from_slice(LFH_SIGNATURE);
        out.write_u16::<LittleEndian>(20).unwrap();
        out.write_u16::<LittleEndian>(flags).unwrap();
        out.write_u16::<LittleEndian>(method.as_u16()).unwrap();
        out.write_u16::<LittleEndian>(0x6000).unwrap();
        out.write_u16::<LittleEndian>(0x5821).unwrap();
        out.write_u32::<LittleEndian>(header_crc).unwrap();
        out.write_u32::<LittleEndian>(header_csize).unwrap();
        out.write_u32::<LittleEndian>(header_usize).unwrap();
        out.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&payload);

        if deferred {
            out.extend_from_slice(DATA_DESCRIPTOR_SIGNATURE);
            out.write_u32::<LittleEndian>(crc).unwrap();
            out.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
            out.write_u32::<LittleEndian>(data.len() as u32).unwrap();
        }

        let cd = &mut self.central;
        cd.extend_from_slice(CDFH_SIGNATURE);
        cd.write_u16::<LittleEndian>(20).unwrap();
        cd.write_u16::<LittleEndian>(20).unwrap();
        cd.write_u16::<LittleEndian>(flags).unwrap();
        cd.write_u16::<LittleEndian>(method.as_u16()).unwrap();
        cd.write_u16::<LittleEndian>(0x6000).unwrap();
        cd.write_u16::<LittleEndian>(0x5821).unwrap();
        cd.write_u32::<LittleEndian>(crc).unwrap();
        cd.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
        cd.write_u32::<LittleEndian>(data.len() as u32).unwrap();
        cd.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u32::<LittleEndian>(0).unwrap();
        cd.write_u32::<LittleEndian>(offset).unwrap();
        cd.extend_from_slice(name.as_bytes());

        self.entries += 1;
    }
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(data);
    crc.sum()
}

/// Compressible test payload that is not a single repeated byte.
pub fn sample(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) % 97)
        .collect()
}

/// Source that counts how often it has been dropped.
pub struct TrackedSource {
    inner: Cursor<Vec<u8>>,
    drops: Arc<AtomicUsize>,
}

impl TrackedSource {
    pub fn new(bytes: Vec<u8>) -> (Self, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        let source = Self {
            inner: Cursor::new(bytes),
            drops: drops.clone(),
        };
        (source, drops)
    }
}

impl Read for TrackedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Drop for TrackedSource {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Source that fails with a connection error after `limit` bytes.
pub struct FailingSource {
    inner: Cursor<Vec<u8>>,
    limit: u64,
}

impl FailingSource {
    pub fn new(bytes: Vec<u8>, limit: u64) -> Self {
        Self {
            inner: Cursor::new(bytes),
            limit,
        }
    }
}

impl Read for FailingSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.limit.saturating_sub(self.inner.position());
        if remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "backend went away"));
        }
        let len = buf.len().min(remaining as usize);
        self.inner.read(&mut buf[..len])
    }
}
