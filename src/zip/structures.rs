use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use super::error::ArchiveError;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Local File Header (LFH) - 30 bytes plus name and extra field
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Central Directory File Header. Seeing one ends the entry stream.
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";

/// End of Central Directory. Also the whole content of an empty archive.
pub const EOCD_SIGNATURE: &[u8] = b"PK\x05\x06";

/// Optional signature in front of a data descriptor.
pub const DATA_DESCRIPTOR_SIGNATURE: &[u8] = b"PK\x07\x08";

/// General purpose flag: entry is encrypted.
const FLAG_ENCRYPTED: u16 = 0x0001;

/// General purpose flag: CRC and sizes follow the payload in a data descriptor.
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// ZIP64 extended information extra field
const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Parsed Local File Header.
///
/// Only the fields the streaming lookup needs are kept. `crc32` and the
/// sizes are zero when [`has_data_descriptor`](Self::has_data_descriptor)
/// is set; the real values then follow the compressed payload.
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// Raw name bytes, compared byte-for-byte against the requested path
    pub file_name: Vec<u8>,
    /// Sizes were widened by a ZIP64 extra field
    pub is_zip64: bool,
}

impl LocalFileHeader {
    /// Read the rest of a header whose signature has already been consumed.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, ArchiveError> {
        let mut fixed = [0u8; LFH_SIZE - 4];
        read_structure(reader, &mut fixed, "local file header")?;

        let mut cursor = Cursor::new(&fixed[..]);
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let _last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let _last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;

        let mut file_name = vec![0u8; file_name_length as usize];
        read_structure(reader, &mut file_name, "entry name")?;

        let mut extra = vec![0u8; extra_field_length as usize];
        read_structure(reader, &mut extra, "extra field")?;

        let mut header = Self {
            flags,
            compression_method: CompressionMethod::from_u16(compression_method),
            crc32,
            compressed_size,
            uncompressed_size,
            file_name,
            is_zip64: false,
        };
        header.apply_extra_field(&extra)?;
        Ok(header)
    }

    /// Pick up 64-bit sizes from a ZIP64 extra field.
    ///
    /// Unlike the central directory, the local header carries both sizes in
    /// the ZIP64 field whenever it is present, uncompressed first.
    fn apply_extra_field(&mut self, extra: &[u8]) -> Result<(), ArchiveError> {
        let mut cursor = Cursor::new(extra);
        let end = extra.len() as u64;

        while cursor.position() + 4 <= end {
            let header_id = cursor.read_u16::<LittleEndian>()?;
            let field_size = cursor.read_u16::<LittleEndian>()? as u64;
            let field_end = cursor.position() + field_size;
            if field_end > end {
                return Err(ArchiveError::Corrupt("extra field overruns header".into()));
            }

            if header_id == ZIP64_EXTRA_ID {
                self.is_zip64 = true;
                if cursor.position() + 8 <= field_end {
                    let size = cursor.read_u64::<LittleEndian>()?;
                    if self.uncompressed_size == 0xFFFFFFFF {
                        self.uncompressed_size = size;
                    }
                }
                if cursor.position() + 8 <= field_end {
                    let size = cursor.read_u64::<LittleEndian>()?;
                    if self.compressed_size == 0xFFFFFFFF {
                        self.compressed_size = size;
                    }
                }
            }
            cursor.set_position(field_end);
        }

        Ok(())
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Name for diagnostics; non-UTF-8 bytes are replaced.
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.file_name).into_owned()
    }
}

/// Trailer written after the payload of entries with deferred sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Read a data descriptor, with or without its optional signature.
    ///
    /// Sizes are 8 bytes wide when the owning header carried a ZIP64 field.
    pub fn read_from<R: Read>(reader: &mut R, zip64: bool) -> Result<Self, ArchiveError> {
        let mut first = [0u8; 4];
        read_structure(reader, &mut first, "data descriptor")?;

        let crc32 = if &first[..] == DATA_DESCRIPTOR_SIGNATURE {
            let mut crc = [0u8; 4];
            read_structure(reader, &mut crc, "data descriptor")?;
            u32::from_le_bytes(crc)
        } else {
            u32::from_le_bytes(first)
        };

        let mut raw = [0u8; 16];
        let sizes = if zip64 { &mut raw[..] } else { &mut raw[..8] };
        read_structure(reader, sizes, "data descriptor")?;

        let mut cursor = Cursor::new(&sizes[..]);
        let (compressed_size, uncompressed_size) = if zip64 {
            (
                cursor.read_u64::<LittleEndian>()?,
                cursor.read_u64::<LittleEndian>()?,
            )
        } else {
            (
                cursor.read_u32::<LittleEndian>()? as u64,
                cursor.read_u32::<LittleEndian>()? as u64,
            )
        };

        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }
}

/// `read_exact` for archive structures: running out of input means the
/// archive is truncated, anything else is a failing source.
pub(crate) fn read_structure<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    what: &str,
) -> Result<(), ArchiveError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => ArchiveError::Corrupt(format!("truncated {what}")),
        _ => ArchiveError::from_io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn header_bytes(flags: u16, name: &[u8], extra: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u16::<LittleEndian>(20).unwrap();
        buf.write_u16::<LittleEndian>(flags).unwrap();
        buf.write_u16::<LittleEndian>(8).unwrap();
        buf.write_u16::<LittleEndian>(0x6000).unwrap();
        buf.write_u16::<LittleEndian>(0x5821).unwrap();
        buf.write_u32::<LittleEndian>(0xDEADBEEF).unwrap();
        buf.write_u32::<LittleEndian>(0xFFFFFFFF).unwrap();
        buf.write_u32::<LittleEndian>(0xFFFFFFFF).unwrap();
        buf.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        buf.write_u16::<LittleEndian>(extra.len() as u16).unwrap();
        buf.extend_from_slice(name);
        buf.extend_from_slice(extra);
        buf
    }

    #[test]
    fn zip64_extra_field_widens_sizes() {
        let mut extra = Vec::new();
        extra.write_u16::<LittleEndian>(ZIP64_EXTRA_ID).unwrap();
        extra.write_u16::<LittleEndian>(16).unwrap();
        extra.write_u64::<LittleEndian>(5_000_000_000).unwrap();
        extra.write_u64::<LittleEndian>(4_900_000_000).unwrap();

        let bytes = header_bytes(0, b"big.bin", &extra);
        let header = LocalFileHeader::read_from(&mut &bytes[..]).unwrap();

        assert!(header.is_zip64);
        assert_eq!(header.uncompressed_size, 5_000_000_000);
        assert_eq!(header.compressed_size, 4_900_000_000);
        assert_eq!(header.compression_method, CompressionMethod::Deflate);
        assert_eq!(header.name_lossy(), "big.bin");
    }

    #[test]
    fn truncated_header_is_corrupt() {
        let bytes = header_bytes(FLAG_DATA_DESCRIPTOR, b"pages/0.png", &[]);
        let err = LocalFileHeader::read_from(&mut &bytes[..12]).unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt(_)));
    }

    #[test]
    fn overrunning_extra_field_is_corrupt() {
        let mut extra = Vec::new();
        extra.write_u16::<LittleEndian>(0x7875).unwrap();
        extra.write_u16::<LittleEndian>(40).unwrap();
        extra.extend_from_slice(&[0u8; 4]);

        let bytes = header_bytes(0, b"a.txt", &extra);
        let err = LocalFileHeader::read_from(&mut &bytes[..]).unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt(_)));
    }

    #[test]
    fn data_descriptor_with_and_without_signature() {
        let mut signed = DATA_DESCRIPTOR_SIGNATURE.to_vec();
        signed.write_u32::<LittleEndian>(7).unwrap();
        signed.write_u32::<LittleEndian>(10).unwrap();
        signed.write_u32::<LittleEndian>(20).unwrap();

        let mut bare = Vec::new();
        bare.write_u32::<LittleEndian>(7).unwrap();
        bare.write_u64::<LittleEndian>(10).unwrap();
        bare.write_u64::<LittleEndian>(20).unwrap();

        let expected = DataDescriptor {
            crc32: 7,
            compressed_size: 10,
            uncompressed_size: 20,
        };
        assert_eq!(DataDescriptor::read_from(&mut &signed[..], false).unwrap(), expected);
        assert_eq!(DataDescriptor::read_from(&mut &bare[..], true).unwrap(), expected);
    }
}
