//! Streaming lookup of a single entry in a ZIP archive.
//!
//! This module finds one named entry in an archive read strictly front to
//! back and exposes its decompressed content as a lazily-inflating reader.
//!
//! ## Architecture
//!
//! - [`structures`]: ZIP format records read during the scan (local headers,
//!   data descriptors, signatures)
//! - [`scanner`]: the linear scan and the [`Lookup`] outcome
//! - [`entry`]: [`EntryStream`], the reader bound to the matched entry
//!
//! ## Reading Order
//!
//! Attachments arrive as forward-only byte streams, so the scan sees each
//! entry as `local header, payload[, data descriptor]` and never seeks. The
//! first record that is not a local header (the central directory, or the
//! end record of an empty archive) ends the search. The first entry whose
//! name matches wins. Entries whose sizes are deferred to a trailing data
//! descriptor are skipped by inflating through their DEFLATE stream, and the
//! descriptor that follows is consumed before the next header.
//!
//! ## Supported Features
//!
//! - STORED (no compression) method
//! - DEFLATE compression method
//! - ZIP64 sizes in local headers and data descriptors
//! - CRC-32 verification of the served entry
//!
//! ## Limitations
//!
//! - No encryption support
//! - No BZIP2, LZMA, or other compression methods
//! - STORED entries must declare their size in the local header

mod entry;
mod error;
mod scanner;
mod structures;

#[cfg(test)]
pub(crate) mod fixture;

pub use entry::EntryStream;
pub use error::ArchiveError;
pub use scanner::{Lookup, open};
pub use structures::{CompressionMethod, DataDescriptor, LocalFileHeader};
