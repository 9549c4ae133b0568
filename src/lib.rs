//! # lofi-archive
//!
//! Serves single entries of zip archives attached to wiki pages, streamed
//! straight out of the attachment without extracting or buffering the
//! archive.
//!
//! Lofi mockup projects are stored as zip attachments; the rendered pages
//! live at `pages/<n>.png` inside them and are linked from wiki content
//! through two URL shapes, both resolved here.
//!
//! ## Features
//!
//! - Forward-only scan of local file headers; the central directory is never needed
//! - STORED and DEFLATE entries, data descriptors and ZIP64 sizes
//! - CRC-32 and size verification at the end of every served entry
//! - Attachments from a local directory tree or a remote HTTP store
//!
//! ## Example
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::Read;
//! use lofi_archive::zip::{self, Lookup};
//!
//! fn main() -> anyhow::Result<()> {
//!     let archive = File::open("project.zip")?;
//!     match zip::open(archive, "pages/0.png")? {
//!         Lookup::Found(mut entry) => {
//!             let mut png = Vec::new();
//!             entry.read_to_end(&mut png)?;
//!             println!("{} bytes", png.len());
//!         }
//!         Lookup::NotFound(path) => println!("no {path}"),
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod error;
pub mod io;
pub mod request;
pub mod server;
pub mod zip;

pub use auth::Caller;
pub use cli::Cli;
pub use error::{Error, Result};
pub use io::{AttachmentLocator, AttachmentRef, HttpAttachmentStore, LocalAttachmentStore, RawSource};
pub use request::{EntrySelector, PageQuery, ResourceRequest, page_image_url};
pub use server::{AppState, app};
