mod http;
mod local;

pub use http::{HttpAttachmentStore, HttpBodyReader};
pub use local::LocalAttachmentStore;

use async_trait::async_trait;
use std::io::Read;

use crate::auth::Caller;
use crate::error::Result;

/// Undecoded bytes of an attachment, read front to back.
///
/// Sources are consumed on blocking threads; dropping one releases whatever
/// the backend holds open for it.
pub type RawSource = Box<dyn Read + Send>;

/// Names one attachment of one wiki page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentRef<'a> {
    pub wiki: &'a str,
    pub page_path: &'a [String],
    pub attachment: &'a str,
}

impl AttachmentRef<'_> {
    /// Every component, wiki first, attachment last.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.wiki)
            .chain(self.page_path.iter().map(String::as_str))
            .chain(std::iter::once(self.attachment))
    }
}

impl std::fmt::Display for AttachmentRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}/{}", self.wiki, self.page_path.join("/"), self.attachment)
    }
}

/// Document and attachment storage as seen by the resolver.
#[async_trait]
pub trait AttachmentLocator: Send + Sync {
    /// Authorize `caller` and open the attachment's raw bytes.
    ///
    /// Fails with [`PermissionDenied`](crate::Error::PermissionDenied),
    /// [`DocumentNotFound`](crate::Error::DocumentNotFound) or
    /// [`SourceUnavailable`](crate::Error::SourceUnavailable).
    async fn locate(&self, caller: &Caller, attachment: AttachmentRef<'_>) -> Result<RawSource>;
}

/// `unwrap_err` for locator results, whose sources are not `Debug`.
#[cfg(test)]
pub(crate) fn locate_err(result: Result<RawSource>) -> crate::Error {
    match result {
        Ok(_) => panic!("attachment unexpectedly located"),
        Err(e) => e,
    }
}
