use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{AttachmentLocator, AttachmentRef, RawSource};
use crate::auth::Caller;
use crate::error::{Error, Result};

/// Attachments laid out on the local filesystem
///
/// `<root>/<wiki>/<page segment>/.../<attachment>`
pub struct LocalAttachmentStore {
    root: PathBuf,
    read_token: Option<String>,
}

impl LocalAttachmentStore {
    pub fn new(root: &Path) -> anyhow::Result<Self> {
        if !root.is_dir() {
            anyhow::bail!("attachment store {} is not a directory", root.display());
        }
        Ok(Self {
            root: root.to_path_buf(),
            read_token: None,
        })
    }

    /// Require callers to present this bearer token.
    pub fn with_read_token(mut self, token: Option<String>) -> Self {
        self.read_token = token;
        self
    }

    /// Filesystem location of an attachment, or `None` when a component
    /// could step outside the store root.
    fn attachment_path(&self, attachment: &AttachmentRef<'_>) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for component in attachment.components() {
            if component.is_empty()
                || component == "."
                || component == ".."
                || component.contains(['/', '\\', '\0'])
            {
                return None;
            }
            path.push(component);
        }
        Some(path)
    }

    fn authorize(&self, caller: &Caller) -> Result<()> {
        match &self.read_token {
            Some(expected) if !caller.presents(expected) => Err(Error::PermissionDenied(
                "a valid bearer token is required".into(),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl AttachmentLocator for LocalAttachmentStore {
    async fn locate(&self, caller: &Caller, attachment: AttachmentRef<'_>) -> Result<RawSource> {
        self.authorize(caller)?;

        let path = self
            .attachment_path(&attachment)
            .ok_or_else(|| Error::DocumentNotFound(format!("no page for {attachment}")))?;

        let page_dir = path.parent().unwrap_or(&self.root);
        match tokio::fs::metadata(page_dir).await {
            Ok(meta) if meta.is_dir() => {}
            _ => {
                return Err(Error::DocumentNotFound(format!(
                    "page {}:{} does not exist",
                    attachment.wiki,
                    attachment.page_path.join("/")
                )));
            }
        }

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::DocumentNotFound(format!(
                    "attachment {attachment} does not exist"
                )));
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Err(Error::PermissionDenied(format!(
                    "attachment {attachment} is not readable"
                )));
            }
            Err(e) => return Err(Error::SourceUnavailable(e)),
        };

        let file = file.into_std().await;
        if file.metadata().map_err(Error::SourceUnavailable)?.is_dir() {
            return Err(Error::DocumentNotFound(format!(
                "attachment {attachment} does not exist"
            )));
        }

        debug!(path = %path.display(), "opened local attachment");
        Ok(Box::new(file))
    }
}
