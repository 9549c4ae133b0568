use async_trait::async_trait;
use bytes::{Buf, Bytes};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, Response, StatusCode};
use std::io::{self, Read};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;

use super::{AttachmentLocator, AttachmentRef, RawSource};
use crate::auth::Caller;
use crate::error::{Error, Result};

const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Attachments served by a remote document store over HTTP
///
/// An attachment is fetched with a plain GET of
/// `<base>/<wiki>/<page segment>/.../<attachment>`, each component
/// percent-encoded. The caller's bearer token is forwarded, falling back to
/// the store's own service token.
pub struct HttpAttachmentStore {
    client: Client,
    base_url: String,
    service_token: Option<String>,
}

impl HttpAttachmentStore {
    pub fn new(base_url: String) -> anyhow::Result<Self> {
        // No overall timeout: bodies are streamed for as long as clients read.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_token: None,
        })
    }

    pub fn with_service_token(mut self, token: Option<String>) -> Self {
        self.service_token = token;
        self
    }

    fn attachment_url(&self, attachment: &AttachmentRef<'_>) -> String {
        let mut url = self.base_url.clone();
        for component in attachment.components() {
            url.push('/');
            url.extend(utf8_percent_encode(component, SEGMENT));
        }
        url
    }
}

#[async_trait]
impl AttachmentLocator for HttpAttachmentStore {
    async fn locate(&self, caller: &Caller, attachment: AttachmentRef<'_>) -> Result<RawSource> {
        let url = self.attachment_url(&attachment);
        let mut request = self.client.get(&url);
        if let Some(token) = caller.token().or(self.service_token.as_deref()) {
            request = request.bearer_auth(token);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| Error::SourceUnavailable(io::Error::other(e)))?;

        match resp.status() {
            status if status.is_success() => {
                debug!(%url, "streaming remote attachment");
                Ok(Box::new(HttpBodyReader::new(resp)))
            }
            StatusCode::NOT_FOUND => Err(Error::DocumentNotFound(format!(
                "attachment {attachment} does not exist"
            ))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::PermissionDenied(
                format!("attachment store refused access to {attachment}"),
            )),
            status => Err(Error::SourceUnavailable(io::Error::other(format!(
                "attachment store answered {status} for {attachment}"
            )))),
        }
    }
}

/// Blocking [`Read`] over a streaming response body
///
/// Each refill waits for the next body chunk on the runtime the reader was
/// created on, so reads must happen on a blocking thread
/// (`tokio::task::spawn_blocking`), never on a runtime worker.
pub struct HttpBodyReader {
    handle: Handle,
    response: Response,
    pending: Bytes,
    transferred_bytes: u64,
}

impl HttpBodyReader {
    /// Must be called from within a Tokio runtime.
    pub fn new(response: Response) -> Self {
        Self {
            handle: Handle::current(),
            response,
            pending: Bytes::new(),
            transferred_bytes: 0,
        }
    }
}

impl Read for HttpBodyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.pending.is_empty() {
            match self.handle.block_on(self.response.chunk()) {
                Ok(Some(chunk)) => {
                    self.transferred_bytes += chunk.len() as u64;
                    self.pending = chunk;
                }
                Ok(None) => return Ok(0),
                Err(e) => return Err(io::Error::other(e)),
            }
        }

        let len = buf.len().min(self.pending.len());
        buf[..len].copy_from_slice(&self.pending[..len]);
        self.pending.advance(len);
        Ok(len)
    }
}

impl Drop for HttpBodyReader {
    fn drop(&mut self) {
        debug!(
            transferred = self.transferred_bytes,
            "released remote attachment body"
        );
    }
}
