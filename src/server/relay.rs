//! Relays an [`EntryStream`] into a response body.
//!
//! The stream is read on a blocking thread and handed over chunk by chunk
//! through a small bounded channel, so at most a few chunks of the entry are
//! in memory at once. Dropping the body (the client went away) closes the
//! channel; the pump notices on its next send and closes the stream.

use axum::body::Bytes;
use http_body::{Body, Frame, SizeHint};
use std::io::{self, Read};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::zip::EntryStream;

/// Bytes requested from the entry stream per read.
const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks buffered between the pump and the connection.
const CHANNEL_DEPTH: usize = 4;

/// Response body fed by a blocking pump over one entry.
pub struct EntryBody {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    remaining: Option<u64>,
}

impl EntryBody {
    /// Start pumping `stream` on a blocking thread.
    pub fn spawn<R: Read + Send + 'static>(stream: EntryStream<R>) -> Self {
        let remaining = stream.uncompressed_size();
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        tokio::task::spawn_blocking(move || pump(stream, tx));
        Self { rx, remaining }
    }
}

fn pump<R: Read>(mut stream: EntryStream<R>, tx: mpsc::Sender<io::Result<Bytes>>) {
    let mut sent = 0u64;
    loop {
        let mut buf = vec![0u8; CHUNK_SIZE];
        match stream.read(&mut buf) {
            Ok(0) => {
                debug!(entry = stream.name(), bytes = sent, "entry fully relayed");
                break;
            }
            Ok(n) => {
                buf.truncate(n);
                if tx.blocking_send(Ok(Bytes::from(buf))).is_err() {
                    debug!(entry = stream.name(), bytes = sent, "client went away");
                    break;
                }
                sent += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(entry = stream.name(), error = %e, "aborting entry body");
                let _ = tx.blocking_send(Err(e));
                break;
            }
        }
    }
    stream.close();
}

impl Body for EntryBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let polled = self.rx.poll_recv(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &polled {
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining = remaining.saturating_sub(chunk.len() as u64);
            }
        }
        polled.map(|item| item.map(|chunk| chunk.map(Frame::data)))
    }

    fn size_hint(&self) -> SizeHint {
        match self.remaining {
            Some(remaining) => SizeHint::with_exact(remaining),
            None => SizeHint::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::fixture::{ArchiveBuilder, TrackedSource, sample};
    use http_body_util::BodyExt;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[tokio::test]
    async fn relays_whole_entry() {
        let data = sample(300_000, 9);
        let archive = ArchiveBuilder::new().deflated("pages/0.png", &data).finish();
        let stream = crate::zip::open(io::Cursor::new(archive), "pages/0.png")
            .unwrap()
            .found()
            .unwrap();

        let body = EntryBody::spawn(stream);
        assert_eq!(body.size_hint().exact(), Some(data.len() as u64));

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected.as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn dropped_body_releases_source() {
        let data = sample(2_000_000, 3);
        let archive = ArchiveBuilder::new().stored("big.bin", &data).finish();
        let (source, drops) = TrackedSource::new(archive);
        let stream = crate::zip::open(source, "big.bin").unwrap().found().unwrap();

        let mut body = EntryBody::spawn(stream);
        let first = body.frame().await.unwrap().unwrap();
        assert!(first.is_data());
        drop(body);

        for _ in 0..200 {
            if drops.load(Ordering::SeqCst) == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("source was not released after the body was dropped");
    }

    #[tokio::test]
    async fn corrupt_entry_fails_the_body() {
        let data = sample(10_000, 4);
        let archive = ArchiveBuilder::new().deflated_bad_crc("x.png", &data).finish();
        let stream = crate::zip::open(io::Cursor::new(archive), "x.png")
            .unwrap()
            .found()
            .unwrap();

        match EntryBody::spawn(stream).collect().await {
            Err(err) => assert_eq!(err.kind(), io::ErrorKind::InvalidData),
            Ok(_) => panic!("corrupt entry relayed without error"),
        }
    }
}
