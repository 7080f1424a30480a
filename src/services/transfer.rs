use std::io;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::UploadError;
use crate::models::{SourcePayload, UploadSource};

/// Callback invoked with `(bytes_sent, total_bytes)` ticks.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Streams one payload to a pre-signed URL.
///
/// Implementations report byte ticks through the callback and stop early when
/// the token fires. The final `(total, total)` tick is reported only once the
/// endpoint acknowledged the payload; reaching 100% is the coordinator's
/// completion signal and must never be observable for a transfer that can
/// still fail.
#[async_trait]
pub trait TransferSink: Send + Sync {
    async fn send(
        &self,
        url: &str,
        source: &UploadSource,
        total_bytes: u64,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<(), UploadError>;
}

const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// HTTP `PUT` transfer with a streaming body.
pub struct HttpTransferSink {
    client: reqwest::Client,
    content_type: String,
}

impl HttpTransferSink {
    pub fn new(client: reqwest::Client, content_type: &str) -> Self {
        Self {
            client,
            content_type: content_type.to_string(),
        }
    }
}

#[async_trait]
impl TransferSink for HttpTransferSink {
    async fn send(
        &self,
        url: &str,
        source: &UploadSource,
        total_bytes: u64,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<(), UploadError> {
        let body = match &source.payload {
            SourcePayload::File(path) => {
                let file = File::open(path).await?;
                reqwest::Body::wrap_stream(counted_file_stream(
                    file,
                    total_bytes,
                    progress.clone(),
                ))
            }
            SourcePayload::Bytes(bytes) => reqwest::Body::wrap_stream(counted_bytes_stream(
                bytes.clone(),
                total_bytes,
                STREAM_CHUNK_SIZE,
                progress.clone(),
            )),
        };

        let request = self
            .client
            .put(url)
            .header(CONTENT_TYPE, &self.content_type)
            .header(CONTENT_LENGTH, total_bytes)
            .body(body);

        debug!("PUT {} ({} bytes)", url, total_bytes);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UploadError::Canceled),
            result = request.send() => result?,
        };

        if !response.status().is_success() {
            return Err(UploadError::EndpointStatus(response.status().as_u16()));
        }

        // The endpoint accepted every byte; the completion tick may go out.
        progress(total_bytes, total_bytes);
        Ok(())
    }
}

/// Disk-backed body. Intermediate ticks fire as chunks are handed to the
/// transport and stay strictly below `total_bytes`.
fn counted_file_stream(
    file: File,
    total_bytes: u64,
    progress: ProgressFn,
) -> impl Stream<Item = Result<Bytes, io::Error>> {
    let mut sent: u64 = 0;
    ReaderStream::with_capacity(file, STREAM_CHUNK_SIZE).map(move |chunk| {
        if let Ok(bytes) = &chunk {
            sent += bytes.len() as u64;
            if sent < total_bytes {
                progress(sent, total_bytes);
            }
        }
        chunk
    })
}

/// In-memory body, chunked so large buffers still produce a tick trail.
fn counted_bytes_stream(
    bytes: Bytes,
    total_bytes: u64,
    chunk_size: usize,
    progress: ProgressFn,
) -> impl Stream<Item = Result<Bytes, io::Error>> {
    stream! {
        let mut sent: u64 = 0;
        let mut remaining = bytes;
        while !remaining.is_empty() {
            let take = remaining.len().min(chunk_size);
            let chunk = remaining.split_to(take);
            sent += chunk.len() as u64;
            if sent < total_bytes {
                progress(sent, total_bytes);
            }
            yield Ok(chunk);
        }
    }
}
