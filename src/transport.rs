//! HTTP transport to the speech backend.
//!
//! The backend answers a JSON [`SpeechRequest`] with a chunked body of
//! back-to-back WAV segments. Chunk boundaries carry no meaning; the body is
//! handed on as a plain byte stream.

use std::path::Path;
use std::time::Duration;

use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use log::{debug, info};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;

use crate::error::TransportError;
use crate::models::SpeechRequest;

/// Response body as a stream of owned chunks
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Longest error body kept for a non-OK response
const MAX_ERROR_BODY: usize = 512;

pub struct SpeechClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl SpeechClient {
    pub fn new(endpoint: &str, connect_timeout: Duration) -> Result<Self, TransportError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| TransportError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(TransportError::InvalidEndpoint(format!(
                "unsupported scheme '{}'",
                endpoint.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("tts-stream-player/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::RequestFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send the request and return the response body as a byte stream.
    ///
    /// A non-success status is an error; its body (truncated) is kept for the
    /// user-facing message.
    pub async fn open_stream(&self, request: &SpeechRequest) -> Result<ByteStream, TransportError> {
        debug!("POST {} ({} chars of text)", self.endpoint, request.text.chars().count());

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(ACCEPT, "audio/wav")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::RequestFailed(format!("timed out connecting to {}", self.endpoint))
                } else {
                    TransportError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::BadStatus {
                status: status.as_u16(),
                body: truncate_body(body.trim()),
            });
        }

        if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
            debug!("Response content type: {:?}", content_type);
        }
        info!("Streaming audio from {}", self.endpoint);

        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| TransportError::ReadFailed(e.to_string()))
            })
            .boxed();
        Ok(body)
    }
}

/// Replay a captured response body from disk in fixed-size chunks
pub async fn file_stream(path: &Path, chunk_size: usize) -> std::io::Result<ByteStream> {
    let bytes = tokio::fs::read(path).await?;
    Ok(chunked(bytes, chunk_size))
}

/// Split an in-memory body into chunks of at most `chunk_size` bytes
pub fn chunked(bytes: Vec<u8>, chunk_size: usize) -> ByteStream {
    let chunks: Vec<Result<Vec<u8>, TransportError>> = bytes
        .chunks(chunk_size.max(1))
        .map(|chunk| Ok(chunk.to_vec()))
        .collect();
    stream::iter(chunks).boxed()
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
