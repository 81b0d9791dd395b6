//! reqwest implementation of [`UploadTransport`].

use std::time::Duration;

use chunkup_protocol::ServerReply;
use chunkup_protocol::constants::{
    CHUNK_FIELD_NAME, Endpoint, Method, QUERY_CHUNK_INDEX, QUERY_FILE_ID,
};
use chunkup_protocol::messages::{
    CheckRequest, CheckResponse, ChunkListResponse, ChunkUploadResponse, CleanupResponse,
    MergeRequest, MergeResponse,
};
use chunkup_transfer::validate_file_id;
use futures_util::stream;
use reqwest::Url;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::TransportError;
use crate::transport::{ChunkProgress, TransportFuture, UploadTransport};

/// Size of the pieces a chunk body is streamed in. Each piece handed to the
/// connection produces one chunk progress event.
const BODY_PIECE_SIZE: usize = 64 * 1024;

/// HTTP client for the chunk server.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    /// Creates a transport rooted at `base_url` (e.g. `http://host:3000/api`).
    ///
    /// Every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TransportError::InvalidRequest(format!("invalid server URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidRequest(format!(
                "server URL cannot be used as a base: {base_url}"
            )));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, endpoint: &Endpoint) -> Url {
        let mut url = self.base_url.clone();
        // `new` rejects cannot-be-a-base URLs, so this always succeeds.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(endpoint.segments());
        }
        url
    }

    fn request(&self, endpoint: &Endpoint) -> reqwest::RequestBuilder {
        let url = self.url(endpoint);
        debug!(method = ?endpoint.method(), %url, "upload server request");
        match endpoint.method() {
            Method::Get => self.http.get(url),
            Method::Post => self.http.post(url),
            Method::Delete => self.http.delete(url),
        }
    }
}

impl UploadTransport for HttpTransport {
    fn check_exists(&self, file_hash: &str, filename: &str) -> TransportFuture<'_, CheckResponse> {
        let body = CheckRequest {
            file_hash: file_hash.to_string(),
            filename: filename.to_string(),
        };
        Box::pin(async move {
            require("file hash", &body.file_hash)?;
            require("filename", &body.filename)?;

            let resp = self
                .request(&Endpoint::Check)
                .json(&body)
                .send()
                .await
                .map_err(map_reqwest)?;
            read_reply(resp).await
        })
    }

    fn upload_chunk(
        &self,
        file_id: &str,
        chunk_index: usize,
        data: Vec<u8>,
        on_progress: Option<ChunkProgress>,
    ) -> TransportFuture<'_, ChunkUploadResponse> {
        let file_id = file_id.to_string();
        Box::pin(async move {
            check_file_id(&file_id)?;

            let len = data.len() as u64;
            let part = Part::stream_with_length(progress_body(data, on_progress), len)
                .file_name(format!("chunk-{chunk_index}"))
                .mime_str("application/octet-stream")?;
            let form = Form::new().part(CHUNK_FIELD_NAME, part);
            let index = chunk_index.to_string();

            let resp = self
                .request(&Endpoint::Chunk)
                .query(&[
                    (QUERY_FILE_ID, file_id.as_str()),
                    (QUERY_CHUNK_INDEX, index.as_str()),
                ])
                .multipart(form)
                .send()
                .await
                .map_err(map_reqwest)?;
            read_reply(resp).await
        })
    }

    fn list_chunks(&self, file_id: &str) -> TransportFuture<'_, ChunkListResponse> {
        let file_id = file_id.to_string();
        Box::pin(async move {
            check_file_id(&file_id)?;
            let resp = self
                .request(&Endpoint::Chunks(file_id))
                .send()
                .await
                .map_err(map_reqwest)?;
            read_reply(resp).await
        })
    }

    fn merge(&self, request: &MergeRequest) -> TransportFuture<'_, MergeResponse> {
        let body = request.clone();
        Box::pin(async move {
            check_file_id(&body.file_id)?;
            require("filename", &body.filename)?;

            let resp = self
                .request(&Endpoint::Merge)
                .json(&body)
                .send()
                .await
                .map_err(map_reqwest)?;
            read_reply(resp).await
        })
    }

    fn cleanup(&self, file_id: &str) -> TransportFuture<'_, CleanupResponse> {
        let file_id = file_id.to_string();
        Box::pin(async move {
            check_file_id(&file_id)?;
            let resp = self
                .request(&Endpoint::Cleanup(file_id))
                .send()
                .await
                .map_err(map_reqwest)?;
            read_reply(resp).await
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Error body shape used by the server on non-2xx replies.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

fn require(what: &str, value: &str) -> Result<(), TransportError> {
    if value.trim().is_empty() {
        return Err(TransportError::InvalidRequest(format!("{what} is required")));
    }
    Ok(())
}

fn check_file_id(file_id: &str) -> Result<(), TransportError> {
    validate_file_id(file_id).map_err(|e| TransportError::InvalidRequest(e.to_string()))
}

fn map_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Http(e)
    }
}

/// Decodes a server reply, turning HTTP failures and `success: false`
/// bodies into errors that carry the server's message.
async fn read_reply<T>(resp: reqwest::Response) -> Result<T, TransportError>
where
    T: DeserializeOwned + ServerReply,
{
    let status = resp.status();
    let body = resp.bytes().await.map_err(map_reqwest)?;

    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        return Err(TransportError::Server {
            status: status.as_u16(),
            message,
        });
    }

    let reply: T = serde_json::from_slice(&body)?;
    if !reply.success() {
        return Err(TransportError::Rejected(
            reply.message().unwrap_or("request failed").to_string(),
        ));
    }
    Ok(reply)
}

/// Wraps chunk bytes in a streamed body that reports how much of it has
/// been handed to the connection.
fn progress_body(data: Vec<u8>, on_progress: Option<ChunkProgress>) -> reqwest::Body {
    let total = data.len();
    let mut sent = 0usize;
    let pieces: Vec<(usize, Vec<u8>)> = data
        .chunks(BODY_PIECE_SIZE)
        .map(|piece| {
            sent += piece.len();
            (sent, piece.to_vec())
        })
        .collect();

    if pieces.is_empty()
        && let Some(cb) = &on_progress
    {
        cb(100.0);
    }

    let body = stream::iter(pieces.into_iter().map(move |(sent, piece)| {
        if let Some(cb) = &on_progress {
            cb(sent as f64 * 100.0 / total as f64);
        }
        Ok::<_, std::io::Error>(piece)
    }));
    reqwest::Body::wrap_stream(body)
}
