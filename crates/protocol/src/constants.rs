use std::time::Duration;

/// Timeout applied to every request made against the upload server.
///
/// Chunk bodies can be several megabytes, so this is deliberately generous;
/// a request that exceeds it counts as a transient chunk failure.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Multipart field name carrying the chunk bytes.
pub const CHUNK_FIELD_NAME: &str = "file";

/// Query parameter naming the upload session on chunk uploads.
pub const QUERY_FILE_ID: &str = "fileId";

/// Query parameter naming the chunk index on chunk uploads.
pub const QUERY_CHUNK_INDEX: &str = "chunkIndex";

/// Path segment all upload routes live under.
const UPLOAD_SCOPE: &str = "upload";

/// HTTP method used by an [`Endpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

/// Routes exposed by the upload server.
///
/// Paths are expressed as segments so the transport can append them to a
/// base URL that may already carry a prefix such as `/api`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `POST /upload/check`
    Check,
    /// `POST /upload/chunk?fileId=&chunkIndex=`
    Chunk,
    /// `GET /upload/chunks/:fileId`
    Chunks(String),
    /// `POST /upload/merge`
    Merge,
    /// `DELETE /upload/:fileId`
    Cleanup(String),
}

impl Endpoint {
    /// Path segments relative to the server base URL.
    pub fn segments(&self) -> Vec<&str> {
        match self {
            Endpoint::Check => vec![UPLOAD_SCOPE, "check"],
            Endpoint::Chunk => vec![UPLOAD_SCOPE, "chunk"],
            Endpoint::Chunks(file_id) => vec![UPLOAD_SCOPE, "chunks", file_id.as_str()],
            Endpoint::Merge => vec![UPLOAD_SCOPE, "merge"],
            Endpoint::Cleanup(file_id) => vec![UPLOAD_SCOPE, file_id.as_str()],
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Endpoint::Check | Endpoint::Chunk | Endpoint::Merge => Method::Post,
            Endpoint::Chunks(_) => Method::Get,
            Endpoint::Cleanup(_) => Method::Delete,
        }
    }
}
