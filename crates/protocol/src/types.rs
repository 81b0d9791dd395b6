use serde::{Deserialize, Serialize};

/// Lifecycle status of an upload session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadStatus {
    #[default]
    Idle,
    Preparing,
    CalculatingHash,
    Checking,
    Uploading,
    Paused,
    Merging,
    Completed,
    Error,
    Cancelled,
}

impl UploadStatus {
    /// Returns `true` once the session can no longer change on its own.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadStatus::Completed | UploadStatus::Error | UploadStatus::Cancelled
        )
    }

    /// Returns `true` while a session is in flight (including paused).
    pub fn is_active(self) -> bool {
        !self.is_terminal() && self != UploadStatus::Idle
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UploadStatus::Idle => "idle",
            UploadStatus::Preparing => "preparing",
            UploadStatus::CalculatingHash => "calculating-hash",
            UploadStatus::Checking => "checking",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Paused => "paused",
            UploadStatus::Merging => "merging",
            UploadStatus::Completed => "completed",
            UploadStatus::Error => "error",
            UploadStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Coarse phase reported alongside byte progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadPhase {
    #[default]
    Preparing,
    CalculatingHash,
    Uploading,
    Merging,
}

/// Aggregate progress of an upload session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub total_bytes: u64,
    pub uploaded_bytes: u64,
    /// 0–100.
    pub percentage: f64,
    /// Bytes per second over the session so far.
    pub speed: f64,
    /// Estimated seconds remaining; 0 when the speed is still unknown.
    pub eta_secs: f64,
    pub uploaded_chunks: usize,
    pub total_chunks: usize,
    pub phase: UploadPhase,
}

/// Final outcome of a successful upload (merged or matched by hash).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub success: bool,
    pub file_id: String,
    pub filename: String,
    pub path: String,
    /// Size reported by the server; 0 for instant uploads.
    pub size: u64,
    pub hash: String,
}
