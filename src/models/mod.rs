use std::fmt;
use std::io;
use std::path::PathBuf;

use bytes::Bytes;
use serde::Serialize;

use crate::error::UploadError;

/// How a submitted batch maps onto the form field's selected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// Only the first file of a batch becomes the selection. Every file still
    /// uploads; single-image fields like a course banner work this way.
    Single,
    /// Every file of the batch is appended to the selection.
    Multiple,
}

/// Binds the coordinator to one form field.
#[derive(Debug, Clone)]
pub struct FieldBinding {
    /// Form slot holding the selected file name(s).
    pub field: String,
    /// Form slot holding the `file name -> destination path` mapping.
    pub path_field: String,
    /// Destination path prefix, with or without a trailing separator.
    pub prefix: String,
    pub mode: SelectionMode,
}

impl FieldBinding {
    pub fn new(field: &str, path_field: &str, prefix: &str, mode: SelectionMode) -> Self {
        Self {
            field: field.to_string(),
            path_field: path_field.to_string(),
            prefix: prefix.to_string(),
            mode,
        }
    }
}

/// Per-file upload state. `InFlight` is the only non-terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    InFlight,
    Complete,
    Failed,
    Canceled,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadStatus::InFlight)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStatus::InFlight => "in flight",
            UploadStatus::Complete => "complete",
            UploadStatus::Failed => "failed",
            UploadStatus::Canceled => "canceled",
        };
        write!(f, "{}", name)
    }
}

/// Events fed into the coordinator's transition function. Completion, failure
/// and cancellation all arrive here; nothing else removes a task.
#[derive(Debug)]
pub enum TaskEvent {
    /// Integer percentage tick. 100 is the completion signal.
    Progress(u8),
    /// Transport finished without ever reporting a final tick.
    Completed,
    Failed(UploadError),
    Canceled,
}

/// Read-only view of one file's state, for UIs and logs.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub file_name: String,
    pub status: UploadStatus,
    pub progress: Option<u8>,
}

/// One named payload handed to `submit_batch`.
#[derive(Debug, Clone)]
pub struct UploadSource {
    pub file_name: String,
    pub payload: SourcePayload,
}

#[derive(Debug, Clone)]
pub enum SourcePayload {
    /// Streamed from disk at transfer time.
    File(PathBuf),
    /// Already resident in memory.
    Bytes(Bytes),
}

impl UploadSource {
    /// Builds a source from a path, using the final component as the file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, UploadError> {
        let path = path.into();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                UploadError::Payload(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("path '{}' has no usable file name", path.display()),
                ))
            })?;

        Ok(Self {
            file_name,
            payload: SourcePayload::File(path),
        })
    }

    pub fn from_bytes(file_name: &str, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.to_string(),
            payload: SourcePayload::Bytes(bytes.into()),
        }
    }

    /// Total payload size in bytes. Disk-backed sources are sized lazily so a
    /// missing file surfaces as a per-file failure, not a batch error.
    pub async fn size_bytes(&self) -> Result<u64, UploadError> {
        match &self.payload {
            SourcePayload::File(path) => Ok(tokio::fs::metadata(path).await?.len()),
            SourcePayload::Bytes(bytes) => Ok(bytes.len() as u64),
        }
    }
}

/// Integer percentage of transferred bytes, clamped to [0, 100]. Empty
/// payloads count as fully transferred.
pub fn transfer_percentage(bytes_sent: u64, total_bytes: u64) -> u8 {
    if total_bytes == 0 {
        return 100;
    }
    let pct = bytes_sent.saturating_mul(100) / total_bytes;
    pct.min(100) as u8
}
