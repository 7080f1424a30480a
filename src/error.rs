use thiserror::Error;

/// Terminal outcome of a single file upload that did not complete.
///
/// `Canceled` is kept apart from the failure variants so callers can tell a
/// user-initiated stop from a broken transfer.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Pre-signed URL request failed: {0}")]
    Issuer(String),

    #[error("Transfer failed: {0}")]
    Transport(String),

    #[error("Upload endpoint returned status {0}")]
    EndpointStatus(u16),

    #[error("Upload canceled")]
    Canceled,

    #[error("File size {size} exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("Failed to read upload payload: {0}")]
    Payload(#[from] std::io::Error),
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        UploadError::Transport(err.to_string())
    }
}
