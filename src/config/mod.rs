use std::env;

/// Client-side configuration for the upload coordinator
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Base URL of the platform API that issues pre-signed upload URLs
    /// (default: "http://localhost:3000/api")
    pub api_base_url: String,

    /// Maximum file size in bytes accepted for upload (default: 256 MB)
    pub max_file_size: u64,

    /// Content type set on the upload PUT (default: "application/octet-stream")
    pub content_type: String,

    /// Timeout in seconds for issuer requests (default: 30)
    pub request_timeout_secs: u64,

    /// Lifetime in seconds of directly pre-signed URLs (default: 900)
    pub presign_ttl_secs: u64,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            max_file_size: 256 * 1024 * 1024, // 256 MB
            content_type: mime::APPLICATION_OCTET_STREAM.to_string(),
            request_timeout_secs: 30,
            presign_ttl_secs: 900, // 15 minutes
        }
    }
}

impl UploaderConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            api_base_url: env::var("UPLOADER_API_URL").unwrap_or(default.api_base_url),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            content_type: env::var("UPLOAD_CONTENT_TYPE").unwrap_or(default.content_type),

            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.request_timeout_secs),

            presign_ttl_secs: env::var("PRESIGN_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.presign_ttl_secs),
        }
    }

    /// Create config for development (local API, relaxed size limit)
    pub fn development() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            max_file_size: 1024 * 1024 * 1024, // 1 GB
            content_type: mime::APPLICATION_OCTET_STREAM.to_string(),
            request_timeout_secs: 30,
            presign_ttl_secs: 900,
        }
    }
}
