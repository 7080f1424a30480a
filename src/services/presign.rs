use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::UploadError;

/// Issues a pre-signed upload URL for a destination path.
///
/// Issuance failures are per-file: the coordinator marks the file failed and
/// moves on to the next one in the batch.
#[async_trait]
pub trait UrlIssuer: Send + Sync {
    async fn issue(&self, destination_path: &str) -> Result<String, UploadError>;
}

#[derive(Serialize)]
struct PresignRequest<'a> {
    destination_path: &'a str,
}

#[derive(Deserialize)]
struct PresignResponse {
    url: String,
}

/// Requests URLs from the platform API, the way the web client does.
pub struct HttpUrlIssuer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpUrlIssuer {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/uploads/presign", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl UrlIssuer for HttpUrlIssuer {
    async fn issue(&self, destination_path: &str) -> Result<String, UploadError> {
        debug!("Requesting pre-signed URL for '{}'", destination_path);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&PresignRequest { destination_path })
            .send()
            .await
            .map_err(|e| UploadError::Issuer(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UploadError::Issuer(format!(
                "issuer answered with status {}",
                response.status()
            )));
        }

        let body: PresignResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Issuer(e.to_string()))?;

        Ok(body.url)
    }
}

/// Signs PUT URLs directly against the bucket, for running without the
/// platform API in front.
pub struct S3UrlIssuer {
    client: aws_sdk_s3::Client,
    bucket: String,
    ttl: Duration,
}

impl S3UrlIssuer {
    pub fn new(client: aws_sdk_s3::Client, bucket: &str, ttl: Duration) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            ttl,
        }
    }
}

#[async_trait]
impl UrlIssuer for S3UrlIssuer {
    async fn issue(&self, destination_path: &str) -> Result<String, UploadError> {
        debug!(
            "Pre-signing s3://{}/{} for {:?}",
            self.bucket, destination_path, self.ttl
        );

        let presign_config = PresigningConfig::expires_in(self.ttl)
            .map_err(|e| UploadError::Issuer(e.to_string()))?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(destination_path)
            .presigned(presign_config)
            .await
            .map_err(|e| UploadError::Issuer(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }
}
