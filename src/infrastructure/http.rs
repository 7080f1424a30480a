use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::UploaderConfig;

/// Client for issuer calls. These are small JSON round-trips, so the whole
/// request is bounded by the configured timeout.
pub fn issuer_client(config: &UploaderConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .context("failed to build issuer HTTP client")
}

/// Client for transfers. Only the connect phase is bounded: a PUT body keeps
/// running for as long as bytes keep flowing.
pub fn transfer_client(config: &UploaderConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .context("failed to build transfer HTTP client")
}
