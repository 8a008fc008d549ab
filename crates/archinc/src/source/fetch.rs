//! HTTP fetching for remote archive sources
//!
//! A single blocking GET per archive. No retries, no caching.

use reqwest::blocking::Client;
use std::io::Read;
use thiserror::Error;

/// Errors that can occur during URL fetching
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP client could not be constructed
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// HTTP request failed
    #[error("HTTP request failed for {url}: {source}")]
    HttpError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status
    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },

    /// IO error while reading the body
    #[error("IO error reading {url}: {source}")]
    IoError {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Blocking archive downloader
pub struct UrlFetcher {
    client: Client,
}

impl UrlFetcher {
    /// Create a new URL fetcher
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(format!("archinc/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client })
    }

    /// Fetch the body of a URL
    pub fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        tracing::debug!(%url, "fetching archive");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|source| FetchError::HttpError {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        if response.url().as_str() != url {
            tracing::debug!(%url, redirected = %response.url(), "followed redirect");
        }

        let mut content = Vec::new();
        let mut reader = response;
        reader
            .read_to_end(&mut content)
            .map_err(|source| FetchError::IoError {
                url: url.to_string(),
                source,
            })?;

        tracing::debug!(%url, bytes = content.len(), "fetched archive");
        Ok(content)
    }
}
