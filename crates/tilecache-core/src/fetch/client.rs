//! HTTP client for downloading tiles.
//!
//! One attempt per call. The widget re-requests tiles on pan and re-render,
//! so retrying here would only delay the cache/placeholder fallback.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::config::NetworkConfig;

use super::FetchError;

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchError>> + Send + 'a>>;

/// Downloads the raw bytes behind a tile URL.
pub trait TileFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}

/// reqwest-backed fetcher.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTileFetcher {
    client: Client,
}

impl HttpTileFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    pub fn from_config(config: &NetworkConfig) -> Result<Self, FetchError> {
        Self::new(config.request_timeout(), &config.user_agent)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await.map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let expected = response.content_length();
        let body = response.bytes().await.map_err(FetchError::from_reqwest)?;
        check_length(expected, body.len())?;

        debug!(url, bytes = body.len(), "Tile downloaded");
        Ok(body.to_vec())
    }
}

impl TileFetcher for HttpTileFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(self.download(url))
    }
}

/// A body shorter than the advertised length is a partial download.
fn check_length(expected: Option<u64>, received: usize) -> Result<(), FetchError> {
    match expected {
        Some(expected) if expected != received as u64 => Err(FetchError::Truncated {
            expected,
            received: received as u64,
        }),
        _ => Ok(()),
    }
}
