//! Fetching JSON documents from upstream HTTP APIs.
//!
//! The [`Fetch`] trait is the single outbound call underneath all caching. [`HttpFetcher`]
//! implements it on top of [`reqwest`].

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, header};
use serde_json::Value;

use crate::caching::FetchError;
use crate::config::Config;

#[cfg(test)]
pub mod testutils;

/// HTTP User-Agent string to use.
pub const USER_AGENT: &str = concat!("holonet/", env!("CARGO_PKG_VERSION"));

/// Extra headers sent along with a request, e.g. `API-TOKEN`.
pub type Headers = BTreeMap<String, String>;

/// A single outbound GET returning a JSON document.
///
/// Implementations never retry.
#[async_trait]
pub trait Fetch: fmt::Debug + Send + Sync {
    /// Requests `url` with the given query `params` and `headers` and decodes the body as JSON.
    async fn fetch(
        &self,
        url: &str,
        params: &[(&str, &str)],
        headers: &Headers,
    ) -> Result<Value, FetchError>;
}

/// Timeouts for all upstream requests.
#[derive(Copy, Clone, Debug)]
pub struct FetchTimeouts {
    /// The timeout for establishing a connection.
    pub connect: Duration,
    /// Global timeout for one request, including reading the body.
    pub request: Duration,
}

impl FetchTimeouts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect: config.connect_timeout,
            request: config.request_timeout,
        }
    }
}

impl Default for FetchTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            request: Duration::from_secs(30),
        }
    }
}

/// Creates a [`reqwest::Client`] with the provided timeouts.
///
/// Idle connections are not kept around, every request opens a fresh connection.
pub fn create_client(timeouts: &FetchTimeouts) -> reqwest::Result<Client> {
    reqwest::ClientBuilder::new()
        .gzip(true)
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.request)
        .pool_max_idle_per_host(0)
        .user_agent(USER_AGENT)
        .build()
}

/// Fetcher implementation for HTTP APIs.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_inner(
        &self,
        url: &str,
        params: &[(&str, &str)],
        headers: &Headers,
    ) -> Result<Value, FetchError> {
        let transport_error = |source| FetchError::HttpTransport {
            url: url.to_owned(),
            source,
        };

        let mut builder = self.client.get(url);
        if !params.is_empty() {
            builder = builder.query(params);
        }
        for (key, value) in headers {
            let name = match header::HeaderName::from_bytes(key.as_bytes()) {
                Ok(name) => name,
                Err(_) => {
                    tracing::warn!(
                        header = key.as_str(),
                        url,
                        "Skipping header with invalid name"
                    );
                    continue;
                }
            };
            let value = match header::HeaderValue::from_str(value) {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!(
                        header = key.as_str(),
                        url,
                        "Skipping header with invalid value"
                    );
                    continue;
                }
            };
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("Unexpected status code from `{}`: {}", url, status);
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        let body = response.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&body).map_err(|source| FetchError::HttpDecode {
            url: url.to_owned(),
            source,
        })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    #[tracing::instrument(skip(self, headers))]
    async fn fetch(
        &self,
        url: &str,
        params: &[(&str, &str)],
        headers: &Headers,
    ) -> Result<Value, FetchError> {
        tracing::debug!("Fetching `{}`", url);
        let start = Instant::now();
        let result = self.fetch_inner(url, params, headers).await;

        let status = match &result {
            Ok(_) => "ok",
            Err(err) => err.kind(),
        };
        metric!(timer("download.duration") = start.elapsed(), "status" => status);
        if let Err(ref err) = result {
            let stderr: &dyn std::error::Error = err;
            tracing::error!(stderr, "Failed to fetch `{}`", url);
        }

        result
    }
}
