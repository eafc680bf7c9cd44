use thiserror::Error;

/// An error that happens when resolving an upstream resource.
///
/// Errors of the shared cache other than failing to connect are never surfaced here, they
/// are logged and the shared cache is skipped.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be sent or the response could not be read.
    ///
    /// This covers DNS resolution, connection resets and timeouts.
    #[error("failed to fetch {url}")]
    HttpTransport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The upstream answered with a non-success status.
    #[error("{url} responded with status {status}")]
    HttpStatus { status: u16, url: String },
    /// The response body is not the JSON we expected.
    #[error("failed to decode response from {url}")]
    HttpDecode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    /// The shared cache is unreachable.
    #[error("failed to connect to the shared cache: {0}")]
    CacheConnect(String),
    /// Pagination followed more pages than allowed by `max_pages`.
    #[error("pagination exceeded the limit of {limit} pages")]
    PaginationLimit { limit: usize },
}

impl FetchError {
    /// A short name of this error kind, for use in metric tags.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::HttpTransport { .. } => "transport",
            FetchError::HttpStatus { .. } => "status",
            FetchError::HttpDecode { .. } => "decode",
            FetchError::CacheConnect(_) => "cache-connect",
            FetchError::PaginationLimit { .. } => "pagination-limit",
        }
    }

    /// Whether this error was caused by an upstream API rather than by Holonet's own
    /// infrastructure.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            FetchError::HttpTransport { .. }
                | FetchError::HttpStatus { .. }
                | FetchError::HttpDecode { .. }
        )
    }
}
