use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use holonet_service::caching::FetchError;
use holonet_service::services::{FlightError, SearchError};
use sentry::integrations::anyhow::capture_anyhow;
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub struct ResponseError {
    status: StatusCode,
    err: anyhow::Error,
}

impl From<FetchError> for ResponseError {
    fn from(err: FetchError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            err: err.into(),
        }
    }
}

impl From<SearchError> for ResponseError {
    fn from(err: SearchError) -> Self {
        let status = match err {
            SearchError::Forbidden => StatusCode::FORBIDDEN,
            SearchError::Fetch(_) => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            err: err.into(),
        }
    }
}

impl From<FlightError> for ResponseError {
    fn from(err: FlightError) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            err: err.into(),
        }
    }
}

impl From<(StatusCode, anyhow::Error)> for ResponseError {
    fn from((status, err): (StatusCode, anyhow::Error)) -> Self {
        Self { status, err }
    }
}

impl From<anyhow::Error> for ResponseError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            err,
        }
    }
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            capture_anyhow(&self.err);
        }
        let mut response = Json(ApiErrorResponse::from(self.err)).into_response();
        *response.status_mut() = self.status;
        response
    }
}

/// An error response from an api.
#[derive(Serialize, Deserialize, Default, Debug)]
pub struct ApiErrorResponse {
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causes: Option<Vec<String>>,
}

impl From<anyhow::Error> for ApiErrorResponse {
    fn from(err: anyhow::Error) -> Self {
        let mut chain = err.chain().map(|err| err.to_string());
        let detail = chain.next();
        let causes: Vec<_> = chain.collect();
        let causes = if causes.is_empty() {
            None
        } else {
            Some(causes)
        };

        ApiErrorResponse { detail, causes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_chain() {
        let err = FetchError::HttpStatus {
            status: 503,
            url: "https://swapi.dev/api/people/".into(),
        };
        let response = ApiErrorResponse::from(anyhow::Error::from(SearchError::Fetch(err)));

        assert_eq!(response.detail.as_deref(), Some("failed to search characters"));
        assert_eq!(response.causes.unwrap().len(), 1);
    }

    #[test]
    fn test_no_causes() {
        let response = ApiErrorResponse::from(anyhow::anyhow!("boom"));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({"detail": "boom"})
        );
    }

    #[test]
    fn test_status() {
        let forbidden = ResponseError::from(SearchError::Forbidden).into_response();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let err = FetchError::CacheConnect("connection refused".into());
        let upstream = ResponseError::from(FlightError::Upstream(err)).into_response();
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
    }
}
