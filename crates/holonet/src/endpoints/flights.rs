use axum::Json;
use axum::extract::{Query, State};
use holonet_service::services::{Dataset, FlightReport, LongestFlight, SharedServices};
use serde::{Deserialize, Serialize};

use super::ResponseError;

#[derive(Debug, Deserialize)]
pub struct FlightParams {
    #[serde(default)]
    use_mock: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum FlightResponse {
    Longest(LongestFlight),
    Message { message: &'static str },
}

pub async fn longest_flight(
    State(services): State<SharedServices>,
    Query(params): Query<FlightParams>,
) -> Result<Json<FlightResponse>, ResponseError> {
    let dataset = Dataset::from_use_mock(params.use_mock);
    let report = services.flights.longest_flight(dataset).await?;

    Ok(Json(match report {
        FlightReport::Longest(longest) => FlightResponse::Longest(longest),
        FlightReport::NoValidFlights => FlightResponse::Message {
            message: "No valid flights",
        },
        FlightReport::NoData => FlightResponse::Message {
            message: "No data available (cache or new).",
        },
    }))
}

#[cfg(test)]
mod tests {
    use holonet_test::Upstream;
    use reqwest::StatusCode;
    use serde_json::{Value, json};

    use crate::endpoints::test;

    #[tokio::test]
    async fn test_mock() {
        let upstream = Upstream::new();
        let server = test::server(&upstream, false);

        let response = reqwest::get(server.url("/odata-longest-flight?use_mock=true"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = response.json().await.unwrap();
        assert_eq!(
            body,
            json!({"person": "Jane Smith", "distance": 2200.0, "airlines": ["AA", "DL"]})
        );
    }

    #[tokio::test]
    async fn test_real() {
        let upstream = Upstream::new();
        let server = test::server(&upstream, false);

        let response = reqwest::get(server.url("/odata-longest-flight"))
            .await
            .unwrap();
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["person"], "Ronald Mundy");
        assert_eq!(body["airlines"], json!(["AA", "MU"]));
    }

    #[tokio::test]
    async fn test_upstream_down() {
        let upstream = Upstream::new();
        let base_url = upstream.url("respond_statuscode/503").to_string();
        let server = test::server_with_base(base_url, false);

        let response = reqwest::get(server.url("/odata-longest-flight"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
