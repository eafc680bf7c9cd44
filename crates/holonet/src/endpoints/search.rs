use axum::Json;
use axum::extract::{Query, State};
use holonet_service::services::{Character, SharedServices};
use serde::{Deserialize, Serialize};

use super::ResponseError;

fn default_query() -> String {
    "Grievous".to_owned()
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default = "default_query")]
    query: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SearchResponse {
    Characters { characters: Vec<Character> },
    Message { message: &'static str },
}

pub async fn search_characters(
    State(services): State<SharedServices>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ResponseError> {
    let characters = services.characters.search(&params.query).await?;

    Ok(Json(if characters.is_empty() {
        SearchResponse::Message {
            message: "No valid characters found",
        }
    } else {
        SearchResponse::Characters { characters }
    }))
}

#[cfg(test)]
mod tests {
    use holonet_test::Upstream;
    use reqwest::StatusCode;
    use serde_json::{Value, json};

    use crate::endpoints::test;

    #[tokio::test]
    async fn test_default_query() {
        let upstream = Upstream::new();
        let server = test::server(&upstream, true);

        let response = reqwest::get(server.url("/search-characters")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = response.json().await.unwrap();
        assert_eq!(
            body,
            json!({"characters": [{
                "name": "General Grievous",
                "species": ["Kaleesh"],
                "edited": "2014-12-20T21:17:56.891000Z",
                "film_count": 2,
            }]})
        );
    }

    #[tokio::test]
    async fn test_no_valid_characters() {
        let upstream = Upstream::new();
        let server = test::server(&upstream, true);

        // Darth Maul appears in a single film
        let response = reqwest::get(server.url("/search-characters?query=maul"))
            .await
            .unwrap();
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({"message": "No valid characters found"}));
    }

    #[tokio::test]
    async fn test_forbidden() {
        let upstream = Upstream::new();
        let server = test::server(&upstream, false);

        let response = reqwest::get(server.url("/search-characters")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body: Value = response.json().await.unwrap();
        assert!(body["detail"].as_str().unwrap().contains("use_prod"));
        assert_eq!(upstream.accesses(), 0);
    }
}
