//! Extraction of upstream listings.
//!
//! Upstream payloads are decoded into the envelopes in this module right after they were
//! resolved through the [`Cacher`]. A payload of an unexpected shape fails with
//! [`FetchError::HttpDecode`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::caching::{CacheKey, Cacher, FetchError, last_path_segment};
use crate::download::Headers;

/// One page of a paginated REST listing.
#[derive(Debug, Clone, Deserialize)]
pub struct PageEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    /// The URL of the next page. Absent, `null` or empty on the last page.
    #[serde(default)]
    pub next: Option<String>,
}

/// A listing that is not paginated, like a batch lookup or a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

/// One page of an OData collection.
#[derive(Debug, Clone, Deserialize)]
pub struct ODataEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(default, rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// Decodes a JSON document fetched from `url`.
pub fn decode<T: DeserializeOwned>(url: &str, value: Value) -> Result<T, FetchError> {
    serde_json::from_value(value).map_err(|source| FetchError::HttpDecode {
        url: url.to_owned(),
        source,
    })
}

/// Follows `next` links starting at `start_url` and concatenates the results of all pages.
///
/// Pages are fetched one after the other through the cache, keyed by their URL. When
/// `max_pages` is set and more pages would be needed, this fails with
/// [`FetchError::PaginationLimit`].
#[tracing::instrument(skip(cacher, headers))]
pub async fn fetch_vehicles_paginated(
    cacher: &Cacher,
    start_url: &str,
    headers: &Headers,
    max_pages: Option<usize>,
) -> Result<ResultsEnvelope<Value>, FetchError> {
    let mut results = Vec::new();
    let mut cursor = Some(start_url.to_owned());
    let mut pages = 0;

    while let Some(url) = cursor.take().filter(|url| !url.is_empty()) {
        if let Some(limit) = max_pages {
            if pages >= limit {
                return Err(FetchError::PaginationLimit { limit });
            }
        }

        let page = cacher
            .cached_get(CacheKey::page(&url), &url, &[], headers, None)
            .await?;
        let page: PageEnvelope<Value> = decode(&url, page)?;
        pages += 1;

        tracing::debug!(page = pages, results = page.results.len(), "Fetched page");
        results.extend(page.results);
        cursor = page.next;
    }

    metric!(counter("extract.pages") += pages as i64);
    Ok(ResultsEnvelope { results })
}

#[derive(Debug, Deserialize)]
struct FilmSummary {
    #[serde(default)]
    url: Option<String>,
}

/// Searches `films_url` for `title` and returns the URL of the first match.
pub async fn find_film_url(
    cacher: &Cacher,
    films_url: &str,
    title: &str,
    headers: &Headers,
) -> Result<Option<String>, FetchError> {
    let key = CacheKey::search(format!("film_{}", title.to_lowercase().replace(' ', "_")));
    let films = cacher
        .cached_get(key, films_url, &[("search", title)], headers, None)
        .await?;
    let films: ResultsEnvelope<FilmSummary> = decode(films_url, films)?;

    let url = films
        .results
        .into_iter()
        .next()
        .and_then(|film| film.url)
        .filter(|url| !url.is_empty());
    if url.is_none() {
        tracing::error!(title, "Film not found in API response");
    }
    Ok(url)
}

/// Returns the non-empty strings of the array `field` in `object`, like the `films` of a
/// vehicle.
pub fn url_list(object: &Value, field: &str) -> Vec<String> {
    let Some(urls) = object.get(field).and_then(Value::as_array) else {
        return Vec::new();
    };
    urls.iter()
        .filter_map(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Extracts the ids from pilot URLs like `https://swapi.dev/api/people/1/`.
pub fn pilot_ids(urls: &[String]) -> Vec<String> {
    urls.iter()
        .map(|url| last_path_segment(url).to_owned())
        .collect()
}
