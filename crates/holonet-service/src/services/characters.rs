use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::caching::{Cacher, FetchError, ItemKind};
use crate::config::UpstreamConfig;
use crate::download::Headers;
use crate::extract::{ResultsEnvelope, decode, url_list};

/// Characters of this species are never part of search results.
const EXCLUDED_SPECIES: &str = "Droid";

/// Characters need to appear in at least this many films.
const MIN_FILMS: usize = 2;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("character search requires the production API, enable `upstream.use_prod`")]
    Forbidden,
    #[error("failed to search characters")]
    Fetch(#[from] FetchError),
}

/// A character matching a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Character {
    pub name: String,
    /// Species names, empty for species that could not be resolved.
    pub species: Vec<String>,
    pub edited: Option<String>,
    pub film_count: usize,
}

#[derive(Debug, Clone)]
pub struct CharacterService {
    cacher: Cacher,
    upstream: UpstreamConfig,
}

impl CharacterService {
    pub fn new(cacher: Cacher, upstream: UpstreamConfig) -> Self {
        Self { cacher, upstream }
    }

    /// Searches the production API for characters matching `query`.
    ///
    /// Droids and characters appearing in fewer than two films are dropped. The search itself
    /// is never cached, the species and films it references are.
    #[tracing::instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<Character>, SearchError> {
        if !self.upstream.use_prod {
            return Err(SearchError::Forbidden);
        }

        let headers = self.upstream.headers();
        let url = format!("{}/api/people/", self.upstream.base_url());
        let params = [("search", query), ("expand", "species,films")];

        let people = self.cacher.fetcher().fetch(&url, &params, &headers).await?;
        let people: ResultsEnvelope<Value> = decode(&url, people)?;
        let people = people.results;

        let species_urls: BTreeSet<_> = people
            .iter()
            .flat_map(|person| url_list(person, "species"))
            .collect();
        let film_urls: BTreeSet<_> = people
            .iter()
            .flat_map(|person| url_list(person, "films"))
            .collect();

        let species = self.lookup(ItemKind::Species, species_urls, &headers).await;
        // Only warms the cache, the films are counted by URL.
        self.lookup(ItemKind::Films, film_urls, &headers).await;

        let species_names: HashMap<_, _> = species
            .iter()
            .filter_map(|species| {
                let url = species.get("url")?.as_str()?;
                let name = species.get("name").and_then(Value::as_str).unwrap_or("");
                Some((url, name))
            })
            .collect();

        let mut characters = Vec::new();
        for person in &people {
            let species: Vec<String> = url_list(person, "species")
                .iter()
                .map(|url| {
                    species_names
                        .get(url.as_str())
                        .copied()
                        .unwrap_or_default()
                        .to_owned()
                })
                .collect();
            if species.iter().any(|name| name == EXCLUDED_SPECIES) {
                continue;
            }

            let film_count = url_list(person, "films").len();
            if film_count < MIN_FILMS {
                continue;
            }

            characters.push(Character {
                name: str_field(person, "name").unwrap_or_default(),
                species,
                edited: str_field(person, "edited"),
                film_count,
            });
        }

        tracing::debug!(
            matches = people.len(),
            valid = characters.len(),
            "Character search completed"
        );
        Ok(characters)
    }

    /// Resolves all `urls` through the cache, degrading to no results on failure.
    async fn lookup(
        &self,
        kind: ItemKind,
        urls: BTreeSet<String>,
        headers: &Headers,
    ) -> Vec<Value> {
        let urls: Vec<_> = urls.into_iter().collect();
        match self
            .cacher
            .parallel_cached_get(kind, &urls, headers, None)
            .await
        {
            Ok(values) => values,
            Err(err) => {
                let stderr: &dyn std::error::Error = &err;
                tracing::error!(stderr, kind = kind.as_str(), "Batch request failed, skipping");
                Vec::new()
            }
        }
    }
}

fn str_field(data: &Value, field: &str) -> Option<String> {
    data.get(field).and_then(Value::as_str).map(str::to_owned)
}
