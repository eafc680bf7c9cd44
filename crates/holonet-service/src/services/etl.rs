//! The vehicle ETL: extract all vehicles, keep the ones of one film, and enrich them with their
//! pilots.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::caching::{CacheKey, Cacher, FetchError, ItemKind};
use crate::config::UpstreamConfig;
use crate::download::Headers;
use crate::extract::{
    ResultsEnvelope, decode, fetch_vehicles_paginated, find_film_url, pilot_ids, url_list,
};
use crate::transform::{VehicleRecord, transform_vehicle_data};

/// The film vehicles are filtered by in production mode.
pub const FILTER_FILM: &str = "The Phantom Menace";

#[derive(Debug, Clone)]
pub struct EtlService {
    cacher: Cacher,
    upstream: UpstreamConfig,
    max_pages: Option<usize>,
    backup_dir: Option<PathBuf>,
}

impl EtlService {
    pub fn new(
        cacher: Cacher,
        upstream: UpstreamConfig,
        max_pages: Option<usize>,
        backup_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            cacher,
            upstream,
            max_pages,
            backup_dir,
        }
    }

    /// Runs the ETL and returns the transformed vehicles.
    ///
    /// Only failing to extract the vehicles fails the run. Failing to look up the film or the
    /// pilots of a vehicle degrades to no filtering and no pilots respectively.
    #[tracing::instrument(skip_all, fields(use_prod = self.upstream.use_prod))]
    pub async fn run(&self) -> Result<Vec<VehicleRecord>, FetchError> {
        let base_url = self.upstream.base_url();
        let headers = self.upstream.headers();
        let use_prod = self.upstream.use_prod;

        let vehicles_url = if use_prod {
            format!("{base_url}/api/vehicles")
        } else {
            format!("{base_url}/vehicles")
        };
        tracing::info!(url = %vehicles_url, "Starting ETL");

        let extracted =
            fetch_vehicles_paginated(&self.cacher, &vehicles_url, &headers, self.max_pages)
                .await?;
        if let Some(dir) = &self.backup_dir {
            write_backup(dir, &extracted).await;
        }

        let mut vehicles = extracted.results;
        if use_prod {
            vehicles = self.filter_by_film(base_url, &headers, vehicles).await;
        } else {
            tracing::info!("Dev environment: skipping film filter");
        }

        let mut records = Vec::with_capacity(vehicles.len());
        for vehicle in &vehicles {
            let pilots = self.pilot_details(base_url, &headers, vehicle).await;
            records.push(transform_vehicle_data(vehicle, &pilots));
        }

        metric!(counter("etl.vehicles") += records.len() as i64);
        tracing::info!(vehicles = records.len(), "ETL completed");
        Ok(records)
    }

    async fn filter_by_film(
        &self,
        base_url: &str,
        headers: &Headers,
        vehicles: Vec<Value>,
    ) -> Vec<Value> {
        let films_url = format!("{base_url}/api/films/");
        let film_url = match find_film_url(&self.cacher, &films_url, FILTER_FILM, headers).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                tracing::warn!("Film URL not found, no filtering applied");
                return vehicles;
            }
            Err(err) => {
                let stderr: &dyn std::error::Error = &err;
                tracing::warn!(stderr, "Film lookup failed, no filtering applied");
                return vehicles;
            }
        };

        let film_url = film_url.trim_end_matches('/');
        let before = vehicles.len();
        let vehicles: Vec<_> = vehicles
            .into_iter()
            .filter(|vehicle| {
                url_list(vehicle, "films")
                    .iter()
                    .any(|film| film.trim_end_matches('/') == film_url)
            })
            .collect();

        tracing::info!(film_url, before, after = vehicles.len(), "Filtered vehicles by film");
        vehicles
    }

    /// Looks up all pilots of `vehicle` in a single batch request.
    async fn pilot_details(&self, base_url: &str, headers: &Headers, vehicle: &Value) -> Vec<Value> {
        let pilot_urls = url_list(vehicle, "pilots");
        if pilot_urls.is_empty() {
            return Vec::new();
        }

        let ids = pilot_ids(&pilot_urls);
        let url = format!("{base_url}/api/people/?id={}", ids.join(","));
        let key = CacheKey::batch(ItemKind::Pilots, ids);

        let batch = match self.cacher.cached_get(key, &url, &[], headers, None).await {
            Ok(batch) => batch,
            Err(err) => {
                let stderr: &dyn std::error::Error = &err;
                tracing::error!(stderr, "Batch pilot request failed");
                return Vec::new();
            }
        };

        match decode::<ResultsEnvelope<Value>>(&url, batch) {
            Ok(batch) => batch.results,
            Err(err) => {
                let stderr: &dyn std::error::Error = &err;
                tracing::error!(stderr, "Malformed pilot batch");
                Vec::new()
            }
        }
    }
}

/// Writes the raw extraction to a timestamped JSON file in `dir`.
///
/// Failures are logged and otherwise ignored.
async fn write_backup(dir: &Path, extracted: &ResultsEnvelope<Value>) {
    let filename = chrono::Local::now()
        .format("vehicles_data_%Y%m%d_%H%M%S.json")
        .to_string();
    let path = dir.join(filename);

    let result = async {
        let contents = serde_json::to_vec_pretty(extracted)?;
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, contents).await?;
        Ok::<_, std::io::Error>(())
    }
    .await;

    match result {
        Ok(()) => tracing::info!(path = %path.display(), "Backup saved"),
        Err(err) => {
            let stderr: &dyn std::error::Error = &err;
            tracing::warn!(stderr, path = %path.display(), "Failed to persist backup");
        }
    }
}
