//! Finds the person with the longest flight in the TripPin OData people dataset.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::caching::{Cacher, FetchError, ODataCache};
use crate::download::Headers;
use crate::extract::{ODataEnvelope, decode};

/// The TripPin service rejects requests without a browser user agent.
const ODATA_USER_AGENT: &str = "Mozilla/5.0";

/// Which people dataset to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    /// A small built-in dataset.
    Mock,
    /// The live TripPin service.
    Real,
}

impl Dataset {
    pub fn from_use_mock(use_mock: bool) -> Self {
        if use_mock { Self::Mock } else { Self::Real }
    }

    /// The user id the dataset is cached under.
    fn cache_user_id(self) -> &'static str {
        match self {
            Self::Mock => "trip_pin_people_mock",
            Self::Real => "trip_pin_people_real",
        }
    }
}

#[derive(Debug, Error)]
pub enum FlightError {
    #[error("failed to fetch people data and nothing is cached")]
    Upstream(#[source] FetchError),
}

/// The person with the longest single flight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongestFlight {
    pub person: String,
    pub distance: f64,
    /// All distinct airlines the person flew with, sorted.
    pub airlines: Vec<String>,
}

/// The outcome of [`FlightService::longest_flight`].
#[derive(Debug, Clone, PartialEq)]
pub enum FlightReport {
    Longest(LongestFlight),
    /// Nobody flew with at least two airlines.
    NoValidFlights,
    /// The dataset is empty.
    NoData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Person {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    flights: Option<Vec<Flight>>,
}

impl Person {
    fn name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or_default();
        let last = self.last_name.as_deref().unwrap_or_default();
        format!("{first} {last}").trim().to_owned()
    }

    fn flights(&self) -> &[Flight] {
        self.flights.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Flight {
    #[serde(default)]
    airline_code: Option<String>,
    #[serde(default)]
    distance: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct FlightService {
    cacher: Cacher,
    cache: ODataCache,
    odata_base_url: String,
    ttl: Duration,
}

impl FlightService {
    pub fn new(cacher: Cacher, cache: ODataCache, odata_base_url: String, ttl: Duration) -> Self {
        Self {
            cacher,
            cache,
            odata_base_url,
            ttl,
        }
    }

    /// Finds the person with the longest flight among those who flew with at least two
    /// airlines.
    ///
    /// The dataset is served from the cache while it is fresh, and loaded and cached otherwise.
    /// If loading fails, a cached dataset is used as fallback.
    #[tracing::instrument(skip(self))]
    pub async fn longest_flight(&self, dataset: Dataset) -> Result<FlightReport, FlightError> {
        let user_id = dataset.cache_user_id();

        let people = match self.read_cache(user_id).await {
            Some(people) => {
                tracing::info!("Serving people data from cache");
                people
            }
            None => match self.load(dataset).await {
                Ok(people) => {
                    if let Err(err) = self.cache.cache_put(user_id, people.clone(), self.ttl).await
                    {
                        let stderr: &dyn std::error::Error = &err;
                        tracing::warn!(stderr, "Failed to store people data");
                    }
                    people
                }
                Err(err) => {
                    let stderr: &(dyn std::error::Error + Send + Sync) = &err;
                    tracing::error!(stderr, "Failed to fetch people data");
                    self.read_cache(user_id)
                        .await
                        .ok_or(FlightError::Upstream(err))?
                }
            },
        };

        let people = match decode_people(people) {
            Ok(people) => people,
            Err(err) => {
                let stderr: &dyn std::error::Error = &err;
                tracing::error!(stderr, "Malformed people data");
                return Ok(FlightReport::NoData);
            }
        };
        if people.is_empty() {
            return Ok(FlightReport::NoData);
        }

        Ok(match find_longest_flight(&people) {
            Some(longest) => FlightReport::Longest(longest),
            None => FlightReport::NoValidFlights,
        })
    }

    /// Reads a non-empty dataset from the cache.
    ///
    /// An unreachable cache is treated like a miss.
    async fn read_cache(&self, user_id: &str) -> Option<Value> {
        match self.cache.cache_get(user_id, self.ttl).await {
            Ok(people) => people.filter(|people| !is_empty_list(people)),
            Err(err) => {
                let stderr: &dyn std::error::Error = &err;
                tracing::warn!(stderr, "Failed to read people data from cache");
                None
            }
        }
    }

    async fn load(&self, dataset: Dataset) -> Result<Value, FetchError> {
        match dataset {
            Dataset::Mock => Ok(mock_people()),
            Dataset::Real => self.fetch_people().await,
        }
    }

    /// Fetches all people, following `@odata.nextLink`.
    async fn fetch_people(&self) -> Result<Value, FetchError> {
        let mut headers = Headers::new();
        headers.insert("User-Agent".into(), ODATA_USER_AGENT.into());

        let base_url = self.odata_base_url.trim_end_matches('/');
        let mut next_link = Some(format!(
            "{base_url}/People?$select=FirstName,LastName,UserName&$expand=Flights($select=Distance,AirlineCode)"
        ));

        let mut people = Vec::new();
        while let Some(url) = next_link.take().filter(|url| !url.is_empty()) {
            tracing::debug!(url, "Fetching people");
            let page = self.cacher.fetcher().fetch(&url, &[], &headers).await?;
            let page: ODataEnvelope<Value> = decode(&url, page)?;
            people.extend(page.value);
            next_link = page.next_link;
        }
        Ok(Value::Array(people))
    }
}

/// Decodes a list of people, skipping malformed records.
fn decode_people(people: Value) -> Result<Vec<Person>, serde_json::Error> {
    let people: Vec<Value> = serde_json::from_value(people)?;
    Ok(people
        .into_iter()
        .filter_map(|person| match serde_json::from_value(person) {
            Ok(person) => Some(person),
            Err(err) => {
                let stderr: &dyn std::error::Error = &err;
                tracing::warn!(stderr, "Skipping malformed person");
                None
            }
        })
        .collect())
}

fn is_empty_list(value: &Value) -> bool {
    value.as_array().is_some_and(Vec::is_empty)
}

/// Picks the person with the greatest single flight distance among those with at least two
/// distinct airlines. The first person wins a tie.
fn find_longest_flight(people: &[Person]) -> Option<LongestFlight> {
    let mut best: Option<LongestFlight> = None;

    for person in people {
        let airlines: BTreeSet<&str> = person
            .flights()
            .iter()
            .filter_map(|flight| flight.airline_code.as_deref())
            .filter(|code| !code.is_empty())
            .collect();
        if airlines.len() < 2 {
            continue;
        }

        let Some(distance) = person
            .flights()
            .iter()
            .filter_map(|flight| flight.distance)
            .filter(|distance| *distance != 0.0)
            .reduce(f64::max)
        else {
            continue;
        };

        if best.as_ref().is_none_or(|best| distance > best.distance) {
            best = Some(LongestFlight {
                person: person.name(),
                distance,
                airlines: airlines.into_iter().map(str::to_owned).collect(),
            });
        }
    }

    best
}

fn mock_people() -> Value {
    json!([
        {
            "FirstName": "John",
            "LastName": "Doe",
            "Flights": [
                {"AirlineCode": "AA", "Distance": 1500},
                {"AirlineCode": "UA", "Distance": 2000},
            ],
        },
        {
            "FirstName": "Jane",
            "LastName": "Smith",
            "Flights": [
                {"AirlineCode": "DL", "Distance": 2200},
                {"AirlineCode": "AA", "Distance": 2100},
            ],
        },
        {
            "FirstName": "SingleAirline",
            "LastName": "Person",
            "Flights": [{"AirlineCode": "SW", "Distance": 1200}],
        },
    ])
}
