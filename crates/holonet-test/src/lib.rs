//! Helpers for testing the web server and service.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using [`tempdir`], make sure that the handle to the temp directory is held for the
//!    entire lifetime of the test.
//!
//!  - When using [`Upstream`], make sure that it is held until all requests to it have been
//!    made. Dropping it stops the server, and all connections to it will fail. Assign it to a
//!    variable: `let upstream = Upstream::new();`.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{self, Query, Request};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::routing::get;
use axum::{Json, Router};
use reqwest::Url;
use serde_json::{Value, json};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

pub use tempfile::TempDir;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the holonet crates and mutes all
///    other logs (such as hyper or redis).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("holonet_service=trace,holonet=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a temporary directory.
///
/// The directory is deleted when the [`TempDir`] instance is dropped, unless
/// [`into_path`](TempDir::into_path) is called. Use it as a guard to automatically clean up after
/// tests.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}

/// A test server that binds to a random port and serves a web app.
///
/// This server requires a `tokio` runtime and is supposed to be run in a `tokio::test`. It
/// automatically stops serving when dropped.
#[derive(Debug)]
pub struct Server {
    pub handle: tokio::task::JoinHandle<()>,
    pub socket: SocketAddr,
}

impl Server {
    /// Creates a new test server serving the given `router`.
    pub fn new(router: Router) -> Self {
        let listener = std::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();
        let listener = tokio::net::TcpListener::from_std(listener).unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.port(), path)
            .parse()
            .unwrap()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A fake upstream API that counts every request it receives.
///
/// Besides a few generic routes for testing the HTTP client, it serves a small, fixed
/// dataset in the shape of the Star Wars API and of the TripPin OData service:
///
/// - `/vehicles` and `/api/vehicles`: two pages of vehicles,
/// - `/single/vehicles`: a single page with a single vehicle,
/// - `/api/films/?search=<title>`, `/api/films/<id>/`: films,
/// - `/api/species/<id>/`: species,
/// - `/api/people/?id=<ids>` and `/api/people/?search=<name>`: people,
/// - `/odata/People`: two pages of people with their flights,
/// - `/headers`: the request headers as a JSON object,
/// - `/json/<path>`: `{"path": "<path>"}`,
/// - `/respond_statuscode/<num>/<path>`: an empty response with the given status,
/// - `/garbage_data/<path>`: the path as plain text.
pub struct Upstream {
    server: Server,
    hits: Arc<Mutex<BTreeMap<String, usize>>>,
}

impl Upstream {
    pub fn new() -> Self {
        let hits = Arc::new(Mutex::new(BTreeMap::new()));

        let hitcounter = {
            let hits = hits.clone();
            move |extract::OriginalUri(uri), req: Request, next: Next| {
                let hits = hits.clone();
                async move {
                    {
                        let key = uri
                            .path_and_query()
                            .map(|pq| pq.to_string())
                            .unwrap_or_else(|| uri.path().to_owned());
                        let mut hits = hits.lock().unwrap();
                        *hits.entry(key).or_default() += 1;
                    }

                    next.run(req).await
                }
            }
        };

        let router = Router::new()
            .route("/vehicles", get(vehicles))
            .route("/api/vehicles", get(vehicles))
            .route(
                "/single/vehicles",
                get(|| async { Json(json!({"results": [{"name": "Speeder"}], "next": null})) }),
            )
            .route("/api/films/", get(film_search))
            .route("/api/films/:id/", get(film))
            .route("/api/species/:id/", get(species))
            .route("/api/people/", get(people))
            .route("/odata/People", get(odata_people))
            .route("/headers", get(echo_headers))
            .route(
                "/json/*path",
                get(|extract::Path(path): extract::Path<String>| async move {
                    Json(json!({ "path": path }))
                }),
            )
            .route(
                "/respond_statuscode/:num/*tail",
                get(
                    |extract::Path((num, _)): extract::Path<(u16, String)>| async move {
                        StatusCode::from_u16(num).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                    },
                ),
            )
            .route(
                "/garbage_data/*tail",
                get(|extract::Path(tail): extract::Path<String>| async move { tail }),
            )
            .layer(middleware::from_fn(hitcounter));

        let server = Server::new(router);

        Self { server, hits }
    }

    /// Returns the number of requests received since the last call, and resets the counter.
    pub fn accesses(&self) -> usize {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_values().sum()
    }

    /// Returns all requests received since the last call, and resets the counter.
    ///
    /// Requests are keyed by path and query.
    pub fn all_hits(&self) -> Vec<(String, usize)> {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_iter().collect()
    }

    /// Returns the number of requests received for the given path and query.
    pub fn hits(&self, path_and_query: &str) -> usize {
        let hits = self.hits.lock().unwrap();
        hits.get(path_and_query).copied().unwrap_or_default()
    }

    pub fn url(&self, path: &str) -> Url {
        self.server.url(path)
    }

    /// The base URL of this server, without trailing slash.
    pub fn base_url(&self) -> String {
        self.url("").as_str().trim_end_matches('/').to_owned()
    }
}

impl Default for Upstream {
    fn default() -> Self {
        Self::new()
    }
}

/// `http://<host>` of the incoming request, so that fixtures can link back to this server.
fn origin(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|host| host.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}")
}

async fn vehicles(
    extract::OriginalUri(uri): extract::OriginalUri,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let base = origin(&headers);
    let page = params.get("page").map(String::as_str).unwrap_or("1");

    let body = match page {
        "1" => json!({
            "count": 4,
            "next": format!("{base}{}?page=2", uri.path()),
            "results": [
                {
                    "name": "Sand Crawler",
                    "model": "Digger Crawler",
                    "vehicle_class": "wheeled",
                    "edited": "2014-12-20T21:30:21.661000Z",
                    "films": [format!("{base}/api/films/1/"), format!("{base}/api/films/5/")],
                    "pilots": [],
                },
                {
                    "name": "Snowspeeder",
                    "model": "t-47 airspeeder",
                    "vehicle_class": "airspeeder",
                    "edited": "2014-12-20T21:30:21.672000Z",
                    "films": [format!("{base}/api/films/2/")],
                    "pilots": [format!("{base}/api/people/1/"), format!("{base}/api/people/18/")],
                },
            ],
        }),
        _ => json!({
            "count": 4,
            "next": null,
            "results": [
                {
                    "name": "Sith speeder",
                    "model": "FC-20 speeder bike",
                    "vehicle_class": "speeder",
                    "edited": "2014-12-20T21:30:21.703000Z",
                    "films": [format!("{base}/api/films/4")],
                    "pilots": [format!("{base}/api/people/44/")],
                },
                {
                    "name": "Single Trooper Aerial Platform",
                    "vehicle_class": "repulsorcraft",
                    "films": [format!("{base}/api/films/4/")],
                    "pilots": [],
                },
            ],
        }),
    };
    Json(body)
}

const FILMS: &[(&str, &str)] = &[
    ("1", "A New Hope"),
    ("2", "The Empire Strikes Back"),
    ("3", "Return of the Jedi"),
    ("4", "The Phantom Menace"),
    ("5", "Attack of the Clones"),
    ("6", "Revenge of the Sith"),
];

const SPECIES: &[(&str, &str)] = &[
    ("1", "Human"),
    ("2", "Droid"),
    ("22", "Zabrak"),
    ("28", "Kaleesh"),
];

fn film_json(base: &str, id: &str, title: &str) -> Value {
    json!({ "title": title, "url": format!("{base}/api/films/{id}/") })
}

async fn film_search(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let base = origin(&headers);
    let search = params.get("search").cloned().unwrap_or_default();
    let results: Vec<_> = FILMS
        .iter()
        .filter(|(_, title)| title.contains(search.as_str()))
        .map(|(id, title)| film_json(&base, id, title))
        .collect();
    Json(json!({ "count": results.len(), "next": null, "results": results }))
}

async fn film(
    headers: HeaderMap,
    extract::Path(id): extract::Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let base = origin(&headers);
    FILMS
        .iter()
        .find(|(film_id, _)| *film_id == id)
        .map(|(id, title)| Json(film_json(&base, id, title)))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn species(
    headers: HeaderMap,
    extract::Path(id): extract::Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let base = origin(&headers);
    SPECIES
        .iter()
        .find(|(species_id, _)| *species_id == id)
        .map(|(id, name)| Json(json!({ "name": name, "url": format!("{base}/api/species/{id}/") })))
        .ok_or(StatusCode::NOT_FOUND)
}

fn people_json(base: &str) -> Vec<(&'static str, Value)> {
    let films = |ids: &[&str]| -> Vec<String> {
        ids.iter()
            .map(|id| format!("{base}/api/films/{id}/"))
            .collect()
    };
    let species = |ids: &[&str]| -> Vec<String> {
        ids.iter()
            .map(|id| format!("{base}/api/species/{id}/"))
            .collect()
    };
    let person = |id: &'static str, name: &str, species_ids: &[&str], film_ids: &[&str]| {
        (
            id,
            json!({
                "name": name,
                "species": species(species_ids),
                "films": films(film_ids),
                "homeworld": format!("{base}/api/planets/1/"),
                "edited": "2014-12-20T21:17:56.891000Z",
                "url": format!("{base}/api/people/{id}/"),
            }),
        )
    };

    vec![
        person("1", "Luke Skywalker", &["1"], &["1", "2", "3", "6"]),
        person("3", "R2-D2", &["2"], &["1", "2", "3", "4", "5", "6"]),
        person("18", "Wedge Antilles", &["1"], &["1", "2", "3"]),
        person("44", "Darth Maul", &["22"], &["4"]),
        person("79", "General Grievous", &["28"], &["4", "6"]),
        person("80", "Grievous MagnaGuard", &["2"], &["6", "5"]),
        person("81", "Grievous Impostor", &[], &["6"]),
    ]
}

async fn people(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let base = origin(&headers);
    let people = people_json(&base);

    let results: Vec<Value> = if let Some(ids) = params.get("id") {
        let ids: Vec<&str> = ids.split(',').collect();
        people
            .into_iter()
            .filter(|(id, _)| ids.contains(id))
            .map(|(_, person)| person)
            .collect()
    } else {
        let search = params
            .get("search")
            .map(|s| s.to_lowercase())
            .unwrap_or_default();
        people
            .into_iter()
            .map(|(_, person)| person)
            .filter(|person| {
                person["name"]
                    .as_str()
                    .is_some_and(|name| name.to_lowercase().contains(&search))
            })
            .collect()
    };

    Json(json!({ "count": results.len(), "next": null, "results": results }))
}

async fn odata_people(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let base = origin(&headers);
    let body = match params.get("$skiptoken") {
        None => json!({
            "@odata.context": format!("{base}/odata/$metadata#People"),
            "value": [
                {
                    "FirstName": "Russell",
                    "LastName": "Whyte",
                    "UserName": "russellwhyte",
                    "Flights": [
                        { "AirlineCode": "AA", "Distance": 2000 },
                        { "AirlineCode": "FM", "Distance": 2500 },
                    ],
                },
                {
                    "FirstName": "Scott",
                    "LastName": "Ketchum",
                    "UserName": "scottketchum",
                    "Flights": [{ "AirlineCode": "MU", "Distance": 9000 }],
                },
            ],
            "@odata.nextLink": format!("{base}/odata/People?$skiptoken=2"),
        }),
        Some(_) => json!({
            "@odata.context": format!("{base}/odata/$metadata#People"),
            "value": [
                {
                    "FirstName": "Ronald",
                    "LastName": "Mundy",
                    "UserName": "ronaldmundy",
                    "Flights": [
                        { "AirlineCode": "AA", "Distance": 3100 },
                        { "AirlineCode": "MU", "Distance": 1200 },
                    ],
                },
            ],
        }),
    };
    Json(body)
}

async fn echo_headers(headers: HeaderMap) -> Json<BTreeMap<String, String>> {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_owned())))
        .collect();
    Json(headers)
}
