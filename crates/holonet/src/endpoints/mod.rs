use axum::Router;
use axum::middleware;
use axum::routing::get;
use holonet_service::metric;
use holonet_service::services::SharedServices;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

mod error;
mod etl;
mod flights;
mod metrics;
mod search;

pub use error::ResponseError;

use etl::run_etl;
use flights::longest_flight;
use search::search_characters;

pub async fn healthcheck() -> &'static str {
    metric!(counter("healthcheck") += 1);
    "ok"
}

pub fn create_app(services: SharedServices) -> Router {
    // The layers here go "top to bottom" according to the reading order here.
    let layer = ServiceBuilder::new()
        .layer(NewSentryLayer::new_from_top())
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics::track_metrics));
    Router::new()
        .route("/run-etl", get(run_etl))
        .route("/search-characters", get(search_characters))
        .route("/odata-longest-flight", get(longest_flight))
        .with_state(services)
        .layer(layer)
        // the healthcheck is last, as it will bypass all the middlewares
        .route("/healthcheck", get(healthcheck))
}
