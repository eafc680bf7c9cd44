//! Holonet.
//!
//! Holonet is a small web service that aggregates data from the Star Wars API and the TripPin
//! OData service. All upstream responses go through a two-tier cache, a bounded in-memory layer
//! in front of a Redis instance shared between Holonet instances.

#![warn(
    missing_debug_implementations,
    unused_crate_dependencies,
    clippy::all
)]

mod cli;
mod endpoints;
mod healthcheck;
mod logging;
mod server;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
