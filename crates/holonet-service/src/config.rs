use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use sentry::types::Dsn;
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;

use crate::caching::SharedCacheConfig;

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for holonet.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: env::var("STATSD_SERVER").ok(),
            prefix: "holonet".into(),
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Where the upstream APIs live and how to authenticate against them.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the public development API.
    pub dev_base_url: String,

    /// Base URL of the production API.
    ///
    /// Production routes are prefixed with `/api` and require the `API-TOKEN` header.
    pub prod_base_url: String,

    /// Token sent as `API-TOKEN` header to the production API.
    pub api_token: Option<String>,

    /// Talk to the production API instead of the development one.
    pub use_prod: bool,

    /// Base URL of the TripPin OData service.
    pub odata_base_url: String,
}

impl UpstreamConfig {
    /// The base URL of the API selected by [`use_prod`](Self::use_prod).
    pub fn base_url(&self) -> &str {
        let url = if self.use_prod {
            &self.prod_base_url
        } else {
            &self.dev_base_url
        };
        url.trim_end_matches('/')
    }

    /// Headers to send with every request to the selected API.
    pub fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        if self.use_prod {
            if let Some(ref token) = self.api_token {
                headers.insert("API-TOKEN".to_owned(), token.clone());
            }
        }
        headers
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            dev_base_url: "https://swapi.dev/api".into(),
            prod_base_url: "https://mocked-up-url-for-test.com".into(),
            api_token: env::var("API_TOKEN").ok(),
            use_prod: false,
            odata_base_url: "https://services.odata.org/V4/TripPinServiceRW".into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfigs {
    /// Maximum number of entries held by the process-local cache.
    ///
    /// Entries never expire, but the least recently used ones are evicted once this is reached.
    ///
    /// Defaults to `10_000`.
    pub in_memory_capacity: u64,
}

impl Default for CacheConfigs {
    fn default() -> Self {
        Self {
            in_memory_capacity: 10_000,
        }
    }
}

/// See the `README` for more information on config values.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host and port to bind the HTTP webserver to.
    pub bind: String,

    /// Configuration for internal logging.
    pub logging: Logging,

    /// Configuration for reporting metrics to a statsd instance.
    pub metrics: Metrics,

    /// DSN to report internal errors to
    pub sentry_dsn: Option<Dsn>,

    /// The upstream APIs.
    pub upstream: UpstreamConfig,

    /// The timeout for establishing a connection to an upstream API.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// The timeout for a single upstream request, from connecting to reading the last byte.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// The maximum number of concurrent fetches in a batch lookup.
    pub max_concurrent_fetches: usize,

    /// Time-to-live of entries written to the shared cache.
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// An upper bound on the number of pages followed during pagination.
    ///
    /// A value of `None` follows `next` links until the upstream stops sending them.
    pub max_pages: Option<usize>,

    /// Configuration of the process-local cache.
    pub caches: CacheConfigs,

    /// The cache shared between holonet instances.
    pub shared_cache: SharedCacheConfig,

    /// A directory to write JSON backups of every ETL extraction to.
    pub backup_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1:8000".to_owned(),
            logging: Logging::default(),
            metrics: Metrics::default(),
            sentry_dsn: None,
            upstream: UpstreamConfig::default(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            max_concurrent_fetches: 5,
            default_ttl: Duration::from_secs(3600),
            max_pages: None,
            caches: CacheConfigs::default(),
            shared_cache: SharedCacheConfig::default(),
            backup_dir: None,
        }
    }
}

impl Config {
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl de::Visitor<'_> for LevelFilterVisitor {
    type Value = LevelFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            r#"one of the strings "off", "error", "warn", "info", "debug", or "trace""#
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v {
            "off" => Ok(LevelFilter::OFF),
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(de::Error::unknown_variant(
                v,
                &["off", "error", "warn", "info", "debug", "trace"],
            )),
        }
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    deserializer.deserialize_str(LevelFilterVisitor)
}
