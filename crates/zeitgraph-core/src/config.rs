use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::resolve::{BlockingStrategy, FuzzyMetric};

const ENV_PREFIX: &str = "ZEITGRAPH_";

/// Entity resolution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Pairs scoring at or above this are merged
    pub merge_threshold: f64,
    pub metric: FuzzyMetric,
    pub blocking: BlockingStrategy,
    /// Scoring threads. `None` uses the available parallelism.
    pub workers: Option<usize>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            merge_threshold: 0.85,
            metric: FuzzyMetric::default(),
            blocking: BlockingStrategy::default(),
            workers: None,
        }
    }
}

impl ResolverConfig {
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        })
    }
}

/// Nominatim-compatible geocoding service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub endpoint: String,
    /// Nominatim's usage policy rejects requests without an identifying agent
    pub user_agent: String,
    pub connect_timeout_seconds: u32,
    pub request_timeout_seconds: u32,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: format!("zeitgraph/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout_seconds: 10,
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    pub max_concurrent_lookups: usize,
    pub geocoder: GeocoderConfig,
    /// Sqlite file for persisting lookups across runs. In-memory when unset.
    pub cache_path: Option<PathBuf>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent_lookups: 4,
            geocoder: GeocoderConfig::default(),
            cache_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub sources_delimiter: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            sources_delimiter: "|".to_string(),
        }
    }
}

/// Bolt connection used by the graph store loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphStoreConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for GraphStoreConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
        }
    }
}

/// Settings for one integration run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub resolver: ResolverConfig,
    pub enrichment: EnrichmentConfig,
    pub export: ExportConfig,
    pub graph: GraphStoreConfig,
}

impl PipelineConfig {
    /// Read a JSON config file. Missing sections take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `ZEITGRAPH_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(format!("{ENV_PREFIX}{name}")).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
            value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: format!("{ENV_PREFIX}{name}"),
                value: value.to_string(),
            })
        }

        if let Some(v) = lookup("MERGE_THRESHOLD") {
            self.resolver.merge_threshold = parse("MERGE_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("WORKERS") {
            self.resolver.workers = Some(parse("WORKERS", &v)?);
        }
        if let Some(v) = lookup("ENRICH") {
            self.enrichment.enabled = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = lookup("MAX_CONCURRENT_LOOKUPS") {
            self.enrichment.max_concurrent_lookups = parse("MAX_CONCURRENT_LOOKUPS", &v)?;
        }
        if let Some(v) = lookup("GEOCODER_URL") {
            self.enrichment.geocoder.endpoint = v;
        }
        if let Some(v) = lookup("USER_AGENT") {
            self.enrichment.geocoder.user_agent = v;
        }
        if let Some(v) = lookup("CACHE") {
            self.enrichment.cache_path =
                Some(PathBuf::from(v)).filter(|p| !p.as_os_str().is_empty());
        }
        if let Some(v) = lookup("NEO4J_URI") {
            self.graph.uri = v;
        }
        if let Some(v) = lookup("NEO4J_USER") {
            self.graph.user = v;
        }
        if let Some(v) = lookup("NEO4J_PASSWORD") {
            self.graph.password = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.resolver.merge_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        if self.resolver.workers == Some(0) {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.enrichment.max_concurrent_lookups == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.enrichment.enabled {
            url::Url::parse(&self.enrichment.geocoder.endpoint)?;
            if self.enrichment.geocoder.user_agent.trim().is_empty() {
                return Err(ConfigError::MissingUserAgent);
            }
        }
        if self.export.sources_delimiter.is_empty()
            || self.export.sources_delimiter.contains(['"', '\n', ','])
        {
            return Err(ConfigError::InvalidDelimiter(
                self.export.sources_delimiter.clone(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: String, value: String },
    #[error("Merge threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),
    #[error("Resolver needs at least one worker")]
    ZeroWorkers,
    #[error("max_concurrent_lookups must be at least 1")]
    ZeroConcurrency,
    #[error("Invalid geocoder endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("Geocoder user agent must not be empty")]
    MissingUserAgent,
    #[error("Sources delimiter {0:?} cannot be used in CSV output")]
    InvalidDelimiter(String),
}
