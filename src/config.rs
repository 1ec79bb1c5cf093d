use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::core::expander::ExpansionPolicy;
use crate::core::filters::RowMarkers;
use crate::core::valuation::EngineSettings;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub valuation: ValuationSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
    /// Largest accepted JSON body, in bytes
    #[serde(default = "default_json_limit")]
    pub json_limit: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
            json_limit: default_json_limit(),
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_json_limit() -> usize { 16 * 1024 * 1024 }

/// Storage settings. Without a URL the service runs on an in-memory index.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

/// Valuation tunables
#[derive(Debug, Clone, Deserialize)]
pub struct ValuationSettings {
    #[serde(default = "default_location_tolerance")]
    pub default_location_tolerance: f64,
    #[serde(default = "default_sqm_tolerance")]
    pub default_sqm_tolerance: f64,
    #[serde(default)]
    pub sqm_tolerance_by_source: HashMap<String, f64>,
    #[serde(default = "default_min_evidence")]
    pub min_evidence: usize,
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,
    #[serde(default = "default_max_expansion_steps")]
    pub max_expansion_steps: u32,
    #[serde(default = "default_max_radius_m")]
    pub max_radius_m: f64,
    #[serde(default = "default_outlier_sigma")]
    pub outlier_sigma: f64,
    #[serde(default = "default_margin_factor")]
    pub margin_factor: f64,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_query_retries")]
    pub query_retries: u32,
    #[serde(default = "default_query_limit")]
    pub query_limit: usize,
    #[serde(default = "default_true")]
    pub value_sparse_evidence: bool,
    #[serde(default = "default_batch_workers")]
    pub batch_workers: usize,
    #[serde(default = "default_sold_markers")]
    pub sold_markers: Vec<String>,
    #[serde(default = "default_residential_markers")]
    pub residential_markers: Vec<String>,
    /// JSON array of comparables loaded into the in-memory index
    pub comparables_file: Option<String>,
}

impl Default for ValuationSettings {
    fn default() -> Self {
        Self {
            default_location_tolerance: default_location_tolerance(),
            default_sqm_tolerance: default_sqm_tolerance(),
            sqm_tolerance_by_source: HashMap::new(),
            min_evidence: default_min_evidence(),
            growth_factor: default_growth_factor(),
            max_expansion_steps: default_max_expansion_steps(),
            max_radius_m: default_max_radius_m(),
            outlier_sigma: default_outlier_sigma(),
            margin_factor: default_margin_factor(),
            query_timeout_ms: default_query_timeout_ms(),
            query_retries: default_query_retries(),
            query_limit: default_query_limit(),
            value_sparse_evidence: default_true(),
            batch_workers: default_batch_workers(),
            sold_markers: default_sold_markers(),
            residential_markers: default_residential_markers(),
            comparables_file: None,
        }
    }
}

fn default_location_tolerance() -> f64 { 100.0 }
fn default_sqm_tolerance() -> f64 { 10.0 }
fn default_min_evidence() -> usize { 3 }
fn default_growth_factor() -> f64 { 2.0 }
fn default_max_expansion_steps() -> u32 { 4 }
fn default_max_radius_m() -> f64 { 5_000.0 }
fn default_outlier_sigma() -> f64 { 2.0 }
fn default_margin_factor() -> f64 { 0.85 }
fn default_query_timeout_ms() -> u64 { 5_000 }
fn default_query_retries() -> u32 { 2 }
fn default_query_limit() -> usize { 200 }
fn default_true() -> bool { true }
fn default_batch_workers() -> usize { 4 }
fn default_sold_markers() -> Vec<String> { RowMarkers::default().sold_markers }
fn default_residential_markers() -> Vec<String> { RowMarkers::default().residential_markers }

impl ValuationSettings {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            expansion: ExpansionPolicy {
                min_evidence: self.min_evidence,
                growth_factor: self.growth_factor,
                max_steps: self.max_expansion_steps,
                max_radius_m: self.max_radius_m,
            },
            outlier_sigma: self.outlier_sigma,
            margin_factor: self.margin_factor,
            default_sqm_tolerance: self.default_sqm_tolerance,
            sqm_tolerance_by_source: self.sqm_tolerance_by_source.clone(),
            query_timeout: Duration::from_millis(self.query_timeout_ms),
            query_retries: self.query_retries,
            query_limit: self.query_limit,
            value_sparse_evidence: self.value_sparse_evidence,
        }
    }

    pub fn row_markers(&self) -> RowMarkers {
        RowMarkers {
            sold_markers: self.sold_markers.clone(),
            residential_markers: self.residential_markers.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Environment variables (prefixed with REVAL__)
    /// 4. DATABASE_URL
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            // Local overrides for development
            .add_source(File::with_name("config/local").required(false))
            // e.g., REVAL__SERVER__PORT -> server.port
            .add_source(environment())
            .build()?;

        with_database_url(settings)?.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(environment())
            .build()?;

        with_database_url(settings)?.try_deserialize()
    }
}

fn environment() -> Environment {
    Environment::with_prefix("REVAL")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// `DATABASE_URL` wins over any configured URL
fn with_database_url(settings: Config) -> Result<Config, ConfigError> {
    match std::env::var("DATABASE_URL") {
        Ok(url) if !url.is_empty() => Config::builder()
            .add_source(settings)
            .set_override("database.url", url)?
            .build(),
        _ => Ok(settings),
    }
}
