//! Process configuration.
//!
//! Two layers live here: [`ServerConfig`] for the HTTP surface (env / CLI /
//! YAML loadable, validated) and [`ScreenerConfig`] describing the tables
//! and metric-to-column mappings the compiler resolves against. The
//! screener config is immutable once initialized; compile calls borrow it
//! and never mutate.

use std::collections::HashMap;
use std::env;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Unknown table '{table}' referenced by metric '{metric}'")]
    UnknownMappingTable { metric: String, table: String },
}

/// Server configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host address
    #[validate(length(min = 1, message = "HTTP host cannot be empty"))]
    pub http_host: String,

    /// HTTP server port (1-65535)
    #[validate(range(
        min = 1,
        max = 65535,
        message = "HTTP port must be between 1 and 65535"
    ))]
    pub http_port: u16,

    /// Per-request timeout in seconds
    #[validate(range(
        min = 1,
        max = 300,
        message = "Request timeout must be between 1 and 300 seconds"
    ))]
    pub request_timeout_secs: u64,

    /// Maximum accepted request body size in bytes
    #[validate(range(min = 1024, message = "Body limit must be at least 1 KiB"))]
    pub max_body_bytes: usize,

    /// Optional path to a screener-config YAML replacing the built-in
    /// market-data config
    pub screener_config_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
            request_timeout_secs: 30,
            max_body_bytes: 1024 * 1024,
            screener_config_path: None,
        }
    }
}

impl ServerConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            http_host: env::var("SCREENHOUSE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: parse_env_var("SCREENHOUSE_PORT", "8080")?,
            request_timeout_secs: parse_env_var("SCREENHOUSE_REQUEST_TIMEOUT_SECS", "30")?,
            max_body_bytes: parse_env_var("SCREENHOUSE_MAX_BODY_BYTES", "1048576")?,
            screener_config_path: env::var("SCREENHOUSE_CONFIG").ok(),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}

/// ClickHouse column type of a mapped metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Float64,
    String,
    UInt8,
    Date,
    DateTime,
    #[serde(rename = "Array(String)")]
    ArrayString,
}

/// One table known to the compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_column: Option<String>,
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub always_include_columns: Vec<String>,
    #[serde(default)]
    pub other_columns: Vec<String>,
}

impl TableConfig {
    pub fn has_column(&self, column: &str) -> bool {
        self.primary_keys.iter().any(|c| c == column)
            || self.always_include_columns.iter().any(|c| c == column)
            || self.other_columns.iter().any(|c| c == column)
            || self.time_column.as_deref() == Some(column)
    }
}

/// Metric name → physical column mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub table: String,
    pub column: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub timeseries: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_strategy: Option<String>,
}

/// Static screener configuration: tables, metric mappings, global limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenerConfig {
    pub tables: HashMap<String, TableConfig>,
    pub column_mappings: HashMap<String, ColumnMapping>,
    /// strftime pattern for rendered dates
    pub time_format: String,
    /// Largest allowed relative/trading window, in days
    pub max_timeseries_window: u32,
    /// Largest allowed result limit
    pub max_limit: u32,
}

impl ScreenerConfig {
    pub fn table(&self, name: &str) -> Option<&TableConfig> {
        self.tables.get(name)
    }

    pub fn resolve_metric(&self, metric: &str) -> Option<&ColumnMapping> {
        self.column_mappings.get(metric)
    }

    /// A primary key shared by both tables, if any.
    pub fn common_primary_key(&self, table_a: &str, table_b: &str) -> Option<String> {
        let a = self.table(table_a)?;
        let b = self.table(table_b)?;
        a.primary_keys
            .iter()
            .find(|pk| b.primary_keys.contains(pk))
            .cloned()
    }

    /// Load a screener config from YAML, checking mapping integrity.
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Parse {
            field: "screener_config".to_string(),
            value: path.as_ref().display().to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "screener_config".to_string(),
            value: path.as_ref().display().to_string(),
            source: Box::new(e),
        })?;

        config.check_mappings()?;
        Ok(config)
    }

    fn check_mappings(&self) -> Result<(), ConfigError> {
        for (metric, mapping) in &self.column_mappings {
            if !self.tables.contains_key(&mapping.table) {
                return Err(ConfigError::UnknownMappingTable {
                    metric: metric.clone(),
                    table: mapping.table.clone(),
                });
            }
        }
        Ok(())
    }
}

lazy_static! {
    static ref DEFAULT_CONFIG: ScreenerConfig = build_default_config();
}

/// Built-in market-data config: `tickers` and `daily_agg` joined on `ticker`.
pub fn default_config() -> &'static ScreenerConfig {
    &DEFAULT_CONFIG
}

fn build_default_config() -> ScreenerConfig {
    let mut tables = HashMap::new();
    tables.insert(
        "tickers".to_string(),
        TableConfig {
            name: "tickers".to_string(),
            time_column: None,
            primary_keys: vec!["ticker".to_string()],
            always_include_columns: vec![],
            other_columns: vec![
                "ticker".to_string(),
                "name".to_string(),
                "sector".to_string(),
                "industry".to_string(),
                "country".to_string(),
                "exchange".to_string(),
                "currency".to_string(),
                "active".to_string(),
                "tags".to_string(),
            ],
        },
    );
    tables.insert(
        "daily_agg".to_string(),
        TableConfig {
            name: "daily_agg".to_string(),
            time_column: Some("date".to_string()),
            primary_keys: vec!["ticker".to_string()],
            always_include_columns: vec!["ticker".to_string(), "date".to_string()],
            other_columns: vec![
                "open".to_string(),
                "high".to_string(),
                "low".to_string(),
                "close".to_string(),
                "volume".to_string(),
            ],
        },
    );

    let mut column_mappings = HashMap::new();
    let string_metric = |table: &str, column: &str| ColumnMapping {
        table: table.to_string(),
        column: column.to_string(),
        column_type: ColumnType::String,
        timeseries: false,
        join_strategy: None,
    };
    let price_metric = |column: &str| ColumnMapping {
        table: "daily_agg".to_string(),
        column: column.to_string(),
        column_type: ColumnType::Float64,
        timeseries: true,
        join_strategy: None,
    };

    for metric in [
        "ticker", "name", "sector", "industry", "country", "exchange", "currency",
    ] {
        column_mappings.insert(metric.to_string(), string_metric("tickers", metric));
    }
    column_mappings.insert(
        "active".to_string(),
        ColumnMapping {
            table: "tickers".to_string(),
            column: "active".to_string(),
            column_type: ColumnType::UInt8,
            timeseries: false,
            join_strategy: None,
        },
    );
    column_mappings.insert(
        "tags".to_string(),
        ColumnMapping {
            table: "tickers".to_string(),
            column: "tags".to_string(),
            column_type: ColumnType::ArrayString,
            timeseries: false,
            join_strategy: None,
        },
    );
    for metric in ["open", "high", "low", "close", "volume"] {
        column_mappings.insert(metric.to_string(), price_metric(metric));
    }
    column_mappings.insert(
        "date".to_string(),
        ColumnMapping {
            table: "daily_agg".to_string(),
            column: "date".to_string(),
            column_type: ColumnType::Date,
            timeseries: false,
            join_strategy: None,
        },
    );

    ScreenerConfig {
        tables,
        column_mappings,
        time_format: "%Y-%m-%d".to_string(),
        max_timeseries_window: 1825,
        max_limit: 1000,
    }
}
