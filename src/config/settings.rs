use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::source::SYMBOL_PLACEHOLDER;

/// Errors that can occur during settings parsing and validation
#[derive(Error, Debug, PartialEq)]
pub enum SettingsError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("test-ratio must be between 0 and 1 (exclusive), got {0}")]
    InvalidTestRatio(f64),

    #[error("alpha must be non-negative, got {0}")]
    NegativeAlpha(f64),

    #[error("target-column must not be empty")]
    EmptyTargetColumn,

    #[error("output-path must not be empty")]
    EmptyOutputPath,

    #[error("join-timeout-ms must be greater than zero")]
    ZeroJoinTimeout,

    #[error("CSV data source path must not be empty")]
    EmptySourcePath,

    #[error("HTTP data source url-template must contain {0}")]
    MissingSymbolPlaceholder(&'static str),

    #[error("HTTP data source target-symbol must not be empty")]
    EmptyTargetSymbol,

    #[error("Lag feature periods must be greater than zero")]
    ZeroLagPeriods,

    #[error("logging file must not be empty when set")]
    EmptyLogFile,
}

/// The complete service configuration file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub data_source: DataSourceConfig,
    #[serde(default = "default_features")]
    pub features: Vec<FeatureKind>,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            pipeline: PipelineConfig::default(),
            data_source: DataSourceConfig::default(),
            features: default_features(),
            model: ModelConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineConfig {
    /// Destination of predictions for requests submitted over HTTP
    #[serde(default = "default_output_path")]
    pub output_path: String,
    /// Per-stage bound on waiting for a worker to finish during stop
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            join_timeout_ms: default_join_timeout_ms(),
        }
    }
}

/// Where the fetch stage gets its table from
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DataSourceConfig {
    #[serde(rename_all = "kebab-case")]
    Csv {
        path: String,
        #[serde(default = "default_index_column")]
        index_column: Option<String>,
    },
    #[serde(rename_all = "kebab-case")]
    Http {
        /// URL with a `{symbol}` placeholder
        url_template: String,
        symbols: Vec<String>,
        target_symbol: String,
        #[serde(default = "default_http_timeout_secs")]
        timeout_secs: u64,
    },
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self::Csv {
            path: "data.csv".to_string(),
            index_column: default_index_column(),
        }
    }
}

impl DataSourceConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Csv { .. } => "csv",
            Self::Http { .. } => "http",
        }
    }
}

/// One step of the feature chain
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FeatureKind {
    FillMissing {
        #[serde(default)]
        sentinel: f64,
    },
    Lag {
        #[serde(default)]
        column: Option<String>,
        #[serde(default = "default_lag_periods")]
        periods: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModelConfig {
    #[serde(default = "default_target_column")]
    pub target_column: String,
    #[serde(default = "default_test_ratio")]
    pub test_ratio: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            target_column: default_target_column(),
            test_ratio: default_test_ratio(),
            seed: default_seed(),
            alpha: default_alpha(),
        }
    }
}

/// Log output besides the console
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggingConfig {
    /// Also write logs to this file, truncated on start
    #[serde(default)]
    pub file: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_output_path() -> String {
    "predictions.csv".to_string()
}

fn default_join_timeout_ms() -> u64 {
    1000
}

fn default_index_column() -> Option<String> {
    Some("Date".to_string())
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_lag_periods() -> usize {
    1
}

fn default_features() -> Vec<FeatureKind> {
    vec![FeatureKind::FillMissing { sentinel: 0.0 }]
}

fn default_target_column() -> String {
    "target".to_string()
}

fn default_test_ratio() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_alpha() -> f64 {
    1.0
}

// ============================================================================
// SBIO: Pure parsing functions (no I/O)
// ============================================================================

/// Strip `//` and `/* */` comments outside of string literals.
/// This is a pure function - no I/O.
pub fn strip_jsonc_comments(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            result.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                result.push(c);
            }
            ('/', Some(&'/')) => {
                // Keep the newline so line numbers in parse errors stay right
                for nc in chars.by_ref() {
                    if nc == '\n' {
                        result.push('\n');
                        break;
                    }
                }
            }
            ('/', Some(&'*')) => {
                chars.next();
                let mut prev = ' ';
                for nc in chars.by_ref() {
                    if prev == '*' && nc == '/' {
                        break;
                    }
                    prev = nc;
                }
            }
            _ => result.push(c),
        }
    }

    result
}

/// Parse a JSON/JSONC document into a ServiceConfig.
/// This is a pure function - no I/O.
pub fn parse_config(content: &str) -> Result<ServiceConfig, SettingsError> {
    let stripped = strip_jsonc_comments(content);
    serde_json::from_str(&stripped).map_err(|e| SettingsError::ParseError(e.to_string()))
}

/// Parse a YAML document into a ServiceConfig.
/// This is a pure function - no I/O.
pub fn parse_yaml_config(content: &str) -> Result<ServiceConfig, SettingsError> {
    serde_yaml::from_str(content).map_err(|e| SettingsError::ParseError(e.to_string()))
}

/// Validate a configuration for consistency.
/// This is a pure function - no I/O.
pub fn validate_config(config: &ServiceConfig) -> Result<(), SettingsError> {
    let model = &config.model;
    if !(model.test_ratio > 0.0 && model.test_ratio < 1.0) {
        return Err(SettingsError::InvalidTestRatio(model.test_ratio));
    }
    if model.alpha < 0.0 || model.alpha.is_nan() {
        return Err(SettingsError::NegativeAlpha(model.alpha));
    }
    if model.target_column.trim().is_empty() {
        return Err(SettingsError::EmptyTargetColumn);
    }

    if config.pipeline.output_path.trim().is_empty() {
        return Err(SettingsError::EmptyOutputPath);
    }
    if config.pipeline.join_timeout_ms == 0 {
        return Err(SettingsError::ZeroJoinTimeout);
    }

    match &config.data_source {
        DataSourceConfig::Csv { path, .. } => {
            if path.trim().is_empty() {
                return Err(SettingsError::EmptySourcePath);
            }
        }
        DataSourceConfig::Http {
            url_template,
            target_symbol,
            ..
        } => {
            if !url_template.contains(SYMBOL_PLACEHOLDER) {
                return Err(SettingsError::MissingSymbolPlaceholder(SYMBOL_PLACEHOLDER));
            }
            if target_symbol.trim().is_empty() {
                return Err(SettingsError::EmptyTargetSymbol);
            }
        }
    }

    let zero_lag = config
        .features
        .iter()
        .any(|f| matches!(f, FeatureKind::Lag { periods: 0, .. }));
    if zero_lag {
        return Err(SettingsError::ZeroLagPeriods);
    }

    if let Some(ref file) = config.logging.file {
        if file.trim().is_empty() {
            return Err(SettingsError::EmptyLogFile);
        }
    }

    Ok(())
}

impl ServiceConfig {
    /// Parse and validate from a JSONC string.
    /// Pure function - no I/O.
    pub fn from_str(content: &str) -> Result<Self, SettingsError> {
        let config = parse_config(content)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse and validate from a YAML string.
    /// Pure function - no I/O.
    pub fn from_yaml_str(content: &str) -> Result<Self, SettingsError> {
        let config = parse_yaml_config(content)?;
        validate_config(&config)?;
        Ok(config)
    }
}
