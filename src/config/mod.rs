pub mod settings;

pub use settings::{
    parse_config, parse_yaml_config, strip_jsonc_comments, validate_config, DataSourceConfig,
    FeatureKind, LoggingConfig, ModelConfig, PipelineConfig, ServerConfig, ServiceConfig,
    SettingsError,
};

use std::path::Path;
use thiserror::Error;

/// Errors for file I/O operations (separate from pure parsing errors)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Settings error: {0}")]
    SettingsError(#[from] SettingsError),
}

// ============================================================================
// SBIO: I/O wrapper - thin layer over pure functions
// ============================================================================

/// Load and parse a configuration file from disk.
///
/// Files ending in `.yaml` or `.yml` are read as YAML, anything else as
/// JSON with optional comments.
pub fn load_config_file(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    let config = if is_yaml {
        ServiceConfig::from_yaml_str(&content)?
    } else {
        ServiceConfig::from_str(&content)?
    };
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_file(content: &str, suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_json_config_file() {
        let file = create_temp_file(r#"{"server": {"port": 9100}}"#, ".json");
        let config = load_config_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn test_load_yaml_config_file() {
        let file = create_temp_file("server:\n  port: 9200\n", ".yaml");
        let config = load_config_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9200);
    }

    #[test]
    fn test_load_invalid_config_file() {
        let file = create_temp_file(r#"{"model": {"test-ratio": 0}}"#, ".json");
        let result = load_config_file(file.path());
        assert!(matches!(result, Err(ConfigError::SettingsError(_))));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_config_file(Path::new("/nonexistent/file.json"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
