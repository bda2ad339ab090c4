use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "predictflow")]
#[command(about = "Run the fetch -> feature -> predict pipeline behind an HTTP API")]
#[command(version)]
pub struct Args {
    /// Path to the service configuration file (JSON, JSONC or YAML)
    #[arg(env = "PREDICTFLOW_CONFIG")]
    pub config_file: Option<PathBuf>,

    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Dry-run mode: validate config and show the pipeline without running
    #[arg(long)]
    pub dry_run: bool,

    /// Override the HTTP bind address
    #[arg(long, value_name = "ADDR", env = "PREDICTFLOW_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// Override the HTTP port
    #[arg(short, long, value_name = "PORT", env = "PREDICTFLOW_PORT")]
    pub port: Option<u16>,

    /// Read input from this CSV file instead of the configured data source
    #[arg(long, value_name = "FILE")]
    pub data: Option<String>,

    /// Write predictions for HTTP requests to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<String>,

    /// Also write logs to this file (truncated on start)
    #[arg(long, value_name = "FILE", env = "PREDICTFLOW_LOG_FILE")]
    pub log_file: Option<String>,

    /// Path to a .env file
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,
}

// ============================================================================
// SBIO: Pure config and display logic (no I/O)
// ============================================================================

use crate::config::{
    validate_config, DataSourceConfig, FeatureKind, ServiceConfig, SettingsError,
};

/// Apply command-line overrides on top of a loaded config and re-validate.
///
/// `--data` switches the data source to CSV, keeping the configured index
/// column when the source already was CSV.
pub fn apply_overrides(
    mut config: ServiceConfig,
    args: &Args,
) -> Result<ServiceConfig, SettingsError> {
    if let Some(ref addr) = args.bind_addr {
        config.server.bind_addr = addr.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ref output) = args.output {
        config.pipeline.output_path = output.clone();
    }
    if let Some(ref log_file) = args.log_file {
        config.logging.file = Some(log_file.clone());
    }
    if let Some(ref data) = args.data {
        let index_column = match &config.data_source {
            DataSourceConfig::Csv { index_column, .. } => index_column.clone(),
            DataSourceConfig::Http { .. } => None,
        };
        config.data_source = DataSourceConfig::Csv {
            path: data.clone(),
            index_column,
        };
    }

    validate_config(&config)?;
    Ok(config)
}

/// Format a dry-run summary of the resolved configuration.
/// Pure function - returns a formatted string.
pub fn format_dry_run(config: &ServiceConfig, args: &Args) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "predictflow v{} - Dry Run Mode\n\n",
        env!("CARGO_PKG_VERSION")
    ));
    match args.config_file {
        Some(ref path) => output.push_str(&format!("Config: {}\n\n", path.display())),
        None => output.push_str("Config: <defaults>\n\n"),
    }

    output.push_str(&format!(
        "Server: {}:{}\n",
        config.server.bind_addr, config.server.port
    ));
    output.push_str(&format!(
        "Output: {} (join timeout {} ms)\n\n",
        config.pipeline.output_path, config.pipeline.join_timeout_ms
    ));
    if let Some(ref file) = config.logging.file {
        output.push_str(&format!("Log file: {}\n\n", file));
    }

    output.push_str("Pipeline:\n");
    output.push_str(&format!("  [fetch] source: {}", config.data_source.type_name()));
    match &config.data_source {
        DataSourceConfig::Csv { path, index_column } => {
            output.push_str(&format!(" -> {}", path));
            if let Some(index) = index_column {
                output.push_str(&format!(" (index: {})", index));
            }
            output.push('\n');
        }
        DataSourceConfig::Http {
            url_template,
            symbols,
            target_symbol,
            ..
        } => {
            output.push_str(&format!(" -> {}\n", url_template));
            output.push_str(&format!(
                "      Symbols ({}): {}\n",
                symbols.len(),
                symbols.join(", ")
            ));
            output.push_str(&format!("      Target: {}\n", target_symbol));
        }
    }

    output.push_str(&format!("  [feature] {} step(s)\n", config.features.len()));
    for kind in &config.features {
        match kind {
            FeatureKind::FillMissing { sentinel } => {
                output.push_str(&format!("      fill-missing (sentinel {})\n", sentinel));
            }
            FeatureKind::Lag { column, periods } => {
                output.push_str(&format!(
                    "      lag {} of {}\n",
                    periods,
                    column.as_deref().unwrap_or("<first column>")
                ));
            }
        }
    }

    let model = &config.model;
    output.push_str(&format!(
        "  [predict] ridge: target '{}', test ratio {}, seed {}, alpha {}\n",
        model.target_column, model.test_ratio, model.seed, model.alpha
    ));

    output.push_str("\nValidation: PASSED\n");
    output.push_str("Ready to start pipeline. Remove --dry-run to execute.\n");

    output
}
