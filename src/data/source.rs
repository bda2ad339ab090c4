//! Data sources for the fetch stage
//!
//! A data source produces the full table for one request: a fixed universe of
//! feature columns plus one designated target column. Sources are selected from
//! configuration at construction time.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, warn};

use super::table::{parse_cell, Table, TableError};
use crate::config::DataSourceConfig;
use crate::pipeline::PredictionRequest;

/// Placeholder replaced by the symbol in HTTP URL templates
pub const SYMBOL_PLACEHOLDER: &str = "{symbol}";

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: TableError,
    },

    #[error("Target series '{0}' is unavailable")]
    TargetUnavailable(String),

    #[error("No symbol could be fetched")]
    NothingFetched,

    #[error("Failed to build table: {0}")]
    Table(#[from] TableError),

    #[error("HTTP client error: {0}")]
    Client(String),
}

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Produce the table for one request
    async fn fetch(&self, request: &PredictionRequest) -> Result<Table, SourceError>;
}

/// Build the configured data source
pub fn build_data_source(
    config: &DataSourceConfig,
    target_column: &str,
) -> Result<Arc<dyn DataSource>, SourceError> {
    match config {
        DataSourceConfig::Csv { path, index_column } => Ok(Arc::new(CsvDataSource::new(
            path.clone(),
            index_column.clone(),
        ))),
        DataSourceConfig::Http {
            url_template,
            symbols,
            target_symbol,
            timeout_secs,
        } => {
            let source = HttpDataSource::new(
                url_template.clone(),
                symbols.clone(),
                target_symbol.clone(),
                target_column.to_string(),
                Duration::from_secs(*timeout_secs),
            )?;
            Ok(Arc::new(source))
        }
    }
}

// ============================================================================
// CSV file source
// ============================================================================

/// Reads the whole table from a CSV file.
///
/// A request's `source_path` overrides the configured path.
#[derive(Debug, Clone)]
pub struct CsvDataSource {
    default_path: String,
    index_column: Option<String>,
}

impl CsvDataSource {
    pub fn new(default_path: impl Into<String>, index_column: Option<String>) -> Self {
        Self {
            default_path: default_path.into(),
            index_column,
        }
    }

    fn resolve_path(&self, request: &PredictionRequest) -> PathBuf {
        let raw = request.source_path().unwrap_or(&self.default_path);
        PathBuf::from(shellexpand::tilde(raw).into_owned())
    }
}

#[async_trait]
impl DataSource for CsvDataSource {
    fn name(&self) -> &str {
        "csv"
    }

    async fn fetch(&self, request: &PredictionRequest) -> Result<Table, SourceError> {
        let path = self.resolve_path(request);
        debug!("Reading table from {}", path.display());

        let bytes = tokio::fs::read(&path).await.map_err(|e| SourceError::Read {
            path: path.clone(),
            source: TableError::Io(e),
        })?;

        Table::read_csv(bytes.as_slice(), self.index_column.as_deref())
            .map_err(|source| SourceError::Read { path, source })
    }
}

// ============================================================================
// HTTP per-symbol source
// ============================================================================

/// Downloads one `date,value` CSV series per symbol and joins them on date.
///
/// Symbols that fail to download or parse are skipped. The target symbol's
/// series is stored under the model's target column name.
pub struct HttpDataSource {
    client: reqwest::Client,
    url_template: String,
    symbols: Vec<String>,
    target_symbol: String,
    target_column: String,
}

impl HttpDataSource {
    pub fn new(
        url_template: String,
        symbols: Vec<String>,
        target_symbol: String,
        target_column: String,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url_template,
            symbols,
            target_symbol,
            target_column,
        })
    }

    fn url_for(&self, symbol: &str) -> String {
        self.url_template.replace(SYMBOL_PLACEHOLDER, symbol)
    }

    async fn fetch_series(&self, symbol: &str) -> Result<Vec<(String, f64)>, String> {
        let url = self.url_for(symbol);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("{} returned {}", url, status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| e.to_string())?;
        parse_series(&body)
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, _request: &PredictionRequest) -> Result<Table, SourceError> {
        let mut universe: Vec<&str> = vec![self.target_symbol.as_str()];
        universe.extend(
            self.symbols
                .iter()
                .map(String::as_str)
                .filter(|s| *s != self.target_symbol),
        );

        let results = join_all(universe.iter().map(|s| self.fetch_series(s))).await;

        let mut series = Vec::with_capacity(universe.len());
        for (symbol, result) in universe.iter().zip(results) {
            match result {
                Ok(points) => {
                    let name = if *symbol == self.target_symbol {
                        self.target_column.clone()
                    } else {
                        symbol.to_string()
                    };
                    series.push((name, points));
                }
                Err(e) => warn!("Skipping symbol '{}': {}", symbol, e),
            }
        }

        if series.is_empty() {
            return Err(SourceError::NothingFetched);
        }
        if !series.iter().any(|(name, _)| *name == self.target_column) {
            return Err(SourceError::TargetUnavailable(self.target_symbol.clone()));
        }

        debug!(
            "Fetched {}/{} symbols",
            series.len(),
            universe.len()
        );
        Ok(Table::from_series(series)?)
    }
}

/// Parse a two-column `key,value` CSV body into points.
/// Rows with a missing value are dropped.
fn parse_series(body: &[u8]) -> Result<Vec<(String, f64)>, String> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(body);

    let headers = rdr.headers().map_err(|e| e.to_string())?;
    if headers.len() < 2 {
        return Err("expected a key column and a value column".to_string());
    }

    let mut points = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| e.to_string())?;
        let (Some(key), Some(raw)) = (record.get(0), record.get(1)) else {
            continue;
        };
        match parse_cell(raw) {
            Some(Some(value)) => points.push((key.to_string(), value)),
            Some(None) => {}
            None => return Err(format!("invalid value '{}' for {}", raw, key)),
        }
    }
    Ok(points)
}

// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================

pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a fixed table; fails for requests whose source path is
    /// `fail_on`.
    pub struct StaticDataSource {
        table: Table,
        fail_on: Option<String>,
        call_count: Arc<AtomicUsize>,
    }

    impl StaticDataSource {
        pub fn new(table: Table) -> Self {
            Self {
                table,
                fail_on: None,
                call_count: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn failing_on(mut self, source_path: impl Into<String>) -> Self {
            self.fail_on = Some(source_path.into());
            self
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DataSource for StaticDataSource {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch(&self, request: &PredictionRequest) -> Result<Table, SourceError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.is_some() && request.source_path() == self.fail_on.as_deref() {
                return Err(SourceError::NothingFetched);
            }
            Ok(self.table.clone())
        }
    }
}
