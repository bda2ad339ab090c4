//! Column-major numeric table
//!
//! The unit of data passed between pipeline stages: an optional row index
//! (usually dates) plus named `f64` columns whose cells may be missing.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::{Read, Write};
use std::path::Path;

use thiserror::Error;

/// Cell spellings read as a missing value
const MISSING_MARKERS: [&str; 6] = ["", "nan", "na", "n/a", "null", "none"];

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Column '{name}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Duplicate column: '{0}'")]
    DuplicateColumn(String),

    #[error("Invalid value '{value}' in column '{column}' at row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A named column of optional values
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Build a column with no missing cells
    pub fn dense(name: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Self {
        Self::new(name, values.into_iter().map(Some).collect())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }
}

/// Time-indexed table of numeric columns
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    index: Vec<String>,
    columns: Vec<Column>,
}

impl Table {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from columns, checking lengths and name uniqueness
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, TableError> {
        let mut table = Self::new();
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    /// Attach row labels. Must match the current row count unless the table
    /// has no columns yet.
    pub fn with_index(mut self, index: Vec<String>) -> Result<Self, TableError> {
        if !self.columns.is_empty() && index.len() != self.num_rows() {
            return Err(TableError::LengthMismatch {
                name: "<index>".to_string(),
                expected: self.num_rows(),
                actual: index.len(),
            });
        }
        self.index = index;
        Ok(self)
    }

    /// Append a column
    pub fn push_column(&mut self, column: Column) -> Result<(), TableError> {
        if self.column(&column.name).is_some() {
            return Err(TableError::DuplicateColumn(column.name));
        }
        let has_shape = !self.columns.is_empty() || !self.index.is_empty();
        if has_shape && column.len() != self.num_rows() {
            return Err(TableError::LengthMismatch {
                name: column.name,
                expected: self.num_rows(),
                actual: column.values.len(),
            });
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Row labels; empty when the table has no index
    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn num_rows(&self) -> usize {
        self.columns
            .first()
            .map(Column::len)
            .unwrap_or(self.index.len())
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// True when there is no cell at all
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.num_rows() == 0
    }

    pub fn missing_count(&self) -> usize {
        self.columns.iter().map(Column::missing_count).sum()
    }

    /// Outer-join keyed series into one table.
    ///
    /// Keys become the sorted row index; a series with no value for a key
    /// gets a missing cell. Later duplicates of a key within a series win.
    pub fn from_series(series: Vec<(String, Vec<(String, f64)>)>) -> Result<Self, TableError> {
        let mut seen = HashSet::new();
        let mut keys = BTreeSet::new();
        let mut lookups = Vec::with_capacity(series.len());

        for (name, points) in series {
            if !seen.insert(name.clone()) {
                return Err(TableError::DuplicateColumn(name));
            }
            let lookup: BTreeMap<String, f64> = points.into_iter().collect();
            for key in lookup.keys() {
                keys.insert(key.clone());
            }
            lookups.push((name, lookup));
        }

        let index: Vec<String> = keys.into_iter().collect();
        let columns = lookups
            .into_iter()
            .map(|(name, lookup)| {
                let values = index.iter().map(|k| lookup.get(k).copied()).collect();
                Column::new(name, values)
            })
            .collect();

        Self::from_columns(columns)?.with_index(index)
    }

    // ========================================================================
    // CSV I/O
    // ========================================================================

    /// Read a CSV document with a header row.
    ///
    /// When `index_column` names a header, that column becomes the row index
    /// and is kept as text; every other column must be numeric or missing.
    pub fn read_csv<R: Read>(reader: R, index_column: Option<&str>) -> Result<Self, TableError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let index_pos = index_column.and_then(|name| headers.iter().position(|h| h == name));

        let mut index = Vec::new();
        let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); headers.len()];

        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            for (pos, field) in record.iter().enumerate() {
                if Some(pos) == index_pos {
                    index.push(field.to_string());
                    continue;
                }
                let cell = parse_cell(field).ok_or_else(|| TableError::InvalidValue {
                    column: headers[pos].clone(),
                    row,
                    value: field.to_string(),
                })?;
                values[pos].push(cell);
            }
        }

        let columns = headers
            .into_iter()
            .zip(values)
            .enumerate()
            .filter(|(pos, _)| Some(*pos) != index_pos)
            .map(|(_, (name, values))| Column::new(name, values))
            .collect();

        let table = Self::from_columns(columns)?;
        if index_pos.is_some() {
            table.with_index(index)
        } else {
            Ok(table)
        }
    }

    /// Write the columns as CSV. The row index is not written.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), TableError> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(self.columns.iter().map(|c| c.name.as_str()))?;

        for row in 0..self.num_rows() {
            let record: Vec<String> = self
                .columns
                .iter()
                .map(|c| c.values[row].map(|v| v.to_string()).unwrap_or_default())
                .collect();
            wtr.write_record(&record)?;
        }

        wtr.flush()?;
        Ok(())
    }

    /// Write the table as a CSV file, replacing any existing file
    pub fn to_csv_path(&self, path: &Path) -> Result<(), TableError> {
        let file = std::fs::File::create(path)?;
        self.write_csv(std::io::BufWriter::new(file))
    }
}

/// Parse one CSV cell: `Some(None)` for a missing marker, `None` if invalid
pub(crate) fn parse_cell(field: &str) -> Option<Option<f64>> {
    if MISSING_MARKERS.contains(&field.to_ascii_lowercase().as_str()) {
        return Some(None);
    }
    match field.parse::<f64>() {
        Ok(v) if v.is_nan() => Some(None),
        Ok(v) => Some(Some(v)),
        Err(_) => None,
    }
}
