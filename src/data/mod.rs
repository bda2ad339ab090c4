pub mod source;
pub mod table;

pub use source::{build_data_source, CsvDataSource, DataSource, HttpDataSource, SourceError};
pub use table::{Column, Table, TableError};
