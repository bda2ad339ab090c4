//! Feature transforms applied between fetch and predict
//!
//! Transforms are pure: they take a table by value and return the derived
//! table, with no I/O.

use thiserror::Error;

use crate::config::FeatureKind;
use crate::data::{Column, Table, TableError};

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    #[error("Cannot derive '{0}' from a table without columns")]
    NoColumns(String),

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

pub trait FeatureTransform: Send + Sync {
    fn name(&self) -> &str;

    fn transform(&self, table: Table) -> Result<Table, FeatureError>;
}

/// Forward-fill each column, then replace the remaining (leading) gaps with
/// a sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct FillMissing {
    pub sentinel: f64,
}

impl Default for FillMissing {
    fn default() -> Self {
        Self { sentinel: 0.0 }
    }
}

impl FeatureTransform for FillMissing {
    fn name(&self) -> &str {
        "fill-missing"
    }

    fn transform(&self, mut table: Table) -> Result<Table, FeatureError> {
        for column in table.columns_mut() {
            let mut last = None;
            for cell in column.values.iter_mut() {
                match cell {
                    Some(v) => last = Some(*v),
                    None => *cell = Some(last.unwrap_or(self.sentinel)),
                }
            }
        }
        Ok(table)
    }
}

/// Add a column holding another column's value `periods` rows earlier.
///
/// The first `periods` rows of the new column are missing.
#[derive(Debug, Clone, PartialEq)]
pub struct LagFeature {
    /// Source column; the first column when `None`
    pub column: Option<String>,
    pub periods: usize,
}

impl LagFeature {
    pub fn output_name(&self) -> String {
        format!("lag_{}", self.periods)
    }
}

impl FeatureTransform for LagFeature {
    fn name(&self) -> &str {
        "lag"
    }

    fn transform(&self, mut table: Table) -> Result<Table, FeatureError> {
        let source = match &self.column {
            Some(name) => table
                .column(name)
                .ok_or_else(|| FeatureError::ColumnNotFound(name.clone()))?,
            None => table
                .columns()
                .first()
                .ok_or_else(|| FeatureError::NoColumns(self.output_name()))?,
        };

        let rows = source.len();
        let lagged = (0..rows)
            .map(|i| i.checked_sub(self.periods).and_then(|j| source.values[j]))
            .collect();

        table.push_column(Column::new(self.output_name(), lagged))?;
        Ok(table)
    }
}

/// Applies transforms in order
#[derive(Default)]
pub struct FeatureChain {
    steps: Vec<Box<dyn FeatureTransform>>,
}

impl FeatureChain {
    pub fn new(steps: Vec<Box<dyn FeatureTransform>>) -> Self {
        Self { steps }
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

impl FeatureTransform for FeatureChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn transform(&self, table: Table) -> Result<Table, FeatureError> {
        self.steps
            .iter()
            .try_fold(table, |table, step| step.transform(table))
    }
}

/// Build the configured chain of transforms
pub fn build_features(kinds: &[FeatureKind]) -> FeatureChain {
    let steps = kinds
        .iter()
        .map(|kind| -> Box<dyn FeatureTransform> {
            match kind {
                FeatureKind::FillMissing { sentinel } => Box::new(FillMissing {
                    sentinel: *sentinel,
                }),
                FeatureKind::Lag { column, periods } => Box::new(LagFeature {
                    column: column.clone(),
                    periods: *periods,
                }),
            }
        })
        .collect();
    FeatureChain::new(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_gaps() -> Table {
        Table::from_columns(vec![
            Column::new("A", vec![Some(1.0), Some(2.0), None, Some(4.0), None]),
            Column::new("B", vec![None, Some(2.0), Some(3.0), None, None]),
            Column::dense("C", [1.0, 2.0, 3.0, 4.0, 5.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_fill_missing_forward_fills_then_uses_sentinel() {
        let result = FillMissing::default().transform(table_with_gaps()).unwrap();

        let expected = Table::from_columns(vec![
            Column::dense("A", [1.0, 2.0, 2.0, 4.0, 4.0]),
            Column::dense("B", [0.0, 2.0, 3.0, 3.0, 3.0]),
            Column::dense("C", [1.0, 2.0, 3.0, 4.0, 5.0]),
        ])
        .unwrap();
        assert_eq!(result, expected);
        assert_eq!(result.missing_count(), 0);
    }

    #[test]
    fn test_fill_missing_all_missing_column() {
        let table = Table::from_columns(vec![
            Column::new("A", vec![None, None, None]),
            Column::new("B", vec![Some(1.0), None, Some(3.0)]),
        ])
        .unwrap();

        let result = FillMissing::default().transform(table).unwrap();
        assert_eq!(result.column("A").unwrap().values, vec![Some(0.0); 3]);
        assert_eq!(
            result.column("B").unwrap().values,
            vec![Some(1.0), Some(1.0), Some(3.0)]
        );
    }

    #[test]
    fn test_fill_missing_empty_table() {
        let result = FillMissing::default().transform(Table::new()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_fill_missing_leaves_complete_table_unchanged() {
        let table = Table::from_columns(vec![
            Column::dense("A", [1.0, 2.0, 3.0]),
            Column::dense("B", [4.0, 5.0, 6.0]),
        ])
        .unwrap();
        let result = FillMissing::default().transform(table.clone()).unwrap();
        assert_eq!(result, table);
    }

    #[test]
    fn test_fill_missing_custom_sentinel() {
        let table = Table::from_columns(vec![Column::new("A", vec![None, Some(1.0)])]).unwrap();
        let result = FillMissing { sentinel: -1.0 }.transform(table).unwrap();
        assert_eq!(result.column("A").unwrap().values, vec![Some(-1.0), Some(1.0)]);
    }

    #[test]
    fn test_lag_feature_defaults_to_first_column() {
        let table = Table::from_columns(vec![
            Column::dense("target", [1.0, 2.0, 3.0]),
            Column::dense("x", [9.0, 9.0, 9.0]),
        ])
        .unwrap();

        let lag = LagFeature {
            column: None,
            periods: 1,
        };
        let result = lag.transform(table).unwrap();
        assert_eq!(
            result.column("lag_1").unwrap().values,
            vec![None, Some(1.0), Some(2.0)]
        );
    }

    #[test]
    fn test_lag_feature_unknown_column() {
        let table = Table::from_columns(vec![Column::dense("a", [1.0])]).unwrap();
        let lag = LagFeature {
            column: Some("missing".to_string()),
            periods: 1,
        };
        assert!(matches!(
            lag.transform(table),
            Err(FeatureError::ColumnNotFound(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_chain_applies_steps_in_order() {
        let chain = build_features(&[
            FeatureKind::Lag {
                column: None,
                periods: 1,
            },
            FeatureKind::FillMissing { sentinel: 0.0 },
        ]);
        assert_eq!(chain.step_names(), vec!["lag", "fill-missing"]);

        let table = Table::from_columns(vec![Column::dense("target", [5.0, 6.0])]).unwrap();
        let result = chain.transform(table).unwrap();
        assert_eq!(
            result.column("lag_1").unwrap().values,
            vec![Some(0.0), Some(5.0)]
        );
    }
}
