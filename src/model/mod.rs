//! Regression model used by the predict stage
//!
//! The model splits a table into a target column and feature columns, holds
//! out a seeded test subset, fits on the rest and reports the coefficient of
//! determination (R²) on the held-out rows.

pub mod linalg;

use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::debug;

use crate::config::ModelConfig;
use crate::data::{Column, Table};

/// Name of the single column in the persisted predictions table
pub const PREDICTIONS_COLUMN: &str = "predictions";

/// Fewest training rows accepted by the split
const MIN_TRAIN_ROWS: usize = 2;

#[derive(Error, Debug, PartialEq)]
pub enum ModelError {
    #[error("Table is empty")]
    EmptyTable,

    #[error("Target column '{0}' not found")]
    MissingTarget(String),

    #[error("No feature columns besides target '{0}'")]
    NoFeatures(String),

    #[error("Column '{0}' contains missing values")]
    MissingValues(String),

    #[error("{rows} rows are too few to split into train and test sets")]
    InsufficientRows { rows: usize },

    #[error("Normal equations are singular")]
    Singular,

    #[error("Failed to assemble predictions: {0}")]
    Output(String),
}

/// Result of one fit
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    /// Test-subset predictions in a single `predictions` column
    pub predictions: Table,
    /// R² on the test subset, rounded to three decimals
    pub score: f64,
}

pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    fn fit_and_score(&self, table: &Table) -> Result<ModelOutput, ModelError>;
}

/// Ridge regression on standardized features
#[derive(Debug, Clone, PartialEq)]
pub struct RidgeModel {
    pub target_column: String,
    pub test_ratio: f64,
    pub seed: u64,
    pub alpha: f64,
}

impl RidgeModel {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            target_column: config.target_column.clone(),
            test_ratio: config.test_ratio,
            seed: config.seed,
            alpha: config.alpha,
        }
    }
}

impl Model for RidgeModel {
    fn name(&self) -> &str {
        "ridge"
    }

    fn fit_and_score(&self, table: &Table) -> Result<ModelOutput, ModelError> {
        if table.is_empty() {
            return Err(ModelError::EmptyTable);
        }

        let target = table
            .column(&self.target_column)
            .ok_or_else(|| ModelError::MissingTarget(self.target_column.clone()))?;
        let features: Vec<&Column> = table
            .columns()
            .iter()
            .filter(|c| c.name != self.target_column)
            .collect();
        if features.is_empty() {
            return Err(ModelError::NoFeatures(self.target_column.clone()));
        }

        let y = dense_values(target)?;
        let x: Vec<Vec<f64>> = features
            .iter()
            .map(|c| dense_values(c))
            .collect::<Result<_, _>>()?;

        let (train, test) = train_test_split(table.num_rows(), self.test_ratio, self.seed)?;

        let x_train = design_matrix(&x, &train);
        let y_train: Array1<f64> = train.iter().map(|&i| y[i]).collect();
        let x_test = design_matrix(&x, &test);
        let y_test: Array1<f64> = test.iter().map(|&i| y[i]).collect();

        let fit = RidgeFit::fit(&x_train, &y_train, self.alpha)?;
        let predicted = fit.predict(&x_test);
        let score = round3(r_squared(&y_test, &predicted));

        debug!(
            "Fitted ridge on {} rows x {} features, R² = {}",
            train.len(),
            features.len(),
            score
        );

        let mut predictions =
            Table::from_columns(vec![Column::dense(PREDICTIONS_COLUMN, predicted.to_vec())])
                .map_err(|e| ModelError::Output(e.to_string()))?;
        if !table.index().is_empty() {
            let labels = test.iter().map(|&i| table.index()[i].clone()).collect();
            predictions = predictions
                .with_index(labels)
                .map_err(|e| ModelError::Output(e.to_string()))?;
        }

        Ok(ModelOutput { predictions, score })
    }
}

/// Standardization statistics and weights of a fitted ridge regression
struct RidgeFit {
    mean: Array1<f64>,
    scale: Array1<f64>,
    weights: Array1<f64>,
    intercept: f64,
}

impl RidgeFit {
    fn fit(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Result<Self, ModelError> {
        let mean = x
            .mean_axis(Axis(0))
            .ok_or(ModelError::InsufficientRows { rows: x.nrows() })?;
        let mut scale = x.std_axis(Axis(0), 0.0);
        scale.mapv_inplace(|s| if s > f64::EPSILON { s } else { 1.0 });

        let xs = (x - &mean) / &scale;
        let intercept = y.mean().unwrap_or(0.0);
        let yc = y - intercept;

        let mut gram = xs.t().dot(&xs);
        for i in 0..gram.nrows() {
            gram[[i, i]] += alpha;
        }
        let rhs = xs.t().dot(&yc);
        let weights = linalg::solve_spd(&gram, &rhs).ok_or(ModelError::Singular)?;

        Ok(Self {
            mean,
            scale,
            weights,
            intercept,
        })
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        let xs = (x - &self.mean) / &self.scale;
        xs.dot(&self.weights) + self.intercept
    }
}

// ============================================================================
// SBIO: Pure helpers
// ============================================================================

/// Split row positions into `(train, test)`, both in ascending order.
///
/// The test subset holds `ceil(rows * test_ratio)` rows drawn by a seeded
/// shuffle, so the same `(rows, ratio, seed)` always yields the same split.
pub fn train_test_split(
    rows: usize,
    test_ratio: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), ModelError> {
    let test_rows = (rows as f64 * test_ratio).ceil() as usize;
    if test_rows == 0 || rows < test_rows + MIN_TRAIN_ROWS {
        return Err(ModelError::InsufficientRows { rows });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..rows).collect();
    order.shuffle(&mut rng);

    let mut test = order[..test_rows].to_vec();
    let mut train = order[test_rows..].to_vec();
    test.sort_unstable();
    train.sort_unstable();
    Ok((train, test))
}

/// Coefficient of determination. A constant target scores 1.0 when predicted
/// exactly and 0.0 otherwise.
pub fn r_squared(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    let mean = actual.mean().unwrap_or(0.0);
    let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(y, p)| (y - p).powi(2))
        .sum();

    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn dense_values(column: &Column) -> Result<Vec<f64>, ModelError> {
    column
        .values
        .iter()
        .map(|v| v.ok_or_else(|| ModelError::MissingValues(column.name.clone())))
        .collect()
}

fn design_matrix(features: &[Vec<f64>], rows: &[usize]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), features.len()), |(i, j)| features[j][rows[i]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> RidgeModel {
        RidgeModel {
            target_column: "target".to_string(),
            test_ratio: 0.2,
            seed: 42,
            alpha: 1.0,
        }
    }

    fn linear_table(rows: usize) -> Table {
        let a: Vec<f64> = (0..rows).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..rows).map(|i| ((i * 7) % 11) as f64).collect();
        let target: Vec<f64> = a
            .iter()
            .zip(&b)
            .enumerate()
            .map(|(i, (a, b))| 2.0 * a + 3.0 * b + 1.0 + (i as f64).sin() * 0.1)
            .collect();

        Table::from_columns(vec![
            Column::dense("target", target),
            Column::dense("a", a),
            Column::dense("b", b),
        ])
        .unwrap()
    }

    #[test]
    fn test_fit_and_score_well_conditioned() {
        let output = model().fit_and_score(&linear_table(100)).unwrap();

        assert!(output.score > 0.95 && output.score <= 1.0, "score {}", output.score);
        assert_eq!(output.predictions.column_names(), vec![PREDICTIONS_COLUMN]);
        assert_eq!(output.predictions.num_rows(), 20);
    }

    #[test]
    fn test_fit_and_score_is_deterministic() {
        let table = linear_table(60);
        let first = model().fit_and_score(&table).unwrap();
        let second = model().fit_and_score(&table).unwrap();

        assert_eq!(first.score, second.score);
        assert_eq!(first.predictions, second.predictions);
    }

    #[test]
    fn test_missing_target() {
        let table = Table::from_columns(vec![Column::dense("a", [1.0, 2.0, 3.0])]).unwrap();
        assert_eq!(
            model().fit_and_score(&table),
            Err(ModelError::MissingTarget("target".to_string()))
        );
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(model().fit_and_score(&Table::new()), Err(ModelError::EmptyTable));
    }

    #[test]
    fn test_no_features() {
        let table = Table::from_columns(vec![Column::dense("target", [1.0, 2.0, 3.0])]).unwrap();
        assert_eq!(
            model().fit_and_score(&table),
            Err(ModelError::NoFeatures("target".to_string()))
        );
    }

    #[test]
    fn test_missing_values_rejected() {
        let table = Table::from_columns(vec![
            Column::dense("target", [1.0, 2.0, 3.0, 4.0]),
            Column::new("a", vec![Some(1.0), None, Some(3.0), Some(4.0)]),
        ])
        .unwrap();
        assert_eq!(
            model().fit_and_score(&table),
            Err(ModelError::MissingValues("a".to_string()))
        );
    }

    #[test]
    fn test_too_few_rows() {
        let table = Table::from_columns(vec![
            Column::dense("target", [1.0, 2.0]),
            Column::dense("a", [1.0, 2.0]),
        ])
        .unwrap();
        assert_eq!(
            model().fit_and_score(&table),
            Err(ModelError::InsufficientRows { rows: 2 })
        );
    }

    #[test]
    fn test_train_test_split_partitions_rows() {
        let (train, test) = train_test_split(10, 0.25, 7).unwrap();
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 7);

        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());

        assert_eq!(train_test_split(10, 0.25, 7).unwrap(), (train, test));
    }

    #[test]
    fn test_r_squared_constant_target() {
        let actual = Array1::from(vec![2.0, 2.0]);
        assert_eq!(r_squared(&actual, &Array1::from(vec![2.0, 2.0])), 1.0);
        assert_eq!(r_squared(&actual, &Array1::from(vec![1.0, 3.0])), 0.0);
    }

    #[test]
    fn test_r_squared_perfect_fit() {
        let actual = Array1::from(vec![1.0, 2.0, 3.0]);
        assert_eq!(r_squared(&actual, &actual.clone()), 1.0);
    }
}
