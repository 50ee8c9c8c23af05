use crate::error::{ImputeError, Result};
use crate::matrix::Matrix;
use crate::selection::metrics::masked_rmse;
use rayon::prelude::*;
use tracing::{debug, warn};

/// K-nearest-neighbor imputer over the masked Euclidean distance.
///
/// A missing cell `(r, c)` becomes the plain mean of column `c` over the
/// `k` rows closest to `r` that observe `c`. Observed cells are never
/// touched. When a column has no observed value anywhere its cells stay
/// missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KNNImputer {
    n_neighbors: usize,
}

impl KNNImputer {
    /// Create a new KNN imputer with the specified number of neighbors.
    ///
    /// # Errors
    ///
    /// [`ImputeError::InvalidParameter`] when `n_neighbors` is zero.
    pub fn new(n_neighbors: usize) -> Result<Self> {
        if n_neighbors == 0 {
            return Err(ImputeError::invalid_parameter(
                "k",
                "number of neighbors must be at least 1",
            ));
        }
        Ok(Self { n_neighbors })
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    /// Fill every fillable missing cell; returns a new matrix.
    ///
    /// Rows are imputed in parallel on the current rayon pool. Each row
    /// only reads the input matrix, so the result does not depend on the
    /// number of threads.
    pub fn impute(&self, matrix: &Matrix) -> Matrix {
        if !matrix.has_missing() {
            return matrix.clone();
        }

        let n_rows = matrix.n_rows();
        if self.n_neighbors >= n_rows {
            debug!(
                "K={} exceeds the {} candidate neighbor rows; using all of them",
                self.n_neighbors,
                n_rows.saturating_sub(1)
            );
        }

        let empty_columns: Vec<&str> = matrix
            .missing_per_column()
            .iter()
            .enumerate()
            .filter(|&(_, &missing)| missing == n_rows)
            .map(|(idx, _)| matrix.columns()[idx].as_str())
            .collect();
        if !empty_columns.is_empty() {
            warn!(
                "{} columns have no observed values and stay missing: {:?}",
                empty_columns.len(),
                empty_columns
            );
        }

        let rows: Vec<Vec<Option<f64>>> = (0..n_rows)
            .into_par_iter()
            .map(|row| self.impute_row(matrix, row))
            .collect();

        matrix.with_values(rows.into_iter().flatten().collect())
    }

    /// Impute `matrix` and score the result against its own observed cells.
    pub fn evaluate(&self, matrix: &Matrix) -> Result<f64> {
        self.evaluate_masked(matrix, &matrix.observed_mask())
    }

    /// [`evaluate`](Self::evaluate) with a precomputed non-missing mask,
    /// shared read-only between concurrent evaluations.
    pub(crate) fn evaluate_masked(&self, matrix: &Matrix, mask: &[bool]) -> Result<f64> {
        if matrix.is_empty() {
            return Err(ImputeError::InputShape {
                rows: matrix.n_rows(),
                columns: matrix.n_cols(),
                reason: "cannot evaluate imputation on an empty matrix".to_string(),
            });
        }
        let reconstruction = self.impute(matrix);
        masked_rmse(matrix, &reconstruction, mask, self.n_neighbors)
    }

    fn impute_row(&self, matrix: &Matrix, target_row: usize) -> Vec<Option<f64>> {
        let row = matrix.row(target_row);
        if row.iter().all(Option::is_some) {
            return row.to_vec();
        }

        let neighbors = rank_neighbors(matrix, target_row);

        row.iter()
            .enumerate()
            .map(|(col, cell)| match cell {
                Some(value) => Some(*value),
                None => self.neighbor_mean(matrix, &neighbors, col),
            })
            .collect()
    }

    /// Mean of `col` over the first `k` ranked neighbors that observe it.
    fn neighbor_mean(&self, matrix: &Matrix, neighbors: &[(usize, f64)], col: usize) -> Option<f64> {
        let mut sum = 0.0;
        let mut count = 0usize;
        for &(neighbor, _) in neighbors {
            if let Some(value) = matrix.get(neighbor, col) {
                sum += value;
                count += 1;
                if count == self.n_neighbors {
                    break;
                }
            }
        }
        (count > 0).then(|| sum / count as f64)
    }
}

/// All rows except `target_row`, closest first, ties broken by row index.
fn rank_neighbors(matrix: &Matrix, target_row: usize) -> Vec<(usize, f64)> {
    let target = matrix.row(target_row);
    let mut distances: Vec<(usize, f64)> = (0..matrix.n_rows())
        .filter(|&row| row != target_row)
        .map(|row| (row, nan_euclidean(target, matrix.row(row))))
        .collect();

    distances.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    distances
}

/// Euclidean distance over the coordinates observed in both rows, scaled
/// up by `total / present` so that sparse pairs are comparable to dense
/// ones. Rows with nothing in common are infinitely far apart.
fn nan_euclidean(a: &[Option<f64>], b: &[Option<f64>]) -> f64 {
    let mut sum_squared_diff = 0.0;
    let mut present = 0usize;

    for (x, y) in a.iter().zip(b) {
        if let (Some(x), Some(y)) = (x, y) {
            let diff = x - y;
            sum_squared_diff += diff * diff;
            present += 1;
        }
    }

    if present == 0 {
        return f64::INFINITY;
    }
    (a.len() as f64 / present as f64 * sum_squared_diff).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<Option<f64>>>) -> Matrix {
        let width = rows.first().map_or(0, Vec::len);
        Matrix::from_rows(
            (0..rows.len()).map(|i| format!("s{i}")).collect(),
            (0..width).map(|i| format!("f{i}")).collect(),
            rows,
        )
        .unwrap()
    }

    // ========================================================================
    // KNNImputer::new() tests
    // ========================================================================

    #[test]
    fn test_knn_imputer_new_with_valid_neighbors() {
        let imputer = KNNImputer::new(5).unwrap();
        assert_eq!(imputer.n_neighbors(), 5);
    }

    #[test]
    fn test_knn_imputer_new_rejects_zero_neighbors() {
        assert!(matches!(
            KNNImputer::new(0),
            Err(ImputeError::InvalidParameter { .. })
        ));
    }

    // ========================================================================
    // impute() tests
    // ========================================================================

    #[test]
    fn test_impute_uses_mean_of_neighbors() {
        // Row 1 is equidistant from rows 0 and 2
        let m = matrix(vec![
            vec![Some(1.0), Some(10.0)],
            vec![Some(2.0), None],
            vec![Some(3.0), Some(30.0)],
        ]);
        let out = KNNImputer::new(2).unwrap().impute(&m);
        assert_eq!(out.get(1, 1), Some(20.0));
    }

    #[test]
    fn test_impute_tie_broken_by_row_order() {
        let m = matrix(vec![
            vec![Some(1.0), Some(10.0)],
            vec![Some(2.0), None],
            vec![Some(3.0), Some(30.0)],
        ]);
        let out = KNNImputer::new(1).unwrap().impute(&m);
        assert_eq!(out.get(1, 1), Some(10.0));
    }

    #[test]
    fn test_impute_picks_closest_neighbor() {
        let m = matrix(vec![
            vec![Some(10.0), Some(100.0)],
            vec![Some(1.1), None],
            vec![Some(1.0), Some(10.0)],
        ]);
        let out = KNNImputer::new(1).unwrap().impute(&m);
        assert_eq!(out.get(1, 1), Some(10.0));
    }

    #[test]
    fn test_impute_skips_neighbors_missing_the_column() {
        // Row 1 is the closest to row 0 but cannot donate f1
        let m = matrix(vec![
            vec![Some(0.0), None],
            vec![Some(0.1), None],
            vec![Some(5.0), Some(50.0)],
            vec![Some(9.0), Some(90.0)],
        ]);
        let out = KNNImputer::new(1).unwrap().impute(&m);
        assert_eq!(out.get(0, 1), Some(50.0));
        assert_eq!(out.get(1, 1), Some(50.0));
    }

    #[test]
    fn test_impute_k_larger_than_rows_uses_all_donors() {
        let m = matrix(vec![
            vec![Some(1.0), Some(10.0)],
            vec![Some(2.0), None],
            vec![Some(3.0), Some(40.0)],
        ]);
        let out = KNNImputer::new(10).unwrap().impute(&m);
        assert_eq!(out.get(1, 1), Some(25.0));
        assert!(!out.has_missing());
    }

    #[test]
    fn test_rows_without_common_features_rank_last_but_still_donate() {
        let m = matrix(vec![
            vec![Some(1.0), None, Some(5.0)],
            vec![None, Some(2.0), None],
            vec![Some(7.0), Some(2.0), Some(9.0)],
        ]);

        let out = KNNImputer::new(1).unwrap().impute(&m);
        assert_eq!(out.get(1, 0), Some(7.0));
        assert_eq!(out.get(1, 2), Some(9.0));

        let out = KNNImputer::new(2).unwrap().impute(&m);
        assert_eq!(out.get(1, 0), Some(4.0));
        assert_eq!(out.get(1, 2), Some(7.0));
    }

    #[test]
    fn test_all_missing_column_stays_missing() {
        let m = matrix(vec![
            vec![Some(1.0), None],
            vec![Some(2.0), None],
            vec![None, None],
        ]);
        let out = KNNImputer::new(3).unwrap().impute(&m);
        assert_eq!(out.get(2, 0), Some(1.5));
        assert_eq!(out.column(1).filter(Option::is_some).count(), 0);
    }

    #[test]
    fn test_no_missing_values_returns_input() {
        let m = matrix(vec![
            vec![Some(1.0), Some(10.0)],
            vec![Some(2.0), Some(20.0)],
        ]);
        assert_eq!(KNNImputer::new(3).unwrap().impute(&m), m);
    }

    #[test]
    fn test_observed_cells_untouched() {
        let m = matrix(vec![
            vec![Some(1.0), Some(10.0), None],
            vec![None, Some(20.0), Some(0.5)],
            vec![Some(3.0), None, Some(0.7)],
        ]);
        let out = KNNImputer::new(2).unwrap().impute(&m);
        for (before, after) in m.values().iter().zip(out.values()) {
            if before.is_some() {
                assert_eq!(before, after);
            }
        }
        assert!(!out.has_missing());
    }

    #[test]
    fn test_impute_is_deterministic() {
        let m = matrix(vec![
            vec![Some(0.11), None, Some(0.93), Some(0.40)],
            vec![Some(0.12), Some(0.52), None, Some(0.41)],
            vec![None, Some(0.55), Some(0.90), None],
            vec![Some(0.80), Some(0.10), Some(0.20), Some(0.77)],
            vec![Some(0.79), None, Some(0.21), Some(0.75)],
        ]);
        let imputer = KNNImputer::new(2).unwrap();
        let first = imputer.impute(&m);
        for _ in 0..5 {
            assert_eq!(imputer.impute(&m), first);
        }
    }

    // ========================================================================
    // evaluate() tests
    // ========================================================================

    #[test]
    fn test_evaluate_scores_observed_cells() {
        let m = matrix(vec![
            vec![Some(1.0), Some(10.0)],
            vec![Some(2.0), None],
            vec![Some(3.0), Some(30.0)],
        ]);
        let rmse = KNNImputer::new(2).unwrap().evaluate(&m).unwrap();
        assert_eq!(rmse, 0.0);
    }

    #[test]
    fn test_evaluate_fails_on_empty_column() {
        let m = matrix(vec![vec![Some(1.0), None], vec![Some(2.0), None]]);
        let result = KNNImputer::new(1).unwrap().evaluate(&m);
        assert!(matches!(
            result,
            Err(ImputeError::EvaluationFailed { k: 1, .. })
        ));
    }

    #[test]
    fn test_evaluate_rejects_empty_matrix() {
        let m = Matrix::new(Vec::new(), Vec::new(), Vec::new()).unwrap();
        assert!(matches!(
            KNNImputer::new(1).unwrap().evaluate(&m),
            Err(ImputeError::InputShape { .. })
        ));
    }

    // ========================================================================
    // nan_euclidean() tests
    // ========================================================================

    #[test]
    fn test_distance_identical_rows() {
        let row = vec![Some(1.0), Some(2.0), Some(3.0)];
        assert_eq!(nan_euclidean(&row, &row), 0.0);
    }

    #[test]
    fn test_distance_simple() {
        let row1 = vec![Some(0.0), Some(0.0)];
        let row2 = vec![Some(3.0), Some(4.0)];
        assert_eq!(nan_euclidean(&row1, &row2), 5.0);
    }

    #[test]
    fn test_distance_scales_for_missing_coordinates() {
        // Only the last coordinate is shared: sqrt(3 / 1 * 16)
        let row1 = vec![Some(0.0), None, Some(0.0)];
        let row2 = vec![None, Some(3.0), Some(4.0)];
        let expected = 48.0_f64.sqrt();
        assert!((nan_euclidean(&row1, &row2) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_distance_no_common_features() {
        let row1 = vec![Some(1.0), None];
        let row2 = vec![None, Some(2.0)];
        assert_eq!(nan_euclidean(&row1, &row2), f64::INFINITY);
    }

    #[test]
    fn test_rank_neighbors_orders_by_distance_then_index() {
        let m = matrix(vec![
            vec![Some(0.0)],
            vec![Some(2.0)],
            vec![Some(-1.0)],
            vec![Some(1.0)],
            vec![None],
        ]);
        let ranked: Vec<usize> = rank_neighbors(&m, 0).into_iter().map(|(r, _)| r).collect();
        assert_eq!(ranked, vec![2, 3, 1, 4]);
    }
}
