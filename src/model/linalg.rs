use ndarray::{Array1, Array2};

/// Pivot values at or below this are treated as a singular system
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Solve `a · x = b` for a symmetric positive-definite `a` by Cholesky
/// factorisation. Returns `None` when `a` is not positive definite.
pub fn solve_spd(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return None;
    }

    // a = l · lᵀ
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if !sum.is_finite() || sum <= PIVOT_TOLERANCE {
                    return None;
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }

    // l · z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * z[k];
        }
        z[i] = sum / l[[i, i]];
    }

    // lᵀ · x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }

    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_solve_spd_two_by_two() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 5.0];
        let x = solve_spd(&a, &b).unwrap();

        let check = a.dot(&x);
        assert!((check[0] - 2.0).abs() < 1e-9);
        assert!((check[1] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_solve_spd_rejects_singular() {
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        let b = array![1.0, 1.0];
        assert!(solve_spd(&a, &b).is_none());
    }

    #[test]
    fn test_solve_spd_rejects_shape_mismatch() {
        let a = array![[1.0, 0.0], [0.0, 1.0]];
        let b = array![1.0, 2.0, 3.0];
        assert!(solve_spd(&a, &b).is_none());
    }
}
