use ndarray::{Array1, Array2, ArrayView1};
use statrs::function::erf::erf;
use std::f64::consts::SQRT_2;

/// Log-sum-exp trick for numerical stability
pub fn log_sum_exp(log_values: &[f64]) -> f64 {
    if log_values.is_empty() {
        return f64::NEG_INFINITY;
    }

    let max_val = log_values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max_val == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }

    let sum_exp: f64 = log_values.iter().map(|&v| (v - max_val).exp()).sum();
    max_val + sum_exp.ln()
}

pub fn log_sum_exp_view(log_values: ArrayView1<f64>) -> f64 {
    match log_values.as_slice() {
        Some(slice) => log_sum_exp(slice),
        None => log_sum_exp(&log_values.to_vec()),
    }
}

/// Gaussian probability mass on [lower, upper) for N(mean, std²)
///
/// Infinite bounds are allowed, so an open-ended boundary bin absorbs the tail.
pub fn gaussian_bin_mass(lower: f64, upper: f64, mean: f64, std: f64) -> f64 {
    let scale = std * SQRT_2;
    let upper_erf = if upper == f64::INFINITY { 1.0 } else { erf((upper - mean) / scale) };
    let lower_erf = if lower == f64::NEG_INFINITY { -1.0 } else { erf((lower - mean) / scale) };
    ((upper_erf - lower_erf) / 2.0).max(0.0)
}

/// Normalise in place; an all-zero (or non-finite) vector becomes uniform
pub fn normalize(values: &mut Array1<f64>) {
    let sum: f64 = values.sum();
    if sum > 0.0 && sum.is_finite() {
        values.mapv_inplace(|v| v / sum);
    } else if !values.is_empty() {
        let uniform = 1.0 / values.len() as f64;
        values.fill(uniform);
    }
}

/// Normalise every row in place with the same all-zero fallback as [`normalize`]
pub fn normalize_rows(matrix: &mut Array2<f64>) {
    let n_cols = matrix.ncols();
    for mut row in matrix.rows_mut() {
        let sum: f64 = row.sum();
        if sum > 0.0 && sum.is_finite() {
            row.mapv_inplace(|v| v / sum);
        } else if n_cols > 0 {
            row.fill(1.0 / n_cols as f64);
        }
    }
}

/// Index of the first maximum (strict `>` comparison keeps the earliest tie)
pub fn argmax(values: ArrayView1<f64>) -> usize {
    let mut best = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::array;

    #[test]
    fn test_log_sum_exp_matches_naive() {
        for &(a, b) in &[(-1.0, -2.0), (0.5, 3.0), (-10.0, -10.5), (2.0, -7.0)] {
            let naive: f64 = (f64::exp(a) + f64::exp(b)).ln();
            assert_relative_eq!(log_sum_exp(&[a, b]), naive, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_log_sum_exp_equal_terms() {
        let a = -3.25;
        assert_abs_diff_eq!(log_sum_exp(&[a, a]), a + std::f64::consts::LN_2, epsilon = 1e-15);
    }

    #[test]
    fn test_log_sum_exp_dominant_term() {
        let result = log_sum_exp(&[-1000.0, -1.0]);
        assert_abs_diff_eq!(result, -1.0, epsilon = 1e-12);

        // Naive evaluation would underflow to ln(0) here
        let result = log_sum_exp(&[-2000.0, -2001.0]);
        assert!(result.is_finite());
        assert!(result > -2000.0 && result < -1999.0);
    }

    #[test]
    fn test_log_sum_exp_degenerate_inputs() {
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY, f64::NEG_INFINITY]), f64::NEG_INFINITY);
        assert_abs_diff_eq!(log_sum_exp(&[f64::NEG_INFINITY, -0.5]), -0.5, epsilon = 1e-15);
    }

    #[test]
    fn test_gaussian_bin_mass() {
        assert_abs_diff_eq!(gaussian_bin_mass(f64::NEG_INFINITY, f64::INFINITY, 0.0, 1.0), 1.0);
        assert_abs_diff_eq!(gaussian_bin_mass(f64::NEG_INFINITY, 0.0, 0.0, 1.0), 0.5, epsilon = 1e-12);
        // One sigma either side of the mean
        assert_abs_diff_eq!(gaussian_bin_mass(-0.01, 0.01, 0.0, 0.01), 0.682_689_492, epsilon = 1e-8);
    }

    #[test]
    fn test_normalize_zero_row_becomes_uniform() {
        let mut values = array![0.0, 0.0, 0.0, 0.0];
        normalize(&mut values);
        assert_eq!(values, array![0.25, 0.25, 0.25, 0.25]);

        let mut matrix = array![[1.0, 3.0], [0.0, 0.0]];
        normalize_rows(&mut matrix);
        assert_eq!(matrix, array![[0.25, 0.75], [0.5, 0.5]]);
    }

    #[test]
    fn test_argmax_first_tie_wins() {
        assert_eq!(argmax(array![0.2, 0.5, 0.5, 0.1].view()), 1);
        assert_eq!(argmax(array![f64::NEG_INFINITY, f64::NEG_INFINITY].view()), 0);
    }
}
