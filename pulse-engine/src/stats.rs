//! Small descriptive statistics used by every detector and estimator.
//!
//! All functions are total: degenerate input yields `0.0` rather than NaN so
//! callers can compare results against thresholds without extra checks.

/// Arithmetic mean, `0.0` for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1), `0.0` below two values
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Population standard deviation (n), `0.0` for an empty slice
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (sum_sq / values.len() as f64).sqrt()
}

/// Ordinary least-squares slope of `values` against `x = 0..n-1`
pub fn ols_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }

    if den == 0.0 { 0.0 } else { num / den }
}

/// Cohen's d of `after` relative to `before`
///
/// Pooled deviation is `sqrt((sd_a² + sd_b²) / 2)` over population standard
/// deviations. Returns `0.0` when either group has fewer than two values or
/// the pooled deviation is zero.
pub fn cohens_d(before: &[f64], after: &[f64]) -> f64 {
    if before.len() < 2 || after.len() < 2 {
        return 0.0;
    }
    let sa = population_std(before);
    let sb = population_std(after);
    let pooled = ((sa.powi(2) + sb.powi(2)) / 2.0).sqrt();
    if pooled == 0.0 || !pooled.is_finite() {
        return 0.0;
    }
    let d = (mean(after) - mean(before)) / pooled;
    if d.is_finite() { d } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert!((mean(&[1.0, 2.0, 3.0]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn sample_std_of_single_value_is_zero() {
        assert_eq!(sample_std(&[42.0]), 0.0);
    }

    #[test]
    fn sample_vs_population_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((population_std(&values) - 2.0).abs() < 1e-12);
        assert!((sample_std(&values) - 2.138_089_935).abs() < 1e-6);
    }

    #[test]
    fn slope_of_linear_series() {
        let values: Vec<f64> = (0..10).map(|i| 3.0 + 0.5 * i as f64).collect();
        assert!((ols_slope(&values) - 0.5).abs() < 1e-12);
        assert_eq!(ols_slope(&[5.0]), 0.0);
    }

    #[test]
    fn cohens_d_zero_when_pooled_std_is_zero() {
        let a = [100.0; 10];
        let b = [100.0; 10];
        assert_eq!(cohens_d(&a, &b), 0.0);

        let c = [120.0; 10];
        assert_eq!(cohens_d(&a, &c), 0.0);
    }

    #[test]
    fn cohens_d_requires_two_points_per_group() {
        assert_eq!(cohens_d(&[1.0], &[5.0, 6.0, 7.0]), 0.0);
    }

    #[test]
    fn cohens_d_sign_follows_after_minus_before() {
        let before = [1.0, 2.0, 3.0, 2.0, 1.0];
        let after = [4.0, 5.0, 6.0, 5.0, 4.0];
        assert!(cohens_d(&before, &after) > 0.0);
        assert!(cohens_d(&after, &before) < 0.0);
    }
}
