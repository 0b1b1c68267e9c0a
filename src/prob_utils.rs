use std::iter::Sum;

use num::Float;

/// Check that every value in `pdf` is a finite probability
///
/// Returns the index of the first invalid value
///
pub fn find_invalid_prob<F: Float>(pdf: &[F]) -> Option<usize> {
    pdf.iter()
        .position(|p| !(p.is_finite() && *p >= F::zero() && *p <= F::one()))
}

/// Sum a prob distro
///
/// Summation runs from the smallest value up, so that near-deterministic distributions with a
/// tiny residual mass keep that mass in the total.
///
pub fn get_distro_sum<F: Float + Sum<F>>(pdf: &[F]) -> F {
    let mut sorted = pdf.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted.into_iter().sum()
}

/// True if the prob distro sums to one within `tolerance`
///
pub fn is_normalized_distro(pdf: &[f64], tolerance: f64) -> bool {
    approx::abs_diff_eq!(get_distro_sum(pdf), 1.0, epsilon = tolerance)
}
