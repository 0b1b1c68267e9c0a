//! Derive per-state Gaussian emission parameters from aggregate track statistics
//!

use log::{debug, info};
use num::Float;
use serde::Serialize;
use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::errors::{CnvSegError, CnvSegResult};
use crate::track_stats::TrackStatistics;

/// Copy number segmentation states, in segment label order
#[derive(Clone, Copy, Debug, EnumCount, EnumIter, PartialEq)]
pub enum SegmentState {
    Loss,
    Neutral,
    Gain,
}

impl SegmentState {
    /// Direction of this state's mean shift away from the global track mean
    fn mean_shift_sign(&self) -> f64 {
        match self {
            Self::Loss => -1.0,
            Self::Neutral => 0.0,
            Self::Gain => 1.0,
        }
    }
}

/// Variance-stabilizing transform applied to all parameters before Gaussian modeling
///
/// This is arcsinh(x) = ln(x + sqrt(x^2 + 1)), evaluated in a form that is exactly odd and
/// stays finite for large |x|.
///
pub fn arcsinh<F: Float>(x: F) -> F {
    x.asinh()
}

/// Moments of each track's raw signal
#[derive(Clone, Debug, Serialize)]
pub struct TrackMoments {
    pub mean: Vec<f64>,

    /// Biased (population) variance
    pub variance: Vec<f64>,
}

/// Transformed Gaussian parameters for every segment state
///
/// Variance is shared across all states.
///
#[derive(Clone, Debug, Serialize)]
pub struct StateGaussianParams {
    /// Indexed as [state][track]
    pub state_means: Vec<Vec<f64>>,
    pub variance: Vec<f64>,
}

impl StateGaussianParams {
    pub fn track_count(&self) -> usize {
        self.variance.len()
    }

    pub fn state_mean(&self, state: SegmentState) -> &[f64] {
        &self.state_means[state as usize]
    }
}

/// Relative bound, in units of f64 epsilon, on the cancellation error accepted in a variance
const VARIANCE_ROUNDOFF_ULPS: f64 = 8.0;

/// Get the biased variance of one track, rejecting negative values
///
/// Cancellation in `sums_squares / count - mean^2` can leave a tiny negative result for a
/// constant track, so values within a few ulps of the larger of the two terms are clamped to
/// zero.
///
fn get_track_variance(track_index: usize, second_moment: f64, mean: f64) -> CnvSegResult<f64> {
    let mean_squared = mean * mean;
    if !mean_squared.is_finite() {
        return Err(CnvSegError::data_unavailable(
            "sums",
            format!("squared mean overflows at track index {track_index} (mean {mean})"),
        ));
    }

    let variance = second_moment - mean_squared;
    if variance >= 0.0 {
        return Ok(variance);
    }

    let roundoff_limit =
        VARIANCE_ROUNDOFF_ULPS * f64::EPSILON * second_moment.abs().max(mean_squared);
    if -variance <= roundoff_limit {
        Ok(0.0)
    } else {
        Err(CnvSegError::data_unavailable(
            "sums_squares",
            format!(
                "negative variance {variance} at track index {track_index} (mean {mean}, sums_squares/count {second_moment})"
            ),
        ))
    }
}

/// Get the mean and biased variance of each track
pub fn get_track_moments(stats: &TrackStatistics) -> CnvSegResult<TrackMoments> {
    let track_count = stats.track_count();
    let mut mean = Vec::with_capacity(track_count);
    let mut variance = Vec::with_capacity(track_count);
    for track_index in 0..track_count {
        let count = stats.num_datapoints[track_index];
        if count == 0 {
            return Err(CnvSegError::data_unavailable(
                "num_datapoints",
                format!("zero datapoints at track index {track_index}"),
            ));
        }
        let count = count as f64;
        let track_mean = stats.sums[track_index] / count;
        let second_moment = stats.sums_squares[track_index] / count;
        let track_variance = get_track_variance(track_index, second_moment, track_mean)?;
        if !(track_mean.is_finite() && track_variance.is_finite()) {
            return Err(CnvSegError::data_unavailable(
                "sums",
                format!("non-finite moments at track index {track_index}"),
            ));
        }
        mean.push(track_mean);
        variance.push(track_variance);
    }
    Ok(TrackMoments { mean, variance })
}

/// Place each state mean `sd_separation` standard deviations from the track mean, then
/// transform all values for modeling
///
pub fn get_state_gaussian_params(
    moments: &TrackMoments,
    sd_separation: f64,
) -> StateGaussianParams {
    let state_means = SegmentState::iter()
        .map(|state| {
            moments
                .mean
                .iter()
                .zip(moments.variance.iter())
                .map(|(mean, variance)| {
                    let sd = variance.sqrt();
                    arcsinh(mean + state.mean_shift_sign() * sd_separation * sd)
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let variance = moments.variance.iter().map(|x| arcsinh(*x)).collect();

    StateGaussianParams {
        state_means,
        variance,
    }
}

/// Run the full statistics to Gaussian parameter derivation
///
pub fn derive_state_gaussian_params(
    stats: &TrackStatistics,
    sd_separation: f64,
) -> CnvSegResult<(TrackMoments, StateGaussianParams)> {
    let moments = get_track_moments(stats)?;
    for (track_index, track_name) in stats.track_names.iter().enumerate() {
        debug!(
            "Track {track_name}: mean {} variance {}",
            moments.mean[track_index],
            moments.variance[track_index]
        );
    }

    let params = get_state_gaussian_params(&moments, sd_separation);
    for state in SegmentState::iter() {
        info!(
            "Transformed {state:?} state mean: {:?}",
            params.state_mean(state)
        );
    }
    info!("Transformed shared variance: {:?}", params.variance);

    Ok((moments, params))
}
