//! Track stats for the whole cnvseg run
//!

use camino::{Utf8Path, Utf8PathBuf};
use const_format::concatcp;
use log::info;
use serde::{Deserialize, Serialize};

use crate::errors::{CnvSegError, CnvSegResult};
use crate::gaussian_params::{StateGaussianParams, TrackMoments};
use crate::globals::PROGRAM_NAME;
use crate::os_utils::create_dir_all;

pub const RUN_STATS_FILENAME: &str = concatcp!(PROGRAM_NAME, ".run.stats.json");

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct StageTimings {
    pub train_init_time_secs: f64,

    /// Statistics read, parameter derivation, specification build and parameter file output
    pub model_setup_time_secs: f64,

    pub annotate_time_secs: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RunStats {
    pub track_names: Vec<String>,
    pub raw_mean: Vec<f64>,
    pub raw_variance: Vec<f64>,

    /// Transformed means indexed as [state][track], in loss, neutral, gain order
    pub transformed_state_means: Vec<Vec<f64>>,
    pub transformed_variance: Vec<f64>,

    pub parameter_filename: Utf8PathBuf,
    pub stage_timings: StageTimings,
}

impl RunStats {
    pub fn new(
        track_names: &[String],
        moments: &TrackMoments,
        params: &StateGaussianParams,
        parameter_filename: &Utf8Path,
    ) -> Self {
        Self {
            track_names: track_names.to_vec(),
            raw_mean: moments.mean.clone(),
            raw_variance: moments.variance.clone(),
            transformed_state_means: params.state_means.clone(),
            transformed_variance: params.variance.clone(),
            parameter_filename: parameter_filename.to_path_buf(),
            stage_timings: StageTimings::default(),
        }
    }
}

/// Write run_stats structure out in json format
pub fn write_run_stats(output_dir: &Utf8Path, run_stats: &RunStats) -> CnvSegResult<()> {
    create_dir_all(output_dir, "run statistics")?;
    let filename = output_dir.join(RUN_STATS_FILENAME);

    info!("Writing run statistics to file: '{filename}'");

    let f = std::fs::File::create(&filename).map_err(|e| CnvSegError::io(&filename, e))?;
    serde_json::to_writer_pretty(&f, &run_stats)
        .map_err(|e| CnvSegError::io(&filename, std::io::Error::other(e)))
}
