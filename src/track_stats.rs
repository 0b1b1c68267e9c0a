//! Read aggregate per-track statistics from a genomedata archive
//!

use std::fs::File;
use std::io::BufReader;

use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use serde::Deserialize;

use crate::errors::{CnvSegError, CnvSegResult};

/// Statistics document name used when the archive is given as a directory
pub const ARCHIVE_STATISTICS_FILENAME: &str = "track_statistics.json";

/// Aggregate statistics over all datapoints of each track
///
/// All vectors are aligned by track index.
///
#[derive(Clone, Debug, PartialEq)]
pub struct TrackStatistics {
    pub track_names: Vec<String>,
    pub sums: Vec<f64>,
    pub sums_squares: Vec<f64>,
    pub num_datapoints: Vec<u64>,
}

impl TrackStatistics {
    pub fn track_count(&self) -> usize {
        self.sums.len()
    }
}

/// Any source of the per-track aggregate statistics
pub trait TrackStatisticsSource {
    fn read_track_statistics(&self) -> CnvSegResult<TrackStatistics>;
}

/// Raw form of the archive statistics, with all required fields optional so that a missing
/// field can be reported by name
#[derive(Deserialize)]
struct RawTrackStatistics {
    sums: Option<Vec<f64>>,
    sums_squares: Option<Vec<f64>>,
    num_datapoints: Option<Vec<u64>>,

    #[serde(default)]
    tracknames: Vec<String>,
}

fn require_field<T>(value: Option<T>, field: &str) -> CnvSegResult<T> {
    value.ok_or_else(|| CnvSegError::data_unavailable(field, "field is missing from archive"))
}

fn check_finite(values: &[f64], field: &str) -> CnvSegResult<()> {
    if let Some(track_index) = values.iter().position(|x| !x.is_finite()) {
        return Err(CnvSegError::data_unavailable(
            field,
            format!("non-finite value at track index {track_index}"),
        ));
    }
    Ok(())
}

impl RawTrackStatistics {
    fn into_track_statistics(self) -> CnvSegResult<TrackStatistics> {
        let sums = require_field(self.sums, "sums")?;
        let sums_squares = require_field(self.sums_squares, "sums_squares")?;
        let num_datapoints = require_field(self.num_datapoints, "num_datapoints")?;

        if sums.is_empty() {
            return Err(CnvSegError::data_unavailable("sums", "archive has no tracks"));
        }
        let track_count = sums.len();
        if sums_squares.len() != track_count {
            return Err(CnvSegError::data_unavailable(
                "sums_squares",
                format!(
                    "found {} values for {track_count} tracks",
                    sums_squares.len()
                ),
            ));
        }
        if num_datapoints.len() != track_count {
            return Err(CnvSegError::data_unavailable(
                "num_datapoints",
                format!(
                    "found {} values for {track_count} tracks",
                    num_datapoints.len()
                ),
            ));
        }
        check_finite(&sums, "sums")?;
        check_finite(&sums_squares, "sums_squares")?;
        if let Some(track_index) = num_datapoints.iter().position(|x| *x == 0) {
            return Err(CnvSegError::data_unavailable(
                "num_datapoints",
                format!("zero datapoints at track index {track_index}"),
            ));
        }

        let track_names = if self.tracknames.len() == track_count {
            self.tracknames
        } else {
            (0..track_count).map(|x| format!("track{x}")).collect()
        };

        Ok(TrackStatistics {
            track_names,
            sums,
            sums_squares,
            num_datapoints,
        })
    }
}

/// Handle to a genomedata archive's exported aggregate track attributes
///
/// The archive may be given either as the statistics document itself or as an archive
/// directory containing `ARCHIVE_STATISTICS_FILENAME`.
///
pub struct GenomedataArchive {
    statistics_filename: Utf8PathBuf,
}

impl GenomedataArchive {
    pub fn new(archive_path: &Utf8Path) -> Self {
        let statistics_filename = if archive_path.is_dir() {
            archive_path.join(ARCHIVE_STATISTICS_FILENAME)
        } else {
            archive_path.to_path_buf()
        };
        Self {
            statistics_filename,
        }
    }
}

impl TrackStatisticsSource for GenomedataArchive {
    fn read_track_statistics(&self) -> CnvSegResult<TrackStatistics> {
        let filename = &self.statistics_filename;
        info!("Reading track statistics from archive: '{filename}'");

        // The file handle is released at the end of this scope on every path
        let raw: RawTrackStatistics = {
            let file = File::open(filename).map_err(|e| CnvSegError::io(filename, e))?;
            serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                CnvSegError::data_unavailable(
                    "archive",
                    format!("unable to parse statistics in '{filename}': {e}"),
                )
            })?
        };

        let stats = raw.into_track_statistics()?;
        info!(
            "Read statistics for {} track(s): {}",
            stats.track_count(),
            stats.track_names.join(",")
        );
        Ok(stats)
    }
}
