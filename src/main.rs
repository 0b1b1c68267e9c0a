mod cli;
mod cnv_model;
mod errors;
mod gaussian_params;
mod globals;
mod input_master;
mod logger;
mod model_spec;
mod os_utils;
mod pipeline;
mod prob_utils;
mod run_stats;
mod track_stats;

use std::process;

use hhmmss::Hhmmss;
use log::info;

use crate::cnv_model::StaticSegmentationSettings;
use crate::errors::CnvSegResult;
use crate::globals::{PROGRAM_NAME, PROGRAM_VERSION};
use crate::logger::setup_logger;
use crate::pipeline::{SegmentationPaths, SegwayCommand, run_cnv_segmentation};
use crate::track_stats::GenomedataArchive;

fn run(settings: cli::Settings) -> CnvSegResult<()> {
    info!("Starting {PROGRAM_NAME} {PROGRAM_VERSION}");
    info!(
        "cmdline: {}",
        std::env::args().collect::<Vec<_>>().join(" ")
    );

    let start = std::time::Instant::now();

    let static_settings = StaticSegmentationSettings::new();
    let pipeline = SegwayCommand::new(&settings.segway_path);
    let source = GenomedataArchive::new(&settings.archive);
    let paths = SegmentationPaths {
        archive: settings.archive,
        train_dir: settings.train_dir,
        annotate_dir: settings.annotate_dir,
    };
    run_cnv_segmentation(&static_settings, &pipeline, &source, &paths)?;

    info!(
        "{PROGRAM_NAME} completed. Total Runtime: {}",
        start.elapsed().hhmmssxxx()
    );
    Ok(())
}

fn main() {
    let settings = cli::validate_and_fix_settings(cli::parse_settings());

    if let Err(err) = setup_logger(settings.debug) {
        eprintln!("Unable to start logger: {err}");
        process::exit(exitcode::SOFTWARE);
    }

    if let Err(err) = run(settings) {
        eprintln!("{err}");
        process::exit(err.exit_code());
    }
}
