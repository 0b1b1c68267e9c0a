mod utils;

use camino::Utf8PathBuf;
use chrono::Datelike;
use clap::Parser;
use simple_error::SimpleResult;

use self::utils::{check_output_dirname, check_required_path};
use crate::globals::PROGRAM_NAME;

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    after_help = format!("Copyright (C) 2024-{}     The {} developers
This program comes with ABSOLUTELY NO WARRANTY; it is intended for
research use only and not for use in diagnostic procedures.", chrono::Utc::now().year(), PROGRAM_NAME),
    help_template = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}"
)]
#[clap(rename_all = "kebab_case")]
pub struct Settings {
    /// Genomedata archive, either the archive directory or its exported track statistics file
    #[arg(value_name = "ARCHIVE")]
    pub archive: Utf8PathBuf,

    /// Training directory created by the initialization stage
    ///
    /// The parameter file is written to 'params/input.master' under this directory.
    ///
    #[arg(value_name = "TRAIN_DIR")]
    pub train_dir: Utf8PathBuf,

    /// Output directory for the annotation stage
    #[arg(value_name = "ANNOTATE_DIR")]
    pub annotate_dir: Utf8PathBuf,

    /// Turn on extra debug logging
    #[arg(hide = true, long)]
    pub debug: bool,

    /// Executable used to run the initialization and annotation stages
    #[arg(hide = true, long, default_value = "segway")]
    pub segway_path: Utf8PathBuf,
}

/// Validate settings and update parameters that can't be processed by clap
///
/// Assumes no logger has been configured yet
///
fn validate_and_fix_settings_impl(settings: Settings) -> SimpleResult<Settings> {
    check_required_path(&settings.archive, "archive")?;
    check_output_dirname(&settings.train_dir, "train")?;
    check_output_dirname(&settings.annotate_dir, "annotate")?;
    Ok(settings)
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
pub fn validate_and_fix_settings(settings: Settings) -> Settings {
    match validate_and_fix_settings_impl(settings) {
        Ok(x) => x,
        Err(msg) => {
            eprintln!("Invalid command-line setting: {}", msg);
            std::process::exit(exitcode::USAGE);
        }
    }
}

pub fn parse_settings() -> Settings {
    Settings::parse()
}
