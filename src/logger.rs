//! Methods specific to the cnvseg logger
//!

use crate::globals::PROGRAM_NAME;

/// If debug is true set the default logger to the more verbose debug level
///
/// All log output goes to stderr. Nothing is written to the train or annotate directories,
/// which are created by the external pipeline stages.
///
pub fn setup_logger(debug: bool) -> Result<(), fern::InitError> {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                PROGRAM_NAME,
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}
