use camino::Utf8Path;
use simple_error::{SimpleResult, bail};

/// Check a required input path, which may be either a file or a directory
///
/// Assumes no logger has been configured yet
///
pub fn check_required_path(path: &Utf8Path, label: &str) -> SimpleResult<()> {
    if path.as_str().is_empty() {
        bail!("Must specify {} path", label);
    }
    if !path.exists() {
        bail!("Can't find specified {} path: '{}'", label, path);
    }
    Ok(())
}

/// Check that an output directory path is not already taken by a regular file
///
/// Assumes no logger has been configured yet
///
pub fn check_output_dirname(dirname: &Utf8Path, label: &str) -> SimpleResult<()> {
    if dirname.as_str().is_empty() {
        bail!("Must specify {} directory", label);
    }
    if dirname.is_file() {
        bail!(
            "Specified {} directory path is an existing file: '{}'",
            label,
            dirname
        );
    }
    Ok(())
}
