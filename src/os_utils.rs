//! Utilities pertaining to filesystem and other os-level settings
//!

use camino::Utf8Path;
use log::debug;

use crate::errors::{CnvSegError, CnvSegResult};

/// Create a novel directory path if it does not exist already
///
/// If the directory already exists no operations are performed
///
/// * `label` - used to describe the directory in log messages
///
pub fn create_dir_all(dir: &Utf8Path, label: &str) -> CnvSegResult<()> {
    if !dir.is_dir() {
        debug!("Creating {label} directory: '{dir}'");
        std::fs::create_dir_all(dir).map_err(|e| CnvSegError::io(dir, e))?;
    }
    Ok(())
}

/// Write text to a new or truncated file
///
/// The file handle is closed before returning on all paths.
///
pub fn write_text_file(filename: &Utf8Path, text: &str) -> CnvSegResult<()> {
    use std::io::Write;

    let mut f = std::fs::File::create(filename).map_err(|e| CnvSegError::io(filename, e))?;
    f.write_all(text.as_bytes())
        .and_then(|_| f.flush())
        .map_err(|e| CnvSegError::io(filename, e))
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn test_create_dir_all() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let nested = root.join("a").join("b");

        create_dir_all(&nested, "test").unwrap();
        assert!(nested.is_dir());

        // Existing directory is not an error
        create_dir_all(&nested, "test").unwrap();
    }

    #[test]
    fn test_create_dir_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let filename = root.join("x");
        write_text_file(&filename, "x\n").unwrap();

        let result = create_dir_all(&filename.join("y"), "test");
        assert!(matches!(result, Err(CnvSegError::Io { .. })));
    }

    #[test]
    fn test_write_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let filename = root.join("out.txt");
        write_text_file(&filename, "abc\n").unwrap();
        assert_eq!(std::fs::read_to_string(&filename).unwrap(), "abc\n");

        let result = write_text_file(&root.join("missing").join("out.txt"), "abc\n");
        assert!(matches!(result, Err(CnvSegError::Io { .. })));
    }
}
