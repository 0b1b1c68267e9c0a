//! Error types for the full cnvseg run
//!

use std::process::ExitStatus;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::model_spec::SpecError;

#[derive(Debug, Error)]
pub enum CnvSegError {
    /// Archive statistics are missing or numerically unusable
    #[error("Track statistics unavailable for field '{field}': {reason}")]
    DataUnavailable { field: String, reason: String },

    #[error("Invalid model specification: {0}")]
    Specification(#[from] SpecError),

    #[error("I/O failure at '{path}': {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The written parameter file does not read back as the in-memory specification
    #[error("Parameter file '{path}' failed verification: {detail}")]
    OutputVerification { path: Utf8PathBuf, detail: String },

    #[error("External pipeline stage '{stage}' failed: {detail}")]
    ExternalStage {
        stage: String,
        status: Option<ExitStatus>,
        detail: String,
    },
}

impl CnvSegError {
    pub fn data_unavailable(field: &str, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn io(path: &camino::Utf8Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Process exit status used to report this error
    ///
    /// External stage failures pass through the stage's own exit code when there is one.
    ///
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DataUnavailable { .. } => exitcode::DATAERR,
            Self::Specification(_) => exitcode::SOFTWARE,
            Self::Io { .. } => exitcode::IOERR,
            Self::OutputVerification { .. } => exitcode::SOFTWARE,
            Self::ExternalStage { status, .. } => status
                .and_then(|x| x.code())
                .filter(|x| *x != 0)
                .unwrap_or(exitcode::SOFTWARE),
        }
    }
}

pub type CnvSegResult<T> = Result<T, CnvSegError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            CnvSegError::data_unavailable("sums", "missing").exit_code(),
            CnvSegError::Specification(SpecError::DuplicateName {
                kind: "NAME_COLLECTION".to_string(),
                name: "x".to_string(),
            })
            .exit_code(),
            CnvSegError::io(
                camino::Utf8Path::new("x"),
                std::io::Error::other("test"),
            )
            .exit_code(),
        ];
        assert_eq!(codes, [exitcode::DATAERR, exitcode::SOFTWARE, exitcode::IOERR]);

        // None of these can collide with clap's usage error status
        assert!(!codes.contains(&2));
    }

    #[test]
    fn test_external_stage_without_status() {
        let err = CnvSegError::ExternalStage {
            stage: "annotate".to_string(),
            status: None,
            detail: "not found".to_string(),
        };
        assert_eq!(err.exit_code(), exitcode::SOFTWARE);
    }
}
