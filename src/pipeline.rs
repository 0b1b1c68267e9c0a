//! Sequence the external segmentation stages around parameter file generation
//!

use std::process::Command;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use log::info;

use crate::cnv_model::{StaticSegmentationSettings, build_cnv_model_spec};
use crate::errors::{CnvSegError, CnvSegResult};
use crate::gaussian_params::derive_state_gaussian_params;
use crate::input_master::{
    INPUT_MASTER_FILENAME, get_spec_outline, parse_outline, render_input_master,
};
use crate::model_spec::ModelSpec;
use crate::os_utils::{create_dir_all, write_text_file};
use crate::run_stats::{RunStats, write_run_stats};
use crate::track_stats::TrackStatisticsSource;

pub const TRAIN_INIT_STAGE: &str = "train-init";
pub const ANNOTATE_STAGE: &str = "annotate";

/// External initialization and annotation stages
///
/// Both calls block until the stage completes, and any failure is returned to the caller
/// without retry.
///
pub trait SegmentationPipeline {
    /// Create the training directory with its auxiliary definitions for `label_count` labels
    fn train_init(
        &self,
        archive: &Utf8Path,
        train_dir: &Utf8Path,
        label_count: usize,
        resolution: u32,
    ) -> CnvSegResult<()>;

    /// Segment the archive using the parameter file in `train_dir`
    fn annotate(
        &self,
        archive: &Utf8Path,
        train_dir: &Utf8Path,
        annotate_dir: &Utf8Path,
    ) -> CnvSegResult<()>;
}

/// Runs each stage as a subcommand of the segway executable
pub struct SegwayCommand {
    program: Utf8PathBuf,
}

impl SegwayCommand {
    pub fn new(program: &Utf8Path) -> Self {
        Self {
            program: program.to_path_buf(),
        }
    }

    fn run_stage(&self, stage: &str, args: &[String]) -> CnvSegResult<()> {
        info!(
            "Running external stage: {} {stage} {}",
            self.program,
            args.join(" ")
        );
        let status = Command::new(&self.program)
            .arg(stage)
            .args(args)
            .status()
            .map_err(|e| CnvSegError::ExternalStage {
                stage: stage.to_string(),
                status: None,
                detail: format!("unable to launch '{}': {e}", self.program),
            })?;

        if !status.success() {
            return Err(CnvSegError::ExternalStage {
                stage: stage.to_string(),
                status: Some(status),
                detail: format!("'{}' {status}", self.program),
            });
        }
        Ok(())
    }
}

impl SegmentationPipeline for SegwayCommand {
    fn train_init(
        &self,
        archive: &Utf8Path,
        train_dir: &Utf8Path,
        label_count: usize,
        resolution: u32,
    ) -> CnvSegResult<()> {
        let args = vec![
            format!("--num-labels={label_count}"),
            format!("--resolution={resolution}"),
            archive.to_string(),
            train_dir.to_string(),
        ];
        self.run_stage(TRAIN_INIT_STAGE, &args)
    }

    fn annotate(
        &self,
        archive: &Utf8Path,
        train_dir: &Utf8Path,
        annotate_dir: &Utf8Path,
    ) -> CnvSegResult<()> {
        let args = vec![
            archive.to_string(),
            train_dir.to_string(),
            annotate_dir.to_string(),
        ];
        self.run_stage(ANNOTATE_STAGE, &args)
    }
}

pub struct SegmentationPaths {
    pub archive: Utf8PathBuf,
    pub train_dir: Utf8PathBuf,
    pub annotate_dir: Utf8PathBuf,
}

pub fn get_input_master_filename(train_dir: &Utf8Path) -> Utf8PathBuf {
    train_dir.join("params").join(INPUT_MASTER_FILENAME)
}

/// Check that the written parameter file reads back as the in-memory specification
fn verify_input_master(filename: &Utf8Path, spec: &ModelSpec) -> CnvSegResult<()> {
    let verification_error = |detail: String| CnvSegError::OutputVerification {
        path: filename.to_path_buf(),
        detail,
    };

    let text = std::fs::read_to_string(filename).map_err(|e| CnvSegError::io(filename, e))?;
    let outline = parse_outline(&text).map_err(|e| verification_error(e.to_string()))?;
    let expected_outline = get_spec_outline(spec);
    if outline.len() != expected_outline.len() {
        return Err(verification_error(format!(
            "expected {} sections but read {}",
            expected_outline.len(),
            outline.len()
        )));
    }
    for (section, expected_section) in outline.iter().zip(expected_outline.iter()) {
        if section != expected_section {
            return Err(verification_error(format!(
                "{} section differs from the model specification",
                expected_section.kind
            )));
        }
    }
    Ok(())
}

/// Write the parameter file where the annotation stage expects it, and verify the result
///
/// Returns the parameter filename.
///
pub fn write_input_master(train_dir: &Utf8Path, spec: &ModelSpec) -> CnvSegResult<Utf8PathBuf> {
    let filename = get_input_master_filename(train_dir);
    if let Some(params_dir) = filename.parent() {
        create_dir_all(params_dir, "parameter")?;
    }

    info!("Writing parameter file: '{filename}'");
    write_text_file(&filename, &render_input_master(spec, train_dir))?;
    verify_input_master(&filename, spec)?;
    Ok(filename)
}

/// Run the full copy number segmentation sequence
///
/// 1. Initialize the training directory with the external pipeline
/// 2. Derive state Gaussian parameters from the archive statistics
/// 3. Build, validate and write the parameter file
/// 4. Annotate the archive with the external pipeline
///
/// No parameter file is written if the statistics or the specification are invalid.
///
pub fn run_cnv_segmentation(
    settings: &StaticSegmentationSettings,
    pipeline: &impl SegmentationPipeline,
    source: &impl TrackStatisticsSource,
    paths: &SegmentationPaths,
) -> CnvSegResult<RunStats> {
    let start = Instant::now();
    info!("Initializing training directory: '{}'", paths.train_dir);
    pipeline.train_init(
        &paths.archive,
        &paths.train_dir,
        settings.label_count(),
        settings.resolution,
    )?;
    let train_init_time_secs = start.elapsed().as_secs_f64();

    let start = Instant::now();
    let stats = source.read_track_statistics()?;
    let (moments, params) = derive_state_gaussian_params(&stats, settings.state_sd_separation)?;
    let spec = build_cnv_model_spec(settings, &params)?;
    let parameter_filename = write_input_master(&paths.train_dir, &spec)?;
    let model_setup_time_secs = start.elapsed().as_secs_f64();

    let start = Instant::now();
    info!("Annotating to directory: '{}'", paths.annotate_dir);
    pipeline.annotate(&paths.archive, &paths.train_dir, &paths.annotate_dir)?;
    let annotate_time_secs = start.elapsed().as_secs_f64();

    let mut run_stats = RunStats::new(&stats.track_names, &moments, &params, &parameter_filename);
    run_stats.stage_timings.train_init_time_secs = train_init_time_secs;
    run_stats.stage_timings.model_setup_time_secs = model_setup_time_secs;
    run_stats.stage_timings.annotate_time_secs = annotate_time_secs;
    write_run_stats(&paths.annotate_dir, &run_stats)?;

    Ok(run_stats)
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::run_stats::RUN_STATS_FILENAME;
    use crate::track_stats::{GenomedataArchive, TrackStatistics};

    #[derive(Default)]
    struct RecordingPipeline {
        calls: RefCell<Vec<String>>,
        fail_stage: Option<&'static str>,
    }

    impl RecordingPipeline {
        fn failing(stage: &'static str) -> Self {
            Self {
                fail_stage: Some(stage),
                ..Default::default()
            }
        }

        fn record(&self, stage: &str, call: String) -> CnvSegResult<()> {
            self.calls.borrow_mut().push(call);
            if self.fail_stage == Some(stage) {
                return Err(CnvSegError::ExternalStage {
                    stage: stage.to_string(),
                    status: None,
                    detail: "test failure".to_string(),
                });
            }
            Ok(())
        }
    }

    impl SegmentationPipeline for RecordingPipeline {
        fn train_init(
            &self,
            _archive: &Utf8Path,
            _train_dir: &Utf8Path,
            label_count: usize,
            resolution: u32,
        ) -> CnvSegResult<()> {
            self.record(
                TRAIN_INIT_STAGE,
                format!("{TRAIN_INIT_STAGE} {label_count} {resolution}"),
            )
        }

        fn annotate(
            &self,
            _archive: &Utf8Path,
            train_dir: &Utf8Path,
            _annotate_dir: &Utf8Path,
        ) -> CnvSegResult<()> {
            let has_params = get_input_master_filename(train_dir).is_file();
            self.record(ANNOTATE_STAGE, format!("{ANNOTATE_STAGE} {has_params}"))
        }
    }

    /// Statistics source that counts how often it is read
    struct FixedSource {
        stats: TrackStatistics,
        read_count: Cell<usize>,
    }

    impl FixedSource {
        fn new(sums: f64, sums_squares: f64, num_datapoints: u64) -> Self {
            Self {
                stats: TrackStatistics {
                    track_names: vec!["LogR".to_string()],
                    sums: vec![sums],
                    sums_squares: vec![sums_squares],
                    num_datapoints: vec![num_datapoints],
                },
                read_count: Cell::new(0),
            }
        }
    }

    impl TrackStatisticsSource for FixedSource {
        fn read_track_statistics(&self) -> CnvSegResult<TrackStatistics> {
            self.read_count.set(self.read_count.get() + 1);
            Ok(self.stats.clone())
        }
    }

    fn get_paths(dir: &tempfile::TempDir) -> SegmentationPaths {
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        SegmentationPaths {
            archive: root.join("sample.genomedata"),
            train_dir: root.join("train"),
            annotate_dir: root.join("annotate"),
        }
    }

    #[test]
    fn test_stage_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let paths = get_paths(&dir);
        let settings = StaticSegmentationSettings::new();
        let pipeline = RecordingPipeline::default();
        let source = FixedSource::new(400.0, 4400.0, 40);

        let run_stats = run_cnv_segmentation(&settings, &pipeline, &source, &paths).unwrap();

        assert_eq!(
            *pipeline.calls.borrow(),
            vec!["train-init 3 50".to_string(), "annotate true".to_string()]
        );
        assert_eq!(source.read_count.get(), 1);
        assert_eq!(run_stats.raw_mean, vec![10.0]);
        assert_eq!(run_stats.raw_variance, vec![10.0]);
        assert_eq!(
            run_stats.parameter_filename,
            paths.train_dir.join("params").join("input.master")
        );
        assert!(paths.annotate_dir.join(RUN_STATS_FILENAME).is_file());

        let text = std::fs::read_to_string(&run_stats.parameter_filename).unwrap();
        assert!(text.starts_with(&format!(
            "#include \"{}/auxiliary/segway.inc\"\n",
            paths.train_dir
        )));
    }

    #[test]
    fn test_train_init_failure() {
        let dir = tempfile::tempdir().unwrap();
        let paths = get_paths(&dir);
        let settings = StaticSegmentationSettings::new();
        let pipeline = RecordingPipeline::failing(TRAIN_INIT_STAGE);
        let source = FixedSource::new(400.0, 4400.0, 40);

        let result = run_cnv_segmentation(&settings, &pipeline, &source, &paths);
        assert!(matches!(result, Err(CnvSegError::ExternalStage { .. })));
        assert_eq!(pipeline.calls.borrow().len(), 1);
        assert_eq!(source.read_count.get(), 0);
        assert!(!get_input_master_filename(&paths.train_dir).exists());
    }

    #[test]
    fn test_annotate_failure() {
        let dir = tempfile::tempdir().unwrap();
        let paths = get_paths(&dir);
        let settings = StaticSegmentationSettings::new();
        let pipeline = RecordingPipeline::failing(ANNOTATE_STAGE);
        let source = FixedSource::new(400.0, 4400.0, 40);

        let result = run_cnv_segmentation(&settings, &pipeline, &source, &paths);
        match result {
            Err(CnvSegError::ExternalStage { stage, .. }) => assert_eq!(stage, ANNOTATE_STAGE),
            _ => panic!("expected annotate stage failure"),
        }
        assert!(get_input_master_filename(&paths.train_dir).is_file());
        assert!(!paths.annotate_dir.join(RUN_STATS_FILENAME).exists());
    }

    #[test]
    fn test_negative_variance_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = get_paths(&dir);
        let settings = StaticSegmentationSettings::new();
        let pipeline = RecordingPipeline::default();
        let source = FixedSource::new(10.0, 20.0, 2);

        let result = run_cnv_segmentation(&settings, &pipeline, &source, &paths);
        match result {
            Err(CnvSegError::DataUnavailable { field, .. }) => assert_eq!(field, "sums_squares"),
            _ => panic!("expected unavailable data"),
        }
        assert_eq!(*pipeline.calls.borrow(), vec!["train-init 3 50".to_string()]);
        assert!(!get_input_master_filename(&paths.train_dir).exists());
    }

    #[test]
    fn test_archive_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        let paths = get_paths(&dir);
        std::fs::create_dir(&paths.archive).unwrap();
        std::fs::write(
            paths.archive.join("track_statistics.json"),
            r#"{"tracknames": ["a", "b"], "sums": [20.0, -8.0], "sums_squares": [100.0, 32.0], "num_datapoints": [4, 4]}"#,
        )
        .unwrap();

        let settings = StaticSegmentationSettings::new();
        let pipeline = RecordingPipeline::default();
        let source = GenomedataArchive::new(&paths.archive);
        let run_stats = run_cnv_segmentation(&settings, &pipeline, &source, &paths).unwrap();

        assert_eq!(run_stats.track_names, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(run_stats.transformed_state_means.len(), 3);
        assert_eq!(run_stats.transformed_state_means[0].len(), 2);

        let text = std::fs::read_to_string(&run_stats.parameter_filename).unwrap();
        assert!(text.contains("\n0 covar_LogR 2\n"));
    }

    #[test]
    fn test_verify_detects_modified_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = get_paths(&dir);
        let settings = StaticSegmentationSettings::new();
        let source = FixedSource::new(400.0, 4400.0, 40);
        let stats = source.read_track_statistics().unwrap();
        let (_, params) = derive_state_gaussian_params(&stats, settings.state_sd_separation).unwrap();
        let spec = build_cnv_model_spec(&settings, &params).unwrap();

        let filename = write_input_master(&paths.train_dir, &spec).unwrap();
        verify_input_master(&filename, &spec).unwrap();

        let text = std::fs::read_to_string(&filename)
            .unwrap()
            .replace("0 dpmf_always 1\n1.0\n", "0 dpmf_always 1\n0.5\n");
        std::fs::write(&filename, text).unwrap();
        let result = verify_input_master(&filename, &spec);
        assert!(matches!(result, Err(CnvSegError::OutputVerification { .. })));
    }

    #[test]
    fn test_segway_command_status() {
        let archive = Utf8Path::new("archive");
        let train_dir = Utf8Path::new("train");
        let annotate_dir = Utf8Path::new("annotate");

        let pipeline = SegwayCommand::new(Utf8Path::new("true"));
        pipeline.train_init(archive, train_dir, 3, 50).unwrap();
        pipeline.annotate(archive, train_dir, annotate_dir).unwrap();

        let pipeline = SegwayCommand::new(Utf8Path::new("false"));
        let err = pipeline.annotate(archive, train_dir, annotate_dir).unwrap_err();
        match &err {
            CnvSegError::ExternalStage { stage, status, .. } => {
                assert_eq!(stage, ANNOTATE_STAGE);
                assert!(status.is_some());
            }
            _ => panic!("expected external stage failure"),
        }
        assert_eq!(err.exit_code(), 1);

        let pipeline = SegwayCommand::new(Utf8Path::new("/nonexistent/cnvseg-test-segway"));
        let err = pipeline.train_init(archive, train_dir, 3, 50).unwrap_err();
        assert_eq!(err.exit_code(), exitcode::SOFTWARE);
    }
}
