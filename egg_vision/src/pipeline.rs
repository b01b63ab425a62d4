// THEORY:
// The `pipeline` module is the top-level API of the egg vision engine. It wraps
// the four stages behind one easy-to-use entry point: hand it an `Image`,
// receive a `DetectionOutcome`.
//
// Key architectural principles:
// 1.  **Explicit configuration**: An `EggDetector` owns an immutable, validated
//     `DetectorConfig`. There is no process-wide detector; callers construct
//     one and share it freely (it is `Send + Sync`).
// 2.  **Capability interface**: Anything that can turn an image into a report
//     implements `Detector`. The contour pipeline here is one implementation;
//     a learned detector can sit behind the same trait.
// 3.  **Fail-soft boundary**: Stages propagate `VisionError` with `?` through
//     `try_detect`. `Detector::detect` is the single place where an error is
//     converted into `DetectionOutcome::Failed`, which always carries the empty
//     report, so a caller never sees a half-built result.

use crate::config::DetectorConfig;
use crate::core_modules::{contour, grader, preprocessor, segmenter};
use crate::error::VisionResult;
use serde::Serialize;

// Re-export key data structures for the public API.
pub use crate::core_modules::contour::BoundingBox;
pub use crate::core_modules::grader::{Detection, DetectionReport, Grade, GradeCounts};
pub use crate::core_modules::image::{ChannelOrder, Image};

/// The result of one detection call.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
    Completed(DetectionReport),
    Failed { report: DetectionReport, error: String },
}

/// Wire form: the report's fields, plus `error` for a failed run.
#[derive(Serialize)]
struct FlatOutcome<'a> {
    #[serde(flatten)]
    report: &'a DetectionReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl Serialize for DetectionOutcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        FlatOutcome {
            report: self.report(),
            error: self.error(),
        }
        .serialize(serializer)
    }
}

impl DetectionOutcome {
    pub fn failed(error: impl ToString) -> Self {
        DetectionOutcome::Failed {
            report: DetectionReport::empty(),
            error: error.to_string(),
        }
    }

    /// The report, empty for a failed run.
    pub fn report(&self) -> &DetectionReport {
        match self {
            DetectionOutcome::Completed(report) => report,
            DetectionOutcome::Failed { report, .. } => report,
        }
    }

    pub fn into_report(self) -> DetectionReport {
        match self {
            DetectionOutcome::Completed(report) => report,
            DetectionOutcome::Failed { report, .. } => report,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            DetectionOutcome::Completed(_) => None,
            DetectionOutcome::Failed { error, .. } => Some(error),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, DetectionOutcome::Completed(_))
    }
}

/// Human-readable description of a detector implementation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorInfo {
    pub name: String,
    pub method: String,
    pub features: Vec<String>,
    /// `(label, description)` for every grade, largest first.
    pub grades: Vec<(String, String)>,
}

/// Given an image, produce a detection outcome.
pub trait Detector: Send + Sync {
    fn info(&self) -> DetectorInfo;

    fn detect(&self, image: &Image) -> DetectionOutcome;
}

/// The contour-based egg detector.
#[derive(Debug, Clone, Default)]
pub struct EggDetector {
    config: DetectorConfig,
}

impl EggDetector {
    pub fn new(config: DetectorConfig) -> VisionResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Runs every stage, propagating the first error.
    pub fn try_detect(&self, image: &Image) -> VisionResult<DetectionReport> {
        // Stage 1: Grayscale and denoise
        let preprocessed = preprocessor::preprocess(image, &self.config.preprocess)?;

        // Stage 2: Adaptive threshold and morphology
        let mask = segmenter::segment(&preprocessed.denoised, &self.config.segmentation)?;

        // Stage 3: Outer contours and shape filtering
        let contours = contour::extract_candidates(&mask, &self.config.shape_filter);

        // Stage 4: Grading and aggregation
        Ok(grader::grade(&contours, &self.config.grading))
    }
}

impl Detector for EggDetector {
    fn info(&self) -> DetectorInfo {
        DetectorInfo {
            name: "contour-egg-detector".to_string(),
            method: "adaptive threshold, morphology and contour shape analysis".to_string(),
            features: vec![
                "Shape Filtering".to_string(),
                "Size Classification".to_string(),
                "Confidence Scoring".to_string(),
            ],
            grades: Grade::ALL
                .iter()
                .map(|grade| (grade.label().to_string(), grade.description().to_string()))
                .collect(),
        }
    }

    fn detect(&self, image: &Image) -> DetectionOutcome {
        match self.try_detect(image) {
            Ok(report) => DetectionOutcome::Completed(report),
            Err(err) => {
                tracing::warn!(error = %err, "egg detection failed, returning empty report");
                DetectionOutcome::failed(err)
            }
        }
    }
}

/// Decodes `bytes` and runs `detector` on the result.
///
/// Decode errors are returned to the caller rather than folded into the
/// outcome: an undecodable upload is the caller's problem, not the pipeline's.
pub fn detect_bytes(detector: &dyn Detector, bytes: &[u8]) -> VisionResult<DetectionOutcome> {
    let image = Image::decode(bytes)?;
    Ok(detector.detect(&image))
}
