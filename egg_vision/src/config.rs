// THEORY:
// All of the detector's thresholds were tuned by eye against real trays of eggs
// and will drift with camera distance and lighting. They therefore live in one
// explicit, caller-owned `DetectorConfig` rather than in stage code. Each section
// maps to one pipeline stage and every field has a default, so a JSON file only
// needs to name the values a deployment recalibrates.

use crate::error::{VisionError, VisionResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level tunables for the contour-based egg detector.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub preprocess: PreprocessConfig,
    pub segmentation: SegmentationConfig,
    pub shape_filter: ShapeFilterConfig,
    pub grading: GradingConfig,
}

/// Grayscale conversion and denoising.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Side length of the square Gaussian kernel. Must be odd.
    pub blur_kernel_size: u32,
    /// Standard deviation of the blur. `0.0` derives it from the kernel size.
    pub blur_sigma: f64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            blur_kernel_size: 7,
            blur_sigma: 0.0,
        }
    }
}

/// Adaptive thresholding and morphological cleanup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Side length of the Gaussian-weighted neighbourhood used for the local mean.
    pub block_size: u32,
    /// Constant subtracted from the local mean before comparing.
    pub bias: f64,
    /// Side length of the elliptical structuring element for open/close.
    pub morph_kernel_size: u32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            block_size: 11,
            bias: 2.0,
            morph_kernel_size: 5,
        }
    }
}

/// Rejection rules applied to every external contour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeFilterConfig {
    pub min_area: f64,
    pub max_area: f64,
    pub min_aspect: f64,
    pub max_aspect: f64,
    pub min_circularity: f64,
}

impl Default for ShapeFilterConfig {
    fn default() -> Self {
        Self {
            min_area: 2000.0,
            max_area: 50000.0,
            min_aspect: 0.5,
            max_aspect: 2.0,
            min_circularity: 0.3,
        }
    }
}

/// Grade thresholds and confidence scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingConfig {
    /// Minimum area for grade0..grade4, largest first. Anything smaller is grade5.
    pub grade_thresholds: [f64; 5],
    pub confidence: ConfidenceConfig,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            grade_thresholds: [25000.0, 20000.0, 16000.0, 12000.0, 8000.0],
            confidence: ConfidenceConfig::default(),
        }
    }
}

/// Additive confidence score built from shape properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub base: f64,
    /// Inclusive area range that earns `area_bonus`.
    pub area_range: (f64, f64),
    pub area_bonus: f64,
    /// Inclusive aspect-ratio range that earns `aspect_bonus`.
    pub aspect_range: (f64, f64),
    pub aspect_bonus: f64,
    /// Circularity strictly above this earns `circularity_bonus`.
    pub circularity_threshold: f64,
    pub circularity_bonus: f64,
    pub max: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            base: 0.5,
            area_range: (5000.0, 30000.0),
            area_bonus: 0.2,
            aspect_range: (0.7, 1.5),
            aspect_bonus: 0.2,
            circularity_threshold: 0.4,
            circularity_bonus: 0.1,
            max: 0.95,
        }
    }
}

impl DetectorConfig {
    /// Reads a JSON configuration file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> VisionResult<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| VisionError::ConfigLoad {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&data)?;
        Ok(config)
    }

    pub fn from_json_str(data: &str) -> VisionResult<Self> {
        let config: Self = serde_json::from_str(data).map_err(VisionError::ConfigParse)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the relationships between fields that serde alone cannot express.
    pub fn validate(&self) -> VisionResult<()> {
        self.check_finite()?;
        check_odd_kernel("preprocess.blur_kernel_size", self.preprocess.blur_kernel_size)?;
        check_odd_kernel("segmentation.block_size", self.segmentation.block_size)?;
        check_odd_kernel(
            "segmentation.morph_kernel_size",
            self.segmentation.morph_kernel_size,
        )?;
        if self.segmentation.morph_kernel_size > MAX_MORPH_KERNEL_SIZE {
            return Err(VisionError::InvalidConfig(format!(
                "segmentation.morph_kernel_size must be at most {MAX_MORPH_KERNEL_SIZE}, got {}",
                self.segmentation.morph_kernel_size
            )));
        }
        if self.preprocess.blur_sigma < 0.0 {
            return Err(VisionError::InvalidConfig(
                "preprocess.blur_sigma must not be negative".into(),
            ));
        }

        let filter = &self.shape_filter;
        if filter.min_area < 0.0 || filter.min_area > filter.max_area {
            return Err(VisionError::InvalidConfig(format!(
                "shape_filter area range [{}, {}] is empty",
                filter.min_area, filter.max_area
            )));
        }
        if filter.min_aspect <= 0.0 || filter.min_aspect > filter.max_aspect {
            return Err(VisionError::InvalidConfig(format!(
                "shape_filter aspect range [{}, {}] is empty",
                filter.min_aspect, filter.max_aspect
            )));
        }

        let thresholds = &self.grading.grade_thresholds;
        if thresholds.windows(2).any(|pair| pair[0] < pair[1]) {
            return Err(VisionError::InvalidConfig(format!(
                "grading.grade_thresholds must be ordered largest first, got {thresholds:?}"
            )));
        }

        let confidence = &self.grading.confidence;
        if confidence.base < MIN_CONFIDENCE
            || confidence.max < confidence.base
            || confidence.max > MAX_CONFIDENCE
        {
            return Err(VisionError::InvalidConfig(format!(
                "grading.confidence base {} and max {} must satisfy {MIN_CONFIDENCE} <= base <= max <= {MAX_CONFIDENCE}",
                confidence.base, confidence.max
            )));
        }
        let bonuses = [
            confidence.area_bonus,
            confidence.aspect_bonus,
            confidence.circularity_bonus,
        ];
        if bonuses.iter().any(|&bonus| bonus < 0.0) {
            return Err(VisionError::InvalidConfig(format!(
                "grading.confidence bonuses must not be negative, got {bonuses:?}"
            )));
        }
        Ok(())
    }

    /// Every float field must be finite; NaN passes every ordered check below.
    fn check_finite(&self) -> VisionResult<()> {
        let confidence = &self.grading.confidence;
        let filter = &self.shape_filter;
        let named = [
            ("preprocess.blur_sigma", self.preprocess.blur_sigma),
            ("segmentation.bias", self.segmentation.bias),
            ("shape_filter.min_area", filter.min_area),
            ("shape_filter.max_area", filter.max_area),
            ("shape_filter.min_aspect", filter.min_aspect),
            ("shape_filter.max_aspect", filter.max_aspect),
            ("shape_filter.min_circularity", filter.min_circularity),
            ("grading.confidence.base", confidence.base),
            ("grading.confidence.area_range.0", confidence.area_range.0),
            ("grading.confidence.area_range.1", confidence.area_range.1),
            ("grading.confidence.area_bonus", confidence.area_bonus),
            ("grading.confidence.aspect_range.0", confidence.aspect_range.0),
            ("grading.confidence.aspect_range.1", confidence.aspect_range.1),
            ("grading.confidence.aspect_bonus", confidence.aspect_bonus),
            ("grading.confidence.circularity_threshold", confidence.circularity_threshold),
            ("grading.confidence.circularity_bonus", confidence.circularity_bonus),
            ("grading.confidence.max", confidence.max),
        ];
        let thresholds = self
            .grading
            .grade_thresholds
            .iter()
            .map(|&value| ("grading.grade_thresholds", value));

        match named.into_iter().chain(thresholds).find(|(_, value)| !value.is_finite()) {
            Some((name, value)) => Err(VisionError::InvalidConfig(format!(
                "{name} must be a finite number, got {value}"
            ))),
            None => Ok(()),
        }
    }
}

/// Largest structuring element `imageproc` masks can describe.
const MAX_MORPH_KERNEL_SIZE: u32 = 255;
/// Confidence is always reported within these bounds.
const MIN_CONFIDENCE: f64 = 0.5;
const MAX_CONFIDENCE: f64 = 0.95;

fn check_odd_kernel(name: &str, size: u32) -> VisionResult<()> {
    if size < 3 || size % 2 == 0 {
        return Err(VisionError::InvalidConfig(format!(
            "{name} must be an odd number >= 3, got {size}"
        )));
    }
    Ok(())
}
