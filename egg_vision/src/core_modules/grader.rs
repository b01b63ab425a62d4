// THEORY:
// The grader is the last analytical stage. It takes the candidates that
// survived the shape filter and turns each into a `Detection`:
//
// 1.  **Grading**: The traced area is compared against the TIS 227-2524 size
//     table, largest grade first, and the first threshold met wins. Anything
//     below the grade4 floor is grade5, so every area maps to exactly one grade.
// 2.  **Scoring**: Confidence is additive. A base score earns bonuses for a
//     typical egg area, an egg-like aspect ratio and a round outline, and is
//     capped below certainty because a geometric heuristic is never sure.
// 3.  **Aggregation**: Detections are numbered from 1 in discovery order and
//     counted per grade. The success rate divides by every contour the previous
//     stage examined, so it measures how cleanly the scene segmented.

use crate::config::{ConfidenceConfig, GradingConfig};
use crate::core_modules::contour::{BoundingBox, ContourSet, ShapeMetrics};
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use std::fmt;

/// The six size classes, `Grade0` being the largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Grade {
    #[serde(rename = "grade0")]
    Grade0,
    #[serde(rename = "grade1")]
    Grade1,
    #[serde(rename = "grade2")]
    Grade2,
    #[serde(rename = "grade3")]
    Grade3,
    #[serde(rename = "grade4")]
    Grade4,
    #[serde(rename = "grade5")]
    Grade5,
}

impl Grade {
    pub const ALL: [Grade; 6] = [
        Grade::Grade0,
        Grade::Grade1,
        Grade::Grade2,
        Grade::Grade3,
        Grade::Grade4,
        Grade::Grade5,
    ];

    /// First grade whose threshold `area` meets, checked largest to smallest.
    pub fn classify(area: f64, thresholds: &[f64; 5]) -> Grade {
        thresholds
            .iter()
            .position(|&minimum| area >= minimum)
            .map(|index| Grade::ALL[index])
            .unwrap_or(Grade::Grade5)
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Grade::Grade0 => "grade0",
            Grade::Grade1 => "grade1",
            Grade::Grade2 => "grade2",
            Grade::Grade3 => "grade3",
            Grade::Grade4 => "grade4",
            Grade::Grade5 => "grade5",
        }
    }

    /// Key used in the serialized per-grade counts.
    pub fn count_key(self) -> &'static str {
        match self {
            Grade::Grade0 => "grade0_count",
            Grade::Grade1 => "grade1_count",
            Grade::Grade2 => "grade2_count",
            Grade::Grade3 => "grade3_count",
            Grade::Grade4 => "grade4_count",
            Grade::Grade5 => "grade5_count",
        }
    }

    /// Weight class of the TIS 227-2524 size number this grade stands for.
    pub fn description(self) -> &'static str {
        match self {
            Grade::Grade0 => "size 0, extra large: over 70 g",
            Grade::Grade1 => "size 1, large: 60-70 g",
            Grade::Grade2 => "size 2, medium: 50-60 g",
            Grade::Grade3 => "size 3, small: 40-50 g",
            Grade::Grade4 => "size 4, very small: 30-40 g",
            Grade::Grade5 => "size 5, extra small: under 30 g",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One graded egg.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    /// 1-based, in discovery order.
    pub id: u32,
    pub grade: Grade,
    /// In `[0.50, 0.95]`, two decimals.
    pub confidence: f64,
    /// Traced area in whole pixels.
    pub area: u32,
    #[serde(serialize_with = "serialize_bbox")]
    pub bbox: BoundingBox,
}

fn serialize_bbox<S: Serializer>(bbox: &BoundingBox, serializer: S) -> Result<S::Ok, S::Error> {
    [bbox.x, bbox.y, bbox.width, bbox.height].serialize(serializer)
}

/// Number of detections per grade; every grade is always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GradeCounts {
    counts: [usize; 6],
}

impl GradeCounts {
    pub fn record(&mut self, grade: Grade) {
        self.counts[grade.index()] += 1;
    }

    pub fn get(&self, grade: Grade) -> usize {
        self.counts[grade.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn merge(&mut self, other: &GradeCounts) {
        for (mine, theirs) in self.counts.iter_mut().zip(other.counts.iter()) {
            *mine += theirs;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Grade, usize)> + '_ {
        Grade::ALL.iter().map(move |&grade| (grade, self.get(grade)))
    }
}

impl Serialize for GradeCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("GradeCounts", Grade::ALL.len())?;
        for (grade, count) in self.iter() {
            state.serialize_field(grade.count_key(), &count)?;
        }
        state.end()
    }
}

/// The aggregate result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    pub detections: Vec<Detection>,
    pub grade_counts: GradeCounts,
    pub total_eggs: usize,
    /// `total_eggs / max(processed_contours, 1) * 100`, one decimal.
    pub success_percent: f64,
    /// External contours examined before filtering.
    pub processed_contours: usize,
}

impl DetectionReport {
    /// The well-formed report returned when nothing could be detected.
    pub fn empty() -> Self {
        Self {
            detections: Vec::new(),
            grade_counts: GradeCounts::default(),
            total_eggs: 0,
            success_percent: 0.0,
            processed_contours: 0,
        }
    }
}

/// Additive shape-based confidence, capped and rounded to two decimals.
pub fn confidence(metrics: &ShapeMetrics, config: &ConfidenceConfig) -> f64 {
    let mut score = config.base;
    let (min_area, max_area) = config.area_range;
    if (min_area..=max_area).contains(&metrics.area) {
        score += config.area_bonus;
    }
    let (min_aspect, max_aspect) = config.aspect_range;
    if (min_aspect..=max_aspect).contains(&metrics.aspect_ratio) {
        score += config.aspect_bonus;
    }
    let circularity = if metrics.perimeter > 0.0 {
        metrics.circularity
    } else {
        0.0
    };
    if circularity > config.circularity_threshold {
        score += config.circularity_bonus;
    }
    round_to(score.min(config.max), 2)
}

/// Grades every accepted candidate and assembles the report.
pub fn grade(contours: &ContourSet, config: &GradingConfig) -> DetectionReport {
    let mut grade_counts = GradeCounts::default();
    let detections: Vec<Detection> = contours
        .accepted
        .iter()
        .enumerate()
        .map(|(index, candidate)| {
            let metrics = &candidate.metrics;
            let grade = Grade::classify(metrics.area, &config.grade_thresholds);
            grade_counts.record(grade);
            Detection {
                id: index as u32 + 1,
                grade,
                confidence: confidence(metrics, &config.confidence),
                area: metrics.area as u32,
                bbox: metrics.bounding_box,
            }
        })
        .collect();

    let total_eggs = detections.len();
    let success_percent = success_percent(total_eggs, contours.examined);
    tracing::debug!(total_eggs, success_percent, "graded detections");

    DetectionReport {
        detections,
        grade_counts,
        total_eggs,
        success_percent,
        processed_contours: contours.examined,
    }
}

pub fn success_percent(accepted: usize, examined: usize) -> f64 {
    round_to(accepted as f64 / examined.max(1) as f64 * 100.0, 1)
}

/// Rounds to `decimals` places, exact ties going to the even neighbour.
fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round_ties_even() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::contour::Candidate;

    const THRESHOLDS: [f64; 5] = [25000.0, 20000.0, 16000.0, 12000.0, 8000.0];

    fn metrics(area: f64, width: u32, height: u32, perimeter: f64, circularity: f64) -> ShapeMetrics {
        let bounding_box = BoundingBox { x: 5, y: 6, width, height };
        ShapeMetrics {
            area,
            bounding_box,
            aspect_ratio: bounding_box.aspect_ratio(),
            perimeter,
            circularity,
        }
    }

    #[test]
    fn grade_table_boundaries() {
        assert_eq!(Grade::classify(50000.0, &THRESHOLDS), Grade::Grade0);
        assert_eq!(Grade::classify(25000.0, &THRESHOLDS), Grade::Grade0);
        assert_eq!(Grade::classify(24999.9, &THRESHOLDS), Grade::Grade1);
        assert_eq!(Grade::classify(20000.0, &THRESHOLDS), Grade::Grade1);
        assert_eq!(Grade::classify(16000.0, &THRESHOLDS), Grade::Grade2);
        assert_eq!(Grade::classify(12000.0, &THRESHOLDS), Grade::Grade3);
        assert_eq!(Grade::classify(8000.0, &THRESHOLDS), Grade::Grade4);
        assert_eq!(Grade::classify(7999.0, &THRESHOLDS), Grade::Grade5);
        assert_eq!(Grade::classify(0.0, &THRESHOLDS), Grade::Grade5);
    }

    #[test]
    fn confidence_bonuses() {
        let config = ConfidenceConfig::default();
        // Every bonus earned: 0.5 + 0.2 + 0.2 + 0.1 = 1.0, capped.
        assert_eq!(confidence(&metrics(20000.0, 160, 160, 500.0, 0.9), &config), 0.95);
        // Area too large for the bonus.
        assert_eq!(confidence(&metrics(40000.0, 220, 220, 700.0, 0.9), &config), 0.8);
        // Elongated and ragged.
        assert_eq!(confidence(&metrics(10000.0, 180, 100, 600.0, 0.35), &config), 0.7);
        // Nothing but the base score.
        assert_eq!(confidence(&metrics(3000.0, 90, 50, 400.0, 0.3), &config), 0.5);
        // Zero perimeter counts as zero circularity.
        assert_eq!(confidence(&metrics(20000.0, 160, 160, 0.0, 0.9), &config), 0.9);
    }

    #[test]
    fn success_percent_rounding_and_zero_guard() {
        assert_eq!(success_percent(0, 0), 0.0);
        assert_eq!(success_percent(1, 3), 33.3);
        assert_eq!(success_percent(2, 3), 66.7);
        assert_eq!(success_percent(5, 5), 100.0);
    }

    #[test]
    fn success_percent_ties_round_to_even() {
        // 6.25 and 31.25 are exact in binary, so these are true ties.
        assert_eq!(success_percent(1, 16), 6.2);
        assert_eq!(success_percent(5, 16), 31.2);
        assert_eq!(success_percent(3, 16), 18.8);
        assert_eq!(round_to(0.125, 2), 0.12);
    }

    #[test]
    fn report_counts_are_consistent() {
        let areas = [26000.0, 21000.0, 9000.0, 21500.0, 3000.0];
        let accepted = areas
            .iter()
            .map(|&area| Candidate {
                points: Vec::new(),
                metrics: metrics(area, 100, 100, 400.0, 0.8),
            })
            .collect();
        let set = ContourSet { accepted, examined: 8 };

        let report = grade(&set, &GradingConfig::default());
        assert_eq!(report.total_eggs, 5);
        assert_eq!(report.grade_counts.total(), 5);
        assert_eq!(report.grade_counts.get(Grade::Grade1), 2);
        assert_eq!(report.grade_counts.get(Grade::Grade2), 0);
        assert_eq!(report.processed_contours, 8);
        assert_eq!(report.success_percent, 62.5);
        let ids: Vec<u32> = report.detections.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(report.detections[2].grade, Grade::Grade4);
        assert_eq!(report.detections[4].grade, Grade::Grade5);
    }

    #[test]
    fn serialized_shape() {
        let mut grade_counts = GradeCounts::default();
        grade_counts.record(Grade::Grade2);
        let report = DetectionReport {
            detections: vec![Detection {
                id: 1,
                grade: Grade::Grade2,
                confidence: 0.9,
                area: 17000,
                bbox: BoundingBox { x: 3, y: 4, width: 150, height: 140 },
            }],
            grade_counts,
            total_eggs: 1,
            success_percent: 50.0,
            processed_contours: 2,
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "detections": [
                    { "id": 1, "grade": "grade2", "confidence": 0.9, "area": 17000, "bbox": [3, 4, 150, 140] }
                ],
                "grade_counts": {
                    "grade0_count": 0, "grade1_count": 0, "grade2_count": 1,
                    "grade3_count": 0, "grade4_count": 0, "grade5_count": 0
                },
                "total_eggs": 1,
                "success_percent": 50.0,
                "processed_contours": 2
            })
        );
    }
}
