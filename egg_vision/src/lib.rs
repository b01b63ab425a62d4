// THEORY:
// This file is the main entry point for the `egg_vision` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the public
// API that will be exposed to external consumers (like the `egg_tester` binary
// or a web service that accepts tray photos).
//
// The primary goal is to export the `EggDetector`, the `Detector` capability
// and their associated data structures (`DetectorConfig`, `DetectionReport`,
// `DetectionOutcome`, etc.) as the clean, high-level interface for the engine.
// The stage implementations live in `core_modules` and can be used on their own,
// but most callers only need `pipeline`.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::DetectorConfig;
pub use error::{VisionError, VisionResult};
pub use parallel_pipeline::{BatchItem, BatchPipeline, BatchSummary};
pub use pipeline::{
    BoundingBox, ChannelOrder, Detection, DetectionOutcome, DetectionReport, Detector,
    DetectorInfo, EggDetector, Grade, GradeCounts, Image, detect_bytes,
};
