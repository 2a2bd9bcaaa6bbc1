//! Detection module: warm-up aggregation and narration
//!
//! The aggregator samples the live frame source a few times and keeps the
//! richest confident result; the narrator turns that result into a sentence.

mod aggregator;
mod labels;
mod narrator;

pub use aggregator::{
    Detection, DetectionAggregator, DetectionError, DetectionModel, FrameSource, ModelLoadError,
    ModelLoader, CONFIDENCE_THRESHOLD, PASS_INTERVAL, WARM_UP_PASSES,
};
pub use labels::LabelModelLoader;
pub use narrator::{describe, MAX_NARRATED, NOTHING_IDENTIFIED};
