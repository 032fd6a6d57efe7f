// THEORY:
// Every failure the engine can surface lives in this one enum. Scene-local
// failures (`ShapeMismatch`, `SceneTimedOut`, `WorkerUnavailable`) are turned
// into skipped scenes by the parallel pipeline; only `DuplicateTimestamp` is
// allowed to fail a whole time series. Recoverable conditions such as a thin
// background sample are not errors at all: they are carried as data on the
// threshold field and the scene record.

use crate::core_modules::scene_summarizer::SceneRecord;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NhiError {
    #[error(
        "band `{band}` is {actual_width}x{actual_height}, \
         expected {expected_width}x{expected_height}"
    )]
    ShapeMismatch {
        band: &'static str,
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    #[error("two scenes share the acquisition timestamp {}", .first.timestamp)]
    DuplicateTimestamp {
        first: Box<SceneRecord>,
        second: Box<SceneRecord>,
    },

    #[error("invalid configuration: {name} = {value} ({reason})")]
    InvalidConfig {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("grid data has {actual} cells, expected {expected}")]
    GridSize { expected: usize, actual: usize },

    #[error("scene {timestamp} exceeded the {limit_ms} ms processing budget")]
    SceneTimedOut {
        timestamp: DateTime<Utc>,
        limit_ms: u64,
    },

    #[error("worker pool unavailable: {0}")]
    WorkerUnavailable(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, NhiError>;
