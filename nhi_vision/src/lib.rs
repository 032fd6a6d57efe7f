// THEORY:
// This file is the main entry point for the `nhi_vision` library crate, a
// thermal-anomaly detector for volcanic scenes built on the Normalized Hotspot
// Indices (NHI).
//
// The public face of the engine is `ScenePipeline` (one scene at a time) and
// `ParallelPipeline` (a whole series over a worker pool), together with their
// configuration and output records. The stage modules under `core_modules` are
// public so each stage can be tested and reused on its own, but callers normally
// only need what `pipeline` re-exports.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use error::{NhiError, Result};
