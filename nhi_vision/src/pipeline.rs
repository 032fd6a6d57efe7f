// THEORY:
// The `pipeline` module is the top-level API for single-scene analysis. It wires
// the per-scene stages into one call: one frame in, one `SceneAnalysis` out.
//
// Scenes are independent of each other. Nothing here remembers a previous
// frame, which is what lets `ParallelPipeline` fan scenes out to workers and
// still produce the same series as this sequential path. The two paths share
// `collect_outcomes`, the barrier that turns per-scene results into a
// `SeriesReport`.

use crate::core_modules::contextual_thresholder::compute_thresholds;
use crate::core_modules::geo_transform::GeoTransform;
use crate::core_modules::index_computer::compute_indices;
use crate::core_modules::pixel_classifier::{classify, promote_saturated};
use crate::core_modules::region_extractor::region_extractor;
use crate::core_modules::scene_summarizer::summarize;
use crate::core_modules::time_series::aggregate;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

// Re-export key data structures for the public API.
pub use crate::config::PipelineConfig;
pub use crate::core_modules::pixel_classifier::{Severity, SeverityRaster};
pub use crate::core_modules::radiance_frame::RadianceFrame;
pub use crate::core_modules::region::{Region, RegionSet};
pub use crate::core_modules::scene_summarizer::SceneRecord;
pub use crate::core_modules::time_series::TimeSeries;

/// Everything the engine derives from one scene.
#[derive(Debug, Clone)]
pub struct SceneAnalysis {
    pub record: SceneRecord,
    pub regions: RegionSet,
    pub severity: SeverityRaster,
    /// Georeference of the source frame, for placing masks and outlines.
    pub transform: GeoTransform,
}

/// A scene that produced no record, and why.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedScene {
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Regions of a scene with at least one HOT or EXTREME cell, with the grid size
/// and georeference needed to render them as aligned masks.
#[derive(Debug, Clone, Serialize)]
pub struct FlaggedScene {
    pub timestamp: DateTime<Utc>,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub regions: RegionSet,
}

/// The outcome of a whole run.
#[derive(Debug, Clone, Default)]
pub struct SeriesReport {
    pub series: TimeSeries,
    /// Flagged scenes in acquisition order.
    pub flagged: Vec<FlaggedScene>,
    pub skipped: Vec<SkippedScene>,
}

/// Sequential single-scene engine.
#[derive(Debug, Clone, Default)]
pub struct ScenePipeline {
    config: PipelineConfig,
}

impl ScenePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Validates `config` before building the pipeline.
    pub fn try_new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn process_scene(
        &self,
        timestamp: DateTime<Utc>,
        frame: &RadianceFrame,
    ) -> Result<SceneAnalysis> {
        // Stage 1: Spectral Indices
        let (index_a, index_b) = compute_indices(frame, &self.config.index)?;

        // Stage 2: Contextual Thresholds
        let thresholds_a = compute_thresholds(&index_a, &self.config.threshold_a);
        let thresholds_b = compute_thresholds(&index_b, &self.config.threshold_b);

        // Stage 3: Per-Cell Classification
        let mut severity = classify(&index_a, &thresholds_a, &index_b, &thresholds_b)?;
        promote_saturated(
            &mut severity,
            frame,
            &index_a,
            &index_b,
            &self.config.extreme_radiance_test,
        );

        // Stage 4: Spatial Grouping
        let regions = region_extractor::extract_regions(
            &severity,
            self.config.adjacency,
            frame.transform(),
            frame.pixel_area_m2(),
        );

        // Stage 5: Scene Summary
        let record = summarize(frame, &severity, &regions, timestamp).annotate(
            frame,
            &index_a,
            &index_b,
            &thresholds_a,
            &thresholds_b,
        );

        log::debug!(
            "scene {}: {} hot, {} extreme, {} regions",
            timestamp,
            record.combined_hot_pixels,
            record.extreme_pixels,
            regions.len()
        );
        Ok(SceneAnalysis {
            record,
            regions,
            severity,
            transform: *frame.transform(),
        })
    }

    /// Analyses every scene in turn. Scene failures are reported as skipped;
    /// only a shared timestamp fails the run.
    pub fn process_series(
        &self,
        scenes: impl IntoIterator<Item = (DateTime<Utc>, RadianceFrame)>,
    ) -> Result<SeriesReport> {
        let outcomes: Vec<_> = scenes
            .into_iter()
            .map(|(timestamp, frame)| (timestamp, self.process_scene(timestamp, &frame)))
            .collect();
        collect_outcomes(outcomes)
    }
}

/// The barrier shared by both pipelines: splits per-scene outcomes into records
/// and skips, then orders the records into a series.
pub fn collect_outcomes(
    outcomes: Vec<(DateTime<Utc>, Result<SceneAnalysis>)>,
) -> Result<SeriesReport> {
    let total = outcomes.len();
    let mut records = Vec::with_capacity(total);
    let mut flagged = Vec::new();
    let mut skipped = Vec::new();

    for (timestamp, outcome) in outcomes {
        match outcome {
            Ok(analysis) => {
                if analysis.record.is_flagged() {
                    flagged.push(FlaggedScene {
                        timestamp,
                        width: analysis.severity.width(),
                        height: analysis.severity.height(),
                        transform: analysis.transform,
                        regions: analysis.regions,
                    });
                }
                records.push(analysis.record);
            }
            Err(err) => {
                log::warn!("skipping scene {timestamp}: {err}");
                skipped.push(SkippedScene {
                    timestamp,
                    reason: err.to_string(),
                });
            }
        }
    }

    let series = aggregate(records)?;
    flagged.sort_by_key(|f| f.timestamp);
    skipped.sort_by_key(|s| s.timestamp);
    log::info!(
        "processed {} scenes: {} recorded, {} flagged, {} skipped",
        total,
        series.len(),
        flagged.len(),
        skipped.len()
    );
    Ok(SeriesReport {
        series,
        flagged,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::grid::Grid;
    use crate::error::NhiError;
    use chrono::TimeZone;

    fn quiet_frame(width: usize, height: usize) -> RadianceFrame {
        // Slight texture keeps the background deviation above the floor.
        let a = Grid::from_fn(width, height, |c| 10.0 + ((c.x * 7 + c.y * 3) % 5) as f64 * 0.1);
        let b = Grid::filled(width, height, 20.0);
        RadianceFrame::new(a, b)
    }

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_quiet_scene_is_not_flagged() {
        let pipeline = ScenePipeline::default();
        let analysis = pipeline.process_scene(ts(1), &quiet_frame(12, 12)).unwrap();
        assert!(!analysis.record.is_flagged());
        assert!(analysis.regions.is_empty());
        assert_eq!(analysis.record.valid_cells, 144);
    }

    #[test]
    fn test_shape_mismatch_is_skipped_not_fatal() {
        let broken = RadianceFrame::new(Grid::filled(4, 4, 1.0), Grid::filled(3, 4, 1.0));
        let report = ScenePipeline::default()
            .process_series(vec![(ts(2), quiet_frame(8, 8)), (ts(1), broken)])
            .unwrap();
        assert_eq!(report.series.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].timestamp, ts(1));
    }

    #[test]
    fn test_duplicate_timestamps_fail_the_run() {
        let result = ScenePipeline::default()
            .process_series(vec![(ts(3), quiet_frame(5, 5)), (ts(3), quiet_frame(5, 5))]);
        assert!(matches!(result, Err(NhiError::DuplicateTimestamp { .. })));
    }

    #[test]
    fn test_flagged_scene_keeps_georeference() {
        let transform = GeoTransform::new(500_000.0, 4_200_000.0, 30.0, -30.0);
        let mut values = quiet_frame(12, 12).channel_a().as_slice().to_vec();
        values[12 * 6 + 6] = 200.0;
        let a = Grid::from_vec(12, 12, values).unwrap();
        let frame = RadianceFrame::new(a, Grid::filled(12, 12, 20.0)).with_transform(transform);

        let report = ScenePipeline::default().process_series(vec![(ts(4), frame)]).unwrap();
        assert_eq!(report.flagged.len(), 1);
        assert_eq!(report.flagged[0].transform, transform);
        assert_eq!((report.flagged[0].width, report.flagged[0].height), (12, 12));
    }

    #[test]
    fn test_try_new_rejects_invalid_config() {
        let mut config = PipelineConfig::default();
        config.threshold_b.k_hot = -1.0;
        assert!(ScenePipeline::try_new(config).is_err());
    }
}
