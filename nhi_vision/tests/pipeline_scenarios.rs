use chrono::{DateTime, TimeZone, Utc};
use nhi_vision::NhiError;
use nhi_vision::core_modules::contextual_thresholder::{ThresholdField, compute_thresholds};
use nhi_vision::core_modules::geo_transform::GeoTransform;
use nhi_vision::core_modules::grid::{Cell, Grid};
use nhi_vision::core_modules::index_computer::{IndexKind, compute_indices};
use nhi_vision::core_modules::pixel_classifier::{SENTINEL_EXTREME, SENTINEL_HOT, classify};
use nhi_vision::core_modules::region_extractor::{Adjacency, region_extractor};
use nhi_vision::core_modules::time_series::aggregate;
use nhi_vision::parallel_pipeline::ParallelPipeline;
use nhi_vision::pipeline::{
    PipelineConfig, RadianceFrame, ScenePipeline, Severity, SeverityRaster,
};
use std::collections::HashSet;

const PIXEL_AREA: f64 = 900.0;

fn ts(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 5, day, 20, 30, 0).unwrap()
}

fn landsat_transform() -> GeoTransform {
    GeoTransform::new(230_000.0, 2_160_000.0, 30.0, -30.0)
}

/// Uniform background with optional channel A spikes.
fn uniform_frame(size: usize, spikes: &[(Cell, f64)]) -> RadianceFrame {
    let mut a = Grid::filled(size, size, 10.0);
    for &(cell, value) in spikes {
        if let Some(v) = a.get_mut(cell) {
            *v = value;
        }
    }
    RadianceFrame::new(a, Grid::filled(size, size, 20.0)).with_transform(landsat_transform())
}

/// Deterministic texture so local deviations are well above the floor.
fn textured_frame(size: usize, hot: &[Cell]) -> RadianceFrame {
    let a = Grid::from_fn(size, size, |c| {
        let base = 10.0 + ((c.x * 13 + c.y * 7) % 11) as f64 * 0.04;
        if hot.contains(&c) { base + 40.0 } else { base }
    });
    let b = Grid::from_fn(size, size, |c| 20.0 + ((c.x * 3 + c.y * 5) % 7) as f64 * 0.05);
    RadianceFrame::new(a, b).with_transform(landsat_transform())
}

#[test]
fn single_spike_yields_one_extreme_pixel_region() {
    let spike = Cell::new(7, 7);
    let frame = uniform_frame(15, &[(spike, 100.0)]);
    let analysis = ScenePipeline::default().process_scene(ts(1), &frame).unwrap();

    assert_eq!(analysis.severity.count(Severity::Extreme), 1);
    assert_eq!(analysis.severity.count(Severity::Hot), 0);
    assert_eq!(analysis.severity.get(spike), Some(Severity::Extreme));

    assert_eq!(analysis.regions.extreme.len(), 1);
    assert!(analysis.regions.hot.is_empty());
    assert_eq!(analysis.regions.extreme[0].area_m2, PIXEL_AREA);
    assert_eq!(analysis.record.extreme_area_m2, PIXEL_AREA);
    assert_eq!(analysis.record.extreme_pixels, 1);
}

#[test]
fn spike_without_nir_reading_stays_background() {
    let spike = Cell::new(7, 7);
    let nir = Grid::from_fn(15, 15, |c| if c == spike { f64::NAN } else { 60.0 });
    let frame = uniform_frame(15, &[(spike, 100.0)]).with_nir(nir);
    let analysis = ScenePipeline::default().process_scene(ts(2), &frame).unwrap();

    assert_eq!(analysis.severity.get(spike), Some(Severity::Background));
    assert_eq!(analysis.record.extreme_pixels, 0);
    assert_eq!(analysis.record.swir_hot_pixels, 0);
    assert_eq!(analysis.record.combined_hot_pixels, 0);
    assert!(analysis.regions.is_empty());
}

#[test]
fn fully_invalid_frame_yields_empty_record() {
    let frame = uniform_frame(10, &[(Cell::new(2, 2), 100.0)])
        .with_valid_mask(Grid::filled(10, 10, false));
    let analysis = ScenePipeline::default().process_scene(ts(2), &frame).unwrap();
    let record = &analysis.record;

    assert_eq!(record.swir_hot_pixels, 0);
    assert_eq!(record.swnir_hot_pixels, 0);
    assert_eq!(record.combined_hot_pixels, 0);
    assert_eq!(record.extreme_pixels, 0);
    assert_eq!(record.hot_area_m2, 0.0);
    assert_eq!(record.extreme_area_m2, 0.0);
    assert_eq!(record.mean_radiance_a, None);
    assert_eq!(record.mean_radiance_b, None);
    assert!(!record.swir_determinable);
    assert!(analysis.regions.is_empty());
}

#[test]
fn duplicate_timestamps_return_no_partial_series() {
    let pipeline = ScenePipeline::default();
    let first = pipeline.process_scene(ts(3), &uniform_frame(6, &[])).unwrap().record;
    let second = pipeline.process_scene(ts(3), &uniform_frame(6, &[])).unwrap().record;
    let other = pipeline.process_scene(ts(4), &uniform_frame(6, &[])).unwrap().record;

    let result = aggregate(vec![other, first, second]);
    assert!(matches!(result, Err(NhiError::DuplicateTimestamp { .. })));
}

#[test]
fn checkerboard_honors_adjacency_setting() {
    let labels = Grid::from_fn(3, 3, |c| {
        if (c.x + c.y) % 2 == 0 { Severity::Hot } else { Severity::Background }
    });
    let severity = SeverityRaster::from_labels(labels);

    let transform = landsat_transform();
    let eight =
        region_extractor::extract_regions(&severity, Adjacency::Eight, &transform, PIXEL_AREA);
    let four =
        region_extractor::extract_regions(&severity, Adjacency::Four, &transform, PIXEL_AREA);

    assert_eq!(eight.hot.len(), 1);
    assert!(four.hot.len() >= 2);
    assert_eq!(four.hot.len(), 5);
}

#[test]
fn checkerboard_adjacency_flows_through_the_pipeline() {
    let hot: Vec<Cell> = [(10, 10), (12, 10), (11, 11), (10, 12), (12, 12)]
        .iter()
        .map(|&(x, y)| Cell::new(x, y))
        .collect();
    let frame = textured_frame(23, &hot);

    let mut config = PipelineConfig::default();
    config.adjacency = Adjacency::Four;
    let four = ScenePipeline::new(config.clone()).process_scene(ts(5), &frame).unwrap();
    config.adjacency = Adjacency::Eight;
    let eight = ScenePipeline::new(config).process_scene(ts(5), &frame).unwrap();

    assert_eq!(eight.regions.len(), 1);
    assert_eq!(four.regions.len(), 5);
    assert_eq!(four.record.combined_hot_pixels, eight.record.combined_hot_pixels);
}

#[test]
fn extreme_threshold_never_below_hot() {
    let hot = [Cell::new(4, 4), Cell::new(5, 4), Cell::new(18, 15)];
    let frame = textured_frame(24, &hot).with_valid_mask(Grid::from_fn(24, 24, |c| c.x % 9 != 3));
    let (index_a, index_b) = compute_indices(&frame, &PipelineConfig::default().index).unwrap();

    for index in [&index_a, &index_b] {
        let field = compute_thresholds(index, &PipelineConfig::default().threshold_a);
        for y in 0..24 {
            for x in 0..24 {
                if let Some(t) = field.get(Cell::new(x, y)) {
                    assert!(t.extreme >= t.hot);
                }
            }
        }
    }
}

#[test]
fn classifier_is_idempotent_on_its_own_output() {
    let hot = [Cell::new(3, 3), Cell::new(12, 8), Cell::new(13, 8)];
    let frame = textured_frame(18, &hot);
    let analysis = ScenePipeline::default().process_scene(ts(6), &frame).unwrap();
    let severity = &analysis.severity;
    let (w, h) = (severity.width(), severity.height());

    let sentinel_a = severity.sentinel_index(IndexKind::Swir);
    let sentinel_b = severity.sentinel_index(IndexKind::Swnir);
    let again = classify(
        &sentinel_a,
        &ThresholdField::uniform(IndexKind::Swir, w, h, SENTINEL_HOT, SENTINEL_EXTREME),
        &sentinel_b,
        &ThresholdField::uniform(IndexKind::Swnir, w, h, SENTINEL_HOT, SENTINEL_EXTREME),
    )
    .unwrap();

    assert_eq!(again.labels(), severity.labels());
}

#[test]
fn regions_partition_labelled_cells_with_exact_area() {
    let hot = [
        Cell::new(2, 2),
        Cell::new(3, 3),
        Cell::new(9, 2),
        Cell::new(9, 3),
        Cell::new(15, 14),
    ];
    let frame = textured_frame(20, &hot);
    let analysis = ScenePipeline::default().process_scene(ts(7), &frame).unwrap();

    for tier in [Severity::Hot, Severity::Extreme] {
        let mut seen = HashSet::new();
        for region in analysis.regions.tier(tier) {
            for cell in &region.cells {
                assert!(seen.insert(*cell));
                assert_eq!(analysis.severity.get(*cell), Some(tier));
            }
        }
        assert_eq!(seen.len(), analysis.severity.count(tier));
        assert_eq!(
            analysis.regions.total_area(tier),
            analysis.severity.count(tier) as f64 * PIXEL_AREA
        );
    }
}

#[tokio::test]
async fn parallel_run_skips_malformed_scene_and_orders_series() {
    let malformed = RadianceFrame::new(Grid::filled(5, 5, 10.0), Grid::filled(5, 5, 20.0))
        .with_nir(Grid::filled(4, 5, 60.0));
    let scenes = vec![
        (ts(9), uniform_frame(12, &[(Cell::new(6, 6), 100.0)])),
        (ts(8), malformed),
        (ts(3), uniform_frame(12, &[])),
    ];

    let config = PipelineConfig {
        worker_count: Some(2),
        scene_timeout_ms: Some(30_000),
        ..Default::default()
    };
    let pipeline = ParallelPipeline::new(config).unwrap();
    let report = pipeline.process_series(scenes).await.unwrap();
    pipeline.shutdown().await;

    let order: Vec<_> = report.series.iter().map(|r| r.timestamp).collect();
    assert_eq!(order, [ts(3), ts(9)]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].timestamp, ts(8));
    assert_eq!(report.flagged.len(), 1);
    assert_eq!(report.flagged[0].timestamp, ts(9));
    assert_eq!(report.flagged[0].regions.extreme.len(), 1);
}
