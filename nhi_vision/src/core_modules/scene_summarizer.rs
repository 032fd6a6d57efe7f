// THEORY:
// The `SceneSummarizer` collapses one scene's rasters and regions into a single
// immutable `SceneRecord`, the row the time series and every downstream table
// or chart is built from.
//
// Counts come from the classifier's per-channel hits: SWIR and SWNIR counts are
// each channel's own hot set and the combined count is their union, so a cell
// flagged by both channels is counted once. Areas are sums of region areas per
// tier. Radiance means are whole-scene statistics over valid cells and ignore
// severity entirely.
//
// A fully masked scene still yields a record: zero counts, zero areas and `None`
// means. "Observed, nothing hot" and "not observed" must stay distinguishable.

use crate::core_modules::contextual_thresholder::ThresholdField;
use crate::core_modules::index_computer::IndexRaster;
use crate::core_modules::pixel_classifier::{Severity, SeverityRaster};
use crate::core_modules::radiance_frame::RadianceFrame;
use crate::core_modules::region::RegionSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column order of the tabular export.
pub const TABLE_HEADER: [&str; 9] = [
    "Date",
    "Total NHI SWIR hot pixels",
    "Total NHI SWNIR hot pixels",
    "Total NHI SWIR + SWNIR hot pixels",
    "Hot pixels area m2",
    "Total NHI extreme pixels",
    "Extreme hot pixels area m2",
    "Mean radiance A (2.2 um)",
    "Mean radiance B (1.6 um)",
];

const TABLE_DATE_FORMAT: &str = "%Y-%b-%d";

/// Summary of one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub timestamp: DateTime<Utc>,
    /// Cells whose NHI_SWIR crossed its hot threshold.
    pub swir_hot_pixels: usize,
    /// Cells whose NHI_SWNIR crossed its hot threshold.
    pub swnir_hot_pixels: usize,
    /// Union of the two sets above.
    pub combined_hot_pixels: usize,
    pub extreme_pixels: usize,
    /// Total area of HOT regions.
    pub hot_area_m2: f64,
    /// Total area of EXTREME regions.
    pub extreme_area_m2: f64,
    /// Mean channel A radiance over valid cells; `None` when no cell is valid.
    pub mean_radiance_a: Option<f64>,
    /// Mean channel B radiance over valid cells; `None` when no cell is valid.
    pub mean_radiance_b: Option<f64>,
    pub valid_cells: usize,
    /// Channel A radiance summed over valid cells with a non-negative index.
    pub anomaly_radiance_a: f64,
    /// Channel B radiance summed over valid cells with a non-negative index.
    pub anomaly_radiance_b: f64,
    pub swir_determinable: bool,
    pub swnir_determinable: bool,
}

impl SceneRecord {
    /// Adds the index-dependent diagnostics: anomaly radiance sums and whether
    /// each channel's thresholds could be determined.
    pub fn annotate(
        mut self,
        frame: &RadianceFrame,
        index_a: &IndexRaster,
        index_b: &IndexRaster,
        thresholds_a: &ThresholdField,
        thresholds_b: &ThresholdField,
    ) -> Self {
        let (mut sum_a, mut sum_b) = (0.0, 0.0);
        for i in 0..frame.len() {
            if !frame.is_valid(i) {
                continue;
            }
            let non_negative = |index: &IndexRaster| index.value_at(i).is_some_and(|v| v >= 0.0);
            if non_negative(index_a) || non_negative(index_b) {
                sum_a += *frame.channel_a().at(i);
                sum_b += *frame.channel_b().at(i);
            }
        }
        self.anomaly_radiance_a = sum_a;
        self.anomaly_radiance_b = sum_b;
        self.swir_determinable = thresholds_a.is_determinable();
        self.swnir_determinable = thresholds_b.is_determinable();
        self
    }

    /// At least one HOT or EXTREME cell.
    pub fn is_flagged(&self) -> bool {
        self.combined_hot_pixels > 0 || self.extreme_pixels > 0
    }

    /// At least one valid cell.
    pub fn is_observed(&self) -> bool {
        self.valid_cells > 0
    }

    /// One row in `TABLE_HEADER` order. Undefined means are empty fields.
    pub fn table_row(&self) -> [String; 9] {
        let mean = |m: Option<f64>| m.map(|v| format!("{v:.4}")).unwrap_or_default();
        [
            self.timestamp.format(TABLE_DATE_FORMAT).to_string(),
            self.swir_hot_pixels.to_string(),
            self.swnir_hot_pixels.to_string(),
            self.combined_hot_pixels.to_string(),
            self.hot_area_m2.to_string(),
            self.extreme_pixels.to_string(),
            self.extreme_area_m2.to_string(),
            mean(self.mean_radiance_a),
            mean(self.mean_radiance_b),
        ]
    }
}

/// Builds the record for one scene.
pub fn summarize(
    frame: &RadianceFrame,
    severity: &SeverityRaster,
    regions: &RegionSet,
    timestamp: DateTime<Utc>,
) -> SceneRecord {
    let mut valid_cells = 0usize;
    let (mut sum_a, mut sum_b) = (0.0, 0.0);
    for i in 0..frame.len() {
        if frame.is_valid(i) {
            valid_cells += 1;
            sum_a += *frame.channel_a().at(i);
            sum_b += *frame.channel_b().at(i);
        }
    }
    let mean = |sum: f64| (valid_cells > 0).then(|| sum / valid_cells as f64);

    SceneRecord {
        timestamp,
        swir_hot_pixels: severity.swir_hits(),
        swnir_hot_pixels: severity.swnir_hits(),
        combined_hot_pixels: severity.combined_hits(),
        extreme_pixels: severity.count(Severity::Extreme),
        hot_area_m2: regions.total_area(Severity::Hot),
        extreme_area_m2: regions.total_area(Severity::Extreme),
        mean_radiance_a: mean(sum_a),
        mean_radiance_b: mean(sum_b),
        valid_cells,
        anomaly_radiance_a: 0.0,
        anomaly_radiance_b: 0.0,
        swir_determinable: valid_cells > 0,
        swnir_determinable: valid_cells > 0,
    }
}
