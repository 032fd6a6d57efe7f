// THEORY:
// The only knobs the engine reads. Acquisition concerns (site, coordinates,
// search radius, dates, credentials) belong to whoever builds the frames and
// are deliberately absent. Every field has a default, so an empty JSON object
// is a complete configuration, and `validate` rejects combinations that would
// break the threshold invariants before any scene is touched.

use crate::core_modules::region_extractor::Adjacency;
use crate::error::{NhiError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-band gains and the fallback NIR radiance used by the index computer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub gain_a: f64,
    pub gain_b: f64,
    pub gain_nir: f64,
    /// Radiance standing in for the NIR band when a frame carries none.
    pub nir_reference: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            gain_a: 1.0,
            gain_b: 1.0,
            gain_nir: 1.0,
            nir_reference: 60.0,
        }
    }
}

/// Contextual threshold settings for one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Half-width of the square background window, in cells.
    pub window_radius: usize,
    /// Fewest background cells a window needs before it falls back to scene statistics.
    pub min_background_samples: usize,
    /// Cells whose index exceeds this value are kept out of every background statistic.
    pub outlier_bound: f64,
    /// Multiplier on the background standard deviation for the HOT tier.
    pub k_hot: f64,
    /// Multiplier on the background standard deviation for the EXTREME tier.
    pub k_extreme: f64,
    /// Lower bound applied to the background standard deviation.
    pub sigma_floor: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            window_radius: 10,
            min_background_samples: 30,
            outlier_bound: 0.0,
            k_hot: 3.0,
            k_extreme: 6.0,
            sigma_floor: 1e-4,
        }
    }
}

/// Promotes saturated SWIR pixels to EXTREME regardless of the ratio test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtremeRadianceTest {
    pub enabled: bool,
    /// Channel B (1.6 um) radiance at or above which a positive NHI_SWIR cell is extreme.
    pub min_swir1_radiance: f64,
    /// Coastal radiance must stay below this, which rejects bright cloud tops.
    pub max_coastal_radiance: f64,
}

impl Default for ExtremeRadianceTest {
    fn default() -> Self {
        Self {
            enabled: false,
            min_swir1_radiance: 71.3,
            max_coastal_radiance: 70.0,
        }
    }
}

/// Configuration for `ScenePipeline` and `ParallelPipeline`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub index: IndexConfig,
    /// Thresholds for index A (NHI_SWIR).
    pub threshold_a: ThresholdConfig,
    /// Thresholds for index B (NHI_SWNIR).
    pub threshold_b: ThresholdConfig,
    pub adjacency: Adjacency,
    pub extreme_radiance_test: ExtremeRadianceTest,
    /// Worker tasks in the parallel pipeline. `None` uses the CPU count.
    pub worker_count: Option<usize>,
    /// Per-scene budget in the parallel pipeline. `None` disables the time-out.
    pub scene_timeout_ms: Option<u64>,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        validate_threshold("threshold_a", &self.threshold_a)?;
        validate_threshold("threshold_b", &self.threshold_b)?;

        for (name, gain) in [
            ("index.gain_a", self.index.gain_a),
            ("index.gain_b", self.index.gain_b),
            ("index.gain_nir", self.index.gain_nir),
        ] {
            if !(gain.is_finite() && gain > 0.0) {
                return Err(invalid(name, gain, "gain must be finite and positive"));
            }
        }
        if !(self.index.nir_reference.is_finite() && self.index.nir_reference > 0.0) {
            return Err(invalid(
                "index.nir_reference",
                self.index.nir_reference,
                "reference radiance must be finite and positive",
            ));
        }
        if self.worker_count == Some(0) {
            return Err(invalid("worker_count", 0, "at least one worker is required"));
        }
        if self.scene_timeout_ms == Some(0) {
            return Err(invalid("scene_timeout_ms", 0, "time-out must be positive"));
        }
        Ok(())
    }

    /// Effective worker count for the parallel pipeline.
    pub fn workers(&self) -> usize {
        self.worker_count.unwrap_or_else(num_cpus::get).max(1)
    }
}

fn validate_threshold(section: &'static str, t: &ThresholdConfig) -> Result<()> {
    if !(t.k_hot.is_finite() && t.k_hot > 0.0) {
        return Err(invalid(section, t.k_hot, "k_hot must be finite and > 0"));
    }
    if !(t.k_extreme.is_finite() && t.k_extreme > t.k_hot) {
        return Err(invalid(section, t.k_extreme, "k_extreme must be greater than k_hot"));
    }
    if t.min_background_samples == 0 {
        return Err(invalid(section, 0, "min_background_samples must be at least 1"));
    }
    if !(t.sigma_floor.is_finite() && t.sigma_floor > 0.0) {
        return Err(invalid(section, t.sigma_floor, "sigma_floor must be finite and > 0"));
    }
    if !t.outlier_bound.is_finite() {
        return Err(invalid(section, t.outlier_bound, "outlier_bound must be finite"));
    }
    Ok(())
}

fn invalid(name: &'static str, value: impl ToString, reason: &str) -> NhiError {
    NhiError::InvalidConfig {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
