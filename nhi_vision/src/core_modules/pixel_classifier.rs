// THEORY:
// The `PixelClassifier` folds the two index rasters and their threshold fields
// into one severity label per cell. It is a pure per-cell function with no
// spatial coupling; grouping cells into regions happens in the next layer.
//
// Precedence: a cell is EXTREME if either index crosses its extreme threshold,
// otherwise HOT if either crosses its hot threshold, otherwise BACKGROUND.
// Alongside the label it records which channel(s) crossed their hot threshold,
// because the scene summary reports SWIR, SWNIR and combined counts separately.
//
// The optional saturated-extreme promotion lives here too but runs as its own
// step, after classification, so `classify` stays idempotent over its output.

use crate::config::ExtremeRadianceTest;
use crate::core_modules::contextual_thresholder::{ThresholdField, Thresholds};
use crate::core_modules::grid::{Cell, Grid};
use crate::core_modules::index_computer::{IndexKind, IndexRaster};
use crate::core_modules::radiance_frame::RadianceFrame;
use crate::error::{NhiError, Result};
use serde::{Deserialize, Serialize};

/// Sentinel thresholds that reproduce a severity raster from its own encoding.
pub const SENTINEL_HOT: f64 = 0.5;
pub const SENTINEL_EXTREME: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Background,
    Hot,
    Extreme,
}

impl Severity {
    /// Index value that `SENTINEL_HOT`/`SENTINEL_EXTREME` map back to this label.
    pub fn sentinel(self) -> f64 {
        match self {
            Severity::Background => 0.0,
            Severity::Hot => 1.0,
            Severity::Extreme => 2.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Background => "background",
            Severity::Hot => "hot",
            Severity::Extreme => "extreme",
        }
    }
}

/// Which channels crossed their hot threshold at a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelHits {
    pub swir: bool,
    pub swnir: bool,
}

impl ChannelHits {
    pub fn any(self) -> bool {
        self.swir || self.swnir
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeverityRaster {
    labels: Grid<Severity>,
    hits: Grid<ChannelHits>,
}

impl SeverityRaster {
    /// Builds a raster from labels alone; channel hits mirror the labels on the SWIR channel.
    pub fn from_labels(labels: Grid<Severity>) -> Self {
        let hits = labels.map(|s| ChannelHits {
            swir: *s != Severity::Background,
            swnir: false,
        });
        Self { labels, hits }
    }

    /// An all-BACKGROUND raster.
    pub fn background(width: usize, height: usize) -> Self {
        Self {
            labels: Grid::filled(width, height, Severity::Background),
            hits: Grid::filled(width, height, ChannelHits::default()),
        }
    }

    pub fn width(&self) -> usize {
        self.labels.width()
    }

    pub fn height(&self) -> usize {
        self.labels.height()
    }

    pub fn labels(&self) -> &Grid<Severity> {
        &self.labels
    }

    pub fn get(&self, cell: Cell) -> Option<Severity> {
        self.labels.get(cell).copied()
    }

    pub fn hits(&self, cell: Cell) -> Option<ChannelHits> {
        self.hits.get(cell).copied()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.labels.iter().filter(|s| **s == severity).count()
    }

    pub fn swir_hits(&self) -> usize {
        self.hits.iter().filter(|h| h.swir).count()
    }

    pub fn swnir_hits(&self) -> usize {
        self.hits.iter().filter(|h| h.swnir).count()
    }

    /// Union of the two channels' hot sets.
    pub fn combined_hits(&self) -> usize {
        self.hits.iter().filter(|h| h.any()).count()
    }

    /// Encodes the labels as an index raster for `SENTINEL_HOT`/`SENTINEL_EXTREME`.
    pub fn sentinel_index(&self, kind: IndexKind) -> IndexRaster {
        IndexRaster::new(kind, self.labels.map(|s| s.sentinel()))
    }
}

/// Labels every cell from the two indices and their thresholds.
pub fn classify(
    index_a: &IndexRaster,
    thresholds_a: &ThresholdField,
    index_b: &IndexRaster,
    thresholds_b: &ThresholdField,
) -> Result<SeverityRaster> {
    let (w, h) = (index_a.width(), index_a.height());
    check_shape("index_b", w, h, index_b.width(), index_b.height())?;
    check_shape("thresholds_a", w, h, thresholds_a.width(), thresholds_a.height())?;
    check_shape("thresholds_b", w, h, thresholds_b.width(), thresholds_b.height())?;

    let mut hits = Vec::with_capacity(w * h);
    let mut labels = Vec::with_capacity(w * h);
    for i in 0..w * h {
        // A cell missing either index is invalid for both channels.
        let (Some(value_a), Some(value_b)) = (index_a.value_at(i), index_b.value_at(i)) else {
            labels.push(Severity::Background);
            hits.push(ChannelHits::default());
            continue;
        };
        let level_a = channel_level(value_a, thresholds_a.at(i));
        let level_b = channel_level(value_b, thresholds_b.at(i));
        labels.push(level_a.max(level_b));
        hits.push(ChannelHits {
            swir: level_a != Severity::Background,
            swnir: level_b != Severity::Background,
        });
    }

    Ok(SeverityRaster {
        labels: Grid::from_vec(w, h, labels)?,
        hits: Grid::from_vec(w, h, hits)?,
    })
}

/// Severity implied by one channel at one cell. Missing thresholds are silent.
fn channel_level(value: f64, thresholds: Option<&Thresholds>) -> Severity {
    match thresholds {
        Some(t) if value > t.extreme => Severity::Extreme,
        Some(t) if value > t.hot => Severity::Hot,
        _ => Severity::Background,
    }
}

/// Promotes saturated cells to EXTREME. Returns the number of cells promoted.
///
/// A cell qualifies when both indices are valid, NHI_SWIR is positive, channel
/// B radiance reaches `min_swir1_radiance`, and (if the frame has a coastal
/// band) coastal radiance stays below `max_coastal_radiance`.
pub fn promote_saturated(
    severity: &mut SeverityRaster,
    frame: &RadianceFrame,
    index_a: &IndexRaster,
    index_b: &IndexRaster,
    test: &ExtremeRadianceTest,
) -> usize {
    if !test.enabled {
        return 0;
    }
    let coastal = frame.coastal();
    let mut promoted = 0;
    for i in 0..severity.labels.len() {
        if severity.labels.at(i) == &Severity::Extreme
            || !frame.is_valid(i)
            || index_b.value_at(i).is_none()
        {
            continue;
        }
        let positive = index_a.value_at(i).is_some_and(|v| v > 0.0);
        let saturated = *frame.channel_b().at(i) >= test.min_swir1_radiance;
        let clear = coastal.is_none_or(|band| *band.at(i) < test.max_coastal_radiance);
        if positive && saturated && clear {
            let cell = severity.labels.cell_at(i);
            if let Some(label) = severity.labels.get_mut(cell) {
                *label = Severity::Extreme;
                promoted += 1;
            }
        }
    }
    if promoted > 0 {
        log::debug!("promoted {promoted} saturated cells to extreme");
    }
    promoted
}

fn check_shape(band: &'static str, w: usize, h: usize, aw: usize, ah: usize) -> Result<()> {
    if (w, h) == (aw, ah) {
        return Ok(());
    }
    Err(NhiError::ShapeMismatch {
        band,
        expected_width: w,
        expected_height: h,
        actual_width: aw,
        actual_height: ah,
    })
}
