// THEORY:
// The `IndexComputer` turns radiance into the two Normalized Hotspot Indices.
// It is a pure, per-cell function: no neighbourhoods, no history.
//
// - NHI_SWIR  (index A) = (A - B) / (A + B): SWIR2 against SWIR1. Rises towards
//   +1 as an emitter hot enough to dominate 2.2 um appears; sits below zero for
//   ambient, reflective ground.
// - NHI_SWNIR (index B) = (B - N) / (B + N): SWIR1 against NIR. Picks up the
//   hotter, higher-intensity anomalies that also lift the 1.6 um band.
//
// Each band is scaled by its configured gain first. When a frame carries no NIR
// band, N is the configured reference radiance. Invalid input cells, and cells
// whose denominator vanishes, become NaN in the output and read back as `None`.

use crate::config::IndexConfig;
use crate::core_modules::grid::{Cell, Grid};
use crate::core_modules::radiance_frame::RadianceFrame;
use crate::error::Result;
use serde::{Deserialize, Serialize};

const DENOMINATOR_EPSILON: f64 = 1e-10;

/// Which of the two hotspot indices a raster holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// NHI_SWIR, index A.
    Swir,
    /// NHI_SWNIR, index B.
    Swnir,
}

impl IndexKind {
    pub fn label(self) -> &'static str {
        match self {
            IndexKind::Swir => "NHI_SWIR",
            IndexKind::Swnir => "NHI_SWNIR",
        }
    }
}

/// A grid of normalized indices in [-1, 1]; NaN marks an invalid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRaster {
    kind: IndexKind,
    values: Grid<f64>,
}

impl IndexRaster {
    /// Wraps precomputed values. Non-finite entries are treated as invalid.
    pub fn new(kind: IndexKind, values: Grid<f64>) -> Self {
        Self { kind, values }
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn grid(&self) -> &Grid<f64> {
        &self.values
    }

    pub fn width(&self) -> usize {
        self.values.width()
    }

    pub fn height(&self) -> usize {
        self.values.height()
    }

    pub fn get(&self, cell: Cell) -> Option<f64> {
        self.values.get(cell).copied().filter(|v| v.is_finite())
    }

    #[inline]
    pub fn value_at(&self, index: usize) -> Option<f64> {
        let v = *self.values.at(index);
        if v.is_finite() { Some(v) } else { None }
    }

    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_finite()).count()
    }
}

/// Computes `(NHI_SWIR, NHI_SWNIR)` for a frame.
///
/// Fails with `ShapeMismatch` when any band or the mask disagrees with channel A.
pub fn compute_indices(
    frame: &RadianceFrame,
    config: &IndexConfig,
) -> Result<(IndexRaster, IndexRaster)> {
    frame.check_shapes()?;

    let a = frame.channel_a();
    let b = frame.channel_b();
    let nir = frame.nir();

    let swir = Grid::from_fn(frame.width(), frame.height(), |cell| {
        let i = a.index_of(cell);
        if !frame.is_valid(i) {
            return f64::NAN;
        }
        normalized_difference(a.at(i) * config.gain_a, b.at(i) * config.gain_b)
    });

    let swnir = Grid::from_fn(frame.width(), frame.height(), |cell| {
        let i = a.index_of(cell);
        if !frame.is_valid(i) {
            return f64::NAN;
        }
        let n = match nir {
            Some(band) => band.at(i) * config.gain_nir,
            None => config.nir_reference,
        };
        normalized_difference(b.at(i) * config.gain_b, n)
    });

    Ok((
        IndexRaster::new(IndexKind::Swir, swir),
        IndexRaster::new(IndexKind::Swnir, swnir),
    ))
}

/// `(p - q) / (p + q)`, clamped to [-1, 1]. NaN when undefined.
pub fn normalized_difference(p: f64, q: f64) -> f64 {
    if !(p.is_finite() && q.is_finite()) {
        return f64::NAN;
    }
    let sum = p + q;
    if sum.abs() < DENOMINATOR_EPSILON {
        return f64::NAN;
    }
    ((p - q) / sum).clamp(-1.0, 1.0)
}
