// THEORY:
// The `ContextualThresholder` is the heart of the detection layer. Instead of one
// global cut-off, every cell is judged against the statistics of its own
// neighbourhood, so the same index value can be an anomaly over cold snow and
// ordinary noise over a sunlit lava field.
//
// Key architectural principles & algorithm steps:
// 1.  **Provisional flagging**: any cell whose index already exceeds the
//     conservative `outlier_bound` is kept out of every background statistic,
//     so a hotspot cannot raise its own reference and hide itself.
// 2.  **Summed-area tables**: count, sum and sum of squares of the remaining
//     background cells are integrated once. Any window statistic is then four
//     lookups per table, independent of the window radius.
// 3.  **Local statistics with a fallback**: a window with fewer than
//     `min_background_samples` background cells (scene edges, heavy cloud, large
//     eruptions) borrows the scene-wide background mean and deviation instead.
// 4.  **Undetermined scenes**: when even the scene-wide sample is too small, the
//     field carries no thresholds at all and the classifier treats the channel
//     as silent. This is a data state, not an error.
// 5.  **Monotone thresholds**: hot = mu + k_hot * sigma and
//     extreme = mu + k_extreme * sigma, with sigma floored and k_extreme > k_hot > 0,
//     so extreme >= hot >= mu at every cell.

use crate::config::ThresholdConfig;
use crate::core_modules::grid::{Cell, Grid};
use crate::core_modules::index_computer::{IndexKind, IndexRaster};
use serde::Serialize;

/// Where a cell's background statistic came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatisticSource {
    /// The cell's own window had enough background samples.
    Local,
    /// The window was too sparse; scene-wide background statistics were used.
    SceneFallback,
}

/// Mean and population standard deviation of a set of background cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BackgroundStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl BackgroundStats {
    fn from_sums(count: f64, sum: f64, sum_sq: f64) -> Self {
        let mean = sum / count;
        // Cancellation can push a flat window's variance a hair below zero.
        let variance = (sum_sq / count - mean * mean).max(0.0);
        Self {
            count: count as usize,
            mean,
            std_dev: variance.sqrt(),
        }
    }
}

/// The per-cell pair of severity thresholds plus the statistic behind them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub mean: f64,
    pub std_dev: f64,
    pub hot: f64,
    pub extreme: f64,
    pub source: StatisticSource,
}

impl Thresholds {
    fn from_background(
        stats: BackgroundStats,
        config: &ThresholdConfig,
        source: StatisticSource,
    ) -> Self {
        let sigma = stats.std_dev.max(config.sigma_floor);
        Self {
            mean: stats.mean,
            std_dev: stats.std_dev,
            hot: stats.mean + config.k_hot * sigma,
            extreme: stats.mean + config.k_extreme * sigma,
            source,
        }
    }
}

/// Thresholds for every cell of one index raster.
#[derive(Debug, Clone)]
pub struct ThresholdField {
    kind: IndexKind,
    cells: Grid<Option<Thresholds>>,
    scene_background: Option<BackgroundStats>,
    fallback_cells: usize,
}

impl ThresholdField {
    /// A field with the same thresholds at every cell. Used to re-run the
    /// classifier over sentinel-encoded labels.
    pub fn uniform(kind: IndexKind, width: usize, height: usize, hot: f64, extreme: f64) -> Self {
        let thresholds = Thresholds {
            mean: hot,
            std_dev: 0.0,
            hot,
            extreme,
            source: StatisticSource::Local,
        };
        Self {
            kind,
            cells: Grid::filled(width, height, Some(thresholds)),
            scene_background: None,
            fallback_cells: 0,
        }
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn width(&self) -> usize {
        self.cells.width()
    }

    pub fn height(&self) -> usize {
        self.cells.height()
    }

    pub fn get(&self, cell: Cell) -> Option<&Thresholds> {
        self.cells.get(cell).and_then(Option::as_ref)
    }

    #[inline]
    pub fn at(&self, index: usize) -> Option<&Thresholds> {
        self.cells.at(index).as_ref()
    }

    /// False when neither any window nor the whole scene had enough background.
    pub fn is_determinable(&self) -> bool {
        self.cells.iter().any(Option::is_some)
    }

    /// Scene-wide background statistics, when the scene had enough samples.
    pub fn scene_background(&self) -> Option<&BackgroundStats> {
        self.scene_background.as_ref()
    }

    /// Number of cells whose thresholds came from the scene-wide fallback.
    pub fn fallback_cells(&self) -> usize {
        self.fallback_cells
    }
}

/// Integral images over the background mask. Dimensions are `(w + 1) x (h + 1)`
/// with a zero first row and column.
struct BackgroundTable {
    stride: usize,
    count: Vec<f64>,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl BackgroundTable {
    fn build(index: &IndexRaster, outlier_bound: f64) -> Self {
        let (w, h) = (index.width(), index.height());
        let stride = w + 1;
        let size = stride * (h + 1);
        let mut count = vec![0.0; size];
        let mut sum = vec![0.0; size];
        let mut sum_sq = vec![0.0; size];

        for y in 0..h {
            let mut row_count = 0.0;
            let mut row_sum = 0.0;
            let mut row_sum_sq = 0.0;
            for x in 0..w {
                if let Some(v) = index.value_at(y * w + x).filter(|v| *v <= outlier_bound) {
                    row_count += 1.0;
                    row_sum += v;
                    row_sum_sq += v * v;
                }
                let above = y * stride + x + 1;
                let here = (y + 1) * stride + x + 1;
                count[here] = count[above] + row_count;
                sum[here] = sum[above] + row_sum;
                sum_sq[here] = sum_sq[above] + row_sum_sq;
            }
        }

        Self {
            stride,
            count,
            sum,
            sum_sq,
        }
    }

    /// Sums over the half-open cell rectangle `[x0, x1) x [y0, y1)`.
    fn window(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> (f64, f64, f64) {
        let s = self.stride;
        let rect = |t: &[f64]| t[y1 * s + x1] - t[y0 * s + x1] - t[y1 * s + x0] + t[y0 * s + x0];
        (rect(&self.count), rect(&self.sum), rect(&self.sum_sq))
    }
}

/// Computes contextual hot/extreme thresholds for every valid cell of `index`.
pub fn compute_thresholds(index: &IndexRaster, config: &ThresholdConfig) -> ThresholdField {
    let (w, h) = (index.width(), index.height());
    let kind = index.kind();
    let table = BackgroundTable::build(index, config.outlier_bound);
    let min_samples = config.min_background_samples.max(1) as f64;

    let (scene_count, scene_sum, scene_sum_sq) = table.window(0, 0, w, h);
    let scene_background = if scene_count >= min_samples {
        Some(BackgroundStats::from_sums(scene_count, scene_sum, scene_sum_sq))
    } else {
        None
    };

    let Some(scene_stats) = scene_background else {
        log::warn!(
            "{}: only {} background cells in scene (need {}), no anomaly determinable",
            kind.label(),
            scene_count,
            config.min_background_samples
        );
        return ThresholdField {
            kind,
            cells: Grid::filled(w, h, None),
            scene_background: None,
            fallback_cells: 0,
        };
    };

    let r = config.window_radius;
    let mut fallback_cells = 0;
    let cells = Grid::from_fn(w, h, |cell| {
        index.get(cell)?;

        let x0 = cell.x.saturating_sub(r);
        let y0 = cell.y.saturating_sub(r);
        let x1 = (cell.x + r + 1).min(w);
        let y1 = (cell.y + r + 1).min(h);
        let (count, sum, sum_sq) = table.window(x0, y0, x1, y1);

        if count >= min_samples {
            let local = BackgroundStats::from_sums(count, sum, sum_sq);
            Some(Thresholds::from_background(local, config, StatisticSource::Local))
        } else {
            fallback_cells += 1;
            Some(Thresholds::from_background(
                scene_stats,
                config,
                StatisticSource::SceneFallback,
            ))
        }
    });

    if fallback_cells > 0 {
        log::debug!(
            "{}: {} cells fell back to scene background (mean {:.4}, sigma {:.4})",
            kind.label(),
            fallback_cells,
            scene_stats.mean,
            scene_stats.std_dev
        );
    }

    ThresholdField {
        kind,
        cells,
        scene_background,
        fallback_cells,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(width: usize, height: usize, f: impl FnMut(Cell) -> f64) -> IndexRaster {
        IndexRaster::new(IndexKind::Swir, Grid::from_fn(width, height, f))
    }

    fn config(radius: usize, min_samples: usize) -> ThresholdConfig {
        ThresholdConfig {
            window_radius: radius,
            min_background_samples: min_samples,
            ..Default::default()
        }
    }

    /// Deterministic pseudo-noise in [-0.05, 0.05].
    fn noise(cell: Cell) -> f64 {
        let h = (cell.x as u64).wrapping_mul(73_856_093) ^ (cell.y as u64).wrapping_mul(19_349_663);
        ((h % 1000) as f64 / 1000.0 - 0.5) * 0.1
    }

    #[test]
    fn test_extreme_never_below_hot_or_mean() {
        let index = raster(25, 20, |c| {
            let spike = if c.x == 12 && c.y == 9 { 0.9 } else { 0.0 };
            -0.4 + noise(c) + spike
        });
        let field = compute_thresholds(&index, &config(4, 20));
        for y in 0..20 {
            for x in 0..25 {
                let t = field.get(Cell::new(x, y)).expect("valid cell has thresholds");
                assert!(t.extreme >= t.hot, "extreme {} < hot {}", t.extreme, t.hot);
                assert!(t.hot >= t.mean);
            }
        }
    }

    #[test]
    fn test_window_matches_brute_force() {
        let index = raster(12, 9, |c| -0.3 + noise(c));
        let cfg = config(2, 5);
        let field = compute_thresholds(&index, &cfg);
        let edge_cell = Cell::new(0, 4);

        let mut values = Vec::new();
        for y in 2..=6 {
            for x in 0..=2 {
                values.push(index.get(Cell::new(x, y)).unwrap());
            }
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

        let t = field.get(edge_cell).unwrap();
        assert_eq!(t.source, StatisticSource::Local);
        assert!((t.mean - mean).abs() < 1e-12);
        assert!((t.std_dev - var.sqrt()).abs() < 1e-9);
        assert!((t.hot - (mean + 3.0 * var.sqrt().max(cfg.sigma_floor))).abs() < 1e-9);
    }

    #[test]
    fn test_flagged_cells_do_not_contaminate_background() {
        let index = raster(9, 9, |c| if c.x == 4 && c.y == 4 { 0.8 } else { -0.5 });
        let field = compute_thresholds(&index, &config(4, 10));
        let t = field.get(Cell::new(4, 4)).unwrap();
        assert!((t.mean + 0.5).abs() < 1e-12);
        assert!(t.std_dev < 1e-6);
        assert!(0.8 > t.extreme);
    }

    #[test]
    fn test_sparse_window_falls_back_to_scene() {
        // Left half cloud-covered: cells near the left edge have thin windows.
        let index = raster(20, 5, |c| if c.x < 8 { f64::NAN } else { -0.2 + noise(c) });
        let field = compute_thresholds(&index, &config(1, 6));
        assert!(field.get(Cell::new(3, 2)).is_none());
        let edge = field.get(Cell::new(8, 0)).unwrap();
        assert_eq!(edge.source, StatisticSource::SceneFallback);
        let scene = field.scene_background().unwrap();
        assert_eq!(scene.count, 60);
        assert!((edge.mean - scene.mean).abs() < 1e-12);
        assert!(field.fallback_cells() > 0);
        assert_eq!(field.get(Cell::new(12, 2)).unwrap().source, StatisticSource::Local);
    }

    #[test]
    fn test_undetermined_when_scene_sample_too_small() {
        let index = raster(4, 4, |c| if c.y == 0 { -0.3 } else { 0.6 });
        let field = compute_thresholds(&index, &config(3, 5));
        assert!(!field.is_determinable());
        assert!(field.scene_background().is_none());
        assert!(field.get(Cell::new(0, 0)).is_none());
    }

    #[test]
    fn test_uniform_field_reports_given_thresholds() {
        let field = ThresholdField::uniform(IndexKind::Swnir, 3, 2, 0.5, 1.5);
        let t = field.get(Cell::new(2, 1)).unwrap();
        assert_eq!((t.hot, t.extreme), (0.5, 1.5));
        assert!(field.is_determinable());
    }
}
