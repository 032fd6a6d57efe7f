// THEORY:
// The `RegionExtractor` is the spatial grouping layer. It takes the per-cell
// severity raster and groups contiguous same-severity cells into `Region`s.
//
// Key architectural principles & algorithm steps:
// 1.  **Connected components**: a flood fill from every unvisited non-background
//     cell absorbs each neighbour with the same label. HOT and EXTREME cells
//     never merge with each other; each tier is labelled on its own terms.
// 2.  **Adjacency policy**: 8-neighbour by default. Anomalous pixels often line
//     up diagonally along crater rims and lava channels, and 4-neighbour
//     grouping would split one physical anomaly into several regions. The
//     4-neighbour mode is kept for calibration against other tools.
// 3.  **Order independence**: component membership depends only on the labels
//     and the adjacency rule. Region numbering follows the scan order and is
//     not meant to be stable across runs.
// 4.  **Data aggregation**: once a component is complete its exact area,
//     bounding box and traced outline are packaged into a `Region`.
// 5.  **Stateless utility**: one severity raster in, one `RegionSet` out. No
//     memory of other scenes.

use crate::core_modules::boundary::trace_outline;
use crate::core_modules::geo_transform::GeoTransform;
use crate::core_modules::grid::{ALL_NEIGHBOURS, Cell, EDGE_NEIGHBOURS, Grid};
use crate::core_modules::pixel_classifier::{Severity, SeverityRaster};
use crate::core_modules::region::{Region, RegionSet};
use serde::{Deserialize, Serialize};

/// Which neighbours count as connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Adjacency {
    /// Edge-sharing neighbours only.
    Four,
    /// Edge- and corner-sharing neighbours.
    #[default]
    Eight,
}

impl Adjacency {
    pub fn offsets(self) -> &'static [(isize, isize)] {
        match self {
            Adjacency::Four => &EDGE_NEIGHBOURS,
            Adjacency::Eight => &ALL_NEIGHBOURS,
        }
    }
}

pub mod region_extractor {
    use super::*; // Make imports from the parent module available.

    /// Groups every HOT and EXTREME cell of `severity` into connected regions.
    ///
    /// `transform` places the traced outlines on the map; `pixel_area_m2` turns
    /// cell counts into area.
    pub fn extract_regions(
        severity: &SeverityRaster,
        adjacency: Adjacency,
        transform: &GeoTransform,
        pixel_area_m2: f64,
    ) -> RegionSet {
        let labels = severity.labels();
        let mut visited = Grid::filled(labels.width(), labels.height(), false);
        let mut regions = RegionSet::default();
        let mut next_id = 0;

        for index in 0..labels.len() {
            let label = *labels.at(index);
            if label == Severity::Background || *visited.at(index) {
                continue;
            }

            let seed = labels.cell_at(index);
            let region = grow_region(
                seed,
                label,
                labels,
                &mut visited,
                adjacency,
                next_id,
                transform,
                pixel_area_m2,
            );
            next_id += 1;

            match label {
                Severity::Hot => regions.hot.push(region),
                Severity::Extreme => regions.extreme.push(region),
                Severity::Background => {}
            }
        }

        log::debug!(
            "extracted {} hot and {} extreme regions ({:?} adjacency)",
            regions.hot.len(),
            regions.extreme.len(),
            adjacency
        );
        regions
    }

    /// Flood-fills one component starting at `seed`.
    #[allow(clippy::too_many_arguments)]
    fn grow_region(
        seed: Cell,
        label: Severity,
        labels: &Grid<Severity>,
        visited: &mut Grid<bool>,
        adjacency: Adjacency,
        id: u64,
        transform: &GeoTransform,
        pixel_area_m2: f64,
    ) -> Region {
        let mut cells: Vec<Cell> = Vec::new();
        let mut stack: Vec<Cell> = vec![seed];
        visited.set_at(labels.index_of(seed), true);

        while let Some(current) = stack.pop() {
            cells.push(current);

            for &(dx, dy) in adjacency.offsets() {
                let Some(next) = labels.offset(current, dx, dy) else {
                    continue;
                };
                let next_index = labels.index_of(next);
                if !*visited.at(next_index) && *labels.at(next_index) == label {
                    visited.set_at(next_index, true);
                    stack.push(next);
                }
            }
        }

        // --- Data Aggregation ---
        let mut min = Cell::new(usize::MAX, usize::MAX);
        let mut max = Cell::new(0, 0);
        for cell in &cells {
            min.x = min.x.min(cell.x);
            min.y = min.y.min(cell.y);
            max.x = max.x.max(cell.x);
            max.y = max.y.max(cell.y);
        }

        let cell_count = cells.len();
        Region {
            id,
            severity: label,
            boundary: trace_outline(&cells, transform),
            cells,
            cell_count,
            area_m2: cell_count as f64 * pixel_area_m2,
            bounding_box: (min, max),
        }
    }
}
