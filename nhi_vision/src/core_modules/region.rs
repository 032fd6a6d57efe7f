// THEORY:
// A `Region` is one spatially connected patch of same-severity cells inside a
// single scene, the unit that gets exported as a raster mask and a vector
// polygon. Like the blobs it descends from, it is a plain data container: the
// extractor fills it in once and nothing mutates it afterwards.
//
// Area is exact: cell count times the physical pixel area. The boundary is the
// traced pixel outline in map coordinates, so it always encloses exactly the
// cells listed in `cells`.

use crate::core_modules::geo_transform::GeoTransform;
use crate::core_modules::grid::Cell;
use crate::core_modules::pixel_classifier::Severity;
use crate::error::Result;
use geo_types::MultiPolygon;
use image::{GrayImage, Luma};
use serde::Serialize;
use std::path::Path;

/// Mask value written for cells inside a region.
pub const MASK_INSIDE: u8 = 255;

/// One connected set of same-severity cells.
#[derive(Debug, Clone, Serialize)]
pub struct Region {
    /// Identifier unique within one scene's extraction. Not stable across runs.
    pub id: u64,
    pub severity: Severity,
    /// Every grid cell belonging to the region, in discovery order.
    pub cells: Vec<Cell>,
    pub cell_count: usize,
    /// `cell_count` times the pixel area of the source frame, in m^2.
    pub area_m2: f64,
    /// Top-left and bottom-right cells of the enclosing box (inclusive).
    pub bounding_box: (Cell, Cell),
    /// Traced outline in map coordinates. Holes are kept; parts that touch only
    /// at a corner are separate polygons.
    pub boundary: MultiPolygon<f64>,
}

impl Region {
    /// Renders the region as a mask aligned with a `width x height` source grid.
    /// Cells outside those bounds are skipped.
    pub fn to_mask_image(&self, width: u32, height: u32) -> GrayImage {
        let mut mask = GrayImage::new(width, height);
        for cell in &self.cells {
            let (x, y) = (cell.x as u32, cell.y as u32);
            if x < width && y < height {
                mask.put_pixel(x, y, Luma([MASK_INSIDE]));
            }
        }
        mask
    }

    /// Writes the mask as a PNG at `path` plus a `.pgw` world file beside it,
    /// so the mask lands on the source frame's map position.
    pub fn save_mask(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        transform: &GeoTransform,
    ) -> Result<()> {
        self.to_mask_image(width, height).save(path)?;
        std::fs::write(path.with_extension("pgw"), transform.world_file())?;
        Ok(())
    }
}

/// The regions of one scene, split by tier.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegionSet {
    pub hot: Vec<Region>,
    pub extreme: Vec<Region>,
}

impl RegionSet {
    pub fn tier(&self, severity: Severity) -> &[Region] {
        match severity {
            Severity::Hot => &self.hot,
            Severity::Extreme => &self.extreme,
            Severity::Background => &[],
        }
    }

    /// Sum of region areas for one tier.
    pub fn total_area(&self, severity: Severity) -> f64 {
        self.tier(severity).iter().map(|r| r.area_m2).sum()
    }

    pub fn len(&self) -> usize {
        self.hot.len() + self.extreme.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hot.is_empty() && self.extreme.is_empty()
    }

    /// Extreme regions first, then hot.
    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.extreme.iter().chain(self.hot.iter())
    }
}
