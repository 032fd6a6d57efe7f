// THEORY:
// A north-up affine georeference for a scene grid. Region boundaries are traced
// along pixel edges in grid space and then pushed through `corner_to_map` so the
// exported polygons land on the same map coordinates as the source raster.

use serde::{Deserialize, Serialize};

/// Affine transform without rotation terms.
///
/// ```text
/// map_x = origin_x + col * pixel_width
/// map_y = origin_y + row * pixel_height
/// ```
///
/// For north-up imagery `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// Map X of the upper-left corner of the upper-left pixel.
    pub origin_x: f64,
    /// Map Y of the upper-left corner of the upper-left pixel.
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl Default for GeoTransform {
    /// Identity-like transform: one map unit per pixel, Y pointing down.
    fn default() -> Self {
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            pixel_width: 1.0,
            pixel_height: 1.0,
        }
    }
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Map coordinates of a pixel *corner*. Corner `(col, row)` is the upper-left
    /// corner of pixel `(col, row)`; `(width, height)` is the far corner of the grid.
    pub fn corner_to_map(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + col as f64 * self.pixel_width,
            self.origin_y + row as f64 * self.pixel_height,
        )
    }

    /// Map coordinates of a pixel center.
    pub fn center_to_map(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Footprint of one pixel in squared map units.
    pub fn pixel_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height).abs()
    }

    /// The six-line ESRI world file placing a raster exported on this grid.
    /// Line five and six hold the center of the upper-left pixel.
    pub fn world_file(&self) -> String {
        let (x, y) = self.center_to_map(0, 0);
        format!(
            "{}\n0\n0\n{}\n{}\n{}\n",
            self.pixel_width, self.pixel_height, x, y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corner_and_center_north_up() {
        let gt = GeoTransform::new(500_000.0, 4_200_000.0, 30.0, -30.0);
        assert_eq!(gt.corner_to_map(0, 0), (500_000.0, 4_200_000.0));
        assert_eq!(gt.corner_to_map(2, 1), (500_060.0, 4_199_970.0));
        assert_eq!(gt.center_to_map(0, 0), (500_015.0, 4_199_985.0));
        assert_eq!(gt.pixel_area(), 900.0);
    }

    #[test]
    fn test_world_file_points_at_first_pixel_center() {
        let gt = GeoTransform::new(500_000.0, 4_200_000.0, 30.0, -30.0);
        let world_file = gt.world_file();
        let lines: Vec<&str> = world_file.lines().collect();
        assert_eq!(lines, ["30", "0", "0", "-30", "500015", "4199985"]);
    }
}
