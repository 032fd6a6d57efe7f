// THEORY:
// A `RadianceFrame` is one scene's worth of calibrated radiance, handed to the
// engine by whatever acquired it. It is built once and then only read.
//
// Key architectural principles:
// 1.  **Two diagnostic channels**: channel A is SWIR2 (2.2 um, OLI B7) and
//     channel B is SWIR1 (1.6 um, OLI B6). Both are required.
// 2.  **Optional auxiliary bands**: NIR (OLI B5) sharpens the SWNIR index and the
//     coastal band (OLI B1) feeds the saturated-extreme test. Neither is needed
//     for the core algorithm.
// 3.  **Validity is data**: a mask bit plus finiteness of the radiances decide
//     whether a cell takes part in any statistic. Clouds, scan gaps and fill
//     values all arrive as invalid cells.
// 4.  **Shapes are not trusted**: the frame accepts bands of any shape so the
//     mismatch can be reported as a scene-local `ShapeMismatch` by the stage
//     that consumes it, instead of panicking at construction.

use crate::core_modules::geo_transform::GeoTransform;
use crate::core_modules::grid::Grid;
use crate::error::{NhiError, Result};

#[derive(Debug, Clone)]
pub struct RadianceFrame {
    channel_a: Grid<f64>,
    channel_b: Grid<f64>,
    nir: Option<Grid<f64>>,
    coastal: Option<Grid<f64>>,
    /// `None` means every cell is observed.
    valid: Option<Grid<bool>>,
    transform: GeoTransform,
    pixel_area_m2: f64,
}

impl RadianceFrame {
    /// Creates a frame from the two diagnostic bands. Georeferencing defaults to
    /// one map unit per pixel until `with_transform` is called.
    pub fn new(channel_a: Grid<f64>, channel_b: Grid<f64>) -> Self {
        let transform = GeoTransform::default();
        Self {
            channel_a,
            channel_b,
            nir: None,
            coastal: None,
            valid: None,
            pixel_area_m2: transform.pixel_area(),
            transform,
        }
    }

    pub fn with_valid_mask(mut self, valid: Grid<bool>) -> Self {
        self.valid = Some(valid);
        self
    }

    pub fn with_nir(mut self, nir: Grid<f64>) -> Self {
        self.nir = Some(nir);
        self
    }

    pub fn with_coastal(mut self, coastal: Grid<f64>) -> Self {
        self.coastal = Some(coastal);
        self
    }

    /// Sets the georeference. The pixel area follows the transform unless it is
    /// overridden afterwards with `with_pixel_area`.
    pub fn with_transform(mut self, transform: GeoTransform) -> Self {
        self.transform = transform;
        self.pixel_area_m2 = transform.pixel_area();
        self
    }

    /// Overrides the physical area of one cell, for grids whose map units are not metres.
    pub fn with_pixel_area(mut self, pixel_area_m2: f64) -> Self {
        self.pixel_area_m2 = pixel_area_m2;
        self
    }

    pub fn width(&self) -> usize {
        self.channel_a.width()
    }

    pub fn height(&self) -> usize {
        self.channel_a.height()
    }

    pub fn len(&self) -> usize {
        self.channel_a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel_a.is_empty()
    }

    pub fn channel_a(&self) -> &Grid<f64> {
        &self.channel_a
    }

    pub fn channel_b(&self) -> &Grid<f64> {
        &self.channel_b
    }

    pub fn nir(&self) -> Option<&Grid<f64>> {
        self.nir.as_ref()
    }

    pub fn coastal(&self) -> Option<&Grid<f64>> {
        self.coastal.as_ref()
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn pixel_area_m2(&self) -> f64 {
        self.pixel_area_m2
    }

    /// Verifies that every band and the mask share channel A's dimensions.
    pub fn check_shapes(&self) -> Result<()> {
        check_band("channel_b", &self.channel_a, &self.channel_b)?;
        if let Some(valid) = &self.valid {
            check_band("valid_mask", &self.channel_a, valid)?;
        }
        if let Some(nir) = &self.nir {
            check_band("nir", &self.channel_a, nir)?;
        }
        if let Some(coastal) = &self.coastal {
            check_band("coastal", &self.channel_a, coastal)?;
        }
        Ok(())
    }

    /// Whether the cell at flat `index` takes part in statistics.
    /// Assumes `check_shapes` has passed.
    #[inline]
    pub fn is_valid(&self, index: usize) -> bool {
        let masked_in = self.valid.as_ref().is_none_or(|mask| *mask.at(index));
        masked_in && self.channel_a.at(index).is_finite() && self.channel_b.at(index).is_finite()
    }

    /// Number of cells that pass `is_valid`.
    pub fn valid_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_valid(i)).count()
    }
}

fn check_band<T, U>(band: &'static str, reference: &Grid<T>, other: &Grid<U>) -> Result<()> {
    if reference.same_shape(other) {
        return Ok(());
    }
    Err(NhiError::ShapeMismatch {
        band,
        expected_width: reference.width(),
        expected_height: reference.height(),
        actual_width: other.width(),
        actual_height: other.height(),
    })
}
