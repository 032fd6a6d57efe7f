//! JSON scene manifests: the on-disk form of a series of radiance frames.
//!
//! ```json
//! { "scenes": [ { "timestamp": "2021-03-14T09:40:00Z", "width": 2, "height": 1,
//!                 "channel_a": [10.0, 95.0], "channel_b": [20.0, 30.0] } ] }
//! ```
//!
//! `nir`, `coastal`, `valid`, `transform` and `pixel_area_m2` are optional.
//! Non-finite radiances can be written as `null`.
//!
//! A malformed entry does not fail the manifest. It is reported as a skipped
//! scene when its timestamp can still be read, and dropped with a warning
//! otherwise.

use anyhow::{Context, Result, ensure};
use chrono::{DateTime, Utc};
use nhi_vision::core_modules::geo_transform::GeoTransform;
use nhi_vision::core_modules::grid::Grid;
use nhi_vision::pipeline::{RadianceFrame, SkippedScene};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Scenes are kept as raw JSON until `into_frames` so one bad entry cannot
/// reject the whole file.
#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub scenes: Vec<Value>,
}

/// Frames ready for the engine, plus the entries that could not be built.
#[derive(Debug, Default)]
pub struct LoadedScenes {
    pub frames: Vec<(DateTime<Utc>, RadianceFrame)>,
    pub skipped: Vec<SkippedScene>,
}

#[derive(Debug, Deserialize)]
pub struct SceneEntry {
    pub timestamp: DateTime<Utc>,
    pub width: usize,
    pub height: usize,
    pub channel_a: Vec<Option<f64>>,
    pub channel_b: Vec<Option<f64>>,
    #[serde(default)]
    pub nir: Option<Vec<Option<f64>>>,
    #[serde(default)]
    pub coastal: Option<Vec<Option<f64>>>,
    #[serde(default)]
    pub valid: Option<Vec<bool>>,
    #[serde(default)]
    pub transform: Option<GeoTransform>,
    #[serde(default)]
    pub pixel_area_m2: Option<f64>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        let manifest: Manifest = serde_json::from_str(&text)
            .with_context(|| format!("parsing manifest {}", path.display()))?;
        ensure!(!manifest.scenes.is_empty(), "manifest {} lists no scenes", path.display());
        Ok(manifest)
    }

    pub fn into_frames(self) -> LoadedScenes {
        let mut loaded = LoadedScenes::default();
        for (position, raw) in self.scenes.into_iter().enumerate() {
            let timestamp = raw
                .get("timestamp")
                .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v.clone()).ok());
            let built = serde_json::from_value::<SceneEntry>(raw)
                .context("decoding scene entry")
                .and_then(SceneEntry::into_frame);
            match (built, timestamp) {
                (Ok(frame), _) => loaded.frames.push(frame),
                (Err(err), Some(timestamp)) => {
                    log::warn!("skipping manifest scene {timestamp}: {err:#}");
                    loaded.skipped.push(SkippedScene {
                        timestamp,
                        reason: format!("{err:#}"),
                    });
                }
                (Err(err), None) => {
                    log::warn!("dropping manifest entry {position} without a timestamp: {err:#}");
                }
            }
        }
        loaded
    }
}

impl SceneEntry {
    /// Builds the frame. Bands whose length disagrees with `width * height` are
    /// rejected here; bands of the right length but a different shape cannot
    /// occur in this format.
    pub fn into_frame(self) -> Result<(DateTime<Utc>, RadianceFrame)> {
        let (w, h) = (self.width, self.height);
        let band = |name: &str, values: Vec<Option<f64>>| {
            let values: Vec<f64> = values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
            Grid::from_vec(w, h, values)
                .with_context(|| format!("scene {}: band {name}", self.timestamp))
        };

        let mut frame = RadianceFrame::new(
            band("channel_a", self.channel_a)?,
            band("channel_b", self.channel_b)?,
        );
        if let Some(nir) = self.nir {
            frame = frame.with_nir(band("nir", nir)?);
        }
        if let Some(coastal) = self.coastal {
            frame = frame.with_coastal(band("coastal", coastal)?);
        }
        if let Some(valid) = self.valid {
            let mask = Grid::from_vec(w, h, valid)
                .with_context(|| format!("scene {}: valid mask", self.timestamp))?;
            frame = frame.with_valid_mask(mask);
        }
        if let Some(transform) = self.transform {
            frame = frame.with_transform(transform);
        }
        if let Some(area) = self.pixel_area_m2 {
            frame = frame.with_pixel_area(area);
        }
        Ok((self.timestamp, frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_with_optional_bands() {
        let json = r#"{
            "timestamp": "2021-03-14T09:40:00Z",
            "width": 2, "height": 1,
            "channel_a": [10.0, null],
            "channel_b": [20.0, 30.0],
            "valid": [true, true],
            "transform": {
                "origin_x": 500000.0, "origin_y": 4200000.0,
                "pixel_width": 30.0, "pixel_height": -30.0
            }
        }"#;
        let entry: SceneEntry = serde_json::from_str(json).unwrap();
        let (_, frame) = entry.into_frame().unwrap();
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.pixel_area_m2(), 900.0);
        assert_eq!(frame.valid_count(), 1);
    }

    #[test]
    fn test_wrong_band_length_is_rejected() {
        let json = r#"{ "timestamp": "2021-03-14T09:40:00Z", "width": 2, "height": 2,
                        "channel_a": [1.0, 2.0, 3.0], "channel_b": [1.0, 2.0, 3.0, 4.0] }"#;
        let entry: SceneEntry = serde_json::from_str(json).unwrap();
        assert!(entry.into_frame().is_err());
    }

    #[test]
    fn test_malformed_entries_do_not_fail_the_manifest() {
        let json = r#"{ "scenes": [
            { "timestamp": "2021-03-14T09:40:00Z", "width": 1, "height": 1,
              "channel_a": [10.0], "channel_b": [20.0] },
            { "timestamp": "2021-03-15T09:40:00Z", "width": 2, "height": 1,
              "channel_a": [10.0], "channel_b": [20.0, 21.0] },
            { "width": 1, "height": 1, "channel_a": [10.0], "channel_b": [20.0] },
            { "timestamp": "2021-03-16T09:40:00Z", "width": 1, "height": 1,
              "channel_a": "not a band", "channel_b": [20.0] },
            { "timestamp": "2021-03-17T09:40:00Z", "width": 1, "height": 1,
              "channel_a": [11.0], "channel_b": [20.0] }
        ] }"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        let loaded = manifest.into_frames();

        let kept: Vec<String> = loaded.frames.iter().map(|(t, _)| t.to_rfc3339()).collect();
        assert_eq!(kept, ["2021-03-14T09:40:00+00:00", "2021-03-17T09:40:00+00:00"]);

        let skipped: Vec<String> =
            loaded.skipped.iter().map(|s| s.timestamp.to_rfc3339()).collect();
        assert_eq!(skipped, ["2021-03-15T09:40:00+00:00", "2021-03-16T09:40:00+00:00"]);
        assert!(loaded.skipped[0].reason.contains("band channel_a"));
        assert!(loaded.skipped[1].reason.contains("decoding scene entry"));
    }
}
