pub mod boundary;
pub mod contextual_thresholder;
pub mod geo_transform;
pub mod grid;
pub mod index_computer;
pub mod pixel_classifier;
pub mod radiance_frame;
pub mod region;
pub mod region_extractor;
pub mod scene_summarizer;
pub mod time_series;
