// src/lib.rs - Library interface for cell wall width measurement

pub mod config;
pub mod errors;
pub mod geometry;
pub mod image_io;
pub mod image_utils;
pub mod labeling;
pub mod measurement;
pub mod morphology;
pub mod output;
pub mod pipeline;
pub mod preprocessing;
pub mod wall_width;

// Re-export commonly used types and functions
pub use config::{Connectivity, PixelConvention, Preset, ProcessingConfig, StructuringElement, ThresholdSpec};
pub use errors::{CellWallError, Result};
pub use image_io::{load_image, save_image, InputImage};
pub use pipeline::{process_image, run, MeasurementSession};

pub use labeling::{boundary_mask, centroids, label, Centroid, LabelMap};
pub use geometry::{order_angularly, polygon_area, polygon_perimeter, OrderedPolygon};
pub use measurement::{measure, measure_labelled, CellMeasurements, MeasurementRecord, MeasurementWarning};
pub use morphology::{close, dilate, erode, open};
pub use preprocessing::{equalize_histogram, preprocess, resolve_threshold};
pub use wall_width::{estimate_widths, WidthEstimator, WidthHistogram, WidthStep};
