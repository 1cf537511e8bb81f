// src/measurement.rs - segmentation and per-cell area / perimeter measurement

use std::collections::BTreeMap;
use std::fmt;

use image::DynamicImage;
use log::{debug, info, warn};

use crate::config::ProcessingConfig;
use crate::errors::{CellWallError, Result};
use crate::geometry::{extract_boundary_pixels, order_angularly};
use crate::labeling::{boundary_mask, centroids, label, Centroid, LabelMap};
use crate::morphology::{close, open};
use crate::preprocessing::{preprocess, BinaryMask, RasterImage};

/// Area and perimeter of one labeled region. A field is `None` when the value did not
/// pass its cutoff; regions failing both are still listed.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub label: u32,
    pub area: Option<f64>,
    pub perimeter: Option<f64>,
    pub boundary_pixels: usize,
}

/// Recoverable numeric degeneracies met during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeasurementWarning {
    /// Input had a single intensity; equalization fell back to the identity mapping
    FlatHistogram,
    /// Region outline has zero length (a single boundary pixel)
    ZeroPerimeter { label: u32 },
    /// Region could not be turned into a polygon and was skipped
    DegenerateRegion { label: u32 },
}

impl fmt::Display for MeasurementWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementWarning::FlatHistogram => {
                write!(f, "flat intensity histogram, equalization skipped")
            }
            MeasurementWarning::ZeroPerimeter { label } => {
                write!(f, "region {} has a zero-length outline", label)
            }
            MeasurementWarning::DegenerateRegion { label } => {
                write!(f, "region {} has no usable boundary and was skipped", label)
            }
        }
    }
}

/// Output of the segmentation and measurement stages
#[derive(Debug, Clone)]
pub struct CellMeasurements {
    /// Resolved threshold; `None` when measuring an already-labeled mask
    pub threshold: Option<f64>,
    pub greyscale: Option<RasterImage>,
    /// Foreground after opening and closing
    pub mask: BinaryMask,
    pub label_map: LabelMap,
    pub centroids: BTreeMap<u32, Centroid>,
    /// 1 at region interiors, 0 at edges and background
    pub boundary: BinaryMask,
    pub records: Vec<MeasurementRecord>,
    pub warnings: Vec<MeasurementWarning>,
}

/// Full image path: preprocess, open, close, label, then measure every region
pub fn measure(image: &DynamicImage, config: &ProcessingConfig) -> Result<CellMeasurements> {
    config.validate()?;

    let pre = preprocess(image, config)?;
    let opened = open(&pre.mask, &config.structuring_element, config.binary_open_iterations)?;
    let closed = close(&opened, &config.structuring_element, config.binary_close_iterations)?;

    let label_map = label(&closed, config.connectivity);
    info!("Number of objects: {}", label_map.count());

    let mut measurements = measure_regions(closed, label_map, config)?;
    measurements.threshold = Some(pre.threshold);
    measurements.greyscale = Some(pre.greyscale);
    if pre.equalized.degenerate {
        measurements.warnings.insert(0, MeasurementWarning::FlatHistogram);
    }

    Ok(measurements)
}

/// Measure an already-labeled image, skipping preprocessing and morphology
pub fn measure_labelled(label_map: LabelMap, config: &ProcessingConfig) -> Result<CellMeasurements> {
    config.validate()?;
    let mask = label_map.foreground_mask();
    measure_regions(mask, label_map, config)
}

/// Boundary extraction plus geometry for every label, with cutoffs applied independently.
/// `mask` restricts which pixels count towards the centroids.
pub fn measure_regions(
    mask: BinaryMask,
    label_map: LabelMap,
    config: &ProcessingConfig,
) -> Result<CellMeasurements> {
    if mask.dimensions() != label_map.dimensions() {
        return Err(CellWallError::DimensionMismatch {
            expected: label_map.dimensions(),
            found: mask.dimensions(),
        });
    }

    let boundary = boundary_mask(&label_map, config.connectivity);
    let centres = centroids(&mask, &label_map, &label_map.labels())?;
    let edges = extract_boundary_pixels(&label_map, &boundary)?;

    let mut records = Vec::with_capacity(edges.len());
    let mut warnings = Vec::new();

    for (&region, pixels) in &edges {
        let polygon = match order_angularly(pixels) {
            Ok(polygon) => polygon,
            Err(CellWallError::DegenerateRegion { reason, .. }) => {
                warn!("Skipping region {}: {}", region, reason);
                warnings.push(MeasurementWarning::DegenerateRegion { label: region });
                continue;
            }
            Err(e) => return Err(e),
        };

        if polygon.perimeter() == 0.0 {
            warn!("Region {} has a zero-length outline", region);
            warnings.push(MeasurementWarning::ZeroPerimeter { label: region });
        }

        let (area, perimeter) = polygon.measure(config.pixel_convention);
        debug!(
            "Region {}: {} boundary pixels, area {:.3}, perimeter {:.3}",
            region,
            pixels.len(),
            area,
            perimeter
        );

        records.push(MeasurementRecord {
            label: region,
            area: (area < config.area_cutoff).then_some(area),
            perimeter: (perimeter < config.perimeter_cutoff).then_some(perimeter),
            boundary_pixels: pixels.len(),
        });
    }

    info!(
        "Measured {} regions ({} areas and {} perimeters within cutoffs)",
        records.len(),
        records.iter().filter(|r| r.area.is_some()).count(),
        records.iter().filter(|r| r.perimeter.is_some()).count()
    );

    Ok(CellMeasurements {
        threshold: None,
        greyscale: None,
        mask,
        label_map,
        centroids: centres,
        boundary,
        records,
        warnings,
    })
}
