// src/labeling.rs - connected-component labeling, centroids and the boundary indicator

use std::collections::BTreeMap;

use image::{ImageBuffer, Luma};
use imageproc::region_labelling::{self, connected_components};

use crate::config::Connectivity;
use crate::errors::{CellWallError, Result};
use crate::image_utils::in_bounds;
use crate::preprocessing::BinaryMask;

/// Raw per-pixel label storage
pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Per-pixel region labels: 0 is background, regions are numbered 1..=count
/// in the raster order in which they are first met.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMap {
    labels: LabelImage,
    count: u32,
}

/// Mean position of a region's pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroid {
    pub row: f64,
    pub col: f64,
}

impl LabelMap {
    /// Wrap an existing label image, renumbering its non-zero values contiguously in raster
    /// discovery order. Pixels that shared a value keep sharing one.
    pub fn from_labels(labels: LabelImage) -> Self {
        let mut renumbered = labels;
        let mut mapping: BTreeMap<u32, u32> = BTreeMap::new();
        let mut next = 1u32;

        for p in renumbered.pixels_mut() {
            if p[0] == 0 {
                continue;
            }
            let assigned = *mapping.entry(p[0]).or_insert_with(|| {
                let label = next;
                next += 1;
                label
            });
            p[0] = assigned;
        }

        Self {
            labels: renumbered,
            count: next - 1,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.labels.dimensions()
    }

    /// Number of non-background regions
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.labels.get_pixel(x, y)[0]
    }

    pub fn image(&self) -> &LabelImage {
        &self.labels
    }

    /// Labels 1..=count
    pub fn labels(&self) -> Vec<u32> {
        (1..=self.count).collect()
    }

    /// 1 wherever a region is present
    pub fn foreground_mask(&self) -> BinaryMask {
        let (width, height) = self.dimensions();
        BinaryMask::from_fn(width, height, |x, y| Luma([(self.get(x, y) != 0) as u8]))
    }
}

/// Label every maximal connected set of foreground pixels
pub fn label(mask: &BinaryMask, connectivity: Connectivity) -> LabelMap {
    let conn = match connectivity {
        Connectivity::Four => region_labelling::Connectivity::Four,
        Connectivity::Eight => region_labelling::Connectivity::Eight,
    };
    LabelMap::from_labels(connected_components(mask, conn, Luma([0u8])))
}

/// Centroid of each requested label, counting only pixels that are also foreground in `mask`.
/// Labels with no such pixels are left out of the result.
pub fn centroids(
    mask: &BinaryMask,
    label_map: &LabelMap,
    labels: &[u32],
) -> Result<BTreeMap<u32, Centroid>> {
    if mask.dimensions() != label_map.dimensions() {
        return Err(CellWallError::DimensionMismatch {
            expected: label_map.dimensions(),
            found: mask.dimensions(),
        });
    }

    let mut sums: BTreeMap<u32, (f64, f64, u64)> =
        labels.iter().map(|&l| (l, (0.0, 0.0, 0))).collect();

    for (x, y, p) in mask.enumerate_pixels() {
        if p[0] == 0 {
            continue;
        }
        if let Some(entry) = sums.get_mut(&label_map.get(x, y)) {
            entry.0 += y as f64;
            entry.1 += x as f64;
            entry.2 += 1;
        }
    }

    Ok(sums
        .into_iter()
        .filter(|(_, (_, _, n))| *n > 0)
        .map(|(label, (row_sum, col_sum, n))| {
            (
                label,
                Centroid {
                    row: row_sum / n as f64,
                    col: col_sum / n as f64,
                },
            )
        })
        .collect())
}

/// Erosion applied to the label map itself: 1 at pixels whose whole neighbourhood carries
/// their own label, 0 at region edges (next to another label, background or the image border)
/// and on background.
pub fn boundary_mask(label_map: &LabelMap, connectivity: Connectivity) -> BinaryMask {
    let (width, height) = label_map.dimensions();
    let offsets = connectivity.neighbourhood().offsets();

    BinaryMask::from_fn(width, height, |x, y| {
        let own = label_map.get(x, y);
        if own == 0 {
            return Luma([0]);
        }
        let interior = offsets.iter().all(|&(dx, dy)| {
            let nx = x as i32 + dx;
            let ny = y as i32 + dy;
            in_bounds(nx, ny, width, height) && label_map.get(nx as u32, ny as u32) == own
        });
        Luma([interior as u8])
    })
}
