// src/geometry.rs - boundary pixel extraction and polygon measurements

use std::collections::BTreeMap;

use crate::config::PixelConvention;
use crate::errors::{CellWallError, Result};
use crate::labeling::LabelMap;
use crate::preprocessing::BinaryMask;

/// Continuous (x, y) coordinate, x along columns and y along rows
pub type Point = (f64, f64);

/// Pixel coordinate (x = column, y = row)
pub type PixelCoord = (u32, u32);

/// Boundary pixels of one region ordered by angle around their mean position.
/// The vertex list is implicitly closed.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedPolygon {
    pub centroid: Point,
    pub vertices: Vec<Point>,
}

impl OrderedPolygon {
    pub fn area(&self) -> f64 {
        polygon_area(&self.vertices)
    }

    pub fn perimeter(&self) -> f64 {
        polygon_perimeter(&self.vertices)
    }

    /// Area and perimeter under the given pixel convention
    pub fn measure(&self, convention: PixelConvention) -> (f64, f64) {
        match convention {
            PixelConvention::Centre => (self.area(), self.perimeter()),
            PixelConvention::Covered => (covered_area(&self.vertices), self.perimeter() + 4.0),
        }
    }
}

/// Group edge pixels by label in a single raster pass.
///
/// A pixel belongs to its label's boundary when the boundary mask is 0 there. Background
/// is skipped, and labels whose pixels are all interior never appear in the output.
pub fn extract_boundary_pixels(
    label_map: &LabelMap,
    boundary: &BinaryMask,
) -> Result<BTreeMap<u32, Vec<PixelCoord>>> {
    if boundary.dimensions() != label_map.dimensions() {
        return Err(CellWallError::DimensionMismatch {
            expected: label_map.dimensions(),
            found: boundary.dimensions(),
        });
    }

    let mut edges: BTreeMap<u32, Vec<PixelCoord>> = BTreeMap::new();
    for (x, y, p) in boundary.enumerate_pixels() {
        let label = label_map.get(x, y);
        if label != 0 && p[0] == 0 {
            edges.entry(label).or_default().push((x, y));
        }
    }

    Ok(edges)
}

/// Order points by `atan2(y - ȳ, x - x̄)` around their mean position.
///
/// The sort is stable: points at exactly the same angle keep their input order (raster order
/// for extracted boundaries). That tie order carries no geometric meaning, so regions with
/// several boundary pixels on one ray from the centroid (thin diagonal walls) can come out
/// with a distorted outline.
pub fn order_angularly(points: &[PixelCoord]) -> Result<OrderedPolygon> {
    if points.is_empty() {
        return Err(CellWallError::DegenerateRegion {
            label: None,
            reason: "no boundary points to order".to_string(),
        });
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|&(x, _)| x as f64).sum::<f64>() / n;
    let mean_y = points.iter().map(|&(_, y)| y as f64).sum::<f64>() / n;

    let mut by_angle: Vec<(f64, Point)> = points
        .iter()
        .map(|&(x, y)| {
            let (x, y) = (x as f64, y as f64);
            ((y - mean_y).atan2(x - mean_x), (x, y))
        })
        .collect();
    by_angle.sort_by(|a, b| a.0.total_cmp(&b.0));

    Ok(OrderedPolygon {
        centroid: (mean_x, mean_y),
        vertices: by_angle.into_iter().map(|(_, p)| p).collect(),
    })
}

/// Shoelace sum over consecutive vertices, closing last to first. Positive for
/// counter-clockwise order in a y-up frame.
pub fn signed_area(vertices: &[Point]) -> f64 {
    let n = vertices.len();
    let mut total = 0.0;
    for i in 0..n {
        let (x1, y1) = vertices[i];
        let (x2, y2) = vertices[(i + 1) % n];
        total += x1 * y2 - y1 * x2;
    }
    total / 2.0
}

/// Unsigned polygon area. Fewer than three or collinear vertices give 0.
pub fn polygon_area(vertices: &[Point]) -> f64 {
    signed_area(vertices).abs()
}

/// Sum of edge lengths including the closing edge
pub fn polygon_perimeter(vertices: &[Point]) -> f64 {
    let n = vertices.len();
    (0..n)
        .map(|i| {
            let (x1, y1) = vertices[i];
            let (x2, y2) = vertices[(i + 1) % n];
            (x2 - x1).hypot(y2 - y1)
        })
        .sum()
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Number of integer lattice points on the closed outline
pub fn lattice_boundary_points(vertices: &[Point]) -> u64 {
    let n = vertices.len();
    (0..n)
        .map(|i| {
            let (x1, y1) = vertices[i];
            let (x2, y2) = vertices[(i + 1) % n];
            let dx = (x2 - x1).round().abs() as u64;
            let dy = (y2 - y1).round().abs() as u64;
            gcd(dx, dy)
        })
        .sum()
}

/// Pixels covered by a polygon through pixel centres, boundary pixels included
/// (Pick's theorem: `A + B/2 + 1`)
pub fn covered_area(vertices: &[Point]) -> f64 {
    if vertices.is_empty() {
        return 0.0;
    }
    polygon_area(vertices) + lattice_boundary_points(vertices) as f64 / 2.0 + 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Connectivity;
    use crate::labeling::{boundary_mask, label};
    use assert_approx_eq::assert_approx_eq;
    use image::Luma;

    fn square_ring(side: u32) -> Vec<PixelCoord> {
        let mut ring = Vec::new();
        for y in 0..side {
            for x in 0..side {
                if x == 0 || y == 0 || x == side - 1 || y == side - 1 {
                    ring.push((x, y));
                }
            }
        }
        ring
    }

    #[test]
    fn unit_square_area_is_one() {
        let square = vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        assert_approx_eq!(polygon_area(&square), 1.0);
        assert_approx_eq!(polygon_perimeter(&square), 4.0);
    }

    #[test]
    fn area_is_rotation_invariant_and_flips_sign_on_reversal() {
        let poly = vec![(0.0, 0.0), (4.0, 0.0), (5.0, 3.0), (1.0, 4.0)];
        let base = signed_area(&poly);

        for shift in 1..poly.len() {
            let mut rotated = poly.clone();
            rotated.rotate_left(shift);
            assert_approx_eq!(signed_area(&rotated), base);
        }

        let reversed: Vec<Point> = poly.iter().rev().cloned().collect();
        assert_approx_eq!(signed_area(&reversed), -base);
        assert_approx_eq!(polygon_area(&reversed), polygon_area(&poly));
    }

    #[test]
    fn square_perimeter_is_four_sides() {
        let s = 7.0;
        let square = vec![(0.0, 0.0), (s, 0.0), (s, s), (0.0, s)];
        assert_approx_eq!(polygon_perimeter(&square), 4.0 * s);
    }

    #[test]
    fn degenerate_polygons_have_zero_area() {
        assert_eq!(polygon_area(&[]), 0.0);
        assert_eq!(polygon_area(&[(2.0, 3.0)]), 0.0);
        assert_eq!(polygon_area(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]), 0.0);
        assert_eq!(polygon_perimeter(&[(2.0, 3.0)]), 0.0);
    }

    #[test]
    fn angular_order_is_non_decreasing() {
        let ring = square_ring(6);
        let polygon = order_angularly(&ring).unwrap();
        assert_eq!(polygon.vertices.len(), ring.len());

        let (cx, cy) = polygon.centroid;
        let angles: Vec<f64> = polygon
            .vertices
            .iter()
            .map(|&(x, y)| (y - cy).atan2(x - cx))
            .collect();
        assert!(angles.windows(2).all(|w| w[0] <= w[1]));
        assert!(angles[0] >= -std::f64::consts::PI && *angles.last().unwrap() <= std::f64::consts::PI);
    }

    #[test]
    fn angle_ties_keep_every_point_in_input_order() {
        // Centroid is (1, 1); the duplicated centre point ties with itself at angle 0
        let points = vec![(0, 0), (1, 1), (2, 2), (0, 2), (2, 0), (1, 1)];
        let polygon = order_angularly(&points).unwrap();
        assert_eq!(polygon.vertices.len(), points.len());

        let duplicates = polygon.vertices.iter().filter(|&&v| v == (1.0, 1.0)).count();
        assert_eq!(duplicates, 2);
    }

    #[test]
    fn empty_point_set_is_degenerate() {
        assert!(matches!(
            order_angularly(&[]),
            Err(CellWallError::DegenerateRegion { .. })
        ));
    }

    #[test]
    fn filled_square_measures_under_both_conventions() {
        let polygon = order_angularly(&square_ring(10)).unwrap();

        let (area, perimeter) = polygon.measure(PixelConvention::Centre);
        assert_approx_eq!(area, 81.0);
        assert_approx_eq!(perimeter, 36.0);

        let (area, perimeter) = polygon.measure(PixelConvention::Covered);
        assert_approx_eq!(area, 100.0);
        assert_approx_eq!(perimeter, 40.0);
    }

    #[test]
    fn covered_convention_counts_tiny_regions() {
        let single = order_angularly(&[(4, 4)]).unwrap();
        assert_eq!(single.measure(PixelConvention::Covered), (1.0, 4.0));
        assert_eq!(single.measure(PixelConvention::Centre), (0.0, 0.0));

        let pair = order_angularly(&[(4, 4), (5, 4)]).unwrap();
        assert_eq!(pair.measure(PixelConvention::Covered), (2.0, 6.0));
    }

    #[test]
    fn extraction_groups_edges_by_label() {
        let mask = image::GrayImage::from_fn(12, 6, |x, y| {
            let inside = (1..5).contains(&y) && ((1..5).contains(&x) || (7..11).contains(&x));
            Luma([inside as u8])
        });
        let labels = label(&mask, Connectivity::Four);
        let boundary = boundary_mask(&labels, Connectivity::Four);

        let edges = extract_boundary_pixels(&labels, &boundary).unwrap();
        assert_eq!(edges.keys().cloned().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(edges[&1].len(), 12);
        assert_eq!(edges[&2].len(), 12);
        assert!(edges[&1].iter().all(|&(x, _)| x < 6));
    }
}
