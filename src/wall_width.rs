// src/wall_width.rs - cell wall width distribution by iterative dilation
//
// Two regions separated by a wall of width w join once each side has grown by w/2 pixels,
// so counting how many regions disappear after every single-pixel dilation recovers the
// wall width histogram without tracing the walls themselves.

use log::{debug, info};

use crate::config::Connectivity;
use crate::errors::{CellWallError, Result};
use crate::labeling::{label, LabelMap};
use crate::morphology::{check_element, dilate_once};
use crate::preprocessing::BinaryMask;

/// Outcome of one dilation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidthStep {
    pub step: u32,
    /// `2 * step`
    pub pixel_width: u32,
    pub region_count: u32,
    /// Regions lost since the undilated mask
    pub merged_total: i64,
    /// Regions lost during this step alone
    pub new_merges: i64,
}

/// One histogram row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistogramEntry {
    pub pixel_width: u32,
    pub count: i64,
}

/// Wall width histogram over the completed dilation steps
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WidthHistogram {
    pub entries: Vec<HistogramEntry>,
    /// One pixel width per merge event
    pub observations: Vec<u32>,
    pub total_initial_regions: u32,
    pub final_region_count: u32,
    /// Largest cumulative merge count seen (plot axis scaling)
    pub max_merged: i64,
}

/// Histogram plus the label image left after the last dilation
#[derive(Debug, Clone)]
pub struct WidthDistribution {
    pub histogram: WidthHistogram,
    pub final_labels: LabelMap,
}

/// Step-by-step dilation driver.
///
/// Iterating yields one [`WidthStep`] per dilation so a caller can stop between steps;
/// [`WidthEstimator::finish`] runs whatever is left.
pub struct WidthEstimator {
    /// Neighbourhood offsets, checked against the mask size in `new`
    offsets: Vec<(i32, i32)>,
    connectivity: Connectivity,
    max_iterations: u32,
    step: u32,
    current: BinaryMask,
    labels: LabelMap,
    previous_merged: i64,
    histogram: WidthHistogram,
}

impl WidthEstimator {
    /// Start from `mask` (the opened/closed segmentation). Each step dilates by the
    /// `connectivity` neighbourhood, so merges are judged by the same rule used for labeling.
    /// Runs steps `1..max_iterations`.
    pub fn new(mask: &BinaryMask, connectivity: Connectivity, max_iterations: u32) -> Result<Self> {
        if max_iterations == 0 {
            return Err(CellWallError::Config(
                "dilation_iterations must be >= 1".to_string(),
            ));
        }

        let element = connectivity.neighbourhood();
        check_element(mask, &element)?;

        let labels = label(mask, connectivity);
        let total = labels.count();
        info!("Number of objects before dilation: {}", total);

        Ok(Self {
            offsets: element.offsets(),
            connectivity,
            max_iterations,
            step: 0,
            current: mask.clone(),
            labels,
            previous_merged: 0,
            histogram: WidthHistogram {
                total_initial_regions: total,
                final_region_count: total,
                ..Default::default()
            },
        })
    }

    pub fn total_initial_regions(&self) -> u32 {
        self.histogram.total_initial_regions
    }

    /// Labels of the most recently dilated mask
    pub fn current_labels(&self) -> &LabelMap {
        &self.labels
    }

    /// Keep stepping while `keep_going` approves each finished step, then return what was
    /// collected. Returning `false` stops after the step it was shown.
    pub fn run_while<F>(mut self, mut keep_going: F) -> WidthDistribution
    where
        F: FnMut(&WidthStep) -> bool,
    {
        while let Some(step) = self.next() {
            if !keep_going(&step) {
                debug!("Dilation stopped by caller after step {}", step.step);
                break;
            }
        }
        self.into_distribution()
    }

    /// Run all remaining steps
    pub fn finish(self) -> WidthDistribution {
        self.run_while(|_| true)
    }

    fn into_distribution(self) -> WidthDistribution {
        WidthDistribution {
            histogram: self.histogram,
            final_labels: self.labels,
        }
    }
}

impl Iterator for WidthEstimator {
    type Item = WidthStep;

    fn next(&mut self) -> Option<WidthStep> {
        if self.step + 1 >= self.max_iterations {
            return None;
        }
        self.step += 1;

        self.current = dilate_once(&self.current, &self.offsets);
        self.labels = label(&self.current, self.connectivity);

        let region_count = self.labels.count();
        let merged_total = self.histogram.total_initial_regions as i64 - region_count as i64;
        let new_merges = merged_total - self.previous_merged;
        let pixel_width = 2 * self.step;

        debug!(
            "{} cell walls with width of {} pixels ({} regions left)",
            new_merges, pixel_width, region_count
        );

        self.histogram.entries.push(HistogramEntry {
            pixel_width,
            count: new_merges,
        });
        if new_merges > 0 {
            self.histogram
                .observations
                .extend(std::iter::repeat(pixel_width).take(new_merges as usize));
        }
        self.histogram.final_region_count = region_count;
        self.histogram.max_merged = self.histogram.max_merged.max(merged_total);
        self.previous_merged = merged_total;

        Some(WidthStep {
            step: self.step,
            pixel_width,
            region_count,
            merged_total,
            new_merges,
        })
    }
}

/// Run the full estimation over `mask`
pub fn estimate_widths(
    mask: &BinaryMask,
    connectivity: Connectivity,
    max_iterations: u32,
) -> Result<WidthDistribution> {
    let distribution = WidthEstimator::new(mask, connectivity, max_iterations)?.finish();
    info!(
        "Wall widths: {} merge events over {} dilation steps",
        distribution.histogram.observations.len(),
        distribution.histogram.entries.len()
    );
    Ok(distribution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn squares(width: u32, height: u32, squares: &[(u32, u32, u32)]) -> BinaryMask {
        BinaryMask::from_fn(width, height, |x, y| {
            let hit = squares
                .iter()
                .any(|&(sx, sy, side)| x >= sx && x < sx + side && y >= sy && y < sy + side);
            Luma([hit as u8])
        })
    }

    #[test]
    fn two_squares_with_four_pixel_gap_merge_at_width_four() {
        // Squares cover columns 3..8 and 12..17; the gap is columns 8..12
        let mask = squares(20, 20, &[(3, 7, 5), (12, 7, 5)]);
        let distribution = estimate_widths(&mask, Connectivity::Four, 6).unwrap();
        let histogram = distribution.histogram;

        let counts: Vec<(u32, i64)> = histogram.entries.iter().map(|e| (e.pixel_width, e.count)).collect();
        assert_eq!(counts, vec![(2, 0), (4, 1), (6, 0), (8, 0), (10, 0)]);
        assert_eq!(histogram.observations, vec![4]);
        assert_eq!(histogram.total_initial_regions, 2);
        assert_eq!(histogram.final_region_count, 1);
        assert_eq!(histogram.max_merged, 1);
        assert_eq!(distribution.final_labels.count(), 1);
    }

    #[test]
    fn merge_counts_sum_to_lost_regions_and_accumulate_monotonically() {
        let mask = squares(
            60,
            30,
            &[(2, 2, 6), (10, 2, 6), (24, 2, 6), (2, 14, 6), (40, 14, 8), (52, 20, 5)],
        );
        let estimator = WidthEstimator::new(&mask, Connectivity::Four, 12).unwrap();
        let total = estimator.total_initial_regions() as i64;

        let steps: Vec<WidthStep> = estimator.collect();
        assert_eq!(steps.len(), 11);
        assert!(steps.windows(2).all(|w| w[0].merged_total <= w[1].merged_total));

        let sum: i64 = steps.iter().map(|s| s.new_merges).sum();
        let last = steps.last().unwrap();
        assert_eq!(sum, total - last.region_count as i64);
    }

    #[test]
    fn caller_can_stop_between_steps() {
        let mask = squares(20, 20, &[(3, 7, 5), (12, 7, 5)]);
        let estimator = WidthEstimator::new(&mask, Connectivity::Four, 15).unwrap();

        let distribution = estimator.run_while(|step| step.step < 2);
        assert_eq!(distribution.histogram.entries.len(), 2);
        assert_eq!(distribution.histogram.observations, vec![4]);
    }

    #[test]
    fn single_iteration_runs_no_steps() {
        let mask = squares(10, 10, &[(1, 1, 3), (6, 6, 3)]);
        let distribution = estimate_widths(&mask, Connectivity::Four, 1).unwrap();
        assert!(distribution.histogram.entries.is_empty());
        assert_eq!(distribution.histogram.final_region_count, 2);
    }

    #[test]
    fn every_step_runs_when_element_fills_the_mask() {
        // 3x3 mask, same size as the neighbourhood element
        let mask = squares(3, 3, &[(0, 0, 1), (2, 2, 1)]);
        for connectivity in [Connectivity::Four, Connectivity::Eight] {
            let steps: Vec<WidthStep> = WidthEstimator::new(&mask, connectivity, 5).unwrap().collect();
            assert_eq!(steps.iter().map(|s| s.step).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
            assert_eq!(steps.last().unwrap().region_count, 1);
        }
    }

    #[test]
    fn element_larger_than_mask_is_rejected_up_front() {
        let mask = squares(2, 2, &[(0, 0, 1)]);
        assert!(matches!(
            WidthEstimator::new(&mask, Connectivity::Four, 5),
            Err(CellWallError::Config(_))
        ));
    }

    #[test]
    fn zero_iterations_is_a_configuration_error() {
        let mask = squares(10, 10, &[(1, 1, 3)]);
        assert!(matches!(
            WidthEstimator::new(&mask, Connectivity::Four, 0),
            Err(CellWallError::Config(_))
        ));
    }

    #[test]
    fn diagonal_neighbours_merge_earlier_with_eight_connectivity() {
        // Diagonally offset squares: corners are two pixels apart on both axes
        let mask = squares(20, 20, &[(2, 2, 5), (9, 9, 5)]);
        let four = estimate_widths(&mask, Connectivity::Four, 6).unwrap().histogram;
        let eight = estimate_widths(&mask, Connectivity::Eight, 6).unwrap().histogram;

        assert_eq!(four.observations.len(), 1);
        assert_eq!(eight.observations.len(), 1);
        assert!(eight.observations[0] < four.observations[0]);
    }
}
