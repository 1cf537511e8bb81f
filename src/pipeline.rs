// src/pipeline.rs - one complete measurement run per image

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use log::info;

use crate::config::ProcessingConfig;
use crate::errors::{CellWallError, Result};
use crate::image_io::{get_image_files_in_dir, save_image, InputImage};
use crate::image_utils::{labels_to_display, mask_to_display};
use crate::measurement::{measure, CellMeasurements};
use crate::output::{write_all_widths, write_area_perimeter, write_width_histogram};
use crate::wall_width::{WidthDistribution, WidthEstimator, WidthStep};

/// Everything one run produces. Owned by the caller; nothing is shared between runs.
#[derive(Debug, Clone)]
pub struct MeasurementSession {
    pub measurements: CellMeasurements,
    pub widths: WidthDistribution,
}

/// Measure cells, then estimate wall widths from the same opened and closed mask
pub fn run(image: &DynamicImage, config: &ProcessingConfig) -> Result<MeasurementSession> {
    run_while(image, config, |_| true)
}

/// As [`run`], but the dilation loop asks `keep_going` after every step
pub fn run_while<F>(
    image: &DynamicImage,
    config: &ProcessingConfig,
    keep_going: F,
) -> Result<MeasurementSession>
where
    F: FnMut(&WidthStep) -> bool,
{
    let measurements = measure(image, config)?;

    let widths = WidthEstimator::new(
        &measurements.mask,
        config.connectivity,
        config.dilation_iterations,
    )?
    .run_while(keep_going);

    Ok(MeasurementSession {
        measurements,
        widths,
    })
}

/// Process one input file: measure it and write its reports under `output_dir`.
/// In debug mode the boundary mask and the post-dilation labels are saved as PNGs too.
pub fn process_image<P: AsRef<Path>>(
    input_image: InputImage,
    config: &ProcessingConfig,
    output_dir: P,
    debug: bool,
) -> Result<MeasurementSession> {
    let InputImage {
        image,
        path,
        filename,
    } = input_image;
    let output_dir = output_dir.as_ref();

    info!("Measuring {}", path.display());
    let session = run(&image, config)?;

    fs::create_dir_all(output_dir).map_err(CellWallError::Io)?;
    write_area_perimeter(&session.measurements.records, output_dir, &filename)?;
    write_width_histogram(&session.widths.histogram, output_dir, &filename)?;
    write_all_widths(&session.widths.histogram, output_dir, &filename)?;

    if debug {
        let debug_dir = debug_dir(output_dir);
        save_image(
            &mask_to_display(&session.measurements.boundary),
            debug_dir.join(format!("{}_boundary.png", filename)),
        )?;
        save_image(
            &labels_to_display(&session.widths.final_labels),
            debug_dir.join(format!("{}_dilated_labels.png", filename)),
        )?;
    }

    info!(
        "{}: {} regions measured, {} wall observations",
        filename,
        session.measurements.records.len(),
        session.widths.histogram.observations.len()
    );

    Ok(session)
}

fn debug_dir(output_dir: &Path) -> PathBuf {
    output_dir.join("debug")
}

/// One scanned input and the directory its reports go to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub input: PathBuf,
    pub output_dir: PathBuf,
}

/// Scan `input_root` and give every image a report directory under `output_root` that
/// mirrors the subdirectory it was found in, so `a/wt.png` and `b/wt.png` report to
/// `a/wt.tsv` and `b/wt.tsv`.
///
/// Images in one directory sharing a stem (`wt.png` and `wt.tif`) would write the same
/// reports and fail the whole batch before anything is processed.
pub fn plan_batch<P: AsRef<Path>, Q: AsRef<Path>>(input_root: P, output_root: Q) -> Result<Vec<BatchItem>> {
    let input_root = input_root.as_ref();
    let output_root = output_root.as_ref();

    let mut claimed: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();
    let mut items = Vec::new();

    for input in get_image_files_in_dir(input_root)? {
        let relative = input
            .strip_prefix(input_root)
            .map_err(|_| CellWallError::InvalidPath(input.clone()))?
            .to_path_buf();

        if let Some(first) = claimed.insert(relative.with_extension(""), input.clone()) {
            return Err(CellWallError::Config(format!(
                "{} and {} would write the same reports",
                first.display(),
                input.display()
            )));
        }

        let output_dir = match relative.parent() {
            Some(sub) if !sub.as_os_str().is_empty() => output_root.join(sub),
            _ => output_root.to_path_buf(),
        };
        items.push(BatchItem { input, output_dir });
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preset;
    use image::{GrayImage, Luma};

    // Dark cells on a bright wall network, walls `gap` pixels wide
    fn cell_grid(cells: u32, side: u32, gap: u32) -> GrayImage {
        let extent = gap + cells * (side + gap);
        GrayImage::from_fn(extent, extent, |x, y| {
            let in_cell = |v: u32| v >= gap && (v - gap) % (side + gap) < side;
            Luma([if in_cell(x) && in_cell(y) { 20 } else { 240 }])
        })
    }

    fn sharp_config() -> ProcessingConfig {
        let mut config = ProcessingConfig::from_preset(Preset::Confocal);
        config.gaussian_blur_sigma = 0.0;
        config.binary_open_iterations = 0;
        config.binary_close_iterations = 0;
        config.dilation_iterations = 6;
        config
    }

    #[test]
    fn grid_walls_merge_at_their_width() {
        let image = DynamicImage::ImageLuma8(cell_grid(2, 8, 4));
        let session = run(&image, &sharp_config()).unwrap();

        assert_eq!(session.measurements.label_map.count(), 4);
        let histogram = &session.widths.histogram;
        assert_eq!(histogram.total_initial_regions, 4);
        assert_eq!(histogram.final_region_count, 1);
        assert!(histogram.observations.iter().all(|&w| w == 4));
        assert_eq!(histogram.observations.len(), 3);
    }

    #[test]
    fn run_can_be_stopped_after_first_step() {
        let image = DynamicImage::ImageLuma8(cell_grid(2, 8, 4));
        let session = run_while(&image, &sharp_config(), |_| false).unwrap();
        assert_eq!(session.widths.histogram.entries.len(), 1);
        assert_eq!(session.widths.final_labels.count(), 4);
    }

    #[test]
    fn same_stem_in_different_folders_keeps_both_reports() {
        let dir = tempfile::tempdir().unwrap();
        let input_root = dir.path().join("in");
        let output_root = dir.path().join("out");
        save_image(&cell_grid(1, 8, 4), input_root.join("a/wt.png")).unwrap();
        save_image(&cell_grid(2, 8, 4), input_root.join("b/wt.png")).unwrap();

        let plan = plan_batch(&input_root, &output_root).unwrap();
        assert_eq!(
            plan.iter().map(|item| item.output_dir.clone()).collect::<Vec<_>>(),
            vec![output_root.join("a"), output_root.join("b")]
        );

        for item in &plan {
            let input = crate::image_io::load_image(&item.input).unwrap();
            process_image(input, &sharp_config(), &item.output_dir, false).unwrap();
        }

        let rows = |sub: &str| {
            fs::read_to_string(output_root.join(sub).join("wt.tsv"))
                .unwrap()
                .lines()
                .count()
                - 1
        };
        assert_eq!(rows("a"), 1);
        assert_eq!(rows("b"), 4);
        assert!(output_root.join("a/widths_wt.tsv").is_file());
        assert!(output_root.join("b/all_widths_wt.tsv").is_file());
        assert!(!output_root.join("wt.tsv").exists());
    }

    #[test]
    fn same_stem_in_one_folder_is_rejected_before_processing() {
        let dir = tempfile::tempdir().unwrap();
        let input_root = dir.path().join("in");
        save_image(&cell_grid(1, 8, 4), input_root.join("wt.png")).unwrap();
        cell_grid(1, 8, 4).save(input_root.join("wt.bmp")).unwrap();
        save_image(&cell_grid(1, 8, 4), input_root.join("other.png")).unwrap();

        assert!(matches!(
            plan_batch(&input_root, dir.path().join("out")),
            Err(CellWallError::Config(_))
        ));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn top_level_inputs_report_to_output_root() {
        let dir = tempfile::tempdir().unwrap();
        let input_root = dir.path().join("in");
        save_image(&cell_grid(1, 8, 4), input_root.join("cells.png")).unwrap();

        let plan = plan_batch(&input_root, dir.path().join("out")).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].output_dir, dir.path().join("out"));
    }

    #[test]
    fn process_image_writes_reports_and_debug_images() {
        let dir = tempfile::tempdir().unwrap();
        let input = InputImage {
            image: DynamicImage::ImageLuma8(cell_grid(2, 8, 4)),
            path: PathBuf::from("grid.png"),
            filename: "grid".to_string(),
        };

        process_image(input, &sharp_config(), dir.path(), true).unwrap();

        for name in ["grid.tsv", "widths_grid.tsv", "all_widths_grid.tsv"] {
            assert!(dir.path().join(name).is_file(), "missing {}", name);
        }
        assert!(dir.path().join("debug/grid_boundary.png").is_file());
        assert!(dir.path().join("debug/grid_dilated_labels.png").is_file());
    }
}
