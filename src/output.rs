use std::fs;
use std::path::{Path, PathBuf};

use csv::{Writer, WriterBuilder};
use log::debug;

use crate::errors::{CellWallError, Result};
use crate::measurement::MeasurementRecord;
use crate::wall_width::WidthHistogram;

/// Open a tab-delimited writer at `path`, creating parent directories
fn tsv_writer(path: &Path) -> Result<Writer<fs::File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(CellWallError::Io)?;
    }

    WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(CellWallError::CsvOutput)
}

fn optional_value(value: Option<f64>) -> String {
    value.map(|v| format!("{:.6}", v)).unwrap_or_default()
}

/// Write `<name>.tsv`: one row per region, cut-off values left blank
pub fn write_area_perimeter<P: AsRef<Path>>(
    records: &[MeasurementRecord],
    output_dir: P,
    filename: &str,
) -> Result<PathBuf> {
    let output_path = output_dir.as_ref().join(format!("{}.tsv", filename));
    let mut writer = tsv_writer(&output_path)?;

    writer.write_record(["object_label", "area", "perimeter"])?;
    for record in records {
        writer.write_record(&[
            record.label.to_string(),
            optional_value(record.area),
            optional_value(record.perimeter),
        ])?;
    }

    writer.flush().map_err(CellWallError::Io)?;
    debug!("Wrote {} rows to {}", records.len(), output_path.display());
    Ok(output_path)
}

/// Write `widths_<name>.tsv`: merge count per dilation step
pub fn write_width_histogram<P: AsRef<Path>>(
    histogram: &WidthHistogram,
    output_dir: P,
    filename: &str,
) -> Result<PathBuf> {
    let output_path = output_dir.as_ref().join(format!("widths_{}.tsv", filename));
    let mut writer = tsv_writer(&output_path)?;

    writer.write_record(["pixel_width", "num_cell_walls"])?;
    for entry in &histogram.entries {
        writer.write_record(&[entry.pixel_width.to_string(), entry.count.to_string()])?;
    }

    writer.flush().map_err(CellWallError::Io)?;
    Ok(output_path)
}

/// Write `all_widths_<name>.tsv`: one row per merge event
pub fn write_all_widths<P: AsRef<Path>>(
    histogram: &WidthHistogram,
    output_dir: P,
    filename: &str,
) -> Result<PathBuf> {
    let output_path = output_dir.as_ref().join(format!("all_widths_{}.tsv", filename));
    let mut writer = tsv_writer(&output_path)?;

    writer.write_record(["pixel_width"])?;
    for width in &histogram.observations {
        writer.write_record(&[width.to_string()])?;
    }

    writer.flush().map_err(CellWallError::Io)?;
    Ok(output_path)
}
