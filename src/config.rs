use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::errors::{CellWallError, Result};

/// Processing parameters for one pipeline run.
///
/// The eight core parameters have no serde defaults: a configuration file that omits the
/// threshold or a cutoff is rejected instead of silently falling back to some value.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProcessingConfig {
    pub threshold: ThresholdSpec,
    pub gaussian_blur_sigma: f64,
    pub binary_open_iterations: u32,
    pub binary_close_iterations: u32,
    pub dilation_iterations: u32,
    pub area_cutoff: f64,
    pub perimeter_cutoff: f64,
    pub structuring_element: StructuringElement,

    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,

    #[serde(default)]
    pub connectivity: Connectivity,

    #[serde(default)]
    pub pixel_convention: PixelConvention,
}

fn default_histogram_bins() -> usize {
    256
}

/// How the binarization threshold is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawThreshold", into = "RawThreshold")]
pub enum ThresholdSpec {
    /// Mean of all strictly positive intensities of the equalized image
    Mean,
    /// Literal intensity threshold
    Fixed(i64),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawThreshold {
    Fixed(i64),
    Text(String),
}

impl TryFrom<RawThreshold> for ThresholdSpec {
    type Error = String;

    fn try_from(raw: RawThreshold) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawThreshold::Fixed(value) => Ok(ThresholdSpec::Fixed(value)),
            RawThreshold::Text(text) => text.parse().map_err(|e: CellWallError| e.to_string()),
        }
    }
}

impl From<ThresholdSpec> for RawThreshold {
    fn from(spec: ThresholdSpec) -> Self {
        match spec {
            ThresholdSpec::Mean => RawThreshold::Text("mean".to_string()),
            ThresholdSpec::Fixed(value) => RawThreshold::Fixed(value),
        }
    }
}

impl FromStr for ThresholdSpec {
    type Err = CellWallError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed == "mean" {
            return Ok(ThresholdSpec::Mean);
        }
        trimmed.parse::<i64>().map(ThresholdSpec::Fixed).map_err(|_| {
            CellWallError::Config(format!(
                "threshold must be 'mean' or an integer, got '{}'",
                s
            ))
        })
    }
}

impl fmt::Display for ThresholdSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdSpec::Mean => write!(f, "mean"),
            ThresholdSpec::Fixed(value) => write!(f, "{}", value),
        }
    }
}

/// Pixel adjacency rule shared by every labeling call within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Edge neighbours only
    #[default]
    Four,
    /// Edge and corner neighbours
    Eight,
}

impl Connectivity {
    /// The 3x3 element whose on-cells are exactly the neighbours of this rule
    pub fn neighbourhood(self) -> StructuringElement {
        match self {
            Connectivity::Four => StructuringElement::cross(3),
            Connectivity::Eight => StructuringElement::square(3),
        }
    }
}

/// Convention used to turn a boundary polygon into area and perimeter values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelConvention {
    /// Raw polygon through boundary pixel centres
    Centre,
    /// Pixel footprint of that polygon: Pick's theorem area, perimeter grown by one pixel outline
    #[default]
    Covered,
}

/// Binary kernel used by the morphology operations.
///
/// Stored row-major; the origin sits at `(width / 2, height / 2)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<u8>>", into = "Vec<Vec<u8>>")]
pub struct StructuringElement {
    width: u32,
    height: u32,
    cells: Vec<bool>,
}

impl StructuringElement {
    /// Build an element from rows of 0/1 values. Rows must all have the same length.
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map(|r| r.len()).unwrap_or(0);

        let mut cells = Vec::with_capacity(width * height);
        for (y, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(CellWallError::Config(format!(
                    "structuring element row {} has {} columns, expected {}",
                    y,
                    row.len(),
                    width
                )));
            }
            for &value in row {
                match value {
                    0 => cells.push(false),
                    1 => cells.push(true),
                    other => {
                        return Err(CellWallError::Config(format!(
                            "structuring element values must be 0 or 1, got {}",
                            other
                        )))
                    }
                }
            }
        }

        Ok(Self {
            width: width as u32,
            height: height as u32,
            cells,
        })
    }

    fn from_fn(size: u32, on: impl Fn(u32, u32) -> bool) -> Self {
        let mut cells = Vec::with_capacity((size * size) as usize);
        for y in 0..size {
            for x in 0..size {
                cells.push(on(x, y));
            }
        }
        Self {
            width: size,
            height: size,
            cells,
        }
    }

    /// Filled `size`x`size` square
    pub fn square(size: u32) -> Self {
        Self::from_fn(size, |_, _| true)
    }

    /// Plus sign whose arms are one pixel thick for odd sizes and two for even sizes
    pub fn cross(size: u32) -> Self {
        let lo = size.saturating_sub(1) / 2;
        let hi = size / 2;
        Self::from_fn(size, |x, y| (lo..=hi).contains(&x) || (lo..=hi).contains(&y))
    }

    /// Lower-left right triangle, e.g. `[[1,0,0],[1,1,0],[1,1,1]]`
    pub fn right_triangle(size: u32) -> Self {
        Self::from_fn(size, |x, y| x <= y)
    }

    /// Both diagonals, e.g. `[[1,0,1],[0,1,0],[1,0,1]]`
    pub fn x_shape(size: u32) -> Self {
        Self::from_fn(size, |x, y| x == y || x + y + 1 == size)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.cells[(y * self.width + x) as usize]
    }

    /// True when the element has no on-cells (including the 0x0 element)
    pub fn is_empty(&self) -> bool {
        !self.cells.iter().any(|&c| c)
    }

    /// Offsets `(dx, dy)` of every on-cell relative to the element origin
    pub fn offsets(&self) -> Vec<(i32, i32)> {
        let cx = (self.width / 2) as i32;
        let cy = (self.height / 2) as i32;
        let mut offsets = Vec::new();
        for y in 0..self.height {
            for x in 0..self.width {
                if self.get(x, y) {
                    offsets.push((x as i32 - cx, y as i32 - cy));
                }
            }
        }
        offsets
    }

    pub fn rows(&self) -> Vec<Vec<u8>> {
        self.cells
            .chunks(self.width.max(1) as usize)
            .take(self.height as usize)
            .map(|row| row.iter().map(|&c| c as u8).collect())
            .collect()
    }
}

impl TryFrom<Vec<Vec<u8>>> for StructuringElement {
    type Error = String;

    fn try_from(rows: Vec<Vec<u8>>) -> std::result::Result<Self, Self::Error> {
        Self::from_rows(&rows).map_err(|e| e.to_string())
    }
}

impl From<StructuringElement> for Vec<Vec<u8>> {
    fn from(element: StructuringElement) -> Self {
        element.rows()
    }
}

impl FromStr for StructuringElement {
    type Err = CellWallError;

    /// Parse the bracketed text form, e.g. `[[1,1,1],[1,1,1],[1,1,1]]`
    fn from_str(s: &str) -> Result<Self> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let inner = compact
            .strip_prefix("[[")
            .and_then(|rest| rest.strip_suffix("]]"))
            .ok_or_else(|| {
                CellWallError::Config(format!(
                    "structuring element must look like [[1,1,1],[1,1,1],[1,1,1]], got '{}'",
                    s
                ))
            })?;

        let rows = inner
            .split("],[")
            .map(|row| {
                row.split(',')
                    .map(|cell| {
                        cell.parse::<u8>().map_err(|_| {
                            CellWallError::Config(format!(
                                "invalid structuring element cell '{}'",
                                cell
                            ))
                        })
                    })
                    .collect::<Result<Vec<u8>>>()
            })
            .collect::<Result<Vec<Vec<u8>>>>()?;

        Self::from_rows(&rows)
    }
}

/// Built-in parameter sets tuned for common microscopy image types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Confocal,
    ConfocalAvg,
    BrightField,
    DarkField,
    CellCulture,
}

impl ProcessingConfig {
    /// Create a configuration from one of the built-in presets
    pub fn from_preset(preset: Preset) -> Self {
        let (threshold, sigma, open, close) = match preset {
            Preset::Confocal => (ThresholdSpec::Fixed(170), 3.0, 1, 1),
            Preset::ConfocalAvg => (ThresholdSpec::Mean, 3.0, 1, 1),
            Preset::BrightField => (ThresholdSpec::Fixed(70), 4.0, 4, 4),
            Preset::DarkField => (ThresholdSpec::Fixed(30), 2.0, 4, 4),
            Preset::CellCulture => (ThresholdSpec::Fixed(30), 2.0, 3, 3),
        };

        Self {
            threshold,
            gaussian_blur_sigma: sigma,
            binary_open_iterations: open,
            binary_close_iterations: close,
            dilation_iterations: 15,
            area_cutoff: 3000.0,
            perimeter_cutoff: 350.0,
            structuring_element: StructuringElement::square(3),
            histogram_bins: default_histogram_bins(),
            connectivity: Connectivity::default(),
            pixel_convention: PixelConvention::default(),
        }
    }

    /// Load configuration from a TOML or JSON file (chosen by extension)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CellWallError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        let config: ProcessingConfig = if is_json(path) {
            serde_json::from_str(&content).map_err(|e| {
                CellWallError::Config(format!("Failed to parse config file '{}': {}", path.display(), e))
            })?
        } else {
            toml::from_str(&content).map_err(|e| {
                CellWallError::Config(format!("Failed to parse config file '{}': {}", path.display(), e))
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML or JSON file (chosen by extension)
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self).map_err(|e| {
                CellWallError::Config(format!("Failed to serialize config: {}", e))
            })?
        } else {
            toml::to_string_pretty(self).map_err(|e| {
                CellWallError::Config(format!("Failed to serialize config: {}", e))
            })?
        };

        fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration. Runs before any image is touched.
    pub fn validate(&self) -> Result<()> {
        if !self.gaussian_blur_sigma.is_finite() || self.gaussian_blur_sigma < 0.0 {
            return Err(CellWallError::Config(
                "gaussian_blur_sigma must be a finite value >= 0.0".to_string(),
            ));
        }

        if self.dilation_iterations == 0 {
            return Err(CellWallError::Config(
                "dilation_iterations must be >= 1".to_string(),
            ));
        }

        if self.histogram_bins == 0 {
            return Err(CellWallError::Config(
                "histogram_bins must be >= 1".to_string(),
            ));
        }

        if !self.area_cutoff.is_finite() || self.area_cutoff <= 0.0 {
            return Err(CellWallError::Config(
                "area_cutoff must be a finite value > 0.0".to_string(),
            ));
        }

        if !self.perimeter_cutoff.is_finite() || self.perimeter_cutoff <= 0.0 {
            return Err(CellWallError::Config(
                "perimeter_cutoff must be a finite value > 0.0".to_string(),
            ));
        }

        if self.structuring_element.is_empty() {
            return Err(CellWallError::Config(
                "structuring_element must contain at least one 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
