// src/preprocessing.rs - greyscale conversion, contrast stretch, smoothing and thresholding

use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;
use log::{debug, info, warn};

use crate::config::{ProcessingConfig, ThresholdSpec};
use crate::errors::{CellWallError, Result};

/// Single-channel 8-bit intensity image
pub type RasterImage = GrayImage;

/// Intensities on the native `0..=255` scale, kept fractional between stages
pub type IntensityImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Same layout as [`RasterImage`], every pixel is 0 (background) or 1 (foreground)
pub type BinaryMask = GrayImage;

/// Upper end of the native intensity range
pub const NATIVE_MAX: f64 = 255.0;

/// Result of histogram equalization
#[derive(Debug, Clone)]
pub struct Equalization {
    pub image: IntensityImage,
    /// Cumulative distribution per bin, rescaled to `0..=NATIVE_MAX`
    pub cdf: Vec<f64>,
    /// Set when the input had a single intensity and the identity mapping was used instead
    pub degenerate: bool,
}

/// Everything the preprocessing stage hands to morphology
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub greyscale: RasterImage,
    pub equalized: Equalization,
    pub threshold: f64,
    pub mask: BinaryMask,
}

/// Standard luminance conversion to one 8-bit channel
pub fn to_greyscale(image: &DynamicImage) -> RasterImage {
    image.to_luma8()
}

/// Widen an 8-bit image to the fractional intensity buffer
pub fn to_intensity(image: &RasterImage) -> IntensityImage {
    let (width, height) = image.dimensions();
    IntensityImage::from_fn(width, height, |x, y| Luma([image.get_pixel(x, y)[0] as f32]))
}

/// Histogram-equalize `image` using `bins` equal-width bins spanning its intensity range.
///
/// Each pixel is remapped by linear interpolation of its intensity against the table of
/// (left bin edge, scaled CDF). Intensities at or beyond the last left edge map to the
/// top of the CDF. Output values are not rounded.
pub fn equalize_histogram(image: &RasterImage, bins: usize) -> Result<Equalization> {
    if bins == 0 {
        return Err(CellWallError::Config("histogram_bins must be >= 1".to_string()));
    }

    let (lo, hi) = image.pixels().fold((u8::MAX, u8::MIN), |(lo, hi), p| {
        (lo.min(p[0]), hi.max(p[0]))
    });

    if image.width() == 0 || image.height() == 0 || lo == hi {
        return Ok(Equalization {
            image: to_intensity(image),
            cdf: vec![NATIVE_MAX; bins],
            degenerate: true,
        });
    }

    let lo = lo as f64;
    let bin_width = (hi as f64 - lo) / bins as f64;
    let bin_of = |v: f64| (((v - lo) / bin_width) as usize).min(bins - 1);

    let mut histogram = vec![0u64; bins];
    for p in image.pixels() {
        histogram[bin_of(p[0] as f64)] += 1;
    }

    let mut running = 0u64;
    let mut cdf: Vec<f64> = histogram
        .iter()
        .map(|&count| {
            running += count;
            running as f64
        })
        .collect();
    let total = running as f64;
    for value in cdf.iter_mut() {
        *value = NATIVE_MAX * *value / total;
    }

    let interpolate = |v: f64| -> f64 {
        let last_edge = lo + bin_width * (bins - 1) as f64;
        if v <= lo {
            cdf[0]
        } else if v >= last_edge {
            cdf[bins - 1]
        } else {
            let i = bin_of(v);
            let left = lo + bin_width * i as f64;
            let t = (v - left) / bin_width;
            let next = cdf[(i + 1).min(bins - 1)];
            cdf[i] + t * (next - cdf[i])
        }
    };

    let lookup: Vec<f32> = (0..=255u8)
        .map(|v| interpolate(v as f64).clamp(0.0, NATIVE_MAX) as f32)
        .collect();

    let (width, height) = image.dimensions();
    let equalized = IntensityImage::from_fn(width, height, |x, y| {
        Luma([lookup[image.get_pixel(x, y)[0] as usize]])
    });

    Ok(Equalization {
        image: equalized,
        cdf,
        degenerate: false,
    })
}

/// Turn a threshold spec into a concrete intensity.
///
/// `Mean` averages the strictly positive pixels only; background zeros do not count.
pub fn resolve_threshold(image: &IntensityImage, spec: ThresholdSpec) -> Result<f64> {
    match spec {
        ThresholdSpec::Fixed(value) => Ok(value as f64),
        ThresholdSpec::Mean => {
            let (sum, count) = image
                .pixels()
                .filter(|p| p[0] > 0.0)
                .fold((0f64, 0u64), |(sum, count), p| (sum + p[0] as f64, count + 1));

            if count == 0 {
                return Err(CellWallError::Config(
                    "threshold 'mean' is undefined for an image without positive pixels".to_string(),
                ));
            }

            Ok(sum / count as f64)
        }
    }
}

/// Gaussian blur; a sigma of zero leaves the image untouched
pub fn smooth(image: &IntensityImage, sigma: f64) -> IntensityImage {
    if sigma <= 0.0 {
        return image.clone();
    }
    gaussian_blur_f32(image, sigma as f32)
}

/// Foreground iff intensity is strictly below `threshold` (cells are darker than walls).
/// Compared on the unrounded value, so 169.6 is below a threshold of 170.
pub fn binarize(image: &IntensityImage, threshold: f64) -> BinaryMask {
    let (width, height) = image.dimensions();
    let mut mask = BinaryMask::new(width, height);

    for (x, y, p) in image.enumerate_pixels() {
        if (p[0] as f64) < threshold {
            mask.put_pixel(x, y, Luma([1]));
        }
    }

    mask
}

/// Run the full preprocessing chain: greyscale, equalize, resolve threshold, smooth, binarize.
///
/// The threshold is resolved on the equalized image before smoothing. Intensities stay
/// fractional from equalization through binarization. Returns the flat-histogram
/// flag through `Equalization::degenerate` so the caller can record the warning.
pub fn preprocess(image: &DynamicImage, config: &ProcessingConfig) -> Result<Preprocessed> {
    let greyscale = to_greyscale(image);
    let equalized = equalize_histogram(&greyscale, config.histogram_bins)?;
    if equalized.degenerate {
        warn!("Flat intensity histogram; equalization skipped (identity mapping)");
    }

    let threshold = resolve_threshold(&equalized.image, config.threshold)?;
    info!("Threshold ({}) = {:.3}", config.threshold, threshold);

    let smoothed = smooth(&equalized.image, config.gaussian_blur_sigma);
    let mask = binarize(&smoothed, threshold);
    debug!(
        "Binarized {} foreground pixels of {}",
        mask.pixels().filter(|p| p[0] > 0).count(),
        mask.width() * mask.height()
    );

    Ok(Preprocessed {
        greyscale,
        equalized,
        threshold,
        mask,
    })
}
