use image::{GrayImage, Luma};

use crate::labeling::LabelMap;
use crate::preprocessing::BinaryMask;

/// Check if a point is inside the image bounds
#[inline]
pub fn in_bounds(x: i32, y: i32, width: u32, height: u32) -> bool {
    x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height
}

/// Stretch a 0/1 mask to 0/255 so it is visible when saved
pub fn mask_to_display(mask: &BinaryMask) -> GrayImage {
    let mut display = mask.clone();
    for p in display.pixels_mut() {
        p[0] = if p[0] != 0 { 255 } else { 0 };
    }
    display
}

/// Spread label values over the grey range; the highest label is white, background stays black
pub fn labels_to_display(labels: &LabelMap) -> GrayImage {
    let (width, height) = labels.dimensions();
    let count = labels.count().max(1) as u64;

    GrayImage::from_fn(width, height, |x, y| {
        let label = labels.get(x, y) as u64;
        Luma([(label * 255 / count).clamp(label.min(1), 255) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Connectivity;
    use crate::labeling::label;

    #[test]
    fn in_bounds_checks_all_edges() {
        assert!(in_bounds(0, 0, 3, 2));
        assert!(in_bounds(2, 1, 3, 2));
        assert!(!in_bounds(-1, 0, 3, 2));
        assert!(!in_bounds(3, 0, 3, 2));
        assert!(!in_bounds(0, 2, 3, 2));
    }

    #[test]
    fn display_images_keep_background_black() {
        let mask = BinaryMask::from_raw(5, 1, vec![1, 0, 1, 0, 1]).unwrap();
        assert_eq!(mask_to_display(&mask).into_raw(), vec![255, 0, 255, 0, 255]);

        let labels = label(&mask, Connectivity::Four);
        let shown = labels_to_display(&labels).into_raw();
        assert_eq!(shown[1], 0);
        assert_eq!(shown[0], 85);
        assert_eq!(shown[4], 255);
    }
}
