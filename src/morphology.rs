use image::Luma;

use crate::config::StructuringElement;
use crate::errors::{CellWallError, Result};
use crate::image_utils::in_bounds;
use crate::preprocessing::BinaryMask;

/// Reject elements that are empty or do not fit inside the mask
pub fn check_element(mask: &BinaryMask, element: &StructuringElement) -> Result<()> {
    if element.is_empty() {
        return Err(CellWallError::Config(
            "Structuring element must contain at least one 1".to_string(),
        ));
    }

    let (width, height) = mask.dimensions();
    if element.width() > width || element.height() > height {
        return Err(CellWallError::Config(format!(
            "Structuring element {}x{} is larger than the {}x{} mask",
            element.width(),
            element.height(),
            width,
            height
        )));
    }

    Ok(())
}

/// One erosion step. A pixel survives only if every on-cell of the element lands on
/// foreground; positions outside the mask count as background.
fn erode_once(mask: &BinaryMask, offsets: &[(i32, i32)]) -> BinaryMask {
    let (width, height) = mask.dimensions();
    let mut eroded = BinaryMask::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let mut keep = true;
            'kernel_check: for &(dx, dy) in offsets {
                let img_x = x as i32 + dx;
                let img_y = y as i32 + dy;

                if !in_bounds(img_x, img_y, width, height)
                    || mask.get_pixel(img_x as u32, img_y as u32)[0] == 0
                {
                    keep = false;
                    break 'kernel_check;
                }
            }

            if keep {
                eroded.put_pixel(x, y, Luma([1]));
            }
        }
    }

    eroded
}

/// One dilation step, the adjoint of [`erode_once`] for the same offsets
/// (the element is reflected through its origin).
pub(crate) fn dilate_once(mask: &BinaryMask, offsets: &[(i32, i32)]) -> BinaryMask {
    let (width, height) = mask.dimensions();
    let mut dilated = BinaryMask::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let mut hit = false;
            'kernel_check: for &(dx, dy) in offsets {
                let img_x = x as i32 - dx;
                let img_y = y as i32 - dy;

                if in_bounds(img_x, img_y, width, height)
                    && mask.get_pixel(img_x as u32, img_y as u32)[0] != 0
                {
                    hit = true;
                    break 'kernel_check;
                }
            }

            if hit {
                dilated.put_pixel(x, y, Luma([1]));
            }
        }
    }

    dilated
}

/// Single binary erosion
pub fn erode(mask: &BinaryMask, element: &StructuringElement) -> Result<BinaryMask> {
    check_element(mask, element)?;
    Ok(erode_once(mask, &element.offsets()))
}

/// Binary dilation applied `iterations` times in sequence, one element-sized step at a time
pub fn dilate(mask: &BinaryMask, element: &StructuringElement, iterations: u32) -> Result<BinaryMask> {
    check_element(mask, element)?;
    let offsets = element.offsets();

    let mut current = mask.clone();
    for _ in 0..iterations {
        current = dilate_once(&current, &offsets);
    }
    Ok(current)
}

/// Binary opening: `iterations` erosions followed by `iterations` dilations.
/// Removes foreground blobs the (repeated) element does not fit into.
pub fn open(mask: &BinaryMask, element: &StructuringElement, iterations: u32) -> Result<BinaryMask> {
    check_element(mask, element)?;
    let offsets = element.offsets();

    let mut current = mask.clone();
    for _ in 0..iterations {
        current = erode_once(&current, &offsets);
    }
    for _ in 0..iterations {
        current = dilate_once(&current, &offsets);
    }
    Ok(current)
}

/// Binary closing: `iterations` dilations followed by `iterations` erosions.
/// Fills background gaps narrower than the (repeated) element.
pub fn close(mask: &BinaryMask, element: &StructuringElement, iterations: u32) -> Result<BinaryMask> {
    check_element(mask, element)?;
    let offsets = element.offsets();

    let mut current = mask.clone();
    for _ in 0..iterations {
        current = dilate_once(&current, &offsets);
    }
    for _ in 0..iterations {
        current = erode_once(&current, &offsets);
    }
    Ok(current)
}
