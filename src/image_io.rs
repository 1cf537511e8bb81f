use std::path::{Path, PathBuf};
use std::fs;
use image::{DynamicImage, GrayImage, ImageFormat};

use crate::errors::{CellWallError, Result};

/// Extensions accepted when scanning a directory for micrographs
pub const IMAGE_EXTENSIONS: [&str; 6] = ["tif", "tiff", "png", "jpg", "jpeg", "bmp"];

/// Represents an input image with its metadata
pub struct InputImage {
    pub image: DynamicImage,
    pub path: PathBuf,
    pub filename: String,
}

/// Get all supported image files from a directory (recursively), sorted by path
pub fn get_image_files_in_dir<P: AsRef<Path>>(dir_path: P) -> Result<Vec<PathBuf>> {
    let dir_path = dir_path.as_ref();

    if !dir_path.exists() {
        return Err(CellWallError::InvalidPath(dir_path.to_path_buf()));
    }

    if !dir_path.is_dir() {
        return Err(CellWallError::Config(format!(
            "{} is not a directory", dir_path.display()
        )));
    }

    let mut image_files = Vec::new();
    find_image_files_recursive(dir_path, &mut image_files)?;
    image_files.sort();

    Ok(image_files)
}

fn find_image_files_recursive(dir_path: &Path, result: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir_path)? {
        let path = entry?.path();

        if path.is_dir() {
            find_image_files_recursive(&path, result)?;
        } else if path.is_file() && has_image_extension(&path) {
            result.push(path);
        }
    }

    Ok(())
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Load an image in whatever format it is stored in; greyscale conversion happens later
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<InputImage> {
    let path = path.as_ref();

    let filename = path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| CellWallError::InvalidPath(path.to_path_buf()))?
        .to_string();

    let image = image::open(path)?;

    Ok(InputImage {
        image,
        path: path.to_path_buf(),
        filename,
    })
}

/// Save a greyscale image as PNG, creating the parent directory if needed
pub fn save_image<P: AsRef<Path>>(image: &GrayImage, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    image.save_with_format(path, ImageFormat::Png)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    #[test]
    fn directory_scan_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir_all(&nested).unwrap();

        let image = GrayImage::new(4, 4);
        save_image(&image, dir.path().join("b.png")).unwrap();
        save_image(&image, nested.join("a.png")).unwrap();
        fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let files = get_image_files_in_dir(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| p.extension().unwrap() == "png"));
    }

    #[test]
    fn load_image_keeps_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wt_cells.png");
        save_image(&GrayImage::new(3, 2), &path).unwrap();

        let input = load_image(&path).unwrap();
        assert_eq!(input.filename, "wt_cells");
        assert_eq!((input.image.width(), input.image.height()), (3, 2));
    }

    #[test]
    fn missing_directory_is_invalid_path() {
        let result = get_image_files_in_dir("/definitely/not/here");
        assert!(matches!(result, Err(CellWallError::InvalidPath(_))));
    }
}
