use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::{ImageFormat, RgbaImage};
use portalshot_core::{CaptureConfig, CaptureError};
use tempfile::NamedTempFile;
use tracing::info;

/// Writes still captures as PNG into the pictures directory.
#[derive(Debug, Clone)]
pub struct ScreenshotSaver {
    dir: Option<PathBuf>,
    prefix: String,
}

impl ScreenshotSaver {
    pub fn new(dir: Option<PathBuf>, prefix: impl Into<String>) -> Self {
        Self { dir, prefix: prefix.into() }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(config.save_dir.clone(), config.file_prefix.clone())
    }

    /// The configured directory, else the desktop pictures directory. It must
    /// already exist.
    pub fn resolve_dir(&self) -> Result<PathBuf, CaptureError> {
        let dir = self
            .dir
            .clone()
            .or_else(dirs::picture_dir)
            .ok_or_else(|| CaptureError::save_failed("no pictures directory"))?;
        if !dir.is_dir() {
            return Err(CaptureError::save_failed(format!("{} does not exist", dir.display())));
        }
        Ok(dir)
    }

    /// `"<prefix> - Tue Mar 5 09:07:01 2024.png"`.
    pub fn file_name(&self, now: DateTime<Local>) -> String {
        format!("{} - {}.png", self.prefix, now.format("%a %b %-d %H:%M:%S %Y"))
    }

    pub fn save(&self, image: &RgbaImage) -> Result<PathBuf, CaptureError> {
        self.save_at(image, Local::now())
    }

    /// Encodes into a temp file next to the target and renames it into place,
    /// so a failure never leaves a partial file behind.
    pub fn save_at(&self, image: &RgbaImage, now: DateTime<Local>) -> Result<PathBuf, CaptureError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(CaptureError::FrameFailed);
        }
        let dir = self.resolve_dir()?;
        let path = dir.join(self.file_name(now));
        write_png(image, &dir, &path)?;
        info!("Screenshot saved to {}", path.display());
        Ok(path)
    }
}

fn write_png(image: &RgbaImage, dir: &Path, path: &Path) -> Result<(), CaptureError> {
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| CaptureError::save_failed(format!("temp file in {}: {e}", dir.display())))?;
    image
        .write_to(&mut tmp, ImageFormat::Png)
        .map_err(|e| CaptureError::save_failed(format!("PNG encode: {e}")))?;
    tmp.persist(path)
        .map_err(|e| CaptureError::save_failed(format!("{}: {}", path.display(), e.error)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 9, 7, 1).unwrap()
    }

    #[test]
    fn file_name_pattern() {
        let saver = ScreenshotSaver::new(None, "portal screenshot");
        assert_eq!(saver.file_name(fixed_time()), "portal screenshot - Tue Mar 5 09:07:01 2024.png");
    }

    #[test]
    fn saves_valid_png() {
        let dir = tempfile::tempdir().unwrap();
        let saver = ScreenshotSaver::new(Some(dir.path().to_path_buf()), "shot");
        let mut img = RgbaImage::new(3, 2);
        img.put_pixel(1, 1, image::Rgba([10, 20, 30, 255]));

        let path = saver.save_at(&img, fixed_time()).unwrap();
        assert_eq!(path.parent(), Some(dir.path()));
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded, img);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn empty_image_is_frame_failure() {
        let dir = tempfile::tempdir().unwrap();
        let saver = ScreenshotSaver::new(Some(dir.path().to_path_buf()), "shot");
        let err = saver.save(&RgbaImage::new(0, 0)).unwrap_err();
        assert!(matches!(err, CaptureError::FrameFailed));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_directory_is_save_failure() {
        let dir = tempfile::tempdir().unwrap();
        let saver = ScreenshotSaver::new(Some(dir.path().join("nope")), "shot");
        let err = saver.save(&RgbaImage::new(1, 1)).unwrap_err();
        assert!(matches!(err, CaptureError::SaveFailed { .. }));
    }
}
