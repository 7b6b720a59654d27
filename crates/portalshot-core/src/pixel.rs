//! CPU conversion of packed 32-bit frames into RGBA byte order.

use drm_fourcc::DrmFourcc;
use image::RgbaImage;

use crate::buffer::fourcc_name;
use crate::errors::ImportError;

/// Byte layout of a packed 4-byte pixel in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// B, G, R, A/X (DRM `[A|X]RGB8888` on little-endian).
    Bgra { opaque: bool },
    /// R, G, B, A/X (DRM `[A|X]BGR8888` on little-endian).
    Rgba { opaque: bool },
}

fn layout(format: u32) -> Result<Layout, ImportError> {
    match DrmFourcc::try_from(format) {
        Ok(DrmFourcc::Xrgb8888) => Ok(Layout::Bgra { opaque: true }),
        Ok(DrmFourcc::Argb8888) => Ok(Layout::Bgra { opaque: false }),
        Ok(DrmFourcc::Xbgr8888) => Ok(Layout::Rgba { opaque: true }),
        Ok(DrmFourcc::Abgr8888) => Ok(Layout::Rgba { opaque: false }),
        _ => Err(ImportError::UnsupportedFormat(fourcc_name(format))),
    }
}

/// Whether [`to_rgba`] can convert `format`.
pub fn is_supported(format: u32) -> bool {
    layout(format).is_ok()
}

/// Copies `height` rows of `stride` bytes into a tightly packed RGBA image.
pub fn to_rgba(
    bytes: &[u8],
    width: u32,
    height: u32,
    stride: u32,
    format: u32,
) -> Result<RgbaImage, ImportError> {
    let layout = layout(format)?;
    if width == 0 || height == 0 {
        return Err(ImportError::InvalidGeometry { reason: format!("{width}x{height}") });
    }
    let row_bytes = width as usize * 4;
    let stride = stride as usize;
    if stride < row_bytes {
        return Err(ImportError::InvalidGeometry {
            reason: format!("stride {stride} shorter than {width} pixels"),
        });
    }
    let needed = stride * (height as usize - 1) + row_bytes;
    if bytes.len() < needed {
        return Err(ImportError::InvalidGeometry {
            reason: format!("{} bytes mapped, {needed} required", bytes.len()),
        });
    }

    let mut out = Vec::with_capacity(row_bytes * height as usize);
    for row in bytes.chunks(stride).take(height as usize) {
        for px in row[..row_bytes].chunks_exact(4) {
            match layout {
                Layout::Bgra { opaque } => {
                    out.extend_from_slice(&[px[2], px[1], px[0], if opaque { 0xFF } else { px[3] }])
                }
                Layout::Rgba { opaque } => {
                    out.extend_from_slice(&[px[0], px[1], px[2], if opaque { 0xFF } else { px[3] }])
                }
            }
        }
    }

    RgbaImage::from_raw(width, height, out).ok_or_else(|| ImportError::InvalidGeometry {
        reason: "pixel buffer size mismatch".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgrx_with_row_padding() {
        // 2x2 image, stride 12 (4 bytes padding per row).
        let bytes = [
            1, 2, 3, 0, 4, 5, 6, 0, 9, 9, 9, 9, //
            7, 8, 9, 0, 10, 11, 12, 0, 9, 9, 9, 9,
        ];
        let img = to_rgba(&bytes, 2, 2, 12, DrmFourcc::Xrgb8888 as u32).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [3, 2, 1, 255]);
        assert_eq!(img.get_pixel(1, 0).0, [6, 5, 4, 255]);
        assert_eq!(img.get_pixel(0, 1).0, [9, 8, 7, 255]);
        assert_eq!(img.get_pixel(1, 1).0, [12, 11, 10, 255]);
    }

    #[test]
    fn abgr_keeps_alpha() {
        let bytes = [10, 20, 30, 40];
        let img = to_rgba(&bytes, 1, 1, 4, DrmFourcc::Abgr8888 as u32).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [10, 20, 30, 40]);
    }

    #[test]
    fn rejects_planar_formats() {
        let err = to_rgba(&[0; 16], 2, 2, 8, DrmFourcc::Nv12 as u32).unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFormat(name) if name == "NV12"));
    }

    #[test]
    fn rejects_short_mapping() {
        let err = to_rgba(&[0; 8], 2, 2, 8, DrmFourcc::Xrgb8888 as u32).unwrap_err();
        assert!(matches!(err, ImportError::InvalidGeometry { .. }));
    }
}
