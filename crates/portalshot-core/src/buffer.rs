//! Shared frame buffers handed out by a capture session.
//!
//! A [`BufferDescriptor`] owns the file descriptors of its planes. It is
//! consumed by exactly one import attempt; dropping it closes every fd.

use std::fmt;
use std::os::fd::{AsRawFd, OwnedFd};

use drm_fourcc::DrmFourcc;

use crate::errors::ImportError;

/// The EGL dma-buf import extension knows four planes.
pub const MAX_PLANES: usize = 4;

// MARK: - Plane

/// One contiguous memory region of a (possibly multi-planar) frame.
pub struct Plane {
    pub fd: OwnedFd,
    /// Byte offset of the plane inside `fd`.
    pub offset: u32,
    /// Row pitch in bytes.
    pub stride: u32,
}

impl Plane {
    pub fn new(fd: OwnedFd, offset: u32, stride: u32) -> Self {
        Self { fd, offset, stride }
    }
}

impl fmt::Debug for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plane")
            .field("fd", &self.fd.as_raw_fd())
            .field("offset", &self.offset)
            .field("stride", &self.stride)
            .finish()
    }
}

// MARK: - BufferMemory

/// Where the plane memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMemory {
    /// GPU-shareable dma-buf; eligible for zero-copy import.
    DmaBuf,
    /// Plain shared memory; only the mapped path can read it.
    Shm,
}

// MARK: - BufferDescriptor

/// Metadata plus owned fds for one shared video frame.
#[derive(Debug)]
pub struct BufferDescriptor {
    width: u32,
    height: u32,
    format: u32,
    modifier: Option<u64>,
    planes: Vec<Plane>,
    memory: BufferMemory,
}

impl BufferDescriptor {
    /// Validates dimensions and plane count. On error the planes are dropped,
    /// which closes their fds.
    pub fn new(
        width: u32,
        height: u32,
        format: u32,
        modifier: Option<u64>,
        planes: Vec<Plane>,
        memory: BufferMemory,
    ) -> Result<Self, ImportError> {
        if width == 0 || height == 0 {
            return Err(ImportError::InvalidGeometry {
                reason: format!("{width}x{height}"),
            });
        }
        if planes.is_empty() {
            return Err(ImportError::NoPlanes);
        }
        if planes.len() > MAX_PLANES {
            return Err(ImportError::TooManyPlanes { count: planes.len(), max: MAX_PLANES });
        }
        Ok(Self { width, height, format, modifier, planes, memory })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw fourcc code.
    pub fn format(&self) -> u32 {
        self.format
    }

    /// The fourcc resolved against the known DRM formats.
    pub fn fourcc(&self) -> Option<DrmFourcc> {
        DrmFourcc::try_from(self.format).ok()
    }

    /// Layout modifier, `None` for linear buffers. A zero modifier is linear too.
    pub fn modifier(&self) -> Option<u64> {
        self.modifier.filter(|m| *m != 0)
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn memory(&self) -> BufferMemory {
        self.memory
    }

    pub fn into_planes(self) -> Vec<Plane> {
        self.planes
    }

    /// Short human readable form used in diagnostics.
    pub fn describe(&self) -> String {
        let planes: Vec<String> = self
            .planes
            .iter()
            .map(|p| format!("fd={} off={} stride={}", p.fd.as_raw_fd(), p.offset, p.stride))
            .collect();
        format!(
            "{}x{} format={} modifier={:#x} planes=[{}]",
            self.width,
            self.height,
            fourcc_name(self.format),
            self.modifier.unwrap_or(0),
            planes.join(", ")
        )
    }
}

/// Splits a 64-bit modifier into the `(low, high)` 32-bit words EGL expects.
pub fn split_modifier(modifier: u64) -> (u32, u32) {
    ((modifier & 0xFFFF_FFFF) as u32, (modifier >> 32) as u32)
}

/// Four-character rendering of a fourcc code, e.g. `XR24`.
pub fn fourcc_name(code: u32) -> String {
    code.to_le_bytes()
        .iter()
        .map(|b| if b.is_ascii_graphic() || *b == b' ' { *b as char } else { '?' })
        .collect()
}

/// Parses a GStreamer `drm-format` caps value such as `XR24:0x0100000000000001`
/// into a fourcc code and optional modifier.
pub fn parse_drm_format(value: &str) -> Option<(u32, Option<u64>)> {
    let (name, modifier) = match value.split_once(':') {
        Some((name, m)) => {
            let hex = m.strip_prefix("0x").or_else(|| m.strip_prefix("0X"))?;
            (name, Some(u64::from_str_radix(hex, 16).ok()?))
        }
        None => (value, None),
    };
    let bytes: [u8; 4] = name.as_bytes().try_into().ok()?;
    Some((u32::from_le_bytes(bytes), modifier))
}

/// Fourcc of a packed GStreamer video format name (`BGRx`, `RGBA`, ...).
pub fn fourcc_for_video_format(name: &str) -> Option<u32> {
    let fourcc = match name {
        "BGRx" => DrmFourcc::Xrgb8888,
        "BGRA" => DrmFourcc::Argb8888,
        "RGBx" => DrmFourcc::Xbgr8888,
        "RGBA" => DrmFourcc::Abgr8888,
        _ => return None,
    };
    Some(fourcc as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn plane() -> Plane {
        let file = File::open("/dev/null").expect("open /dev/null");
        Plane::new(OwnedFd::from(file), 0, 64)
    }

    #[test]
    fn modifier_split_low_word_first() {
        let m = 0x0100_0000_0000_0001u64;
        assert_eq!(split_modifier(m), (0x0000_0001, 0x0100_0000));
        let m = 0xDEAD_BEEF_CAFE_F00Du64;
        let (lo, hi) = split_modifier(m);
        assert_eq!(lo as u64, m & 0xFFFF_FFFF);
        assert_eq!(hi as u64, m >> 32);
    }

    #[test]
    fn drm_format_with_and_without_modifier() {
        let (code, modifier) = parse_drm_format("XR24:0x0100000000000001").unwrap();
        assert_eq!(code, DrmFourcc::Xrgb8888 as u32);
        assert_eq!(modifier, Some(0x0100_0000_0000_0001));

        assert_eq!(parse_drm_format("AR24"), Some((DrmFourcc::Argb8888 as u32, None)));
        assert_eq!(parse_drm_format("XR24:ffff"), None);
        assert_eq!(parse_drm_format("NV1"), None);
    }

    #[test]
    fn gstreamer_names_follow_byte_order() {
        assert_eq!(fourcc_for_video_format("BGRx"), Some(DrmFourcc::Xrgb8888 as u32));
        assert_eq!(fourcc_for_video_format("RGBA"), Some(DrmFourcc::Abgr8888 as u32));
        assert_eq!(fourcc_for_video_format("I420"), None);
    }

    #[test]
    fn rejects_five_planes() {
        let planes = (0..5).map(|_| plane()).collect();
        let err = BufferDescriptor::new(16, 16, DrmFourcc::Nv12 as u32, None, planes, BufferMemory::DmaBuf)
            .unwrap_err();
        assert!(matches!(err, ImportError::TooManyPlanes { count: 5, max: 4 }));
    }

    #[test]
    fn rejects_empty_and_zero_sized() {
        let err = BufferDescriptor::new(16, 16, 0, None, Vec::new(), BufferMemory::DmaBuf).unwrap_err();
        assert!(matches!(err, ImportError::NoPlanes));
        let err = BufferDescriptor::new(0, 16, 0, None, vec![plane()], BufferMemory::DmaBuf).unwrap_err();
        assert!(matches!(err, ImportError::InvalidGeometry { .. }));
    }

    #[test]
    fn zero_modifier_is_linear() {
        let desc = BufferDescriptor::new(
            8,
            8,
            DrmFourcc::Xrgb8888 as u32,
            Some(0),
            vec![plane()],
            BufferMemory::DmaBuf,
        )
        .unwrap();
        assert_eq!(desc.modifier(), None);
        assert_eq!(desc.fourcc(), Some(DrmFourcc::Xrgb8888));
        assert!(desc.describe().starts_with("8x8 format=XR24"));
    }
}
