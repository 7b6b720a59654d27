//! `EGL_EXT_image_dma_buf_import` attribute lists.

use std::os::fd::AsRawFd;

use portalshot_core::buffer::split_modifier;
use portalshot_core::{ImportError, Plane, MAX_PLANES};

/// EGL 1.5 attribute value (`EGLAttrib`).
pub type Attrib = usize;

pub const EGL_NONE: Attrib = 0x3038;
pub const EGL_WIDTH: Attrib = 0x3057;
pub const EGL_HEIGHT: Attrib = 0x3056;
pub const EGL_LINUX_DMA_BUF_EXT: u32 = 0x3270;
pub const EGL_LINUX_DRM_FOURCC_EXT: Attrib = 0x3271;

/// Per-plane attribute keys, in plane order.
#[derive(Debug, Clone, Copy)]
struct PlaneKeys {
    fd: Attrib,
    offset: Attrib,
    pitch: Attrib,
    modifier_lo: Attrib,
    modifier_hi: Attrib,
}

const PLANE_KEYS: [PlaneKeys; MAX_PLANES] = [
    PlaneKeys { fd: 0x3272, offset: 0x3273, pitch: 0x3274, modifier_lo: 0x3443, modifier_hi: 0x3444 },
    PlaneKeys { fd: 0x3275, offset: 0x3276, pitch: 0x3277, modifier_lo: 0x3445, modifier_hi: 0x3446 },
    PlaneKeys { fd: 0x3278, offset: 0x3279, pitch: 0x327A, modifier_lo: 0x3447, modifier_hi: 0x3448 },
    PlaneKeys { fd: 0x3440, offset: 0x3441, pitch: 0x3442, modifier_lo: 0x3449, modifier_hi: 0x344A },
];

/// Builds the `eglCreateImage` attribute list for a dma-buf frame, terminated
/// with `EGL_NONE`. `modifier` of `None` (or zero) omits the modifier keys.
pub fn dma_buf_attribs(
    width: u32,
    height: u32,
    format: u32,
    modifier: Option<u64>,
    planes: &[Plane],
) -> Result<Vec<Attrib>, ImportError> {
    if planes.is_empty() {
        return Err(ImportError::NoPlanes);
    }
    if planes.len() > MAX_PLANES {
        return Err(ImportError::TooManyPlanes { count: planes.len(), max: MAX_PLANES });
    }

    let mut attribs = Vec::with_capacity(7 + planes.len() * 10);
    attribs.extend_from_slice(&[
        EGL_WIDTH,
        width as Attrib,
        EGL_HEIGHT,
        height as Attrib,
        EGL_LINUX_DRM_FOURCC_EXT,
        format as Attrib,
    ]);

    let modifier = modifier.filter(|m| *m != 0).map(split_modifier);
    for (plane, keys) in planes.iter().zip(PLANE_KEYS.iter()) {
        attribs.extend_from_slice(&[
            keys.fd,
            plane.fd.as_raw_fd() as Attrib,
            keys.offset,
            plane.offset as Attrib,
            keys.pitch,
            plane.stride as Attrib,
        ]);
        if let Some((lo, hi)) = modifier {
            attribs.extend_from_slice(&[keys.modifier_lo, lo as Attrib, keys.modifier_hi, hi as Attrib]);
        }
    }

    attribs.push(EGL_NONE);
    Ok(attribs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::os::fd::OwnedFd;

    fn planes(n: usize) -> Vec<Plane> {
        (0..n)
            .map(|i| {
                let fd = OwnedFd::from(File::open("/dev/null").unwrap());
                Plane::new(fd, i as u32 * 100, 256)
            })
            .collect()
    }

    fn value_of(attribs: &[Attrib], key: Attrib) -> Option<Attrib> {
        attribs.chunks(2).find(|kv| kv[0] == key).map(|kv| kv[1])
    }

    #[test]
    fn linear_single_plane() {
        let p = planes(1);
        let attribs = dma_buf_attribs(640, 480, 0x3432_5258, None, &p).unwrap();
        assert_eq!(attribs.len(), 6 + 6 + 1);
        assert_eq!(value_of(&attribs, EGL_WIDTH), Some(640));
        assert_eq!(value_of(&attribs, EGL_HEIGHT), Some(480));
        assert_eq!(value_of(&attribs, EGL_LINUX_DRM_FOURCC_EXT), Some(0x3432_5258));
        assert_eq!(value_of(&attribs, 0x3272), Some(p[0].fd.as_raw_fd() as Attrib));
        assert_eq!(value_of(&attribs, 0x3443), None);
        assert_eq!(attribs.last(), Some(&EGL_NONE));
    }

    #[test]
    fn each_plane_uses_its_own_modifier_keys() {
        let p = planes(4);
        let m = 0x0100_0000_0000_0002u64;
        let attribs = dma_buf_attribs(64, 64, 0x3231_564E, Some(m), &p).unwrap();

        for (i, keys) in PLANE_KEYS.iter().enumerate() {
            assert_eq!(value_of(&attribs, keys.fd), Some(p[i].fd.as_raw_fd() as Attrib));
            assert_eq!(value_of(&attribs, keys.offset), Some(i * 100));
            assert_eq!(value_of(&attribs, keys.pitch), Some(256));
            assert_eq!(value_of(&attribs, keys.modifier_lo), Some(0x2));
            assert_eq!(value_of(&attribs, keys.modifier_hi), Some(0x0100_0000));
        }

        // Low word is emitted before high word.
        let lo = attribs.iter().position(|a| *a == 0x3443).unwrap();
        let hi = attribs.iter().position(|a| *a == 0x3444).unwrap();
        assert!(lo < hi);
    }

    #[test]
    fn zero_modifier_is_omitted() {
        let p = planes(2);
        let attribs = dma_buf_attribs(64, 64, 0, Some(0), &p).unwrap();
        assert_eq!(value_of(&attribs, 0x3443), None);
        assert_eq!(value_of(&attribs, 0x3445), None);
    }

    #[test]
    fn five_planes_rejected() {
        let p = planes(5);
        let err = dma_buf_attribs(64, 64, 0, None, &p).unwrap_err();
        assert!(matches!(err, ImportError::TooManyPlanes { count: 5, max: 4 }));
    }
}
