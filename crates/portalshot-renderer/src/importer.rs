//! Turns buffer descriptors into GPU textures.
//!
//! Both paths consume the [`BufferDescriptor`], so every plane fd is closed by
//! the time they return, whatever the outcome.

use std::fmt;
use std::fs::File;

use image::RgbaImage;
use memmap2::MmapOptions;
use portalshot_core::{pixel, BufferDescriptor, ImportError};
use tracing::{debug, trace};

use crate::attribs::dma_buf_attribs;
use crate::GpuBackend;

/// The single live texture of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportedTexture<T> {
    pub handle: T,
    pub width: u32,
    pub height: u32,
}

pub struct FrameImporter<T> {
    current: Option<ImportedTexture<T>>,
}

impl<T: Copy + fmt::Debug + PartialEq> Default for FrameImporter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + fmt::Debug + PartialEq> FrameImporter<T> {
    pub fn new() -> Self {
        Self { current: None }
    }

    pub fn texture(&self) -> Option<ImportedTexture<T>> {
        self.current
    }

    /// Zero-copy import through an EGL image. On an EGL failure no texture
    /// state is touched.
    pub fn import<B>(&mut self, backend: &mut B, desc: BufferDescriptor) -> Result<T, ImportError>
    where
        B: GpuBackend<Texture = T>,
    {
        let (width, height) = (desc.width(), desc.height());
        let attribs =
            dma_buf_attribs(width, height, desc.format(), desc.modifier(), desc.planes())?;
        let image = backend.create_image(&attribs).map_err(|code| ImportError::ImportFailed { code })?;
        // The image holds its own dma-buf references from here on.
        drop(desc);

        let texture = match self.texture_for(backend, width, height) {
            Ok(texture) => texture,
            Err(e) => {
                backend.destroy_image(image);
                return Err(e);
            }
        };
        backend.bind_image(texture, &image);
        backend.destroy_image(image);
        trace!("Imported {}x{} dma-buf into {:?}", width, height, texture);
        Ok(texture)
    }

    /// CPU path: maps plane 0, converts to RGBA and uploads.
    pub fn upload_mapped<B>(&mut self, backend: &mut B, desc: BufferDescriptor) -> Result<T, ImportError>
    where
        B: GpuBackend<Texture = T>,
    {
        let image = map_to_rgba(desc)?;
        let (width, height) = image.dimensions();
        let texture = self.texture_for(backend, width, height)?;
        backend.upload_rgba(texture, width, height, image.as_raw());
        Ok(texture)
    }

    /// Deletes the live texture, if any.
    pub fn release<B>(&mut self, backend: &mut B)
    where
        B: GpuBackend<Texture = T>,
    {
        if let Some(old) = self.current.take() {
            debug!("Releasing texture {:?}", old.handle);
            backend.delete_texture(old.handle);
        }
    }

    /// Same size reuses the texture object; a new size deletes the old one first.
    fn texture_for<B>(&mut self, backend: &mut B, width: u32, height: u32) -> Result<T, ImportError>
    where
        B: GpuBackend<Texture = T>,
    {
        if let Some(current) = self.current {
            if (current.width, current.height) == (width, height) {
                return Ok(current.handle);
            }
        }
        self.release(backend);
        let handle = backend.create_texture().map_err(|e| ImportError::Gpu(e.to_string()))?;
        self.current = Some(ImportedTexture { handle, width, height });
        Ok(handle)
    }
}

/// Maps `stride * height` bytes of plane 0 read-only and converts them to
/// RGBA. Never touches the GPU.
pub fn map_to_rgba(desc: BufferDescriptor) -> Result<RgbaImage, ImportError> {
    let plane = &desc.planes()[0];
    let len = plane.stride as usize * desc.height() as usize;

    // Mapping past the end of a regular file would fault on access.
    let file = File::from(plane.fd.try_clone().map_err(|source| ImportError::MapFailed { source })?);
    let meta = file.metadata().map_err(|source| ImportError::MapFailed { source })?;
    if meta.is_file() && meta.len() < plane.offset as u64 + len as u64 {
        return Err(ImportError::InvalidGeometry {
            reason: format!("{} byte file, {} bytes at offset {} required", meta.len(), len, plane.offset),
        });
    }

    let map = unsafe { MmapOptions::new().offset(plane.offset as u64).len(len).map(&file) }
        .map_err(|source| ImportError::MapFailed { source })?;
    pixel::to_rgba(&map, desc.width(), desc.height(), plane.stride, desc.format())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{shm_descriptor, Call, FakeBackend};
    use portalshot_core::BufferMemory;

    #[test]
    fn failed_image_leaves_texture_untouched() {
        let mut gpu = FakeBackend::default();
        let mut importer = FrameImporter::new();
        importer.import(&mut gpu, shm_descriptor(4, 4, BufferMemory::DmaBuf)).unwrap();
        let before = importer.texture();

        gpu.fail_images_with = Some(0x3003);
        gpu.calls.clear();
        let err = importer.import(&mut gpu, shm_descriptor(8, 8, BufferMemory::DmaBuf)).unwrap_err();

        assert!(matches!(err, ImportError::ImportFailed { code: 0x3003 }));
        assert_eq!(importer.texture(), before);
        assert!(gpu.calls.iter().all(|c| !matches!(c, Call::CreateTexture(_) | Call::DeleteTexture(_))));
    }

    #[test]
    fn same_size_reuses_texture() {
        let mut gpu = FakeBackend::default();
        let mut importer = FrameImporter::new();
        let a = importer.import(&mut gpu, shm_descriptor(4, 4, BufferMemory::DmaBuf)).unwrap();
        let b = importer.import(&mut gpu, shm_descriptor(4, 4, BufferMemory::DmaBuf)).unwrap();
        assert_eq!(a, b);
        assert_eq!(gpu.live_textures(), 1);
        assert_eq!(gpu.live_images(), 0);
    }

    #[test]
    fn new_size_deletes_previous_texture_first() {
        let mut gpu = FakeBackend::default();
        let mut importer = FrameImporter::new();
        let a = importer.import(&mut gpu, shm_descriptor(4, 4, BufferMemory::DmaBuf)).unwrap();
        let b = importer.import(&mut gpu, shm_descriptor(2, 2, BufferMemory::DmaBuf)).unwrap();
        assert_ne!(a, b);
        let del = gpu.calls.iter().position(|c| *c == Call::DeleteTexture(a)).unwrap();
        let create = gpu.calls.iter().position(|c| *c == Call::CreateTexture(b)).unwrap();
        assert!(del < create);
        assert_eq!(gpu.live_textures(), 1);
        assert_eq!(importer.texture().map(|t| (t.width, t.height)), Some((2, 2)));
    }

    #[test]
    fn mapped_path_uploads_rgba() {
        let mut gpu = FakeBackend::default();
        let mut importer = FrameImporter::new();
        let tex = importer.upload_mapped(&mut gpu, shm_descriptor(2, 1, BufferMemory::Shm)).unwrap();
        assert_eq!(gpu.uploads, vec![(tex, 2, 1, vec![3, 2, 1, 255, 3, 2, 1, 255])]);
        assert_eq!(gpu.live_images(), 0);
    }

    #[test]
    fn release_deletes_texture() {
        let mut gpu = FakeBackend::default();
        let mut importer = FrameImporter::new();
        importer.import(&mut gpu, shm_descriptor(4, 4, BufferMemory::DmaBuf)).unwrap();
        importer.release(&mut gpu);
        assert_eq!(importer.texture(), None);
        assert_eq!(gpu.live_textures(), 0);
    }
}
