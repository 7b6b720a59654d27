use std::fmt;
use std::ops::{Deref, DerefMut};

use portalshot_core::ImportError;
use thiserror::Error;

pub mod attribs;
pub mod egl;
pub mod importer;
pub mod surface;

#[cfg(test)]
mod fake;

pub use attribs::{dma_buf_attribs, Attrib};
pub use importer::{map_to_rgba, FrameImporter, ImportedTexture};
pub use surface::{PresentationSurface, RedrawOutcome};

// MARK: - GpuBackend trait

/// The GPU operations the importer and the surface need.
///
/// Implementations:
/// - [`egl::GlowBackend`]: EGL images + glow, inside an eframe paint callback
/// - a recording fake in the unit tests
pub trait GpuBackend {
    type Texture: Copy + fmt::Debug + PartialEq;
    type Image;

    /// Makes the rendering context current on this thread.
    fn make_current(&mut self) -> Result<(), RendererError>;
    fn done_current(&mut self);

    /// `eglCreateImage(EGL_LINUX_DMA_BUF_EXT)`. On failure returns the native
    /// EGL error code.
    fn create_image(&mut self, attribs: &[Attrib]) -> Result<Self::Image, i32>;
    fn destroy_image(&mut self, image: Self::Image);

    fn create_texture(&mut self) -> Result<Self::Texture, RendererError>;
    fn delete_texture(&mut self, texture: Self::Texture);
    /// Attaches `image` as the storage of `texture`, linear filtering.
    fn bind_image(&mut self, texture: Self::Texture, image: &Self::Image);
    /// Uploads tightly packed RGBA pixels into `texture`.
    fn upload_rgba(&mut self, texture: Self::Texture, width: u32, height: u32, pixels: &[u8]);

    fn clear(&mut self, width: u32, height: u32);
    fn draw_quad(&mut self, texture: Self::Texture, quad: &Quad);
    fn present(&mut self);
}

// MARK: - Quad

/// Textured quad drawn as a triangle fan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub positions: [[f32; 2]; 4],
    pub tex_coords: [[f32; 2]; 4],
}

/// Covers the whole surface.
pub const FULL_SURFACE_QUAD: Quad = Quad {
    positions: [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]],
    tex_coords: [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
};

// MARK: - CurrentContext

/// Scoped context acquisition: `done_current` runs on every exit path.
pub struct CurrentContext<'a, B: GpuBackend> {
    backend: &'a mut B,
}

impl<'a, B: GpuBackend> CurrentContext<'a, B> {
    pub fn acquire(backend: &'a mut B) -> Result<Self, RendererError> {
        backend.make_current()?;
        Ok(Self { backend })
    }
}

impl<B: GpuBackend> Deref for CurrentContext<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.backend
    }
}

impl<B: GpuBackend> DerefMut for CurrentContext<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        self.backend
    }
}

impl<B: GpuBackend> Drop for CurrentContext<'_, B> {
    fn drop(&mut self) {
        self.backend.done_current();
    }
}

// MARK: - RendererError

#[derive(Error, Debug)]
pub enum RendererError {
    #[error("No current rendering context")]
    NoContext,

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("EGL unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Import(#[from] ImportError),
}
