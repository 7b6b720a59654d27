//! Recording GPU backend for unit tests.

use std::collections::VecDeque;
use std::io::Write;
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use drm_fourcc::DrmFourcc;
use portalshot_capture::{CaptureSession, Notifier};
use portalshot_core::{BufferDescriptor, BufferMemory, CaptureError, Plane};

use crate::{Attrib, GpuBackend, Quad, RendererError};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    MakeCurrent,
    DoneCurrent,
    CreateImage(u32),
    DestroyImage(u32),
    CreateTexture(u32),
    DeleteTexture(u32),
    BindImage(u32, u32),
    Upload(u32, u32, u32),
    Clear(u32, u32),
    DrawQuad(u32, Quad),
    Present,
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    pub calls: Vec<Call>,
    pub uploads: Vec<(u32, u32, u32, Vec<u8>)>,
    pub attribs: Vec<Vec<Attrib>>,
    pub fail_images_with: Option<i32>,
    pub fail_make_current: bool,
    pub(crate) next_id: u32,
}

impl FakeBackend {
    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn count(&self, f: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| f(c)).count()
    }

    pub fn live_textures(&self) -> usize {
        self.count(|c| matches!(c, Call::CreateTexture(_)))
            - self.count(|c| matches!(c, Call::DeleteTexture(_)))
    }

    pub fn live_images(&self) -> usize {
        self.count(|c| matches!(c, Call::CreateImage(_)))
            - self.count(|c| matches!(c, Call::DestroyImage(_)))
    }

    pub fn draws(&self) -> Vec<(u32, Quad)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::DrawQuad(t, q) => Some((*t, *q)),
                _ => None,
            })
            .collect()
    }
}

impl GpuBackend for FakeBackend {
    type Texture = u32;
    type Image = u32;

    fn make_current(&mut self) -> Result<(), RendererError> {
        if self.fail_make_current {
            return Err(RendererError::NoContext);
        }
        self.calls.push(Call::MakeCurrent);
        Ok(())
    }

    fn done_current(&mut self) {
        self.calls.push(Call::DoneCurrent);
    }

    fn create_image(&mut self, attribs: &[Attrib]) -> Result<u32, i32> {
        self.attribs.push(attribs.to_vec());
        if let Some(code) = self.fail_images_with {
            return Err(code);
        }
        let id = self.next();
        self.calls.push(Call::CreateImage(id));
        Ok(id)
    }

    fn destroy_image(&mut self, image: u32) {
        self.calls.push(Call::DestroyImage(image));
    }

    fn create_texture(&mut self) -> Result<u32, RendererError> {
        let id = self.next();
        self.calls.push(Call::CreateTexture(id));
        Ok(id)
    }

    fn delete_texture(&mut self, texture: u32) {
        self.calls.push(Call::DeleteTexture(texture));
    }

    fn bind_image(&mut self, texture: u32, image: &u32) {
        self.calls.push(Call::BindImage(texture, *image));
    }

    fn upload_rgba(&mut self, texture: u32, width: u32, height: u32, pixels: &[u8]) {
        self.calls.push(Call::Upload(texture, width, height));
        self.uploads.push((texture, width, height, pixels.to_vec()));
    }

    fn clear(&mut self, width: u32, height: u32) {
        self.calls.push(Call::Clear(width, height));
    }

    fn draw_quad(&mut self, texture: u32, quad: &Quad) {
        self.calls.push(Call::DrawQuad(texture, *quad));
    }

    fn present(&mut self) {
        self.calls.push(Call::Present);
    }
}

/// Single-plane XRGB8888 frame backed by a temp file; every pixel is
/// `[1, 2, 3, 0]` in memory.
pub fn shm_descriptor(width: u32, height: u32, memory: BufferMemory) -> BufferDescriptor {
    let mut file = tempfile::tempfile().unwrap();
    let pixels: Vec<u8> = [1u8, 2, 3, 0].repeat((width * height) as usize);
    file.write_all(&pixels).unwrap();
    let plane = Plane::new(OwnedFd::from(file), 0, width * 4);
    BufferDescriptor::new(width, height, DrmFourcc::Xrgb8888 as u32, None, vec![plane], memory).unwrap()
}

/// Session handing out queued descriptors.
#[derive(Default)]
pub struct FakeSession {
    pub started: AtomicBool,
    pub queue: Mutex<VecDeque<BufferDescriptor>>,
    pub frame_ready: Notifier<()>,
    pub destroyed: Notifier<()>,
}

impl FakeSession {
    pub fn running() -> Arc<Self> {
        let session = Self::default();
        session.started.store(true, Ordering::SeqCst);
        Arc::new(session)
    }

    pub fn push(&self, desc: BufferDescriptor) {
        self.queue.lock().unwrap().push_back(desc);
        self.frame_ready.emit(&());
    }
}

impl CaptureSession for FakeSession {
    fn start(&self) -> Result<(), CaptureError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn acquire_buffer(&self) -> Option<BufferDescriptor> {
        self.queue.lock().unwrap().pop_front()
    }

    fn on_frame_ready(&self) -> &Notifier<()> {
        &self.frame_ready
    }

    fn on_destroyed(&self) -> &Notifier<()> {
        &self.destroyed
    }
}
