//! Live preview of a capture session.
//!
//! Redraws are driven by the session's "frame ready" notification and by
//! resizes, both delivered through the waker. Each redraw imports at most one
//! new descriptor and draws the current texture as one full-surface quad.

use std::fmt;
use std::sync::Arc;

use portalshot_capture::{CaptureSession, Subscription};
use portalshot_core::{BufferMemory, CaptureRegion, ImportPath};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::importer::FrameImporter;
use crate::{CurrentContext, GpuBackend, RendererError, FULL_SURFACE_QUAD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedrawOutcome {
    /// Nothing to draw: no started session or no texture yet.
    Idle,
    Presented,
    /// The new frame failed to import; the previous texture, if any, was drawn.
    Dropped,
}

pub struct PresentationSurface<T> {
    session: Option<Arc<dyn CaptureSession>>,
    subscriptions: Vec<Subscription>,
    importer: FrameImporter<T>,
    size: (u32, u32),
    import_path: ImportPath,
    waker: Arc<dyn Fn() + Send + Sync>,
    context_tx: watch::Sender<bool>,
    dropped_frames: u64,
}

impl<T: Copy + fmt::Debug + PartialEq> PresentationSurface<T> {
    /// `waker` is called whenever the surface needs a redraw.
    pub fn new(import_path: ImportPath, waker: impl Fn() + Send + Sync + 'static) -> Self {
        let (context_tx, _) = watch::channel(false);
        Self {
            session: None,
            subscriptions: Vec::new(),
            importer: FrameImporter::new(),
            size: (0, 0),
            import_path,
            waker: Arc::new(waker),
            context_tx,
            dropped_frames: 0,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn importer(&self) -> &FrameImporter<T> {
        &self.importer
    }

    /// Publishes whether a session is attached.
    pub fn context_changes(&self) -> watch::Receiver<bool> {
        self.context_tx.subscribe()
    }

    /// Attaches `session` (or detaches with `None`). Switching releases the
    /// texture and the registrations on the previous session.
    pub fn set_session<B>(&mut self, session: Option<Arc<dyn CaptureSession>>, backend: &mut B)
    where
        B: GpuBackend<Texture = T>,
    {
        let same = match (&self.session, &session) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if same {
            return;
        }

        self.subscriptions.clear();
        self.release_texture(backend);

        if let Some(session) = &session {
            let waker = Arc::clone(&self.waker);
            self.subscriptions.push(session.on_frame_ready().subscribe(move |_| waker()));
            info!("Surface attached to capture session");
        } else {
            info!("Surface detached from capture session");
        }
        self.session = session;
        self.context_tx.send_replace(self.session.is_some());
        (self.waker)();
    }

    /// Takes the region's size. Returns whether the size changed.
    pub fn resize(&mut self, region: &CaptureRegion) -> bool {
        let size = region.size();
        if size == self.size {
            return false;
        }
        debug!("Surface resized {:?} -> {:?}", self.size, size);
        self.size = size;
        (self.waker)();
        true
    }

    pub fn redraw<B>(&mut self, backend: &mut B) -> Result<RedrawOutcome, RendererError>
    where
        B: GpuBackend<Texture = T>,
    {
        let Some(session) = self.session.clone() else { return Ok(RedrawOutcome::Idle) };
        if !session.started() {
            return Ok(RedrawOutcome::Idle);
        }

        let mut gpu = CurrentContext::acquire(backend)?;
        let mut dropped = false;
        if let Some(desc) = session.acquire_buffer() {
            let summary = desc.describe();
            let zero_copy =
                desc.memory() == BufferMemory::DmaBuf && self.import_path == ImportPath::ZeroCopy;
            let result = if zero_copy {
                self.importer.import(&mut *gpu, desc)
            } else {
                self.importer.upload_mapped(&mut *gpu, desc)
            };
            if let Err(e) = result {
                self.dropped_frames += 1;
                dropped = true;
                warn!("Dropping frame {summary}: {e}");
            }
        }

        let Some(texture) = self.importer.texture() else {
            return Ok(if dropped { RedrawOutcome::Dropped } else { RedrawOutcome::Idle });
        };
        let (w, h) = self.size;
        gpu.clear(w, h);
        gpu.draw_quad(texture.handle, &FULL_SURFACE_QUAD);
        gpu.present();
        Ok(if dropped { RedrawOutcome::Dropped } else { RedrawOutcome::Presented })
    }

    /// Detaches the session and releases the texture.
    pub fn destroy<B>(&mut self, backend: &mut B)
    where
        B: GpuBackend<Texture = T>,
    {
        self.set_session(None, backend);
        self.release_texture(backend);
    }

    fn release_texture<B>(&mut self, backend: &mut B)
    where
        B: GpuBackend<Texture = T>,
    {
        if self.importer.texture().is_none() {
            return;
        }
        match CurrentContext::acquire(backend) {
            Ok(mut gpu) => self.importer.release(&mut *gpu),
            Err(e) => warn!("Cannot release texture: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{shm_descriptor, Call, FakeBackend, FakeSession};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn surface() -> (PresentationSurface<u32>, Arc<AtomicUsize>) {
        let wakes = Arc::new(AtomicUsize::new(0));
        let w = Arc::clone(&wakes);
        let surface = PresentationSurface::new(ImportPath::ZeroCopy, move || {
            w.fetch_add(1, Ordering::SeqCst);
        });
        (surface, wakes)
    }

    #[test]
    fn no_session_means_no_gpu_calls() {
        let (mut surface, _) = surface();
        let mut gpu = FakeBackend::default();
        assert_eq!(surface.redraw(&mut gpu).unwrap(), RedrawOutcome::Idle);

        let session = Arc::new(FakeSession::default());
        surface.set_session(Some(session), &mut gpu);
        assert_eq!(surface.redraw(&mut gpu).unwrap(), RedrawOutcome::Idle);
        assert!(gpu.calls.is_empty());
    }

    #[test]
    fn frame_ready_wakes_and_redraw_presents() {
        let (mut surface, wakes) = surface();
        let mut gpu = FakeBackend::default();
        let session = FakeSession::running();
        surface.set_session(Some(session.clone()), &mut gpu);
        let before = wakes.load(Ordering::SeqCst);

        session.push(shm_descriptor(4, 4, BufferMemory::DmaBuf));
        assert_eq!(wakes.load(Ordering::SeqCst), before + 1);

        surface.resize(&CaptureRegion::new(0, 0, 4, 4));
        assert_eq!(surface.redraw(&mut gpu).unwrap(), RedrawOutcome::Presented);
        assert_eq!(gpu.calls.first(), Some(&Call::MakeCurrent));
        assert_eq!(gpu.calls.last(), Some(&Call::DoneCurrent));
        assert!(gpu.calls.contains(&Call::Clear(4, 4)));
        assert!(gpu.calls.contains(&Call::Present));
        assert_eq!(gpu.live_images(), 0);
    }

    #[test]
    fn previous_texture_drawn_without_new_frame() {
        let (mut surface, _) = surface();
        let mut gpu = FakeBackend::default();
        let session = FakeSession::running();
        surface.set_session(Some(session.clone()), &mut gpu);

        session.push(shm_descriptor(4, 4, BufferMemory::DmaBuf));
        surface.redraw(&mut gpu).unwrap();
        surface.redraw(&mut gpu).unwrap();

        let draws = gpu.draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].0, draws[1].0);
    }

    #[test]
    fn import_failure_keeps_previous_texture() {
        let (mut surface, _) = surface();
        let mut gpu = FakeBackend::default();
        let session = FakeSession::running();
        surface.set_session(Some(session.clone()), &mut gpu);

        session.push(shm_descriptor(4, 4, BufferMemory::DmaBuf));
        surface.redraw(&mut gpu).unwrap();
        gpu.fail_images_with = Some(0x3003);
        session.push(shm_descriptor(4, 4, BufferMemory::DmaBuf));
        assert_eq!(surface.redraw(&mut gpu).unwrap(), RedrawOutcome::Dropped);

        let draws = gpu.draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].0, draws[1].0);
        assert_eq!(surface.dropped_frames(), 1);
    }

    #[test]
    fn shm_frames_take_mapped_path() {
        let (mut surface, _) = surface();
        let mut gpu = FakeBackend::default();
        let session = FakeSession::running();
        surface.set_session(Some(session.clone()), &mut gpu);

        session.push(shm_descriptor(2, 2, BufferMemory::Shm));
        assert_eq!(surface.redraw(&mut gpu).unwrap(), RedrawOutcome::Presented);
        assert!(gpu.attribs.is_empty());
        assert_eq!(gpu.uploads.len(), 1);
    }

    #[test]
    fn without_egl_dma_buf_drops_and_mapped_frames_draw() {
        let (mut surface, _) = surface();
        let mut gpu = FakeBackend { fail_images_with: Some(0x3008), ..FakeBackend::default() };
        let session = FakeSession::running();
        surface.set_session(Some(session.clone()), &mut gpu);

        session.push(shm_descriptor(2, 2, BufferMemory::DmaBuf));
        assert_eq!(surface.redraw(&mut gpu).unwrap(), RedrawOutcome::Dropped);
        assert!(gpu.draws().is_empty());

        session.push(shm_descriptor(2, 2, BufferMemory::Shm));
        assert_eq!(surface.redraw(&mut gpu).unwrap(), RedrawOutcome::Presented);
        assert_eq!(gpu.uploads.len(), 1);
        assert_eq!(gpu.draws().len(), 1);
        assert_eq!(gpu.live_images(), 0);
    }

    #[test]
    fn resize_takes_exact_size_and_draws_single_full_quad() {
        let (mut surface, _) = surface();
        let mut gpu = FakeBackend::default();
        let session = FakeSession::running();
        surface.set_session(Some(session.clone()), &mut gpu);

        assert!(surface.resize(&CaptureRegion::new(10, 10, 800, 600)));
        session.push(shm_descriptor(8, 6, BufferMemory::DmaBuf));
        surface.redraw(&mut gpu).unwrap();

        assert!(surface.resize(&CaptureRegion::new(10, 10, 400, 300)));
        assert!(!surface.resize(&CaptureRegion::new(50, 50, 400, 300)));
        assert_eq!(surface.size(), (400, 300));

        gpu.calls.clear();
        surface.redraw(&mut gpu).unwrap();
        assert_eq!(gpu.draws(), vec![(gpu.draws()[0].0, FULL_SURFACE_QUAD)]);
        assert!(gpu.calls.contains(&Call::Clear(400, 300)));
    }

    #[test]
    fn detach_releases_texture_and_listener() {
        let (mut surface, _) = surface();
        let mut gpu = FakeBackend::default();
        let session = FakeSession::running();
        let mut changes = surface.context_changes();
        surface.set_session(Some(session.clone()), &mut gpu);
        assert!(*changes.borrow_and_update());

        session.push(shm_descriptor(4, 4, BufferMemory::DmaBuf));
        surface.redraw(&mut gpu).unwrap();
        assert_eq!(session.frame_ready.listener_count(), 1);

        surface.set_session(None, &mut gpu);
        assert_eq!(session.frame_ready.listener_count(), 0);
        assert_eq!(gpu.live_textures(), 0);
        assert!(!*changes.borrow_and_update());

        surface.destroy(&mut gpu);
        assert_eq!(gpu.live_textures(), 0);
    }

    #[test]
    fn reattaching_same_session_is_noop() {
        let (mut surface, _) = surface();
        let mut gpu = FakeBackend::default();
        let session: Arc<dyn CaptureSession> = FakeSession::running();
        surface.set_session(Some(Arc::clone(&session)), &mut gpu);
        surface.set_session(Some(session), &mut gpu);
        assert_eq!(surface.subscriptions.len(), 1);
    }

    #[test]
    fn lost_context_is_an_error() {
        let (mut surface, _) = surface();
        let mut gpu = FakeBackend::default();
        surface.set_session(Some(FakeSession::running()), &mut gpu);
        gpu.fail_make_current = true;
        assert!(matches!(surface.redraw(&mut gpu), Err(RendererError::NoContext)));
    }
}
