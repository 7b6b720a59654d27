//! xdg-desktop-portal ScreenCast backend.
//!
//! ```text
//! ashpd portal ──► PipeWire node_id + remote fd ──► PortalContext
//!                                                       │
//!        zero-copy:  pipewiresrc ! video/x-raw(memory:DMABuf) ! appsink
//!                       sample ──► dup'd dma-buf fds ──► DmaBuf descriptor
//!        mapped:     pipewiresrc ! videoconvert ! BGRx ! appsink
//!                       sample ──► memfd copy ──► Shm descriptor
//! ```
//!
//! A zero-copy pipeline that fails before delivering its first frame is
//! replaced by the mapped one. Still frames always take the mapped route.
//!
//! The portal dialog is the selection UI: `select_source` opens it and
//! "selection finished" fires once the user confirms.

use std::fs::File;
use std::io::Write;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use anyhow::Context as _;
use ashpd::desktop::screencast::{CursorMode, Screencast, SourceType};
use ashpd::desktop::PersistMode;
use ashpd::enumflags2::BitFlags;
use ashpd::WindowIdentifier;
use drm_fourcc::DrmFourcc;
use gstreamer::prelude::*;
use gstreamer_allocators::DmaBufMemory;
use gstreamer_app::{AppSink, AppSinkCallbacks};
use portalshot_core::{
    fourcc_for_video_format, parse_drm_format, pixel, BufferMemory, ImportPath, Plane,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    frame_channel, BufferDescriptor, CaptureContext, CaptureError, CaptureManager, CaptureRegion,
    CaptureSession, FrameSender, Notifier, PendingFrame, SourceKinds, SourceSelection,
};

const BGRX: u32 = DrmFourcc::Xrgb8888 as u32;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum Command {
    Select { context: Arc<PortalContext>, selection: SourceSelection },
}

/// PipeWire stream granted by the portal.
struct StreamInfo {
    node_id: u32,
    remote: OwnedFd,
    region: CaptureRegion,
}

// ── Manager ──────────────────────────────────────────────────────────────────

pub struct PortalManager {
    import_path: ImportPath,
    active: AtomicBool,
    active_changed: Notifier<bool>,
    selection_finished: Notifier<()>,
    context: Mutex<Option<Arc<PortalContext>>>,
    commands: mpsc::UnboundedSender<Command>,
}

impl PortalManager {
    /// Connects to the ScreenCast portal in the background. The manager turns
    /// active once the proxy is up. `import_path` picks the buffer transport of
    /// live sessions.
    pub fn connect(import_path: ImportPath) -> Arc<Self> {
        let (commands, rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            import_path,
            active: AtomicBool::new(false),
            active_changed: Notifier::new(),
            selection_finished: Notifier::new(),
            context: Mutex::new(None),
            commands,
        });
        tokio::spawn(worker(Arc::downgrade(&manager), rx));
        manager
    }

    fn set_active(&self, active: bool) {
        if self.active.swap(active, Ordering::SeqCst) != active {
            self.active_changed.emit(&active);
        }
    }

    fn forget_context(&self, context: &Arc<PortalContext>) {
        let mut slot = lock(&self.context);
        if slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, context)) {
            *slot = None;
        }
    }
}

impl CaptureManager for PortalManager {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn on_active_changed(&self) -> &Notifier<bool> {
        &self.active_changed
    }

    fn on_selection_finished(&self) -> &Notifier<()> {
        &self.selection_finished
    }

    fn ensure_context(&self) -> Result<Arc<dyn CaptureContext>, CaptureError> {
        if !self.is_active() {
            return Err(CaptureError::unavailable("ScreenCast portal not connected"));
        }
        let mut slot = lock(&self.context);
        let context = slot
            .get_or_insert_with(|| {
                let commands = self.commands.clone();
                let import_path = self.import_path;
                Arc::new_cyclic(|weak| PortalContext {
                    weak_self: weak.clone(),
                    import_path,
                    commands,
                    stream: Mutex::new(None),
                    session: Mutex::new(None),
                    region_changed: Notifier::new(),
                    destroyed: Notifier::new(),
                })
            })
            .clone();
        Ok(context)
    }

    fn finish_select(&self) {
        debug!("finish_select: the portal dialog completes the selection itself");
    }
}

async fn worker(manager: Weak<PortalManager>, mut commands: mpsc::UnboundedReceiver<Command>) {
    let proxy = match Screencast::new().await {
        Ok(proxy) => proxy,
        Err(e) => {
            error!("ScreenCast portal unavailable: {e}");
            return;
        }
    };
    info!("ScreenCast portal connected");
    if let Some(m) = manager.upgrade() {
        m.set_active(true);
    }

    let mut live_session: Option<ashpd::desktop::Session<'_, Screencast<'_>>> = None;
    while let Some(command) = commands.recv().await {
        match command {
            Command::Select { context, selection } => {
                if let Some(old) = live_session.take() {
                    if let Err(e) = old.close().await {
                        debug!("Closing previous portal session: {e}");
                    }
                }
                match negotiate(&proxy, &selection).await {
                    Ok((session, stream)) => {
                        live_session = Some(session);
                        info!(
                            "Portal stream selected: node_id={} region={}",
                            stream.node_id, stream.region
                        );
                        context.stream_selected(stream);
                        if let Some(m) = manager.upgrade() {
                            m.selection_finished.emit(&());
                        }
                    }
                    Err(e) => {
                        warn!("Portal selection failed: {e:#}");
                        if let Some(m) = manager.upgrade() {
                            m.forget_context(&context);
                        }
                        context.destroyed.emit(&());
                    }
                }
            }
        }
    }
    debug!("Portal worker finished");
}

async fn negotiate<'a>(
    proxy: &'a Screencast<'a>,
    selection: &SourceSelection,
) -> anyhow::Result<(ashpd::desktop::Session<'a, Screencast<'a>>, StreamInfo)> {
    let mut types = BitFlags::empty();
    if selection.kinds.contains(SourceKinds::OUTPUT) {
        types.insert(SourceType::Monitor);
    }
    if selection.kinds.contains(SourceKinds::WINDOW) {
        types.insert(SourceType::Window);
    }
    if selection.kinds.contains(SourceKinds::REGION) {
        // Free-form regions are offered by the portal backend as virtual outputs.
        types.insert(SourceType::Virtual);
    }
    if selection.freeze {
        debug!("Portal selection cannot freeze the screen; ignoring");
    }
    if let Some(surface) = selection.exclude_surface {
        debug!("Portal dialog lists sources itself; cannot exclude {surface:?}");
    }

    let session = proxy.create_session().await.context("create_session")?;
    proxy
        .select_sources(
            &session,
            CursorMode::Embedded,
            types,
            selection.allow_multiple,
            None,
            PersistMode::DoNot,
        )
        .await
        .context("select_sources")?;

    let response = proxy
        .start(&session, &WindowIdentifier::default())
        .await
        .context("portal start")?
        .response()
        .context("portal denied")?;

    let stream = response
        .streams()
        .first()
        .context("No PipeWire streams returned by portal")?;
    let (x, y) = stream.position().unwrap_or((0, 0));
    let (w, h) = stream.size().unwrap_or((0, 0));
    let node_id = stream.pipe_wire_node_id();

    let remote = proxy
        .open_pipe_wire_remote(&session)
        .await
        .context("open_pipe_wire_remote")?;

    let region = CaptureRegion::new(x, y, w.max(0) as u32, h.max(0) as u32);
    Ok((session, StreamInfo { node_id, remote, region }))
}

// ── Context ──────────────────────────────────────────────────────────────────

pub struct PortalContext {
    weak_self: Weak<PortalContext>,
    import_path: ImportPath,
    commands: mpsc::UnboundedSender<Command>,
    stream: Mutex<Option<Arc<StreamInfo>>>,
    session: Mutex<Option<Arc<PortalSession>>>,
    region_changed: Notifier<CaptureRegion>,
    destroyed: Notifier<()>,
}

impl PortalContext {
    fn stream_selected(&self, stream: StreamInfo) {
        let region = stream.region;
        *lock(&self.stream) = Some(Arc::new(stream));
        // A new stream invalidates the old session; dropping it stops its pipeline.
        if let Some(old) = lock(&self.session).take() {
            old.destroyed.emit(&());
        }
        self.region_changed.emit(&region);
    }

    fn current_stream(&self) -> Result<Arc<StreamInfo>, CaptureError> {
        lock(&self.stream)
            .clone()
            .ok_or_else(|| CaptureError::unavailable("no source selected"))
    }
}

impl CaptureContext for PortalContext {
    fn select_source(&self, selection: &SourceSelection) -> Result<(), CaptureError> {
        let context = self
            .weak_self
            .upgrade()
            .ok_or_else(|| CaptureError::unavailable("capture context dropped"))?;
        self.commands
            .send(Command::Select { context, selection: selection.clone() })
            .map_err(|_| CaptureError::Backend("portal worker stopped".into()))
    }

    fn capture_region(&self) -> CaptureRegion {
        lock(&self.stream).as_ref().map(|s| s.region).unwrap_or_default()
    }

    fn on_region_changed(&self) -> &Notifier<CaptureRegion> {
        &self.region_changed
    }

    fn on_destroyed(&self) -> &Notifier<()> {
        &self.destroyed
    }

    fn ensure_session(&self) -> Result<Arc<dyn CaptureSession>, CaptureError> {
        let stream = self.current_stream()?;
        let mut slot = lock(&self.session);
        let session = slot
            .get_or_insert_with(|| PortalSession::new(stream, self.import_path))
            .clone();
        Ok(session)
    }

    fn ensure_frame(&self) -> Result<PendingFrame, CaptureError> {
        let stream = self.current_stream()?;
        let (tx, pending) = frame_channel();
        let guard = launch_still(&stream, tx).map_err(|e| CaptureError::Backend(format!("{e:#}")))?;
        Ok(pending.with_keepalive(guard))
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

/// Buffer transport of a live pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    DmaBuf,
    Shm,
}

pub struct PortalSession {
    weak_self: Weak<PortalSession>,
    stream: Arc<StreamInfo>,
    preferred: Transport,
    started: AtomicBool,
    got_frame: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<BufferDescriptor>>>,
    frame_ready: Notifier<()>,
    destroyed: Notifier<()>,
    pipeline: Mutex<Option<(Transport, PipelineGuard)>>,
}

impl PortalSession {
    fn new(stream: Arc<StreamInfo>, import_path: ImportPath) -> Arc<Self> {
        let preferred = match import_path {
            ImportPath::ZeroCopy => Transport::DmaBuf,
            ImportPath::Mapped => Transport::Shm,
        };
        Arc::new_cyclic(|weak| Self {
            weak_self: weak.clone(),
            stream,
            preferred,
            started: AtomicBool::new(false),
            got_frame: Arc::new(AtomicBool::new(false)),
            latest: Arc::new(Mutex::new(None)),
            frame_ready: Notifier::new(),
            destroyed: Notifier::new(),
            pipeline: Mutex::new(None),
        })
    }

    fn launch_live(&self, transport: Transport) -> anyhow::Result<PipelineGuard> {
        let latest = Arc::clone(&self.latest);
        let frame_ready = self.frame_ready.clone();
        let got_frame = Arc::clone(&self.got_frame);
        let guard = launch(&self.stream, Stage::Live(transport), move |sample| {
            let exported = match transport {
                Transport::DmaBuf => export_dmabuf(sample),
                Transport::Shm => export_shm(sample),
            };
            match exported {
                // Replacing an unconsumed descriptor closes its fds.
                Ok(desc) => {
                    got_frame.store(true, Ordering::SeqCst);
                    *lock(&latest) = Some(desc);
                    frame_ready.emit(&());
                }
                Err(e) => {
                    warn!("Dropping PipeWire sample: {e:#}");
                    // Ends the stream so the bus watch can fall back.
                    if transport == Transport::DmaBuf && !got_frame.load(Ordering::SeqCst) {
                        return false;
                    }
                }
            }
            true
        })?;
        let weak = self.weak_self.clone();
        watch_bus(&guard.pipeline, move |end| {
            if let Some(session) = weak.upgrade() {
                session.pipeline_ended(transport, end);
            }
        });
        Ok(guard)
    }

    /// A dma-buf pipeline that ends without producing a frame (caps not
    /// negotiated, memory that is not a dma-buf) is retried with shared memory.
    fn pipeline_ended(&self, transport: Transport, end: BusEnd) {
        let mut slot = lock(&self.pipeline);
        if !slot.as_ref().is_some_and(|(current, _)| *current == transport) {
            return;
        }
        let retry = transport == Transport::DmaBuf && !self.got_frame.load(Ordering::SeqCst);
        if retry {
            warn!("dma-buf stream ended ({end:?}) before its first frame, falling back to shared memory");
            slot.take();
            match self.launch_live(Transport::Shm) {
                Ok(guard) => {
                    *slot = Some((Transport::Shm, guard));
                    return;
                }
                Err(e) => error!("Shared-memory pipeline failed: {e:#}"),
            }
        }
        slot.take();
        drop(slot);
        self.destroyed.emit(&());
    }
}

impl CaptureSession for PortalSession {
    fn start(&self) -> Result<(), CaptureError> {
        let mut slot = lock(&self.pipeline);
        if slot.is_some() {
            return Ok(());
        }
        let launched = match self.launch_live(self.preferred) {
            Ok(guard) => Ok((self.preferred, guard)),
            Err(e) if self.preferred == Transport::DmaBuf => {
                warn!("dma-buf pipeline unavailable ({e:#}), using shared memory");
                self.launch_live(Transport::Shm).map(|guard| (Transport::Shm, guard))
            }
            Err(e) => Err(e),
        };
        let (transport, guard) = launched.map_err(|e| CaptureError::Backend(format!("{e:#}")))?;
        info!("Live stream started ({transport:?})");
        *slot = Some((transport, guard));
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn acquire_buffer(&self) -> Option<BufferDescriptor> {
        lock(&self.latest).take()
    }

    fn on_frame_ready(&self) -> &Notifier<()> {
        &self.frame_ready
    }

    fn on_destroyed(&self) -> &Notifier<()> {
        &self.destroyed
    }
}

// ── GStreamer pipeline ───────────────────────────────────────────────────────

/// Stops the pipeline on drop. Holds the remote fd `pipewiresrc` was given.
struct PipelineGuard {
    pipeline: gstreamer::Pipeline,
    _remote: OwnedFd,
}

impl Drop for PipelineGuard {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Live(Transport),
    Still,
}

fn pipeline_description(fd: i32, node_id: u32, stage: Stage) -> String {
    let source = format!("pipewiresrc fd={fd} path={node_id}");
    match stage {
        Stage::Live(Transport::DmaBuf) => format!(
            "{source} ! video/x-raw(memory:DMABuf) \
             ! appsink name=sink sync=false max-buffers=2 drop=true"
        ),
        Stage::Live(Transport::Shm) => format!(
            "{source} always-copy=true ! videoconvert ! video/x-raw,format=BGRx \
             ! appsink name=sink sync=false max-buffers=2 drop=true"
        ),
        Stage::Still => format!(
            "{source} always-copy=true ! videoconvert ! video/x-raw,format=BGRx \
             ! appsink name=sink sync=false max-buffers=1"
        ),
    }
}

/// Builds and plays the pipeline for `stage`. `on_sample` returns whether
/// more samples are wanted.
fn launch(
    stream: &StreamInfo,
    stage: Stage,
    on_sample: impl Fn(&gstreamer::Sample) -> bool + Send + Sync + 'static,
) -> anyhow::Result<PipelineGuard> {
    gstreamer::init().context("GStreamer init")?;

    let remote = stream.remote.try_clone().context("dup PipeWire remote")?;
    let desc = pipeline_description(remote.as_raw_fd(), stream.node_id, stage);
    debug!("GStreamer pipeline: {}", desc);

    let pipeline = gstreamer::parse::launch(&desc)
        .context("Parsing GStreamer pipeline")?
        .downcast::<gstreamer::Pipeline>()
        .map_err(|_| anyhow::anyhow!("Expected Pipeline element"))?;

    let appsink: AppSink = pipeline
        .by_name("sink")
        .context("Finding appsink 'sink'")?
        .downcast::<AppSink>()
        .map_err(|_| anyhow::anyhow!("Expected AppSink"))?;

    appsink.set_callbacks(
        AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;
                if on_sample(&sample) {
                    Ok(gstreamer::FlowSuccess::Ok)
                } else {
                    Err(gstreamer::FlowError::Eos)
                }
            })
            .build(),
    );

    let guard = PipelineGuard { pipeline, _remote: remote };
    guard
        .pipeline
        .set_state(gstreamer::State::Playing)
        .context("GStreamer set Playing")?;
    Ok(guard)
}

/// The sample callback and the bus watch race to answer `tx`; an EOS or error
/// before the first sample resolves the frame as failed.
fn launch_still(stream: &StreamInfo, tx: FrameSender) -> anyhow::Result<PipelineGuard> {
    let tx = tx.shared();
    let on_sample = tx.clone();
    let guard = launch(stream, Stage::Still, move |sample| {
        match decode_still(sample) {
            Ok(image) => {
                on_sample.ready(image);
            }
            Err(e) => {
                warn!("Still frame decode failed: {e:#}");
                on_sample.failed();
            }
        }
        false
    })?;
    watch_bus(&guard.pipeline, move |end| {
        if tx.failed() {
            warn!("Still pipeline ended ({end:?}) before a frame arrived");
        }
    });
    Ok(guard)
}

fn video_info(sample: &gstreamer::Sample) -> anyhow::Result<gstreamer_video::VideoInfo> {
    let caps = sample.caps().context("sample without caps")?;
    gstreamer_video::VideoInfo::from_caps(caps).context("parsing video caps")
}

/// Anonymous, close-on-exec memory file.
fn memfd() -> std::io::Result<File> {
    const NAME: &[u8] = b"portalshot-frame\0";
    // SAFETY: the name is NUL-terminated and the returned fd is owned by us.
    let fd = unsafe { libc::memfd_create(NAME.as_ptr().cast(), libc::MFD_CLOEXEC) };
    if fd < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(File::from(unsafe { OwnedFd::from_raw_fd(fd) }))
}

/// Copies a BGRx sample into a memfd and describes it as one plane.
fn export_shm(sample: &gstreamer::Sample) -> anyhow::Result<BufferDescriptor> {
    let info = video_info(sample)?;
    let buffer = sample.buffer().context("sample without buffer")?;
    let map = buffer.map_readable().context("mapping sample")?;

    let mut file = memfd().context("creating frame memfd")?;
    file.write_all(map.as_slice()).context("writing frame memfd")?;

    let plane = Plane::new(OwnedFd::from(file), info.offset()[0] as u32, info.stride()[0] as u32);
    let desc =
        BufferDescriptor::new(info.width(), info.height(), BGRX, None, vec![plane], BufferMemory::Shm)?;
    Ok(desc)
}

/// Fourcc and modifier of dma-buf caps, either `drm-format=XR24:0x...`
/// (`format=DMA_DRM`) or a plain packed `format`.
fn dmabuf_format(caps: &gstreamer::StructureRef) -> anyhow::Result<(u32, Option<u64>)> {
    if let Ok(drm) = caps.get::<&str>("drm-format") {
        return parse_drm_format(drm).with_context(|| format!("unparseable drm-format {drm:?}"));
    }
    let name = caps.get::<&str>("format").context("caps without format")?;
    let code = fourcc_for_video_format(name).with_context(|| format!("unsupported format {name}"))?;
    Ok((code, None))
}

/// Duplicates the dma-buf fds of a sample. No pixels are copied.
fn export_dmabuf(sample: &gstreamer::Sample) -> anyhow::Result<BufferDescriptor> {
    let caps = sample.caps().context("sample without caps")?;
    let structure = caps.structure(0).context("empty caps")?;
    let width = structure.get::<i32>("width").context("caps without width")?;
    let height = structure.get::<i32>("height").context("caps without height")?;
    let (format, modifier) = dmabuf_format(structure)?;

    let buffer = sample.buffer().context("sample without buffer")?;
    let meta = buffer.meta::<gstreamer_video::VideoMeta>();
    let n_planes = meta.as_ref().map_or(1, |m| m.n_planes() as usize);
    let n_memory = buffer.n_memory();
    anyhow::ensure!(n_memory > 0, "buffer without memory");

    let mut planes = Vec::with_capacity(n_planes);
    for i in 0..n_planes {
        let memory = buffer.peek_memory(i.min(n_memory - 1));
        let dmabuf = memory
            .downcast_memory_ref::<DmaBufMemory>()
            .context("buffer memory is not a dma-buf")?;
        // SAFETY: the fd stays open while `sample` is borrowed; we only dup it.
        let fd = unsafe { BorrowedFd::borrow_raw(dmabuf.fd()) }
            .try_clone_to_owned()
            .context("dup dma-buf fd")?;
        // With one memory per plane the memory offset locates the plane;
        // otherwise the video meta does.
        let offset = match &meta {
            Some(m) if n_memory == 1 => m.offset()[i],
            _ => memory.offset(),
        };
        let stride = meta.as_ref().map_or(width as u32 * 4, |m| m.stride()[i] as u32);
        planes.push(Plane::new(fd, offset as u32, stride));
    }

    let desc = BufferDescriptor::new(
        width as u32,
        height as u32,
        format,
        modifier,
        planes,
        BufferMemory::DmaBuf,
    )?;
    Ok(desc)
}

fn decode_still(sample: &gstreamer::Sample) -> anyhow::Result<image::RgbaImage> {
    let info = video_info(sample)?;
    let buffer = sample.buffer().context("sample without buffer")?;
    let map = buffer.map_readable().context("mapping sample")?;
    let offset = info.offset()[0];
    let bytes = map.as_slice().get(offset..).context("plane offset past end of sample")?;
    let image = pixel::to_rgba(bytes, info.width(), info.height(), info.stride()[0] as u32, BGRX)?;
    Ok(image)
}

#[derive(Debug, Clone, Copy)]
enum BusEnd {
    Eos,
    Error,
}

/// Calls `on_end` once on EOS or error. Exits once the pipeline is gone.
fn watch_bus(pipeline: &gstreamer::Pipeline, on_end: impl FnOnce(BusEnd) + Send + 'static) {
    let Some(bus) = pipeline.bus() else { return };
    let weak = pipeline.downgrade();
    tokio::task::spawn_blocking(move || {
        let end = loop {
            match bus.timed_pop(gstreamer::ClockTime::from_mseconds(500)) {
                Some(msg) => match msg.view() {
                    gstreamer::MessageView::Eos(_) => {
                        info!("GStreamer pipeline EOS");
                        break BusEnd::Eos;
                    }
                    gstreamer::MessageView::Error(e) => {
                        error!("GStreamer error: {}", e.error());
                        break BusEnd::Error;
                    }
                    _ => {}
                },
                None => {
                    if weak.upgrade().is_none() {
                        return;
                    }
                }
            }
        };
        on_end(end);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dmabuf_pipeline_requests_dmabuf_caps_without_conversion() {
        let desc = pipeline_description(7, 42, Stage::Live(Transport::DmaBuf));
        assert!(desc.starts_with("pipewiresrc fd=7 path=42 !"));
        assert!(desc.contains("video/x-raw(memory:DMABuf)"));
        assert!(!desc.contains("always-copy"));
        assert!(!desc.contains("videoconvert"));
    }

    #[test]
    fn shm_and_still_pipelines_convert_to_bgrx() {
        for stage in [Stage::Live(Transport::Shm), Stage::Still] {
            let desc = pipeline_description(7, 42, stage);
            assert!(desc.contains("always-copy=true"));
            assert!(desc.contains("video/x-raw,format=BGRx"));
        }
        assert!(pipeline_description(7, 42, Stage::Still).contains("max-buffers=1"));
    }

    #[test]
    fn dmabuf_caps_format_sources() {
        gstreamer::init().unwrap();
        let drm = gstreamer::Structure::builder("video/x-raw")
            .field("format", "DMA_DRM")
            .field("drm-format", "AR24:0x0100000000000002")
            .build();
        assert_eq!(
            dmabuf_format(&drm).unwrap(),
            (DrmFourcc::Argb8888 as u32, Some(0x0100_0000_0000_0002))
        );

        let packed = gstreamer::Structure::builder("video/x-raw").field("format", "BGRx").build();
        assert_eq!(dmabuf_format(&packed).unwrap(), (BGRX, None));

        let planar = gstreamer::Structure::builder("video/x-raw").field("format", "NV12").build();
        assert!(dmabuf_format(&planar).is_err());
    }

    #[test]
    fn memfd_holds_frame_bytes() {
        use std::io::{Read, Seek, SeekFrom};

        let mut file = memfd().unwrap();
        file.write_all(&[1, 2, 3, 4]).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, [1, 2, 3, 4]);
    }
}
