//! EGL image import + glow drawing inside eframe's GL context.
//!
//! ```text
//! BufferDescriptor ──eglCreateImage(LINUX_DMA_BUF)──► EGLImage
//!                          │
//!            glEGLImageTargetTexture2DOES ──► GL texture ──► quad (TRIANGLE_FAN)
//! ```
//!
//! eframe owns the context and the swap: "current" means the paint callback
//! is running, so `done_current` and `present` leave the context alone.
//!
//! EGL is only needed for dma-buf import. When libEGL is missing, or eframe
//! runs on GLX, mapped uploads and drawing still go through glow and dma-buf
//! frames fail to import with `EGL_BAD_DISPLAY`.

use std::borrow::Cow;
use std::ffi::{c_char, c_void, CStr};
use std::ptr;

use glow::HasContext;
use khronos_egl as egl;
use tracing::{debug, error, info, trace, warn};

use crate::attribs::{Attrib, EGL_LINUX_DMA_BUF_EXT, EGL_NONE};
use crate::{GpuBackend, Quad, RendererError};

type ImageTargetTexture2dOes = unsafe extern "system" fn(target: u32, image: *mut c_void);

type DebugProc = unsafe extern "system" fn(
    error: egl::Enum,
    command: *const c_char,
    message_type: egl::Int,
    thread_label: *mut c_void,
    object_label: *mut c_void,
    message: *const c_char,
);
type DebugMessageControl = unsafe extern "system" fn(callback: Option<DebugProc>, attribs: *const Attrib) -> egl::Int;

const EGL_DEBUG_MSG_CRITICAL_KHR: Attrib = 0x33B9;
const EGL_DEBUG_MSG_ERROR_KHR: Attrib = 0x33BA;
const EGL_DEBUG_MSG_WARN_KHR: Attrib = 0x33BB;
const EGL_DEBUG_MSG_INFO_KHR: Attrib = 0x33BC;

const VERTEX_SHADER: &str = r#"
in vec2 a_pos;
in vec2 a_tex;
out vec2 v_tex;
void main() {
    // Texture rows are stored top-down. Flipping v departs from the GL
    // convention of sampling (0,0) at vertex (-1,-1) so frames show upright.
    v_tex = vec2(a_tex.x, 1.0 - a_tex.y);
    gl_Position = vec4(a_pos, 0.0, 1.0);
}
"#;

const FRAGMENT_SHADER: &str = r#"
precision mediump float;
uniform sampler2D u_tex;
in vec2 v_tex;
out vec4 frag_color;
void main() {
    frag_color = texture(u_tex, v_tex);
}
"#;

// ── Renderer ─────────────────────────────────────────────────────────────────

struct QuadPipeline {
    program: glow::Program,
    vao: glow::VertexArray,
    vbo: glow::Buffer,
    u_tex: Option<glow::UniformLocation>,
}

/// libEGL plus the GL entry point that binds an EGL image to a texture.
struct EglImport {
    egl: egl::DynamicInstance<egl::EGL1_5>,
    image_target: ImageTargetTexture2dOes,
}

impl EglImport {
    fn load(debug: bool) -> Result<Self, RendererError> {
        let egl = unsafe { egl::DynamicInstance::<egl::EGL1_5>::load_required() }
            .map_err(|e| RendererError::Unavailable(format!("libEGL: {e}")))?;

        let proc = egl
            .get_proc_address("glEGLImageTargetTexture2DOES")
            .ok_or_else(|| RendererError::Unavailable("glEGLImageTargetTexture2DOES missing".into()))?;
        let image_target: ImageTargetTexture2dOes = unsafe { std::mem::transmute(proc) };

        if debug {
            install_debug_callback(&egl);
        }
        info!("EGL loaded (version {:?})", egl.version());
        Ok(Self { egl, image_target })
    }

    /// The display backing the current context, if the context is EGL.
    fn current_display(&self) -> Option<egl::Display> {
        import_display(self.egl.get_current_display(), self.egl.get_current_context().is_some()).ok()
    }
}

/// Long-lived GL state of the preview, with optional EGL import support.
/// Lives on the GUI thread.
pub struct EglRenderer {
    import: Option<EglImport>,
    pipeline: Option<QuadPipeline>,
}

impl EglRenderer {
    /// Loads libEGL and resolves `glEGLImageTargetTexture2DOES`. With
    /// `debug` set, driver messages are forwarded to `tracing`. Without EGL the
    /// renderer still draws mapped frames.
    pub fn load(debug: bool) -> Self {
        let import = match EglImport::load(debug) {
            Ok(import) => Some(import),
            Err(e) => {
                warn!("dma-buf import disabled: {e}");
                None
            }
        };
        Self { import, pipeline: None }
    }

    pub fn can_import(&self) -> bool {
        self.import.is_some()
    }

    /// Borrows the renderer for one paint callback on `gl`.
    pub fn bind<'a>(&'a mut self, gl: &'a glow::Context) -> Result<GlowBackend<'a>, RendererError> {
        if self.pipeline.is_none() {
            self.pipeline = Some(unsafe { create_pipeline(gl) }?);
        }
        Ok(GlowBackend { renderer: self, gl, display: None })
    }

    /// Frees the GL objects. Call with the context current.
    pub fn destroy(&mut self, gl: &glow::Context) {
        if let Some(p) = self.pipeline.take() {
            unsafe {
                gl.delete_program(p.program);
                gl.delete_vertex_array(p.vao);
                gl.delete_buffer(p.vbo);
            }
        }
    }
}

fn install_debug_callback(egl: &egl::DynamicInstance<egl::EGL1_5>) {
    let client_exts = match egl.query_string(None, egl::EXTENSIONS) {
        Ok(exts) => exts.to_string_lossy().into_owned(),
        Err(e) => {
            debug!("EGL client extensions unavailable: {e}");
            return;
        }
    };
    if !client_exts.split_whitespace().any(|ext| ext == "EGL_KHR_debug") {
        debug!("EGL_KHR_debug not advertised");
        return;
    }
    let Some(proc) = egl.get_proc_address("eglDebugMessageControlKHR") else { return };
    let control: DebugMessageControl = unsafe { std::mem::transmute(proc) };

    let attribs = [
        EGL_DEBUG_MSG_CRITICAL_KHR,
        1,
        EGL_DEBUG_MSG_ERROR_KHR,
        1,
        EGL_DEBUG_MSG_WARN_KHR,
        1,
        EGL_DEBUG_MSG_INFO_KHR,
        1,
        EGL_NONE,
    ];
    let status = unsafe { control(Some(egl_debug_message), attribs.as_ptr()) };
    if status == egl::SUCCESS {
        debug!("EGL debug messages routed to tracing");
    } else {
        warn!("eglDebugMessageControlKHR failed: 0x{status:04x}");
    }
}

unsafe extern "system" fn egl_debug_message(
    error: egl::Enum,
    command: *const c_char,
    message_type: egl::Int,
    _thread_label: *mut c_void,
    _object_label: *mut c_void,
    message: *const c_char,
) {
    let (command, message) = (c_text(command), c_text(message));
    match message_type as Attrib {
        EGL_DEBUG_MSG_CRITICAL_KHR | EGL_DEBUG_MSG_ERROR_KHR => {
            error!(target: "egl", "{command}: {message} (0x{error:04x})")
        }
        EGL_DEBUG_MSG_WARN_KHR => warn!(target: "egl", "{command}: {message} (0x{error:04x})"),
        _ => info!(target: "egl", "{command}: {message}"),
    }
}

unsafe fn c_text<'a>(p: *const c_char) -> Cow<'a, str> {
    if p.is_null() {
        Cow::Borrowed("")
    } else {
        CStr::from_ptr(p).to_string_lossy()
    }
}

unsafe fn create_pipeline(gl: &glow::Context) -> Result<QuadPipeline, RendererError> {
    let version = if gl.version().is_embedded { "#version 300 es" } else { "#version 330 core" };

    let program = gl.create_program().map_err(RendererError::Gpu)?;
    let mut shaders = Vec::with_capacity(2);
    for (kind, source) in [(glow::VERTEX_SHADER, VERTEX_SHADER), (glow::FRAGMENT_SHADER, FRAGMENT_SHADER)] {
        let shader = gl.create_shader(kind).map_err(RendererError::Gpu)?;
        gl.shader_source(shader, &format!("{version}\n{source}"));
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            gl.delete_program(program);
            return Err(RendererError::Gpu(format!("shader compile error: {log}")));
        }
        gl.attach_shader(program, shader);
        shaders.push(shader);
    }
    gl.bind_attrib_location(program, 0, "a_pos");
    gl.bind_attrib_location(program, 1, "a_tex");
    gl.link_program(program);
    for shader in shaders {
        gl.detach_shader(program, shader);
        gl.delete_shader(shader);
    }
    if !gl.get_program_link_status(program) {
        let log = gl.get_program_info_log(program);
        gl.delete_program(program);
        return Err(RendererError::Gpu(format!("program link error: {log}")));
    }
    let u_tex = gl.get_uniform_location(program, "u_tex");

    let vao = gl.create_vertex_array().map_err(RendererError::Gpu)?;
    let vbo = gl.create_buffer().map_err(RendererError::Gpu)?;
    gl.bind_vertex_array(Some(vao));
    gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
    let stride = 4 * std::mem::size_of::<f32>() as i32;
    gl.enable_vertex_attrib_array(0);
    gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, stride, 0);
    gl.enable_vertex_attrib_array(1);
    gl.vertex_attrib_pointer_f32(1, 2, glow::FLOAT, false, stride, 2 * std::mem::size_of::<f32>() as i32);
    gl.bind_vertex_array(None);
    gl.bind_buffer(glow::ARRAY_BUFFER, None);

    debug!("Preview quad pipeline created ({version})");
    Ok(QuadPipeline { program, vao, vbo, u_tex })
}

/// EGL images can only be created against a display whose context is current.
fn import_display(display: Option<egl::Display>, context_current: bool) -> Result<egl::Display, i32> {
    match display {
        Some(display) if context_current => Ok(display),
        _ => Err(egl::BAD_DISPLAY),
    }
}

/// Interleaves positions and texture coordinates as `x, y, u, v` per vertex.
fn quad_vertices(quad: &Quad) -> Vec<u8> {
    quad.positions
        .iter()
        .zip(quad.tex_coords.iter())
        .flat_map(|(p, t)| [p[0], p[1], t[0], t[1]])
        .flat_map(f32::to_ne_bytes)
        .collect()
}

// ── Backend ──────────────────────────────────────────────────────────────────

/// [`GpuBackend`] over the context that is current during a paint callback.
pub struct GlowBackend<'a> {
    renderer: &'a mut EglRenderer,
    gl: &'a glow::Context,
    display: Option<egl::Display>,
}

impl GlowBackend<'_> {
    unsafe fn set_linear(&self) {
        let gl = self.gl;
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
    }
}

impl GpuBackend for GlowBackend<'_> {
    type Texture = glow::Texture;
    type Image = egl::Image;

    /// The paint callback always runs with eframe's context current, so glow
    /// is usable. The EGL display is picked up when the context is EGL.
    fn make_current(&mut self) -> Result<(), RendererError> {
        self.display = self.renderer.import.as_ref().and_then(EglImport::current_display);
        Ok(())
    }

    fn done_current(&mut self) {
        self.display = None;
    }

    fn create_image(&mut self, attribs: &[Attrib]) -> Result<egl::Image, i32> {
        let Some(import) = self.renderer.import.as_ref() else { return Err(egl::BAD_DISPLAY) };
        let display = import_display(self.display, true)?;
        let (no_context, no_buffer) = unsafe {
            (egl::Context::from_ptr(egl::NO_CONTEXT), egl::ClientBuffer::from_ptr(ptr::null_mut()))
        };
        import
            .egl
            .create_image(display, no_context, EGL_LINUX_DMA_BUF_EXT, no_buffer, attribs)
            .map_err(|e| e.native())
    }

    fn destroy_image(&mut self, image: egl::Image) {
        let (Some(import), Some(display)) = (self.renderer.import.as_ref(), self.display) else { return };
        if let Err(e) = import.egl.destroy_image(display, image) {
            warn!("eglDestroyImage failed: {e}");
        }
    }

    fn create_texture(&mut self) -> Result<glow::Texture, RendererError> {
        unsafe {
            let texture = self.gl.create_texture().map_err(RendererError::Gpu)?;
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            self.set_linear();
            self.gl.bind_texture(glow::TEXTURE_2D, None);
            Ok(texture)
        }
    }

    fn delete_texture(&mut self, texture: glow::Texture) {
        unsafe { self.gl.delete_texture(texture) }
    }

    fn bind_image(&mut self, texture: glow::Texture, image: &egl::Image) {
        let Some(import) = self.renderer.import.as_ref() else { return };
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            (import.image_target)(glow::TEXTURE_2D, image.as_ptr());
            self.set_linear();
            self.gl.bind_texture(glow::TEXTURE_2D, None);
        }
    }

    fn upload_rgba(&mut self, texture: glow::Texture, width: u32, height: u32, pixels: &[u8]) {
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 4);
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA8 as i32,
                width as i32,
                height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                Some(pixels),
            );
            self.gl.bind_texture(glow::TEXTURE_2D, None);
        }
    }

    fn clear(&mut self, width: u32, height: u32) {
        // The paint callback's viewport already matches the preview rect.
        trace!("clear {}x{}", width, height);
        unsafe {
            self.gl.clear_color(0.0, 0.0, 0.0, 1.0);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn draw_quad(&mut self, texture: glow::Texture, quad: &Quad) {
        let Some(p) = self.renderer.pipeline.as_ref() else { return };
        let vertices = quad_vertices(quad);
        unsafe {
            let gl = self.gl;
            gl.use_program(Some(p.program));
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.uniform_1_i32(p.u_tex.as_ref(), 0);
            gl.bind_vertex_array(Some(p.vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(p.vbo));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, &vertices, glow::DYNAMIC_DRAW);
            gl.draw_arrays(glow::TRIANGLE_FAN, 0, 4);
            gl.bind_vertex_array(None);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
            gl.bind_texture(glow::TEXTURE_2D, None);
            gl.use_program(None);
        }
    }

    fn present(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FULL_SURFACE_QUAD;

    #[test]
    fn no_egl_context_rejects_image_import() {
        assert_eq!(import_display(None, false), Err(egl::BAD_DISPLAY));
        assert_eq!(import_display(None, true), Err(egl::BAD_DISPLAY));

        let display = unsafe { egl::Display::from_ptr(0x1 as egl::EGLDisplay) };
        assert_eq!(import_display(Some(display), false), Err(egl::BAD_DISPLAY));
        assert_eq!(import_display(Some(display), true), Ok(display));
    }

    #[test]
    fn quad_vertices_interleave_position_and_texcoord() {
        let bytes = quad_vertices(&FULL_SURFACE_QUAD);
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(
            floats,
            vec![
                -1.0, -1.0, 0.0, 0.0, //
                1.0, -1.0, 1.0, 0.0, //
                1.0, 1.0, 1.0, 1.0, //
                -1.0, 1.0, 0.0, 1.0,
            ]
        );
    }
}
