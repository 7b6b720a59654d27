//! Native handle of the toolbar window.

use portalshot_core::SurfaceHandle;
use raw_window_handle::RawWindowHandle;

/// The surface id the selection UI should leave out. `None` on platforms
/// without a numeric window id.
pub fn exclude_surface(handle: RawWindowHandle) -> Option<SurfaceHandle> {
    let id = match handle {
        RawWindowHandle::Xlib(h) => h.window as u64,
        RawWindowHandle::Xcb(h) => u64::from(h.window.get()),
        // wl_surface proxy address; only meaningful within this process.
        RawWindowHandle::Wayland(h) => h.surface.as_ptr() as usize as u64,
        _ => return None,
    };
    Some(SurfaceHandle(id))
}
