pub mod buffer;
pub mod config;
pub mod errors;
pub mod pixel;
pub mod types;

pub use buffer::{
    fourcc_for_video_format, parse_drm_format, BufferDescriptor, BufferMemory, Plane, MAX_PLANES,
};
pub use config::{CaptureConfig, ImportPath};
pub use errors::{CaptureError, ConfigError, ImportError};
pub use types::*;
