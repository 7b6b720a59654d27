use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Capture context unavailable: {reason}")]
    SelectionUnavailable { reason: String },

    #[error("Capture frame failed")]
    FrameFailed,

    #[error("Failed to save screenshot: {reason}")]
    SaveFailed { reason: String },

    #[error("Capture backend error: {0}")]
    Backend(String),

    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    pub fn save_failed(reason: impl Into<String>) -> Self {
        Self::SaveFailed { reason: reason.into() }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::SelectionUnavailable { reason: reason.into() }
    }
}

/// Failures of a single frame import. None of these are fatal: the frame is
/// dropped and the next one is attempted.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("EGL rejected the dma-buf import (EGL error 0x{code:04x})")]
    ImportFailed { code: i32 },

    #[error("mmap of plane 0 failed: {source}")]
    MapFailed {
        #[source]
        source: std::io::Error,
    },

    #[error("Buffer has {count} planes, at most {max} are supported")]
    TooManyPlanes { count: usize, max: usize },

    #[error("Buffer has no planes")]
    NoPlanes,

    #[error("Invalid buffer geometry: {reason}")]
    InvalidGeometry { reason: String },

    #[error("Unsupported pixel format {0}")]
    UnsupportedFormat(String),

    #[error("GPU error: {0}")]
    Gpu(String),
}

impl ImportError {
    /// The raw OS error behind a failed mapping, if any.
    pub fn os_error(&self) -> Option<i32> {
        match self {
            Self::MapFailed { source } => source.raw_os_error(),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
