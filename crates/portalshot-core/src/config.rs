use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::ConfigError;

pub const CONFIG_ENV: &str = "PORTALSHOT_CONFIG";
pub const SETTLE_ENV: &str = "PORTALSHOT_SETTLE_MS";
pub const IMPORT_ENV: &str = "PORTALSHOT_IMPORT";

/// How live frames reach the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportPath {
    /// EGL dma-buf import, falling back to mapping for shared-memory buffers.
    #[default]
    #[serde(alias = "zeroCopy")]
    ZeroCopy,
    /// Always mmap plane 0 and upload the pixels.
    Mapped,
}

impl std::str::FromStr for ImportPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zero-copy" | "zerocopy" | "dmabuf" => Ok(Self::ZeroCopy),
            "mapped" | "mmap" | "shm" => Ok(Self::Mapped),
            other => Err(format!("unknown import path '{other}'")),
        }
    }
}

/// Runtime configuration of the capture pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Delay between `start()` and the "recording started" notice.
    #[serde(alias = "settleDelayMs")]
    pub settle_delay_ms: u64,
    /// Upper bound on waiting for a screenshot frame.
    #[serde(alias = "frameTimeoutMs")]
    pub frame_timeout_ms: u64,
    #[serde(alias = "importPath")]
    pub import_path: ImportPath,
    /// Overrides the desktop pictures directory for screenshots.
    #[serde(alias = "saveDir")]
    pub save_dir: Option<PathBuf>,
    #[serde(alias = "filePrefix")]
    pub file_prefix: String,
    #[serde(alias = "startInRecordMode")]
    pub start_in_record_mode: bool,
    #[serde(alias = "eglDebug")]
    pub egl_debug: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 1000,
            frame_timeout_ms: 5000,
            import_path: ImportPath::ZeroCopy,
            save_dir: None,
            file_prefix: "portal screenshot".into(),
            start_in_record_mode: false,
            egl_debug: true,
        }
    }
}

impl CaptureConfig {
    pub fn settle_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.settle_delay_ms)
    }

    pub fn frame_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.frame_timeout_ms)
    }

    /// `$PORTALSHOT_CONFIG`, else `<config_dir>/portalshot/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        match std::env::var_os(CONFIG_ENV) {
            Some(p) if !p.is_empty() => Some(PathBuf::from(p)),
            _ => dirs::config_dir().map(|d| d.join("portalshot").join("config.json")),
        }
    }

    /// Loads the config file (missing file means defaults) and applies the
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match Self::default_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io { path: path.display().to_string(), source });
            }
        };
        serde_json::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.display().to_string(), source })
    }

    /// Applies `PORTALSHOT_SETTLE_MS` / `PORTALSHOT_IMPORT`. Unparseable values
    /// are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(SETTLE_ENV) {
            match raw.trim().parse() {
                Ok(ms) => self.settle_delay_ms = ms,
                Err(_) => warn!("Ignoring {SETTLE_ENV}={raw:?}"),
            }
        }
        if let Some(raw) = lookup(IMPORT_ENV) {
            match raw.parse() {
                Ok(path) => self.import_path = path,
                Err(e) => warn!("Ignoring {IMPORT_ENV}: {e}"),
            }
        }
    }
}
