//! CLI configuration management.
//!
//! Configuration is stored as JSON:
//! - Linux: `~/.config/qrferry/config.json`
//! - Windows: `%APPDATA%/qrferry/config.json`
//! - Elsewhere: `/tmp/qrferry/config.json`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use qrferry_protocol::ErrorCorrectionLevel;
use qrferry_protocol::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_FILE_SIZE};
use qrferry_session::{ReceiverConfig, RenderOptions, SenderConfig};

/// Transfer settings shared by every command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Payload bytes per data chunk.
    pub chunk_size: usize,

    /// Largest file the sender accepts.
    pub max_file_size: u64,

    /// Gzip the whole file when that makes it smaller.
    pub compress_file: bool,

    /// Gzip individual chunks when that makes them smaller.
    pub compress_chunks: bool,

    pub error_correction: ErrorCorrectionLevel,

    /// Rendered symbol edge length in pixels.
    pub qr_size: u32,

    /// Playback rate in frames per second.
    pub fps: u32,

    pub loop_playback: bool,

    /// Delay between camera polls.
    pub scan_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            compress_file: true,
            compress_chunks: true,
            error_correction: ErrorCorrectionLevel::M,
            qr_size: 400,
            fps: 5,
            loop_playback: false,
            scan_interval_ms: 100,
        }
    }
}

impl AppConfig {
    /// Loads `explicit`, or the default config file when `None`.
    ///
    /// A missing file yields defaults. An unreadable or unparsable file is
    /// logged and also yields defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };
        Ok(Self::load_from(&path))
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to read config, using defaults"
                );
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "configuration loaded");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Writes pretty JSON to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            chunk_size: self.chunk_size,
            max_file_size: self.max_file_size,
            compress_file: self.compress_file,
            compress_chunks: self.compress_chunks,
            render: RenderOptions {
                size: self.qr_size,
                error_correction: self.error_correction,
            },
            fps: self.fps,
            loop_playback: self.loop_playback,
        }
    }

    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            scan_interval: Duration::from_millis(self.scan_interval_ms),
        }
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    Ok(config_base_dir()?.join("qrferry").join("config.json"))
}

fn config_base_dir() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home).join(".config"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp"))
    }
}
