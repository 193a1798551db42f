//! Configuration management for playctl
//!
//! This module handles loading and managing engine configuration
//! from config files and environment variables.

use crate::utils::error::{IntoPlayerError, PlayerError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default progress notification interval
pub const DEFAULT_PROGRESS_INTERVAL_MS: u32 = 300;
/// Smallest progress notification interval accepted
pub const MIN_PROGRESS_INTERVAL_MS: u32 = 50;

pub const DEFAULT_VIDEO_ES_BUFFER_SIZE: u32 = 2 * 1024 * 1024;
pub const MIN_VIDEO_ES_BUFFER_SIZE: u32 = 512 * 1024;
pub const MAX_VIDEO_ES_BUFFER_SIZE: u32 = 16 * 1024 * 1024;

pub const DEFAULT_AUDIO_ES_BUFFER_SIZE: u32 = 256 * 1024;
pub const MIN_AUDIO_ES_BUFFER_SIZE: u32 = 32 * 1024;
pub const MAX_AUDIO_ES_BUFFER_SIZE: u32 = 2 * 1024 * 1024;

pub const DEFAULT_DECODER_OUTPUT_BUFFERS: u32 = 4;
pub const MIN_DECODER_OUTPUT_BUFFERS: u32 = 2;
pub const MAX_DECODER_OUTPUT_BUFFERS: u32 = 16;

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-session settings
    pub session: SessionConfig,

    /// Sync engine tuning
    pub sync: SyncConfig,

    /// Scheduling thread backoffs
    pub scheduler: SchedulerConfig,

    /// General settings
    pub general: GeneralConfig,
}

/// Settings applied when a playback session is created
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Minimum interval between progress events (0 selects the default)
    pub progress_interval_ms: u32,

    /// Video elementary-stream buffer size in bytes
    pub video_es_buffer_size: u32,

    /// Audio elementary-stream buffer size in bytes
    pub audio_es_buffer_size: u32,

    /// Number of decoded output buffers per decoder
    pub decoder_output_buffers: u32,

    /// Hold playback after the first rendered frame
    pub pause_after_first_frame: bool,

    /// Decoder picture width used when the stream does not report one
    pub default_width: u32,

    /// Decoder picture height used when the stream does not report one
    pub default_height: u32,
}

/// Which channel paces the other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncReference {
    /// Audio device position is the master clock
    Audio,

    /// Video timestamps drive the clock
    Video,

    /// Each channel runs on its own wall-clock mapping
    None,
}

/// Sync engine tolerance windows, in milliseconds of lateness
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Reference channel policy
    pub reference: SyncReference,

    /// A frame earlier than this is held back (repeat)
    pub start_region_early_ms: i64,

    /// A frame later than this is still played but counted as late
    pub start_region_late_ms: i64,

    /// A frame this far ahead is treated as a discontinuity and dropped
    pub stop_region_early_ms: i64,

    /// A frame this far behind is too stale and dropped
    pub stop_region_late_ms: i64,

    /// Consecutive drops after which one frame is forced out
    pub continuous_loss_cap: u32,

    /// Delay before the first video frame when there is no audio track
    pub video_startup_grace_ms: i64,
}

/// Scheduling thread sleeps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Backoff when a device reports it is full or a frame must wait
    pub render_full_backoff_ms: u64,

    /// Backoff when a decoder input queue is full
    pub queue_full_backoff_ms: u64,

    /// Backoff when the source has no data yet
    pub no_data_backoff_ms: u64,

    /// Backoff once every started sink has rendered end-of-stream
    pub eos_backoff_ms: u64,

    /// Bounded wait while paused
    pub pause_wait_ms: u64,

    /// Window after a seek is serviced in which a newer seek supersedes it
    pub seek_settle_ms: u64,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
            video_es_buffer_size: DEFAULT_VIDEO_ES_BUFFER_SIZE,
            audio_es_buffer_size: DEFAULT_AUDIO_ES_BUFFER_SIZE,
            decoder_output_buffers: DEFAULT_DECODER_OUTPUT_BUFFERS,
            pause_after_first_frame: false,
            default_width: 1920,
            default_height: 1080,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reference: SyncReference::Audio,
            start_region_early_ms: 10,
            start_region_late_ms: 40,
            stop_region_early_ms: 5_000,
            stop_region_late_ms: 1_000,
            continuous_loss_cap: 10,
            video_startup_grace_ms: 40,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            render_full_backoff_ms: 5,
            queue_full_backoff_ms: 5,
            no_data_backoff_ms: 5,
            eos_backoff_ms: 3_000,
            pause_wait_ms: 10,
            seek_settle_ms: 20,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl SessionConfig {
    /// Apply floors and ceilings, logging every adjustment
    pub fn normalize(&mut self) {
        if self.progress_interval_ms == 0 {
            self.progress_interval_ms = DEFAULT_PROGRESS_INTERVAL_MS;
        } else if self.progress_interval_ms < MIN_PROGRESS_INTERVAL_MS {
            warn!(
                "progress interval {}ms below floor, using {}ms",
                self.progress_interval_ms, MIN_PROGRESS_INTERVAL_MS
            );
            self.progress_interval_ms = MIN_PROGRESS_INTERVAL_MS;
        }

        self.video_es_buffer_size = clamp_logged(
            "video ES buffer size",
            self.video_es_buffer_size,
            MIN_VIDEO_ES_BUFFER_SIZE,
            MAX_VIDEO_ES_BUFFER_SIZE,
        );
        self.audio_es_buffer_size = clamp_logged(
            "audio ES buffer size",
            self.audio_es_buffer_size,
            MIN_AUDIO_ES_BUFFER_SIZE,
            MAX_AUDIO_ES_BUFFER_SIZE,
        );
        self.decoder_output_buffers = clamp_logged(
            "decoder output buffers",
            self.decoder_output_buffers,
            MIN_DECODER_OUTPUT_BUFFERS,
            MAX_DECODER_OUTPUT_BUFFERS,
        );
    }
}

fn clamp_logged(name: &str, value: u32, min: u32, max: u32) -> u32 {
    let clamped = crate::utils::clamp(value, min, max);
    if clamped != value {
        warn!("{} {} out of range [{}, {}], using {}", name, value, min, max, clamped);
    }
    clamped
}

impl Config {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. System config file (/etc/playctl/config.toml on Linux)
    /// 3. User config file (~/.config/playctl/config.toml on Linux)
    /// 4. Environment variables (PLAYCTL_* prefix)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(system_path) = Self::system_config_path() {
            if system_path.exists() {
                config = Self::parse_file(&system_path)?;
            }
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                config = Self::parse_file(&user_path)?;
            }
        }

        config.apply_env_overrides()?;
        config.session.normalize();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a single TOML file, without environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config = Self::parse_file(path)?;
        config.session.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the given path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).config_err("Failed to create config directory")?;
        }

        let toml = toml::to_string_pretty(self).config_err("Failed to serialize config")?;
        std::fs::write(path, toml).config_err("Failed to write config file")?;

        Ok(())
    }

    /// Save configuration to user config file
    pub fn save(&self) -> Result<()> {
        let path = Self::user_config_path()
            .ok_or_else(|| PlayerError::Config("Cannot determine user config path".to_string()))?;
        self.save_to(&path)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).config_err("Failed to read config file")?;
        toml::from_str(&contents).config_err("Failed to parse config file")
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(interval) = std::env::var("PLAYCTL_PROGRESS_INTERVAL_MS") {
            self.session.progress_interval_ms = interval
                .parse()
                .map_err(|_| PlayerError::Config("Invalid PLAYCTL_PROGRESS_INTERVAL_MS".to_string()))?;
        }

        if let Ok(flag) = std::env::var("PLAYCTL_PAUSE_AFTER_FIRST_FRAME") {
            self.session.pause_after_first_frame = flag
                .parse()
                .map_err(|_| PlayerError::Config("Invalid PLAYCTL_PAUSE_AFTER_FIRST_FRAME".to_string()))?;
        }

        if let Ok(reference) = std::env::var("PLAYCTL_SYNC_REFERENCE") {
            self.sync.reference = match reference.as_str() {
                "audio" => SyncReference::Audio,
                "video" => SyncReference::Video,
                "none" => SyncReference::None,
                _ => return Err(PlayerError::Config("Invalid PLAYCTL_SYNC_REFERENCE".to_string())),
            };
        }

        if let Ok(log_level) = std::env::var("PLAYCTL_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let sync = &self.sync;
        if sync.start_region_early_ms < 0
            || sync.start_region_late_ms < 0
            || sync.stop_region_early_ms < 0
            || sync.stop_region_late_ms < 0
        {
            return Err(PlayerError::Config("Sync regions must be non-negative".to_string()));
        }

        if sync.start_region_early_ms >= sync.stop_region_early_ms
            || sync.start_region_late_ms >= sync.stop_region_late_ms
        {
            return Err(PlayerError::Config(
                "Start region must lie inside the stop region".to_string(),
            ));
        }

        if sync.continuous_loss_cap == 0 {
            return Err(PlayerError::Config("Continuous loss cap must be non-zero".to_string()));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(PlayerError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level, valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        #[cfg(unix)]
        return Some(PathBuf::from("/etc/playctl/config.toml"));

        #[allow(unreachable_code)]
        None
    }

    /// Get user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("playctl").join("config.toml"))
    }
}
