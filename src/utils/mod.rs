//! Utility module for playctl
//!
//! This module provides common utilities used throughout the engine:
//! - Error handling with custom error types
//! - Configuration management
//! - Common helper functions

pub mod config;
pub mod error;

// Re-export commonly used items
pub use config::{Config, GeneralConfig, SchedulerConfig, SessionConfig, SyncConfig, SyncReference};
pub use error::{ErrorKind, IntoPlayerError, PlaybackError, PlayerError, Result};

/// Initialize the engine configuration
///
/// Loads configuration from:
/// 1. Default values
/// 2. System configuration file
/// 3. User configuration file
/// 4. Environment variables
///
/// # Returns
///
/// Returns the loaded configuration or an error if loading fails
pub fn load_config() -> Result<Config> {
    Config::load()
}

/// Format a stream position for display
///
/// # Arguments
///
/// * `position_ms` - Position in milliseconds; negative values render as zero
///
/// # Returns
///
/// Formatted string in the format "HH:MM:SS.mmm" or "MM:SS.mmm" for positions under an hour
pub fn format_position_ms(position_ms: i64) -> String {
    let position_ms = position_ms.max(0);
    let millis = position_ms % 1000;
    let total_secs = position_ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
    } else {
        format!("{:02}:{:02}.{:03}", minutes, seconds, millis)
    }
}

/// Clamp a value between min and max
///
/// # Arguments
///
/// * `value` - Value to clamp
/// * `min` - Minimum value
/// * `max` - Maximum value
///
/// # Returns
///
/// The clamped value
pub fn clamp<T: PartialOrd>(value: T, min: T, max: T) -> T {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}
