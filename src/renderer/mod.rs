//! Video output module for playctl
//!
//! This module defines the video output device interface and the video
//! sink that paces decoded pictures onto it.

mod sink;

pub use sink::VideoSink;

use crate::decoder::VideoPicture;
use crate::sink::WriteStatus;
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};

/// Video output device interface, implemented by the host
pub trait VideoDevice: Send {
    /// Open the device
    ///
    /// # Arguments
    ///
    /// * `attr` - Picture size and initial display region
    fn open(&mut self, attr: &VideoSinkAttr) -> Result<()>;

    /// Close the device
    fn close(&mut self) -> Result<()>;

    /// Show a picture
    ///
    /// # Arguments
    ///
    /// * `picture` - Decoded picture
    /// * `pts_ms` - Its presentation timestamp
    ///
    /// # Returns
    ///
    /// `WriteStatus::Full` when the display queue cannot take it now
    fn render(&mut self, picture: &VideoPicture, pts_ms: i64) -> Result<WriteStatus>;

    /// Drop pictures queued in the device
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Move or resize the output window
    fn set_display_region(&mut self, region: DisplayRegion) -> Result<()>;
}

/// Output rectangle and compositor layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplayRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub layer: u32,
}

/// Video sink configuration
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSinkAttr {
    pub width: u32,
    pub height: u32,
    pub region: Option<DisplayRegion>,
}
