//! Audio output module for playctl
//!
//! This module defines the audio output device interface, the audio sink
//! that drives it, and the sync engine that paces both channels from the
//! audio device position.

mod sink;
mod sync;
mod volume;

pub use sink::AudioSink;
pub use sync::{SyncDecision, SyncEngine, SyncStats, SyncVerdict};
pub use volume::VolumeAttr;

use crate::decoder::AudioSamples;
use crate::sink::WriteStatus;
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};

/// Audio output device interface, implemented by the host
pub trait AudioDevice: Send {
    /// Open the device for the given format
    ///
    /// # Arguments
    ///
    /// * `attr` - Sample layout, stream type and initial volume
    fn open(&mut self, attr: &AudioSinkAttr) -> Result<()>;

    /// Close the device
    fn close(&mut self) -> Result<()>;

    /// Queue samples for playback
    ///
    /// # Returns
    ///
    /// `WriteStatus::Full` when the device buffer cannot take them now
    fn write(&mut self, samples: &AudioSamples) -> Result<WriteStatus>;

    /// Stop consuming samples
    fn pause(&mut self) -> Result<()>;

    /// Resume consuming samples
    fn resume(&mut self) -> Result<()>;

    /// Drop queued samples and restart the consumed counter
    fn flush(&mut self) -> Result<()>;

    /// Sample frames consumed by the hardware since open or flush
    fn consumed_samples(&self) -> u64;

    /// Delay between consumption and audible output
    fn latency_ms(&self) -> u32;

    /// Set left/right gain
    fn set_volume(&mut self, volume: VolumeAttr) -> Result<()>;

    /// Route the output as the given stream type
    fn set_stream_type(&mut self, stream_type: AudioStreamType) -> Result<()>;
}

/// Output routing class of the audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AudioStreamType {
    #[default]
    Music,
    VoiceCall,
    Ring,
    Alarm,
    Notification,
    System,
}

/// Audio sink configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSinkAttr {
    pub sample_rate: u32,
    pub channels: u16,
    pub stream_type: AudioStreamType,
    pub volume: Option<VolumeAttr>,
}
