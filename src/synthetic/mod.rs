//! Synthetic collaborators for playctl
//!
//! Deterministic, in-process implementations of every host interface:
//! a test-pattern source, a pass-through decoder and null output devices
//! paced by the wall clock. They let the engine run end to end without
//! codecs or hardware, and they count every lifecycle call so tests can
//! check that what was started was also stopped.

mod decoder;
mod devices;
mod source;

pub use decoder::PassthroughDecoder;
pub use devices::{NullAudioDevice, NullVideoDevice};
pub use source::SyntheticSource;

use crate::audio::AudioDevice;
use crate::decoder::{CodecFormat, Decoder, DecoderAttr};
use crate::player::Backend;
use crate::renderer::VideoDevice;
use crate::source::Source;
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Duration of one synthetic audio packet
pub const AUDIO_FRAME_MS: i64 = 20;

/// Synthetic video track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticVideo {
    pub codec: CodecFormat,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f32,
}

/// Synthetic audio track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticAudio {
    pub codec: CodecFormat,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Description of the media a `SyntheticSource` produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticMedia {
    pub format_name: String,
    pub duration_ms: i64,
    pub start_time_ms: i64,
    pub bitrate: u32,
    pub video: Option<SyntheticVideo>,
    pub audio: Option<SyntheticAudio>,
    /// Distance between video key frames
    pub gop_ms: i64,
    /// Prepare fails with a demux error
    pub corrupt: bool,
    /// Reading the first packet at or after this time fails
    pub fail_read_at_ms: Option<i64>,
    /// The first video packet at or after this time has an empty payload
    pub zero_length_at_ms: Option<i64>,
}

impl Default for SyntheticMedia {
    fn default() -> Self {
        Self {
            format_name: "mp4".to_string(),
            duration_ms: 2_000,
            start_time_ms: 0,
            bitrate: 1_000_000,
            video: Some(SyntheticVideo {
                codec: CodecFormat::H264,
                width: 320,
                height: 240,
                frame_rate: 25.0,
            }),
            audio: Some(SyntheticAudio {
                codec: CodecFormat::Aac,
                sample_rate: 48_000,
                channels: 2,
            }),
            gop_ms: 1_000,
            corrupt: false,
            fail_read_at_ms: None,
            zero_length_at_ms: None,
        }
    }
}

impl SyntheticMedia {
    /// Audio and video of the given duration
    pub fn with_duration(duration_ms: i64) -> Self {
        Self {
            duration_ms,
            ..Self::default()
        }
    }

    pub fn video_only(duration_ms: i64) -> Self {
        Self {
            audio: None,
            ..Self::with_duration(duration_ms)
        }
    }

    pub fn audio_only(duration_ms: i64) -> Self {
        Self {
            video: None,
            ..Self::with_duration(duration_ms)
        }
    }

    /// A single still picture
    pub fn still_image() -> Self {
        Self {
            format_name: "image2".to_string(),
            duration_ms: 40,
            audio: None,
            video: Some(SyntheticVideo {
                codec: CodecFormat::Jpeg,
                width: 640,
                height: 480,
                frame_rate: 25.0,
            }),
            ..Self::default()
        }
    }
}

/// Lifecycle counters shared by every collaborator of one backend
#[derive(Debug, Default)]
pub struct BackendStats {
    pub sources_created: AtomicUsize,
    pub packets_freed: AtomicUsize,
    pub decoders_created: AtomicUsize,
    pub decoders_started: AtomicUsize,
    pub decoders_stopped: AtomicUsize,
    pub decoder_flushes: AtomicUsize,
    /// Output buffers still lent out when a decoder was stopped
    pub buffers_outstanding_at_stop: AtomicUsize,
    pub audio_devices_opened: AtomicUsize,
    pub audio_devices_closed: AtomicUsize,
    pub video_devices_opened: AtomicUsize,
    pub video_devices_closed: AtomicUsize,
    pub audio_frames_written: AtomicUsize,
    pub video_frames_rendered: AtomicUsize,
    pub last_video_pts: AtomicI64,
}

/// Point-in-time copy of `BackendStats`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub sources_created: usize,
    pub packets_freed: usize,
    pub decoders_created: usize,
    pub decoders_started: usize,
    pub decoders_stopped: usize,
    pub decoder_flushes: usize,
    pub buffers_outstanding_at_stop: usize,
    pub audio_devices_opened: usize,
    pub audio_devices_closed: usize,
    pub video_devices_opened: usize,
    pub video_devices_closed: usize,
    pub audio_frames_written: usize,
    pub video_frames_rendered: usize,
    pub last_video_pts: i64,
}

impl BackendStats {
    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicUsize| c.load(Ordering::SeqCst);
        StatsSnapshot {
            sources_created: get(&self.sources_created),
            packets_freed: get(&self.packets_freed),
            decoders_created: get(&self.decoders_created),
            decoders_started: get(&self.decoders_started),
            decoders_stopped: get(&self.decoders_stopped),
            decoder_flushes: get(&self.decoder_flushes),
            buffers_outstanding_at_stop: get(&self.buffers_outstanding_at_stop),
            audio_devices_opened: get(&self.audio_devices_opened),
            audio_devices_closed: get(&self.audio_devices_closed),
            video_devices_opened: get(&self.video_devices_opened),
            video_devices_closed: get(&self.video_devices_closed),
            audio_frames_written: get(&self.audio_frames_written),
            video_frames_rendered: get(&self.video_frames_rendered),
            last_video_pts: self.last_video_pts.load(Ordering::SeqCst),
        }
    }
}

/// `Backend` producing synthetic collaborators
#[derive(Debug, Clone, Default)]
pub struct SyntheticBackend {
    media: SyntheticMedia,
    stats: Arc<BackendStats>,
    video_render_fails: bool,
    audio_latency_ms: u32,
}

impl SyntheticBackend {
    pub fn new(media: SyntheticMedia) -> Self {
        Self {
            media,
            ..Self::default()
        }
    }

    /// Make every video device reject frames
    pub fn with_video_render_failure(mut self) -> Self {
        self.video_render_fails = true;
        self
    }

    /// Report a fixed output latency from audio devices
    pub fn with_audio_latency(mut self, latency_ms: u32) -> Self {
        self.audio_latency_ms = latency_ms;
        self
    }

    pub fn media(&self) -> &SyntheticMedia {
        &self.media
    }

    pub fn stats(&self) -> Arc<BackendStats> {
        Arc::clone(&self.stats)
    }
}

impl Backend for SyntheticBackend {
    fn create_source(&self) -> Result<Box<dyn Source>> {
        BackendStats::bump(&self.stats.sources_created);
        Ok(Box::new(SyntheticSource::new(
            self.media.clone(),
            Arc::clone(&self.stats),
        )))
    }

    fn create_decoder(&self, attr: &DecoderAttr) -> Result<Box<dyn Decoder>> {
        BackendStats::bump(&self.stats.decoders_created);
        Ok(Box::new(PassthroughDecoder::new(
            attr.clone(),
            Arc::clone(&self.stats),
        )))
    }

    fn create_audio_device(&self) -> Result<Box<dyn AudioDevice>> {
        Ok(Box::new(
            NullAudioDevice::with_stats(Arc::clone(&self.stats)).with_latency(self.audio_latency_ms),
        ))
    }

    fn create_video_device(&self) -> Result<Box<dyn VideoDevice>> {
        let device = NullVideoDevice::with_stats(Arc::clone(&self.stats));
        Ok(Box::new(if self.video_render_fails {
            device.failing()
        } else {
            device
        }))
    }
}
