//! Output devices that discard what they are given
//!
//! `NullAudioDevice` consumes samples at the nominal sample rate against
//! the wall clock, so the sync engine sees a real, advancing audio clock.

use super::BackendStats;
use crate::audio::{AudioDevice, AudioSinkAttr, AudioStreamType, VolumeAttr};
use crate::decoder::{AudioSamples, VideoPicture};
use crate::renderer::{DisplayRegion, VideoDevice, VideoSinkAttr};
use crate::sink::WriteStatus;
use crate::utils::error::{PlayerError, Result};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Amount of audio the device buffers before reporting `Full`
const AUDIO_BUFFER_MS: u64 = 200;

/// Wall-clock paced audio device
pub struct NullAudioDevice {
    stats: Arc<BackendStats>,
    sample_rate: u32,
    open: bool,
    paused: bool,
    latency_ms: u32,
    written: u64,
    consumed_before: u64,
    running_since: Option<Instant>,
    volume: Option<VolumeAttr>,
    stream_type: AudioStreamType,
}

impl NullAudioDevice {
    pub fn new() -> Self {
        Self::with_stats(Arc::default())
    }

    pub fn with_stats(stats: Arc<BackendStats>) -> Self {
        Self {
            stats,
            sample_rate: 0,
            open: false,
            paused: false,
            latency_ms: 0,
            written: 0,
            consumed_before: 0,
            running_since: None,
            volume: None,
            stream_type: AudioStreamType::default(),
        }
    }

    pub fn with_latency(mut self, latency_ms: u32) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn volume(&self) -> Option<VolumeAttr> {
        self.volume
    }

    pub fn stream_type(&self) -> AudioStreamType {
        self.stream_type
    }

    /// Frames the clock says were played, ignoring underrun
    fn clock_frames(&self) -> u64 {
        let running = self.running_since.map_or(0, |since| {
            since.elapsed().as_millis() as u64 * self.sample_rate as u64 / 1000
        });
        self.consumed_before + running
    }

    fn freeze_clock(&mut self) {
        self.consumed_before = self.clock_frames().min(self.written);
        self.running_since = None;
    }
}

impl Default for NullAudioDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDevice for NullAudioDevice {
    fn open(&mut self, attr: &AudioSinkAttr) -> Result<()> {
        self.sample_rate = attr.sample_rate;
        self.stream_type = attr.stream_type;
        self.volume = attr.volume;
        self.open = true;
        BackendStats::bump(&self.stats.audio_devices_opened);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.running_since = None;
            BackendStats::bump(&self.stats.audio_devices_closed);
        }
        Ok(())
    }

    fn write(&mut self, samples: &AudioSamples) -> Result<WriteStatus> {
        if !self.open {
            return Err(PlayerError::AudioPlay("device not open".to_string()));
        }

        // an underrun stalls the clock at the last written frame
        if self.clock_frames() > self.written {
            self.consumed_before = self.written;
            self.running_since = None;
        }

        let buffered = self.written - self.clock_frames().min(self.written);
        let capacity = self.sample_rate as u64 * AUDIO_BUFFER_MS / 1000;
        if buffered >= capacity {
            return Ok(WriteStatus::Full);
        }

        self.written += samples.frames() as u64;
        if self.running_since.is_none() && !self.paused {
            self.running_since = Some(Instant::now());
        }
        BackendStats::bump(&self.stats.audio_frames_written);
        Ok(WriteStatus::Written)
    }

    fn pause(&mut self) -> Result<()> {
        if !self.paused {
            self.freeze_clock();
            self.paused = true;
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        if self.paused {
            self.paused = false;
            if self.written > self.consumed_before {
                self.running_since = Some(Instant::now());
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.written = 0;
        self.consumed_before = 0;
        self.running_since = None;
        Ok(())
    }

    fn consumed_samples(&self) -> u64 {
        self.clock_frames().min(self.written)
    }

    fn latency_ms(&self) -> u32 {
        self.latency_ms
    }

    fn set_volume(&mut self, volume: VolumeAttr) -> Result<()> {
        self.volume = Some(volume);
        Ok(())
    }

    fn set_stream_type(&mut self, stream_type: AudioStreamType) -> Result<()> {
        self.stream_type = stream_type;
        Ok(())
    }
}

/// Video device that counts pictures
pub struct NullVideoDevice {
    stats: Arc<BackendStats>,
    open: bool,
    failing: bool,
    region: Option<DisplayRegion>,
}

impl NullVideoDevice {
    pub fn new() -> Self {
        Self::with_stats(Arc::default())
    }

    pub fn with_stats(stats: Arc<BackendStats>) -> Self {
        Self {
            stats,
            open: false,
            failing: false,
            region: None,
        }
    }

    /// Reject every picture with a video-play error
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn region(&self) -> Option<DisplayRegion> {
        self.region
    }
}

impl Default for NullVideoDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoDevice for NullVideoDevice {
    fn open(&mut self, attr: &VideoSinkAttr) -> Result<()> {
        self.region = attr.region;
        self.open = true;
        BackendStats::bump(&self.stats.video_devices_opened);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            BackendStats::bump(&self.stats.video_devices_closed);
        }
        Ok(())
    }

    fn render(&mut self, _picture: &VideoPicture, pts_ms: i64) -> Result<WriteStatus> {
        if !self.open {
            return Err(PlayerError::VideoPlay("device not open".to_string()));
        }
        if self.failing {
            return Err(PlayerError::VideoPlay(format!("display rejected frame {}", pts_ms)));
        }
        BackendStats::bump(&self.stats.video_frames_rendered);
        self.stats.last_video_pts.store(pts_ms, Ordering::SeqCst);
        Ok(WriteStatus::Written)
    }

    fn set_display_region(&mut self, region: DisplayRegion) -> Result<()> {
        self.region = Some(region);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn open_audio() -> NullAudioDevice {
        let mut device = NullAudioDevice::new();
        device
            .open(&AudioSinkAttr {
                sample_rate: 1_000,
                channels: 1,
                stream_type: AudioStreamType::Music,
                volume: None,
            })
            .unwrap();
        device
    }

    fn samples(frames: usize) -> AudioSamples {
        AudioSamples {
            sample_rate: 1_000,
            channels: 1,
            data: vec![0; frames],
        }
    }

    #[test]
    fn test_audio_buffer_fills_up() {
        let mut device = open_audio();
        device.pause().unwrap();
        assert_eq!(device.write(&samples(150)).unwrap(), WriteStatus::Written);
        assert_eq!(device.write(&samples(150)).unwrap(), WriteStatus::Written);
        assert_eq!(device.write(&samples(10)).unwrap(), WriteStatus::Full);
        assert_eq!(device.consumed_samples(), 0);
    }

    #[test]
    fn test_audio_clock_never_passes_written() {
        let mut device = open_audio();
        device.write(&samples(5)).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(device.consumed_samples(), 5);

        device.flush().unwrap();
        assert_eq!(device.consumed_samples(), 0);
    }

    #[test]
    fn test_write_requires_open() {
        let mut device = NullAudioDevice::new();
        assert!(device.write(&samples(1)).is_err());
    }

    #[test]
    fn test_video_counts_and_fails_on_demand() {
        let stats = Arc::new(BackendStats::default());
        let picture = VideoPicture {
            width: 2,
            height: 2,
            data: vec![0; 6],
        };
        let attr = VideoSinkAttr {
            width: 2,
            height: 2,
            region: None,
        };

        let mut device = NullVideoDevice::with_stats(Arc::clone(&stats));
        device.open(&attr).unwrap();
        device.render(&picture, 80).unwrap();
        device.close().unwrap();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.video_frames_rendered, 1);
        assert_eq!(snapshot.last_video_pts, 80);
        assert_eq!(snapshot.video_devices_closed, 1);

        let mut failing = NullVideoDevice::new().failing();
        failing.open(&attr).unwrap();
        assert!(matches!(failing.render(&picture, 0), Err(PlayerError::VideoPlay(_))));
    }
}
