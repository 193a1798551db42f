//! Playback session state
//!
//! Everything the command handlers and the scheduling thread share lives
//! in one `Session` behind the control mutex.

use crate::audio::{AudioStreamType, VolumeAttr};
use crate::decoder::{Decoder, MediaKind};
use crate::player::trick_play::TrickPlayState;
use crate::renderer::DisplayRegion;
use crate::sink::SinkManager;
use crate::source::{FileInfo, MediaSource, SourceAdapter};
use crate::utils::error::{PlayerError, Result};
use log::{debug, warn};
use std::time::{Duration, Instant};

/// Settings that outlive a Stop
#[derive(Debug, Clone, Default)]
pub(crate) struct Settings {
    pub volume: Option<VolumeAttr>,
    pub stream_type: AudioStreamType,
    pub display_region: Option<DisplayRegion>,
    pub pause_after_first_frame: bool,
}

/// End-of-stream latches, cleared by seek, trick-play changes and Stop
#[derive(Debug, Clone, Default)]
pub(crate) struct EosFlags {
    pub audio_queued: bool,
    pub video_queued: bool,
    /// Every decoder has been given its end-of-stream packet
    pub stream_read_end: bool,
    pub audio_rendered: bool,
    pub video_rendered: bool,
    pub play_end_reported: bool,
}

impl EosFlags {
    pub fn queued(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => self.audio_queued,
            MediaKind::Video => self.video_queued,
        }
    }

    pub fn set_queued(&mut self, kind: MediaKind) {
        match kind {
            MediaKind::Audio => self.audio_queued = true,
            MediaKind::Video => self.video_queued = true,
        }
    }

    pub fn rendered(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => self.audio_rendered,
            MediaKind::Video => self.video_rendered,
        }
    }

    pub fn set_rendered(&mut self, kind: MediaKind) {
        match kind {
            MediaKind::Audio => self.audio_rendered = true,
            MediaKind::Video => self.video_rendered = true,
        }
    }
}

/// Pending and serviced-but-unreported seek targets
///
/// A request arriving while another is pending replaces it. A serviced
/// seek reports seek-end only if no newer request arrives before the
/// scheduling thread comes back to it; otherwise it is superseded and
/// only the latest target is reported.
#[derive(Debug, Clone, Default)]
pub(crate) struct SeekTable {
    pending: Option<i64>,
    unreported: Option<i64>,
}

impl SeekTable {
    pub fn request(&mut self, target_ms: i64) {
        if let Some(replaced) = self.pending.replace(target_ms) {
            warn!("seek to {}ms replaced by {}ms", replaced, target_ms);
        }
    }

    /// Take the pending target for servicing, superseding any unreported one
    pub fn begin(&mut self) -> Option<i64> {
        let target = self.pending.take()?;
        if let Some(superseded) = self.unreported.take() {
            debug!("seek to {}ms superseded by {}ms", superseded, target);
        }
        Some(target)
    }

    /// Record where the serviced seek landed
    pub fn finish(&mut self, landed_ms: i64) {
        self.unreported = Some(landed_ms);
    }

    /// The serviced position to report, unless a newer request is waiting
    pub fn take_report(&mut self) -> Option<i64> {
        if self.pending.is_some() {
            return None;
        }
        self.unreported.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn awaiting_report(&self) -> bool {
        self.unreported.is_some()
    }
}

/// Rate limiter for progress events
#[derive(Debug, Clone)]
pub(crate) struct ProgressThrottle {
    interval: Duration,
    last_report: Option<Instant>,
    last_position: Option<i64>,
}

impl ProgressThrottle {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms as u64),
            last_report: None,
            last_position: None,
        }
    }

    /// Whether `position` should be reported at `now`
    pub fn should_report(&mut self, position: i64, now: Instant) -> bool {
        if self.last_position == Some(position) {
            return false;
        }
        if let Some(last) = self.last_report {
            if now.duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_report = Some(now);
        self.last_position = Some(position);
        true
    }

    /// Record a position reported outside the throttle
    pub fn mark(&mut self, position: i64, now: Instant) {
        self.last_report = Some(now);
        self.last_position = Some(position);
    }

    pub fn reset(&mut self) {
        self.last_report = None;
        self.last_position = None;
    }
}

/// One playback session
pub(crate) struct Session {
    pub media: Option<MediaSource>,
    pub source: Option<SourceAdapter>,
    pub info: FileInfo,
    pub audio_decoder: Option<Box<dyn Decoder>>,
    pub video_decoder: Option<Box<dyn Decoder>>,
    pub sinks: Option<SinkManager>,
    pub settings: Settings,
    pub trick: TrickPlayState,
    pub seeks: SeekTable,
    pub eos: EosFlags,
    pub progress: ProgressThrottle,
    /// Absolute stream position of the master output
    pub current_position: i64,
    pub last_sent_audio_pts: Option<i64>,
    pub last_sent_video_pts: Option<i64>,
    pub paused: bool,
    pub exit: bool,
    /// A runtime fault was reported; reads and renders stop
    pub failed: bool,
    /// Sleep requested by the current scheduling iteration
    pub sleep: Duration,
}

impl Session {
    pub fn new(settings: Settings, progress_interval_ms: u32) -> Self {
        Self {
            media: None,
            source: None,
            info: FileInfo::default(),
            audio_decoder: None,
            video_decoder: None,
            sinks: None,
            settings,
            trick: TrickPlayState::default(),
            seeks: SeekTable::default(),
            eos: EosFlags::default(),
            progress: ProgressThrottle::new(progress_interval_ms),
            current_position: 0,
            last_sent_audio_pts: None,
            last_sent_video_pts: None,
            paused: false,
            exit: false,
            failed: false,
            sleep: Duration::ZERO,
        }
    }

    /// Fresh session keeping only the persistent settings
    pub fn reset(&mut self, progress_interval_ms: u32) {
        let settings = std::mem::take(&mut self.settings);
        *self = Session::new(settings, progress_interval_ms);
    }

    pub fn source_mut(&mut self) -> Result<&mut SourceAdapter> {
        self.source.as_mut().ok_or(PlayerError::NullPointer("source"))
    }

    pub fn sinks_mut(&mut self) -> Result<&mut SinkManager> {
        self.sinks.as_mut().ok_or(PlayerError::NullPointer("sink manager"))
    }

    pub fn decoder_mut(&mut self, kind: MediaKind) -> Option<&mut Box<dyn Decoder>> {
        match kind {
            MediaKind::Audio => self.audio_decoder.as_mut(),
            MediaKind::Video => self.video_decoder.as_mut(),
        }
    }

    pub fn has_decoder(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => self.audio_decoder.is_some(),
            MediaKind::Video => self.video_decoder.is_some(),
        }
    }

    /// Request a sleep of at least `duration` for this iteration
    pub fn back_off(&mut self, duration: Duration) {
        self.sleep = self.sleep.max(duration);
    }

    /// Whether every channel that must finish has rendered end-of-stream
    pub fn is_play_end(&self) -> bool {
        if self.trick.is_active() {
            return self.eos.video_rendered;
        }
        let audio_done = !self.has_decoder(MediaKind::Audio) || self.eos.audio_rendered;
        let video_done = !self.has_decoder(MediaKind::Video) || self.eos.video_rendered;
        audio_done && video_done
    }

    /// Position relative to the container start time
    pub fn relative(&self, pts: i64) -> i64 {
        (pts - self.info.start_time_ms).max(0)
    }

    /// Hand every frame the sinks have released back to its decoder
    pub fn return_released_frames(&mut self) -> Result<()> {
        let Some(sinks) = self.sinks.as_mut() else {
            return Ok(());
        };
        for kind in [MediaKind::Audio, MediaKind::Video] {
            while let Some(frame) = sinks.dequeue_release(kind) {
                let decoder = match kind {
                    MediaKind::Audio => self.audio_decoder.as_mut(),
                    MediaKind::Video => self.video_decoder.as_mut(),
                };
                match decoder {
                    Some(decoder) => decoder.release_output(frame)?,
                    None => warn!("released {:?} frame has no decoder", kind),
                }
            }
        }
        Ok(())
    }

    /// Discard everything between source and devices
    ///
    /// Sinks are paused, their queued frames go back to the decoders,
    /// decoders are flushed and sinks resume unless the session is paused.
    pub fn reset_pipeline(&mut self) -> Result<()> {
        if let Some(sinks) = self.sinks.as_mut() {
            sinks.pause()?;
            sinks.reset()?;
        }
        self.return_released_frames()?;
        for decoder in [self.audio_decoder.as_mut(), self.video_decoder.as_mut()]
            .into_iter()
            .flatten()
        {
            decoder.flush()?;
        }
        if !self.paused {
            if let Some(sinks) = self.sinks.as_mut() {
                sinks.resume()?;
            }
        }
        if let Some(source) = self.source.as_mut() {
            source.clear_cache();
        }
        self.eos = EosFlags::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_table_coalesces() {
        let mut table = SeekTable::default();
        table.request(1_000);
        table.request(2_000);
        assert_eq!(table.begin(), Some(2_000));
        assert!(!table.has_pending());
        table.finish(2_000);
        assert!(table.awaiting_report());
        assert_eq!(table.take_report(), Some(2_000));
        assert_eq!(table.take_report(), None);
        assert_eq!(table.begin(), None);
    }

    #[test]
    fn test_serviced_seek_superseded_before_report() {
        let mut table = SeekTable::default();
        table.request(1_000);
        assert_eq!(table.begin(), Some(1_000));
        table.finish(1_000);

        table.request(5_000);
        assert_eq!(table.take_report(), None);
        assert_eq!(table.begin(), Some(5_000));
        assert!(!table.awaiting_report());
        table.finish(4_000);
        assert_eq!(table.take_report(), Some(4_000));
        assert!(!table.awaiting_report());
    }

    #[test]
    fn test_progress_throttle() {
        let start = Instant::now();
        let mut throttle = ProgressThrottle::new(300);
        assert!(throttle.should_report(0, start));
        assert!(!throttle.should_report(0, start + Duration::from_millis(500)));
        assert!(!throttle.should_report(100, start + Duration::from_millis(100)));
        assert!(throttle.should_report(100, start + Duration::from_millis(300)));

        throttle.reset();
        assert!(throttle.should_report(100, start + Duration::from_millis(301)));
    }

    #[test]
    fn test_reset_keeps_settings() {
        let mut session = Session::new(Settings::default(), 300);
        session.settings.volume = Some(VolumeAttr::new(0.5, 0.5));
        session.settings.pause_after_first_frame = true;
        session.current_position = 4_000;
        session.paused = true;

        session.reset(300);
        assert_eq!(session.settings.volume, Some(VolumeAttr::new(0.5, 0.5)));
        assert!(session.settings.pause_after_first_frame);
        assert_eq!(session.current_position, 0);
        assert!(!session.paused);
    }

    #[test]
    fn test_play_end_without_decoders() {
        let mut session = Session::new(Settings::default(), 300);
        assert!(session.is_play_end());
        session.eos.set_rendered(MediaKind::Video);
        assert!(session.eos.rendered(MediaKind::Video));
    }
}
