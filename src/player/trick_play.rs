//! Trick-play attributes and the key-frame read path
//!
//! In key-frame-only mode the scheduling thread does not read the file
//! sequentially. Before each read it seeks one stride away from the last
//! packet it read, and after each read it skips packets that are not
//! video or that repeat the previous timestamp.

use crate::player::session::Session;
use crate::source::{CacheStatus, FileInfo, SeekMode};
use crate::utils::error::{PlayerError, Result};
use log::debug;

/// Speeds accepted for trick-play
pub const SUPPORTED_SPEEDS: [f32; 9] = [0.25, 0.5, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0];

/// Stride per unit of speed
pub const STRIDE_UNIT_MS: i64 = 250;

/// Full-play limits for 2x forward playback
pub const FULL_PLAY_MAX_WIDTH: u32 = 1920;
pub const FULL_PLAY_MAX_HEIGHT: u32 = 1080;
pub const FULL_PLAY_MAX_FRAME_RATE: f32 = 30.0;
pub const FULL_PLAY_MAX_BITRATE: u32 = 20_000_000;

/// Playback direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrickPlayDirection {
    #[default]
    Forward,
    Backward,
}

impl TrickPlayDirection {
    /// +1 forward, -1 backward
    pub fn sign(self) -> i64 {
        match self {
            TrickPlayDirection::Forward => 1,
            TrickPlayDirection::Backward => -1,
        }
    }
}

/// Requested trick-play speed and direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrickPlayAttr {
    pub direction: TrickPlayDirection,
    pub speed: f32,
}

impl TrickPlayAttr {
    pub fn new(direction: TrickPlayDirection, speed: f32) -> Self {
        Self { direction, speed }
    }

    pub fn forward(speed: f32) -> Self {
        Self::new(TrickPlayDirection::Forward, speed)
    }

    pub fn backward(speed: f32) -> Self {
        Self::new(TrickPlayDirection::Backward, speed)
    }

    /// Plain 1x forward playback
    pub fn normal() -> Self {
        Self::forward(1.0)
    }

    pub fn is_normal(&self) -> bool {
        self.direction == TrickPlayDirection::Forward && self.speed == 1.0
    }

    /// Reject speeds outside the supported set
    pub fn validate(&self) -> Result<()> {
        if SUPPORTED_SPEEDS.contains(&self.speed) {
            Ok(())
        } else {
            Err(PlayerError::illegal_param(format!(
                "unsupported trick-play speed {}",
                self.speed
            )))
        }
    }

    /// Signed distance between two key-frame reads
    pub fn stride_ms(&self, mpegts: bool) -> i64 {
        let mut stride = (self.speed * STRIDE_UNIT_MS as f32) as i64;
        if mpegts {
            stride *= 2;
        }
        stride.max(1) * self.direction.sign()
    }

    /// Pick the read strategy for this speed and stream
    pub fn select_mode(&self, info: &FileInfo) -> TrickMode {
        if self.direction == TrickPlayDirection::Backward || self.speed > 2.0 {
            return TrickMode::KeyFrameOnly;
        }
        if self.speed < 2.0 {
            return TrickMode::FullPlay;
        }

        let within_limits = info.selected_video().map_or(false, |video| {
            video.width <= FULL_PLAY_MAX_WIDTH
                && video.height <= FULL_PLAY_MAX_HEIGHT
                && video.frame_rate <= FULL_PLAY_MAX_FRAME_RATE
        }) && info.bitrate <= FULL_PLAY_MAX_BITRATE;

        if within_limits {
            TrickMode::FullPlay
        } else {
            TrickMode::KeyFrameOnly
        }
    }
}

impl Default for TrickPlayAttr {
    fn default() -> Self {
        Self::normal()
    }
}

/// How packets are read while trick-playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrickMode {
    /// Sequential read, every video frame decoded
    #[default]
    FullPlay,

    /// Seek from key frame to key frame
    KeyFrameOnly,
}

/// Trick-play bookkeeping of one session
#[derive(Debug, Clone, Default)]
pub(crate) struct TrickPlayState {
    pub attr: TrickPlayAttr,
    pub mode: TrickMode,
    pub stride_ms: i64,
    /// Timestamp of the last packet read (or the stride target after a skip)
    pub last_read_pts: i64,
    /// Timestamp of the last video packet queued to the decoder
    pub last_sent_pts: Option<i64>,
    /// Whether the last packet read belonged to the video track
    pub last_read_was_video: bool,
    /// Reading has started since the trick-play request
    pub started: bool,
    /// The stride reached the end of the file
    pub reached_last_frame: bool,
    /// The video sink reported a run of dropped frames
    pub continuous_loss: bool,
}

impl TrickPlayState {
    pub fn is_active(&self) -> bool {
        !self.attr.is_normal()
    }

    pub fn is_backward(&self) -> bool {
        self.is_active() && self.attr.direction == TrickPlayDirection::Backward
    }

    /// Prepare for a fresh stride sequence from `position`
    pub fn restart_from(&mut self, position: i64) {
        self.last_read_pts = position;
        self.last_sent_pts = None;
        self.last_read_was_video = true;
        self.started = position != 0;
        self.reached_last_frame = false;
        self.continuous_loss = false;
    }

    fn read_finished(&self) -> bool {
        match self.attr.direction {
            TrickPlayDirection::Backward => self.reached_last_frame || self.last_read_pts <= 0,
            TrickPlayDirection::Forward => self.reached_last_frame,
        }
    }
}

/// Outcome of one trick-play read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrickRead {
    /// A video packet is cached for the decoder
    Ready,

    /// The source had nothing to give
    NoData,

    /// A packet was read and discarded
    Skipped,
}

/// Read the next packet in trick-play mode
///
/// When the stride runs off either end of the file an end-of-stream
/// marker is cached instead.
pub(crate) fn read_packet(session: &mut Session) -> Result<TrickRead> {
    if session.trick.mode == TrickMode::KeyFrameOnly
        && !session.source_mut()?.has_cached()
        && session.trick.last_read_was_video
    {
        if session.trick.read_finished() || !seek_next_key_frame(session)? {
            session.source_mut()?.cache_end_of_stream();
            return Ok(TrickRead::Ready);
        }
    }

    let video_track = session.info.selected_video().map(|v| v.track_id);
    let trick = &mut session.trick;
    let source = session
        .source
        .as_mut()
        .ok_or(PlayerError::NullPointer("source"))?;

    if source.fill_cache()? == CacheStatus::NoData {
        return Ok(TrickRead::NoData);
    }
    let Some(packet) = source.cached() else {
        return Ok(TrickRead::NoData);
    };
    if packet.is_end_of_stream() {
        return Ok(TrickRead::Ready);
    }

    let pts = packet.pts_ms.unwrap_or(trick.last_read_pts);
    let is_video = Some(packet.track_id) == video_track;
    trick.last_read_was_video = is_video;

    let skip = if !is_video {
        trick.last_read_pts = pts;
        true
    } else if trick.mode == TrickMode::KeyFrameOnly
        && trick.started
        && trick.last_sent_pts == Some(pts)
    {
        // same key frame as last time; step past it
        trick.last_read_pts += trick.stride_ms;
        true
    } else {
        trick.last_read_pts = pts;
        false
    };
    trick.started = true;

    if skip {
        source.clear_cache();
        Ok(TrickRead::Skipped)
    } else {
        Ok(TrickRead::Ready)
    }
}

/// Seek one stride away from the last read position
///
/// Returns `false` when no key frame is left in the playback direction.
fn seek_next_key_frame(session: &mut Session) -> Result<bool> {
    let Some(track) = session.info.selected_video().map(|v| v.track_id) else {
        return Ok(false);
    };
    let duration = session.info.duration_ms;
    let start = session.info.start_time_ms;
    let trick = &mut session.trick;

    let mut target = trick.last_read_pts + trick.stride_ms;
    let mut mode = match trick.attr.direction {
        TrickPlayDirection::Forward => SeekMode::FollowingKey,
        TrickPlayDirection::Backward => SeekMode::PrecedingKey,
    };

    if target < start && trick.attr.direction == TrickPlayDirection::Backward {
        target = start;
        trick.reached_last_frame = true;
    } else if duration > 0
        && target > start + duration
        && trick.attr.direction == TrickPlayDirection::Forward
    {
        target = start + duration;
        mode = SeekMode::PrecedingKey;
        trick.reached_last_frame = true;
    } else if trick.last_read_pts == 0 && !trick.started {
        target = start;
        mode = SeekMode::PrecedingKey;
    }

    let forward = trick.attr.direction == TrickPlayDirection::Forward;
    let source = session
        .source
        .as_mut()
        .ok_or(PlayerError::NullPointer("source"))?;

    debug!("trick-play seek to {}ms ({:?})", target, mode);
    if source.seek(track, target, mode).is_ok() {
        return Ok(true);
    }
    if forward {
        // no key frame after the target; settle for the last one
        session.trick.reached_last_frame = true;
        if source.seek(track, target, SeekMode::PrecedingKey).is_ok() {
            return Ok(true);
        }
    }
    debug!("trick-play seek to {}ms failed, treating as end of stream", target);
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::CodecFormat;
    use crate::source::VideoStreamInfo;

    fn info(width: u32, height: u32, frame_rate: f32, bitrate: u32) -> FileInfo {
        FileInfo {
            format_name: "mp4".into(),
            duration_ms: 60_000,
            bitrate,
            video_streams: vec![VideoStreamInfo {
                track_id: 0,
                codec: CodecFormat::H264,
                width,
                height,
                frame_rate,
            }],
            video_index: Some(0),
            ..FileInfo::default()
        }
    }

    #[test]
    fn test_speed_validation() {
        assert!(TrickPlayAttr::forward(2.0).validate().is_ok());
        assert!(TrickPlayAttr::backward(0.25).validate().is_ok());
        assert!(TrickPlayAttr::forward(3.0).validate().is_err());
        assert!(TrickPlayAttr::forward(1.0).validate().is_err());
        assert!(TrickPlayAttr::forward(f32::NAN).validate().is_err());
    }

    #[test]
    fn test_stride() {
        assert_eq!(TrickPlayAttr::forward(4.0).stride_ms(false), 1_000);
        assert_eq!(TrickPlayAttr::forward(4.0).stride_ms(true), 2_000);
        assert_eq!(TrickPlayAttr::backward(8.0).stride_ms(false), -2_000);
        assert_eq!(TrickPlayAttr::forward(0.25).stride_ms(false), 62);
    }

    #[test]
    fn test_mode_selection() {
        let hd = info(1920, 1080, 30.0, 8_000_000);
        assert_eq!(TrickPlayAttr::forward(2.0).select_mode(&hd), TrickMode::FullPlay);
        assert_eq!(TrickPlayAttr::forward(0.5).select_mode(&hd), TrickMode::FullPlay);
        assert_eq!(TrickPlayAttr::forward(4.0).select_mode(&hd), TrickMode::KeyFrameOnly);
        assert_eq!(TrickPlayAttr::backward(2.0).select_mode(&hd), TrickMode::KeyFrameOnly);

        let uhd = info(3840, 2160, 30.0, 8_000_000);
        assert_eq!(TrickPlayAttr::forward(2.0).select_mode(&uhd), TrickMode::KeyFrameOnly);
        let fast = info(1280, 720, 60.0, 8_000_000);
        assert_eq!(TrickPlayAttr::forward(2.0).select_mode(&fast), TrickMode::KeyFrameOnly);
        let heavy = info(1280, 720, 25.0, 40_000_000);
        assert_eq!(TrickPlayAttr::forward(2.0).select_mode(&heavy), TrickMode::KeyFrameOnly);
    }

    #[test]
    fn test_state_activity() {
        let mut state = TrickPlayState::default();
        assert!(!state.is_active());

        state.attr = TrickPlayAttr::backward(2.0);
        assert!(state.is_active());
        assert!(state.is_backward());

        state.restart_from(0);
        assert!(!state.started);
        assert!(state.read_finished());
        state.restart_from(4_000);
        assert!(state.started);
        assert!(!state.read_finished());
    }
}
