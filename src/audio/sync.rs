//! Audio/video synchronization logic for playctl
//!
//! The sync engine maps wall-clock time onto the stream timeline and
//! scores each decoded frame as play, repeat or drop. Each channel keeps
//! the timestamp/wall-clock pair of its first frame; the reference policy
//! decides whose timeline the other channel follows.

use crate::decoder::MediaKind;
use crate::player::TrickPlayDirection;
use crate::utils::config::{SyncConfig, SyncReference};
use log::debug;
use serde::Serialize;
use std::time::Instant;

/// What to do with a decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncVerdict {
    /// Render now
    Play,

    /// Frame is early; keep showing the previous one and retry
    Repeat { delay_ms: i64 },

    /// Frame is outside the stop region; discard it
    Drop,
}

/// A verdict plus the context it was computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncDecision {
    pub verdict: SyncVerdict,

    /// Stream-clock time minus frame timestamp, in playback direction
    pub lateness_ms: i64,

    /// The continuous-loss cap forced this frame out
    pub loss_cap_reached: bool,
}

/// Synchronization statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    pub played: u64,
    pub repeated: u64,
    pub dropped: u64,
    /// Played beyond the late edge of the start region
    pub late: u64,
    /// Played because the continuous-loss cap was reached
    pub forced: u64,
    pub last_lateness_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Anchor {
    pts_ms: i64,
    wall_ms: i64,
}

/// Per-channel clock state
#[derive(Debug, Clone, Default)]
struct ChannelClock {
    anchor: Option<Anchor>,
    continuous_loss: u32,
}

/// Clock arbiter shared by both sinks
pub struct SyncEngine {
    config: SyncConfig,
    has_audio: bool,
    audio: ChannelClock,
    video: ChannelClock,
    /// Latest audio device position and when it was sampled
    audio_position: Option<Anchor>,
    speed: f32,
    direction: TrickPlayDirection,
    paused_since: Option<i64>,
    epoch: Instant,
    stats: SyncStats,
}

impl SyncEngine {
    /// Create a sync engine
    ///
    /// # Arguments
    ///
    /// * `config` - Reference policy and tolerance windows
    /// * `has_audio` - Whether an audio channel will be rendered
    pub fn new(config: SyncConfig, has_audio: bool) -> Self {
        Self {
            config,
            has_audio,
            audio: ChannelClock::default(),
            video: ChannelClock::default(),
            audio_position: None,
            speed: 1.0,
            direction: TrickPlayDirection::Forward,
            paused_since: None,
            epoch: Instant::now(),
            stats: SyncStats::default(),
        }
    }

    /// Milliseconds on the engine's monotonic clock
    pub fn now_ms(&self) -> i64 {
        self.epoch.elapsed().as_millis() as i64
    }

    /// Score a frame against the current wall clock
    pub fn decide(&mut self, kind: MediaKind, pts_ms: i64) -> SyncDecision {
        let now = self.now_ms();
        self.decide_at(kind, pts_ms, now)
    }

    /// Score a frame at an explicit wall-clock time
    pub fn decide_at(&mut self, kind: MediaKind, pts_ms: i64, now_ms: i64) -> SyncDecision {
        let trick = self.is_trick_play();

        if self.clock(kind).anchor.is_none() {
            let grace = if kind == MediaKind::Video && !self.has_audio && !trick {
                self.config.video_startup_grace_ms.max(0)
            } else {
                0
            };
            self.clock_mut(kind).anchor = Some(Anchor {
                pts_ms,
                wall_ms: now_ms + grace,
            });
            debug!("{:?} clock anchored at pts {}ms (grace {}ms)", kind, pts_ms, grace);
            if grace > 0 {
                return self.finish(kind, pts_ms, SyncVerdict::Repeat { delay_ms: grace }, -grace, false);
            }
            return self.finish(kind, pts_ms, SyncVerdict::Play, 0, false);
        }

        if kind == MediaKind::Audio && self.config.reference == SyncReference::Audio && !trick {
            return self.finish(kind, pts_ms, SyncVerdict::Play, 0, false);
        }

        let stream_now = self.stream_now(kind, now_ms);
        let lateness = self.direction.sign() * (stream_now - pts_ms);
        let verdict = self.classify(lateness);

        if verdict == SyncVerdict::Drop {
            let cap = self.config.continuous_loss_cap;
            let clock = self.clock_mut(kind);
            clock.continuous_loss += 1;
            if clock.continuous_loss >= cap {
                clock.continuous_loss = 0;
                debug!("{:?} continuous loss cap reached, forcing render", kind);
                self.stats.forced += 1;
                return self.finish(kind, pts_ms, SyncVerdict::Play, lateness, true);
            }
        }

        self.finish(kind, pts_ms, verdict, lateness, false)
    }

    /// Map lateness onto a verdict using the two tolerance windows
    fn classify(&self, lateness: i64) -> SyncVerdict {
        let c = &self.config;
        if lateness >= c.stop_region_late_ms || lateness <= -c.stop_region_early_ms {
            SyncVerdict::Drop
        } else if lateness < -c.start_region_early_ms {
            SyncVerdict::Repeat {
                delay_ms: -lateness - c.start_region_early_ms,
            }
        } else {
            SyncVerdict::Play
        }
    }

    fn finish(
        &mut self,
        kind: MediaKind,
        pts_ms: i64,
        verdict: SyncVerdict,
        lateness_ms: i64,
        loss_cap_reached: bool,
    ) -> SyncDecision {
        self.stats.last_lateness_ms = lateness_ms;
        match verdict {
            SyncVerdict::Play => {
                self.stats.played += 1;
                if lateness_ms > self.config.start_region_late_ms {
                    self.stats.late += 1;
                }
                if !loss_cap_reached {
                    self.clock_mut(kind).continuous_loss = 0;
                }
            }
            SyncVerdict::Repeat { .. } => self.stats.repeated += 1,
            SyncVerdict::Drop => self.stats.dropped += 1,
        }

        SyncDecision {
            verdict,
            lateness_ms,
            loss_cap_reached,
        }
    }

    /// Wall clock mapped onto the stream timeline for `kind`
    fn stream_now(&self, kind: MediaKind, now_ms: i64) -> i64 {
        if !self.is_trick_play() {
            match (self.config.reference, kind) {
                (SyncReference::Audio, MediaKind::Video) if self.has_audio => {
                    if let Some(position) = self.audio_position {
                        return position.pts_ms + (now_ms - position.wall_ms);
                    }
                }
                (SyncReference::Video, MediaKind::Audio) => {
                    if let Some(anchor) = self.video.anchor {
                        return self.project(anchor, now_ms);
                    }
                }
                _ => {}
            }
        }

        match self.clock(kind).anchor {
            Some(anchor) => self.project(anchor, now_ms),
            None => now_ms,
        }
    }

    fn project(&self, anchor: Anchor, now_ms: i64) -> i64 {
        let elapsed = (now_ms - anchor.wall_ms) as f64 * self.speed as f64;
        anchor.pts_ms + self.direction.sign() * elapsed as i64
    }

    /// Feed the audio device position
    ///
    /// # Arguments
    ///
    /// * `position_ms` - Stream time currently audible at the device output
    pub fn update_audio_position(&mut self, position_ms: i64) {
        let now = self.now_ms();
        self.update_audio_position_at(position_ms, now);
    }

    pub fn update_audio_position_at(&mut self, position_ms: i64, now_ms: i64) {
        self.audio_position = Some(Anchor {
            pts_ms: position_ms,
            wall_ms: now_ms,
        });
    }

    /// Freeze the stream clock
    pub fn pause(&mut self) {
        let now = self.now_ms();
        self.pause_at(now);
    }

    pub fn pause_at(&mut self, now_ms: i64) {
        if self.paused_since.is_none() {
            self.paused_since = Some(now_ms);
        }
    }

    /// Resume the stream clock where it was frozen
    pub fn resume(&mut self) {
        let now = self.now_ms();
        self.resume_at(now);
    }

    pub fn resume_at(&mut self, now_ms: i64) {
        let Some(since) = self.paused_since.take() else {
            return;
        };
        let paused_for = now_ms - since;
        for anchor in [
            &mut self.audio.anchor,
            &mut self.video.anchor,
            &mut self.audio_position,
        ]
        .into_iter()
        .flatten()
        {
            anchor.wall_ms += paused_for;
        }
    }

    /// Forget both channel clocks
    pub fn reset(&mut self) {
        self.audio = ChannelClock::default();
        self.video = ChannelClock::default();
        self.audio_position = None;
    }

    /// Switch the timeline speed and direction; clocks restart at the next frame
    pub fn set_speed(&mut self, speed: f32, direction: TrickPlayDirection) {
        self.speed = speed;
        self.direction = direction;
        self.reset();
    }

    pub fn is_trick_play(&self) -> bool {
        self.speed != 1.0 || self.direction == TrickPlayDirection::Backward
    }

    /// Timestamp that anchored the channel clock, if the channel has started
    pub fn first_frame_pts(&self, kind: MediaKind) -> Option<i64> {
        self.clock(kind).anchor.map(|a| a.pts_ms)
    }

    pub fn stats(&self) -> SyncStats {
        self.stats.clone()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn clock(&self, kind: MediaKind) -> &ChannelClock {
        match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
        }
    }

    fn clock_mut(&mut self, kind: MediaKind) -> &mut ChannelClock {
        match kind {
            MediaKind::Audio => &mut self.audio,
            MediaKind::Video => &mut self.video,
        }
    }
}
