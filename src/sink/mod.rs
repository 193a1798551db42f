//! Sink module for playctl
//!
//! A sink owns one output device and the render queue in front of it.
//! This module holds what audio and video sinks share: render statuses,
//! the per-sink lifecycle, the queue-and-score render step, and the
//! `SinkManager` that fronts both sinks and the sync engine.

mod manager;
mod render_queue;

pub use manager::SinkManager;
pub use render_queue::{QueueStats, RenderQueue};

use crate::audio::{SyncDecision, SyncEngine, SyncVerdict};
use crate::decoder::{MediaKind, OutputBuffer};
use crate::utils::error::Result;
use log::{debug, warn};

/// Outcome of one render step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// A frame left the cache queue (rendered or dropped)
    Success,

    /// Nothing to render
    QueueEmpty,

    /// The head frame is early and stays queued
    RenderDelay,

    /// The device could not take the frame
    RenderFull,

    /// Queue drained after end-of-stream was signalled
    RenderEos,
}

/// How a sink behaves after its first frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Normal,

    /// Hold after the first rendered frame until resumed
    PauseAfterFirstFrame,
}

/// Sink lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    NotStarted,
    Started,
    Paused,
    Stopped,
}

/// Device write outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Written,

    /// Device buffer is full; retry later
    Full,
}

/// Notifications raised while rendering
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    FirstFrameRendered(MediaKind),
    EndOfStream(MediaKind),

    /// The sync engine hit its continuous-loss cap
    ContinuousLoss(MediaKind),

    /// The device rejected a frame
    RunningError(MediaKind, String),
}

/// Behaviour shared by the audio and video sinks
pub trait Sink: Send {
    fn kind(&self) -> MediaKind;

    fn start(&mut self) -> Result<()>;

    /// Stop rendering; queued frames move to the release queue
    fn stop(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    /// Discard queued frames, device buffers and end-of-stream state
    fn reset(&mut self) -> Result<()>;

    /// Discard device buffers only
    fn flush(&mut self) -> Result<()>;

    /// Queue `frame` (if any) and try to render the head of the queue
    fn render_frame(
        &mut self,
        frame: Option<OutputBuffer>,
        sync: &mut SyncEngine,
        events: &mut Vec<SinkEvent>,
    ) -> RenderStatus;

    /// Mark end-of-stream; reported once the queue drains
    fn render_eos(&mut self);

    /// Take one frame that can go back to its decoder
    fn dequeue_release(&mut self) -> Option<OutputBuffer>;

    fn set_render_mode(&mut self, mode: RenderMode);

    /// Timestamp of the last frame that reached the device
    fn last_rendered_pts(&self) -> Option<i64>;

    fn state(&self) -> SinkState;

    fn queue(&self) -> &RenderQueue;
}

/// Queue, lifecycle and end-of-stream bookkeeping common to both sinks
#[derive(Debug)]
pub(crate) struct SinkCore {
    kind: MediaKind,
    state: SinkState,
    queue: RenderQueue,
    mode: RenderMode,
    eos_signalled: bool,
    eos_reported: bool,
    first_rendered: bool,
    holding: bool,
    last_pts: Option<i64>,
}

impl SinkCore {
    pub(crate) fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            state: SinkState::NotStarted,
            queue: RenderQueue::new(),
            mode: RenderMode::Normal,
            eos_signalled: false,
            eos_reported: false,
            first_rendered: false,
            holding: false,
            last_pts: None,
        }
    }

    pub(crate) fn start(&mut self) {
        self.state = SinkState::Started;
        self.first_rendered = false;
        self.holding = false;
    }

    pub(crate) fn stop(&mut self) {
        self.queue.discard_all();
        self.state = SinkState::Stopped;
        self.eos_signalled = false;
        self.eos_reported = false;
        self.holding = false;
    }

    pub(crate) fn pause(&mut self) {
        if self.state == SinkState::Started {
            self.state = SinkState::Paused;
        }
    }

    pub(crate) fn resume(&mut self) {
        if self.state == SinkState::Paused {
            self.state = SinkState::Started;
        }
        self.holding = false;
    }

    pub(crate) fn reset(&mut self) {
        let discarded = self.queue.discard_all();
        if discarded > 0 {
            debug!("{:?} sink reset discarded {} frames", self.kind, discarded);
        }
        self.eos_signalled = false;
        self.eos_reported = false;
        self.last_pts = None;
    }

    /// Queue-then-score render step
    ///
    /// `write` pushes the head frame to the device; it is only called
    /// when the sync engine says the frame should play now.
    pub(crate) fn render<F>(
        &mut self,
        frame: Option<OutputBuffer>,
        sync: &mut SyncEngine,
        events: &mut Vec<SinkEvent>,
        mut write: F,
    ) -> RenderStatus
    where
        F: FnMut(&OutputBuffer) -> Result<WriteStatus>,
    {
        if let Some(frame) = frame {
            self.queue.push(frame);
        }

        if self.state != SinkState::Started || self.holding {
            return RenderStatus::QueueEmpty;
        }

        let Some(front) = self.queue.front() else {
            if self.eos_signalled && !self.eos_reported {
                self.eos_reported = true;
                events.push(SinkEvent::EndOfStream(self.kind));
                return RenderStatus::RenderEos;
            }
            return RenderStatus::QueueEmpty;
        };

        let pts = front.pts_ms;
        let SyncDecision {
            verdict,
            loss_cap_reached,
            ..
        } = sync.decide(self.kind, pts);
        if loss_cap_reached {
            events.push(SinkEvent::ContinuousLoss(self.kind));
        }

        match verdict {
            SyncVerdict::Repeat { .. } => RenderStatus::RenderDelay,
            SyncVerdict::Drop => {
                self.queue.retire_front(false);
                RenderStatus::Success
            }
            SyncVerdict::Play => match write(front) {
                Ok(WriteStatus::Written) => {
                    self.queue.retire_front(true);
                    self.last_pts = Some(pts);
                    if !self.first_rendered {
                        self.first_rendered = true;
                        events.push(SinkEvent::FirstFrameRendered(self.kind));
                        if self.mode == RenderMode::PauseAfterFirstFrame {
                            debug!("{:?} sink holding after first frame", self.kind);
                            self.holding = true;
                        }
                    }
                    RenderStatus::Success
                }
                Ok(WriteStatus::Full) => RenderStatus::RenderFull,
                Err(e) => {
                    warn!("{:?} device rejected frame at {}ms: {}", self.kind, pts, e);
                    self.queue.retire_front(false);
                    events.push(SinkEvent::RunningError(self.kind, e.to_string()));
                    RenderStatus::Success
                }
            },
        }
    }

    pub(crate) fn signal_eos(&mut self) {
        self.eos_signalled = true;
    }

    pub(crate) fn set_mode(&mut self, mode: RenderMode) {
        self.mode = mode;
    }

    pub(crate) fn state(&self) -> SinkState {
        self.state
    }

    pub(crate) fn last_pts(&self) -> Option<i64> {
        self.last_pts
    }

    pub(crate) fn queue(&self) -> &RenderQueue {
        &self.queue
    }

    pub(crate) fn queue_mut(&mut self) -> &mut RenderQueue {
        &mut self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{BufferPool, FramePayload, VideoPicture};
    use crate::utils::config::SyncConfig;
    use crate::utils::error::PlayerError;

    fn frame(pool: &mut BufferPool, pts: i64) -> OutputBuffer {
        OutputBuffer::new(
            pool.acquire().unwrap(),
            pts,
            FramePayload::Video(VideoPicture {
                width: 1,
                height: 1,
                data: vec![0],
            }),
        )
    }

    fn written(_: &OutputBuffer) -> Result<WriteStatus> {
        Ok(WriteStatus::Written)
    }

    #[test]
    fn test_not_started_sink_queues_frames() {
        let mut pool = BufferPool::new(2);
        let mut sync = SyncEngine::new(SyncConfig::default(), true);
        let mut events = Vec::new();
        let mut core = SinkCore::new(MediaKind::Video);

        let status = core.render(Some(frame(&mut pool, 0)), &mut sync, &mut events, written);
        assert_eq!(status, RenderStatus::QueueEmpty);
        assert_eq!(core.queue().cache_len(), 1);

        core.start();
        let status = core.render(None, &mut sync, &mut events, written);
        assert_eq!(status, RenderStatus::Success);
        assert_eq!(events, vec![SinkEvent::FirstFrameRendered(MediaKind::Video)]);
        assert_eq!(core.last_pts(), Some(0));
    }

    #[test]
    fn test_eos_reported_once() {
        let mut sync = SyncEngine::new(SyncConfig::default(), true);
        let mut events = Vec::new();
        let mut core = SinkCore::new(MediaKind::Audio);
        core.start();

        assert_eq!(core.render(None, &mut sync, &mut events, written), RenderStatus::QueueEmpty);
        core.signal_eos();
        assert_eq!(core.render(None, &mut sync, &mut events, written), RenderStatus::RenderEos);
        assert_eq!(core.render(None, &mut sync, &mut events, written), RenderStatus::QueueEmpty);
        assert_eq!(events, vec![SinkEvent::EndOfStream(MediaKind::Audio)]);

        core.reset();
        core.signal_eos();
        assert_eq!(core.render(None, &mut sync, &mut events, written), RenderStatus::RenderEos);
    }

    #[test]
    fn test_device_full_keeps_frame() {
        let mut pool = BufferPool::new(1);
        let mut sync = SyncEngine::new(SyncConfig::default(), true);
        let mut events = Vec::new();
        let mut core = SinkCore::new(MediaKind::Video);
        core.start();

        let status = core.render(Some(frame(&mut pool, 0)), &mut sync, &mut events, |_| {
            Ok(WriteStatus::Full)
        });
        assert_eq!(status, RenderStatus::RenderFull);
        assert_eq!(core.queue().cache_len(), 1);
        assert_eq!(core.last_pts(), None);
    }

    #[test]
    fn test_device_error_raises_event() {
        let mut pool = BufferPool::new(1);
        let mut sync = SyncEngine::new(SyncConfig::default(), true);
        let mut events = Vec::new();
        let mut core = SinkCore::new(MediaKind::Video);
        core.start();

        core.render(Some(frame(&mut pool, 0)), &mut sync, &mut events, |_| {
            Err(PlayerError::VideoPlay("layer lost".into()))
        });
        assert!(matches!(events[0], SinkEvent::RunningError(MediaKind::Video, _)));
        assert_eq!(core.queue().release_len(), 1);
    }

    #[test]
    fn test_pause_after_first_frame_holds() {
        let mut pool = BufferPool::new(3);
        let mut sync = SyncEngine::new(SyncConfig::default(), true);
        let mut events = Vec::new();
        let mut core = SinkCore::new(MediaKind::Video);
        core.set_mode(RenderMode::PauseAfterFirstFrame);
        core.start();

        core.render(Some(frame(&mut pool, 0)), &mut sync, &mut events, written);
        let status = core.render(Some(frame(&mut pool, 0)), &mut sync, &mut events, written);
        assert_eq!(status, RenderStatus::QueueEmpty);
        assert_eq!(core.queue().cache_len(), 1);

        core.pause();
        core.resume();
        assert_eq!(core.render(None, &mut sync, &mut events, written), RenderStatus::Success);
    }
}
