//! Player control module for playctl
//!
//! This module is the public face of the engine. A `Player` forwards
//! every call to a serialized state machine, which validates it against
//! the lifecycle state and runs it on the control core. Once playing, a
//! scheduling thread moves data from the source through the decoders to
//! the sinks and reports progress through `PlayerListener`.

mod control;
mod events;
mod scheduler;
mod session;
mod state;
mod state_machine;
mod trick_play;

pub use events::{ChannelListener, PlayerEvent, PlayerListener};
pub use state::{is_valid, next_state, Command, PlayerState};
pub use trick_play::{TrickMode, TrickPlayAttr, TrickPlayDirection, SUPPORTED_SPEEDS};

use crate::audio::{AudioDevice, AudioStreamType, SyncStats, VolumeAttr};
use crate::decoder::{Decoder, DecoderAttr};
use crate::renderer::{DisplayRegion, VideoDevice};
use crate::sink::QueueStats;
use crate::source::{FileInfo, MediaSource, Source};
use crate::utils::config::Config;
use crate::utils::error::{PlayerError, Result};
use control::ControlCore;
use crossbeam_channel::unbounded;
use log::{info, warn};
use serde::Serialize;
use state_machine::{Message, Reply, StateMachine};
use std::sync::Arc;

/// Factory for the collaborators a session needs
///
/// The source is created at prepare time; decoders and devices when
/// playback starts. Everything is dropped at Stop.
pub trait Backend: Send + Sync {
    /// Create a demultiplexer
    fn create_source(&self) -> Result<Box<dyn Source>>;

    /// Create a decoder for one track
    ///
    /// # Arguments
    ///
    /// * `attr` - Codec, picture size or sample layout, and buffer sizes
    fn create_decoder(&self, attr: &DecoderAttr) -> Result<Box<dyn Decoder>>;

    /// Create the audio output device
    fn create_audio_device(&self) -> Result<Box<dyn AudioDevice>>;

    /// Create the video output device
    fn create_video_device(&self) -> Result<Box<dyn VideoDevice>>;
}

/// Extension requests carried by `Player::invoke`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeRequest {
    /// Hold after the first rendered frame and enter Paused
    EnablePauseAfterPlay(bool),
}

/// Runtime statistics of the current session
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamInfo {
    /// Playback position relative to the container start
    pub position_ms: i64,
    pub last_audio_pts: Option<i64>,
    pub last_video_pts: Option<i64>,
    /// Frames held by each sink, queued or awaiting release
    pub audio_frames_held: usize,
    pub video_frames_held: usize,
    /// Output buffers each decoder currently owns
    pub audio_decoder_free: Option<usize>,
    pub video_decoder_free: Option<usize>,
    pub audio_queue: Option<QueueStats>,
    pub video_queue: Option<QueueStats>,
    pub sync: SyncStats,
}

/// Media player handle
///
/// Calls block until the state machine has processed them. After
/// `release` every call fails with `PlayerError::NullPointer`.
pub struct Player {
    machine: Option<StateMachine>,
}

impl Player {
    /// Create a player
    ///
    /// # Arguments
    ///
    /// * `config` - Engine configuration
    /// * `backend` - Factory for sources, decoders and devices
    /// * `listener` - Receiver of asynchronous events
    pub fn new(
        config: Config,
        backend: Arc<dyn Backend>,
        listener: Arc<dyn PlayerListener>,
    ) -> Result<Self> {
        Self::builder()
            .with_config(config)
            .with_backend(backend)
            .with_listener(listener)
            .build()
    }

    pub fn builder() -> PlayerBuilder {
        PlayerBuilder::default()
    }

    fn machine(&self) -> Result<&StateMachine> {
        self.machine
            .as_ref()
            .ok_or(PlayerError::NullPointer("state machine"))
    }

    fn send(&self, message: Message) -> Result<Reply> {
        self.machine()?.send(message)
    }

    fn run(&self, message: Message) -> Result<()> {
        self.send(message).map(|_| ())
    }

    /// Current lifecycle state; Idle once released
    pub fn state(&self) -> PlayerState {
        self.machine
            .as_ref()
            .map_or(PlayerState::Idle, |m| m.state())
    }

    /// Attach media (Idle → Initialized)
    pub fn set_source(&self, media: MediaSource) -> Result<()> {
        self.run(Message::SetSource(media))
    }

    /// Parse the media (Initialized → Prepared)
    pub fn prepare(&self) -> Result<()> {
        self.run(Message::Prepare)
    }

    /// Start, resume, or return from trick-play to 1x
    pub fn play(&self) -> Result<()> {
        self.run(Message::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.run(Message::Pause)
    }

    /// Tear the session down (any state → Idle)
    pub fn stop(&self) -> Result<()> {
        self.run(Message::Stop)
    }

    /// Seek to `position_ms`, relative to the container start
    ///
    /// Completion is reported by `PlayerListener::on_seek_end`.
    pub fn seek(&self, position_ms: i64) -> Result<()> {
        self.run(Message::Seek(position_ms))
    }

    pub fn trick_play(&self, attr: TrickPlayAttr) -> Result<()> {
        self.run(Message::TrickPlay(attr))
    }

    /// Signed playback speed: 1 plays, 0 pauses, anything else trick-plays
    pub fn set_playback_speed(&self, speed: f32) -> Result<()> {
        if !speed.is_finite() {
            return Err(PlayerError::illegal_param(format!("playback speed {}", speed)));
        }
        if speed == 1.0 {
            self.play()
        } else if speed == 0.0 {
            self.pause()
        } else {
            let direction = if speed > 0.0 {
                TrickPlayDirection::Forward
            } else {
                TrickPlayDirection::Backward
            };
            self.trick_play(TrickPlayAttr::new(direction, speed.abs()))
        }
    }

    /// Set left/right gain, each clamped to 0.0 - 1.0
    pub fn set_volume(&self, left: f32, right: f32) -> Result<()> {
        self.run(Message::SetVolume(VolumeAttr::new(left, right)))
    }

    pub fn set_audio_stream_type(&self, stream_type: AudioStreamType) -> Result<()> {
        self.run(Message::SetAudioStreamType(stream_type))
    }

    pub fn set_display_region(&self, region: DisplayRegion) -> Result<()> {
        self.run(Message::SetDisplayRegion(region))
    }

    /// Choose tracks by index into the stream tables (Prepared only)
    pub fn select_tracks(&self, video: Option<usize>, audio: Option<usize>) -> Result<()> {
        self.run(Message::SetTrack { video, audio })
    }

    pub fn invoke(&self, request: InvokeRequest) -> Result<()> {
        self.run(Message::Invoke(request))
    }

    pub fn file_info(&self) -> Result<FileInfo> {
        match self.send(Message::GetFileInfo)? {
            Reply::FileInfo(info) => Ok(info),
            other => Err(crate::internal_error!("unexpected reply {:?}", other)),
        }
    }

    pub fn stream_info(&self) -> Result<StreamInfo> {
        match self.send(Message::GetStreamInfo)? {
            Reply::StreamInfo(info) => Ok(info),
            other => Err(crate::internal_error!("unexpected reply {:?}", other)),
        }
    }

    /// Stop playback and shut the state machine down
    pub fn release(&mut self) {
        let Some(mut machine) = self.machine.take() else {
            return;
        };
        if let Err(e) = machine.send(Message::Stop) {
            warn!("stop during release failed: {}", e);
        }
        machine.shutdown();
        info!("player released");
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.release();
    }
}

/// Builder for `Player`
#[derive(Default)]
pub struct PlayerBuilder {
    config: Config,
    backend: Option<Arc<dyn Backend>>,
    listeners: Vec<Arc<dyn PlayerListener>>,
}

impl PlayerBuilder {
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Add a listener; every listener sees every event
    pub fn with_listener(mut self, listener: Arc<dyn PlayerListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn build(self) -> Result<Player> {
        let backend = self.backend.ok_or(PlayerError::NullPointer("backend"))?;
        let mut config = self.config;
        config.session.normalize();
        config.validate()?;

        let (tx, rx) = unbounded();
        let core = ControlCore::new(config, backend, self.listeners, tx.clone());
        let machine = StateMachine::start(core, tx, rx)?;
        Ok(Player {
            machine: Some(machine),
        })
    }
}
