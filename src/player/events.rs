//! Notifications delivered to the host

use crate::player::PlayerState;
use crate::utils::error::PlaybackError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;

/// Everything a listener can be told
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlayerEvent {
    StateChanged(PlayerState),

    /// Playback position relative to the container start, in milliseconds
    Progress(i64),

    /// A seek finished at the given position
    SeekEnd(i64),

    EndOfFile,

    /// Backward trick-play reached the start of the file
    StartOfFile,

    Error(PlaybackError),
    FirstVideoFrame,
    FirstAudioFrame,
}

impl PlayerEvent {
    /// Call the listener method matching this event
    pub fn dispatch(&self, listener: &dyn PlayerListener) {
        match *self {
            PlayerEvent::StateChanged(state) => listener.on_state_changed(state),
            PlayerEvent::Progress(position) => listener.on_progress(position),
            PlayerEvent::SeekEnd(position) => listener.on_seek_end(position),
            PlayerEvent::EndOfFile => listener.on_end_of_file(),
            PlayerEvent::StartOfFile => listener.on_start_of_file(),
            PlayerEvent::Error(error) => listener.on_error(error),
            PlayerEvent::FirstVideoFrame => listener.on_first_video_frame(),
            PlayerEvent::FirstAudioFrame => listener.on_first_audio_frame(),
        }
    }
}

/// Receives player notifications
///
/// Methods are called from engine threads and must not call back into
/// the player synchronously.
pub trait PlayerListener: Send + Sync {
    fn on_state_changed(&self, _state: PlayerState) {}

    fn on_progress(&self, _position_ms: i64) {}

    fn on_seek_end(&self, _position_ms: i64) {}

    fn on_end_of_file(&self) {}

    fn on_start_of_file(&self) {}

    fn on_error(&self, _error: PlaybackError) {}

    fn on_first_video_frame(&self) {}

    fn on_first_audio_frame(&self) {}
}

/// Listener that forwards every event into a channel
pub struct ChannelListener {
    tx: Sender<PlayerEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, Receiver<PlayerEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    fn forward(&self, event: PlayerEvent) {
        // the receiver may already be gone during teardown
        let _ = self.tx.send(event);
    }
}

impl PlayerListener for ChannelListener {
    fn on_state_changed(&self, state: PlayerState) {
        self.forward(PlayerEvent::StateChanged(state));
    }

    fn on_progress(&self, position_ms: i64) {
        self.forward(PlayerEvent::Progress(position_ms));
    }

    fn on_seek_end(&self, position_ms: i64) {
        self.forward(PlayerEvent::SeekEnd(position_ms));
    }

    fn on_end_of_file(&self) {
        self.forward(PlayerEvent::EndOfFile);
    }

    fn on_start_of_file(&self) {
        self.forward(PlayerEvent::StartOfFile);
    }

    fn on_error(&self, error: PlaybackError) {
        self.forward(PlayerEvent::Error(error));
    }

    fn on_first_video_frame(&self) {
        self.forward(PlayerEvent::FirstVideoFrame);
    }

    fn on_first_audio_frame(&self) {
        self.forward(PlayerEvent::FirstAudioFrame);
    }
}
