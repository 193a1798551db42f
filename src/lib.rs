//! playctl - player control engine
//!
//! Drives playback of one media session over host-supplied collaborators:
//! a demultiplexer, per-track decoders, and audio/video output devices.
//! The engine owns the lifecycle state machine, the scheduling thread
//! that moves packets and frames between them, and the audio-clock sync
//! that decides when each frame is shown.

pub mod audio;
pub mod decoder;
pub mod player;
pub mod renderer;
pub mod sink;
pub mod source;
pub mod synthetic;
pub mod utils;

pub use player::{
    Backend, ChannelListener, Command, InvokeRequest, Player, PlayerBuilder, PlayerEvent,
    PlayerListener, PlayerState, StreamInfo, TrickPlayAttr, TrickPlayDirection,
};
pub use source::{FileInfo, MediaSource};
pub use utils::{Config, PlaybackError, PlayerError, Result};
