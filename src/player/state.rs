//! Player lifecycle states and the command validity table
//!
//! Every public command is checked against the table before its handler
//! runs. A rejected command leaves the state untouched.

use serde::Serialize;

/// Lifecycle state of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PlayerState {
    /// No media attached
    Idle,

    /// Media attached, not parsed yet
    Initialized,

    /// Metadata parsed, pipeline not built
    Prepared,

    Playing,

    /// Playing at a non-unit speed or backwards
    TrickPlaying,

    Paused,

    /// A runtime fault stopped playback; only Stop leaves this state
    Error,
}

impl PlayerState {
    pub const ALL: [PlayerState; 7] = [
        PlayerState::Idle,
        PlayerState::Initialized,
        PlayerState::Prepared,
        PlayerState::Playing,
        PlayerState::TrickPlaying,
        PlayerState::Paused,
        PlayerState::Error,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Commands accepted by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    SetSource,
    Prepare,
    Play,
    Pause,
    TrickPlay,
    Stop,
    Seek,
    GetInfo,
    SetTrack,
    SetVolume,
    SetAudioStreamType,
    SetDisplayRegion,
    Invoke,
    /// Posted internally when the scheduling thread hits a fault
    Error,
}

impl Command {
    pub const ALL: [Command; 14] = [
        Command::SetSource,
        Command::Prepare,
        Command::Play,
        Command::Pause,
        Command::TrickPlay,
        Command::Stop,
        Command::Seek,
        Command::GetInfo,
        Command::SetTrack,
        Command::SetVolume,
        Command::SetAudioStreamType,
        Command::SetDisplayRegion,
        Command::Invoke,
        Command::Error,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

const T: bool = true;
const F: bool = false;

// Columns: Idle, Initialized, Prepared, Playing, TrickPlaying, Paused, Error
const VALIDITY: [[bool; 7]; 14] = [
    /* SetSource          */ [T, F, F, F, F, F, F],
    /* Prepare            */ [F, T, T, F, F, F, F],
    /* Play               */ [F, F, T, T, T, T, F],
    /* Pause              */ [F, F, F, T, F, T, F],
    /* TrickPlay          */ [F, F, F, T, T, F, F],
    /* Stop               */ [T, T, T, T, T, T, T],
    /* Seek               */ [F, F, T, T, T, T, F],
    /* GetInfo            */ [F, F, T, T, T, T, F],
    /* SetTrack           */ [F, F, T, F, F, F, F],
    /* SetVolume          */ [T, T, T, T, T, T, F],
    /* SetAudioStreamType */ [T, T, T, T, T, T, F],
    /* SetDisplayRegion   */ [T, T, T, T, T, T, F],
    /* Invoke             */ [T, T, T, T, T, T, F],
    /* Error              */ [F, T, T, T, T, T, T],
];

/// Whether `command` may run in `state`
pub fn is_valid(command: Command, state: PlayerState) -> bool {
    VALIDITY[command.index()][state.index()]
}

/// State reached when a valid command succeeds
pub fn next_state(command: Command, state: PlayerState) -> PlayerState {
    match command {
        Command::SetSource => PlayerState::Initialized,
        Command::Prepare => PlayerState::Prepared,
        Command::Play => PlayerState::Playing,
        Command::Pause => PlayerState::Paused,
        Command::TrickPlay => PlayerState::TrickPlaying,
        Command::Stop => PlayerState::Idle,
        Command::Error => PlayerState::Error,
        Command::Seek
        | Command::GetInfo
        | Command::SetTrack
        | Command::SetVolume
        | Command::SetAudioStreamType
        | Command::SetDisplayRegion
        | Command::Invoke => state,
    }
}
