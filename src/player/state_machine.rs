//! Serialized command processing
//!
//! One consumer thread owns the lifecycle state. Public calls post a
//! message with a reply channel and block on the reply; the scheduling
//! thread posts internal messages without one.

use crate::audio::{AudioStreamType, VolumeAttr};
use crate::internal_error;
use crate::player::state::{is_valid, next_state, Command, PlayerState};
use crate::player::trick_play::TrickPlayAttr;
use crate::player::{InvokeRequest, StreamInfo};
use crate::renderer::DisplayRegion;
use crate::source::{FileInfo, MediaSource};
use crate::utils::error::{PlaybackError, PlayerError, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Message carried to the state machine thread
#[derive(Debug)]
pub(crate) enum Message {
    SetSource(MediaSource),
    Prepare,
    Play,
    Pause,
    TrickPlay(TrickPlayAttr),
    Stop,
    Seek(i64),
    GetFileInfo,
    GetStreamInfo,
    SetTrack {
        video: Option<usize>,
        audio: Option<usize>,
    },
    SetVolume(VolumeAttr),
    SetAudioStreamType(AudioStreamType),
    SetDisplayRegion(DisplayRegion),
    Invoke(InvokeRequest),
    Error(PlaybackError),
    Shutdown,
}

impl Message {
    /// Command checked against the validity table; `None` for Shutdown
    pub fn command(&self) -> Option<Command> {
        let command = match self {
            Message::SetSource(_) => Command::SetSource,
            Message::Prepare => Command::Prepare,
            Message::Play => Command::Play,
            Message::Pause => Command::Pause,
            Message::TrickPlay(_) => Command::TrickPlay,
            Message::Stop => Command::Stop,
            Message::Seek(_) => Command::Seek,
            Message::GetFileInfo | Message::GetStreamInfo => Command::GetInfo,
            Message::SetTrack { .. } => Command::SetTrack,
            Message::SetVolume(_) => Command::SetVolume,
            Message::SetAudioStreamType(_) => Command::SetAudioStreamType,
            Message::SetDisplayRegion(_) => Command::SetDisplayRegion,
            Message::Invoke(_) => Command::Invoke,
            Message::Error(_) => Command::Error,
            Message::Shutdown => return None,
        };
        Some(command)
    }
}

/// Successful command result
#[derive(Debug)]
pub(crate) enum Reply {
    Done,
    FileInfo(FileInfo),
    StreamInfo(StreamInfo),
}

pub(crate) struct Envelope {
    pub message: Message,
    pub reply: Option<Sender<Result<Reply>>>,
}

/// Executes validated commands
pub(crate) trait CommandHandler: Send + Sync + 'static {
    /// Run a command that is valid in `state`
    fn handle(&self, message: Message, state: PlayerState) -> Result<Reply>;

    /// Called after the state changed
    fn on_transition(&self, from: PlayerState, to: PlayerState);
}

/// Handle to the state machine thread
pub(crate) struct StateMachine {
    tx: Sender<Envelope>,
    state: Arc<RwLock<PlayerState>>,
    thread: Option<JoinHandle<()>>,
}

impl StateMachine {
    /// Spawn the consumer thread
    ///
    /// The channel is created by the caller so that the handler can keep a
    /// sender for internal messages.
    pub fn start<H: CommandHandler>(
        handler: Arc<H>,
        tx: Sender<Envelope>,
        rx: Receiver<Envelope>,
    ) -> Result<Self> {
        let state = Arc::new(RwLock::new(PlayerState::Idle));
        let thread_state = Arc::clone(&state);
        let thread = thread::Builder::new()
            .name("playctl-state".to_string())
            .spawn(move || run(handler, rx, thread_state))?;

        Ok(Self {
            tx,
            state,
            thread: Some(thread),
        })
    }

    /// Post a command and wait for its result
    pub fn send(&self, message: Message) -> Result<Reply> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(Envelope {
                message,
                reply: Some(reply_tx),
            })
            .map_err(|_| internal_error!("state machine thread is gone"))?;
        reply_rx
            .recv()
            .map_err(|_| internal_error!("state machine dropped the reply"))?
    }

    pub fn state(&self) -> PlayerState {
        *self.state.read()
    }

    /// Stop the consumer thread after it drains queued messages
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.tx.send(Envelope {
            message: Message::Shutdown,
            reply: None,
        });
        if thread.join().is_err() {
            warn!("state machine thread panicked");
        }
    }
}

impl Drop for StateMachine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<H: CommandHandler>(handler: Arc<H>, rx: Receiver<Envelope>, state: Arc<RwLock<PlayerState>>) {
    info!("state machine started");

    for Envelope { message, reply } in rx.iter() {
        let Some(command) = message.command() else {
            break;
        };
        let current = *state.read();

        let result = if is_valid(command, current) {
            handler.handle(message, current).map(|reply| {
                let next = next_state(command, current);
                if next != current {
                    *state.write() = next;
                    info!("state {:?} -> {:?}", current, next);
                    handler.on_transition(current, next);
                }
                reply
            })
        } else {
            debug!("{:?} rejected in state {:?}", command, current);
            Err(PlayerError::IllegalStateAction {
                command,
                state: current,
            })
        };

        match reply {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                if let Err(e) = result {
                    debug!("internal {:?} not applied: {}", command, e);
                }
            }
        }
    }

    info!("state machine stopped");
}
