//! Decoder module for playctl
//!
//! The engine does not decode anything itself. This module defines the
//! interface a codec implementation exposes to the scheduling thread, the
//! tagged output buffers it produces, and the slot arena that keeps those
//! buffers on a round trip between decoder and sink.

mod buffer_pool;
mod codec;

pub use buffer_pool::{BufferHandle, BufferPool};
pub use codec::{CodecFormat, CodecMime};

use crate::source::FramePacket;
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};

/// Kind of elementary stream or decoded output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Decoder trait defining the interface the engine drives
pub trait Decoder: Send {
    /// Which channel this decoder serves
    fn kind(&self) -> MediaKind;

    /// Start accepting input
    fn start(&mut self) -> Result<()>;

    /// Stop decoding; all output buffers must have been released first
    fn stop(&mut self) -> Result<()>;

    /// Discard pending input and output
    fn flush(&mut self) -> Result<()>;

    /// Submit one elementary-stream unit
    ///
    /// # Arguments
    ///
    /// * `packet` - Packet to copy into the decoder; an end-of-stream packet
    ///   marks the end of input
    ///
    /// # Returns
    ///
    /// `InputStatus::Full` when the input queue cannot take the packet now
    fn queue_input(&mut self, packet: &FramePacket) -> Result<InputStatus>;

    /// Fetch the next decoded output
    fn dequeue_output(&mut self) -> Result<DecodeOutput>;

    /// Give a rendered (or discarded) output buffer back for reuse
    fn release_output(&mut self, buffer: OutputBuffer) -> Result<()>;

    /// Output buffers currently owned by the decoder
    fn free_output_buffers(&self) -> usize;
}

/// Result of submitting input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
    /// Packet copied into the decoder
    Accepted,

    /// Input queue is full; retry later
    Full,
}

/// Result of asking for output
#[derive(Debug)]
pub enum DecodeOutput {
    /// A decoded frame
    Frame(OutputBuffer),

    /// Nothing decoded yet
    Pending,

    /// All input up to the end-of-stream packet has been decoded
    EndOfStream,
}

/// Attributes used to create and configure a decoder
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderAttr {
    pub kind: MediaKind,
    pub codec: CodecFormat,
    pub mime: CodecMime,
    /// Picture size for video decoders
    pub width: u32,
    pub height: u32,
    /// Sample layout for audio decoders
    pub sample_rate: u32,
    pub channels: u16,
    /// Elementary-stream input buffer size in bytes
    pub input_buffer_size: u32,
    /// Number of output buffer slots
    pub output_buffers: u32,
}

/// Interleaved PCM samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSamples {
    pub sample_rate: u32,
    pub channels: u16,
    pub data: Vec<i16>,
}

impl AudioSamples {
    /// Number of sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.data.len() / self.channels as usize
        }
    }

    /// Playback duration of these samples
    pub fn duration_ms(&self) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames() as i64 * 1000 / self.sample_rate as i64
    }
}

/// A decoded picture
#[derive(Debug, Clone, PartialEq)]
pub struct VideoPicture {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Decoded payload; exactly one medium per buffer
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    Audio(AudioSamples),
    Video(VideoPicture),
}

/// A decoded frame lent out by a decoder
#[derive(Debug)]
pub struct OutputBuffer {
    handle: BufferHandle,
    /// Presentation timestamp in milliseconds
    pub pts_ms: i64,
    pub payload: FramePayload,
}

impl OutputBuffer {
    pub fn new(handle: BufferHandle, pts_ms: i64, payload: FramePayload) -> Self {
        Self {
            handle,
            pts_ms,
            payload,
        }
    }

    /// Slot this buffer occupies in the decoder's pool
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn kind(&self) -> MediaKind {
        match self.payload {
            FramePayload::Audio(_) => MediaKind::Audio,
            FramePayload::Video(_) => MediaKind::Video,
        }
    }
}
