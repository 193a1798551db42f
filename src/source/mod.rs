//! Source / demux module for playctl
//!
//! Container parsing happens outside the engine. This module defines the
//! interface a demultiplexer exposes, the metadata it reports at prepare
//! time, and the packets it hands out. `SourceAdapter` wraps a `Source`
//! with the cached-packet slot and read consistency checks the scheduling
//! thread relies on.

mod adapter;

pub use adapter::{CacheStatus, SourceAdapter};

use crate::decoder::{CodecFormat, MediaKind};
use crate::utils::error::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Container format name that doubles the trick-play stride
pub const MPEGTS_FORMAT_NAME: &str = "mpegts";

/// Demultiplexer interface
pub trait Source: Send {
    /// Attach the media to read from
    ///
    /// # Arguments
    ///
    /// * `media` - Path, descriptor or push-style stream
    fn set_source(&mut self, media: &MediaSource) -> Result<()>;

    /// Parse container metadata; may block
    fn prepare(&mut self) -> Result<()>;

    /// Metadata collected by `prepare`
    fn file_info(&self) -> Result<FileInfo>;

    /// Choose which tracks `read_frame` returns
    ///
    /// # Arguments
    ///
    /// * `video` - Index into `FileInfo::video_streams`, or `None` to disable video
    /// * `audio` - Index into `FileInfo::audio_streams`, or `None` to disable audio
    fn select_track(&mut self, video: Option<usize>, audio: Option<usize>) -> Result<()>;

    /// Begin reading
    fn start(&mut self) -> Result<()>;

    /// Read the next packet
    ///
    /// # Returns
    ///
    /// `ReadOutcome::NoData` when nothing is available yet, which is
    /// distinct from `ReadOutcome::EndOfFile`
    fn read_frame(&mut self) -> Result<ReadOutcome>;

    /// Give a packet returned by `read_frame` back to the source
    fn free_frame(&mut self, packet: FramePacket) -> Result<()>;

    /// Reposition the read cursor
    ///
    /// # Arguments
    ///
    /// * `track_id` - Track whose key frames define the seek points
    /// * `time_ms` - Target timestamp
    /// * `mode` - Which key frame to land on
    fn seek(&mut self, track_id: usize, time_ms: i64, mode: SeekMode) -> Result<()>;

    /// Stop reading
    fn stop(&mut self) -> Result<()>;
}

/// Push-style byte source supplied by the host
pub trait BufferStream: Send {
    /// Copy up to `buf.len()` bytes; `Ok(0)` means no data right now
    fn read_data(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Total size, when known
    fn total_size(&self) -> Option<u64> {
        None
    }
}

/// Where the media comes from
#[derive(Clone)]
pub enum MediaSource {
    /// File path or URL
    Uri(String),

    /// Open file descriptor and the byte range to play
    Descriptor { fd: i32, offset: i64, length: i64 },

    /// Host-fed byte stream
    Stream(Arc<Mutex<dyn BufferStream>>),
}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaSource::Uri(uri) => f.debug_tuple("Uri").field(uri).finish(),
            MediaSource::Descriptor { fd, offset, length } => f
                .debug_struct("Descriptor")
                .field("fd", fd)
                .field("offset", offset)
                .field("length", length)
                .finish(),
            MediaSource::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Key-frame policy for seeks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// Nearest key frame at or before the target
    PrecedingKey,

    /// Nearest key frame at or after the target
    FollowingKey,
}

/// Outcome of a read
#[derive(Debug)]
pub enum ReadOutcome {
    Frame(FramePacket),
    NoData,
    EndOfFile,
}

/// One elementary-stream unit
#[derive(Debug, Clone, PartialEq)]
pub struct FramePacket {
    /// Track the packet belongs to
    pub track_id: usize,
    pub kind: MediaKind,
    /// Timestamp in milliseconds; `None` on end-of-stream
    pub pts_ms: Option<i64>,
    /// Payload; `None` on end-of-stream
    pub data: Option<Vec<u8>>,
    pub key_frame: bool,
}

impl FramePacket {
    /// End-of-stream marker for the given channel
    pub fn end_of_stream(kind: MediaKind) -> Self {
        Self {
            track_id: 0,
            kind,
            pts_ms: None,
            data: None,
            key_frame: false,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.data.is_none()
    }
}

/// Video track description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub track_id: usize,
    pub codec: CodecFormat,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f32,
}

/// Audio track description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub track_id: usize,
    pub codec: CodecFormat,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Container and track metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Container format name
    pub format_name: String,

    /// Duration in milliseconds; zero or negative when unknown
    pub duration_ms: i64,

    /// Timestamp of the first packet
    pub start_time_ms: i64,

    /// Overall bitrate in bits per second
    pub bitrate: u32,

    pub video_streams: Vec<VideoStreamInfo>,
    pub audio_streams: Vec<AudioStreamInfo>,

    /// Selected entry of `video_streams`
    pub video_index: Option<usize>,

    /// Selected entry of `audio_streams`
    pub audio_index: Option<usize>,
}

impl FileInfo {
    pub fn selected_video(&self) -> Option<&VideoStreamInfo> {
        self.video_index.and_then(|i| self.video_streams.get(i))
    }

    pub fn selected_audio(&self) -> Option<&AudioStreamInfo> {
        self.audio_index.and_then(|i| self.audio_streams.get(i))
    }

    pub fn has_video(&self) -> bool {
        self.selected_video().is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.selected_audio().is_some()
    }

    /// Whether the selected video track is a still image
    pub fn is_image(&self) -> bool {
        self.selected_video().map_or(false, |v| v.codec.is_image())
    }

    pub fn is_mpegts(&self) -> bool {
        self.format_name == MPEGTS_FORMAT_NAME
    }
}
