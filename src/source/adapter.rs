//! Source facade used by the scheduling thread
//!
//! Holds at most one packet between reading it and handing it to a
//! decoder. A new packet is never read while one is cached.

use crate::decoder::MediaKind;
use crate::source::{FileInfo, FramePacket, MediaSource, ReadOutcome, SeekMode, Source};
use crate::utils::error::{PlayerError, Result};
use log::{debug, warn};

/// State of the cache after `fill_cache`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// A packet (possibly an end-of-stream marker) is cached
    Ready,

    /// The source has nothing yet
    NoData,
}

#[derive(Debug)]
struct CachedPacket {
    packet: FramePacket,
    /// Synthesised end-of-stream markers never came from the source
    from_source: bool,
}

/// `Source` wrapper with the cached-packet slot
pub struct SourceAdapter {
    source: Box<dyn Source>,
    cached: Option<CachedPacket>,
}

impl SourceAdapter {
    pub fn new(source: Box<dyn Source>) -> Self {
        Self { source, cached: None }
    }

    pub fn set_source(&mut self, media: &MediaSource) -> Result<()> {
        self.source.set_source(media)
    }

    /// Parse metadata and check it is playable
    pub fn prepare(&mut self) -> Result<FileInfo> {
        self.source.prepare()?;
        let info = self.source.file_info()?;
        check_file_info(&info)?;
        Ok(info)
    }

    pub fn file_info(&self) -> Result<FileInfo> {
        self.source.file_info()
    }

    pub fn select_track(&mut self, video: Option<usize>, audio: Option<usize>) -> Result<FileInfo> {
        self.source
            .select_track(video, audio)
            .map_err(|e| PlayerError::demux(format!("track selection failed: {}", e)))?;
        let info = self.source.file_info()?;
        check_file_info(&info)?;
        Ok(info)
    }

    pub fn start(&mut self) -> Result<()> {
        self.source.start()
    }

    pub fn stop(&mut self) -> Result<()> {
        self.clear_cache();
        self.source.stop()
    }

    pub fn seek(&mut self, track_id: usize, time_ms: i64, mode: SeekMode) -> Result<()> {
        self.source.seek(track_id, time_ms, mode)
    }

    /// Make sure a packet is cached, reading one if necessary
    ///
    /// End of file is cached as an end-of-stream marker. A non-EOF packet
    /// with a present but empty payload is rejected as a demux error.
    pub fn fill_cache(&mut self) -> Result<CacheStatus> {
        if self.cached.is_some() {
            return Ok(CacheStatus::Ready);
        }

        match self.source.read_frame()? {
            ReadOutcome::NoData => Ok(CacheStatus::NoData),
            ReadOutcome::EndOfFile => {
                debug!("source reached end of file");
                self.cached = Some(CachedPacket {
                    packet: FramePacket::end_of_stream(MediaKind::Video),
                    from_source: false,
                });
                Ok(CacheStatus::Ready)
            }
            ReadOutcome::Frame(packet) => match &packet.data {
                None => {
                    self.source.free_frame(packet)?;
                    Ok(CacheStatus::NoData)
                }
                Some(data) if data.is_empty() => {
                    let track = packet.track_id;
                    self.source.free_frame(packet)?;
                    Err(PlayerError::demux(format!(
                        "zero-length packet on track {}",
                        track
                    )))
                }
                Some(_) => {
                    self.cached = Some(CachedPacket {
                        packet,
                        from_source: true,
                    });
                    Ok(CacheStatus::Ready)
                }
            },
        }
    }

    /// Replace the cache with an end-of-stream marker
    pub fn cache_end_of_stream(&mut self) {
        self.clear_cache();
        self.cached = Some(CachedPacket {
            packet: FramePacket::end_of_stream(MediaKind::Video),
            from_source: false,
        });
    }

    /// The cached packet, if any
    pub fn cached(&self) -> Option<&FramePacket> {
        self.cached.as_ref().map(|c| &c.packet)
    }

    /// Release the cached packet back to the source
    pub fn clear_cache(&mut self) {
        if let Some(cached) = self.cached.take() {
            if cached.from_source {
                if let Err(e) = self.source.free_frame(cached.packet) {
                    warn!("failed to free cached packet: {}", e);
                }
            }
        }
    }

    pub fn has_cached(&self) -> bool {
        self.cached.is_some()
    }
}

/// Reject metadata the engine cannot play
fn check_file_info(info: &FileInfo) -> Result<()> {
    if let Some(index) = info.video_index {
        if index >= info.video_streams.len() {
            return Err(PlayerError::demux(format!(
                "video track index {} out of range ({} tracks)",
                index,
                info.video_streams.len()
            )));
        }
    }

    if let Some(index) = info.audio_index {
        if index >= info.audio_streams.len() {
            return Err(PlayerError::demux(format!(
                "audio track index {} out of range ({} tracks)",
                index,
                info.audio_streams.len()
            )));
        }
    }

    if let Some(video) = info.selected_video() {
        if !video.codec.is_playable_video() {
            return Err(PlayerError::not_supported(format!(
                "video codec {:?}",
                video.codec
            )));
        }
    }

    if !info.has_video() && !info.has_audio() {
        return Err(PlayerError::demux("no playable track selected"));
    }

    Ok(())
}
