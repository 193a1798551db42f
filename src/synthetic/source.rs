//! Test-pattern demultiplexer
//!
//! Generates an interleaved packet timeline up front at prepare time and
//! walks it with a cursor. Seeks land on video key frames every
//! `gop_ms`; every audio packet is a key frame.

use super::{BackendStats, SyntheticMedia, AUDIO_FRAME_MS};
use crate::decoder::MediaKind;
use crate::source::{
    AudioStreamInfo, FileInfo, FramePacket, MediaSource, ReadOutcome, SeekMode, Source,
    VideoStreamInfo,
};
use crate::utils::error::{PlayerError, Result};
use log::debug;
use std::sync::Arc;

const VIDEO_TRACK_ID: usize = 0;
const AUDIO_TRACK_ID: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Entry {
    pts_ms: i64,
    kind: MediaKind,
    key_frame: bool,
}

/// `Source` producing a deterministic packet timeline
pub struct SyntheticSource {
    media: SyntheticMedia,
    stats: Arc<BackendStats>,
    attached: bool,
    prepared: bool,
    started: bool,
    timeline: Vec<Entry>,
    cursor: usize,
    video_selected: bool,
    audio_selected: bool,
    read_failed: bool,
    zero_length_sent: bool,
}

impl SyntheticSource {
    pub fn new(media: SyntheticMedia, stats: Arc<BackendStats>) -> Self {
        Self {
            media,
            stats,
            attached: false,
            prepared: false,
            started: false,
            timeline: Vec::new(),
            cursor: 0,
            video_selected: true,
            audio_selected: true,
            read_failed: false,
            zero_length_sent: false,
        }
    }

    fn build_timeline(&self) -> Vec<Entry> {
        let media = &self.media;
        let mut timeline = Vec::new();

        if let Some(video) = &media.video {
            let fps = if video.frame_rate > 0.0 { video.frame_rate as f64 } else { 25.0 };
            let gop_frames = ((media.gop_ms as f64 * fps / 1000.0).round() as i64).max(1);
            let mut index = 0i64;
            loop {
                let offset = (index as f64 * 1000.0 / fps).round() as i64;
                if offset >= media.duration_ms.max(1) {
                    break;
                }
                timeline.push(Entry {
                    pts_ms: media.start_time_ms + offset,
                    kind: MediaKind::Video,
                    key_frame: index % gop_frames == 0,
                });
                index += 1;
            }
        }

        if media.audio.is_some() {
            let mut offset = 0;
            while offset < media.duration_ms {
                timeline.push(Entry {
                    pts_ms: media.start_time_ms + offset,
                    kind: MediaKind::Audio,
                    key_frame: true,
                });
                offset += AUDIO_FRAME_MS;
            }
        }

        // stable: video before audio at equal timestamps
        timeline.sort_by_key(|e| e.pts_ms);
        timeline
    }

    fn selected(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Video => self.video_selected,
            MediaKind::Audio => self.audio_selected,
        }
    }

    fn kind_of_track(&self, track_id: usize) -> Option<MediaKind> {
        match track_id {
            VIDEO_TRACK_ID if self.media.video.is_some() => Some(MediaKind::Video),
            AUDIO_TRACK_ID if self.media.audio.is_some() => Some(MediaKind::Audio),
            _ => None,
        }
    }

    fn packet(&mut self, entry: Entry) -> Result<FramePacket> {
        if !self.read_failed && self.media.fail_read_at_ms.map_or(false, |t| entry.pts_ms >= t) {
            self.read_failed = true;
            return Err(PlayerError::demux(format!("read failed at {} ms", entry.pts_ms)));
        }

        let zero_length = entry.kind == MediaKind::Video
            && !self.zero_length_sent
            && self.media.zero_length_at_ms.map_or(false, |t| entry.pts_ms >= t);
        if zero_length {
            self.zero_length_sent = true;
        }

        let data = if zero_length {
            Vec::new()
        } else {
            // low byte of the timestamp makes payloads distinguishable
            vec![entry.pts_ms as u8; 16]
        };

        Ok(FramePacket {
            track_id: match entry.kind {
                MediaKind::Video => VIDEO_TRACK_ID,
                MediaKind::Audio => AUDIO_TRACK_ID,
            },
            kind: entry.kind,
            pts_ms: Some(entry.pts_ms),
            data: Some(data),
            key_frame: entry.key_frame,
        })
    }
}

impl Source for SyntheticSource {
    fn set_source(&mut self, _media: &MediaSource) -> Result<()> {
        self.attached = true;
        Ok(())
    }

    fn prepare(&mut self) -> Result<()> {
        if !self.attached {
            return Err(PlayerError::demux("no media attached"));
        }
        if self.media.corrupt {
            return Err(PlayerError::demux("unrecognised container"));
        }
        self.timeline = self.build_timeline();
        self.cursor = 0;
        self.prepared = true;
        debug!(
            "synthetic source prepared: {} packets over {} ms",
            self.timeline.len(),
            self.media.duration_ms
        );
        Ok(())
    }

    fn file_info(&self) -> Result<FileInfo> {
        if !self.prepared {
            return Err(PlayerError::demux("source not prepared"));
        }
        let media = &self.media;
        let video_streams: Vec<_> = media
            .video
            .iter()
            .map(|v| VideoStreamInfo {
                track_id: VIDEO_TRACK_ID,
                codec: v.codec,
                width: v.width,
                height: v.height,
                frame_rate: v.frame_rate,
            })
            .collect();
        let audio_streams: Vec<_> = media
            .audio
            .iter()
            .map(|a| AudioStreamInfo {
                track_id: AUDIO_TRACK_ID,
                codec: a.codec,
                sample_rate: a.sample_rate,
                channels: a.channels,
            })
            .collect();

        Ok(FileInfo {
            format_name: media.format_name.clone(),
            duration_ms: media.duration_ms,
            start_time_ms: media.start_time_ms,
            bitrate: media.bitrate,
            video_index: (self.video_selected && !video_streams.is_empty()).then_some(0),
            audio_index: (self.audio_selected && !audio_streams.is_empty()).then_some(0),
            video_streams,
            audio_streams,
        })
    }

    fn select_track(&mut self, video: Option<usize>, audio: Option<usize>) -> Result<()> {
        let video_tracks = usize::from(self.media.video.is_some());
        let audio_tracks = usize::from(self.media.audio.is_some());
        if video.map_or(false, |i| i >= video_tracks) || audio.map_or(false, |i| i >= audio_tracks) {
            return Err(PlayerError::illegal_param(format!(
                "no such track (video {:?}, audio {:?})",
                video, audio
            )));
        }
        self.video_selected = video.is_some();
        self.audio_selected = audio.is_some();
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if !self.prepared {
            return Err(PlayerError::demux("start before prepare"));
        }
        self.started = true;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<ReadOutcome> {
        if !self.started {
            return Ok(ReadOutcome::NoData);
        }
        while let Some(&entry) = self.timeline.get(self.cursor) {
            self.cursor += 1;
            if self.selected(entry.kind) {
                return self.packet(entry).map(ReadOutcome::Frame);
            }
        }
        Ok(ReadOutcome::EndOfFile)
    }

    fn free_frame(&mut self, _packet: FramePacket) -> Result<()> {
        BackendStats::bump(&self.stats.packets_freed);
        Ok(())
    }

    fn seek(&mut self, track_id: usize, time_ms: i64, mode: SeekMode) -> Result<()> {
        let kind = self
            .kind_of_track(track_id)
            .ok_or_else(|| PlayerError::illegal_param(format!("unknown track {}", track_id)))?;
        let keys = self
            .timeline
            .iter()
            .filter(|e| e.kind == kind && e.key_frame)
            .map(|e| e.pts_ms);

        let target = match mode {
            SeekMode::PrecedingKey => keys.take_while(|&pts| pts <= time_ms).last(),
            SeekMode::FollowingKey => keys.skip_while(|&pts| pts < time_ms).next(),
        }
        .ok_or_else(|| {
            PlayerError::demux(format!("no key frame for {} ms ({:?})", time_ms, mode))
        })?;

        self.cursor = self.timeline.partition_point(|e| e.pts_ms < target);
        debug!("synthetic source seek {} ms -> {} ms", time_ms, target);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(media: SyntheticMedia) -> SyntheticSource {
        let mut source = SyntheticSource::new(media, Arc::new(BackendStats::default()));
        source.set_source(&MediaSource::Uri("synthetic://test".into())).unwrap();
        source.prepare().unwrap();
        source.start().unwrap();
        source
    }

    fn next(source: &mut SyntheticSource) -> FramePacket {
        match source.read_frame().unwrap() {
            ReadOutcome::Frame(packet) => packet,
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[test]
    fn test_prepare_requires_media() {
        let mut source = SyntheticSource::new(SyntheticMedia::default(), Arc::default());
        assert!(source.prepare().is_err());
    }

    #[test]
    fn test_file_info_reports_tracks() {
        let source = prepared(SyntheticMedia::default());
        let info = source.file_info().unwrap();
        assert_eq!(info.duration_ms, 2_000);
        assert!(info.has_video());
        assert!(info.has_audio());
        assert_eq!(info.selected_audio().unwrap().track_id, AUDIO_TRACK_ID);
    }

    #[test]
    fn test_reads_interleaved_until_eof() {
        let mut source = prepared(SyntheticMedia::with_duration(100));
        let first = next(&mut source);
        assert_eq!(first.kind, MediaKind::Video);
        assert!(first.key_frame);

        let mut count = 1;
        while let ReadOutcome::Frame(_) = source.read_frame().unwrap() {
            count += 1;
        }
        // 3 video frames at 0/40/80 and 5 audio packets every 20 ms
        assert_eq!(count, 8);
        assert!(matches!(source.read_frame().unwrap(), ReadOutcome::EndOfFile));
    }

    #[test]
    fn test_unselected_track_is_skipped() {
        let mut source = prepared(SyntheticMedia::with_duration(200));
        source.select_track(Some(0), None).unwrap();
        while let ReadOutcome::Frame(packet) = source.read_frame().unwrap() {
            assert_eq!(packet.kind, MediaKind::Video);
        }
        assert!(source.select_track(Some(1), None).is_err());
    }

    #[test]
    fn test_seek_lands_on_key_frames() {
        let mut source = prepared(SyntheticMedia::with_duration(3_000));
        source.seek(VIDEO_TRACK_ID, 1_500, SeekMode::PrecedingKey).unwrap();
        assert_eq!(next(&mut source).pts_ms, Some(1_000));

        source.seek(VIDEO_TRACK_ID, 1_500, SeekMode::FollowingKey).unwrap();
        assert_eq!(next(&mut source).pts_ms, Some(2_000));

        assert!(source.seek(VIDEO_TRACK_ID, 2_500, SeekMode::FollowingKey).is_err());
    }

    #[test]
    fn test_injected_faults() {
        let media = SyntheticMedia {
            zero_length_at_ms: Some(40),
            fail_read_at_ms: Some(100),
            ..SyntheticMedia::video_only(200)
        };
        let mut source = prepared(media);
        assert_eq!(next(&mut source).data.map(|d| d.len()), Some(16));
        assert_eq!(next(&mut source).data.map(|d| d.len()), Some(0));
        next(&mut source);
        assert!(source.read_frame().is_err());
        // the fault fires once
        assert!(matches!(source.read_frame().unwrap(), ReadOutcome::Frame(_)));
    }
}
