//! Fronts the audio and video sinks and the sync engine they share

use crate::audio::{AudioSink, AudioStreamType, SyncEngine, SyncStats, VolumeAttr};
use crate::decoder::{MediaKind, OutputBuffer};
use crate::player::TrickPlayDirection;
use crate::renderer::{DisplayRegion, VideoSink};
use crate::sink::{QueueStats, RenderMode, RenderStatus, Sink, SinkEvent};
use crate::utils::config::SyncConfig;
use crate::utils::error::{PlayerError, Result};
use log::debug;

pub struct SinkManager {
    audio: Option<AudioSink>,
    video: Option<VideoSink>,
    sync: SyncEngine,
    events: Vec<SinkEvent>,
}

fn pick<'a>(
    audio: &'a mut Option<AudioSink>,
    video: &'a mut Option<VideoSink>,
    kind: MediaKind,
) -> Option<&'a mut dyn Sink> {
    match kind {
        MediaKind::Audio => audio.as_mut().map(|s| s as &mut dyn Sink),
        MediaKind::Video => video.as_mut().map(|s| s as &mut dyn Sink),
    }
}

impl SinkManager {
    pub fn new(sync_config: SyncConfig, audio: Option<AudioSink>, video: Option<VideoSink>) -> Self {
        let has_audio = audio.is_some();
        Self {
            audio,
            video,
            sync: SyncEngine::new(sync_config, has_audio),
            events: Vec::new(),
        }
    }

    /// Open every device
    pub fn init(&mut self) -> Result<()> {
        if let Some(audio) = self.audio.as_mut() {
            audio.init()?;
        }
        if let Some(video) = self.video.as_mut() {
            video.init()?;
        }
        Ok(())
    }

    /// Close every device, attempting all of them before reporting the first failure
    pub fn deinit(&mut self) -> Result<()> {
        let audio = self.audio.as_mut().map_or(Ok(()), |s| s.deinit());
        let video = self.video.as_mut().map_or(Ok(()), |s| s.deinit());
        audio.and(video)
    }

    fn each<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut dyn Sink) -> Result<()>,
    {
        if let Some(audio) = self.audio.as_mut() {
            f(audio)?;
        }
        if let Some(video) = self.video.as_mut() {
            f(video)?;
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.sync.reset();
        self.each(|s| s.start())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.each(|s| s.stop())?;
        self.sync.reset();
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.sync.pause();
        self.each(|s| s.pause())
    }

    pub fn resume(&mut self) -> Result<()> {
        self.each(|s| s.resume())?;
        self.sync.resume();
        Ok(())
    }

    /// Discard queued frames in both sinks and forget both channel clocks
    pub fn reset(&mut self) -> Result<()> {
        self.each(|s| s.reset())?;
        self.sync.reset();
        Ok(())
    }

    /// Change timeline speed; both channel clocks restart
    pub fn set_speed(&mut self, speed: f32, direction: TrickPlayDirection) {
        debug!("sink speed {}x {:?}", speed, direction);
        self.sync.set_speed(speed, direction);
    }

    pub fn set_render_mode(&mut self, mode: RenderMode) {
        let _ = self.each(|s| {
            s.set_render_mode(mode);
            Ok(())
        });
    }

    /// Hand an optional new frame to a sink and render at most one frame
    pub fn render_frame(&mut self, kind: MediaKind, frame: Option<OutputBuffer>) -> Result<RenderStatus> {
        let sink = pick(&mut self.audio, &mut self.video, kind).ok_or(PlayerError::NullPointer("sink"))?;
        Ok(sink.render_frame(frame, &mut self.sync, &mut self.events))
    }

    pub fn render_eos(&mut self, kind: MediaKind) -> Result<()> {
        let sink = pick(&mut self.audio, &mut self.video, kind).ok_or(PlayerError::NullPointer("sink"))?;
        sink.render_eos();
        Ok(())
    }

    pub fn dequeue_release(&mut self, kind: MediaKind) -> Option<OutputBuffer> {
        pick(&mut self.audio, &mut self.video, kind)?.dequeue_release()
    }

    pub fn has_sink(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => self.audio.is_some(),
            MediaKind::Video => self.video.is_some(),
        }
    }

    pub fn last_rendered_pts(&self, kind: MediaKind) -> Option<i64> {
        match kind {
            MediaKind::Audio => self.audio.as_ref()?.last_rendered_pts(),
            MediaKind::Video => self.video.as_ref()?.last_rendered_pts(),
        }
    }

    /// Position of the master output: audio when it is playing, video otherwise
    pub fn render_position(&self) -> Option<i64> {
        if !self.sync.is_trick_play() {
            if let Some(position) = self.last_rendered_pts(MediaKind::Audio) {
                return Some(position);
            }
        }
        self.last_rendered_pts(MediaKind::Video)
    }

    pub fn set_volume(&mut self, volume: VolumeAttr) -> Result<()> {
        match self.audio.as_mut() {
            Some(audio) => audio.set_volume(volume),
            None => Ok(()),
        }
    }

    pub fn set_audio_stream_type(&mut self, stream_type: AudioStreamType) -> Result<()> {
        match self.audio.as_mut() {
            Some(audio) => audio.set_stream_type(stream_type),
            None => Ok(()),
        }
    }

    pub fn set_display_region(&mut self, region: DisplayRegion) -> Result<()> {
        match self.video.as_mut() {
            Some(video) => video.set_display_region(region),
            None => Ok(()),
        }
    }

    /// Drain notifications raised since the last call
    pub fn take_events(&mut self) -> Vec<SinkEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.sync.stats()
    }

    pub fn queue_stats(&self, kind: MediaKind) -> Option<QueueStats> {
        match kind {
            MediaKind::Audio => self.audio.as_ref().map(|s| s.queue().stats()),
            MediaKind::Video => self.video.as_ref().map(|s| s.queue().stats()),
        }
    }

    /// Frames currently held by a sink, queued or awaiting release
    pub fn frames_held(&self, kind: MediaKind) -> usize {
        let queue = match kind {
            MediaKind::Audio => self.audio.as_ref().map(|s| s.queue()),
            MediaKind::Video => self.video.as_ref().map(|s| s.queue()),
        };
        queue.map_or(0, |q| q.cache_len() + q.release_len())
    }
}
