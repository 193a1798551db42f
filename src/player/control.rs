//! Command handlers
//!
//! `ControlCore` runs every validated command against the session. It
//! builds the decode/render pipeline on the first Play, owns the
//! scheduling thread and tears everything down on Stop.

use crate::audio::{AudioSink, AudioSinkAttr, AudioStreamType, VolumeAttr};
use crate::decoder::{Decoder, DecoderAttr, MediaKind};
use crate::player::events::{PlayerEvent, PlayerListener};
use crate::player::scheduler;
use crate::player::session::{EosFlags, Session, Settings};
use crate::player::state::{Command, PlayerState};
use crate::player::state_machine::{CommandHandler, Envelope, Message, Reply};
use crate::player::trick_play::{TrickMode, TrickPlayAttr, TrickPlayDirection, TrickPlayState};
use crate::player::{Backend, InvokeRequest, StreamInfo};
use crate::renderer::{DisplayRegion, VideoSink, VideoSinkAttr};
use crate::sink::{RenderMode, SinkManager};
use crate::source::{MediaSource, SeekMode, SourceAdapter};
use crate::utils::config::Config;
use crate::utils::error::{PlaybackError, PlayerError, Result};
use crossbeam_channel::Sender;
use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

pub(crate) struct ControlCore {
    me: Weak<ControlCore>,
    pub(crate) config: Config,
    backend: Arc<dyn Backend>,
    listeners: Vec<Arc<dyn PlayerListener>>,
    pub(crate) session: Mutex<Session>,
    /// Wakes the scheduling thread early
    pub(crate) wake: Condvar,
    scheduler: Mutex<Option<JoinHandle<()>>>,
    machine_tx: Sender<Envelope>,
}

impl ControlCore {
    pub fn new(
        config: Config,
        backend: Arc<dyn Backend>,
        listeners: Vec<Arc<dyn PlayerListener>>,
        machine_tx: Sender<Envelope>,
    ) -> Arc<Self> {
        let settings = Settings {
            pause_after_first_frame: config.session.pause_after_first_frame,
            ..Settings::default()
        };
        let session = Session::new(settings, config.session.progress_interval_ms);

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            config,
            backend,
            listeners,
            session: Mutex::new(session),
            wake: Condvar::new(),
            scheduler: Mutex::new(None),
            machine_tx,
        })
    }

    /// Deliver events to every listener; never call with the session locked
    pub(crate) fn deliver(&self, events: Vec<PlayerEvent>) {
        for event in events {
            for listener in &self.listeners {
                event.dispatch(listener.as_ref());
            }
        }
    }

    /// Queue a message for the state machine without waiting for it
    pub(crate) fn post(&self, message: Message) {
        if self
            .machine_tx
            .send(Envelope {
                message,
                reply: None,
            })
            .is_err()
        {
            debug!("state machine gone, internal message dropped");
        }
    }

    /// Record a runtime fault once and move the player to Error
    pub(crate) fn fail(&self, session: &mut Session, err: PlayerError, outbox: &mut Vec<PlayerEvent>) {
        if session.failed {
            return;
        }
        session.failed = true;
        let code = err.playback_code();
        error!("playback failed: {}", err);
        outbox.push(PlayerEvent::Error(code));
        self.post(Message::Error(code));
    }

    fn set_source(&self, media: MediaSource) -> Result<Reply> {
        let mut session = self.session.lock();
        info!("media source set: {:?}", media);
        session.media = Some(media);
        Ok(Reply::Done)
    }

    fn prepare(&self, state: PlayerState) -> Result<Reply> {
        if state == PlayerState::Prepared {
            debug!("already prepared");
            return Ok(Reply::Done);
        }

        let mut session = self.session.lock();
        let media = session
            .media
            .clone()
            .ok_or(PlayerError::NullPointer("media source"))?;

        let mut source = SourceAdapter::new(self.backend.create_source()?);
        source.set_source(&media)?;
        let info = source.prepare()?;
        info!(
            "prepared {}: {}ms, video {:?}, audio {:?}",
            info.format_name, info.duration_ms, info.video_index, info.audio_index
        );

        session.info = info;
        session.source = Some(source);
        Ok(Reply::Done)
    }

    fn play(&self, state: PlayerState) -> Result<Reply> {
        match state {
            PlayerState::Prepared => self.start_playback()?,
            PlayerState::Paused => self.resume()?,
            PlayerState::TrickPlaying => self.leave_trick_play()?,
            _ => debug!("already playing"),
        }
        Ok(Reply::Done)
    }

    fn create_decoder(&self, attr: DecoderAttr) -> Result<Box<dyn Decoder>> {
        let mut decoder = self.backend.create_decoder(&attr)?;
        decoder.start()?;
        info!("{:?} decoder started: {}", attr.kind, attr.mime);
        Ok(decoder)
    }

    /// Build decoders and sinks and launch the scheduling thread
    fn start_playback(&self) -> Result<()> {
        let mut session = self.session.lock();
        let result = self.build_pipeline(&mut session);
        if let Err(e) = result {
            warn!("pipeline setup failed: {}", e);
            teardown_pipeline(&mut session);
            return Err(e);
        }
        session.paused = false;
        session.exit = false;
        session.failed = false;
        drop(session);

        self.spawn_scheduler()
    }

    fn build_pipeline(&self, session: &mut Session) -> Result<()> {
        let info = session.info.clone();
        let cfg = &self.config.session;

        if let Some(video) = info.selected_video() {
            let attr = DecoderAttr {
                kind: MediaKind::Video,
                codec: video.codec,
                mime: video.codec.mime(),
                width: if video.width > 0 { video.width } else { cfg.default_width },
                height: if video.height > 0 { video.height } else { cfg.default_height },
                sample_rate: 0,
                channels: 0,
                input_buffer_size: cfg.video_es_buffer_size,
                output_buffers: cfg.decoder_output_buffers,
            };
            session.video_decoder = Some(self.create_decoder(attr)?);
        }

        if let Some(audio) = info.selected_audio() {
            if audio.codec.audio_decoder_name().is_none() {
                return Err(PlayerError::not_supported(format!(
                    "no audio decoder for {:?}",
                    audio.codec
                )));
            }
            let attr = DecoderAttr {
                kind: MediaKind::Audio,
                codec: audio.codec,
                mime: audio.codec.mime(),
                width: 0,
                height: 0,
                sample_rate: audio.sample_rate,
                channels: audio.channels,
                input_buffer_size: cfg.audio_es_buffer_size,
                output_buffers: cfg.decoder_output_buffers,
            };
            session.audio_decoder = Some(self.create_decoder(attr)?);
        }

        let audio_sink = match info.selected_audio() {
            Some(audio) => Some(AudioSink::new(
                self.backend.create_audio_device()?,
                AudioSinkAttr {
                    sample_rate: audio.sample_rate,
                    channels: audio.channels,
                    stream_type: session.settings.stream_type,
                    volume: session.settings.volume,
                },
            )),
            None => None,
        };
        let video_sink = match info.selected_video() {
            Some(video) => Some(VideoSink::new(
                self.backend.create_video_device()?,
                VideoSinkAttr {
                    width: video.width,
                    height: video.height,
                    region: session.settings.display_region,
                },
            )),
            None => None,
        };

        let mut sinks = SinkManager::new(self.config.sync.clone(), audio_sink, video_sink);
        let opened = sinks.init();
        // keep the manager so teardown closes whatever did open
        session.sinks = Some(sinks);
        opened?;

        let pause_after_first_frame = session.settings.pause_after_first_frame;
        let sinks = session.sinks_mut()?;
        if pause_after_first_frame {
            sinks.set_render_mode(RenderMode::PauseAfterFirstFrame);
        }
        sinks.start()?;

        session.source_mut()?.start()?;
        session.trick = TrickPlayState::default();
        session.eos = EosFlags::default();
        info!("pipeline started");
        Ok(())
    }

    fn spawn_scheduler(&self) -> Result<()> {
        let core = self
            .me
            .upgrade()
            .ok_or(PlayerError::NullPointer("control core"))?;
        let handle = thread::Builder::new()
            .name("playctl-sched".to_string())
            .spawn(move || scheduler::run(core))?;
        *self.scheduler.lock() = Some(handle);
        Ok(())
    }

    fn pause(&self, state: PlayerState) -> Result<Reply> {
        if state == PlayerState::Paused {
            debug!("already paused");
            return Ok(Reply::Done);
        }
        let mut session = self.session.lock();
        session.sinks_mut()?.pause()?;
        session.paused = true;
        self.wake.notify_all();
        Ok(Reply::Done)
    }

    fn resume(&self) -> Result<()> {
        let mut session = self.session.lock();
        session.sinks_mut()?.resume()?;
        session.paused = false;
        self.wake.notify_all();
        Ok(())
    }

    /// Return from trick-play to 1x forward playback
    fn leave_trick_play(&self) -> Result<()> {
        let mut session = self.session.lock();
        if session.trick.mode != TrickMode::FullPlay {
            let resume_at = session.trick.last_read_pts;
            session.reset_pipeline()?;
            if let Some(track) = session.info.selected_video().map(|v| v.track_id) {
                if let Err(e) = session
                    .source_mut()?
                    .seek(track, resume_at, SeekMode::FollowingKey)
                {
                    warn!("resume seek to {}ms failed: {}", resume_at, e);
                }
            }
        }
        session.eos = EosFlags::default();
        session.trick = TrickPlayState::default();
        session.sinks_mut()?.set_speed(1.0, TrickPlayDirection::Forward);
        session.progress.reset();
        info!("trick-play ended");
        self.wake.notify_all();
        Ok(())
    }

    fn trick_play(&self, attr: TrickPlayAttr, state: PlayerState) -> Result<Reply> {
        attr.validate()?;
        let mut session = self.session.lock();
        if !session.info.has_video() || session.info.is_image() {
            return Err(PlayerError::not_supported("trick-play needs a video track"));
        }

        if state == PlayerState::TrickPlaying {
            if session.trick.attr == attr {
                debug!("trick-play {:?} already active", attr);
                return Ok(Reply::Done);
            }
            let at_start = session
                .sinks
                .as_ref()
                .and_then(|s| s.last_rendered_pts(MediaKind::Video))
                .map_or(false, |pts| pts <= session.info.start_time_ms);
            if session.trick.is_backward() && attr.direction == session.trick.attr.direction && at_start {
                debug!("already at the start of the file");
                return Ok(Reply::Done);
            }
        }

        let position = session.current_position;
        session.reset_pipeline()?;
        let mpegts = session.info.is_mpegts();
        let mode = attr.select_mode(&session.info);
        let trick = &mut session.trick;
        trick.attr = attr;
        trick.mode = mode;
        trick.stride_ms = attr.stride_ms(mpegts);
        trick.restart_from(position);
        session.sinks_mut()?.set_speed(attr.speed, attr.direction);
        session.progress.reset();

        info!(
            "trick-play {:?} {}x from {}ms, {:?}, stride {}ms",
            attr.direction, attr.speed, position, mode, session.trick.stride_ms
        );
        self.wake.notify_all();
        Ok(Reply::Done)
    }

    fn seek(&self, target_ms: i64) -> Result<Reply> {
        let mut session = self.session.lock();
        if session.info.is_image() {
            return Err(PlayerError::not_supported("seek on a still image"));
        }
        let duration = session.info.duration_ms;
        if target_ms < 0 || (duration > 0 && target_ms > duration) {
            return Err(PlayerError::illegal_param(format!(
                "seek target {}ms outside 0..={}ms",
                target_ms, duration
            )));
        }
        debug!("seek to {}ms requested", target_ms);
        session.seeks.request(target_ms);
        self.wake.notify_all();
        Ok(Reply::Done)
    }

    /// Tear the pipeline down and return to a fresh session
    fn stop(&self, state: PlayerState) -> Result<Reply> {
        if state == PlayerState::Idle {
            return Ok(Reply::Done);
        }

        {
            let mut session = self.session.lock();
            session.exit = true;
            self.wake.notify_all();
        }
        if let Some(handle) = self.scheduler.lock().take() {
            if handle.join().is_err() {
                warn!("scheduling thread panicked");
            }
        }

        let mut session = self.session.lock();
        teardown_pipeline(&mut session);
        if let Some(source) = session.source.as_mut() {
            if let Err(e) = source.stop() {
                warn!("source stop failed: {}", e);
            }
        }
        session.reset(self.config.session.progress_interval_ms);
        info!("session stopped");
        Ok(Reply::Done)
    }

    fn file_info(&self) -> Result<Reply> {
        Ok(Reply::FileInfo(self.session.lock().info.clone()))
    }

    fn stream_info(&self) -> Result<Reply> {
        let session = self.session.lock();
        let sinks = session.sinks.as_ref();
        let last = |kind: MediaKind| sinks.and_then(|s| s.last_rendered_pts(kind));
        let held = |kind: MediaKind| sinks.map_or(0, |s| s.frames_held(kind));

        Ok(Reply::StreamInfo(StreamInfo {
            position_ms: session.relative(session.current_position),
            last_audio_pts: last(MediaKind::Audio),
            last_video_pts: last(MediaKind::Video),
            audio_frames_held: held(MediaKind::Audio),
            video_frames_held: held(MediaKind::Video),
            audio_decoder_free: session.audio_decoder.as_ref().map(|d| d.free_output_buffers()),
            video_decoder_free: session.video_decoder.as_ref().map(|d| d.free_output_buffers()),
            audio_queue: sinks.and_then(|s| s.queue_stats(MediaKind::Audio)),
            video_queue: sinks.and_then(|s| s.queue_stats(MediaKind::Video)),
            sync: sinks.map(|s| s.sync_stats()).unwrap_or_default(),
        }))
    }

    fn set_track(&self, video: Option<usize>, audio: Option<usize>) -> Result<Reply> {
        let mut session = self.session.lock();
        let info = session.source_mut()?.select_track(video, audio)?;
        info!("tracks selected: video {:?}, audio {:?}", info.video_index, info.audio_index);
        session.info = info;
        Ok(Reply::Done)
    }

    fn set_volume(&self, volume: VolumeAttr) -> Result<Reply> {
        let mut session = self.session.lock();
        session.settings.volume = Some(volume);
        if let Some(sinks) = session.sinks.as_mut() {
            sinks.set_volume(volume)?;
        }
        debug!("volume {}/{}", volume.left, volume.right);
        Ok(Reply::Done)
    }

    fn set_audio_stream_type(&self, stream_type: AudioStreamType) -> Result<Reply> {
        let mut session = self.session.lock();
        session.settings.stream_type = stream_type;
        if let Some(sinks) = session.sinks.as_mut() {
            sinks.set_audio_stream_type(stream_type)?;
        }
        Ok(Reply::Done)
    }

    fn set_display_region(&self, region: DisplayRegion) -> Result<Reply> {
        if region.width == 0 || region.height == 0 {
            return Err(PlayerError::illegal_param("display region must be non-empty"));
        }
        let mut session = self.session.lock();
        session.settings.display_region = Some(region);
        if let Some(sinks) = session.sinks.as_mut() {
            sinks.set_display_region(region)?;
        }
        Ok(Reply::Done)
    }

    fn invoke(&self, request: InvokeRequest, state: PlayerState) -> Result<Reply> {
        match request {
            InvokeRequest::EnablePauseAfterPlay(enable) => {
                if !matches!(state, PlayerState::Idle | PlayerState::Initialized) {
                    return Err(PlayerError::IllegalStateAction {
                        command: Command::Invoke,
                        state,
                    });
                }
                self.session.lock().settings.pause_after_first_frame = enable;
                info!("pause after first frame: {}", enable);
            }
        }
        Ok(Reply::Done)
    }

    fn on_error(&self, code: PlaybackError) -> Result<Reply> {
        let mut session = self.session.lock();
        // the scheduling thread keeps running so Stop can join it
        session.failed = true;
        warn!("entering error state: {:?}", code);
        Ok(Reply::Done)
    }
}

/// Stop sinks and decoders, returning every frame to its decoder first
fn teardown_pipeline(session: &mut Session) {
    if let Some(sinks) = session.sinks.as_mut() {
        if let Err(e) = sinks.stop() {
            warn!("sink stop failed: {}", e);
        }
    }
    if let Err(e) = session.return_released_frames() {
        warn!("returning frames to decoders failed: {}", e);
    }
    for mut decoder in [session.audio_decoder.take(), session.video_decoder.take()]
        .into_iter()
        .flatten()
    {
        if let Err(e) = decoder.stop() {
            warn!("{:?} decoder stop failed: {}", decoder.kind(), e);
        }
    }
    if let Some(mut sinks) = session.sinks.take() {
        if let Err(e) = sinks.deinit() {
            warn!("sink close failed: {}", e);
        }
    }
}

impl CommandHandler for ControlCore {
    fn handle(&self, message: Message, state: PlayerState) -> Result<Reply> {
        match message {
            Message::SetSource(media) => self.set_source(media),
            Message::Prepare => self.prepare(state),
            Message::Play => self.play(state),
            Message::Pause => self.pause(state),
            Message::TrickPlay(attr) => self.trick_play(attr, state),
            Message::Stop => self.stop(state),
            Message::Seek(target) => self.seek(target),
            Message::GetFileInfo => self.file_info(),
            Message::GetStreamInfo => self.stream_info(),
            Message::SetTrack { video, audio } => self.set_track(video, audio),
            Message::SetVolume(volume) => self.set_volume(volume),
            Message::SetAudioStreamType(stream_type) => self.set_audio_stream_type(stream_type),
            Message::SetDisplayRegion(region) => self.set_display_region(region),
            Message::Invoke(request) => self.invoke(request, state),
            Message::Error(code) => self.on_error(code),
            Message::Shutdown => Ok(Reply::Done),
        }
    }

    fn on_transition(&self, _from: PlayerState, to: PlayerState) {
        self.deliver(vec![PlayerEvent::StateChanged(to)]);
    }
}
