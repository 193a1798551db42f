//! Scheduling thread
//!
//! One loop moves packets from the source into the decoders and decoded
//! frames into the sinks. Each iteration runs under the control mutex
//! and releases it before delivering events and sleeping, so commands
//! are never blocked for longer than one iteration.

use crate::decoder::{DecodeOutput, InputStatus, MediaKind};
use crate::player::control::ControlCore;
use crate::player::events::PlayerEvent;
use crate::player::session::{EosFlags, Session};
use crate::player::trick_play::{self, TrickRead};
use crate::player::state_machine::Message;
use crate::sink::{RenderStatus, SinkEvent};
use crate::source::{CacheStatus, FramePacket, SeekMode};
use crate::utils::config::SchedulerConfig;
use crate::utils::error::{PlayerError, Result};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// Error reported for a failure on one channel's decode path
fn channel_error(kind: MediaKind, err: PlayerError) -> PlayerError {
    match (kind, err) {
        (_, err @ (PlayerError::Demux(_) | PlayerError::NullPointer(_))) => err,
        (MediaKind::Audio, err) => PlayerError::AudioPlay(err.to_string()),
        (MediaKind::Video, err) => PlayerError::VideoPlay(err.to_string()),
    }
}

/// Scheduling thread body; returns once the session's exit flag is set
pub(crate) fn run(core: Arc<ControlCore>) {
    info!("scheduling thread started");
    let backoff = core.config.scheduler.clone();

    loop {
        let mut outbox = Vec::new();
        let mut session = core.session.lock();
        if session.exit {
            break;
        }

        service_seeks(&mut session, &mut outbox);

        if session.paused {
            let mut wait = backoff.pause_wait_ms;
            if session.seeks.awaiting_report() {
                wait = wait.max(backoff.seek_settle_ms);
            }
            core.wake.wait_for(&mut session, ms(wait));
            drop(session);
            core.deliver(outbox);
            continue;
        }

        session.sleep = Duration::ZERO;
        if !session.failed {
            if let Err(e) = read_and_dispatch(&mut session, &backoff) {
                core.fail(&mut session, e, &mut outbox);
            }
            for kind in [MediaKind::Audio, MediaKind::Video] {
                if let Err(e) = render_channel(&mut session, kind, &backoff) {
                    core.fail(&mut session, channel_error(kind, e), &mut outbox);
                }
            }
        }

        process_sink_events(&core, &mut session, &mut outbox);
        if session.seeks.awaiting_report() {
            session.back_off(ms(backoff.seek_settle_ms));
        } else {
            report_position(&mut session, &mut outbox);
        }

        if session.is_play_end()
            && !session.failed
            && session.sinks.is_some()
            && !session.seeks.awaiting_report()
        {
            if !session.eos.play_end_reported {
                report_play_end(&mut session, &mut outbox);
            }
            session.back_off(ms(backoff.eos_backoff_ms));
        }
        if session.failed {
            session.back_off(ms(backoff.eos_backoff_ms));
        }

        let sleep = session.sleep;
        drop(session);
        core.deliver(outbox);

        if !sleep.is_zero() {
            let mut session = core.session.lock();
            if !session.exit && !session.seeks.has_pending() {
                core.wake.wait_for(&mut session, sleep);
            }
        }
    }

    info!("scheduling thread exiting");
}

/// Report a serviced seek nobody superseded, or service the pending one
///
/// The report waits for a later iteration, so a seek requested during
/// the unlocked window in between replaces the serviced one silently.
fn service_seeks(session: &mut Session, outbox: &mut Vec<PlayerEvent>) {
    if let Some(landed) = session.seeks.take_report() {
        session.progress.mark(landed, Instant::now());
        outbox.push(PlayerEvent::Progress(landed));
        outbox.push(PlayerEvent::SeekEnd(landed));
        info!("seek to {}ms done", landed);
        return;
    }

    let Some(target) = session.seeks.begin() else {
        return;
    };
    let landed = match seek_to(session, target) {
        Ok(landed) => landed,
        Err(e) => {
            warn!("seek to {}ms failed: {}", target, e);
            session.relative(session.current_position)
        }
    };
    session.seeks.finish(landed);
    session.progress.mark(landed, Instant::now());
    session.eos = EosFlags::default();
}

/// Reposition the whole pipeline; returns the position to report
fn seek_to(session: &mut Session, target: i64) -> Result<i64> {
    session.reset_pipeline()?;

    let track = session
        .info
        .selected_video()
        .map(|v| v.track_id)
        .or_else(|| session.info.selected_audio().map(|a| a.track_id));
    let absolute = target + session.info.start_time_ms;

    let mut landed = target;
    if let Some(track) = track {
        if let Err(e) = session.source_mut()?.seek(track, absolute, SeekMode::PrecedingKey) {
            warn!("source seek to {}ms failed: {}", absolute, e);
            landed = session.relative(session.current_position);
        }
    }
    let landed_absolute = landed + session.info.start_time_ms;
    session.current_position = landed_absolute;

    if session.trick.is_active() {
        session.trick.restart_from(landed_absolute);
    }
    Ok(landed)
}

/// Read at most one packet and offer the cached one to its decoder
fn read_and_dispatch(session: &mut Session, backoff: &SchedulerConfig) -> Result<()> {
    if session.eos.stream_read_end {
        return Ok(());
    }

    if session.trick.is_active() {
        if session.trick.continuous_loss {
            session.trick.continuous_loss = false;
            session.trick.stride_ms *= 2;
            let position = session.current_position;
            debug!("video decode too slow, stride now {}ms", session.trick.stride_ms);
            session.reset_pipeline()?;
            session.trick.restart_from(position);
        }
        match trick_play::read_packet(session)? {
            TrickRead::Ready => {}
            TrickRead::Skipped => return Ok(()),
            TrickRead::NoData => {
                session.back_off(ms(backoff.no_data_backoff_ms));
                return Ok(());
            }
        }
    } else if session.source_mut()?.fill_cache()? == CacheStatus::NoData {
        session.back_off(ms(backoff.no_data_backoff_ms));
        return Ok(());
    }

    dispatch_cached(session, backoff)
}

fn dispatch_cached(session: &mut Session, backoff: &SchedulerConfig) -> Result<()> {
    let (kind, end_of_stream) = match session.source_mut()?.cached() {
        Some(packet) => (packet.kind, packet.is_end_of_stream()),
        None => return Ok(()),
    };
    if end_of_stream {
        return dispatch_end_of_stream(session, backoff);
    }

    let trick = session.trick.is_active();
    if trick && kind == MediaKind::Audio {
        session.source_mut()?.clear_cache();
        return Ok(());
    }

    let Session {
        source,
        audio_decoder,
        video_decoder,
        ..
    } = &mut *session;
    let source = source.as_mut().ok_or(PlayerError::NullPointer("source"))?;
    let decoder = match kind {
        MediaKind::Audio => audio_decoder.as_mut(),
        MediaKind::Video => video_decoder.as_mut(),
    };
    let Some(decoder) = decoder else {
        warn!("dropping {:?} packet for an unselected track", kind);
        source.clear_cache();
        return Ok(());
    };
    let Some(packet) = source.cached() else {
        return Ok(());
    };
    let pts = packet.pts_ms;

    match decoder.queue_input(packet).map_err(|e| channel_error(kind, e))? {
        InputStatus::Accepted => {
            source.clear_cache();
            match kind {
                MediaKind::Audio => session.last_sent_audio_pts = pts,
                MediaKind::Video => {
                    session.last_sent_video_pts = pts;
                    if trick {
                        session.trick.last_sent_pts = pts;
                    }
                }
            }
        }
        InputStatus::Full => session.back_off(ms(backoff.queue_full_backoff_ms)),
    }
    Ok(())
}

/// Give every decoder its end-of-stream packet; the marker stays cached until all accept
fn dispatch_end_of_stream(session: &mut Session, backoff: &SchedulerConfig) -> Result<()> {
    for kind in [MediaKind::Audio, MediaKind::Video] {
        if session.eos.queued(kind) {
            continue;
        }
        let Some(decoder) = session.decoder_mut(kind) else {
            continue;
        };
        match decoder
            .queue_input(&FramePacket::end_of_stream(kind))
            .map_err(|e| channel_error(kind, e))?
        {
            InputStatus::Accepted => {
                debug!("{:?} decoder given end of stream", kind);
                session.eos.set_queued(kind);
            }
            InputStatus::Full => session.back_off(ms(backoff.queue_full_backoff_ms)),
        }
    }

    let done = [MediaKind::Audio, MediaKind::Video]
        .into_iter()
        .all(|kind| !session.has_decoder(kind) || session.eos.queued(kind));
    if done {
        session.eos.stream_read_end = true;
        session.source_mut()?.clear_cache();
    }
    Ok(())
}

/// Move one decoded frame into a sink, render, and recycle released frames
fn render_channel(session: &mut Session, kind: MediaKind, backoff: &SchedulerConfig) -> Result<()> {
    let stream_read_end = session.eos.stream_read_end;
    let Session {
        audio_decoder,
        video_decoder,
        sinks,
        ..
    } = &mut *session;
    let decoder = match kind {
        MediaKind::Audio => audio_decoder.as_mut(),
        MediaKind::Video => video_decoder.as_mut(),
    };
    let (Some(decoder), Some(sinks)) = (decoder, sinks.as_mut()) else {
        return Ok(());
    };

    let mut frame = None;
    match decoder.dequeue_output()? {
        DecodeOutput::Frame(buffer) => frame = Some(buffer),
        DecodeOutput::Pending => {}
        DecodeOutput::EndOfStream => {
            if kind == MediaKind::Video || stream_read_end {
                sinks.render_eos(kind)?;
            }
        }
    }

    let status = sinks.render_frame(kind, frame)?;
    while let Some(released) = sinks.dequeue_release(kind) {
        decoder.release_output(released)?;
    }

    match status {
        RenderStatus::RenderFull | RenderStatus::RenderDelay => {
            session.back_off(ms(backoff.render_full_backoff_ms))
        }
        RenderStatus::RenderEos => {
            info!("{:?} sink rendered end of stream", kind);
            session.eos.set_rendered(kind);
        }
        RenderStatus::Success | RenderStatus::QueueEmpty => {}
    }
    Ok(())
}

fn process_sink_events(core: &ControlCore, session: &mut Session, outbox: &mut Vec<PlayerEvent>) {
    let Some(sinks) = session.sinks.as_mut() else {
        return;
    };
    let events = sinks.take_events();
    let trick = session.trick.is_active();
    let pause_mode = session.settings.pause_after_first_frame;

    for event in events {
        match event {
            SinkEvent::FirstFrameRendered(kind) => {
                outbox.push(match kind {
                    MediaKind::Audio => PlayerEvent::FirstAudioFrame,
                    MediaKind::Video => PlayerEvent::FirstVideoFrame,
                });
                let pausing_channel = kind == MediaKind::Video || !session.has_decoder(MediaKind::Video);
                if pause_mode && pausing_channel && !session.paused {
                    info!("first frame rendered, pausing");
                    core.post(Message::Pause);
                }
            }
            SinkEvent::EndOfStream(MediaKind::Video) => {
                if !session.has_decoder(MediaKind::Audio) || trick {
                    if let Some(pts) = session.last_sent_video_pts {
                        let position = session.relative(pts);
                        session.progress.mark(position, Instant::now());
                        outbox.push(PlayerEvent::Progress(position));
                    }
                }
            }
            SinkEvent::EndOfStream(MediaKind::Audio) => {
                if trick {
                    debug!("audio end of stream ignored during trick-play");
                } else if let Some(pts) = session.last_sent_audio_pts {
                    let position = session.relative(pts);
                    session.progress.mark(position, Instant::now());
                    outbox.push(PlayerEvent::Progress(position));
                }
            }
            SinkEvent::ContinuousLoss(kind) => {
                if trick && kind == MediaKind::Video {
                    session.trick.continuous_loss = true;
                } else {
                    debug!("{:?} sink dropped a run of frames", kind);
                }
            }
            SinkEvent::RunningError(kind, message) => {
                let err = match kind {
                    MediaKind::Audio => PlayerError::AudioPlay(message),
                    MediaKind::Video => PlayerError::VideoPlay(message),
                };
                core.fail(session, err, outbox);
            }
        }
    }
}

/// Throttled progress from the master output position
fn report_position(session: &mut Session, outbox: &mut Vec<PlayerEvent>) {
    let Some(pts) = session.sinks.as_ref().and_then(|s| s.render_position()) else {
        return;
    };
    session.current_position = pts;
    let position = session.relative(pts);
    if session.progress.should_report(position, Instant::now()) {
        outbox.push(PlayerEvent::Progress(position));
    }
}

fn report_play_end(session: &mut Session, outbox: &mut Vec<PlayerEvent>) {
    session.eos.play_end_reported = true;
    if session.trick.is_backward() {
        info!("reached start of file");
        outbox.push(PlayerEvent::StartOfFile);
        return;
    }
    let duration = session.info.duration_ms;
    if duration > 0 {
        session.progress.mark(duration, Instant::now());
        outbox.push(PlayerEvent::Progress(duration));
    }
    info!("reached end of file");
    outbox.push(PlayerEvent::EndOfFile);
}
