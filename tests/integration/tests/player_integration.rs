//! Integration tests for the playctl player
//!
//! These tests drive a complete player over the synthetic backend:
//! - Lifecycle and command validity
//! - Play/pause/seek operations
//! - End-of-file and runtime error reporting
//! - Resource cleanup on stop

use anyhow::Result;
use playctl::audio::AudioStreamType;
use playctl::renderer::DisplayRegion;
use playctl::synthetic::{SyntheticBackend, SyntheticMedia};
use playctl::{Command, InvokeRequest, PlaybackError, PlayerError, PlayerEvent, PlayerState};
use playctl_integration_tests::{test_config, test_media, Harness};
use std::time::Duration;
use tokio::time::sleep;

fn is_illegal(result: playctl::Result<()>, command: Command, state: PlayerState) -> bool {
    matches!(
        result,
        Err(PlayerError::IllegalStateAction { command: c, state: s }) if c == command && s == state
    )
}

#[test]
fn test_playback_reaches_end_of_file_once() -> Result<()> {
    let mut h = Harness::playing(SyntheticMedia::with_duration(1_000))?;
    assert_eq!(h.player.state(), PlayerState::Playing);

    h.events.wait_for_event(PlayerEvent::EndOfFile)?;
    let seen = h.events.seen();
    assert_eq!(seen[seen.len() - 2], PlayerEvent::Progress(1_000));

    h.events.drain_for(Duration::from_millis(300));
    assert_eq!(h.events.count(|e| *e == PlayerEvent::EndOfFile), 1);
    assert_eq!(h.events.count(|e| *e == PlayerEvent::FirstVideoFrame), 1);
    assert_eq!(h.events.count(|e| *e == PlayerEvent::FirstAudioFrame), 1);
    assert!(h.events.progress().iter().all(|p| (0..=1_000).contains(p)));

    // end of file does not leave Playing
    assert_eq!(h.player.state(), PlayerState::Playing);
    h.player.stop()?;
    assert_eq!(h.player.state(), PlayerState::Idle);
    Ok(())
}

#[test]
fn test_state_events_follow_lifecycle() -> Result<()> {
    let mut h = Harness::playing(SyntheticMedia::with_duration(500))?;
    h.events.wait_for_state(PlayerState::Initialized)?;
    h.events.wait_for_state(PlayerState::Prepared)?;
    h.events.wait_for_state(PlayerState::Playing)?;
    h.player.stop()?;
    h.events.wait_for_state(PlayerState::Idle)?;
    Ok(())
}

#[test]
fn test_illegal_commands_keep_state() -> Result<()> {
    let h = Harness::new(SyntheticMedia::default())?;
    let player = &h.player;

    assert!(is_illegal(player.play(), Command::Play, PlayerState::Idle));
    assert!(is_illegal(player.pause(), Command::Pause, PlayerState::Idle));
    assert!(is_illegal(player.prepare(), Command::Prepare, PlayerState::Idle));
    assert!(matches!(
        player.file_info(),
        Err(PlayerError::IllegalStateAction { command: Command::GetInfo, .. })
    ));

    player.set_source(test_media())?;
    assert_eq!(player.state(), PlayerState::Initialized);
    assert!(is_illegal(
        player.set_source(test_media()),
        Command::SetSource,
        PlayerState::Initialized
    ));
    assert!(is_illegal(player.seek(0), Command::Seek, PlayerState::Initialized));

    player.prepare()?;
    // a second prepare is harmless
    player.prepare()?;
    assert_eq!(player.state(), PlayerState::Prepared);
    assert!(is_illegal(player.pause(), Command::Pause, PlayerState::Prepared));

    player.play()?;
    assert!(is_illegal(
        player.select_tracks(Some(0), Some(0)),
        Command::SetTrack,
        PlayerState::Playing
    ));
    assert_eq!(player.state(), PlayerState::Playing);
    Ok(())
}

#[test]
fn test_prepare_failure_stays_initialized() -> Result<()> {
    let media = SyntheticMedia {
        corrupt: true,
        ..SyntheticMedia::default()
    };
    let h = Harness::new(media)?;
    h.player.set_source(test_media())?;
    assert!(matches!(h.player.prepare(), Err(PlayerError::Demux(_))));
    assert_eq!(h.player.state(), PlayerState::Initialized);

    h.player.stop()?;
    assert_eq!(h.player.state(), PlayerState::Idle);
    Ok(())
}

#[test]
fn test_stop_releases_every_resource() -> Result<()> {
    let mut h = Harness::playing(SyntheticMedia::with_duration(2_000))?;
    h.events.wait_for_event(PlayerEvent::FirstVideoFrame)?;
    h.player.stop()?;

    let stats = h.stats.snapshot();
    assert_eq!(stats.decoders_started, 2);
    assert_eq!(stats.decoders_stopped, 2);
    assert_eq!(stats.buffers_outstanding_at_stop, 0);
    assert_eq!(stats.audio_devices_opened, stats.audio_devices_closed);
    assert_eq!(stats.video_devices_opened, stats.video_devices_closed);
    assert_eq!(stats.video_devices_opened, 1);

    // the player can run a fresh session afterwards
    h.player.set_source(test_media())?;
    h.player.prepare()?;
    h.player.play()?;
    h.events.wait_for_event(PlayerEvent::FirstVideoFrame)?;
    h.player.stop()?;

    let stats = h.stats.snapshot();
    assert_eq!(stats.sources_created, 2);
    assert_eq!(stats.decoders_stopped, 4);
    assert_eq!(stats.buffers_outstanding_at_stop, 0);
    Ok(())
}

#[test]
fn test_stop_after_end_of_file_returns_all_buffers() -> Result<()> {
    let mut h = Harness::playing(SyntheticMedia::with_duration(600))?;
    h.events.wait_for_event(PlayerEvent::EndOfFile)?;
    h.player.stop()?;

    let stats = h.stats.snapshot();
    assert_eq!(stats.decoders_started, stats.decoders_stopped);
    assert_eq!(stats.buffers_outstanding_at_stop, 0);
    assert!(stats.video_frames_rendered > 0);
    assert!(stats.audio_frames_written > 0);
    Ok(())
}

#[tokio::test]
async fn test_pause_holds_position() -> Result<()> {
    let mut h = Harness::playing(SyntheticMedia::with_duration(3_000))?;
    h.events.wait_for_event(PlayerEvent::FirstAudioFrame)?;
    sleep(Duration::from_millis(300)).await;

    h.player.pause()?;
    assert_eq!(h.player.state(), PlayerState::Paused);
    let paused_at = h.player.stream_info()?.position_ms;

    sleep(Duration::from_millis(300)).await;
    assert_eq!(h.player.stream_info()?.position_ms, paused_at);

    h.player.play()?;
    assert_eq!(h.player.state(), PlayerState::Playing);
    sleep(Duration::from_millis(300)).await;
    assert!(h.player.stream_info()?.position_ms > paused_at);
    Ok(())
}

#[test]
fn test_playback_speed_zero_and_one() -> Result<()> {
    let h = Harness::playing(SyntheticMedia::with_duration(2_000))?;
    h.player.set_playback_speed(0.0)?;
    assert_eq!(h.player.state(), PlayerState::Paused);
    h.player.set_playback_speed(1.0)?;
    assert_eq!(h.player.state(), PlayerState::Playing);
    Ok(())
}

#[test]
fn test_seek_reports_latest_target() -> Result<()> {
    let mut h = Harness::playing(SyntheticMedia::with_duration(5_000))?;
    h.events.wait_for_event(PlayerEvent::FirstVideoFrame)?;

    h.player.seek(1_000)?;
    h.player.seek(2_000)?;
    h.player.seek(3_000)?;
    h.events.wait_for_event(PlayerEvent::SeekEnd(3_000))?;

    let seen = h.events.seen();
    assert_eq!(seen[seen.len() - 2], PlayerEvent::Progress(3_000));

    h.events.drain_for(Duration::from_millis(300));
    assert_eq!(h.events.seek_ends(), vec![3_000]);
    assert!(h.player.stream_info()?.position_ms >= 2_900);
    Ok(())
}

#[test]
fn test_back_to_back_seeks_report_once() -> Result<()> {
    for paused in [false, true] {
        let mut h = Harness::playing(SyntheticMedia::with_duration(5_000))?;
        h.events.wait_for_event(PlayerEvent::FirstVideoFrame)?;
        if paused {
            h.player.pause()?;
        }

        h.player.seek(1_000)?;
        h.player.seek(2_000)?;
        h.events.wait_for_event(PlayerEvent::SeekEnd(2_000))?;
        h.events.drain_for(Duration::from_millis(200));
        assert_eq!(h.events.seek_ends(), vec![2_000], "paused: {}", paused);
    }
    Ok(())
}

#[test]
fn test_seek_after_previous_seek_ended_reports_both() -> Result<()> {
    let mut h = Harness::playing(SyntheticMedia::with_duration(5_000))?;
    h.events.wait_for_event(PlayerEvent::FirstVideoFrame)?;

    h.player.seek(1_000)?;
    h.events.wait_for_event(PlayerEvent::SeekEnd(1_000))?;
    h.player.seek(3_000)?;
    h.events.wait_for_event(PlayerEvent::SeekEnd(3_000))?;
    assert_eq!(h.events.seek_ends(), vec![1_000, 3_000]);
    Ok(())
}

#[test]
fn test_seek_range_checked() -> Result<()> {
    let h = Harness::playing(SyntheticMedia::with_duration(2_000))?;
    assert!(matches!(h.player.seek(-1), Err(PlayerError::IllegalParam(_))));
    assert!(matches!(h.player.seek(2_001), Err(PlayerError::IllegalParam(_))));
    h.player.seek(2_000)?;
    Ok(())
}

#[test]
fn test_seek_after_end_of_file_replays() -> Result<()> {
    let mut h = Harness::playing(SyntheticMedia::with_duration(600))?;
    h.events.wait_for_event(PlayerEvent::EndOfFile)?;

    h.player.seek(0)?;
    h.events.wait_for_event(PlayerEvent::SeekEnd(0))?;
    h.events.wait_for_event(PlayerEvent::EndOfFile)?;
    assert_eq!(h.events.count(|e| *e == PlayerEvent::EndOfFile), 2);
    Ok(())
}

#[test]
fn test_video_render_failure_enters_error() -> Result<()> {
    let backend =
        SyntheticBackend::new(SyntheticMedia::with_duration(2_000)).with_video_render_failure();
    let mut h = Harness::with_backend(backend, test_config())?;
    h.player.set_source(test_media())?;
    h.player.prepare()?;
    h.player.play()?;

    h.events
        .expect(|e| *e == PlayerEvent::Error(PlaybackError::VideoPlayFail))?;
    h.events.expect_state(PlayerState::Error)?;
    assert!(is_illegal(h.player.play(), Command::Play, PlayerState::Error));

    h.player.stop()?;
    assert_eq!(h.player.state(), PlayerState::Idle);
    let stats = h.stats.snapshot();
    assert_eq!(stats.decoders_started, stats.decoders_stopped);
    assert_eq!(stats.buffers_outstanding_at_stop, 0);
    assert_eq!(h.events.count(|e| matches!(e, PlayerEvent::Error(_))), 1);
    Ok(())
}

#[test]
fn test_read_failure_reports_demux_error() -> Result<()> {
    let media = SyntheticMedia {
        fail_read_at_ms: Some(400),
        ..SyntheticMedia::with_duration(2_000)
    };
    let mut h = Harness::playing(media)?;
    h.events
        .expect(|e| *e == PlayerEvent::Error(PlaybackError::DemuxFail))?;
    h.events.expect_state(PlayerState::Error)?;
    Ok(())
}

#[test]
fn test_zero_length_packet_is_demux_error() -> Result<()> {
    let media = SyntheticMedia {
        zero_length_at_ms: Some(200),
        ..SyntheticMedia::video_only(2_000)
    };
    let mut h = Harness::playing(media)?;
    h.events
        .wait_for_event(PlayerEvent::Error(PlaybackError::DemuxFail))?;
    Ok(())
}

#[test]
fn test_audio_only_plays_to_end() -> Result<()> {
    let mut h = Harness::playing(SyntheticMedia::audio_only(600))?;
    h.events.wait_for_event(PlayerEvent::EndOfFile)?;
    assert_eq!(h.events.count(|e| *e == PlayerEvent::FirstAudioFrame), 1);
    assert_eq!(h.events.count(|e| *e == PlayerEvent::FirstVideoFrame), 0);
    assert_eq!(h.stats.snapshot().video_devices_opened, 0);
    Ok(())
}

#[test]
fn test_video_only_plays_to_end() -> Result<()> {
    let mut h = Harness::playing(SyntheticMedia::video_only(600))?;
    h.events.wait_for_event(PlayerEvent::EndOfFile)?;
    assert_eq!(h.events.count(|e| *e == PlayerEvent::FirstAudioFrame), 0);
    assert!(h.stats.snapshot().last_video_pts > 0);
    Ok(())
}

#[test]
fn test_still_image_cannot_seek() -> Result<()> {
    let mut h = Harness::playing(SyntheticMedia::still_image())?;
    assert!(matches!(h.player.seek(0), Err(PlayerError::NotSupported(_))));
    h.events.wait_for_event(PlayerEvent::FirstVideoFrame)?;
    Ok(())
}

#[test]
fn test_pause_after_first_frame() -> Result<()> {
    let mut h = Harness::new(SyntheticMedia::with_duration(800))?;
    h.player.invoke(InvokeRequest::EnablePauseAfterPlay(true))?;
    h.player.set_source(test_media())?;
    h.player.prepare()?;
    h.player.play()?;

    h.events.expect_state(PlayerState::Paused)?;
    h.events.expect(|e| *e == PlayerEvent::FirstVideoFrame)?;
    assert!(matches!(
        h.player.invoke(InvokeRequest::EnablePauseAfterPlay(false)),
        Err(PlayerError::IllegalStateAction {
            command: Command::Invoke,
            state: PlayerState::Paused
        })
    ));

    h.player.play()?;
    h.events.wait_for_event(PlayerEvent::EndOfFile)?;
    Ok(())
}

#[test]
fn test_settings_accepted_before_playback() -> Result<()> {
    let h = Harness::new(SyntheticMedia::with_duration(500))?;
    h.player.set_volume(0.5, 1.5)?;
    h.player.set_audio_stream_type(AudioStreamType::Alarm)?;
    assert!(matches!(
        h.player.set_display_region(DisplayRegion::default()),
        Err(PlayerError::IllegalParam(_))
    ));
    h.player.set_display_region(DisplayRegion {
        x: 0,
        y: 0,
        width: 640,
        height: 360,
        layer: 1,
    })?;
    assert_eq!(h.player.state(), PlayerState::Idle);

    h.player.set_source(test_media())?;
    h.player.prepare()?;
    h.player.play()?;
    h.player.set_volume(0.0, 0.0)?;
    Ok(())
}

#[test]
fn test_track_selection() -> Result<()> {
    let mut h = Harness::prepared(SyntheticMedia::with_duration(600))?;
    assert!(matches!(
        h.player.select_tracks(Some(3), None),
        Err(PlayerError::Demux(_))
    ));

    h.player.select_tracks(Some(0), None)?;
    let info = h.player.file_info()?;
    assert_eq!(info.video_index, Some(0));
    assert_eq!(info.audio_index, None);

    h.player.play()?;
    h.events.wait_for_event(PlayerEvent::EndOfFile)?;
    assert_eq!(h.events.count(|e| *e == PlayerEvent::FirstAudioFrame), 0);
    assert_eq!(h.stats.snapshot().decoders_created, 1);
    Ok(())
}

#[test]
fn test_stream_info_while_playing() -> Result<()> {
    let mut h = Harness::playing(SyntheticMedia::with_duration(2_000))?;
    h.events.wait_for_event(PlayerEvent::FirstVideoFrame)?;
    let info = h.player.stream_info()?;
    assert!(info.video_decoder_free.is_some());
    assert!(info.audio_decoder_free.is_some());
    assert!(info.video_queue.is_some());
    assert!(info.last_video_pts.is_some());
    Ok(())
}

#[test]
fn test_config_file_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("playctl").join("config.toml");
    let mut config = test_config();
    config.session.decoder_output_buffers = 6;
    config.save_to(&path)?;

    let loaded = playctl::Config::from_file(&path)?;
    assert_eq!(loaded.session.decoder_output_buffers, 6);
    assert_eq!(
        loaded.session.progress_interval_ms,
        config.session.progress_interval_ms
    );

    let backend = SyntheticBackend::new(SyntheticMedia::with_duration(500));
    let mut h = Harness::with_backend(backend, loaded)?;
    h.player.set_source(test_media())?;
    h.player.prepare()?;
    h.player.play()?;
    h.events.wait_for_event(PlayerEvent::EndOfFile)?;
    Ok(())
}

#[test]
fn test_invalid_config_rejected_at_build() {
    let mut config = test_config();
    config.sync.continuous_loss_cap = 0;
    let result = Harness::with_backend(SyntheticBackend::default(), config);
    assert!(result.is_err());
}
