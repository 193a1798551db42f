//! Trick-play integration tests
//!
//! Fast forward, rewind and the return to normal playback, driven over
//! the synthetic backend with key frames once per second.

use anyhow::Result;
use playctl::synthetic::SyntheticMedia;
use playctl::{Command, PlayerError, PlayerEvent, PlayerState, TrickPlayAttr};
use playctl_integration_tests::Harness;
use std::time::Duration;

#[test]
fn test_fast_forward_reaches_end_of_file() -> Result<()> {
    let mut h = Harness::playing(SyntheticMedia::video_only(4_000))?;
    h.events.wait_for_event(PlayerEvent::FirstVideoFrame)?;

    h.player.set_playback_speed(8.0)?;
    assert_eq!(h.player.state(), PlayerState::TrickPlaying);

    h.events.wait_for_event(PlayerEvent::EndOfFile)?;
    let seen = h.events.seen();
    assert_eq!(seen[seen.len() - 2], PlayerEvent::Progress(4_000));
    assert_eq!(h.events.count(|e| *e == PlayerEvent::StartOfFile), 0);
    Ok(())
}

#[test]
fn test_rewind_reaches_start_of_file() -> Result<()> {
    let mut h = Harness::playing(SyntheticMedia::video_only(4_000))?;
    h.events.wait_for_event(PlayerEvent::FirstVideoFrame)?;
    h.player.seek(3_000)?;
    h.events.wait_for_event(PlayerEvent::SeekEnd(3_000))?;

    h.player.trick_play(TrickPlayAttr::backward(4.0))?;
    h.events.wait_for_event(PlayerEvent::StartOfFile)?;
    assert_eq!(h.events.count(|e| *e == PlayerEvent::EndOfFile), 0);
    assert_eq!(h.player.state(), PlayerState::TrickPlaying);
    Ok(())
}

#[test]
fn test_double_speed_plays_every_frame() -> Result<()> {
    let mut h = Harness::playing(SyntheticMedia::with_duration(1_000))?;
    h.events.wait_for_event(PlayerEvent::FirstVideoFrame)?;
    h.player.set_playback_speed(2.0)?;
    h.events.wait_for_event(PlayerEvent::EndOfFile)?;
    Ok(())
}

#[test]
fn test_play_returns_to_normal_speed() -> Result<()> {
    let mut h = Harness::playing(SyntheticMedia::with_duration(4_000))?;
    h.events.wait_for_event(PlayerEvent::FirstVideoFrame)?;

    h.player.trick_play(TrickPlayAttr::forward(8.0))?;
    let flushes = h.stats.snapshot().decoder_flushes;
    // repeating the same request changes nothing
    h.player.trick_play(TrickPlayAttr::forward(8.0))?;
    assert_eq!(h.stats.snapshot().decoder_flushes, flushes);
    assert_eq!(h.player.state(), PlayerState::TrickPlaying);
    h.player.play()?;
    assert_eq!(h.player.state(), PlayerState::Playing);

    h.events.wait_for_event(PlayerEvent::EndOfFile)?;
    h.player.stop()?;
    let stats = h.stats.snapshot();
    assert_eq!(stats.decoders_started, stats.decoders_stopped);
    assert_eq!(stats.buffers_outstanding_at_stop, 0);
    Ok(())
}

#[test]
fn test_direction_change_after_play_restarts_pipeline() -> Result<()> {
    let mut h = Harness::playing(SyntheticMedia::with_duration(4_000))?;
    h.events.wait_for_event(PlayerEvent::FirstVideoFrame)?;

    h.player.trick_play(TrickPlayAttr::forward(2.0))?;
    h.events.drain_for(Duration::from_millis(200));
    h.player.play()?;
    assert_eq!(h.player.state(), PlayerState::Playing);
    let before = h.stats.snapshot().decoder_flushes;

    h.player.trick_play(TrickPlayAttr::backward(4.0))?;
    assert_eq!(h.player.state(), PlayerState::TrickPlaying);
    assert!(h.stats.snapshot().decoder_flushes > before);

    h.events.wait_for_event(PlayerEvent::StartOfFile)?;
    assert_eq!(h.events.count(|e| *e == PlayerEvent::EndOfFile), 0);
    Ok(())
}

#[test]
fn test_unsupported_speed_rejected() -> Result<()> {
    let h = Harness::playing(SyntheticMedia::with_duration(2_000))?;
    assert!(matches!(
        h.player.trick_play(TrickPlayAttr::forward(3.0)),
        Err(PlayerError::IllegalParam(_))
    ));
    assert!(matches!(
        h.player.set_playback_speed(-1.0),
        Err(PlayerError::IllegalParam(_))
    ));
    assert_eq!(h.player.state(), PlayerState::Playing);
    Ok(())
}

#[test]
fn test_trick_play_state_rules() -> Result<()> {
    let h = Harness::prepared(SyntheticMedia::with_duration(2_000))?;
    assert!(matches!(
        h.player.trick_play(TrickPlayAttr::forward(2.0)),
        Err(PlayerError::IllegalStateAction {
            command: Command::TrickPlay,
            state: PlayerState::Prepared
        })
    ));

    h.player.play()?;
    h.player.trick_play(TrickPlayAttr::forward(4.0))?;
    assert!(matches!(
        h.player.pause(),
        Err(PlayerError::IllegalStateAction {
            command: Command::Pause,
            state: PlayerState::TrickPlaying
        })
    ));
    // seeking is allowed while trick-playing
    h.player.seek(1_000)?;
    Ok(())
}

#[test]
fn test_trick_play_needs_video() -> Result<()> {
    let h = Harness::playing(SyntheticMedia::audio_only(2_000))?;
    assert!(matches!(
        h.player.set_playback_speed(4.0),
        Err(PlayerError::NotSupported(_))
    ));
    assert_eq!(h.player.state(), PlayerState::Playing);
    Ok(())
}
