//! Listener contract tests with a mocked `PlayerListener`

use anyhow::Result;
use mockall::predicate::eq;
use mockall::{mock, Sequence};
use playctl::synthetic::{SyntheticBackend, SyntheticMedia};
use playctl::{Player, PlayerListener, PlayerState};
use playctl_integration_tests::{test_config, test_media};
use std::sync::Arc;

mock! {
    pub Listener {}

    impl PlayerListener for Listener {
        fn on_state_changed(&self, state: PlayerState);
        fn on_end_of_file(&self);
    }
}

fn player_with(listener: MockListener) -> Result<Player> {
    let player = Player::builder()
        .with_config(test_config())
        .with_backend(Arc::new(SyntheticBackend::new(SyntheticMedia::default())))
        .with_listener(Arc::new(listener))
        .build()?;
    Ok(player)
}

#[test]
fn test_state_changes_reported_in_order() -> Result<()> {
    let mut listener = MockListener::new();
    let mut seq = Sequence::new();
    for state in [PlayerState::Initialized, PlayerState::Prepared, PlayerState::Idle] {
        listener
            .expect_on_state_changed()
            .with(eq(state))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
    }
    listener.expect_on_end_of_file().never();

    let player = player_with(listener)?;
    player.set_source(test_media())?;
    player.prepare()?;
    player.stop()?;
    Ok(())
}

#[test]
fn test_rejected_commands_are_silent() -> Result<()> {
    let mut listener = MockListener::new();
    listener.expect_on_state_changed().never();

    let player = player_with(listener)?;
    assert!(player.play().is_err());
    assert!(player.seek(100).is_err());
    // stop in Idle is accepted but changes nothing
    player.stop()?;
    assert_eq!(player.state(), PlayerState::Idle);
    Ok(())
}
