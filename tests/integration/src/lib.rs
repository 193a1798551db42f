//! Integration test utilities for playctl
//!
//! This module provides common utilities for integration testing including:
//! - A player wired to the synthetic backend
//! - An event log that waits for listener notifications
//! - Configuration fixtures

use anyhow::{anyhow, Result};
use crossbeam_channel::Receiver;
use playctl::synthetic::{BackendStats, SyntheticBackend, SyntheticMedia};
use playctl::utils::config::MIN_PROGRESS_INTERVAL_MS;
use playctl::{ChannelListener, Config, MediaSource, Player, PlayerEvent, PlayerState};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound for anything a test waits on
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration tuned for short test clips
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.session.progress_interval_ms = MIN_PROGRESS_INTERVAL_MS;
    config.scheduler.eos_backoff_ms = 50;
    config.scheduler.seek_settle_ms = 100;
    config
}

/// Media URI understood by the synthetic source
pub fn test_media() -> MediaSource {
    MediaSource::Uri("synthetic://test-pattern".to_string())
}

/// Everything a listener has been told, in order
pub struct EventLog {
    rx: Receiver<PlayerEvent>,
    seen: Vec<PlayerEvent>,
}

impl EventLog {
    pub fn new(rx: Receiver<PlayerEvent>) -> Self {
        Self { rx, seen: Vec::new() }
    }

    /// Wait for the first new event matching `pred`
    pub fn wait_for<F>(&mut self, mut pred: F) -> Result<PlayerEvent>
    where
        F: FnMut(&PlayerEvent) -> bool,
    {
        let deadline = Instant::now() + EVENT_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = self
                .rx
                .recv_timeout(remaining)
                .map_err(|_| anyhow!("timed out; events so far: {:?}", self.seen))?;
            self.seen.push(event);
            if pred(&event) {
                return Ok(event);
            }
        }
    }

    /// Like `wait_for`, but satisfied by an event that already arrived
    ///
    /// Events from the state machine and from the scheduling thread are
    /// delivered on different threads, so their relative order is not fixed.
    pub fn expect<F>(&mut self, pred: F) -> Result<()>
    where
        F: Fn(&PlayerEvent) -> bool,
    {
        if self.seen.iter().any(|e| pred(e)) {
            return Ok(());
        }
        self.wait_for(pred).map(|_| ())
    }

    pub fn expect_state(&mut self, state: PlayerState) -> Result<()> {
        self.expect(move |e| *e == PlayerEvent::StateChanged(state))
    }

    pub fn wait_for_event(&mut self, expected: PlayerEvent) -> Result<()> {
        self.wait_for(|e| *e == expected).map(|_| ())
    }

    pub fn wait_for_state(&mut self, state: PlayerState) -> Result<()> {
        self.wait_for_event(PlayerEvent::StateChanged(state))
    }

    /// Collect whatever arrives within `window`
    pub fn drain_for(&mut self, window: Duration) {
        let deadline = Instant::now() + window;
        while let Ok(event) = self
            .rx
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
        {
            self.seen.push(event);
        }
    }

    pub fn seen(&self) -> &[PlayerEvent] {
        &self.seen
    }

    pub fn count<F>(&self, pred: F) -> usize
    where
        F: Fn(&PlayerEvent) -> bool,
    {
        self.seen.iter().filter(|e| pred(e)).count()
    }

    pub fn seek_ends(&self) -> Vec<i64> {
        self.seen
            .iter()
            .filter_map(|e| match e {
                PlayerEvent::SeekEnd(position) => Some(*position),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<i64> {
        self.seen
            .iter()
            .filter_map(|e| match e {
                PlayerEvent::Progress(position) => Some(*position),
                _ => None,
            })
            .collect()
    }
}

/// Test fixture: a player over synthetic media plus its event log
pub struct Harness {
    pub player: Player,
    pub events: EventLog,
    pub stats: Arc<BackendStats>,
}

impl Harness {
    pub fn new(media: SyntheticMedia) -> Result<Self> {
        Self::with_backend(SyntheticBackend::new(media), test_config())
    }

    pub fn with_backend(backend: SyntheticBackend, config: Config) -> Result<Self> {
        let stats = backend.stats();
        let (listener, rx) = ChannelListener::new();
        let player = Player::builder()
            .with_config(config)
            .with_backend(Arc::new(backend))
            .with_listener(Arc::new(listener))
            .build()?;
        Ok(Self {
            player,
            events: EventLog::new(rx),
            stats,
        })
    }

    /// Harness already in Prepared
    pub fn prepared(media: SyntheticMedia) -> Result<Self> {
        let harness = Self::new(media)?;
        harness.player.set_source(test_media())?;
        harness.player.prepare()?;
        Ok(harness)
    }

    /// Harness already in Playing
    pub fn playing(media: SyntheticMedia) -> Result<Self> {
        let harness = Self::prepared(media)?;
        harness.player.play()?;
        Ok(harness)
    }
}
