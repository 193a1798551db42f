use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::Receiver;
use env_logger::Env;
use log::{debug, error, info};
use std::path::PathBuf;
use std::sync::Arc;

use playctl::synthetic::{SyntheticBackend, SyntheticMedia};
use playctl::utils::{self, format_position_ms};
use playctl::{ChannelListener, Config, MediaSource, PlaybackError, Player, PlayerEvent};

/// playctl - drive the player control engine over a synthetic test pattern
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Length of the test pattern
    #[arg(long, value_name = "MS", default_value = "3000")]
    duration_ms: i64,

    /// Playback speed; negative plays backward, 0 pauses
    #[arg(long, default_value = "1.0", allow_hyphen_values = true)]
    speed: f32,

    /// Seek here right after playback starts
    #[arg(long, value_name = "MS")]
    seek: Option<i64>,

    /// Drop the audio track
    #[arg(long)]
    no_audio: bool,

    /// Drop the video track
    #[arg(long)]
    no_video: bool,

    /// Hold on the first rendered frame
    #[arg(long)]
    pause_after_first_frame: bool,

    /// Configuration file (defaults to the user configuration)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Write the effective configuration to the user configuration file and exit
    #[arg(long)]
    save_config: bool,

    /// Print the media description and exit
    #[arg(long)]
    dump_info: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("Starting playctl v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {:?}", path))?,
        None => utils::load_config()?,
    };
    config.session.pause_after_first_frame |= args.pause_after_first_frame;

    if args.print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    if args.save_config {
        config.save()?;
        info!("Configuration saved to {:?}", Config::user_config_path());
        return Ok(());
    }

    let backend = SyntheticBackend::new(SyntheticMedia::with_duration(args.duration_ms));
    let stats = backend.stats();
    let (listener, events) = ChannelListener::new();
    let player = Player::builder()
        .with_config(config)
        .with_backend(Arc::new(backend))
        .with_listener(Arc::new(listener))
        .build()?;

    player.set_source(MediaSource::Uri("synthetic://pattern".to_string()))?;
    player.prepare()?;
    let media = player.file_info()?;

    if args.dump_info {
        println!("{}", serde_json::to_string_pretty(&media)?);
        return Ok(());
    }

    if args.no_audio || args.no_video {
        let video = if args.no_video { None } else { media.video_index };
        let audio = if args.no_audio { None } else { media.audio_index };
        player.select_tracks(video, audio)?;
    }

    player.play()?;
    if args.speed != 1.0 {
        player.set_playback_speed(args.speed)?;
    }
    if let Some(position) = args.seek {
        player.seek(position)?;
    }

    let watcher = tokio::task::spawn_blocking(move || wait_for_end(events));
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        outcome = watcher => match outcome? {
            Some(code) => error!("Playback failed: {:?}", code),
            None => info!("Playback finished"),
        },
    }

    // not available once the session has failed
    if let Ok(stream) = player.stream_info() {
        info!("Stopped at {}", format_position_ms(stream.position_ms));
    }
    player.stop()?;
    drop(player);

    println!("{}", serde_json::to_string_pretty(&stats.snapshot())?);
    Ok(())
}

/// Log events until playback ends; returns the error that ended it, if any
fn wait_for_end(events: Receiver<PlayerEvent>) -> Option<PlaybackError> {
    for event in events.iter() {
        match event {
            PlayerEvent::Progress(position) => debug!("Position: {}", format_position_ms(position)),
            PlayerEvent::StateChanged(state) => info!("State: {:?}", state),
            PlayerEvent::SeekEnd(position) => info!("Seek finished at {}", format_position_ms(position)),
            PlayerEvent::FirstVideoFrame => info!("First video frame"),
            PlayerEvent::FirstAudioFrame => info!("First audio frame"),
            PlayerEvent::EndOfFile => {
                info!("End of file");
                return None;
            }
            PlayerEvent::StartOfFile => {
                info!("Start of file");
                return None;
            }
            PlayerEvent::Error(code) => return Some(code),
        }
    }
    None
}
