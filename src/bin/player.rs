//! Music Player Application
//!
//! Streams a music file to the default (or configured) output device.
//!
//! ```text
//! player <file> [--once]      stream a WAV/OGG file, looping unless --once
//! player --sound <file>       load a short file fully and play it once
//! player --list-devices [--json]
//! ```

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use music_streamer::{
    audio::{device::list_output_devices, CpalBackend, MusicStream, Sound},
    config::AppConfig,
};

enum Command {
    Stream { path: PathBuf, looping: Option<bool> },
    Sound { path: PathBuf },
    ListDevices { json: bool },
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let has = |flag: &str| args.iter().any(|a| a == flag);
    let file = args.iter().find(|a| !a.starts_with("--")).map(PathBuf::from);

    if has("--list-devices") {
        return Ok(Command::ListDevices { json: has("--json") });
    }
    let Some(path) = file else {
        bail!(
            "usage: player <file> [--once] | player --sound <file> \
             | player --list-devices [--json]"
        );
    };
    if has("--sound") {
        return Ok(Command::Sound { path });
    }
    let looping = if has("--once") { Some(false) } else { None };
    Ok(Command::Stream { path, looping })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let command = parse_args()?;
    let config = AppConfig::load_or_default();

    match command {
        Command::ListDevices { json } => list_devices(json),
        Command::Sound { path } => play_sound(&config, path).await,
        Command::Stream { path, looping } => {
            let looping = looping.unwrap_or(config.stream.loop_by_default);
            play_stream(&config, path, looping).await
        }
    }
}

fn list_devices(json: bool) -> Result<()> {
    let devices = list_output_devices();
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    println!("\n=== Available Output Devices ===");
    for device in &devices {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}:", device.name, default_marker);
        println!("    ID: {}", device.id);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
    Ok(())
}

async fn play_sound(config: &AppConfig, path: PathBuf) -> Result<()> {
    let backend = open_output(config)?;
    let sound = Sound::load(backend.clone(), &path)
        .with_context(|| format!("Failed to load sound {}", path.display()))?;

    tracing::info!("Playing {} ({:.2} s)", path.display(), sound.duration_secs());
    sound.play();
    while sound.is_playing() {
        if let Some(e) = backend.check_errors() {
            tracing::error!("Output error: {}", e);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}

fn open_output(config: &AppConfig) -> Result<Arc<CpalBackend>> {
    let backend = CpalBackend::open(&config.audio).context("Failed to open audio output")?;
    Ok(Arc::new(backend))
}

async fn play_stream(config: &AppConfig, path: PathBuf, looping: bool) -> Result<()> {
    let backend = open_output(config)?;
    tracing::info!(
        "Output device: {} ({} Hz, {} channels)",
        backend.device_name(),
        backend.sample_rate(),
        backend.channels()
    );

    let mut music = MusicStream::new(backend.clone(), config.stream.clone());
    music
        .try_start_stream(&path, looping)
        .with_context(|| format!("Failed to start streaming {}", path.display()))?;

    let mut ticker = tokio::time::interval(Duration::from_millis(config.stream.tick_interval_ms));
    let mut status = tokio::time::interval(Duration::from_secs(1));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                music.tick();
                if !music.is_playing() {
                    tracing::info!("Playback finished");
                    break;
                }
                if let Some(e) = backend.check_errors() {
                    tracing::error!("Output error: {}", e);
                    break;
                }
            }
            _ = status.tick() => {
                let stats = music.stats();
                println!(
                    "[{:6.1} / {:6.1} s] loops: {} refills: {} underruns: {} upload errors: {}",
                    music.elapsed_seconds(),
                    music.total_seconds(),
                    stats.loops_completed,
                    stats.buffers_refilled,
                    stats.underruns_recovered,
                    stats.upload_errors
                );
            }
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, stopping");
                break;
            }
        }
    }

    music.stop_stream();
    Ok(())
}
