//! Trackdeck - multi-track audio timeline player
//!
//! Entry point for the command-line front end.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use trackdeck_audio::{AudioEngine, CpalDevice};
use trackdeck_core::{EngineConfig, Timecode};
use trackdeck_media::{ffmpeg_available, AudioCodec, AudioDecoder, WavDecoder};
use trackdeck_timeline::{DocumentFile, Timeline};

const USAGE: &str = "usage:
  trackdeck info <document>
  trackdeck export <document> <output>
  trackdeck play <document> [start-seconds]";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = EngineConfig::load_or_default().context("Failed to load configuration")?;

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["info", doc] => info_command(Path::new(doc), config),
        ["export", doc, out] => export_command(Path::new(doc), PathBuf::from(out), config),
        ["play", doc] => play_command(Path::new(doc), 0.0, config),
        ["play", doc, start] => {
            let start: f64 = start
                .parse()
                .with_context(|| format!("Invalid start time '{}'", start))?;
            play_command(Path::new(doc), start, config)
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

/// Read a document and load it into `timeline`, warning about clips whose
/// sources could not be decoded.
fn load(path: &Path, timeline: &mut Timeline, decoder: &dyn AudioDecoder) -> Result<DocumentFile> {
    let document = DocumentFile::load_from_file(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    for error in timeline.load_document(&document, decoder) {
        warn!("Skipped clip: {}", error);
    }
    Ok(document)
}

fn info_command(path: &Path, config: EngineConfig) -> Result<()> {
    let mut timeline = Timeline::headless(config);
    let document = load(path, &mut timeline, &WavDecoder::new())?;

    println!("{} (format v{}, written by {})", path.display(), document.version, document.app_version);
    let content = timeline.duration() - timeline.config().trailing_margin;
    println!("length {}", content.hhmmssms());

    let any_solo = timeline.any_solo();
    for track in timeline.tracks() {
        let flags = match (track.solo, track.is_muted(any_solo)) {
            (true, _) => " [solo]",
            (false, true) => " [muted]",
            _ => "",
        };
        println!(
            "  {}{}  vol {:.2} pan {:+.2}",
            track.name, flags, track.volume, track.pan
        );
        for clip in track.clips() {
            println!(
                "    {}  {} - {}",
                clip.name,
                clip.start_time.mmssms(),
                clip.end_time().mmssms()
            );
        }
    }

    let missing = document.clip_count() - timeline.clips().count();
    if missing > 0 {
        println!("{} clip(s) could not be decoded", missing);
    }
    Ok(())
}

fn export_command(path: &Path, out: PathBuf, config: EngineConfig) -> Result<()> {
    let codec = AudioCodec::from_path(&out).unwrap_or_default();
    if codec != AudioCodec::Pcm && !ffmpeg_available() {
        bail!("Exporting {:?} requires ffmpeg on PATH", codec);
    }

    let mut timeline = Timeline::headless(config);
    load(path, &mut timeline, &WavDecoder::new())?;
    if timeline.is_empty() {
        bail!("Nothing to export: {} has no playable clips", path.display());
    }

    let settings = timeline.export_settings(&out, codec);
    info!("Exporting {} as {:?} to {}", path.display(), codec, out.display());

    let mut last_decile = 0;
    let frames = timeline.export(&settings, |progress| {
        let decile = (progress.fraction() * 10.0) as u32;
        if decile > last_decile {
            last_decile = decile;
            info!("Export {}%", decile * 10);
        }
    });

    match frames {
        Some(frames) => {
            println!(
                "Wrote {} ({} frames, {})",
                out.display(),
                frames,
                settings.render_format().frames_to_seconds(frames).hhmmssms()
            );
            Ok(())
        }
        None => match timeline.last_error() {
            Some(error) => bail!("{}", error),
            None => bail!("Export failed"),
        },
    }
}

fn play_command(path: &Path, start: f64, config: EngineConfig) -> Result<()> {
    let device = CpalDevice::open_default().context("No audio output available")?;
    let mut timeline = Timeline::new(AudioEngine::new(Box::new(device)), config);
    load(path, &mut timeline, &WavDecoder::new())?;

    let end = timeline.duration() - timeline.config().trailing_margin;
    timeline.seek(start);
    timeline.play();
    if let Some(error) = timeline.last_error() {
        bail!("{}", error);
    }

    let clock = timeline.clock();
    while timeline.is_playing() && clock.seconds() < end {
        std::thread::sleep(Duration::from_millis(250));
        eprint!("\r{} / {}", clock.seconds().mmssms(), end.mmssms());
    }
    eprintln!();
    timeline.stop();
    Ok(())
}
