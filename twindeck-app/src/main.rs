//! twindeck - two-deck audio player
//!
//! Reads commands from stdin, one per line, and plays through the default
//! output device.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing_subscriber::EnvFilter;

use twindeck_audio::{AudioEngine, DeckId, Renderer};
use twindeck_input::{Command, ParseError, HELP};
use twindeck_library::{Config, Playlist, TrackLoader};

/// End-of-track polling interval (~30 Hz)
const TICK_INTERVAL: Duration = Duration::from_millis(33);

/// Stereo scratch for devices that aren't two-channel (8192 frames)
const CONVERSION_BUFFER_LEN: usize = 16384;

fn main() -> anyhow::Result<()> {
    init_logging();

    let config = Config::load();
    let playlist_path = config.playlist_file();
    let playlist = match Playlist::load(&playlist_path) {
        Ok(playlist) => playlist,
        Err(e) => {
            tracing::warn!("Could not read playlist {}: {}", playlist_path.display(), e);
            Playlist::new()
        }
    };

    // Get audio host and device
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("No audio output device found")?;
    let stream_config = device
        .default_output_config()
        .context("Failed to get audio config")?;

    let sample_rate = stream_config.sample_rate().0;
    let channels = stream_config.channels() as usize;
    tracing::info!(
        "Output: {} ({} ch at {} Hz)",
        device.name().unwrap_or_else(|_| "unknown".into()),
        channels,
        sample_rate
    );

    let loader = TrackLoader::new();
    let engine = AudioEngine::new(sample_rate as f64, Arc::new(loader));
    engine.prepare(config.block_size);
    for deck in DeckId::ALL {
        if let Err(e) = engine.set_gain(deck, config.default_gain) {
            tracing::warn!("Deck {}: {}", deck, e);
        }
    }
    engine.set_looping(DeckId::A, config.loop_a);
    engine.set_looping(DeckId::B, config.loop_b);

    let stream = build_stream(&device, &stream_config.into(), channels, engine.renderer())?;
    stream.play().context("Failed to start audio")?;

    let commands = spawn_stdin_reader();
    let mut app = App {
        engine,
        loader,
        playlist,
        playlist_path,
    };

    println!("twindeck ready. Type 'help' for commands.");
    prompt();
    app.run(&commands);

    drop(stream);
    app.engine.release();
    tracing::info!("Shut down");

    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Build the output stream around the engine's renderer
fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    mut renderer: Renderer,
) -> anyhow::Result<cpal::Stream> {
    // Pre-allocate conversion buffer (avoid allocation in audio callback)
    let mut stereo_buffer = vec![0.0f32; CONVERSION_BUFFER_LEN];

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if channels == 2 {
                    renderer.render(data);
                    return;
                }
                if channels == 0 {
                    return;
                }

                let max_frames = stereo_buffer.len() / 2;
                for out in data.chunks_mut(max_frames * channels) {
                    let frames = out.len() / channels;
                    let stereo = &mut stereo_buffer[..frames * 2];
                    renderer.render(stereo);

                    for (frame, lr) in out.chunks_exact_mut(channels).zip(stereo.chunks_exact(2)) {
                        if channels == 1 {
                            // Fold to mono
                            frame[0] = (lr[0] + lr[1]) * 0.5;
                        } else {
                            // Left/right on the first pair, silence elsewhere
                            frame[0] = lr[0];
                            frame[1] = lr[1];
                            frame[2..].fill(0.0);
                        }
                    }
                }
            },
            |err| {
                tracing::error!("Audio stream error: {}", err);
            },
            None,
        )
        .context("Failed to create audio stream")?;

    Ok(stream)
}

/// Read stdin lines on a thread and forward parsed commands
fn spawn_stdin_reader() -> Receiver<Result<Command, ParseError>> {
    let (tx, rx) = crossbeam_channel::unbounded();

    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let parsed = twindeck_input::parse(&line);
            if matches!(parsed, Err(ParseError::Empty)) {
                prompt();
                continue;
            }
            if tx.send(parsed).is_err() {
                break;
            }
        }
        // Sender drops here; the control loop sees the disconnect and exits
    });

    rx
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

/// Control-side state: the engine handle plus the playlist
struct App {
    engine: AudioEngine,
    loader: TrackLoader,
    playlist: Playlist,
    playlist_path: PathBuf,
}

impl App {
    /// Apply commands until `quit` or end of input, polling decks between them
    fn run(&mut self, commands: &Receiver<Result<Command, ParseError>>) {
        let mut last_tick = Instant::now();

        loop {
            match commands.recv_timeout(TICK_INTERVAL) {
                Ok(Ok(cmd)) => {
                    if !self.handle_command(cmd) {
                        break;
                    }
                    prompt();
                }
                Ok(Err(e)) => {
                    println!("error: {}", e);
                    prompt();
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if last_tick.elapsed() >= TICK_INTERVAL {
                for deck in self.engine.tick() {
                    tracing::debug!("Deck {} restarted", deck);
                }
                last_tick = Instant::now();
            }
        }
    }

    /// Returns false when the app should exit
    fn handle_command(&mut self, cmd: Command) -> bool {
        let engine = &self.engine;

        match cmd {
            Command::Load(deck, path) => self.load(deck, &path),
            Command::Play(deck) => {
                if !engine.deck_state(deck).loaded {
                    println!("Deck {} is empty", deck);
                }
                engine.start(deck);
            }
            Command::Pause(deck) => engine.stop(deck),
            Command::Stop(deck) => {
                engine.stop(deck);
                engine.seek_absolute(deck, 0.0);
            }
            Command::Restart(deck) => engine.seek_absolute(deck, 0.0),
            Command::SetGain(deck, gain) => {
                if let Err(e) = engine.set_gain(deck, gain) {
                    println!("error: {}", e);
                }
            }
            Command::SetSpeed(deck, speed) => match engine.set_speed(deck, speed) {
                Ok(()) => {
                    let applied = engine.deck_state(deck).speed;
                    if applied != speed {
                        println!("Deck {} speed clamped to {:.2}", deck, applied);
                    }
                }
                Err(e) => println!("error: {}", e),
            },
            Command::Seek(deck, seconds) => engine.seek_absolute(deck, seconds),
            Command::SeekRelative(deck, fraction) => engine.seek_relative(deck, fraction),
            Command::SetLoop(deck, on) => {
                engine.set_looping(deck, on);
                println!("Deck {} loop {}", deck, if on { "on" } else { "off" });
            }
            Command::Add(path) => {
                if self.playlist.add(&path) {
                    self.save_playlist();
                    self.entry_length(self.playlist.len() - 1);
                    println!("Added {}", twindeck_library::display_title(&path));
                } else {
                    println!("Already in playlist");
                }
            }
            Command::Remove(index) => match self.playlist.remove(index) {
                Some(removed) => {
                    self.save_playlist();
                    println!("Removed {}", twindeck_library::display_title(&removed));
                }
                None => println!("No playlist entry {}", index),
            },
            Command::List => self.list(),
            Command::Find(query) => {
                let matches = self.playlist.search(&query);
                if matches.is_empty() {
                    println!("No matches");
                }
                for index in matches {
                    if let Some(title) = self.playlist.title(index) {
                        println!("{:>3}  {}", index, title);
                    }
                }
            }
            Command::Cue(deck, index) => match self.playlist.get(index).map(str::to_string) {
                Some(path) => self.load(deck, &path),
                None => println!("No playlist entry {}", index),
            },
            Command::Status => self.status(),
            Command::Help => {
                for (usage, summary) in HELP {
                    println!("  {:<24} {}", usage, summary);
                }
            }
            Command::Quit => return false,
        }

        true
    }

    fn load(&mut self, deck: DeckId, path: &str) {
        match self.engine.load_source(deck, path) {
            Ok(()) => {
                let duration = self.engine.deck_state(deck).duration_secs();
                self.playlist.set_length(path, duration);
                println!(
                    "Deck {}: {} ({})",
                    deck,
                    twindeck_library::display_title(path),
                    format_time(duration)
                );
            }
            Err(e) => println!("error: {}", e),
        }
    }

    /// Track length for a playlist entry, measured once and then cached
    fn entry_length(&mut self, index: usize) -> Option<f64> {
        let loader = self.loader;
        self.playlist
            .length_with(index, |path| loader.duration_secs(path).ok())
    }

    fn list(&mut self) {
        if self.playlist.is_empty() {
            println!("Playlist is empty");
            return;
        }
        for index in 0..self.playlist.len() {
            let length = match self.entry_length(index) {
                Some(secs) => format_time(secs),
                None => "--:--".to_string(),
            };
            let title = self.playlist.title(index).unwrap_or_default();
            println!("{:>3}  {:<48} {}", index, title, length);
        }
    }

    fn status(&self) {
        for deck in DeckId::ALL {
            let state = self.engine.deck_state(deck);
            if !state.loaded {
                println!("Deck {}: empty", deck);
                continue;
            }
            println!(
                "Deck {}: {} {} / {}  gain {:.2}  speed {:.2}{}",
                deck,
                if state.playing { "playing" } else { "stopped" },
                format_time(state.position_secs()),
                format_time(state.duration_secs()),
                state.gain,
                state.speed,
                if self.engine.is_looping(deck) { "  loop" } else { "" }
            );
        }
    }

    fn save_playlist(&self) {
        if let Err(e) = self.playlist.save(&self.playlist_path) {
            tracing::warn!("Could not save playlist {}: {}", self.playlist_path.display(), e);
        }
    }
}

/// Format seconds as m:ss
fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
