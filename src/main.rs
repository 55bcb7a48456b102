//! Locus - four-part real-time synthesis engine

use anyhow::{Context, Result};
use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait};
use locus::config;
use locus::engine::{player, PartId, Recorder, Session};
use std::future::Future;
use std::io::BufRead;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::console::ConsoleCommand;
use cli::{Cli, Commands};

/// How often the console reclaims engines and reports part failures
const MAINTENANCE_INTERVAL: Duration = Duration::from_millis(250);

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("locus=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play { config: config_path } => {
            info!("Loading configuration from {:?}", config_path);
            let cfg = config::load_config(&config_path)?;

            let mut session = Session::new(&cfg);
            session.start().context("failed to start audio output")?;

            println!("Playing. Type 'help' for commands, 'quit' or Ctrl-C to stop.");
            let rt = tokio::runtime::Runtime::new()?;
            let lines = spawn_stdin_reader();
            let interrupted = async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupted");
                }
            };
            rt.block_on(run_console(
                &mut session,
                cfg.granular.buffer_duration,
                lines,
                interrupted,
            ))?;

            session.stop();
        }

        Commands::Record {
            config: config_path,
            output,
            duration,
        } => {
            info!("Loading configuration from {:?}", config_path);
            let cfg = config::load_config(&config_path)?;

            println!("Recording {} seconds to {:?}...", duration, output);

            let mut session = Session::new(&cfg);
            let sample_rate = cfg.audio.sample_rate;
            let block_size = cfg.audio.block_size;
            let total_frames = sample_rate as u64 * duration;

            let mut recorder = Recorder::new(&output, sample_rate)?;
            let mut left = vec![0.0f32; block_size];
            let mut right = vec![0.0f32; block_size];
            let mut last_second = u64::MAX;

            while recorder.frames_written() < total_frames {
                let n = (total_frames - recorder.frames_written()).min(block_size as u64) as usize;
                session.render_offline(&mut left[..n], &mut right[..n])?;
                recorder.write_frames(&left[..n], &right[..n])?;

                let manager = session.manager_mut();
                manager.drain_faults();
                manager.collect_garbage();

                let second = recorder.frames_written() / sample_rate as u64;
                if second != last_second {
                    last_second = second;
                    print!("\r  Progress: {}s / {}s", second, duration);
                    use std::io::Write;
                    std::io::stdout().flush()?;
                }
            }

            recorder.finalize()?;
            println!("\nRecorded to {:?}", output);
        }

        Commands::Devices => {
            println!("Available audio output devices:\n");

            let host = cpal::default_host();
            if let Some(name) = player::default_device_name() {
                println!("Default output: {}", name);
                if let Some(device) = host.default_output_device() {
                    if let Ok(config) = device.default_output_config() {
                        println!(
                            "  Sample rate: {} Hz, Channels: {}, Format: {:?}",
                            config.sample_rate().0,
                            config.channels(),
                            config.sample_format()
                        );
                    }
                }
                println!();
            }

            let devices = player::list_output_devices();
            if devices.is_empty() {
                println!("No output devices found.");
            }
            for (name, config) in devices {
                println!(
                    "  - {} ({} Hz, {} ch)",
                    name, config.sample_rate.0, config.channels
                );
            }
        }

        Commands::Check { config: config_path } => {
            println!("Checking configuration at {:?}...", config_path);

            match config::load_config(&config_path) {
                Ok(cfg) => {
                    println!("Configuration is valid!");
                    println!("  Sample rate: {} Hz", cfg.audio.sample_rate);
                    println!("  Block size: {}", cfg.audio.block_size);
                    if let Some(device) = &cfg.audio.device {
                        println!("  Device: {}", device);
                    }
                    println!("  Granular buffer: {:.1}s", cfg.granular.buffer_duration);
                    println!("  Parts:");
                    for id in PartId::ALL {
                        match cfg.part(id) {
                            Some(part) => println!(
                                "    {}: {} (volume {:.2}, pan {:+.2}){}",
                                id,
                                part.engine.map(|e| e.name()).unwrap_or("empty"),
                                part.volume,
                                part.pan,
                                if part.mute { " [muted]" } else { "" }
                            ),
                            None => println!("    {}: empty", id),
                        }
                    }
                }
                Err(e) => {
                    println!("Configuration is invalid: {:#}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Init => {
            let example_config = include_str!("../locus.example.yaml");

            let path = "locus.yaml";
            if std::path::Path::new(path).exists() {
                println!("locus.yaml already exists. Not overwriting.");
            } else {
                std::fs::write(path, example_config)?;
                println!("Created locus.yaml with example configuration.");
            }
        }
    }

    Ok(())
}

/// Forward stdin lines from a plain thread
///
/// A read blocked on the terminal cannot be cancelled; keeping it off the
/// runtime lets Ctrl-C exit without waiting for another line.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Run console commands until quit, end of input or `shutdown` completes
async fn run_console(
    session: &mut Session,
    buffer_duration: f32,
    mut lines: mpsc::UnboundedReceiver<String>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let mut maintenance = tokio::time::interval(MAINTENANCE_INTERVAL);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else {
                    break;
                };
                match ConsoleCommand::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(ConsoleCommand::Quit)) => break,
                    Ok(Some(command)) => {
                        match command.execute(session.manager_mut(), buffer_duration) {
                            Ok(Some(output)) => println!("{}", output),
                            Ok(None) => {}
                            Err(e) => error!("{:#}", e),
                        }
                    }
                    Err(e) => error!("{:#}", e),
                }
            }
            _ = maintenance.tick() => {
                let manager = session.manager_mut();
                manager.drain_faults();
                manager.collect_garbage();
            }
            _ = &mut shutdown => break,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use locus::config::LocusConfig;
    use locus::synth::EngineKind;
    use std::collections::BTreeMap;

    fn empty_session() -> Session {
        Session::new(&LocusConfig {
            parts: BTreeMap::new(),
            ..LocusConfig::default()
        })
    }

    #[test]
    fn test_console_stops_on_shutdown_with_input_pending() {
        let mut session = empty_session();
        let (_tx, rx) = mpsc::unbounded_channel();

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(run_console(&mut session, 1.0, rx, async {}))
            .unwrap();
        // nothing left on the blocking pool to wait for
        drop(rt);
    }

    #[test]
    fn test_console_applies_lines_until_quit() {
        let mut session = empty_session();
        let (tx, rx) = mpsc::unbounded_channel();
        for line in ["assign c spectral", "set c amplitude 0.5", "bogus", "quit", "clear c"] {
            tx.send(line.to_string()).unwrap();
        }

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(run_console(&mut session, 1.0, rx, std::future::pending()))
            .unwrap();

        let state = session.manager().state(PartId::C);
        assert_eq!(state.engine, Some(EngineKind::Spectral));
        assert_eq!(state.amplitude, Some(0.5));
    }

    #[test]
    fn test_console_ends_with_input() {
        let mut session = empty_session();
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        drop(tx);

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(run_console(&mut session, 1.0, rx, std::future::pending()))
            .unwrap();
    }
}
