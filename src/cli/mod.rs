//! CLI interface for Locus

pub mod console;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Four-part real-time synthesis engine
#[derive(Parser)]
#[command(name = "locus")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Play through the output device, controlled from the console
    Play {
        /// Configuration file path
        #[arg(short, long, default_value = "locus.yaml")]
        config: PathBuf,
    },

    /// Render offline to a WAV file
    Record {
        /// Configuration file path
        #[arg(short, long, default_value = "locus.yaml")]
        config: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Duration in seconds
        #[arg(short, long, default_value = "60")]
        duration: u64,
    },

    /// List available audio output devices
    Devices,

    /// Validate a configuration file
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "locus.yaml")]
        config: PathBuf,
    },

    /// Generate an example configuration file
    Init,
}
