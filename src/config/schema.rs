//! Configuration schema definitions

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::engine::PartId;
use crate::synth::{EngineKind, DEFAULT_BUFFER_DURATION};

/// Main configuration for Locus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocusConfig {
    /// Audio output settings
    #[serde(default)]
    pub audio: AudioConfig,

    /// Granular engine settings
    #[serde(default)]
    pub granular: GranularConfig,

    /// Per-part setup; parts left out start empty
    #[serde(default = "default_parts")]
    pub parts: BTreeMap<PartId, PartConfig>,
}

impl Default for LocusConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            granular: GranularConfig::default(),
            parts: default_parts(),
        }
    }
}

impl LocusConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate < 8000 || self.audio.sample_rate > 192000 {
            bail!("Sample rate must be between 8000 and 192000");
        }
        if self.audio.block_size < 16 || self.audio.block_size > 8192 {
            bail!("Block size must be between 16 and 8192");
        }
        if self.audio.command_capacity == 0 {
            bail!("Command capacity must be at least 1");
        }
        if !(self.granular.buffer_duration > 0.0 && self.granular.buffer_duration <= 60.0) {
            bail!("Granular buffer duration must be between 0 and 60 seconds");
        }

        for (id, part) in &self.parts {
            if !part.volume.is_finite() || part.volume < 0.0 {
                bail!("Part {} volume must be non-negative", id);
            }
            if !(-1.0..=1.0).contains(&part.pan) {
                bail!("Part {} pan must be between -1.0 and 1.0", id);
            }
            if part.frequency.is_some_and(|f| !f.is_finite() || f < 0.0) {
                bail!("Part {} frequency must be non-negative", id);
            }
            if part.amplitude.is_some_and(|a| !a.is_finite()) {
                bail!("Part {} amplitude must be finite", id);
            }
        }

        Ok(())
    }

    /// Settings for a part, if it was configured
    pub fn part(&self, id: PartId) -> Option<&PartConfig> {
        self.parts.get(&id)
    }
}

/// Audio output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz (default: 48000)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Frames per callback block (default: 1024)
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Output device name (None = default device)
    #[serde(default)]
    pub device: Option<String>,

    /// Commands that may be queued for the audio thread (default: 256)
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
            device: None,
            command_capacity: default_command_capacity(),
        }
    }
}

fn default_sample_rate() -> u32 { 48000 }
fn default_block_size() -> usize { 1024 }
fn default_command_capacity() -> usize { 256 }

/// Granular engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GranularConfig {
    /// Length of the source texture in seconds (default: 5.0)
    #[serde(default = "default_buffer_duration")]
    pub buffer_duration: f32,
}

impl Default for GranularConfig {
    fn default() -> Self {
        Self {
            buffer_duration: default_buffer_duration(),
        }
    }
}

fn default_buffer_duration() -> f32 { DEFAULT_BUFFER_DURATION }

/// Setup for one part
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartConfig {
    /// Engine to build for this part (None = empty part)
    #[serde(default)]
    pub engine: Option<EngineKind>,

    /// Initial frequency, applied if the engine supports it
    #[serde(default)]
    pub frequency: Option<f32>,

    /// Initial amplitude, applied if the engine supports it
    #[serde(default)]
    pub amplitude: Option<f32>,

    /// Part volume (default: 1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Stereo position -1.0 (left) to 1.0 (right) (default: 0.0)
    #[serde(default)]
    pub pan: f32,

    #[serde(default)]
    pub mute: bool,
}

impl PartConfig {
    /// A part running the given engine with everything else default
    pub fn with_engine(engine: EngineKind) -> Self {
        Self {
            engine: Some(engine),
            ..Self::default()
        }
    }
}

impl Default for PartConfig {
    fn default() -> Self {
        Self {
            engine: None,
            frequency: None,
            amplitude: None,
            volume: default_volume(),
            pan: 0.0,
            mute: false,
        }
    }
}

fn default_volume() -> f32 { 1.0 }

/// Granular texture, a spectral band and two sine partials
fn default_parts() -> BTreeMap<PartId, PartConfig> {
    BTreeMap::from([
        (PartId::A, PartConfig::with_engine(EngineKind::Granular)),
        (
            PartId::B,
            PartConfig {
                amplitude: Some(0.5),
                ..PartConfig::with_engine(EngineKind::Spectral)
            },
        ),
        (
            PartId::C,
            PartConfig {
                frequency: Some(110.0),
                amplitude: Some(0.4),
                ..PartConfig::with_engine(EngineKind::Oscillator)
            },
        ),
        (
            PartId::D,
            PartConfig {
                frequency: Some(660.0),
                amplitude: Some(0.2),
                ..PartConfig::with_engine(EngineKind::Oscillator)
            },
        ),
    ])
}
