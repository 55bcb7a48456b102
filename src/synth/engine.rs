//! Synthesis engine trait and optional parameter capabilities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Runtime type tag for a synthesis engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Sine oscillator
    Oscillator,
    /// Grain cloud over a noise texture
    Granular,
    /// FFT-shaped resonant noise
    Spectral,
}

impl EngineKind {
    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::Oscillator => "oscillator",
            EngineKind::Granular => "granular",
            EngineKind::Spectral => "spectral",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "oscillator" | "osc" => Ok(EngineKind::Oscillator),
            "granular" => Ok(EngineKind::Granular),
            "spectral" => Ok(EngineKind::Spectral),
            _ => Err(EngineError::UnknownEngine(s.to_string())),
        }
    }
}

/// Engines whose "frequency-like" control can be driven
pub trait SupportsFrequency {
    fn set_frequency(&mut self, frequency: f32);
}

/// Engines whose "amplitude-like" control can be driven
pub trait SupportsAmplitude {
    fn set_amplitude(&mut self, amplitude: f32);
}

/// A sample generator driven by the audio thread
///
/// Implementations must not block, and should not allocate once they have
/// seen a block of the requested size.
pub trait SynthEngine: Send {
    /// Runtime type of this engine
    fn kind(&self) -> EngineKind;

    /// Get ready for blocks of `frames` samples
    ///
    /// Called off the audio thread before the engine is handed over.
    fn prepare(&mut self, _frames: usize) {}

    /// Fill `out` with mono samples
    fn process(&mut self, out: &mut [f32]);

    /// Fill both channels; mono engines duplicate their output
    fn process_stereo(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.process(left);
        right.copy_from_slice(left);
    }

    /// Frequency capability, if this engine has one
    fn as_frequency(&mut self) -> Option<&mut dyn SupportsFrequency> {
        None
    }

    /// Amplitude capability, if this engine has one
    fn as_amplitude(&mut self) -> Option<&mut dyn SupportsAmplitude> {
        None
    }

    /// Whether [`SynthEngine::as_frequency`] returns a capability
    fn supports_frequency(&self) -> bool {
        false
    }

    /// Whether [`SynthEngine::as_amplitude`] returns a capability
    fn supports_amplitude(&self) -> bool {
        false
    }
}
