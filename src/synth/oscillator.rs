//! Sine oscillator engine

use std::f64::consts::TAU;

use super::engine::{EngineKind, SupportsAmplitude, SupportsFrequency, SynthEngine};

/// Amplitudes at or below this render as exact silence
pub const SILENCE_THRESHOLD: f32 = 0.001;

/// A continuous-phase sine oscillator
pub struct Oscillator {
    frequency: f32,
    amplitude: f32,
    /// Phase accumulator in radians, kept in [0, 2π) between blocks
    phase: f64,
    phase_increment: f64,
    sample_rate: f64,
}

impl Oscillator {
    /// Create a new oscillator
    pub fn new(sample_rate: u32, frequency: f32, amplitude: f32) -> Self {
        let mut osc = Self {
            frequency: 0.0,
            amplitude: 0.0,
            phase: 0.0,
            phase_increment: 0.0,
            sample_rate: sample_rate as f64,
        };
        osc.set_frequency(frequency);
        osc.set_amplitude(amplitude);
        osc
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    /// Current phase in radians
    pub fn phase(&self) -> f64 {
        self.phase
    }

    fn advance(&mut self, frames: usize) {
        self.phase = (self.phase + frames as f64 * self.phase_increment).rem_euclid(TAU);
    }
}

impl SupportsFrequency for Oscillator {
    fn set_frequency(&mut self, frequency: f32) {
        if !frequency.is_finite() {
            return;
        }
        self.frequency = frequency;
        self.phase_increment = TAU * frequency as f64 / self.sample_rate;
    }
}

impl SupportsAmplitude for Oscillator {
    fn set_amplitude(&mut self, amplitude: f32) {
        if amplitude.is_finite() {
            self.amplitude = amplitude.clamp(0.0, 1.0);
        }
    }
}

impl SynthEngine for Oscillator {
    fn kind(&self) -> EngineKind {
        EngineKind::Oscillator
    }

    fn process(&mut self, out: &mut [f32]) {
        if self.amplitude <= SILENCE_THRESHOLD {
            out.fill(0.0);
            self.advance(out.len());
            return;
        }

        let amplitude = self.amplitude as f64;
        for (i, sample) in out.iter_mut().enumerate() {
            let phase = self.phase + i as f64 * self.phase_increment;
            *sample = (amplitude * phase.sin()) as f32;
        }
        self.advance(out.len());
    }

    fn as_frequency(&mut self) -> Option<&mut dyn SupportsFrequency> {
        Some(self)
    }

    fn as_amplitude(&mut self) -> Option<&mut dyn SupportsAmplitude> {
        Some(self)
    }

    fn supports_frequency(&self) -> bool {
        true
    }

    fn supports_amplitude(&self) -> bool {
        true
    }
}
