//! Synthesis engines
//!
//! Pure sample generators: given a buffer, fill it. They know nothing
//! about mixing, routing or audio I/O.

mod engine;
mod granular;
mod oscillator;
mod spectral;

pub use engine::{EngineKind, SupportsAmplitude, SupportsFrequency, SynthEngine};
pub use granular::{Grain, Granular, DEFAULT_BUFFER_DURATION, GRAIN_POOL_SIZE};
pub use oscillator::{Oscillator, SILENCE_THRESHOLD};
pub use spectral::Spectral;

/// Build an engine of the given kind with its default parameters
pub fn build_engine(
    kind: EngineKind,
    sample_rate: u32,
    buffer_duration: f32,
) -> Box<dyn SynthEngine> {
    match kind {
        EngineKind::Oscillator => Box::new(Oscillator::new(sample_rate, 440.0, 0.1)),
        EngineKind::Granular => Box::new(Granular::new(sample_rate, buffer_duration)),
        EngineKind::Spectral => Box::new(Spectral::new(sample_rate)),
    }
}
