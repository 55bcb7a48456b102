//! Granular texture engine
//!
//! Sprays short grains read from a static brown-noise-like source buffer.
//! The buffer is generated once at construction by integrating white noise;
//! playback only ever reads it.
//!
//! Grains live in a fixed-capacity pool so spawning never allocates on the
//! audio thread. Grains are hard-edged (no per-grain window).

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::engine::{EngineKind, SupportsAmplitude, SupportsFrequency, SynthEngine};

/// Maximum number of simultaneously live grains
pub const GRAIN_POOL_SIZE: usize = 64;

/// Default source buffer length in seconds
pub const DEFAULT_BUFFER_DURATION: f32 = 5.0;

/// Peak level of the generated source texture
const SOURCE_HEADROOM: f32 = 0.5;

/// Frequency range mapped onto density by `set_frequency`
const FREQ_MIN: f32 = 50.0;
const FREQ_SPAN: f32 = 2000.0;

/// Density range in grains per second
const DENSITY_MIN: f32 = 5.0;
const DENSITY_SPAN: f32 = 50.0;

/// Position drift per `set_frequency` call at full scale
const POSITION_DRIFT: f32 = 0.0001;

/// Grain size range driven by `set_amplitude`
const GRAIN_SIZE_MIN: f32 = 0.05;
const GRAIN_SIZE_SPAN: f32 = 0.2;

/// One fragment of source material being played back
#[derive(Debug, Clone, Copy, Default)]
pub struct Grain {
    /// Index into the source buffer where the grain starts
    pub start_offset: usize,
    /// Samples already played
    pub elapsed_samples: usize,
    /// Total grain length in samples
    pub length_samples: usize,
    pub amplitude: f32,
    pub pan: f32,
    active: bool,
}

impl Grain {
    pub fn is_active(&self) -> bool {
        self.active
    }

    fn remaining(&self) -> usize {
        self.length_samples.saturating_sub(self.elapsed_samples)
    }
}

/// Granular synthesis engine
pub struct Granular {
    source: Vec<f32>,
    sample_rate: f32,
    position: f32,
    density: f32,
    grain_size: f32,
    spray: f32,
    gain: f32,
    grains: [Grain; GRAIN_POOL_SIZE],
    spawn_interval: usize,
    spawn_countdown: usize,
    dropped_spawns: u64,
    rng: SmallRng,
}

impl Granular {
    /// Create a new granular engine with an entropy-seeded texture
    pub fn new(sample_rate: u32, buffer_duration: f32) -> Self {
        Self::with_rng(sample_rate, buffer_duration, SmallRng::from_entropy())
    }

    /// Create a deterministic engine (texture and spray jitter)
    pub fn with_seed(sample_rate: u32, buffer_duration: f32, seed: u64) -> Self {
        Self::with_rng(sample_rate, buffer_duration, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(sample_rate: u32, buffer_duration: f32, mut rng: SmallRng) -> Self {
        let sample_rate = sample_rate as f32;
        let length = ((sample_rate * buffer_duration.max(0.0)) as usize).max(1);
        let source = random_walk(&mut rng, length);

        let density = 20.0;
        let spawn_interval = spawn_interval(sample_rate, density);

        Self {
            source,
            sample_rate,
            position: 0.5,
            density,
            grain_size: 0.1,
            spray: 0.01,
            gain: 1.0,
            grains: [Grain::default(); GRAIN_POOL_SIZE],
            spawn_interval,
            spawn_countdown: 0,
            dropped_spawns: 0,
            rng,
        }
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    /// Set the normalized read position, wrapped into [0, 1)
    pub fn set_position(&mut self, position: f32) {
        if position.is_finite() {
            self.position = position.rem_euclid(1.0);
        }
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    pub fn grain_size(&self) -> f32 {
        self.grain_size
    }

    pub fn spray(&self) -> f32 {
        self.spray
    }

    pub fn set_spray(&mut self, spray: f32) {
        if spray.is_finite() {
            self.spray = spray.max(0.0);
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Samples between grain spawns
    pub fn spawn_interval(&self) -> usize {
        self.spawn_interval
    }

    /// The static source texture
    pub fn source(&self) -> &[f32] {
        &self.source
    }

    /// Currently playing grains
    pub fn grains(&self) -> impl Iterator<Item = &Grain> {
        self.grains.iter().filter(|g| g.active)
    }

    pub fn active_grains(&self) -> usize {
        self.grains().count()
    }

    /// Spawns skipped because the pool was full
    pub fn dropped_spawns(&self) -> u64 {
        self.dropped_spawns
    }

    fn spawn_grain(&mut self) {
        let Some(slot) = self.grains.iter_mut().position(|g| !g.active) else {
            self.dropped_spawns += 1;
            return;
        };

        let offset = (self.rng.gen::<f32>() - 0.5) * self.spray;
        let pos = (self.position + offset).rem_euclid(1.0);
        let len = self.source.len();
        let start_offset = ((pos * len as f32) as usize).min(len - 1);
        let length_samples = (self.grain_size * self.sample_rate) as usize;

        self.grains[slot] = Grain {
            start_offset,
            elapsed_samples: 0,
            length_samples,
            amplitude: 1.0,
            pan: 0.0,
            active: length_samples > 0,
        };
    }

    fn schedule_spawns(&mut self, frames: usize) {
        let mut remaining = frames;
        while remaining > 0 {
            if self.spawn_countdown == 0 {
                self.spawn_grain();
                self.spawn_countdown = self.spawn_interval;
            }
            let step = remaining.min(self.spawn_countdown);
            remaining -= step;
            self.spawn_countdown -= step;
        }
    }

    fn mix_grains(&mut self, out: &mut [f32]) {
        let len = self.source.len();
        for grain in self.grains.iter_mut().filter(|g| g.active) {
            let count = out.len().min(grain.remaining());
            let scale = grain.amplitude * self.gain;

            let mut read = (grain.start_offset + grain.elapsed_samples) % len;
            let mut written = 0;
            while written < count {
                let chunk = (count - written).min(len - read);
                let src = &self.source[read..read + chunk];
                for (o, s) in out[written..written + chunk].iter_mut().zip(src) {
                    *o += s * scale;
                }
                written += chunk;
                read = (read + chunk) % len;
            }

            grain.elapsed_samples += count;
            if grain.elapsed_samples >= grain.length_samples {
                grain.active = false;
            }
        }
    }
}

impl SupportsFrequency for Granular {
    /// Frequency drives grain density and a slow drift through the source
    fn set_frequency(&mut self, frequency: f32) {
        if !frequency.is_finite() {
            return;
        }
        let norm = ((frequency - FREQ_MIN) / FREQ_SPAN).clamp(0.0, 1.0);
        self.density = DENSITY_MIN + norm * DENSITY_SPAN;
        self.spawn_interval = spawn_interval(self.sample_rate, self.density);
        self.position = (self.position + POSITION_DRIFT * norm).rem_euclid(1.0);
    }
}

impl SupportsAmplitude for Granular {
    /// Amplitude drives grain size and output gain
    fn set_amplitude(&mut self, amplitude: f32) {
        if !amplitude.is_finite() {
            return;
        }
        self.gain = amplitude;
        self.grain_size = GRAIN_SIZE_MIN + amplitude * GRAIN_SIZE_SPAN;
    }
}

impl SynthEngine for Granular {
    fn kind(&self) -> EngineKind {
        EngineKind::Granular
    }

    fn process(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        self.schedule_spawns(out.len());
        self.mix_grains(out);
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

fn spawn_interval(sample_rate: f32, density: f32) -> usize {
    ((sample_rate / density) as usize).max(1)
}

/// Integrated white noise normalized to `SOURCE_HEADROOM` peak
fn random_walk(rng: &mut SmallRng, length: usize) -> Vec<f32> {
    let mut level = 0.0f32;
    let mut walk: Vec<f32> = (0..length)
        .map(|_| {
            level += rng.gen_range(-0.5f32..0.5);
            level
        })
        .collect();

    let peak = walk.iter().fold(0.0f32, |a, &b| a.max(b.abs()));
    if peak > 0.0 {
        let scale = SOURCE_HEADROOM / peak;
        for sample in &mut walk {
            *sample *= scale;
        }
    }
    walk
}
