//! Parts: the four timbral slots of the mixer
//!
//! A part owns at most one synthesis engine and turns its mono output into
//! a stereo pair with volume, pan and mute applied.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, Result};
use crate::synth::SynthEngine;

/// Identifier of one of the four parts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PartId {
    #[serde(alias = "a")]
    A,
    #[serde(alias = "b")]
    B,
    #[serde(alias = "c")]
    C,
    #[serde(alias = "d")]
    D,
}

impl PartId {
    /// All parts in mixing order
    pub const ALL: [PartId; 4] = [PartId::A, PartId::B, PartId::C, PartId::D];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_char(self) -> char {
        match self {
            PartId::A => 'A',
            PartId::B => 'B',
            PartId::C => 'C',
            PartId::D => 'D',
        }
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for PartId {
    type Err = EngineError;

    /// Case-insensitive: "a" and "A" name the same part
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "A" | "a" => Ok(PartId::A),
            "B" | "b" => Ok(PartId::B),
            "C" | "c" => Ok(PartId::C),
            "D" | "d" => Ok(PartId::D),
            _ => Err(EngineError::InvalidIdentifier(s.to_string())),
        }
    }
}

/// Balance-style pan law: only the opposite channel is attenuated
///
/// Center gives unity on both sides. This is not constant-power.
pub fn pan_gains(pan: f32) -> (f32, f32) {
    if pan < 0.0 {
        (1.0, 1.0 + pan)
    } else {
        (1.0 - pan, 1.0)
    }
}

/// One timbral slot
pub struct Part {
    id: PartId,
    engine: Option<Box<dyn SynthEngine>>,
    volume: f32,
    pan: f32,
    mute: bool,
}

impl Part {
    /// Create an empty, unmuted part at unity volume
    pub fn new(id: PartId) -> Self {
        Self {
            id,
            engine: None,
            volume: 1.0,
            pan: 0.0,
            mute: false,
        }
    }

    pub fn id(&self) -> PartId {
        self.id
    }

    /// Move an engine in, handing back the one it replaces
    pub fn assign_engine(&mut self, engine: Box<dyn SynthEngine>) -> Option<Box<dyn SynthEngine>> {
        self.engine.replace(engine)
    }

    /// Remove the engine, leaving the part silent
    pub fn take_engine(&mut self) -> Option<Box<dyn SynthEngine>> {
        self.engine.take()
    }

    pub fn engine(&self) -> Option<&dyn SynthEngine> {
        self.engine.as_deref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut (dyn SynthEngine + 'static)> {
        self.engine.as_deref_mut()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        if volume.is_finite() {
            self.volume = volume.max(0.0);
        }
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn set_pan(&mut self, pan: f32) {
        if pan.is_finite() {
            self.pan = pan.clamp(-1.0, 1.0);
        }
    }

    pub fn is_muted(&self) -> bool {
        self.mute
    }

    pub fn set_mute(&mut self, mute: bool) {
        self.mute = mute;
    }

    /// Render one block of stereo frames
    ///
    /// Silent parts write exact zeros. If the engine produces NaN or
    /// infinite samples the block is zeroed and the failure returned.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) -> Result<()> {
        debug_assert_eq!(left.len(), right.len());

        let engine = match self.engine.as_deref_mut() {
            Some(engine) if !self.mute => engine,
            _ => {
                left.fill(0.0);
                right.fill(0.0);
                return Ok(());
            }
        };

        engine.process_stereo(left, right);

        if !left.iter().chain(right.iter()).all(|s| s.is_finite()) {
            left.fill(0.0);
            right.fill(0.0);
            return Err(EngineError::NonFiniteOutput {
                part: self.id.as_char(),
            });
        }

        let (left_gain, right_gain) = pan_gains(self.pan);
        let left_gain = left_gain * self.volume;
        let right_gain = right_gain * self.volume;
        for l in left.iter_mut() {
            *l *= left_gain;
        }
        for r in right.iter_mut() {
            *r *= right_gain;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{EngineKind, Oscillator};

    /// Constant output engine for exact gain checks
    struct Dc(f32);

    impl SynthEngine for Dc {
        fn kind(&self) -> EngineKind {
            EngineKind::Oscillator
        }

        fn process(&mut self, out: &mut [f32]) {
            out.fill(self.0);
        }
    }

    fn render(part: &mut Part, n: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![9.0; n];
        let mut right = vec![9.0; n];
        part.process(&mut left, &mut right).unwrap();
        (left, right)
    }

    #[test]
    fn test_part_id_parse() {
        assert_eq!("a".parse::<PartId>(), Ok(PartId::A));
        assert_eq!("A".parse::<PartId>(), Ok(PartId::A));
        assert_eq!("d".parse::<PartId>(), Ok(PartId::D));
        assert_eq!(
            "E".parse::<PartId>(),
            Err(EngineError::InvalidIdentifier("E".to_string()))
        );
        assert!("".parse::<PartId>().is_err());
        assert!("AB".parse::<PartId>().is_err());
    }

    #[test]
    fn test_part_id_order() {
        let indices: Vec<usize> = PartId::ALL.iter().map(|p| p.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(PartId::C.to_string(), "C");
    }

    #[test]
    fn test_pan_law() {
        assert_eq!(pan_gains(0.0), (1.0, 1.0));
        assert_eq!(pan_gains(1.0), (0.0, 1.0));
        assert_eq!(pan_gains(-1.0), (1.0, 0.0));
        assert_eq!(pan_gains(0.5), (0.5, 1.0));
        assert_eq!(pan_gains(-0.25), (1.0, 0.75));
    }

    #[test]
    fn test_empty_part_silent() {
        let mut part = Part::new(PartId::A);
        let (l, r) = render(&mut part, 128);
        assert!(l.iter().chain(&r).all(|&s| s == 0.0));
    }

    #[test]
    fn test_muted_part_silent() {
        let mut part = Part::new(PartId::B);
        part.assign_engine(Box::new(Dc(0.5)));
        part.set_mute(true);
        let (l, r) = render(&mut part, 128);
        assert!(l.iter().chain(&r).all(|&s| s == 0.0));
    }

    #[test]
    fn test_center_pan_identical_channels() {
        let mut part = Part::new(PartId::A);
        part.assign_engine(Box::new(Oscillator::new(48000, 440.0, 0.5)));
        let (l, r) = render(&mut part, 512);
        assert_eq!(l, r);
        assert!(l.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_hard_pan() {
        let mut part = Part::new(PartId::A);
        part.assign_engine(Box::new(Dc(0.5)));

        part.set_pan(1.0);
        let (l, r) = render(&mut part, 16);
        assert!(l.iter().all(|&s| s == 0.0));
        assert!(r.iter().all(|&s| s == 0.5));

        part.set_pan(-1.0);
        let (l, r) = render(&mut part, 16);
        assert!(l.iter().all(|&s| s == 0.5));
        assert!(r.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_volume_scales_both_channels() {
        let mut part = Part::new(PartId::C);
        part.assign_engine(Box::new(Dc(0.5)));
        part.set_volume(0.5);
        part.set_pan(0.5);
        let (l, r) = render(&mut part, 8);
        assert!(l.iter().all(|&s| s == 0.125));
        assert!(r.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_setters_sanitize() {
        let mut part = Part::new(PartId::A);
        part.set_pan(3.0);
        assert_eq!(part.pan(), 1.0);
        part.set_pan(f32::NAN);
        assert_eq!(part.pan(), 1.0);
        part.set_volume(-2.0);
        assert_eq!(part.volume(), 0.0);
    }

    #[test]
    fn test_assign_returns_previous() {
        let mut part = Part::new(PartId::A);
        assert!(part.assign_engine(Box::new(Dc(0.1))).is_none());
        let old = part.assign_engine(Box::new(Oscillator::new(48000, 220.0, 0.2)));
        assert!(old.is_some());
        assert_eq!(part.engine().map(|e| e.kind()), Some(EngineKind::Oscillator));
        assert!(part.take_engine().is_some());
        assert!(part.engine().is_none());
    }

    #[test]
    fn test_non_finite_output_contained() {
        let mut part = Part::new(PartId::D);
        part.assign_engine(Box::new(Dc(f32::NAN)));
        let mut left = vec![1.0; 32];
        let mut right = vec![1.0; 32];
        let result = part.process(&mut left, &mut right);
        assert_eq!(result, Err(EngineError::NonFiniteOutput { part: 'D' }));
        assert!(left.iter().chain(&right).all(|&s| s == 0.0));
    }
}
