//! Locus - four-part real-time synthesis engine
//!
//! Four parts (A-D) each run an optional synthesis engine (sine oscillator,
//! granular cloud or spectral noise band). Their outputs are panned, summed
//! and limited into a stereo stream on the audio thread, while control
//! changes arrive through a lock-free command queue.

pub mod config;
pub mod engine;
pub mod error;
pub mod synth;

pub use config::LocusConfig;
pub use engine::{EngineManager, PartId, Session};
pub use error::{EngineError, Result};
