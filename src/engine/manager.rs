//! Control-side entry point for mutating parts
//!
//! The manager never touches the audio-thread state directly. It keeps a
//! mirror of what it has asked for and forwards every change as a
//! [`PartCommand`] through the lock-free command queue.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::command::{ControlChannels, Fault, FaultKind, PartCommand};
use super::driver::DriverStats;
use super::part::{Part, PartId};
use crate::error::{EngineError, Result};
use crate::synth::{EngineKind, SynthEngine};

/// Control-side view of one part
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PartState {
    pub id: PartId,
    pub engine: Option<EngineKind>,
    pub supports_frequency: bool,
    pub supports_amplitude: bool,
    /// Last frequency sent, if any
    pub frequency: Option<f32>,
    /// Last amplitude sent, if any
    pub amplitude: Option<f32>,
    pub volume: f32,
    pub pan: f32,
    pub mute: bool,
}

impl PartState {
    /// Mirror a part as it exists before the audio thread takes it over
    pub fn of(part: &Part) -> Self {
        let engine = part.engine();
        Self {
            id: part.id(),
            engine: engine.map(|e| e.kind()),
            supports_frequency: engine.is_some_and(|e| e.supports_frequency()),
            supports_amplitude: engine.is_some_and(|e| e.supports_amplitude()),
            frequency: None,
            amplitude: None,
            volume: part.volume(),
            pan: part.pan(),
            mute: part.is_muted(),
        }
    }
}

/// Telemetry snapshot of the whole engine
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub sample_rate: u32,
    pub block_size: usize,
    pub blocks_rendered: u64,
    pub faults: u64,
    pub parts: [PartState; 4],
}

/// Routes control changes to the four parts
pub struct EngineManager {
    parts: [PartState; 4],
    /// Assignments sent per part; 0 is the engine the part was built with
    generations: [u64; 4],
    channels: ControlChannels,
    stats: Arc<DriverStats>,
    sample_rate: u32,
    block_size: usize,
}

impl EngineManager {
    pub fn new(
        parts: [PartState; 4],
        channels: ControlChannels,
        stats: Arc<DriverStats>,
        sample_rate: u32,
        block_size: usize,
    ) -> Self {
        Self {
            parts,
            generations: [0; 4],
            channels,
            stats,
            sample_rate,
            block_size,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Look up a part by its identifier, ignoring case
    pub fn get_part(&mut self, id: &str) -> Result<PartControl<'_>> {
        let id: PartId = id.parse()?;
        Ok(self.part(id))
    }

    /// Typed handle to a part
    pub fn part(&mut self, id: PartId) -> PartControl<'_> {
        PartControl { manager: self, id }
    }

    /// Current mirror state of a part
    pub fn state(&self, id: PartId) -> &PartState {
        &self.parts[id.index()]
    }

    /// Move an engine into a part, replacing whatever it was running
    ///
    /// The previous engine is dropped on this side once the audio thread
    /// hands it back.
    pub fn assign_engine(&mut self, id: &str, engine: Box<dyn SynthEngine>) -> Result<()> {
        let id: PartId = id.parse()?;
        self.assign(id, engine)
    }

    fn assign(&mut self, id: PartId, mut engine: Box<dyn SynthEngine>) -> Result<()> {
        self.collect_garbage();
        engine.prepare(self.block_size);

        let kind = engine.kind();
        let supports_frequency = engine.supports_frequency();
        let supports_amplitude = engine.supports_amplitude();

        let generation = self.generations[id.index()] + 1;
        self.send(PartCommand::AssignEngine {
            part: id,
            engine,
            generation,
        })?;
        self.generations[id.index()] = generation;

        let state = &mut self.parts[id.index()];
        state.engine = Some(kind);
        state.supports_frequency = supports_frequency;
        state.supports_amplitude = supports_amplitude;
        state.frequency = None;
        state.amplitude = None;
        info!("Assigned {} to Part {}", kind, id);
        Ok(())
    }

    /// Remove the engine from a part
    pub fn clear_engine(&mut self, id: &str) -> Result<()> {
        let id: PartId = id.parse()?;
        self.collect_garbage();
        self.send(PartCommand::ClearEngine { part: id })?;

        let state = &mut self.parts[id.index()];
        state.engine = None;
        state.supports_frequency = false;
        state.supports_amplitude = false;
        info!("Cleared engine on Part {}", id);
        Ok(())
    }

    /// Silence every part with an engine by forcing its amplitude to zero
    ///
    /// Volume, pan, mute and engine assignment are left alone.
    pub fn panic(&mut self) -> Result<()> {
        warn!("PANIC triggered: silencing all parts");
        self.send(PartCommand::Panic)?;
        for state in self.parts.iter_mut() {
            if state.engine.is_some() && state.supports_amplitude {
                state.amplitude = Some(0.0);
            }
        }
        Ok(())
    }

    /// Route a named parameter change the way the message channel does
    ///
    /// `frequency` and `amplitude` go to the engine's capabilities; `volume`,
    /// `pan` and `mute` (non-zero means muted) go to the part.
    pub fn set_param(&mut self, id: &str, param: &str, value: f32) -> Result<()> {
        let mut part = self.get_part(id)?;
        match param {
            "frequency" => part.set_frequency(value),
            "amplitude" => part.set_amplitude(value),
            "volume" => part.set_volume(value),
            "pan" => part.set_pan(value),
            "mute" => part.set_mute(value != 0.0),
            other => Err(EngineError::UnknownParameter(other.to_string())),
        }
    }

    /// Drop engines the audio thread has finished with
    pub fn collect_garbage(&mut self) -> usize {
        let mut dropped = 0;
        while let Ok(engine) = self.channels.retired.pop() {
            debug!("Reclaimed retired {} engine", engine.kind());
            drop(engine);
            dropped += 1;
        }
        dropped
    }

    /// Log and return the per-block failures reported since the last call
    pub fn drain_faults(&mut self) -> Vec<Fault> {
        let mut faults = Vec::new();
        while let Ok(fault) = self.channels.faults.pop() {
            match fault.kind {
                FaultKind::NonFiniteOutput => error!(
                    "Part {} produced non-finite output in block {}; silenced for that block",
                    fault.part, fault.block
                ),
                FaultKind::EnginePanicked => {
                    error!(
                        "Part {} engine panicked in block {}; engine removed",
                        fault.part, fault.block
                    );
                    // Faults from an engine a later assignment replaced are stale
                    if fault.generation == self.generations[fault.part.index()] {
                        let state = &mut self.parts[fault.part.index()];
                        state.engine = None;
                        state.supports_frequency = false;
                        state.supports_amplitude = false;
                    }
                }
                FaultKind::ReclaimOverflow => warn!(
                    "Part {} retired engine dropped on the audio thread in block {}",
                    fault.part, fault.block
                ),
            }
            faults.push(fault);
        }
        faults
    }

    /// Snapshot for telemetry
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            blocks_rendered: self.stats.blocks_rendered(),
            faults: self.stats.faults(),
            parts: self.parts,
        }
    }

    fn send(&mut self, command: PartCommand) -> Result<()> {
        self.channels
            .commands
            .push(command)
            .map_err(|_| EngineError::QueueFull)
    }
}

/// Handle to one part, borrowed from the manager
pub struct PartControl<'a> {
    manager: &'a mut EngineManager,
    id: PartId,
}

impl PartControl<'_> {
    pub fn id(&self) -> PartId {
        self.id
    }

    fn state(&self) -> &PartState {
        self.manager.state(self.id)
    }

    fn state_mut(&mut self) -> &mut PartState {
        &mut self.manager.parts[self.id.index()]
    }

    /// Runtime type of the assigned engine, if any
    pub fn engine_kind(&self) -> Option<EngineKind> {
        self.state().engine
    }

    pub fn supports_frequency(&self) -> bool {
        self.state().engine.is_some() && self.state().supports_frequency
    }

    pub fn supports_amplitude(&self) -> bool {
        self.state().engine.is_some() && self.state().supports_amplitude
    }

    pub fn volume(&self) -> f32 {
        self.state().volume
    }

    pub fn pan(&self) -> f32 {
        self.state().pan
    }

    pub fn is_muted(&self) -> bool {
        self.state().mute
    }

    /// Forward a frequency change; ignored when the engine lacks the capability
    pub fn set_frequency(&mut self, value: f32) -> Result<()> {
        if !self.supports_frequency() {
            self.ignore("frequency");
            return Ok(());
        }
        self.manager.send(PartCommand::SetFrequency { part: self.id, value })?;
        self.state_mut().frequency = Some(value);
        Ok(())
    }

    /// Forward an amplitude change; ignored when the engine lacks the capability
    pub fn set_amplitude(&mut self, value: f32) -> Result<()> {
        if !self.supports_amplitude() {
            self.ignore("amplitude");
            return Ok(());
        }
        self.manager.send(PartCommand::SetAmplitude { part: self.id, value })?;
        self.state_mut().amplitude = Some(value);
        Ok(())
    }

    pub fn set_volume(&mut self, value: f32) -> Result<()> {
        if !value.is_finite() {
            return Ok(());
        }
        let value = value.max(0.0);
        self.manager.send(PartCommand::SetVolume { part: self.id, value })?;
        self.state_mut().volume = value;
        Ok(())
    }

    pub fn set_pan(&mut self, value: f32) -> Result<()> {
        if !value.is_finite() {
            return Ok(());
        }
        let value = value.clamp(-1.0, 1.0);
        self.manager.send(PartCommand::SetPan { part: self.id, value })?;
        self.state_mut().pan = value;
        Ok(())
    }

    pub fn set_mute(&mut self, muted: bool) -> Result<()> {
        self.manager.send(PartCommand::SetMute { part: self.id, muted })?;
        self.state_mut().mute = muted;
        Ok(())
    }

    /// Replace this part's engine
    pub fn assign_engine(&mut self, engine: Box<dyn SynthEngine>) -> Result<()> {
        self.manager.assign(self.id, engine)
    }

    fn ignore(&self, capability: &'static str) {
        let err = EngineError::UnsupportedCapability {
            part: self.id.as_char(),
            capability,
        };
        debug!("Ignoring parameter change: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::command::channels;
    use crate::engine::driver::AudioCallbackDriver;
    use crate::synth::{Granular, Oscillator, Spectral};

    /// Engine with no optional capabilities
    struct Bare;

    impl SynthEngine for Bare {
        fn kind(&self) -> EngineKind {
            EngineKind::Spectral
        }

        fn process(&mut self, out: &mut [f32]) {
            out.fill(0.1);
        }
    }

    fn setup(capacity: usize) -> (EngineManager, AudioCallbackDriver) {
        let (control, audio) = channels(capacity);
        let parts = PartId::ALL.map(Part::new);
        let states = parts.each_ref().map(PartState::of);
        let driver = AudioCallbackDriver::new(parts, audio, 1024);
        let manager = EngineManager::new(states, control, driver.stats(), 48000, 1024);
        (manager, driver)
    }

    fn render(driver: &mut AudioCallbackDriver, n: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![0.0; n];
        let mut right = vec![0.0; n];
        driver.render(&mut left, &mut right);
        (left, right)
    }

    #[test]
    fn test_get_part_case_insensitive() {
        let (mut manager, _driver) = setup(16);
        let lower = manager.get_part("a").unwrap().id();
        let upper = manager.get_part("A").unwrap().id();
        assert_eq!(lower, upper);
        assert_eq!(lower, PartId::A);
    }

    #[test]
    fn test_get_part_invalid() {
        let (mut manager, _driver) = setup(16);
        assert!(matches!(
            manager.get_part("E"),
            Err(EngineError::InvalidIdentifier(id)) if id == "E"
        ));
        assert!(manager.assign_engine("Z", Box::new(Bare)).is_err());
    }

    #[test]
    fn test_assign_engine_visible_next_block() {
        let (mut manager, mut driver) = setup(16);
        manager
            .assign_engine("b", Box::new(Oscillator::new(48000, 440.0, 0.5)))
            .unwrap();
        assert_eq!(manager.get_part("B").unwrap().engine_kind(), Some(EngineKind::Oscillator));
        assert!(driver.part(PartId::B).engine().is_none());

        render(&mut driver, 64);
        assert_eq!(
            driver.part(PartId::B).engine().map(|e| e.kind()),
            Some(EngineKind::Oscillator)
        );
    }

    #[test]
    fn test_replaced_engine_reclaimed() {
        let (mut manager, mut driver) = setup(16);
        manager.assign_engine("A", Box::new(Spectral::with_seed(48000, 1))).unwrap();
        render(&mut driver, 64);
        manager.assign_engine("A", Box::new(Oscillator::new(48000, 220.0, 0.3))).unwrap();
        render(&mut driver, 64);
        assert_eq!(manager.collect_garbage(), 1);
        assert_eq!(manager.collect_garbage(), 0);
    }

    #[test]
    fn test_panic_silences_everything() {
        let (mut manager, mut driver) = setup(16);
        manager.assign_engine("A", Box::new(Oscillator::new(48000, 440.0, 0.5))).unwrap();
        manager.assign_engine("B", Box::new(Granular::with_seed(48000, 1.0, 9))).unwrap();
        let mut spectral = Spectral::with_seed(48000, 2);
        crate::synth::SupportsAmplitude::set_amplitude(&mut spectral, 0.8);
        manager.assign_engine("C", Box::new(spectral)).unwrap();

        let (left, _) = render(&mut driver, 1024);
        assert!(left.iter().any(|&s| s != 0.0));

        manager.panic().unwrap();
        let (left, right) = render(&mut driver, 1024);
        assert!(left.iter().chain(&right).all(|&s| s == 0.0));

        // configuration other than amplitude is untouched
        let part = manager.get_part("A").unwrap();
        assert_eq!(part.engine_kind(), Some(EngineKind::Oscillator));
        assert_eq!(part.volume(), 1.0);
        assert_eq!(manager.state(PartId::B).amplitude, Some(0.0));
    }

    #[test]
    fn test_set_param_routing() {
        let (mut manager, mut driver) = setup(16);
        manager.assign_engine("A", Box::new(Oscillator::new(48000, 440.0, 0.5))).unwrap();

        manager.set_param("a", "frequency", 220.0).unwrap();
        manager.set_param("a", "amplitude", 0.25).unwrap();
        manager.set_param("a", "volume", 0.5).unwrap();
        manager.set_param("a", "pan", -2.0).unwrap();
        manager.set_param("a", "mute", 1.0).unwrap();
        assert!(matches!(
            manager.set_param("a", "grain_size", 1.0),
            Err(EngineError::UnknownParameter(_))
        ));

        let state = *manager.state(PartId::A);
        assert_eq!(state.frequency, Some(220.0));
        assert_eq!(state.amplitude, Some(0.25));
        assert_eq!(state.volume, 0.5);
        assert_eq!(state.pan, -1.0);
        assert!(state.mute);

        render(&mut driver, 16);
        let part = driver.part(PartId::A);
        assert_eq!(part.volume(), 0.5);
        assert_eq!(part.pan(), -1.0);
        assert!(part.is_muted());
    }

    #[test]
    fn test_unsupported_capability_ignored() {
        let (mut manager, mut driver) = setup(16);
        manager.assign_engine("D", Box::new(Bare)).unwrap();
        {
            let mut part = manager.get_part("d").unwrap();
            assert!(!part.supports_frequency());
            assert!(part.set_frequency(100.0).is_ok());
            assert!(part.set_amplitude(0.0).is_ok());
        }
        // No engine at all is also a quiet no-op
        assert!(manager.set_param("C", "frequency", 100.0).is_ok());

        // panic cannot silence an engine without an amplitude control
        manager.panic().unwrap();
        let (left, _) = render(&mut driver, 8);
        assert!(left.iter().all(|&s| (s - 0.1).abs() < 1e-6));
    }

    #[test]
    fn test_queue_full_reported() {
        let (mut manager, _driver) = setup(2);
        manager.set_param("A", "volume", 0.1).unwrap();
        manager.set_param("A", "volume", 0.2).unwrap();
        assert_eq!(manager.set_param("A", "volume", 0.3), Err(EngineError::QueueFull));
        // the mirror keeps the last value that was actually sent
        assert_eq!(manager.state(PartId::A).volume, 0.2);
    }

    #[test]
    fn test_faults_drained() {
        struct Nan;
        impl SynthEngine for Nan {
            fn kind(&self) -> EngineKind {
                EngineKind::Oscillator
            }
            fn process(&mut self, out: &mut [f32]) {
                out.fill(f32::NAN);
            }
        }

        let (mut manager, mut driver) = setup(16);
        manager.assign_engine("C", Box::new(Nan)).unwrap();
        render(&mut driver, 32);
        render(&mut driver, 32);

        let faults = manager.drain_faults();
        assert_eq!(faults.len(), 2);
        assert!(faults
            .iter()
            .all(|f| f.part == PartId::C && f.kind == FaultKind::NonFiniteOutput));
        assert!(manager.drain_faults().is_empty());

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.blocks_rendered, 2);
        assert_eq!(snapshot.faults, 2);
    }

    #[test]
    fn test_stale_panic_fault_keeps_new_engine() {
        struct Boom;
        impl SynthEngine for Boom {
            fn kind(&self) -> EngineKind {
                EngineKind::Granular
            }
            fn process(&mut self, _out: &mut [f32]) {
                panic!("boom");
            }
        }

        let (mut manager, mut driver) = setup(16);
        manager.assign_engine("B", Box::new(Boom)).unwrap();
        render(&mut driver, 32);

        // reassigned before the fault report is read
        manager
            .assign_engine("B", Box::new(Oscillator::new(48000, 220.0, 0.3)))
            .unwrap();
        render(&mut driver, 32);

        let faults = manager.drain_faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].kind, FaultKind::EnginePanicked);
        assert_eq!(faults[0].generation, 1);

        assert_eq!(
            driver.part(PartId::B).engine().map(|e| e.kind()),
            Some(EngineKind::Oscillator)
        );
        assert_eq!(manager.state(PartId::B).engine, Some(EngineKind::Oscillator));
        manager.set_param("B", "frequency", 330.0).unwrap();
        assert_eq!(manager.state(PartId::B).frequency, Some(330.0));
    }

    #[test]
    fn test_current_panic_fault_clears_mirror() {
        struct Boom;
        impl SynthEngine for Boom {
            fn kind(&self) -> EngineKind {
                EngineKind::Granular
            }
            fn process(&mut self, _out: &mut [f32]) {
                panic!("boom");
            }
        }

        let (mut manager, mut driver) = setup(16);
        manager.assign_engine("C", Box::new(Boom)).unwrap();
        render(&mut driver, 32);

        manager.drain_faults();
        assert_eq!(manager.state(PartId::C).engine, None);
        assert!(!manager.get_part("C").unwrap().supports_amplitude());
    }

    #[test]
    fn test_snapshot_serializes() {
        let (mut manager, _driver) = setup(16);
        manager.assign_engine("A", Box::new(Granular::with_seed(48000, 0.5, 1))).unwrap();
        let json = serde_json::to_string(&manager.snapshot()).unwrap();
        assert!(json.contains("\"engine\":\"granular\""));
        assert!(json.contains("\"id\":\"A\""));
    }
}
