//! Audio engine for Locus
//!
//! Wires the four parts, the control-side manager and the audio-thread
//! driver together, and hands the driver to an output device or renders
//! offline.

mod command;
mod driver;
mod manager;
mod part;
pub mod player;
pub mod recorder;

pub use command::{channels, AudioChannels, ControlChannels, Fault, FaultKind, PartCommand};
pub use driver::{install_panic_hook, AudioCallbackDriver, DriverStats, LIMITER_CEILING};
pub use manager::{EngineManager, PartControl, PartState, Snapshot};
pub use part::{pan_gains, Part, PartId};
pub use player::Player;
pub use recorder::Recorder;

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use crate::config::{LocusConfig, PartConfig};
use crate::synth::build_engine;

/// A running (or ready to run) engine
pub struct Session {
    manager: EngineManager,
    driver: Option<AudioCallbackDriver>,
    player: Option<Player>,
    device: Option<String>,
}

impl Session {
    /// Build the parts and their engines from configuration
    pub fn new(config: &LocusConfig) -> Self {
        let audio = &config.audio;
        let parts = PartId::ALL.map(|id| {
            build_part(
                id,
                config.part(id),
                audio.sample_rate,
                audio.block_size,
                config.granular.buffer_duration,
            )
        });
        let mut states = parts.each_ref().map(PartState::of);
        for state in states.iter_mut() {
            let Some(part) = config.part(state.id) else {
                continue;
            };
            if state.supports_frequency {
                state.frequency = part.frequency;
            }
            if state.supports_amplitude {
                state.amplitude = part.amplitude;
            }
        }

        let (control, audio_side) = channels(audio.command_capacity);
        let driver = AudioCallbackDriver::new(parts, audio_side, audio.block_size);
        let manager = EngineManager::new(
            states,
            control,
            driver.stats(),
            audio.sample_rate,
            audio.block_size,
        );

        info!(
            "Session ready: {} Hz, {} frame blocks",
            audio.sample_rate, audio.block_size
        );

        Self {
            manager,
            driver: Some(driver),
            player: None,
            device: audio.device.clone(),
        }
    }

    pub fn manager(&self) -> &EngineManager {
        &self.manager
    }

    /// Control entry point
    pub fn manager_mut(&mut self) -> &mut EngineManager {
        &mut self.manager
    }

    /// Check if the output stream is running
    pub fn is_running(&self) -> bool {
        self.player.as_ref().is_some_and(|p| p.is_playing())
    }

    /// Move the driver into an output stream and start playback
    pub fn start(&mut self) -> Result<()> {
        install_panic_hook();
        let Some(driver) = self.driver.take() else {
            bail!("session has already been started");
        };
        let mut player = Player::new(
            self.manager.sample_rate(),
            self.manager.block_size() as u32,
            self.device.clone(),
        );
        player.start(driver)?;
        self.player = Some(player);
        Ok(())
    }

    /// Stop playback
    ///
    /// The driver goes down with the stream, so a stopped session cannot be
    /// restarted.
    pub fn stop(&mut self) {
        if let Some(mut player) = self.player.take() {
            player.stop();
            info!("Playback stopped");
        }
    }

    /// Render the next frames directly, without an output device
    pub fn render_offline(&mut self, left: &mut [f32], right: &mut [f32]) -> Result<()> {
        match self.driver.as_mut() {
            Some(driver) => {
                driver.render(left, right);
                Ok(())
            }
            None => bail!("session is streaming to a device"),
        }
    }
}

/// Build a part and its engine from its configuration
fn build_part(
    id: PartId,
    config: Option<&PartConfig>,
    sample_rate: u32,
    block_size: usize,
    buffer_duration: f32,
) -> Part {
    let mut part = Part::new(id);
    let Some(config) = config else {
        debug!("Part {} left empty", id);
        return part;
    };

    if let Some(kind) = config.engine {
        let mut engine = build_engine(kind, sample_rate, buffer_duration);
        if let Some(frequency) = config.frequency {
            match engine.as_frequency() {
                Some(cap) => cap.set_frequency(frequency),
                None => warn!("Part {} ({}) has no frequency control", id, kind),
            }
        }
        if let Some(amplitude) = config.amplitude {
            match engine.as_amplitude() {
                Some(cap) => cap.set_amplitude(amplitude),
                None => warn!("Part {} ({}) has no amplitude control", id, kind),
            }
        }
        engine.prepare(block_size);
        part.assign_engine(engine);
        info!("Part {}: {}", id, kind);
    }

    part.set_volume(config.volume);
    part.set_pan(config.pan);
    part.set_mute(config.mute);
    part
}
