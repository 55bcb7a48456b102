//! Audio callback driver
//!
//! Runs on the real-time audio thread. Each block it applies pending control
//! commands, renders the four parts in order A-D, sums them, and clamps the
//! mix with a hard safety limiter. It never locks and never logs; failures
//! go back to the control side through the fault queue.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};

use super::command::{AudioChannels, Fault, FaultKind, PartCommand};
use super::part::{Part, PartId};
use crate::synth::SynthEngine;

/// Output is clamped to [-LIMITER_CEILING, LIMITER_CEILING]
pub const LIMITER_CEILING: f32 = 0.95;

thread_local! {
    /// Set while part engines run on this thread
    static RENDERING: Cell<bool> = const { Cell::new(false) };
}

static PANIC_HOOK: Once = Once::new();

/// Keep engine panics caught by the driver from reaching the panic hook
///
/// The default hook prints and allocates, which the audio thread must not
/// do. Panics anywhere else still go to the previous hook.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if !is_rendering() {
                previous(info);
            }
        }));
    });
}

fn is_rendering() -> bool {
    RENDERING.with(|r| r.get())
}

/// Counters shared with the control side
#[derive(Debug, Default)]
pub struct DriverStats {
    blocks: AtomicU64,
    faults: AtomicU64,
    lost_reports: AtomicU64,
}

impl DriverStats {
    /// Completed callback invocations
    pub fn blocks_rendered(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    /// Per-block part failures since startup
    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    /// Fault reports dropped because the fault queue was full
    pub fn lost_reports(&self) -> u64 {
        self.lost_reports.load(Ordering::Relaxed)
    }
}

/// Pulls the four parts into a limited stereo mix once per hardware block
pub struct AudioCallbackDriver {
    parts: [Part; 4],
    channels: AudioChannels,
    part_left: Vec<f32>,
    part_right: Vec<f32>,
    mix_left: Vec<f32>,
    mix_right: Vec<f32>,
    max_block: usize,
    generations: [u64; 4],
    stats: Arc<DriverStats>,
}

impl AudioCallbackDriver {
    /// Create a driver; blocks longer than `max_block` frames are rendered in chunks
    pub fn new(parts: [Part; 4], channels: AudioChannels, max_block: usize) -> Self {
        let max_block = max_block.max(1);
        Self {
            parts,
            channels,
            part_left: vec![0.0; max_block],
            part_right: vec![0.0; max_block],
            mix_left: vec![0.0; max_block],
            mix_right: vec![0.0; max_block],
            max_block,
            generations: [0; 4],
            stats: Arc::new(DriverStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<DriverStats> {
        Arc::clone(&self.stats)
    }

    pub fn part(&self, id: PartId) -> &Part {
        &self.parts[id.index()]
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }

    /// Render `left.len()` frames into separate channel buffers
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len());
        self.apply_pending();

        let mut offset = 0;
        while offset < left.len() {
            let n = (left.len() - offset).min(self.max_block);
            self.render_chunk(n);
            left[offset..offset + n].copy_from_slice(&self.mix_left[..n]);
            right[offset..offset + n].copy_from_slice(&self.mix_right[..n]);
            offset += n;
        }
        self.stats.blocks.fetch_add(1, Ordering::Relaxed);
    }

    /// Fill an interleaved device buffer with `channels` channels per frame
    ///
    /// Mono devices receive the average of left and right; channels past the
    /// second are silent.
    pub fn deliver(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        self.apply_pending();

        let mut remaining = out.len().div_ceil(channels);
        let mut frames = out.chunks_mut(channels);
        while remaining > 0 {
            let n = remaining.min(self.max_block);
            self.render_chunk(n);
            for (i, frame) in frames.by_ref().take(n).enumerate() {
                let (l, r) = (self.mix_left[i], self.mix_right[i]);
                match frame {
                    [mono] => *mono = 0.5 * (l + r),
                    [left, right, rest @ ..] => {
                        *left = l;
                        *right = r;
                        rest.fill(0.0);
                    }
                    [] => {}
                }
            }
            remaining -= n;
        }
        self.stats.blocks.fetch_add(1, Ordering::Relaxed);
    }

    /// Apply every command queued before this block started
    pub fn apply_pending(&mut self) {
        let pending = self.channels.commands.slots();
        for _ in 0..pending {
            match self.channels.commands.pop() {
                Ok(command) => self.apply(command),
                Err(_) => break,
            }
        }
    }

    fn apply(&mut self, command: PartCommand) {
        match command {
            PartCommand::SetFrequency { part, value } => {
                if let Some(cap) = self.parts[part.index()]
                    .engine_mut()
                    .and_then(|e| e.as_frequency())
                {
                    cap.set_frequency(value);
                }
            }
            PartCommand::SetAmplitude { part, value } => {
                if let Some(cap) = self.parts[part.index()]
                    .engine_mut()
                    .and_then(|e| e.as_amplitude())
                {
                    cap.set_amplitude(value);
                }
            }
            PartCommand::SetVolume { part, value } => self.parts[part.index()].set_volume(value),
            PartCommand::SetPan { part, value } => self.parts[part.index()].set_pan(value),
            PartCommand::SetMute { part, muted } => self.parts[part.index()].set_mute(muted),
            PartCommand::AssignEngine {
                part,
                engine,
                generation,
            } => {
                if let Some(old) = self.parts[part.index()].assign_engine(engine) {
                    self.retire(part, old);
                }
                self.generations[part.index()] = generation;
            }
            PartCommand::ClearEngine { part } => {
                if let Some(old) = self.parts[part.index()].take_engine() {
                    self.retire(part, old);
                }
            }
            PartCommand::Panic => {
                for part in &mut self.parts {
                    if let Some(cap) = part.engine_mut().and_then(|e| e.as_amplitude()) {
                        cap.set_amplitude(0.0);
                    }
                }
            }
        }
    }

    fn render_chunk(&mut self, n: usize) {
        self.mix_left[..n].fill(0.0);
        self.mix_right[..n].fill(0.0);

        for id in PartId::ALL {
            let left = &mut self.part_left[..n];
            let right = &mut self.part_right[..n];
            let part = &mut self.parts[id.index()];

            RENDERING.with(|r| r.set(true));
            let result = catch_unwind(AssertUnwindSafe(|| part.process(left, right)));
            RENDERING.with(|r| r.set(false));

            match result {
                Ok(Ok(())) => {
                    for (m, s) in self.mix_left[..n].iter_mut().zip(left.iter()) {
                        *m += s;
                    }
                    for (m, s) in self.mix_right[..n].iter_mut().zip(right.iter()) {
                        *m += s;
                    }
                }
                Ok(Err(_)) => {
                    self.report(id, FaultKind::NonFiniteOutput);
                }
                Err(_) => {
                    // State after a panic is unknown; the part stays silent
                    // until a new engine is assigned
                    if let Some(engine) = self.parts[id.index()].take_engine() {
                        self.retire(id, engine);
                    }
                    self.report(id, FaultKind::EnginePanicked);
                }
            }
        }

        for s in self.mix_left[..n].iter_mut().chain(self.mix_right[..n].iter_mut()) {
            *s = s.clamp(-LIMITER_CEILING, LIMITER_CEILING);
        }
    }

    /// Hand a replaced engine back to the control side for dropping
    fn retire(&mut self, part: PartId, engine: Box<dyn SynthEngine>) {
        if let Err(rtrb::PushError::Full(engine)) = self.channels.retired.push(engine) {
            drop(engine);
            self.report(part, FaultKind::ReclaimOverflow);
        }
    }

    fn report(&mut self, part: PartId, kind: FaultKind) {
        self.stats.faults.fetch_add(1, Ordering::Relaxed);
        let fault = Fault {
            part,
            kind,
            block: self.stats.blocks.load(Ordering::Relaxed),
            generation: self.generations[part.index()],
        };
        if self.channels.faults.push(fault).is_err() {
            self.stats.lost_reports.fetch_add(1, Ordering::Relaxed);
        }
    }
}
