//! Messages crossing between the control side and the audio thread
//!
//! Three single-producer/single-consumer ring buffers connect the two:
//! commands flow to the audio thread, retired engines and fault reports
//! flow back. None of them block either side.

use rtrb::{Consumer, Producer, RingBuffer};

use super::part::PartId;
use crate::synth::SynthEngine;

/// A control change applied by the audio thread at the start of a block
pub enum PartCommand {
    SetFrequency { part: PartId, value: f32 },
    SetAmplitude { part: PartId, value: f32 },
    SetVolume { part: PartId, value: f32 },
    SetPan { part: PartId, value: f32 },
    SetMute { part: PartId, muted: bool },
    /// `generation` counts assignments to this part, starting from 1
    AssignEngine {
        part: PartId,
        engine: Box<dyn SynthEngine>,
        generation: u64,
    },
    ClearEngine { part: PartId },
    Panic,
}

/// What went wrong while rendering a part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The engine produced NaN or infinite samples
    NonFiniteOutput,
    /// The engine panicked and was retired
    EnginePanicked,
    /// The reclamation queue was full; an engine was dropped on the audio thread
    ReclaimOverflow,
}

/// A per-block failure reported by the audio thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    pub part: PartId,
    pub kind: FaultKind,
    /// Block counter at the time of the failure
    pub block: u64,
    /// Assignment generation of the engine that failed (0 for the engine
    /// the part was built with)
    pub generation: u64,
}

/// Audio-thread ends of the queues
pub struct AudioChannels {
    pub commands: Consumer<PartCommand>,
    pub retired: Producer<Box<dyn SynthEngine>>,
    pub faults: Producer<Fault>,
}

/// Control-side ends of the queues
pub struct ControlChannels {
    pub commands: Producer<PartCommand>,
    pub retired: Consumer<Box<dyn SynthEngine>>,
    pub faults: Consumer<Fault>,
}

/// Create connected queue ends with room for `capacity` pending commands
pub fn channels(capacity: usize) -> (ControlChannels, AudioChannels) {
    let capacity = capacity.max(1);
    let (command_tx, command_rx) = RingBuffer::new(capacity);
    // Every command retires at most one engine, and a panicking part one more
    let (retired_tx, retired_rx) = RingBuffer::new(capacity + PartId::ALL.len());
    let (fault_tx, fault_rx) = RingBuffer::new(capacity);

    (
        ControlChannels {
            commands: command_tx,
            retired: retired_rx,
            faults: fault_rx,
        },
        AudioChannels {
            commands: command_rx,
            retired: retired_tx,
            faults: fault_tx,
        },
    )
}
