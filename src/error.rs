//! Error types for the synthesis core
//!
//! Application-level code (CLI, config files, audio devices) uses `anyhow`;
//! everything the control surface calls into returns [`EngineError`].

use thiserror::Error;

/// Errors raised by the engine manager and the per-part pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Part identifier outside A-D
    #[error("Invalid part ID: {0}")]
    InvalidIdentifier(String),

    /// Parameter setter requested on an engine that does not implement it
    #[error("Part {part} engine does not support {capability}")]
    UnsupportedCapability {
        part: char,
        capability: &'static str,
    },

    /// Parameter name not recognised by the router
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// Unknown engine type name
    #[error("Unknown engine type: {0}")]
    UnknownEngine(String),

    /// The command queue to the audio thread is saturated
    #[error("Command queue is full")]
    QueueFull,

    /// An engine produced NaN or infinite samples for a block
    #[error("Part {part} produced non-finite output")]
    NonFiniteOutput { part: char },
}

/// Convenience Result type using [`EngineError`]
pub type Result<T> = std::result::Result<T, EngineError>;
