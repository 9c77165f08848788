//! Error types for mapscript.

use thiserror::Error;

use crate::script::value::ConversionError;

/// Common error type for mapscript.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for host-supplied input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Malformed script source.
    #[error("compile error in {chunk}: {message}")]
    Compile { chunk: String, message: String },

    /// Fault raised while a script was running.
    ///
    /// Interpreter faults never cross the boundary raw; they are always
    /// converted into this variant with whatever trace could be captured.
    #[error("runtime error: {message}")]
    Runtime {
        message: String,
        traceback: Option<String>,
    },

    /// A plugin broke its declared contract.
    #[error("plugin contract violation: {0}")]
    Contract(String),

    /// A value could not cross the boundary.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// A module import could not be resolved.
    #[error("module '{name}' not found (tried: {})", .tried.join(", "))]
    Module { name: String, tried: Vec<String> },

    /// A wrapper handle from an earlier registry generation.
    #[error("stale wrapper handle {index} (generation {generation}, registry is at {current})")]
    StaleHandle {
        index: u32,
        generation: u32,
        current: u32,
    },

    /// The runtime context failed to initialize and cannot be used.
    #[error("script runtime unusable: {0}")]
    Unusable(String),
}

/// Result type alias for mapscript operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
