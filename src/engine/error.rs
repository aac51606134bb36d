use crate::engine::types::{EncoderKind, SourceKind};
use thiserror::Error;

/// Engine-facing error taxonomy.
///
/// Bring-up maps these onto the stage that raised them; the module loader
/// recovers `ModuleLoad` locally unless strict mode is requested.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine installation not found: {0}")]
    NotFound(String),

    #[error("module discovery failed: {0}")]
    Discovery(String),

    #[error("module '{module}' failed to load: {reason}")]
    ModuleLoad { module: String, reason: String },

    #[error("batch load aborted on module '{module}': {reason}")]
    BatchLoad { module: String, reason: String },

    #[error("failed to initialize engine instance: {0}")]
    Instance(String),

    #[error("audio configuration rejected: {0}")]
    AudioConfig(String),

    #[error("video configuration rejected: {0}")]
    VideoConfig(String),

    #[error("video subsystem is already configured for this instance")]
    AlreadyConfigured,

    #[error("failed to create {kind} encoder: {reason}")]
    EncoderCreate { kind: EncoderKind, reason: String },

    #[error("failed to create {kind} source on channel {channel}: {reason}")]
    SourceCreate {
        kind: SourceKind,
        channel: u32,
        reason: String,
    },

    #[error("failed to create output: {0}")]
    OutputCreate(String),

    #[error("failed to start output: {0}")]
    OutputStart(String),
}
