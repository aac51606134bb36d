//! Collaborator interface consumed from the external media engine.
//!
//! The bring-up sequencer and lifecycle controller are written against these
//! traits only; any engine (real installation or the built-in simulator) can
//! sit behind them.

use crate::engine::error::EngineError;
use crate::engine::module::ModuleDescriptor;
use crate::engine::settings::Settings;
use crate::engine::types::{AudioConfig, EncoderKind, SourceKind, VideoConfig};
use async_trait::async_trait;
use std::path::PathBuf;

/// Instance creation policy flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceOptions {
    /// Shut the engine down when the instance is dropped. The only cleanup
    /// guaranteed on abrupt worker termination.
    pub shutdown_on_dispose: bool,
}

impl Default for InstanceOptions {
    fn default() -> Self {
        Self {
            shutdown_on_dispose: true,
        }
    }
}

/// Reference to an encoder owned by the engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderHandle {
    pub kind: EncoderKind,
    pub type_id: String,
    pub name: String,
}

/// Reference to a capture source owned by the engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHandle {
    pub kind: SourceKind,
    pub type_id: String,
    pub name: String,
    pub channel: u32,
}

/// Entry point of an engine implementation.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Locate the engine installation on disk.
    async fn find_installation(&self, search_system_paths: bool) -> Result<PathBuf, EngineError>;

    /// Initialize one engine session. Engines backed by a process-wide
    /// singleton fail here when an instance is already live.
    async fn create_instance(
        &self,
        locale: &str,
        options: InstanceOptions,
    ) -> Result<Box<dyn EngineInstance>, EngineError>;
}

/// One configured engine session; exclusive owner of every object it creates.
///
/// All calls are serialized through the single owner, the worker task.
#[async_trait]
pub trait EngineInstance: Send {
    async fn enumerate_modules(&mut self) -> Result<Vec<ModuleDescriptor>, EngineError>;

    /// Load one module into process-wide engine state. Batch semantics
    /// (exclusion, partitioning, strict mode) live in the module loader.
    async fn load_module(&mut self, module: &ModuleDescriptor) -> Result<(), EngineError>;

    async fn reset_audio(&mut self, config: &AudioConfig) -> Result<(), EngineError>;

    async fn reset_video(&mut self, config: &VideoConfig) -> Result<(), EngineError>;

    async fn create_encoder(
        &mut self,
        kind: EncoderKind,
        type_id: &str,
        name: &str,
        settings: Settings,
    ) -> Result<EncoderHandle, EngineError>;

    async fn create_source(
        &mut self,
        kind: SourceKind,
        type_id: &str,
        name: &str,
        channel: u32,
        settings: Settings,
    ) -> Result<SourceHandle, EngineError>;

    async fn create_output(
        &mut self,
        type_id: &str,
        name: &str,
        settings: Settings,
    ) -> Result<Box<dyn EngineOutput>, EngineError>;

    // Introspection only.
    fn list_encoder_types(&self) -> Vec<String>;
    fn list_output_types(&self) -> Vec<String>;
    fn list_source_types(&self) -> Vec<String>;

    /// Tear the session down, releasing everything it owns.
    async fn shutdown(&mut self);
}

/// An active stream/record sink bound to encoders.
///
/// Legality of pause/resume/stop is NOT checked here; the lifecycle
/// controller owns the state machine and calls these exactly once per
/// accepted command.
#[async_trait]
pub trait EngineOutput: Send {
    async fn start(
        &mut self,
        video_encoder: &EncoderHandle,
        audio_encoder: &EncoderHandle,
    ) -> Result<(), EngineError>;

    async fn pause(&mut self) -> Result<(), EngineError>;

    async fn resume(&mut self) -> Result<(), EngineError>;

    async fn stop(&mut self) -> Result<(), EngineError>;
}
