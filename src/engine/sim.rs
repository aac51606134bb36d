//! Built-in simulated engine.
//!
//! A portable, in-process implementation of the collaborator traits so the
//! supervisor/worker pair runs end-to-end without a real engine installation.
//! Type strings are validated against a fixed module catalog; failures can be
//! injected per module name or per bring-up stage, which is what the
//! sequencer and controller tests drive.

use crate::engine::error::EngineError;
use crate::engine::module::ModuleDescriptor;
use crate::engine::settings::Settings;
use crate::engine::traits::{
    EncoderHandle, EngineInstance, EngineOutput, InstanceOptions, MediaEngine, SourceHandle,
};
use crate::engine::types::{AudioConfig, EncoderKind, SourceKind, VideoConfig};
use async_trait::async_trait;
use log::{debug, info};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Stage at which an injected failure fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFailure {
    Discovery,
    Instance,
    AudioReset,
    VideoReset,
    Encoder(EncoderKind),
    Source(SourceKind),
    OutputCreate,
    OutputStart,
}

/// Module catalog: name plus the type strings the module provides once loaded.
struct CatalogEntry {
    name: &'static str,
    video_encoders: &'static [&'static str],
    audio_encoders: &'static [&'static str],
    video_sources: &'static [&'static str],
    audio_sources: &'static [&'static str],
    outputs: &'static [&'static str],
}

const E: &[&str] = &[];

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry { name: "obs-x264", video_encoders: &["obs_x264"], audio_encoders: E, video_sources: E, audio_sources: E, outputs: E },
    CatalogEntry { name: "obs-nvenc", video_encoders: &["jim_nvenc"], audio_encoders: E, video_sources: E, audio_sources: E, outputs: E },
    CatalogEntry { name: "obs-qsv11", video_encoders: &["obs_qsv11"], audio_encoders: E, video_sources: E, audio_sources: E, outputs: E },
    CatalogEntry { name: "obs-ffmpeg", video_encoders: E, audio_encoders: &["ffmpeg_aac", "ffmpeg_opus"], video_sources: E, audio_sources: E, outputs: &["ffmpeg_muxer", "ffmpeg_output"] },
    CatalogEntry { name: "coreaudio-encoder", video_encoders: E, audio_encoders: &["CoreAudio_AAC"], video_sources: E, audio_sources: E, outputs: E },
    CatalogEntry { name: "obs-outputs", video_encoders: E, audio_encoders: E, video_sources: E, audio_sources: E, outputs: &["flv_output", "rtmp_output"] },
    CatalogEntry { name: "win-capture", video_encoders: E, audio_encoders: E, video_sources: &["monitor_capture", "window_capture", "game_capture"], audio_sources: E, outputs: E },
    CatalogEntry { name: "win-wasapi", video_encoders: E, audio_encoders: E, video_sources: E, audio_sources: &["wasapi_output_capture", "wasapi_input_capture"], outputs: E },
    CatalogEntry { name: "image-source", video_encoders: E, audio_encoders: E, video_sources: &["image_source"], audio_sources: E, outputs: E },
    CatalogEntry { name: "vlc-video", video_encoders: E, audio_encoders: E, video_sources: &["vlc_source"], audio_sources: E, outputs: E },
    CatalogEntry { name: "obs-filters", video_encoders: E, audio_encoders: E, video_sources: E, audio_sources: E, outputs: E },
    CatalogEntry { name: "rtmp-services", video_encoders: E, audio_encoders: E, video_sources: E, audio_sources: E, outputs: E },
    CatalogEntry { name: "frontend-tools", video_encoders: E, audio_encoders: E, video_sources: E, audio_sources: E, outputs: E },
    CatalogEntry { name: "obs-websocket", video_encoders: E, audio_encoders: E, video_sources: E, audio_sources: E, outputs: E },
    CatalogEntry { name: "win-mf", video_encoders: E, audio_encoders: E, video_sources: E, audio_sources: E, outputs: E },
    CatalogEntry { name: "decklink", video_encoders: E, audio_encoders: E, video_sources: E, audio_sources: E, outputs: E },
];

/// Simulated media engine. Clones share the singleton guard.
#[derive(Clone)]
pub struct SimEngine {
    missing_installation: bool,
    unloadable: HashSet<String>,
    failure: Option<SimFailure>,
    active: Arc<AtomicBool>,
}

impl SimEngine {
    pub fn new() -> Self {
        Self {
            missing_installation: false,
            unloadable: HashSet::new(),
            failure: None,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Pretend the engine is not installed at all.
    pub fn with_missing_installation(mut self) -> Self {
        self.missing_installation = true;
        self
    }

    /// Mark one module as deliberately unloadable.
    pub fn with_unloadable_module(mut self, name: impl Into<String>) -> Self {
        self.unloadable.insert(name.into());
        self
    }

    /// Inject a failure at the given stage.
    pub fn with_failure(mut self, failure: SimFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Clone sharing the singleton guard, with all failure injection removed.
    pub fn recovered(&self) -> Self {
        Self {
            missing_installation: false,
            unloadable: HashSet::new(),
            failure: None,
            active: self.active.clone(),
        }
    }
}

impl Default for SimEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaEngine for SimEngine {
    async fn find_installation(&self, search_system_paths: bool) -> Result<PathBuf, EngineError> {
        if self.missing_installation {
            return Err(EngineError::NotFound(
                "no engine installation on this machine".to_string(),
            ));
        }
        debug!(
            "sim engine installation resolved (system paths: {})",
            search_system_paths
        );
        Ok(PathBuf::from("sim-engine"))
    }

    async fn create_instance(
        &self,
        locale: &str,
        options: InstanceOptions,
    ) -> Result<Box<dyn EngineInstance>, EngineError> {
        if self.failure == Some(SimFailure::Instance) {
            return Err(EngineError::Instance(
                "engine runtime refused to start".to_string(),
            ));
        }
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(EngineError::Instance(
                "an engine instance is already live in this process".to_string(),
            ));
        }

        info!("sim engine instance created (locale '{locale}')");
        Ok(Box::new(SimInstance {
            locale: locale.to_string(),
            options,
            unloadable: self.unloadable.clone(),
            failure: self.failure,
            loaded: HashSet::new(),
            video_configured: false,
            used_channels: HashSet::new(),
            active: self.active.clone(),
            shut_down: false,
        }))
    }
}

struct SimInstance {
    locale: String,
    options: InstanceOptions,
    unloadable: HashSet<String>,
    failure: Option<SimFailure>,
    loaded: HashSet<String>,
    video_configured: bool,
    used_channels: HashSet<(SourceKind, u32)>,
    active: Arc<AtomicBool>,
    shut_down: bool,
}

impl SimInstance {
    fn loaded_entries(&self) -> impl Iterator<Item = &'static CatalogEntry> + '_ {
        CATALOG
            .iter()
            .filter(|entry| self.loaded.contains(entry.name))
    }

    fn encoder_types(&self, kind: EncoderKind) -> Vec<String> {
        self.loaded_entries()
            .flat_map(|entry| match kind {
                EncoderKind::Video => entry.video_encoders,
                EncoderKind::Audio => entry.audio_encoders,
            })
            .map(|t| t.to_string())
            .collect()
    }

    fn source_types(&self, kind: SourceKind) -> Vec<String> {
        self.loaded_entries()
            .flat_map(|entry| match kind {
                SourceKind::Video => entry.video_sources,
                SourceKind::Audio => entry.audio_sources,
            })
            .map(|t| t.to_string())
            .collect()
    }

    fn output_types(&self) -> Vec<String> {
        self.loaded_entries()
            .flat_map(|entry| entry.outputs)
            .map(|t| t.to_string())
            .collect()
    }
}

#[async_trait]
impl EngineInstance for SimInstance {
    async fn enumerate_modules(&mut self) -> Result<Vec<ModuleDescriptor>, EngineError> {
        if self.failure == Some(SimFailure::Discovery) {
            return Err(EngineError::Discovery(
                "engine module directory is not readable".to_string(),
            ));
        }
        Ok(CATALOG
            .iter()
            .map(|entry| {
                ModuleDescriptor::new(
                    entry.name,
                    format!("sim-engine/plugins/{}", entry.name),
                    format!("sim-engine/data/{}", entry.name),
                )
            })
            .collect())
    }

    async fn load_module(&mut self, module: &ModuleDescriptor) -> Result<(), EngineError> {
        if CATALOG.iter().all(|entry| entry.name != module.name) {
            return Err(EngineError::ModuleLoad {
                module: module.name.clone(),
                reason: "unknown module".to_string(),
            });
        }
        if self.unloadable.contains(&module.name) {
            return Err(EngineError::ModuleLoad {
                module: module.name.clone(),
                reason: "failed to open module binary".to_string(),
            });
        }
        self.loaded.insert(module.name.clone());
        Ok(())
    }

    async fn reset_audio(&mut self, config: &AudioConfig) -> Result<(), EngineError> {
        if self.failure == Some(SimFailure::AudioReset) {
            return Err(EngineError::AudioConfig(
                "audio backend rejected the configuration".to_string(),
            ));
        }
        if config.samples_per_sec == 0 || config.max_buffering_ms == 0 {
            return Err(EngineError::AudioConfig(format!(
                "unsupported combination: {} Hz, {} ms buffering",
                config.samples_per_sec, config.max_buffering_ms
            )));
        }
        info!(
            "audio reset: {} Hz, {:?}, max buffering {} ms",
            config.samples_per_sec, config.speakers, config.max_buffering_ms
        );
        Ok(())
    }

    async fn reset_video(&mut self, config: &VideoConfig) -> Result<(), EngineError> {
        if self.video_configured {
            return Err(EngineError::AlreadyConfigured);
        }
        if self.failure == Some(SimFailure::VideoReset) {
            return Err(EngineError::VideoConfig(
                "graphics backend failed to initialize".to_string(),
            ));
        }
        if config.base_width == 0
            || config.base_height == 0
            || config.output_width == 0
            || config.output_height == 0
            || config.fps.den == 0
        {
            return Err(EngineError::VideoConfig(format!(
                "invalid geometry {}x{} -> {}x{} @ {}",
                config.base_width,
                config.base_height,
                config.output_width,
                config.output_height,
                config.fps
            )));
        }
        self.video_configured = true;
        info!(
            "video reset: {}x{} -> {}x{} @ {} on {:?}",
            config.base_width,
            config.base_height,
            config.output_width,
            config.output_height,
            config.fps,
            config.graphics_backend
        );
        Ok(())
    }

    async fn create_encoder(
        &mut self,
        kind: EncoderKind,
        type_id: &str,
        name: &str,
        settings: Settings,
    ) -> Result<EncoderHandle, EngineError> {
        if self.failure == Some(SimFailure::Encoder(kind)) {
            return Err(EngineError::EncoderCreate {
                kind,
                reason: format!("encoder '{type_id}' failed to initialize"),
            });
        }
        if kind == EncoderKind::Video && !self.video_configured {
            return Err(EngineError::EncoderCreate {
                kind,
                reason: "video subsystem is not configured".to_string(),
            });
        }
        if !self.encoder_types(kind).iter().any(|t| t == type_id) {
            return Err(EngineError::EncoderCreate {
                kind,
                reason: format!("unknown encoder type '{type_id}'"),
            });
        }
        debug!("{kind} encoder '{name}' ({type_id}) created with {settings}");
        Ok(EncoderHandle {
            kind,
            type_id: type_id.to_string(),
            name: name.to_string(),
        })
    }

    async fn create_source(
        &mut self,
        kind: SourceKind,
        type_id: &str,
        name: &str,
        channel: u32,
        settings: Settings,
    ) -> Result<SourceHandle, EngineError> {
        if self.failure == Some(SimFailure::Source(kind)) {
            return Err(EngineError::SourceCreate {
                kind,
                channel,
                reason: format!("source '{type_id}' failed to initialize"),
            });
        }
        if !self.source_types(kind).iter().any(|t| t == type_id) {
            return Err(EngineError::SourceCreate {
                kind,
                channel,
                reason: format!("unknown source type '{type_id}'"),
            });
        }
        if !self.used_channels.insert((kind, channel)) {
            return Err(EngineError::SourceCreate {
                kind,
                channel,
                reason: "channel already bound".to_string(),
            });
        }
        debug!("{kind} source '{name}' ({type_id}) bound to channel {channel} with {settings}");
        Ok(SourceHandle {
            kind,
            type_id: type_id.to_string(),
            name: name.to_string(),
            channel,
        })
    }

    async fn create_output(
        &mut self,
        type_id: &str,
        name: &str,
        settings: Settings,
    ) -> Result<Box<dyn EngineOutput>, EngineError> {
        if self.failure == Some(SimFailure::OutputCreate) {
            return Err(EngineError::OutputCreate(format!(
                "output '{type_id}' failed to initialize"
            )));
        }
        if !self.output_types().iter().any(|t| t == type_id) {
            return Err(EngineError::OutputCreate(format!(
                "unknown output type '{type_id}'"
            )));
        }
        debug!("output '{name}' ({type_id}) created with {settings}");
        Ok(Box::new(SimOutput {
            name: name.to_string(),
            fail_start: self.failure == Some(SimFailure::OutputStart),
        }))
    }

    fn list_encoder_types(&self) -> Vec<String> {
        let mut types = self.encoder_types(EncoderKind::Video);
        types.extend(self.encoder_types(EncoderKind::Audio));
        types
    }

    fn list_output_types(&self) -> Vec<String> {
        self.output_types()
    }

    fn list_source_types(&self) -> Vec<String> {
        let mut types = self.source_types(SourceKind::Video);
        types.extend(self.source_types(SourceKind::Audio));
        types
    }

    async fn shutdown(&mut self) {
        if !self.shut_down {
            self.shut_down = true;
            self.loaded.clear();
            self.active.store(false, Ordering::SeqCst);
            info!("sim engine instance shut down (locale '{}')", self.locale);
        }
    }
}

impl Drop for SimInstance {
    fn drop(&mut self) {
        // shutdown-on-dispose: the only cleanup guaranteed on abrupt exit
        if !self.shut_down && self.options.shutdown_on_dispose {
            self.active.store(false, Ordering::SeqCst);
            debug!("sim engine instance disposed without explicit shutdown");
        }
    }
}

struct SimOutput {
    name: String,
    fail_start: bool,
}

#[async_trait]
impl EngineOutput for SimOutput {
    async fn start(
        &mut self,
        video_encoder: &EncoderHandle,
        audio_encoder: &EncoderHandle,
    ) -> Result<(), EngineError> {
        if self.fail_start {
            return Err(EngineError::OutputStart(format!(
                "encoder '{}' is not supported by this output container",
                video_encoder.type_id
            )));
        }
        info!(
            "output '{}' started (video: {}, audio: {})",
            self.name, video_encoder.type_id, audio_encoder.type_id
        );
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), EngineError> {
        info!("output '{}' paused", self.name);
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), EngineError> {
        info!("output '{}' resumed", self.name);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        info!("output '{}' stopped", self.name);
        Ok(())
    }
}
