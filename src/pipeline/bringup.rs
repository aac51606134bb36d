//! Pipeline bring-up sequencer
//!
//! Brings the session up in a fixed order: instance → audio reset → video
//! reset → encoders → sources → output → start. The order is enforced by a
//! tagged stage enum with precondition checks, not by call-order convention;
//! later steps reference objects that only exist once earlier steps succeed.
//! Any stage failure is fatal: the partially-constructed instance is torn
//! down and nothing reaches the running state.

use crate::config::{EncoderSpec, OutputSpec, SessionConfig, SourceSpec};
use crate::engine::error::EngineError;
use crate::engine::module::{self, LoadReport};
use crate::engine::traits::{
    EncoderHandle, EngineInstance, InstanceOptions, MediaEngine, SourceHandle,
};
use crate::engine::types::{AudioConfig, EncoderKind, VideoConfig};
use crate::pipeline::controller::OutputController;
use crate::pipeline::health::SessionHealth;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The seven ordered bring-up stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BringUpStage {
    Instance,
    AudioReset,
    VideoReset,
    Encoders,
    Sources,
    Output,
    Start,
}

impl fmt::Display for BringUpStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BringUpStage::Instance => "instance",
            BringUpStage::AudioReset => "audio-reset",
            BringUpStage::VideoReset => "video-reset",
            BringUpStage::Encoders => "encoders",
            BringUpStage::Sources => "sources",
            BringUpStage::Output => "output",
            BringUpStage::Start => "start",
        };
        write!(f, "{name}")
    }
}

#[derive(Error, Debug)]
pub enum BringUpError {
    #[error("bring-up stage {stage} failed: {source}")]
    Stage {
        stage: BringUpStage,
        #[source]
        source: EngineError,
    },

    #[error("module loading failed: {source}")]
    Modules {
        #[source]
        source: EngineError,
    },

    #[error("bring-up step {requested} invoked out of order (sequencer at {current})")]
    OutOfOrder {
        requested: BringUpStage,
        current: BringUpStage,
    },
}

impl BringUpError {
    /// Stage the failure is attributed to, if any.
    pub fn stage(&self) -> Option<BringUpStage> {
        match self {
            BringUpError::Stage { stage, .. } => Some(*stage),
            BringUpError::Modules { .. } => None,
            BringUpError::OutOfOrder { requested, .. } => Some(*requested),
        }
    }
}

/// A fully brought-up session: the running output plus everything it needs.
pub struct Session {
    pub instance: Box<dyn EngineInstance>,
    pub modules: LoadReport,
    pub video_encoder: EncoderHandle,
    pub audio_encoder: EncoderHandle,
    pub sources: Vec<SourceHandle>,
    pub controller: OutputController,
    pub health: Arc<SessionHealth>,
}

impl Session {
    pub async fn shutdown(mut self) {
        self.instance.shutdown().await;
    }
}

/// Stage-checked bring-up driver.
pub struct Sequencer<'a> {
    engine: &'a dyn MediaEngine,
    stage: BringUpStage,
    instance: Option<Box<dyn EngineInstance>>,
    modules: LoadReport,
    video_encoder: Option<EncoderHandle>,
    audio_encoder: Option<EncoderHandle>,
    sources: Vec<SourceHandle>,
    controller: Option<OutputController>,
    health: Arc<SessionHealth>,
    video_configured: bool,
    started: bool,
}

impl<'a> Sequencer<'a> {
    pub fn new(engine: &'a dyn MediaEngine) -> Self {
        Self {
            engine,
            stage: BringUpStage::Instance,
            instance: None,
            modules: LoadReport::default(),
            video_encoder: None,
            audio_encoder: None,
            sources: Vec::new(),
            controller: None,
            health: Arc::new(SessionHealth::new()),
            video_configured: false,
            started: false,
        }
    }

    /// Run the whole sequence. All-or-nothing: on any failure the instance
    /// is shut down before the error is returned.
    pub async fn run(
        engine: &'a dyn MediaEngine,
        config: &SessionConfig,
    ) -> Result<Session, BringUpError> {
        let mut sequencer = Sequencer::new(engine);
        match sequencer.drive(config).await {
            Ok(session) => Ok(session),
            Err(err) => {
                error!("bring-up aborted: {err}");
                sequencer.abort().await;
                Err(err)
            }
        }
    }

    async fn drive(&mut self, config: &SessionConfig) -> Result<Session, BringUpError> {
        self.create_instance(
            &config.locale,
            InstanceOptions {
                shutdown_on_dispose: config.shutdown_on_dispose,
            },
        )
        .await?;
        self.load_modules(&config.excluded_modules, config.strict_modules)
            .await?;
        self.reset_audio(&config.audio).await?;
        self.reset_video(&config.video).await?;
        self.create_encoders(&config.video_encoder, &config.audio_encoder)
            .await?;
        self.create_sources(&config.sources).await?;
        self.create_output(&config.output).await?;
        self.start().await?;
        self.take_session()
    }

    fn expect(&self, requested: BringUpStage) -> Result<(), BringUpError> {
        if self.stage != requested {
            return Err(BringUpError::OutOfOrder {
                requested,
                current: self.stage,
            });
        }
        Ok(())
    }

    fn instance_mut(
        &mut self,
        stage: BringUpStage,
    ) -> Result<&mut Box<dyn EngineInstance>, BringUpError> {
        self.instance
            .as_mut()
            .ok_or(BringUpError::OutOfOrder {
                requested: stage,
                current: BringUpStage::Instance,
            })
    }

    /// Stage 1: create the engine instance.
    pub async fn create_instance(
        &mut self,
        locale: &str,
        options: InstanceOptions,
    ) -> Result<(), BringUpError> {
        self.expect(BringUpStage::Instance)?;

        let instance = self
            .engine
            .create_instance(locale, options)
            .await
            .map_err(|source| BringUpError::Stage {
                stage: BringUpStage::Instance,
                source,
            })?;

        self.instance = Some(instance);
        self.stage = BringUpStage::AudioReset;
        Ok(())
    }

    /// Enumerate and batch-load modules. Legal only between instance
    /// creation and the audio reset; load failures are partitioned, not
    /// fatal, unless strict mode is requested.
    pub async fn load_modules(
        &mut self,
        excluded: &[String],
        strict: bool,
    ) -> Result<&LoadReport, BringUpError> {
        self.expect(BringUpStage::AudioReset)?;

        let instance = self.instance_mut(BringUpStage::AudioReset)?;
        let modules = instance
            .enumerate_modules()
            .await
            .map_err(|source| BringUpError::Modules { source })?;

        let report = module::load_modules(instance.as_mut(), modules, excluded, strict)
            .await
            .map_err(|source| BringUpError::Modules { source })?;

        info!(
            "modules: {} loaded, {} failed",
            report.loaded.len(),
            report.failed.len()
        );
        self.modules = report;
        Ok(&self.modules)
    }

    /// Stage 2: reset the audio subsystem.
    pub async fn reset_audio(&mut self, config: &AudioConfig) -> Result<(), BringUpError> {
        self.expect(BringUpStage::AudioReset)?;

        self.instance_mut(BringUpStage::AudioReset)?
            .reset_audio(config)
            .await
            .map_err(|source| BringUpError::Stage {
                stage: BringUpStage::AudioReset,
                source,
            })?;

        self.stage = BringUpStage::VideoReset;
        Ok(())
    }

    /// Stage 3: reset the video subsystem. Legal at most once per instance
    /// lifetime; a re-invocation is rejected before it reaches the engine.
    pub async fn reset_video(&mut self, config: &VideoConfig) -> Result<(), BringUpError> {
        if self.video_configured {
            return Err(BringUpError::Stage {
                stage: BringUpStage::VideoReset,
                source: EngineError::AlreadyConfigured,
            });
        }
        self.expect(BringUpStage::VideoReset)?;

        self.instance_mut(BringUpStage::VideoReset)?
            .reset_video(config)
            .await
            .map_err(|source| BringUpError::Stage {
                stage: BringUpStage::VideoReset,
                source,
            })?;

        self.video_configured = true;
        self.stage = BringUpStage::Encoders;
        Ok(())
    }

    /// Stage 4: create the video and audio encoders.
    pub async fn create_encoders(
        &mut self,
        video: &EncoderSpec,
        audio: &EncoderSpec,
    ) -> Result<(), BringUpError> {
        self.expect(BringUpStage::Encoders)?;

        let instance = self.instance_mut(BringUpStage::Encoders)?;
        let video_encoder = instance
            .create_encoder(
                EncoderKind::Video,
                &video.type_id,
                &video.name,
                video.settings.clone(),
            )
            .await
            .map_err(|source| BringUpError::Stage {
                stage: BringUpStage::Encoders,
                source,
            })?;
        let audio_encoder = instance
            .create_encoder(
                EncoderKind::Audio,
                &audio.type_id,
                &audio.name,
                audio.settings.clone(),
            )
            .await
            .map_err(|source| BringUpError::Stage {
                stage: BringUpStage::Encoders,
                source,
            })?;

        self.video_encoder = Some(video_encoder);
        self.audio_encoder = Some(audio_encoder);
        self.stage = BringUpStage::Sources;
        Ok(())
    }

    /// Stage 5: create the capture sources, one per configured mix channel.
    pub async fn create_sources(&mut self, specs: &[SourceSpec]) -> Result<(), BringUpError> {
        self.expect(BringUpStage::Sources)?;

        // channel indices must be unique per kind before anything is created
        let mut channels = HashSet::new();
        for spec in specs {
            if !channels.insert((spec.kind, spec.channel)) {
                return Err(BringUpError::Stage {
                    stage: BringUpStage::Sources,
                    source: EngineError::SourceCreate {
                        kind: spec.kind,
                        channel: spec.channel,
                        reason: "duplicate channel index".to_string(),
                    },
                });
            }
        }

        let instance = self.instance_mut(BringUpStage::Sources)?;
        let mut created = Vec::with_capacity(specs.len());
        for spec in specs {
            let source = instance
                .create_source(
                    spec.kind,
                    &spec.type_id,
                    &spec.name,
                    spec.channel,
                    spec.settings.clone(),
                )
                .await
                .map_err(|source| BringUpError::Stage {
                    stage: BringUpStage::Sources,
                    source,
                })?;
            created.push(source);
        }

        self.sources = created;
        self.stage = BringUpStage::Output;
        Ok(())
    }

    /// Stage 6: create the output sink.
    pub async fn create_output(&mut self, spec: &OutputSpec) -> Result<(), BringUpError> {
        self.expect(BringUpStage::Output)?;

        let instance = self.instance_mut(BringUpStage::Output)?;
        debug!("available output types: {:?}", instance.list_output_types());

        let output = instance
            .create_output(&spec.type_id, &spec.name, spec.settings.clone())
            .await
            .map_err(|source| BringUpError::Stage {
                stage: BringUpStage::Output,
                source,
            })?;

        self.controller = Some(OutputController::new(output, self.health.clone()));
        self.stage = BringUpStage::Start;
        Ok(())
    }

    /// Stage 7: start the output, binding it to the two encoders from
    /// stage 4. This is the CREATED → RUNNING transition.
    pub async fn start(&mut self) -> Result<(), BringUpError> {
        self.expect(BringUpStage::Start)?;

        let out_of_order = |requested| BringUpError::OutOfOrder {
            requested,
            current: BringUpStage::Start,
        };
        let video = self
            .video_encoder
            .clone()
            .ok_or(out_of_order(BringUpStage::Encoders))?;
        let audio = self
            .audio_encoder
            .clone()
            .ok_or(out_of_order(BringUpStage::Encoders))?;
        let controller = self
            .controller
            .as_mut()
            .ok_or(out_of_order(BringUpStage::Output))?;

        controller
            .start(&video, &audio)
            .await
            .map_err(|source| BringUpError::Stage {
                stage: BringUpStage::Start,
                source,
            })?;

        self.started = true;
        Ok(())
    }

    /// Shut down whatever was constructed so far.
    pub async fn abort(&mut self) {
        if let Some(mut instance) = self.instance.take() {
            instance.shutdown().await;
        }
    }

    fn take_session(&mut self) -> Result<Session, BringUpError> {
        match (
            self.started,
            self.instance.take(),
            self.video_encoder.take(),
            self.audio_encoder.take(),
            self.controller.take(),
        ) {
            (true, Some(instance), Some(video_encoder), Some(audio_encoder), Some(controller)) => {
                Ok(Session {
                    instance,
                    modules: std::mem::take(&mut self.modules),
                    video_encoder,
                    audio_encoder,
                    sources: std::mem::take(&mut self.sources),
                    controller,
                    health: self.health.clone(),
                })
            }
            _ => Err(BringUpError::OutOfOrder {
                requested: BringUpStage::Start,
                current: self.stage,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::protocol::Command;
    use crate::engine::sim::{SimEngine, SimFailure};
    use crate::engine::types::SourceKind;
    use crate::pipeline::state::OutputState;

    #[tokio::test]
    async fn test_full_bringup_reaches_running() {
        let engine = SimEngine::new();
        let config = SessionConfig::default();
        let session = Sequencer::run(&engine, &config).await.unwrap();

        assert_eq!(session.controller.state(), OutputState::Running);
        assert!(!session.modules.loaded.is_empty());
        assert_eq!(session.sources.len(), config.sources.len());
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_any_stage_failure_tears_the_instance_down() {
        let failures = [
            SimFailure::Instance,
            SimFailure::AudioReset,
            SimFailure::VideoReset,
            SimFailure::Encoder(EncoderKind::Video),
            SimFailure::Encoder(EncoderKind::Audio),
            SimFailure::Source(SourceKind::Video),
            SimFailure::OutputCreate,
            SimFailure::OutputStart,
        ];
        let expected_stages = [
            BringUpStage::Instance,
            BringUpStage::AudioReset,
            BringUpStage::VideoReset,
            BringUpStage::Encoders,
            BringUpStage::Encoders,
            BringUpStage::Sources,
            BringUpStage::Output,
            BringUpStage::Start,
        ];

        let config = SessionConfig::default();
        for (failure, expected) in failures.into_iter().zip(expected_stages) {
            let engine = SimEngine::new().with_failure(failure);
            let err = Sequencer::run(&engine, &config).await.err().unwrap();
            assert_eq!(err.stage(), Some(expected), "failure: {failure:?}");

            // all-or-nothing: the singleton slot must be free again
            assert!(
                engine
                    .recovered()
                    .create_instance("en-US", InstanceOptions::default())
                    .await
                    .is_ok(),
                "instance leaked after {failure:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_strict_module_failure_is_fatal() {
        let engine = SimEngine::new().with_unloadable_module("win-mf");
        let mut config = SessionConfig::default();
        config.excluded_modules.clear();
        config.strict_modules = true;

        let err = Sequencer::run(&engine, &config).await.err().unwrap();
        assert!(matches!(err, BringUpError::Modules { .. }));
        assert_eq!(err.stage(), None);
    }

    #[tokio::test]
    async fn test_steps_out_of_order_are_rejected() {
        let engine = SimEngine::new();
        let mut sequencer = Sequencer::new(&engine);

        let err = sequencer
            .reset_audio(&AudioConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BringUpError::OutOfOrder { .. }));
    }

    #[tokio::test]
    async fn test_second_video_reset_is_already_configured() {
        let engine = SimEngine::new();
        let config = SessionConfig::default();
        let mut sequencer = Sequencer::new(&engine);

        sequencer
            .create_instance(&config.locale, InstanceOptions::default())
            .await
            .unwrap();
        sequencer
            .load_modules(&config.excluded_modules, false)
            .await
            .unwrap();
        sequencer.reset_audio(&config.audio).await.unwrap();
        sequencer.reset_video(&config.video).await.unwrap();

        let err = sequencer.reset_video(&config.video).await.unwrap_err();
        match err {
            BringUpError::Stage {
                stage: BringUpStage::VideoReset,
                source: EngineError::AlreadyConfigured,
            } => {}
            other => panic!("expected AlreadyConfigured, got {other}"),
        }
        sequencer.abort().await;
    }

    #[tokio::test]
    async fn test_duplicate_source_channels_are_rejected() {
        let engine = SimEngine::new();
        let mut config = SessionConfig::default();
        config.sources[1].kind = config.sources[0].kind;
        config.sources[1].channel = config.sources[0].channel;

        let err = Sequencer::run(&engine, &config).await.err().unwrap();
        assert_eq!(err.stage(), Some(BringUpStage::Sources));
    }

    #[tokio::test]
    async fn test_scenario_pause_resume_stop_roundtrip() {
        // 48kHz stereo audio, 1440p60 video, nvenc + aac, screen capture,
        // one output: start, pause, resume, stop, then a rejected stop
        let engine = SimEngine::new();
        let config = SessionConfig::default();
        let mut session = Sequencer::run(&engine, &config).await.unwrap();
        assert_eq!(session.controller.state(), OutputState::Running);

        assert_eq!(
            session.controller.apply(Command::Pause).await.unwrap(),
            OutputState::Paused
        );
        assert_eq!(
            session.controller.apply(Command::Resume).await.unwrap(),
            OutputState::Running
        );
        assert_eq!(
            session.controller.apply(Command::Stop).await.unwrap(),
            OutputState::Stopped
        );
        assert!(session.controller.apply(Command::Stop).await.is_err());
        session.shutdown().await;
    }
}
