//! Output lifecycle controller
//!
//! Wraps the engine output behind the state machine: every accepted command
//! performs its engine side effect exactly once, every rejected command
//! leaves both the state and the engine untouched.

use crate::channel::protocol::Command;
use crate::engine::error::EngineError;
use crate::engine::traits::{EncoderHandle, EngineOutput};
use crate::pipeline::health::SessionHealth;
use crate::pipeline::state::{OutputState, TransitionError};
use log::{info, warn};
use std::sync::Arc;
use thiserror::Error;

/// Failure applying a command.
#[derive(Error, Debug)]
pub enum ControllerError {
    /// The state machine rejected the command; nothing was applied.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The transition was legal but the engine call failed; the state was
    /// left unchanged, nothing was partially applied.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub struct OutputController {
    output: Box<dyn EngineOutput>,
    state: OutputState,
    health: Arc<SessionHealth>,
}

impl OutputController {
    pub fn new(output: Box<dyn EngineOutput>, health: Arc<SessionHealth>) -> Self {
        Self {
            output,
            state: OutputState::Created,
            health,
        }
    }

    pub fn state(&self) -> OutputState {
        self.state
    }

    /// CREATED → RUNNING. Part of bring-up, not of the command surface;
    /// binds the output to exactly one video and one audio encoder.
    pub async fn start(
        &mut self,
        video_encoder: &EncoderHandle,
        audio_encoder: &EncoderHandle,
    ) -> Result<(), EngineError> {
        if self.state != OutputState::Created {
            return Err(EngineError::OutputStart(format!(
                "output already started (state: {})",
                self.state
            )));
        }

        self.output.start(video_encoder, audio_encoder).await?;
        self.state = OutputState::Running;
        info!("output running");
        Ok(())
    }

    /// Validate and apply one runtime command.
    pub async fn apply(&mut self, command: Command) -> Result<OutputState, ControllerError> {
        let current = self.state;
        let next = match current.apply(command) {
            Ok(next) => next,
            Err(reason) => {
                self.health.record_command_rejected();
                warn!("{command} rejected in state {current}: {reason}");
                return Err(reason.into());
            }
        };

        // Engine side effect, exactly once per accepted command. A STOP on a
        // never-started output is a pure release, there is nothing to stop.
        match (current, command) {
            (OutputState::Created, Command::Stop) => {}
            (_, Command::Pause) => self.output.pause().await?,
            (_, Command::Resume) => self.output.resume().await?,
            (_, Command::Stop) => self.output.stop().await?,
        }

        self.state = next;
        self.health.record_command_applied();
        info!("{command} applied: {current} -> {next}");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Engine output double counting side effects, optionally failing pause.
    struct CountingOutput {
        calls: Arc<Calls>,
        fail_pause: bool,
    }

    #[derive(Default)]
    struct Calls {
        started: AtomicU32,
        paused: AtomicU32,
        resumed: AtomicU32,
        stopped: AtomicU32,
    }

    #[async_trait]
    impl EngineOutput for CountingOutput {
        async fn start(
            &mut self,
            _video: &EncoderHandle,
            _audio: &EncoderHandle,
        ) -> Result<(), EngineError> {
            self.calls.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn pause(&mut self) -> Result<(), EngineError> {
            if self.fail_pause {
                return Err(EngineError::OutputStart("pause not supported".into()));
            }
            self.calls.paused.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn resume(&mut self) -> Result<(), EngineError> {
            self.calls.resumed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), EngineError> {
            self.calls.stopped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn encoder(kind: crate::engine::types::EncoderKind) -> EncoderHandle {
        EncoderHandle {
            kind,
            type_id: "test".into(),
            name: "test".into(),
        }
    }

    fn new_controller(calls: Arc<Calls>, fail_pause: bool) -> OutputController {
        OutputController::new(
            Box::new(CountingOutput { calls, fail_pause }),
            Arc::new(SessionHealth::new()),
        )
    }

    #[tokio::test]
    async fn test_pause_resume_stop_each_hit_engine_once() {
        use crate::engine::types::EncoderKind;
        let calls = Arc::new(Calls::default());
        let mut controller = new_controller(calls.clone(), false);
        controller
            .start(&encoder(EncoderKind::Video), &encoder(EncoderKind::Audio))
            .await
            .unwrap();

        assert_eq!(
            controller.apply(Command::Pause).await.unwrap(),
            OutputState::Paused
        );
        assert_eq!(
            controller.apply(Command::Resume).await.unwrap(),
            OutputState::Running
        );
        assert_eq!(
            controller.apply(Command::Stop).await.unwrap(),
            OutputState::Stopped
        );

        assert_eq!(calls.started.load(Ordering::SeqCst), 1);
        assert_eq!(calls.paused.load(Ordering::SeqCst), 1);
        assert_eq!(calls.resumed.load(Ordering::SeqCst), 1);
        assert_eq!(calls.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_command_never_reaches_engine() {
        use crate::engine::types::EncoderKind;
        let calls = Arc::new(Calls::default());
        let mut controller = new_controller(calls.clone(), false);
        controller
            .start(&encoder(EncoderKind::Video), &encoder(EncoderKind::Audio))
            .await
            .unwrap();

        // RESUME while running is illegal
        let err = controller.apply(Command::Resume).await.unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Transition(TransitionError::NotPaused)
        ));
        assert_eq!(calls.resumed.load(Ordering::SeqCst), 0);
        assert_eq!(controller.state(), OutputState::Running);
    }

    #[tokio::test]
    async fn test_double_stop_second_is_already_stopped() {
        use crate::engine::types::EncoderKind;
        let calls = Arc::new(Calls::default());
        let mut controller = new_controller(calls.clone(), false);
        controller
            .start(&encoder(EncoderKind::Video), &encoder(EncoderKind::Audio))
            .await
            .unwrap();

        controller.apply(Command::Stop).await.unwrap();
        let err = controller.apply(Command::Stop).await.unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Transition(TransitionError::AlreadyStopped)
        ));
        assert_eq!(controller.state(), OutputState::Stopped);
        assert_eq!(calls.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_on_never_started_output_is_pure_release() {
        let calls = Arc::new(Calls::default());
        let mut controller = new_controller(calls.clone(), false);

        assert_eq!(
            controller.apply(Command::Stop).await.unwrap(),
            OutputState::Stopped
        );
        assert_eq!(calls.stopped.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_engine_failure_leaves_state_unchanged() {
        use crate::engine::types::EncoderKind;
        let calls = Arc::new(Calls::default());
        let mut controller = new_controller(calls.clone(), true);
        controller
            .start(&encoder(EncoderKind::Video), &encoder(EncoderKind::Audio))
            .await
            .unwrap();

        let err = controller.apply(Command::Pause).await.unwrap_err();
        assert!(matches!(err, ControllerError::Engine(_)));
        assert_eq!(controller.state(), OutputState::Running);
    }
}
