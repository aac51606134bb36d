//! Worker side of the command channel.
//!
//! Connects back to the supervisor's socket, runs bring-up, then serves the
//! command loop until STOP is applied or the supervisor disappears. The loop
//! is written against plain async reader/writer halves so tests can drive it
//! over in-memory pipes.

use crate::channel::protocol::{self, Command, CommandEnvelope, WorkerEvent};
use crate::config::SessionConfig;
use crate::engine::traits::MediaEngine;
use crate::pipeline::bringup::{Sequencer, Session};
use crate::pipeline::controller::ControllerError;
use crate::pipeline::health::SessionHealth;
use crate::utils::sos::SignalOfStop;
use anyhow::Context;
use interprocess::local_socket::tokio::Stream;
use interprocess::local_socket::traits::tokio::Stream as _;
use interprocess::local_socket::{GenericNamespaced, ToNsName};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Connect to the supervisor and serve the session over the local socket.
pub async fn run(
    engine: &dyn MediaEngine,
    config: &SessionConfig,
    channel: &str,
) -> anyhow::Result<()> {
    let name = channel
        .to_ns_name::<GenericNamespaced>()
        .context("invalid channel name")?;
    let stream = Stream::connect(name)
        .await
        .with_context(|| format!("failed to connect to supervisor channel '{channel}'"))?;
    let (reader, writer) = stream.split();

    serve(engine, config, reader, writer).await
}

/// Bring the session up and serve commands until the session ends.
pub async fn serve<R, W>(
    engine: &dyn MediaEngine,
    config: &SessionConfig,
    reader: R,
    writer: W,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut writer = writer;

    match engine.find_installation(true).await {
        Ok(path) => info!("engine installation: {}", path.display()),
        Err(err) => {
            let event = WorkerEvent::BringUpFailed {
                stage: None,
                message: err.to_string(),
            };
            protocol::write_message(&mut writer, &event).await?;
            return Err(err.into());
        }
    }

    let mut session = match Sequencer::run(engine, config).await {
        Ok(session) => session,
        Err(err) => {
            let event = WorkerEvent::BringUpFailed {
                stage: err.stage(),
                message: err.to_string(),
            };
            protocol::write_message(&mut writer, &event).await?;
            return Err(err.into());
        }
    };

    let health = session.health.clone();
    send_event(
        &mut writer,
        &health,
        &WorkerEvent::Ready {
            loaded_modules: session.modules.loaded.len(),
            failed_modules: session.modules.failed.len(),
        },
    )
    .await?;

    let result = command_loop(&mut reader, &mut writer, &mut session).await;

    info!("session health: {}", health.summary());
    session.shutdown().await;
    result
}

async fn command_loop<R, W>(
    reader: &mut BufReader<R>,
    writer: &mut W,
    session: &mut Session,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // Cancelled when STOP is applied so no command is acted on for a
    // torn-down output.
    let sos = SignalOfStop::new();
    let health = session.health.clone();

    loop {
        let envelope = tokio::select! {
            _ = sos.wait_cancellation() => break,
            message = protocol::read_message::<_, CommandEnvelope>(reader) => message?,
        };

        let Some(envelope) = envelope else {
            // Supervisor gone before STOP: treat as an implicit STOP, the
            // process and its resources are going away.
            if session.controller.state().is_active() {
                warn!(
                    "channel closed with output {}; applying implicit STOP",
                    session.controller.state()
                );
                if let Err(err) = session.controller.apply(Command::Stop).await {
                    error!("implicit STOP failed: {err}");
                }
            }
            break;
        };

        debug!("received {} (id {})", envelope.command, envelope.id);
        match session.controller.apply(envelope.command).await {
            Ok(state) => {
                send_event(
                    writer,
                    &health,
                    &WorkerEvent::Applied {
                        id: envelope.id,
                        state,
                    },
                )
                .await?;

                if envelope.command == Command::Stop {
                    send_event(writer, &health, &WorkerEvent::Stopped).await?;
                    sos.cancel();
                    break;
                }
            }
            Err(ControllerError::Transition(reason)) => {
                send_event(
                    writer,
                    &health,
                    &WorkerEvent::Rejected {
                        id: envelope.id,
                        reason,
                        state: session.controller.state(),
                    },
                )
                .await?;
            }
            Err(ControllerError::Engine(err)) => {
                error!("command {} (id {}) failed: {err}", envelope.command, envelope.id);
                send_event(
                    writer,
                    &health,
                    &WorkerEvent::Failed {
                        id: envelope.id,
                        message: err.to_string(),
                    },
                )
                .await?;
            }
        }
    }

    Ok(())
}

async fn send_event<W>(
    writer: &mut W,
    health: &Arc<SessionHealth>,
    event: &WorkerEvent,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    health.record_event();
    protocol::write_message(writer, event).await
}
