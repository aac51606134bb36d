//! Supervisor side of the command channel.
//!
//! The supervisor owns the worker process: it creates the listener, spawns
//! the same executable in worker mode, waits for bring-up to finish and then
//! sends lifecycle commands, correlating each acknowledgment by id. A closed
//! channel or a dead worker is surfaced as [`ChannelError::WorkerGone`], a
//! different failure than a command rejected in a legal, reachable worker.

use crate::channel::protocol::{self, Command, CommandEnvelope, WorkerEvent};
use crate::config;
use crate::pipeline::bringup::BringUpStage;
use crate::pipeline::state::{OutputState, TransitionError};
use anyhow::Context;
use interprocess::local_socket::traits::tokio::Listener as _;
use interprocess::local_socket::{GenericNamespaced, ListenerOptions, ToNsName};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// How long the supervisor waits for the spawned worker to connect.
const ACCEPT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ChannelError {
    /// The worker exited or the channel tore down; equivalent to an implicit
    /// STOP having occurred.
    #[error("worker is no longer reachable")]
    WorkerGone,

    #[error("channel i/o failed: {0}")]
    Io(std::io::Error),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("worker bring-up failed: {message}")]
    BringUp {
        stage: Option<BringUpStage>,
        message: String,
    },
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::UnexpectedEof => ChannelError::WorkerGone,
            _ => ChannelError::Io(err),
        }
    }
}

/// Result of one command as acknowledged by the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Applied(OutputState),
    Rejected {
        reason: TransitionError,
        state: OutputState,
    },
    Failed(String),
}

/// Correlated request/response view over the channel, independent of the
/// transport so tests can run it over in-memory pipes.
pub struct WorkerLink<R, W> {
    reader: BufReader<R>,
    writer: W,
    next_id: u64,
    stopped: bool,
}

impl<R, W> WorkerLink<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            next_id: 1,
            stopped: false,
        }
    }

    /// Wait for the worker to finish bring-up. Returns (loaded, failed)
    /// module counts from its report.
    pub async fn wait_ready(&mut self) -> Result<(usize, usize), ChannelError> {
        match self.next_event().await? {
            WorkerEvent::Ready {
                loaded_modules,
                failed_modules,
            } => Ok((loaded_modules, failed_modules)),
            WorkerEvent::BringUpFailed { stage, message } => {
                Err(ChannelError::BringUp { stage, message })
            }
            other => Err(ChannelError::Protocol(format!(
                "unexpected event before ready: {other:?}"
            ))),
        }
    }

    /// Send one command and wait for its acknowledgment.
    pub async fn send(&mut self, command: Command) -> Result<CommandOutcome, ChannelError> {
        if self.stopped {
            return Err(ChannelError::WorkerGone);
        }

        let id = self.next_id;
        self.next_id += 1;
        protocol::write_message(&mut self.writer, &CommandEnvelope { id, command }).await?;

        loop {
            match self.next_event().await? {
                WorkerEvent::Applied { id: got, state } if got == id => {
                    return Ok(CommandOutcome::Applied(state));
                }
                WorkerEvent::Rejected {
                    id: got,
                    reason,
                    state,
                } if got == id => {
                    return Ok(CommandOutcome::Rejected { reason, state });
                }
                WorkerEvent::Failed { id: got, message } if got == id => {
                    return Ok(CommandOutcome::Failed(message));
                }
                WorkerEvent::Stopped => {
                    self.stopped = true;
                    continue;
                }
                other => {
                    return Err(ChannelError::Protocol(format!(
                        "unexpected event while waiting for ack {id}: {other:?}"
                    )));
                }
            }
        }
    }

    async fn next_event(&mut self) -> Result<WorkerEvent, ChannelError> {
        match protocol::read_message(&mut self.reader).await? {
            Some(event) => Ok(event),
            None => {
                self.stopped = true;
                Err(ChannelError::WorkerGone)
            }
        }
    }
}

/// A spawned worker process plus the link to it.
pub struct WorkerHandle {
    child: tokio::process::Child,
    link: WorkerLink<
        interprocess::local_socket::tokio::RecvHalf,
        interprocess::local_socket::tokio::SendHalf,
    >,
}

impl WorkerHandle {
    /// Create the listener, spawn this executable in worker mode and wait
    /// for it to connect and finish bring-up.
    pub async fn spawn(config_path: Option<&Path>) -> anyhow::Result<Self> {
        use interprocess::local_socket::traits::tokio::Stream as _;

        let channel = config::channel_id();
        let name = channel
            .clone()
            .to_ns_name::<GenericNamespaced>()
            .context("invalid channel name")?;
        let listener = ListenerOptions::new()
            .name(name)
            .create_tokio()
            .context("failed to create channel listener")?;

        let exe = std::env::current_exe().context("failed to resolve own executable")?;
        let mut command = tokio::process::Command::new(exe);
        command.arg("--worker").arg("--channel").arg(&channel);
        if let Some(path) = config_path {
            command.arg("--config").arg(path);
        }
        let child = command.spawn().context("failed to spawn worker process")?;
        info!("worker spawned (pid {:?})", child.id());

        let stream = tokio::time::timeout(ACCEPT_TIMEOUT, listener.accept())
            .await
            .context("worker did not connect in time")?
            .context("failed to accept worker connection")?;
        let (reader, writer) = stream.split();

        let mut link = WorkerLink::new(reader, writer);
        let (loaded, failed) = link.wait_ready().await?;
        info!("worker ready: {loaded} modules loaded, {failed} failed");

        Ok(Self { child, link })
    }

    pub async fn send(&mut self, command: Command) -> Result<CommandOutcome, ChannelError> {
        self.link.send(command).await
    }

    /// Wait for the worker to exit, logging its exit status.
    pub async fn wait(mut self) -> anyhow::Result<()> {
        let status = self.child.wait().await.context("failed to await worker")?;
        match status.code() {
            Some(0) => info!("worker exited cleanly"),
            Some(code) => warn!("worker exited with code {code}"),
            None => warn!("worker terminated by signal"),
        }
        Ok(())
    }
}

/// Scripted drive of a whole session.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub config_path: Option<PathBuf>,
    /// Seconds from session start at which each command is sent.
    pub pause_after: u64,
    pub resume_after: u64,
    pub stop_after: u64,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            pause_after: 5,
            resume_after: 10,
            stop_after: 15,
        }
    }
}

/// Spawn a worker and drive it through pause → resume → stop.
pub async fn run(options: SupervisorOptions) -> anyhow::Result<()> {
    let mut worker = WorkerHandle::spawn(options.config_path.as_deref()).await?;

    let schedule = [
        (options.pause_after, Command::Pause),
        (options.resume_after, Command::Resume),
        (options.stop_after, Command::Stop),
    ];

    let mut elapsed = 0u64;
    for (at, command) in schedule {
        tokio::time::sleep(Duration::from_secs(at.saturating_sub(elapsed))).await;
        elapsed = elapsed.max(at);

        match worker.send(command).await {
            Ok(CommandOutcome::Applied(state)) => info!("{command} applied, output {state}"),
            Ok(CommandOutcome::Rejected { reason, state }) => {
                warn!("{command} rejected ({reason}), output still {state}")
            }
            Ok(CommandOutcome::Failed(message)) => error!("{command} failed in engine: {message}"),
            Err(ChannelError::WorkerGone) => {
                warn!("worker no longer reachable, treating session as stopped");
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }

    worker.wait().await
}
