//! Wire protocol spoken between supervisor and worker.
//!
//! Newline-delimited JSON over a local socket. Commands travel in an envelope
//! carrying a correlation id; the worker answers every envelope with exactly
//! one `Applied`/`Rejected`/`Failed` event echoing that id, so the supervisor
//! can tell "command rejected" apart from "worker gone".

use crate::pipeline::bringup::BringUpStage;
use crate::pipeline::state::{OutputState, TransitionError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Runtime lifecycle command. The serialized form is the literal wire token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    Pause,
    Resume,
    Stop,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Pause => write!(f, "PAUSE"),
            Command::Resume => write!(f, "RESUME"),
            Command::Stop => write!(f, "STOP"),
        }
    }
}

/// A command plus the correlation id its acknowledgment must echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub id: u64,
    pub command: Command,
}

/// Events flowing back from the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerEvent {
    /// Bring-up finished; the worker is accepting commands.
    Ready {
        loaded_modules: usize,
        failed_modules: usize,
    },
    /// Bring-up aborted; the worker is exiting.
    BringUpFailed {
        stage: Option<BringUpStage>,
        message: String,
    },
    /// Command applied; `state` is the state after the transition.
    Applied { id: u64, state: OutputState },
    /// Command rejected by the state machine; state is unchanged.
    Rejected {
        id: u64,
        reason: TransitionError,
        state: OutputState,
    },
    /// Command accepted by the state machine but the engine side effect
    /// failed; state is unchanged.
    Failed { id: u64, message: String },
    /// The output is stopped and the worker is tearing down its listener.
    Stopped,
}

/// Write one message as a JSON line.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

/// Read one JSON line. `None` means the peer closed the channel.
pub async fn read_message<R, T>(reader: &mut BufReader<R>) -> std::io::Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        if line.trim().is_empty() {
            continue;
        }
        return serde_json::from_str(line.trim())
            .map(Some)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_tokens_are_literal() {
        assert_eq!(serde_json::to_string(&Command::Pause).unwrap(), "\"PAUSE\"");
        assert_eq!(
            serde_json::to_string(&Command::Resume).unwrap(),
            "\"RESUME\""
        );
        assert_eq!(serde_json::to_string(&Command::Stop).unwrap(), "\"STOP\"");
    }

    #[tokio::test]
    async fn test_messages_arrive_in_send_order() {
        let (client, server) = tokio::io::duplex(1024);
        let (_, mut write) = tokio::io::split(client);
        let (read, _) = tokio::io::split(server);
        let mut reader = BufReader::new(read);

        for (id, command) in [(1, Command::Pause), (2, Command::Resume), (3, Command::Stop)] {
            write_message(&mut write, &CommandEnvelope { id, command })
                .await
                .unwrap();
        }

        for expected in 1..=3u64 {
            let envelope: CommandEnvelope = read_message(&mut reader).await.unwrap().unwrap();
            assert_eq!(envelope.id, expected);
        }

        drop(write);
        let eof: Option<CommandEnvelope> = read_message(&mut reader).await.unwrap();
        assert!(eof.is_none());
    }
}
