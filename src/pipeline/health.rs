//! Health counters for a running session

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters tracking how the command surface of a session is being used.
///
/// All fields use atomic operations for thread-safe access.
pub struct SessionHealth {
    /// Commands accepted and applied to the engine output
    pub commands_applied: AtomicU64,

    /// Commands rejected by the state machine
    pub commands_rejected: AtomicU64,

    /// Events sent back over the channel
    pub events_emitted: AtomicU64,

    /// Timestamp (Unix microseconds) of the last processed command
    pub last_command_time: AtomicU64,
}

impl SessionHealth {
    pub fn new() -> Self {
        Self {
            commands_applied: AtomicU64::new(0),
            commands_rejected: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
            last_command_time: AtomicU64::new(0),
        }
    }

    pub fn record_command_applied(&self) {
        self.commands_applied.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn record_command_rejected(&self) {
        self.commands_rejected.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn record_event(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    fn touch(&self) {
        let now_micros = chrono::Utc::now().timestamp_micros().max(0) as u64;
        self.last_command_time.store(now_micros, Ordering::Relaxed);
    }

    /// One-line summary for the session-end log.
    pub fn summary(&self) -> String {
        format!(
            "{} applied, {} rejected, {} events",
            self.commands_applied.load(Ordering::Relaxed),
            self.commands_rejected.load(Ordering::Relaxed),
            self.events_emitted.load(Ordering::Relaxed)
        )
    }
}

impl Default for SessionHealth {
    fn default() -> Self {
        Self::new()
    }
}
