//! # Bridge Configuration
//!
//! Per-kind reply deadlines. Every bridged wait is bounded by one of these.

use std::env;
use std::time::Duration;

use crate::domain::RequestKind;

/// Request bridge configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Deadline for `RetrieveFile` replies.
    pub file_deadline: Duration,
    /// Deadline for `FetchChunk` replies.
    pub chunk_deadline: Duration,
    /// Deadline for `RequestStream` replies.
    pub stream_deadline: Duration,
    /// Deadline for `QueryServices` replies.
    pub query_deadline: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            file_deadline: Duration::from_secs(30),
            chunk_deadline: Duration::from_secs(10),
            stream_deadline: Duration::from_secs(60),
            query_deadline: Duration::from_secs(15),
        }
    }
}

impl BridgeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `AGENT_FILE_DEADLINE_SECS` (default: 30)
    /// - `AGENT_CHUNK_DEADLINE_SECS` (default: 10)
    /// - `AGENT_STREAM_DEADLINE_SECS` (default: 60)
    /// - `AGENT_QUERY_DEADLINE_SECS` (default: 15)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            file_deadline: secs_from_env("AGENT_FILE_DEADLINE_SECS", defaults.file_deadline),
            chunk_deadline: secs_from_env("AGENT_CHUNK_DEADLINE_SECS", defaults.chunk_deadline),
            stream_deadline: secs_from_env("AGENT_STREAM_DEADLINE_SECS", defaults.stream_deadline),
            query_deadline: secs_from_env("AGENT_QUERY_DEADLINE_SECS", defaults.query_deadline),
        }
    }

    /// Create a config for testing (short deadlines).
    pub fn for_testing() -> Self {
        Self {
            file_deadline: Duration::from_millis(500),
            chunk_deadline: Duration::from_millis(500),
            stream_deadline: Duration::from_millis(500),
            query_deadline: Duration::from_millis(500),
        }
    }

    /// Deadline for a request kind. `Register` and `Reply` wait on nothing.
    pub fn deadline_for(&self, kind: RequestKind) -> Duration {
        match kind {
            RequestKind::File => self.file_deadline,
            RequestKind::Chunk => self.chunk_deadline,
            RequestKind::Stream => self.stream_deadline,
            RequestKind::Services | RequestKind::Register | RequestKind::Reply => {
                self.query_deadline
            }
        }
    }

    /// Every deadline, with its environment variable name.
    pub fn deadlines(&self) -> [(&'static str, Duration); 4] {
        [
            ("AGENT_FILE_DEADLINE_SECS", self.file_deadline),
            ("AGENT_CHUNK_DEADLINE_SECS", self.chunk_deadline),
            ("AGENT_STREAM_DEADLINE_SECS", self.stream_deadline),
            ("AGENT_QUERY_DEADLINE_SECS", self.query_deadline),
        ]
    }
}

fn secs_from_env(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
