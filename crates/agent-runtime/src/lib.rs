//! # Agent Runtime Library
//!
//! Composition root of the agent protocol bridge, exposed as a library for
//! embedding and testing. The `agent-runtime` binary runs it as a sidecar
//! of the external agent process:
//!
//! ```text
//!  agent stdout ──webhook lines──→ [Ingress] ──→ [Event Bus] ──→ waiters
//!                                      │
//!                               peer messages
//!                                      ↓
//!                              [Protocol Handler]
//!                                      ↓
//!  [Bridge / Registry] ──→ [Outbox] ──JSON lines──→ agent stdin
//! ```
//!
//! - `container/` - configuration and component wiring
//! - `adapters/` - ingress and outbox over async byte streams
//! - `handlers/` - background bus observers and inbound protocol dispatch
//! - `runtime` - task lifecycle

#![allow(clippy::type_complexity)]

pub mod adapters;
pub mod container;
pub mod handlers;
pub mod runtime;

pub use container::{AgentConfig, AgentContainer, ConfigError, ProtocolConfig, Transports};
pub use runtime::AgentRuntime;
