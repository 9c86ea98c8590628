//! # swarmlink-core
//!
//! Core protocol types for the Swarmlink agent communication subsystem.
//!
//! This crate provides:
//! - Message types exchanged between agents ([`AgentMessage`],
//!   [`BroadcastMessage`], [`AgentEvent`])
//! - The task-handoff state machine types ([`Task`], [`TaskHandoff`])
//! - The transport wire envelope ([`Envelope`])
//! - Configuration for every layer ([`CommsConfig`])
//!
//! All entity ids and timestamps are assigned by the broker at creation
//! time and never trusted from callers.

pub mod config;
pub mod protocol;

pub use config::{
    BrokerConfig, CommsConfig, RateLimitConfig, ReconnectConfig, StoreConfig,
};
pub use protocol::{
    AgentEvent, AgentMessage, BroadcastKind, BroadcastMessage, Envelope, EventKind,
    HandoffPayload, HandoffStatus, MessageKind, Task, TaskHandoff, TaskPriority, TaskStatus,
};
