//! # Deskroute Assignment Engine
//!
//! Ticket assignment and queueing for a multi-tenant omnichannel helpdesk.
//!
//! This crate provides:
//! - Per-agent capacity tracking (`current_load` against `max_load`) in SQLite
//! - Least-loaded agent selection per channel with random tie-break
//! - A per-tenant priority queue for tickets nobody can take yet
//! - Atomic assign/release transitions with an append-only audit trail
//! - Bulk pickup of holding tickets when an agent comes online
//! - Realtime assignment events through a pluggable [`events::EventPublisher`]
//! - A small REST API for queue introspection
//!
//! ## Architecture
//!
//! All shared state lives in the database and every state change is one
//! transaction made of conditional updates, so any number of engine instances
//! can run against the same store. Channel adapters call
//! [`AssignmentEngine::handle_inbound_message`]; ticket lifecycle and agent
//! presence changes come in through
//! [`AssignmentEngine::update_ticket_status`] and
//! [`AssignmentEngine::update_agent_presence`].

pub mod api;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod model;
pub mod server;

pub use config::EngineConfig;
pub use engine::AssignmentEngine;
pub use error::{AssignmentConflict, EngineError, Result};

/// Commonly used types
pub mod prelude {
    pub use crate::config::{
        AssignmentConfig, DatabaseConfig, EngineConfig, QueueConfig, ReassignCapacityPolicy, RetryConfig,
    };
    pub use crate::database::DatabaseManager;
    pub use crate::engine::{
        Assignment, AssignmentEngine, BulkAssignReason, BulkAssignResult, InboundOutcome, PresenceUpdate,
        ReassignOutcome, ReleaseOutcome, RoutingOutcome, StatusUpdate,
    };
    pub use crate::error::{AssignmentConflict, EngineError, Result};
    pub use crate::events::{BroadcastPublisher, EngineEvent, EventPublisher, EventSubscriber, EventTarget, NullPublisher};
    pub use crate::model::{
        Agent, AgentId, AgentProfile, AgentRole, AgentStatus, AssignmentRecord, AssignmentType, ChannelType,
        DrainReport, InboundMessage, NewTicket, Priority, QueueEntry, QueuedTicket, Tenant, TenantId, Ticket,
        TicketId, TicketStatus,
    };
    pub use crate::server::{EngineServer, EngineServerBuilder, SweepReport};
}
