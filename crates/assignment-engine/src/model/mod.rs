//! Domain model for the assignment engine
//!
//! Every entity here is scoped by a [`TenantId`]. Rows are read and written by
//! the [`database`](crate::database) layer; the engine owns all mutations of
//! agent load, ticket assignment and queue membership.

pub mod agent;
pub mod assignment;
pub mod channel;
pub mod ids;
pub mod queue;
pub mod ticket;

pub use agent::{Agent, AgentProfile, AgentRole, AgentStatus};
pub use assignment::{AssignmentRecord, AssignmentType};
pub use channel::ChannelType;
pub use ids::{AgentId, TenantId, TicketId};
pub use queue::{DrainReport, QueueEntry, QueuedTicket};
pub use ticket::{NewTicket, Priority, Ticket, TicketStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tenant row. Created at onboarding, never mutated by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Generic inbound message produced by a channel adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub tenant_id: TenantId,
    pub channel_type: ChannelType,
    pub contact_external_id: String,
    #[serde(default)]
    pub contact_name: Option<String>,
    pub content: String,
    /// Priority for a newly created ticket; ignored when the ticket already exists
    #[serde(default)]
    pub priority: Option<Priority>,
}
