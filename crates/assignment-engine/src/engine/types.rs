//! Result types returned by the engine's operations

use serde::{Deserialize, Serialize};

use crate::model::{AgentId, AgentStatus, AssignmentRecord, DrainReport, QueueEntry, Ticket, TicketId};

/// A committed ticket → agent assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    /// Ticket as stored after the assignment
    pub ticket: Ticket,
    pub agent_id: AgentId,
    pub record: AssignmentRecord,
    /// The ticket was waiting in the queue and its entry was removed
    pub dequeued: bool,
}

/// Where a routed ticket ended up
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RoutingOutcome {
    /// An agent took the ticket
    Assigned { assignment: Box<Assignment> },
    /// No agent was free; the ticket waits in the queue
    Queued { entry: QueueEntry },
    /// The ticket already had an agent
    AlreadyAssigned {
        #[serde(rename = "agentId")]
        agent_id: AgentId,
    },
}

impl RoutingOutcome {
    pub fn agent_id(&self) -> Option<&AgentId> {
        match self {
            RoutingOutcome::Assigned { assignment } => Some(&assignment.agent_id),
            RoutingOutcome::AlreadyAssigned { agent_id } => Some(agent_id),
            RoutingOutcome::Queued { .. } => None,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, RoutingOutcome::Queued { .. })
    }
}

/// Result of an inbound message or explicit ticket creation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundOutcome {
    pub ticket: Ticket,
    /// A new ticket was opened for the contact
    pub created: bool,
    pub routing: RoutingOutcome,
}

/// Why a bulk assignment stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAssignReason {
    Success,
    MaxCapacity,
    NoChannels,
    NoHoldingTickets,
    /// Role cannot handle tickets, or presence does not accept assignments
    AgentUnavailable,
}

impl std::fmt::Display for BulkAssignReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BulkAssignReason::Success => "success",
            BulkAssignReason::MaxCapacity => "max_capacity",
            BulkAssignReason::NoChannels => "no_channels",
            BulkAssignReason::NoHoldingTickets => "no_holding_tickets",
            BulkAssignReason::AgentUnavailable => "agent_unavailable",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAssignResult {
    pub agent_id: AgentId,
    /// Tickets assigned, in creation order
    pub assigned: Vec<TicketId>,
    pub reason: BulkAssignReason,
}

impl BulkAssignResult {
    pub(crate) fn empty(agent_id: AgentId, reason: BulkAssignReason) -> Self {
        Self {
            agent_id,
            assigned: Vec::new(),
            reason,
        }
    }
}

/// A committed supervisor transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignOutcome {
    pub ticket: Ticket,
    pub from_agent: Option<AgentId>,
    pub to_agent: AgentId,
    pub record: AssignmentRecord,
    /// Destination agent was already at or above `max_load` before the transfer
    pub over_capacity: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseOutcome {
    /// Agent load after the release
    pub current_load: u32,
    /// Follow-up drain of the tenant queue
    pub drain: DrainReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub ticket: Ticket,
    /// Agent whose slot was released because the ticket reached a terminal status
    pub released_agent: Option<AgentId>,
    pub drain: Option<DrainReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub agent_id: AgentId,
    pub previous: AgentStatus,
    pub current: AgentStatus,
    /// Present when the agent came online
    pub bulk: Option<BulkAssignResult>,
}
