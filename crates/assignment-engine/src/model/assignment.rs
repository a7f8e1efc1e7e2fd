//! Assignment audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{AgentId, TenantId, TicketId};

/// How a ticket reached its agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AssignmentType {
    Auto,
    Manual,
}

impl AssignmentType {
    pub fn is_automatic(&self) -> bool {
        matches!(self, AssignmentType::Auto)
    }
}

impl fmt::Display for AssignmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentType::Auto => f.write_str("auto"),
            AssignmentType::Manual => f.write_str("manual"),
        }
    }
}

/// Immutable audit row. Never updated or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRecord {
    pub id: i64,
    pub tenant_id: TenantId,
    pub ticket_id: TicketId,
    #[sqlx(rename = "from_agent_id")]
    pub from_agent: Option<AgentId>,
    #[sqlx(rename = "to_agent_id")]
    pub to_agent: AgentId,
    pub assignment_type: AssignmentType,
    pub reason: Option<String>,
    pub actor_id: Option<String>,
    #[sqlx(rename = "created_at")]
    pub timestamp: DateTime<Utc>,
}
