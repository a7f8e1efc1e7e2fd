//! Agent capacity records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use std::fmt;
use std::str::FromStr;

use super::{AgentId, ChannelType, TenantId};
use crate::error::Result;

/// Agent presence status
///
/// Only `Online` and `Away` agents are eligible for automatic assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Away,
    Busy,
    Offline,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Online => "online",
            AgentStatus::Away => "away",
            AgentStatus::Busy => "busy",
            AgentStatus::Offline => "offline",
        }
    }

    /// Whether the automatic selector may pick an agent in this status
    pub fn accepts_assignments(&self) -> bool {
        matches!(self, AgentStatus::Online | AgentStatus::Away)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "online" => Ok(AgentStatus::Online),
            "away" => Ok(AgentStatus::Away),
            "busy" => Ok(AgentStatus::Busy),
            "offline" => Ok(AgentStatus::Offline),
            _ => Err(format!("Unknown agent status: {}", s)),
        }
    }
}

/// Agent role within the tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AgentRole {
    Admin,
    Supervisor,
    Agent,
    /// Read-only dashboard user; never receives tickets
    Viewer,
}

impl AgentRole {
    /// Roles that may hold tickets
    pub const TICKET_HANDLERS: [AgentRole; 3] = [AgentRole::Admin, AgentRole::Supervisor, AgentRole::Agent];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Admin => "admin",
            AgentRole::Supervisor => "supervisor",
            AgentRole::Agent => "agent",
            AgentRole::Viewer => "viewer",
        }
    }

    pub fn handles_tickets(&self) -> bool {
        Self::TICKET_HANDLERS.contains(self)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(AgentRole::Admin),
            "supervisor" => Ok(AgentRole::Supervisor),
            "agent" => Ok(AgentRole::Agent),
            "viewer" => Ok(AgentRole::Viewer),
            _ => Err(format!("Unknown agent role: {}", s)),
        }
    }
}

/// Agent row from the capacity store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    pub tenant_id: TenantId,
    pub display_name: String,
    pub role: AgentRole,
    pub status: AgentStatus,
    pub assigned_channels: Vec<ChannelType>,
    pub current_load: u32,
    pub max_load: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Free slots left before reaching `max_load`; zero when overshooting
    pub fn available_slots(&self) -> u32 {
        self.max_load.saturating_sub(self.current_load)
    }

    pub fn serves_channel(&self, channel: ChannelType) -> bool {
        self.assigned_channels.contains(&channel)
    }

    pub(crate) fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        let channels_json: String = row.try_get("assigned_channels")?;
        Ok(Agent {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            display_name: row.try_get("display_name")?,
            role: row.try_get("role")?,
            status: row.try_get("status")?,
            assigned_channels: serde_json::from_str(&channels_json)?,
            current_load: row.try_get("current_load")?,
            max_load: row.try_get("max_load")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Request to create or update an agent profile
///
/// Updating an existing agent never changes its `current_load`; that counter
/// belongs to the slot manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub id: AgentId,
    pub tenant_id: TenantId,
    pub display_name: String,
    pub role: AgentRole,
    pub status: AgentStatus,
    pub assigned_channels: Vec<ChannelType>,
    pub max_load: u32,
}

impl AgentProfile {
    /// Offline agent with role `agent` and the given channels
    pub fn new(
        id: impl Into<AgentId>,
        tenant_id: impl Into<TenantId>,
        display_name: impl Into<String>,
        assigned_channels: Vec<ChannelType>,
        max_load: u32,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            display_name: display_name.into(),
            role: AgentRole::Agent,
            status: AgentStatus::Offline,
            assigned_channels,
            max_load,
        }
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_role(mut self, role: AgentRole) -> Self {
        self.role = role;
        self
    }
}
