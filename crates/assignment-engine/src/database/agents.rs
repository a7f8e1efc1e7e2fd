//! Agent capacity store

use chrono::Utc;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info};

use super::DatabaseManager;
use crate::error::{EngineError, Result};
use crate::model::{Agent, AgentId, AgentProfile, AgentStatus, ChannelType, TenantId};

const AGENT_COLUMNS: &str = "id, tenant_id, display_name, role, status, assigned_channels, \
                             current_load, max_load, created_at, updated_at";

// Agent operations implementation
impl DatabaseManager {
    /// Register or update an agent profile
    ///
    /// `current_load` starts at zero for new agents and is left untouched for
    /// existing ones. An agent id already owned by another tenant is rejected.
    pub async fn upsert_agent(&self, profile: &AgentProfile) -> Result<Agent> {
        if profile.max_load == 0 {
            return Err(EngineError::invalid_input("max_load must be greater than zero"));
        }
        let now = Utc::now();
        let channels_json = serde_json::to_string(&profile.assigned_channels)?;

        sqlx::query(
            "INSERT INTO agents (id, tenant_id, display_name, role, status, assigned_channels,
                                 current_load, max_load, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                role = excluded.role,
                status = excluded.status,
                assigned_channels = excluded.assigned_channels,
                max_load = excluded.max_load,
                updated_at = excluded.updated_at
             WHERE agents.tenant_id = excluded.tenant_id
               AND (excluded.max_load >= agents.max_load OR excluded.max_load >= agents.current_load)",
        )
        .bind(&profile.id)
        .bind(&profile.tenant_id)
        .bind(&profile.display_name)
        .bind(profile.role)
        .bind(profile.status)
        .bind(channels_json)
        .bind(profile.max_load)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let agent = self
            .get_agent(&profile.id)
            .await?
            .ok_or_else(|| EngineError::internal(format!("agent {} vanished after upsert", profile.id)))?;
        if agent.tenant_id != profile.tenant_id {
            return Err(EngineError::invalid_input(format!(
                "agent {} belongs to another tenant",
                profile.id
            )));
        }
        if agent.max_load != profile.max_load {
            return Err(EngineError::invalid_input(format!(
                "max_load {} is below the current load {} of agent {}",
                profile.max_load, agent.current_load, profile.id
            )));
        }

        info!("✅ Agent {} upserted ({} channels, max load {})", agent.id, agent.assigned_channels.len(), agent.max_load);
        Ok(agent)
    }

    pub async fn get_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>> {
        let row = sqlx::query(&format!("SELECT {} FROM agents WHERE id = ?", AGENT_COLUMNS))
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Agent::from_row).transpose()
    }

    pub async fn list_agents(&self, tenant_id: &TenantId) -> Result<Vec<Agent>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM agents WHERE tenant_id = ? ORDER BY display_name, id",
            AGENT_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Agent::from_row).collect()
    }

    /// Agents the selector may pick for `channel`, least loaded first
    ///
    /// Ticket-handling role, `online`/`away`, serving the channel, below `max_load`.
    pub async fn find_candidate_agents(&self, tenant_id: &TenantId, channel: ChannelType) -> Result<Vec<Agent>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM agents
             WHERE tenant_id = ?
               AND role IN ('admin', 'supervisor', 'agent')
               AND status IN ('online', 'away')
               AND current_load < max_load
               AND EXISTS (SELECT 1 FROM json_each(agents.assigned_channels) WHERE json_each.value = ?)
             ORDER BY current_load ASC",
            AGENT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(channel)
        .fetch_all(&self.pool)
        .await?;

        let agents = rows.iter().map(Agent::from_row).collect::<Result<Vec<_>>>()?;
        debug!("Found {} candidate agents for {} in tenant {}", agents.len(), channel, tenant_id);
        Ok(agents)
    }

    /// Record a presence change, returning the previous status
    pub async fn set_agent_status(&self, agent_id: &AgentId, status: AgentStatus) -> Result<AgentStatus> {
        let mut tx = self.begin().await?;

        let row = sqlx::query("SELECT status FROM agents WHERE id = ?")
            .bind(agent_id)
            .fetch_optional(&mut *tx)
            .await?;
        let previous: AgentStatus = match row {
            Some(row) => row.try_get("status")?,
            None => return Err(EngineError::not_found(format!("agent {}", agent_id))),
        };

        sqlx::query("UPDATE agents SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("Agent {} status {} -> {}", agent_id, previous, status);
        Ok(previous)
    }
}

/// Read an agent inside an open transaction
pub async fn fetch_agent(conn: &mut SqliteConnection, agent_id: &AgentId) -> Result<Option<Agent>> {
    let row = sqlx::query(&format!("SELECT {} FROM agents WHERE id = ?", AGENT_COLUMNS))
        .bind(agent_id)
        .fetch_optional(conn)
        .await?;

    row.as_ref().map(Agent::from_row).transpose()
}

/// Take one slot on the agent
///
/// With `enforce_capacity` the increment only applies while `current_load < max_load`;
/// the return value tells whether the row was updated.
pub async fn increment_load(
    conn: &mut SqliteConnection,
    tenant_id: &TenantId,
    agent_id: &AgentId,
    enforce_capacity: bool,
) -> Result<bool> {
    let sql = if enforce_capacity {
        "UPDATE agents SET current_load = current_load + 1, updated_at = ?
         WHERE id = ? AND tenant_id = ? AND current_load < max_load"
    } else {
        "UPDATE agents SET current_load = current_load + 1, updated_at = ?
         WHERE id = ? AND tenant_id = ?"
    };

    let result = sqlx::query(sql)
        .bind(Utc::now())
        .bind(agent_id)
        .bind(tenant_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Give one slot back, floored at zero. Returns the new load, or `None` for an unknown agent.
pub async fn decrement_load(
    conn: &mut SqliteConnection,
    tenant_id: &TenantId,
    agent_id: &AgentId,
) -> Result<Option<u32>> {
    let row = sqlx::query(
        "UPDATE agents SET current_load = MAX(0, current_load - 1), updated_at = ?
         WHERE id = ? AND tenant_id = ?
         RETURNING current_load",
    )
    .bind(Utc::now())
    .bind(agent_id)
    .bind(tenant_id)
    .fetch_optional(conn)
    .await?;

    row.map(|r| r.try_get::<u32, _>("current_load")).transpose().map_err(Into::into)
}
