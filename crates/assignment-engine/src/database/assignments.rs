//! Append-only assignment audit trail

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::DatabaseManager;
use crate::error::Result;
use crate::model::{AgentId, AssignmentRecord, AssignmentType, TenantId, TicketId};

const RECORD_COLUMNS: &str =
    "id, tenant_id, ticket_id, from_agent_id, to_agent_id, assignment_type, reason, actor_id, created_at";

/// Fields of one audit row, written in the same transaction as the transition it describes
#[derive(Debug, Clone)]
pub struct NewAssignmentRecord<'a> {
    pub tenant_id: &'a TenantId,
    pub ticket_id: &'a TicketId,
    pub from_agent: Option<&'a AgentId>,
    pub to_agent: &'a AgentId,
    pub assignment_type: AssignmentType,
    pub reason: Option<&'a str>,
    pub actor_id: Option<&'a str>,
}

impl DatabaseManager {
    /// Every assignment of `ticket_id`, oldest first
    pub async fn assignment_history(&self, ticket_id: &TicketId) -> Result<Vec<AssignmentRecord>> {
        let records = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "SELECT {} FROM assignment_records WHERE ticket_id = ? ORDER BY id ASC",
            RECORD_COLUMNS
        ))
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}

pub async fn insert_assignment_record(
    conn: &mut SqliteConnection,
    record: &NewAssignmentRecord<'_>,
    now: DateTime<Utc>,
) -> Result<AssignmentRecord> {
    let stored = sqlx::query_as::<_, AssignmentRecord>(&format!(
        "INSERT INTO assignment_records
            (tenant_id, ticket_id, from_agent_id, to_agent_id, assignment_type, reason, actor_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING {}",
        RECORD_COLUMNS
    ))
    .bind(record.tenant_id)
    .bind(record.ticket_id)
    .bind(record.from_agent)
    .bind(record.to_agent)
    .bind(record.assignment_type)
    .bind(record.reason)
    .bind(record.actor_id)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(stored)
}
