//! Queue store
//!
//! Drain and listing order is `priority_rank` ascending (urgent first), then
//! `entered_at` ascending, with the ticket number as a final tie-break.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Row, SqliteConnection};
use tracing::debug;

use super::DatabaseManager;
use crate::error::Result;
use crate::model::{ChannelType, Priority, QueueEntry, QueuedTicket, TenantId, TicketId};

const ENTRY_COLUMNS: &str = "q.tenant_id, q.ticket_id, q.channel_type, q.priority, q.entered_at, q.attempts, q.last_attempt_at";

const DRAIN_ORDER: &str = "q.priority_rank ASC, q.entered_at ASC, t.ticket_number ASC";

impl DatabaseManager {
    /// The first `limit` entries in drain order whose channel has a free agent
    ///
    /// Entries in channels nobody can serve right now are skipped, so they never
    /// hold back tickets queued behind them in other channels.
    pub async fn next_queue_batch(&self, tenant_id: &TenantId, limit: u32) -> Result<Vec<QueueEntry>> {
        let entries = sqlx::query_as::<_, QueueEntry>(&format!(
            "SELECT {} FROM queue_entries q
             JOIN tickets t ON t.id = q.ticket_id
             WHERE q.tenant_id = ?
               AND EXISTS (
                   SELECT 1 FROM agents a, json_each(a.assigned_channels) j
                   WHERE a.tenant_id = q.tenant_id
                     AND j.value = q.channel_type
                     AND a.role IN ('admin', 'supervisor', 'agent')
                     AND a.status IN ('online', 'away')
                     AND a.current_load < a.max_load
               )
             ORDER BY {}
             LIMIT ?",
            ENTRY_COLUMNS, DRAIN_ORDER
        ))
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Every entry of the tenant's queue in drain order, with dashboard fields
    pub async fn list_queue(&self, tenant_id: &TenantId) -> Result<Vec<QueuedTicket>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, t.ticket_number, t.contact_name FROM queue_entries q
             JOIN tickets t ON t.id = q.ticket_id
             WHERE q.tenant_id = ?
             ORDER BY {}",
            ENTRY_COLUMNS, DRAIN_ORDER
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        let mut queued = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let entry = QueueEntry::from_row(row)?;
            let ticket_number: i64 = row.try_get("ticket_number")?;
            let contact_name: Option<String> = row.try_get("contact_name")?;
            queued.push(QueuedTicket::from_parts(index + 1, entry, ticket_number, contact_name, now));
        }
        Ok(queued)
    }

    pub async fn get_queue_entry(&self, tenant_id: &TenantId, ticket_id: &TicketId) -> Result<Option<QueueEntry>> {
        let entry = sqlx::query_as::<_, QueueEntry>(&format!(
            "SELECT {} FROM queue_entries q WHERE q.tenant_id = ? AND q.ticket_id = ?",
            ENTRY_COLUMNS
        ))
        .bind(tenant_id)
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    pub async fn queue_depth(&self, tenant_id: &TenantId) -> Result<i64> {
        let depth: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_entries WHERE tenant_id = ?")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(depth)
    }

    /// Note a drain attempt that found no agent for the entry
    pub async fn record_queue_attempt(&self, tenant_id: &TenantId, ticket_id: &TicketId) -> Result<()> {
        sqlx::query(
            "UPDATE queue_entries SET attempts = attempts + 1, last_attempt_at = ?
             WHERE tenant_id = ? AND ticket_id = ?",
        )
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(ticket_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Insert the ticket into the queue, or count a re-entry if it is already there
///
/// A fresh entry starts with `attempts = 0`; each re-entry increments `attempts`
/// and stamps `last_attempt_at`, keeping the original `entered_at`.
pub async fn upsert_queue_entry(
    conn: &mut SqliteConnection,
    tenant_id: &TenantId,
    ticket_id: &TicketId,
    channel: ChannelType,
    priority: Priority,
    now: DateTime<Utc>,
) -> Result<QueueEntry> {
    let entry = sqlx::query_as::<_, QueueEntry>(
        "INSERT INTO queue_entries (tenant_id, ticket_id, channel_type, priority, priority_rank, entered_at, attempts)
         VALUES (?, ?, ?, ?, ?, ?, 0)
         ON CONFLICT(tenant_id, ticket_id) DO UPDATE SET
            attempts = queue_entries.attempts + 1,
            last_attempt_at = excluded.entered_at
         RETURNING tenant_id, ticket_id, channel_type, priority, entered_at, attempts, last_attempt_at",
    )
    .bind(tenant_id)
    .bind(ticket_id)
    .bind(channel)
    .bind(priority)
    .bind(priority.rank())
    .bind(now)
    .fetch_one(conn)
    .await?;

    debug!("Queue entry for ticket {} now has {} attempts", ticket_id, entry.attempts);
    Ok(entry)
}

pub async fn delete_queue_entry(conn: &mut SqliteConnection, tenant_id: &TenantId, ticket_id: &TicketId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM queue_entries WHERE tenant_id = ? AND ticket_id = ?")
        .bind(tenant_id)
        .bind(ticket_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Renumber `queue_position` (1-based, drain order) for every queued ticket of the tenant
pub async fn refresh_queue_positions(conn: &mut SqliteConnection, tenant_id: &TenantId) -> Result<()> {
    sqlx::query(&format!(
        "UPDATE tickets SET queue_position = (
            SELECT ranked.position FROM (
                SELECT q.ticket_id AS ticket_id, ROW_NUMBER() OVER (ORDER BY {}) AS position
                FROM queue_entries q
                JOIN tickets t ON t.id = q.ticket_id
                WHERE q.tenant_id = ?
            ) ranked
            WHERE ranked.ticket_id = tickets.id
         )
         WHERE tenant_id = ? AND id IN (SELECT ticket_id FROM queue_entries WHERE tenant_id = ?)",
        DRAIN_ORDER
    ))
    .bind(tenant_id)
    .bind(tenant_id)
    .bind(tenant_id)
    .execute(conn)
    .await?;
    Ok(())
}
