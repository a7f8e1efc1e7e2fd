//! Ticket rows

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use super::DatabaseManager;
use crate::error::Result;
use crate::model::{AgentId, ChannelType, NewTicket, TenantId, Ticket, TicketId, TicketStatus};

const TICKET_COLUMNS: &str = "id, tenant_id, ticket_number, channel_type, contact_external_id, contact_name, \
                              priority, status, assigned_agent_id, queue_position, waiting_since, \
                              assigned_at, last_message_at, created_at, updated_at";

impl DatabaseManager {
    /// Create an `open`, unassigned ticket with the tenant's next ticket number
    ///
    /// Numbering happens in the same statement as the insert so concurrent
    /// creations cannot draw the same number.
    pub async fn insert_ticket(&self, new_ticket: &NewTicket) -> Result<Ticket> {
        let now = Utc::now();
        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            "INSERT INTO tickets (id, tenant_id, ticket_number, channel_type, contact_external_id, contact_name,
                                  priority, status, last_message_at, created_at, updated_at)
             SELECT ?, ?, COALESCE(MAX(ticket_number), 0) + 1, ?, ?, ?, ?, 'open', ?, ?, ?
             FROM tickets WHERE tenant_id = ?
             RETURNING {}",
            TICKET_COLUMNS
        ))
        .bind(TicketId::new())
        .bind(&new_ticket.tenant_id)
        .bind(new_ticket.channel_type)
        .bind(&new_ticket.contact_external_id)
        .bind(&new_ticket.contact_name)
        .bind(new_ticket.priority)
        .bind(now)
        .bind(now)
        .bind(now)
        .bind(&new_ticket.tenant_id)
        .fetch_one(&self.pool)
        .await?;

        info!("🎫 Ticket #{} ({}) created on {} for tenant {}", ticket.ticket_number, ticket.id, ticket.channel_type, ticket.tenant_id);
        Ok(ticket)
    }

    pub async fn get_ticket(&self, ticket_id: &TicketId) -> Result<Option<Ticket>> {
        let ticket = sqlx::query_as::<_, Ticket>(&format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS))
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    /// The contact's most recent non-terminal ticket on `channel`
    pub async fn find_active_ticket_for_contact(
        &self,
        tenant_id: &TenantId,
        contact_external_id: &str,
        channel: ChannelType,
    ) -> Result<Option<Ticket>> {
        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {} FROM tickets
             WHERE tenant_id = ? AND contact_external_id = ? AND channel_type = ?
               AND status NOT IN ('resolved', 'closed')
             ORDER BY created_at DESC
             LIMIT 1",
            TICKET_COLUMNS
        ))
        .bind(tenant_id)
        .bind(contact_external_id)
        .bind(channel)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ticket)
    }

    pub async fn touch_last_message(&self, ticket_id: &TicketId) -> Result<()> {
        sqlx::query("UPDATE tickets SET last_message_at = ?, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(Utc::now())
            .bind(ticket_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Oldest unassigned, non-terminal tickets in any of `channels`
    pub async fn list_holding_tickets(
        &self,
        tenant_id: &TenantId,
        channels: &[ChannelType],
        limit: u32,
    ) -> Result<Vec<Ticket>> {
        let channels_json = serde_json::to_string(channels)?;
        let tickets = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {} FROM tickets
             WHERE tenant_id = ?
               AND assigned_agent_id IS NULL
               AND status NOT IN ('resolved', 'closed')
               AND channel_type IN (SELECT value FROM json_each(?))
             ORDER BY created_at ASC, ticket_number ASC
             LIMIT ?",
            TICKET_COLUMNS
        ))
        .bind(tenant_id)
        .bind(channels_json)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} holding tickets for tenant {}", tickets.len(), tenant_id);
        Ok(tickets)
    }

    /// Non-terminal tickets currently held by `agent_id`
    pub async fn count_active_tickets_for_agent(&self, agent_id: &AgentId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets WHERE assigned_agent_id = ? AND status NOT IN ('resolved', 'closed')",
        )
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

/// Read a ticket inside an open transaction
pub async fn fetch_ticket(conn: &mut SqliteConnection, ticket_id: &TicketId) -> Result<Option<Ticket>> {
    let ticket = sqlx::query_as::<_, Ticket>(&format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS))
        .bind(ticket_id)
        .fetch_optional(conn)
        .await?;
    Ok(ticket)
}

/// Give an unassigned, non-terminal ticket to `agent_id`
///
/// Returns `false` when another writer already claimed the ticket or it was closed.
pub async fn claim_ticket(
    conn: &mut SqliteConnection,
    ticket_id: &TicketId,
    agent_id: &AgentId,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE tickets
         SET status = 'in_progress', assigned_agent_id = ?, assigned_at = ?,
             queue_position = NULL, waiting_since = NULL, updated_at = ?
         WHERE id = ? AND assigned_agent_id IS NULL AND status NOT IN ('resolved', 'closed')",
    )
    .bind(agent_id)
    .bind(now)
    .bind(now)
    .bind(ticket_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Move a non-terminal ticket to `agent_id` regardless of its current holder
pub async fn transfer_ticket(
    conn: &mut SqliteConnection,
    ticket_id: &TicketId,
    agent_id: &AgentId,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE tickets
         SET status = 'in_progress', assigned_agent_id = ?, assigned_at = ?,
             queue_position = NULL, waiting_since = NULL, updated_at = ?
         WHERE id = ? AND status NOT IN ('resolved', 'closed')",
    )
    .bind(agent_id)
    .bind(now)
    .bind(now)
    .bind(ticket_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark an unassigned ticket as waiting; the first wait start is preserved
pub async fn mark_ticket_pending(conn: &mut SqliteConnection, ticket_id: &TicketId, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE tickets
         SET status = 'pending', waiting_since = COALESCE(waiting_since, ?), updated_at = ?
         WHERE id = ? AND assigned_agent_id IS NULL AND status NOT IN ('resolved', 'closed')",
    )
    .bind(now)
    .bind(now)
    .bind(ticket_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Change the status of a non-terminal ticket. Terminal targets also clear queue fields.
pub async fn set_ticket_status(
    conn: &mut SqliteConnection,
    ticket_id: &TicketId,
    status: TicketStatus,
    now: DateTime<Utc>,
) -> Result<bool> {
    let sql = if status.is_terminal() {
        "UPDATE tickets SET status = ?, queue_position = NULL, waiting_since = NULL, updated_at = ?
         WHERE id = ? AND status NOT IN ('resolved', 'closed')"
    } else {
        "UPDATE tickets SET status = ?, updated_at = ?
         WHERE id = ? AND status NOT IN ('resolved', 'closed')"
    };

    let result = sqlx::query(sql)
        .bind(status)
        .bind(now)
        .bind(ticket_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgentProfile, Priority};

    async fn setup() -> DatabaseManager {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        db.create_tenant(&"t1".into(), "Tenant One").await.unwrap();
        db.create_tenant(&"t2".into(), "Tenant Two").await.unwrap();
        db.upsert_agent(&AgentProfile::new("agent-001", "t1", "Alice", vec![ChannelType::Email], 2))
            .await
            .unwrap();
        db
    }

    fn new_ticket(tenant: &str, contact: &str, channel: ChannelType) -> NewTicket {
        NewTicket {
            tenant_id: tenant.into(),
            channel_type: channel,
            contact_external_id: contact.to_string(),
            contact_name: Some(format!("Contact {}", contact)),
            priority: Priority::Medium,
        }
    }

    #[tokio::test]
    async fn test_ticket_numbers_are_per_tenant() {
        let db = setup().await;
        let a = db.insert_ticket(&new_ticket("t1", "c1", ChannelType::Email)).await.unwrap();
        let b = db.insert_ticket(&new_ticket("t1", "c2", ChannelType::Email)).await.unwrap();
        let c = db.insert_ticket(&new_ticket("t2", "c1", ChannelType::Email)).await.unwrap();

        assert_eq!(a.ticket_number, 1);
        assert_eq!(b.ticket_number, 2);
        assert_eq!(c.ticket_number, 1);
        assert_eq!(a.status, TicketStatus::Open);
        assert!(a.is_holding());
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let db = setup().await;
        let ticket = db.insert_ticket(&new_ticket("t1", "c1", ChannelType::Email)).await.unwrap();
        let agent: AgentId = "agent-001".into();

        let mut tx = db.begin().await.unwrap();
        assert!(claim_ticket(&mut tx, &ticket.id, &agent, Utc::now()).await.unwrap());
        assert!(!claim_ticket(&mut tx, &ticket.id, &agent, Utc::now()).await.unwrap());
        tx.commit().await.unwrap();

        let stored = db.get_ticket(&ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::InProgress);
        assert_eq!(stored.assigned_agent_id, Some(agent));
        assert!(stored.assigned_at.is_some());
    }

    #[tokio::test]
    async fn test_active_ticket_lookup_ignores_closed() {
        let db = setup().await;
        let ticket = db.insert_ticket(&new_ticket("t1", "c1", ChannelType::Email)).await.unwrap();

        let found = db.find_active_ticket_for_contact(&"t1".into(), "c1", ChannelType::Email).await.unwrap();
        assert_eq!(found.map(|t| t.id), Some(ticket.id.clone()));

        let mut tx = db.begin().await.unwrap();
        assert!(set_ticket_status(&mut tx, &ticket.id, TicketStatus::Closed, Utc::now()).await.unwrap());
        assert!(!set_ticket_status(&mut tx, &ticket.id, TicketStatus::Open, Utc::now()).await.unwrap());
        tx.commit().await.unwrap();

        let found = db.find_active_ticket_for_contact(&"t1".into(), "c1", ChannelType::Email).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_pending_keeps_first_waiting_since() {
        let db = setup().await;
        let ticket = db.insert_ticket(&new_ticket("t1", "c1", ChannelType::Email)).await.unwrap();
        let first = Utc::now() - chrono::Duration::minutes(5);

        let mut tx = db.begin().await.unwrap();
        assert!(mark_ticket_pending(&mut tx, &ticket.id, first).await.unwrap());
        assert!(mark_ticket_pending(&mut tx, &ticket.id, Utc::now()).await.unwrap());
        tx.commit().await.unwrap();

        let stored = db.get_ticket(&ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Pending);
        let waiting_since = stored.waiting_since.unwrap();
        assert!(waiting_since < Utc::now() - chrono::Duration::minutes(4));
    }
}
