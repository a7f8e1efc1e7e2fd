//! Queue store entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChannelType, Priority, TenantId, TicketId};

/// A ticket waiting for an agent. Unique per `(tenant_id, ticket_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub tenant_id: TenantId,
    pub ticket_id: TicketId,
    pub channel_type: ChannelType,
    pub priority: Priority,
    pub entered_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

/// Queue entry enriched for operator dashboards
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedTicket {
    /// 1-based position in drain order
    pub position: usize,
    pub ticket_id: TicketId,
    pub ticket_number: i64,
    pub contact_name: Option<String>,
    pub channel_type: ChannelType,
    pub priority: Priority,
    pub entered_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub waiting_minutes: i64,
}

impl QueuedTicket {
    pub(crate) fn from_parts(
        position: usize,
        entry: QueueEntry,
        ticket_number: i64,
        contact_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            position,
            waiting_minutes: (now - entry.entered_at).num_minutes().max(0),
            ticket_id: entry.ticket_id,
            ticket_number,
            contact_name,
            channel_type: entry.channel_type,
            priority: entry.priority,
            entered_at: entry.entered_at,
            attempts: entry.attempts,
            last_attempt_at: entry.last_attempt_at,
        }
    }
}

/// Result of one queue drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Entries examined in this pass
    pub processed: usize,
    /// Entries that ended with an agent
    pub assigned: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waiting_minutes_computed_from_entry_time() {
        let now = Utc::now();
        let entry = QueueEntry {
            tenant_id: "t1".into(),
            ticket_id: "k1".into(),
            channel_type: ChannelType::Email,
            priority: Priority::High,
            entered_at: now - chrono::Duration::minutes(12),
            attempts: 0,
            last_attempt_at: None,
        };
        let queued = QueuedTicket::from_parts(1, entry, 42, Some("Bob".to_string()), now);
        assert_eq!(queued.waiting_minutes, 12);
        assert_eq!(queued.ticket_number, 42);

        let json = serde_json::to_value(&queued).unwrap();
        assert_eq!(json["waitingMinutes"], 12);
    }
}
