//! Queue management: enqueue, drain, listing

use chrono::Utc;
use tracing::{debug, info, warn};

use super::core::AssignmentEngine;
use crate::database::queue::{delete_queue_entry, refresh_queue_positions, upsert_queue_entry};
use crate::database::tickets::{fetch_ticket, mark_ticket_pending};
use crate::error::{AssignmentConflict, EngineError, Result};
use crate::events::EngineEvent;
use crate::model::{AssignmentType, ChannelType, DrainReport, QueueEntry, QueuedTicket, TenantId, TicketId};

impl AssignmentEngine {
    /// Put an unassigned ticket in the tenant queue
    ///
    /// Re-queuing a ticket that is already waiting counts an attempt instead of
    /// adding a second entry. The ticket becomes `pending` and keeps the first
    /// `waiting_since`. `channel` must be the ticket's own channel.
    pub async fn add_to_queue(
        &self,
        ticket_id: &TicketId,
        tenant_id: &TenantId,
        channel: ChannelType,
    ) -> Result<QueueEntry> {
        let entry = self
            .atomically("add_to_queue", move || async move {
                let now = Utc::now();
                let mut tx = self.db.begin().await?;

                let ticket = fetch_ticket(&mut tx, ticket_id)
                    .await?
                    .ok_or_else(|| EngineError::not_found(format!("ticket {}", ticket_id)))?;
                if &ticket.tenant_id != tenant_id {
                    return Err(EngineError::invalid_input(format!(
                        "ticket {} does not belong to tenant {}",
                        ticket_id, tenant_id
                    )));
                }
                if ticket.channel_type != channel {
                    return Err(EngineError::invalid_input(format!(
                        "ticket {} arrived on {}, not {}",
                        ticket_id, ticket.channel_type, channel
                    )));
                }
                if !ticket.is_holding() {
                    return Err(EngineError::invalid_state(format!(
                        "ticket {} is assigned or closed and cannot be queued",
                        ticket_id
                    )));
                }

                let entry = upsert_queue_entry(&mut tx, tenant_id, ticket_id, ticket.channel_type, ticket.priority, now).await?;
                mark_ticket_pending(&mut tx, ticket_id, now).await?;
                refresh_queue_positions(&mut tx, tenant_id).await?;
                tx.commit().await?;
                Ok(entry)
            })
            .await?;

        info!(
            "📋 Ticket {} queued in tenant {} ({} priority, attempts {})",
            ticket_id, tenant_id, entry.priority, entry.attempts
        );
        self.emit(vec![
            EngineEvent::TicketQueued {
                tenant_id: tenant_id.clone(),
                ticket_id: ticket_id.clone(),
                attempts: entry.attempts,
            },
            EngineEvent::TicketUpdated {
                tenant_id: tenant_id.clone(),
                ticket_id: ticket_id.clone(),
                status: crate::model::TicketStatus::Pending,
                assigned_agent_id: None,
            },
        ])
        .await;

        Ok(entry)
    }

    /// Try to hand the oldest, most urgent queued tickets to free agents
    ///
    /// Examines at most `queue.drain_batch_size` entries in drain order, taken
    /// only from channels that currently have a free agent. Entries that still
    /// find nobody stay queued with their attempt counted; a failing entry is
    /// logged and does not stop the rest of the batch.
    pub async fn process_queue(&self, tenant_id: &TenantId) -> Result<DrainReport> {
        let batch = self
            .db
            .next_queue_batch(tenant_id, self.config.queue.drain_batch_size)
            .await?;
        let mut report = DrainReport::default();
        if batch.is_empty() {
            return Ok(report);
        }

        debug!("🔄 Draining {} queue entries for tenant {}", batch.len(), tenant_id);
        for entry in &batch {
            report.processed += 1;
            match self.assign_queued_entry(entry).await {
                Ok(true) => report.assigned += 1,
                Ok(false) => {
                    if let Err(e) = self.db.record_queue_attempt(tenant_id, &entry.ticket_id).await {
                        warn!("⚠️ Could not record drain attempt for ticket {}: {}", entry.ticket_id, e);
                    }
                }
                Err(e) => warn!("⚠️ Drain of ticket {} failed, leaving it queued: {}", entry.ticket_id, e),
            }
        }

        if report.assigned > 0 {
            info!(
                "📊 Drained tenant {}: {} of {} examined entries assigned",
                tenant_id, report.assigned, report.processed
            );
        }
        Ok(report)
    }

    /// The tenant queue in drain order with waiting times
    pub async fn get_queued_tickets(&self, tenant_id: &TenantId) -> Result<Vec<QueuedTicket>> {
        self.db.list_queue(tenant_id).await
    }

    /// Returns whether the entry's ticket ended up with an agent
    async fn assign_queued_entry(&self, entry: &QueueEntry) -> Result<bool> {
        for _ in 0..self.config.assignment.max_selection_attempts {
            let Some(agent) = self.find_available_agent(&entry.tenant_id, entry.channel_type).await? else {
                return Ok(false);
            };

            match self
                .assign_ticket_to_agent(&entry.ticket_id, &agent.id, AssignmentType::Auto, Some("queue_drain"), None)
                .await
            {
                Ok(_) => return Ok(true),
                Err(EngineError::Conflict(AssignmentConflict::TicketUnavailable)) => {
                    self.discard_stale_entry(entry).await?;
                    return Ok(false);
                }
                Err(EngineError::Conflict(conflict)) => {
                    debug!("Agent {} lost the race for ticket {}: {}", agent.id, entry.ticket_id, conflict);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    /// Remove an entry whose ticket was assigned or closed elsewhere
    async fn discard_stale_entry(&self, entry: &QueueEntry) -> Result<()> {
        let removed = self
            .atomically("discard_stale_entry", move || async move {
                let mut tx = self.db.begin().await?;
                let holding = fetch_ticket(&mut tx, &entry.ticket_id)
                    .await?
                    .map(|t| t.is_holding())
                    .unwrap_or(false);
                let removed = if holding {
                    false
                } else {
                    let removed = delete_queue_entry(&mut tx, &entry.tenant_id, &entry.ticket_id).await?;
                    refresh_queue_positions(&mut tx, &entry.tenant_id).await?;
                    removed
                };
                tx.commit().await?;
                Ok(removed)
            })
            .await?;

        if removed {
            debug!("🧹 Removed stale queue entry for ticket {}", entry.ticket_id);
        }
        Ok(())
    }
}
