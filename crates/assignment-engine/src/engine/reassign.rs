//! Supervisor transfers between agents

use chrono::Utc;
use tracing::{info, warn};

use super::core::AssignmentEngine;
use super::types::ReassignOutcome;
use crate::config::ReassignCapacityPolicy;
use crate::database::agents::{decrement_load, fetch_agent, increment_load};
use crate::database::assignments::{insert_assignment_record, NewAssignmentRecord};
use crate::database::queue::{delete_queue_entry, refresh_queue_positions};
use crate::database::tickets::{fetch_ticket, transfer_ticket};
use crate::error::{AssignmentConflict, EngineError, Result};
use crate::events::EngineEvent;
use crate::model::{AgentId, AssignmentType, TicketId};

impl AssignmentEngine {
    /// Move a ticket to `new_agent_id`, whoever holds it now
    ///
    /// The previous holder's load is decremented (floored at zero) and the new
    /// agent's incremented in the same transaction, and a `manual` audit row
    /// records both sides. The destination's `max_load` is not enforced; with
    /// [`ReassignCapacityPolicy::Warn`] an overshoot is logged. When a previous
    /// holder gave up a slot, the tenant queue is drained afterwards.
    pub async fn reassign_ticket(
        &self,
        ticket_id: &TicketId,
        new_agent_id: &AgentId,
        actor_id: Option<&str>,
        reason: Option<&str>,
    ) -> Result<ReassignOutcome> {
        let (outcome, released_load) = self
            .atomically("reassign_ticket", move || self.reassign_once(ticket_id, new_agent_id, actor_id, reason))
            .await?;

        if outcome.over_capacity && self.config.assignment.reassign_capacity_policy == ReassignCapacityPolicy::Warn {
            warn!(
                "⚠️ Ticket {} reassigned to agent {} beyond max load (override by {})",
                ticket_id,
                new_agent_id,
                actor_id.unwrap_or("unknown")
            );
        }
        info!(
            "🔀 Ticket #{} reassigned {} -> {}",
            outcome.ticket.ticket_number,
            outcome.from_agent.as_ref().map(|a| a.as_str()).unwrap_or("unassigned"),
            new_agent_id
        );

        let ticket = &outcome.ticket;
        let mut events = vec![
            EngineEvent::TicketAssigned {
                tenant_id: ticket.tenant_id.clone(),
                ticket_id: ticket.id.clone(),
                agent_id: new_agent_id.clone(),
                automatic: false,
            },
            EngineEvent::NewAssignment {
                tenant_id: ticket.tenant_id.clone(),
                agent_id: new_agent_id.clone(),
                ticket_id: ticket.id.clone(),
                ticket_number: ticket.ticket_number,
                contact_name: ticket.contact_name.clone(),
                channel_type: ticket.channel_type,
            },
            EngineEvent::TicketUpdated {
                tenant_id: ticket.tenant_id.clone(),
                ticket_id: ticket.id.clone(),
                status: ticket.status,
                assigned_agent_id: ticket.assigned_agent_id.clone(),
            },
        ];
        if let (Some(from), Some(current_load)) = (&outcome.from_agent, released_load) {
            events.push(EngineEvent::SlotReleased {
                tenant_id: ticket.tenant_id.clone(),
                agent_id: from.clone(),
                current_load,
            });
        }
        self.emit(events).await;

        if outcome.from_agent.is_some() {
            self.drain_after_release(&outcome.ticket.tenant_id).await;
        }
        Ok(outcome)
    }

    /// Returns the outcome and the previous holder's load after its release
    async fn reassign_once(
        &self,
        ticket_id: &TicketId,
        new_agent_id: &AgentId,
        actor_id: Option<&str>,
        reason: Option<&str>,
    ) -> Result<(ReassignOutcome, Option<u32>)> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let ticket = fetch_ticket(&mut tx, ticket_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("ticket {}", ticket_id)))?;
        if ticket.status.is_terminal() {
            return Err(EngineError::invalid_state(format!(
                "ticket {} is {} and cannot be reassigned",
                ticket_id, ticket.status
            )));
        }
        let target = fetch_agent(&mut tx, new_agent_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("agent {}", new_agent_id)))?;
        if target.tenant_id != ticket.tenant_id {
            return Err(EngineError::invalid_input(format!(
                "agent {} and ticket {} belong to different tenants",
                new_agent_id, ticket_id
            )));
        }
        if !target.role.handles_tickets() {
            return Err(EngineError::Conflict(AssignmentConflict::AgentUnavailable));
        }
        let from_agent = ticket.assigned_agent_id.clone();
        if from_agent.as_ref() == Some(new_agent_id) {
            return Err(EngineError::invalid_state(format!(
                "ticket {} is already assigned to agent {}",
                ticket_id, new_agent_id
            )));
        }

        let released_load = match &from_agent {
            Some(previous) => decrement_load(&mut tx, &ticket.tenant_id, previous).await?,
            None => None,
        };
        if !transfer_ticket(&mut tx, ticket_id, new_agent_id, now).await? {
            return Err(EngineError::Conflict(AssignmentConflict::TicketUnavailable));
        }
        let over_capacity = target.current_load >= target.max_load;
        increment_load(&mut tx, &ticket.tenant_id, new_agent_id, false).await?;

        if delete_queue_entry(&mut tx, &ticket.tenant_id, ticket_id).await? {
            refresh_queue_positions(&mut tx, &ticket.tenant_id).await?;
        }

        let record = insert_assignment_record(
            &mut tx,
            &NewAssignmentRecord {
                tenant_id: &ticket.tenant_id,
                ticket_id,
                from_agent: from_agent.as_ref(),
                to_agent: new_agent_id,
                assignment_type: AssignmentType::Manual,
                reason,
                actor_id,
            },
            now,
        )
        .await?;

        let ticket = fetch_ticket(&mut tx, ticket_id)
            .await?
            .ok_or_else(|| EngineError::internal(format!("ticket {} vanished during reassignment", ticket_id)))?;
        tx.commit().await?;

        Ok((
            ReassignOutcome {
                ticket,
                from_agent,
                to_agent: new_agent_id.clone(),
                record,
                over_capacity,
            },
            released_load,
        ))
    }
}
