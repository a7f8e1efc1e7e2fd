//! Connection-triggered bulk assignment

use tracing::{debug, info, warn};

use super::core::AssignmentEngine;
use super::types::{BulkAssignReason, BulkAssignResult};
use crate::error::{AssignmentConflict, EngineError, Result};
use crate::model::{AgentId, AssignmentType};

impl AssignmentEngine {
    /// Pull the oldest holding tickets in the agent's channels, up to their free slots
    ///
    /// Tickets are tried in creation order. A ticket that another writer claimed
    /// first is skipped; the pass stops once the agent reaches `max_load`.
    pub async fn auto_assign_tickets_to_agent(&self, agent_id: &AgentId) -> Result<BulkAssignResult> {
        let agent = self
            .db
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("agent {}", agent_id)))?;

        if !agent.role.handles_tickets() || !agent.status.accepts_assignments() {
            debug!("Agent {} ({}, {}) does not take tickets", agent_id, agent.role, agent.status);
            return Ok(BulkAssignResult::empty(agent.id, BulkAssignReason::AgentUnavailable));
        }
        let available_slots = agent.available_slots();
        if available_slots == 0 {
            return Ok(BulkAssignResult::empty(agent.id, BulkAssignReason::MaxCapacity));
        }
        if agent.assigned_channels.is_empty() {
            return Ok(BulkAssignResult::empty(agent.id, BulkAssignReason::NoChannels));
        }

        let limit = available_slots.min(self.config.assignment.bulk_assign_limit);
        let holding = self
            .db
            .list_holding_tickets(&agent.tenant_id, &agent.assigned_channels, limit)
            .await?;
        if holding.is_empty() {
            return Ok(BulkAssignResult::empty(agent.id, BulkAssignReason::NoHoldingTickets));
        }

        info!(
            "👥 Agent {} has {} free slots, trying {} holding tickets",
            agent_id,
            available_slots,
            holding.len()
        );

        let mut assigned = Vec::with_capacity(holding.len());
        let mut hit_capacity = false;
        for ticket in &holding {
            match self
                .assign_ticket_to_agent(&ticket.id, agent_id, AssignmentType::Auto, Some("agent_connected"), None)
                .await
            {
                Ok(_) => assigned.push(ticket.id.clone()),
                Err(EngineError::Conflict(AssignmentConflict::AgentAtCapacity)) => {
                    hit_capacity = true;
                    break;
                }
                Err(EngineError::Conflict(AssignmentConflict::AgentUnavailable)) => {
                    warn!("⚠️ Agent {} stopped accepting tickets during bulk assignment", agent_id);
                    break;
                }
                Err(e) => warn!("⚠️ Skipping ticket #{} for agent {}: {}", ticket.ticket_number, agent_id, e),
            }
        }

        let reason = if assigned.is_empty() && hit_capacity {
            BulkAssignReason::MaxCapacity
        } else {
            BulkAssignReason::Success
        };
        info!("✅ Bulk assigned {} tickets to agent {} ({})", assigned.len(), agent_id, reason);

        Ok(BulkAssignResult {
            agent_id: agent.id,
            assigned,
            reason,
        })
    }
}
