//! Slot management: the atomic assign and release transitions
//!
//! An assignment touches the ticket row, the agent load counter, the queue entry
//! and the audit trail in one transaction. Each step is a conditional write whose
//! affected-row count decides the outcome, so a concurrent writer makes the whole
//! transaction roll back with an [`AssignmentConflict`] instead of half-applying.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::core::AssignmentEngine;
use super::types::{Assignment, ReleaseOutcome};
use crate::database::agents::{decrement_load, fetch_agent, increment_load};
use crate::database::assignments::{insert_assignment_record, NewAssignmentRecord};
use crate::database::queue::{delete_queue_entry, refresh_queue_positions};
use crate::database::tickets::{claim_ticket, fetch_ticket};
use crate::error::{AssignmentConflict, EngineError, Result};
use crate::events::EngineEvent;
use crate::model::{AgentId, AssignmentType, DrainReport, TenantId, TicketId};

impl AssignmentEngine {
    /// Give an unassigned ticket to `agent_id`
    ///
    /// Automatic assignments require an agent that accepts tickets on the ticket's
    /// channel; manual ones only require a ticket-handling role. Both respect
    /// `max_load`. On [`EngineError::Conflict`] nothing was written and the caller
    /// may re-run selection.
    pub async fn assign_ticket_to_agent(
        &self,
        ticket_id: &TicketId,
        agent_id: &AgentId,
        assignment_type: AssignmentType,
        reason: Option<&str>,
        actor_id: Option<&str>,
    ) -> Result<Assignment> {
        let assignment = self
            .atomically("assign_ticket", move || {
                self.assign_once(ticket_id, agent_id, assignment_type, reason, actor_id)
            })
            .await?;

        info!(
            "✅ Ticket #{} ({}) assigned to agent {} [{}]",
            assignment.ticket.ticket_number, ticket_id, agent_id, assignment_type
        );

        let ticket = &assignment.ticket;
        self.emit(vec![
            EngineEvent::TicketAssigned {
                tenant_id: ticket.tenant_id.clone(),
                ticket_id: ticket.id.clone(),
                agent_id: agent_id.clone(),
                automatic: assignment_type.is_automatic(),
            },
            EngineEvent::NewAssignment {
                tenant_id: ticket.tenant_id.clone(),
                agent_id: agent_id.clone(),
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
        ])
        .await;

        Ok(assignment)
    }

    async fn assign_once(
        &self,
        ticket_id: &TicketId,
        agent_id: &AgentId,
        assignment_type: AssignmentType,
        reason: Option<&str>,
        actor_id: Option<&str>,
    ) -> Result<Assignment> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let ticket = fetch_ticket(&mut tx, ticket_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("ticket {}", ticket_id)))?;
        let agent = fetch_agent(&mut tx, agent_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("agent {}", agent_id)))?;

        if agent.tenant_id != ticket.tenant_id {
            return Err(EngineError::invalid_input(format!(
                "agent {} and ticket {} belong to different tenants",
                agent_id, ticket_id
            )));
        }
        if !ticket.is_holding() {
            return Err(EngineError::Conflict(AssignmentConflict::TicketUnavailable));
        }
        let eligible = match assignment_type {
            AssignmentType::Auto => {
                agent.role.handles_tickets()
                    && agent.status.accepts_assignments()
                    && agent.serves_channel(ticket.channel_type)
            }
            AssignmentType::Manual => agent.role.handles_tickets(),
        };
        if !eligible {
            return Err(EngineError::Conflict(AssignmentConflict::AgentUnavailable));
        }

        if !claim_ticket(&mut tx, ticket_id, agent_id, now).await? {
            return Err(EngineError::Conflict(AssignmentConflict::TicketUnavailable));
        }
        if !increment_load(&mut tx, &ticket.tenant_id, agent_id, true).await? {
            return Err(EngineError::Conflict(AssignmentConflict::AgentAtCapacity));
        }

        let dequeued = delete_queue_entry(&mut tx, &ticket.tenant_id, ticket_id).await?;
        if dequeued {
            refresh_queue_positions(&mut tx, &ticket.tenant_id).await?;
        }

        let record = insert_assignment_record(
            &mut tx,
            &NewAssignmentRecord {
                tenant_id: &ticket.tenant_id,
                ticket_id,
                from_agent: None,
                to_agent: agent_id,
                assignment_type,
                reason,
                actor_id,
            },
            now,
        )
        .await?;

        let ticket = fetch_ticket(&mut tx, ticket_id)
            .await?
            .ok_or_else(|| EngineError::internal(format!("ticket {} vanished during assignment", ticket_id)))?;
        tx.commit().await?;

        Ok(Assignment {
            ticket,
            agent_id: agent_id.clone(),
            record,
            dequeued,
        })
    }

    /// Give one slot back to the agent, then drain the tenant queue
    ///
    /// The load is floored at zero, so repeated calls are harmless. The drain runs
    /// after the release commits; a failing drain is logged and reported as empty.
    pub async fn release_agent_slot(&self, agent_id: &AgentId, tenant_id: &TenantId) -> Result<ReleaseOutcome> {
        let current_load = self
            .atomically("release_slot", move || async move {
                let mut tx = self.db.begin().await?;
                let load = decrement_load(&mut tx, tenant_id, agent_id)
                    .await?
                    .ok_or_else(|| EngineError::not_found(format!("agent {} in tenant {}", agent_id, tenant_id)))?;
                tx.commit().await?;
                Ok(load)
            })
            .await?;

        info!("🔓 Released slot of agent {} (load now {})", agent_id, current_load);
        self.emit(vec![EngineEvent::SlotReleased {
            tenant_id: tenant_id.clone(),
            agent_id: agent_id.clone(),
            current_load,
        }])
        .await;

        let drain = self.drain_after_release(tenant_id).await;
        Ok(ReleaseOutcome { current_load, drain })
    }

    pub(super) async fn drain_after_release(&self, tenant_id: &TenantId) -> DrainReport {
        match self.process_queue(tenant_id).await {
            Ok(report) => {
                debug!("Follow-up drain for tenant {}: {:?}", tenant_id, report);
                report
            }
            Err(e) => {
                warn!("⚠️ Follow-up drain for tenant {} failed: {}", tenant_id, e);
                DrainReport::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgentProfile, AgentStatus, ChannelType, NewTicket, Priority, TicketStatus};

    async fn setup() -> AssignmentEngine {
        let engine = AssignmentEngine::new_in_memory().await.unwrap();
        engine.create_tenant(&"t1".into(), "Tenant").await.unwrap();
        engine
            .upsert_agent(
                &AgentProfile::new("a1", "t1", "Alice", vec![ChannelType::Email], 1).with_status(AgentStatus::Online),
            )
            .await
            .unwrap();
        engine
    }

    async fn ticket(engine: &AssignmentEngine, contact: &str) -> TicketId {
        engine
            .database()
            .insert_ticket(&NewTicket {
                tenant_id: "t1".into(),
                channel_type: ChannelType::Email,
                contact_external_id: contact.to_string(),
                contact_name: None,
                priority: Priority::Medium,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_assignment_updates_ticket_load_and_audit() {
        let engine = setup().await;
        let id = ticket(&engine, "c1").await;
        let agent: AgentId = "a1".into();

        let assignment = engine
            .assign_ticket_to_agent(&id, &agent, AssignmentType::Auto, Some("auto_assignment"), None)
            .await
            .unwrap();
        assert_eq!(assignment.ticket.status, TicketStatus::InProgress);
        assert_eq!(assignment.ticket.assigned_agent_id, Some(agent.clone()));
        assert!(assignment.ticket.assigned_at.is_some());
        assert!(!assignment.dequeued);

        assert_eq!(engine.get_agent(&agent).await.unwrap().unwrap().current_load, 1);
        assert_eq!(engine.assignment_history(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_conflicts_roll_back_everything() {
        let engine = setup().await;
        let agent: AgentId = "a1".into();
        let first = ticket(&engine, "c1").await;
        let second = ticket(&engine, "c2").await;

        engine.assign_ticket_to_agent(&first, &agent, AssignmentType::Auto, None, None).await.unwrap();

        let again = engine.assign_ticket_to_agent(&first, &agent, AssignmentType::Auto, None, None).await;
        assert_eq!(again.unwrap_err().conflict(), Some(AssignmentConflict::TicketUnavailable));

        let full = engine.assign_ticket_to_agent(&second, &agent, AssignmentType::Auto, None, None).await;
        assert_eq!(full.unwrap_err().conflict(), Some(AssignmentConflict::AgentAtCapacity));

        // the claim of the second ticket was rolled back with the failed increment
        let untouched = engine.get_ticket(&second).await.unwrap().unwrap();
        assert!(untouched.assigned_agent_id.is_none());
        assert_eq!(untouched.status, TicketStatus::Open);
        assert_eq!(engine.get_agent(&agent).await.unwrap().unwrap().current_load, 1);
        assert!(engine.assignment_history(&second).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_agent_rejects_auto_but_not_manual() {
        let engine = setup().await;
        engine
            .upsert_agent(&AgentProfile::new("a2", "t1", "Bob", vec![ChannelType::Sms], 2))
            .await
            .unwrap();
        let agent: AgentId = "a2".into();
        let id = ticket(&engine, "c1").await;

        let auto = engine.assign_ticket_to_agent(&id, &agent, AssignmentType::Auto, None, None).await;
        assert_eq!(auto.unwrap_err().conflict(), Some(AssignmentConflict::AgentUnavailable));

        let manual = engine
            .assign_ticket_to_agent(&id, &agent, AssignmentType::Manual, Some("escalation"), Some("sup-1"))
            .await
            .unwrap();
        assert_eq!(manual.record.actor_id.as_deref(), Some("sup-1"));
    }

    #[tokio::test]
    async fn test_release_is_floored() {
        let engine = setup().await;
        let agent: AgentId = "a1".into();
        let tenant: TenantId = "t1".into();

        let first = engine.release_agent_slot(&agent, &tenant).await.unwrap();
        let second = engine.release_agent_slot(&agent, &tenant).await.unwrap();
        assert_eq!(first.current_load, 0);
        assert_eq!(second.current_load, 0);

        let missing = engine.release_agent_slot(&"ghost".into(), &tenant).await;
        assert!(matches!(missing, Err(EngineError::NotFound(_))));
    }
}
