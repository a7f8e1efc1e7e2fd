//! Collaborator entry points
//!
//! Channel adapters, ticket lifecycle handlers and presence tracking call into
//! the engine through these operations.

use chrono::Utc;
use tracing::{debug, info};

use super::core::AssignmentEngine;
use super::types::{InboundOutcome, PresenceUpdate, RoutingOutcome, StatusUpdate};
use crate::database::agents::decrement_load;
use crate::database::queue::{delete_queue_entry, refresh_queue_positions};
use crate::database::tickets::{fetch_ticket, set_ticket_status};
use crate::error::{AssignmentConflict, EngineError, Result};
use crate::events::EngineEvent;
use crate::model::{
    AgentId, AgentStatus, AssignmentType, InboundMessage, NewTicket, TenantId, Ticket, TicketId, TicketStatus,
};

impl AssignmentEngine {
    /// Handle a message produced by a channel adapter
    ///
    /// Reuses the contact's active ticket on the same channel, or opens a new one,
    /// and routes it when nobody holds it yet.
    pub async fn handle_inbound_message(&self, message: InboundMessage) -> Result<InboundOutcome> {
        if message.contact_external_id.trim().is_empty() {
            return Err(EngineError::invalid_input("contact_external_id must not be empty"));
        }
        self.require_tenant(&message.tenant_id).await?;
        debug!(
            "📨 Inbound {} message from {} ({} bytes)",
            message.channel_type,
            message.contact_external_id,
            message.content.len()
        );

        let existing = self
            .db
            .find_active_ticket_for_contact(&message.tenant_id, &message.contact_external_id, message.channel_type)
            .await?;

        let (ticket, created) = match existing {
            Some(ticket) => {
                self.db.touch_last_message(&ticket.id).await?;
                (ticket, false)
            }
            None => {
                let ticket = self
                    .db
                    .insert_ticket(&NewTicket {
                        tenant_id: message.tenant_id.clone(),
                        channel_type: message.channel_type,
                        contact_external_id: message.contact_external_id.clone(),
                        contact_name: message.contact_name.clone(),
                        priority: message.priority.unwrap_or_default(),
                    })
                    .await?;
                info!("🎫 Opened ticket #{} for contact {}", ticket.ticket_number, message.contact_external_id);
                (ticket, true)
            }
        };

        self.route_and_reload(ticket, created).await
    }

    /// Explicit ticket creation, routed like an inbound message
    pub async fn create_ticket(&self, new_ticket: NewTicket) -> Result<InboundOutcome> {
        if new_ticket.contact_external_id.trim().is_empty() {
            return Err(EngineError::invalid_input("contact_external_id must not be empty"));
        }
        self.require_tenant(&new_ticket.tenant_id).await?;

        let ticket = self.db.insert_ticket(&new_ticket).await?;
        info!("🎫 Created ticket #{} in tenant {}", ticket.ticket_number, ticket.tenant_id);
        self.route_and_reload(ticket, true).await
    }

    /// Assign the ticket to an available agent, or queue it
    ///
    /// Selection is retried when the chosen agent fills up concurrently, at most
    /// `assignment.max_selection_attempts` times, before the ticket is queued.
    pub async fn route_ticket(&self, ticket_id: &TicketId) -> Result<RoutingOutcome> {
        let ticket = self
            .db
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("ticket {}", ticket_id)))?;
        if ticket.status.is_terminal() {
            return Err(EngineError::invalid_state(format!("ticket {} is {}", ticket_id, ticket.status)));
        }
        if let Some(agent_id) = ticket.assigned_agent_id {
            return Ok(RoutingOutcome::AlreadyAssigned { agent_id });
        }

        for attempt in 1..=self.config.assignment.max_selection_attempts {
            let Some(agent) = self.find_available_agent(&ticket.tenant_id, ticket.channel_type).await? else {
                break;
            };
            match self
                .assign_ticket_to_agent(ticket_id, &agent.id, AssignmentType::Auto, Some("auto_assignment"), None)
                .await
            {
                Ok(assignment) => {
                    return Ok(RoutingOutcome::Assigned {
                        assignment: Box::new(assignment),
                    })
                }
                Err(EngineError::Conflict(AssignmentConflict::TicketUnavailable)) => {
                    return self.settled_outcome(ticket_id).await;
                }
                Err(EngineError::Conflict(conflict)) => {
                    debug!(
                        "🔁 Selection attempt {} for ticket {} lost agent {}: {}",
                        attempt, ticket_id, agent.id, conflict
                    );
                }
                Err(e) => return Err(e),
            }
        }

        match self.add_to_queue(ticket_id, &ticket.tenant_id, ticket.channel_type).await {
            Ok(entry) => Ok(RoutingOutcome::Queued { entry }),
            Err(EngineError::InvalidState(_)) => self.settled_outcome(ticket_id).await,
            Err(e) => Err(e),
        }
    }

    /// Record a ticket status change
    ///
    /// Entering `resolved` or `closed` releases the holder's slot in the same
    /// transaction and removes any queue entry; the tenant queue is drained after
    /// commit. Terminal tickets reject further transitions, so a slot is released
    /// at most once per ticket.
    pub async fn update_ticket_status(&self, ticket_id: &TicketId, status: TicketStatus) -> Result<StatusUpdate> {
        let (ticket, released) = self
            .atomically("update_ticket_status", move || async move {
                let now = Utc::now();
                let mut tx = self.db.begin().await?;

                let current = fetch_ticket(&mut tx, ticket_id)
                    .await?
                    .ok_or_else(|| EngineError::not_found(format!("ticket {}", ticket_id)))?;
                if current.status.is_terminal() {
                    return Err(EngineError::invalid_state(format!(
                        "ticket {} is already {}",
                        ticket_id, current.status
                    )));
                }
                if current.status == status {
                    tx.commit().await?;
                    return Ok((current, None));
                }
                if !set_ticket_status(&mut tx, ticket_id, status, now).await? {
                    return Err(EngineError::invalid_state(format!("ticket {} was closed concurrently", ticket_id)));
                }

                let mut released = None;
                if status.is_terminal() {
                    if let Some(agent_id) = &current.assigned_agent_id {
                        let current_load = decrement_load(&mut tx, &current.tenant_id, agent_id).await?.unwrap_or(0);
                        released = Some((agent_id.clone(), current_load));
                    }
                    if delete_queue_entry(&mut tx, &current.tenant_id, ticket_id).await? {
                        refresh_queue_positions(&mut tx, &current.tenant_id).await?;
                    }
                }

                let updated = fetch_ticket(&mut tx, ticket_id)
                    .await?
                    .ok_or_else(|| EngineError::internal(format!("ticket {} vanished during status update", ticket_id)))?;
                tx.commit().await?;
                Ok((updated, released))
            })
            .await?;

        info!("📝 Ticket #{} is now {}", ticket.ticket_number, ticket.status);
        let mut events = vec![EngineEvent::TicketUpdated {
            tenant_id: ticket.tenant_id.clone(),
            ticket_id: ticket.id.clone(),
            status: ticket.status,
            assigned_agent_id: ticket.assigned_agent_id.clone(),
        }];
        let released_agent = released.map(|(agent_id, current_load)| {
            events.push(EngineEvent::SlotReleased {
                tenant_id: ticket.tenant_id.clone(),
                agent_id: agent_id.clone(),
                current_load,
            });
            agent_id
        });
        self.emit(events).await;

        let drain = match &released_agent {
            Some(_) => Some(self.drain_after_release(&ticket.tenant_id).await),
            None => None,
        };
        Ok(StatusUpdate {
            ticket,
            released_agent,
            drain,
        })
    }

    /// Record an agent presence change
    ///
    /// Coming online from any other status pulls holding tickets for the agent.
    /// Going offline leaves held tickets where they are.
    pub async fn update_agent_presence(&self, agent_id: &AgentId, status: AgentStatus) -> Result<PresenceUpdate> {
        let previous = self
            .atomically("update_agent_presence", move || self.db.set_agent_status(agent_id, status))
            .await?;
        info!("👤 Agent {} presence {} -> {}", agent_id, previous, status);

        let bulk = if status == AgentStatus::Online && previous != AgentStatus::Online {
            Some(self.auto_assign_tickets_to_agent(agent_id).await?)
        } else {
            None
        };

        Ok(PresenceUpdate {
            agent_id: agent_id.clone(),
            previous,
            current: status,
            bulk,
        })
    }

    async fn require_tenant(&self, tenant_id: &TenantId) -> Result<()> {
        match self.db.get_tenant(tenant_id).await? {
            Some(_) => Ok(()),
            None => Err(EngineError::not_found(format!("tenant {}", tenant_id))),
        }
    }

    async fn route_and_reload(&self, ticket: Ticket, created: bool) -> Result<InboundOutcome> {
        let routing = self.route_ticket(&ticket.id).await?;
        let ticket = self.db.get_ticket(&ticket.id).await?.unwrap_or(ticket);
        Ok(InboundOutcome {
            ticket,
            created,
            routing,
        })
    }

    /// Outcome for a ticket that another writer assigned or closed meanwhile
    async fn settled_outcome(&self, ticket_id: &TicketId) -> Result<RoutingOutcome> {
        let ticket = self
            .db
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("ticket {}", ticket_id)))?;
        match ticket.assigned_agent_id {
            Some(agent_id) if !ticket.status.is_terminal() => Ok(RoutingOutcome::AlreadyAssigned { agent_id }),
            _ => Err(EngineError::invalid_state(format!("ticket {} is {}", ticket_id, ticket.status))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgentProfile, ChannelType};

    async fn setup() -> AssignmentEngine {
        let engine = AssignmentEngine::new_in_memory().await.unwrap();
        engine.create_tenant(&"t1".into(), "Tenant").await.unwrap();
        engine
            .upsert_agent(&AgentProfile::new("a1", "t1", "Alice", vec![ChannelType::Telegram], 1))
            .await
            .unwrap();
        engine
    }

    fn message(contact: &str) -> InboundMessage {
        InboundMessage {
            tenant_id: "t1".into(),
            channel_type: ChannelType::Telegram,
            contact_external_id: contact.to_string(),
            contact_name: Some("Dana".to_string()),
            content: "hello".to_string(),
            priority: None,
        }
    }

    #[tokio::test]
    async fn test_inbound_message_reuses_active_ticket() {
        let engine = setup().await;

        let first = engine.handle_inbound_message(message("tg-1")).await.unwrap();
        assert!(first.created);
        assert!(first.routing.is_queued());

        let second = engine.handle_inbound_message(message("tg-1")).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.ticket.id, first.ticket.id);
        match second.routing {
            RoutingOutcome::Queued { entry } => assert_eq!(entry.attempts, 1),
            other => panic!("expected queued, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_rejected_without_side_effects() {
        let engine = setup().await;
        let mut msg = message("tg-1");
        msg.tenant_id = "nope".into();

        let result = engine.handle_inbound_message(msg).await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
        assert!(engine.get_queued_tickets(&"nope".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_presence_online_pulls_holding_tickets() {
        let engine = setup().await;
        let queued = engine.handle_inbound_message(message("tg-1")).await.unwrap();

        let update = engine.update_agent_presence(&"a1".into(), AgentStatus::Online).await.unwrap();
        assert_eq!(update.previous, AgentStatus::Offline);
        let bulk = update.bulk.unwrap();
        assert_eq!(bulk.assigned, vec![queued.ticket.id.clone()]);
        assert!(engine.get_queued_tickets(&"t1".into()).await.unwrap().is_empty());

        let again = engine.update_agent_presence(&"a1".into(), AgentStatus::Online).await.unwrap();
        assert!(again.bulk.is_none());
    }

    #[tokio::test]
    async fn test_closing_releases_once() {
        let engine = setup().await;
        engine.update_agent_presence(&"a1".into(), AgentStatus::Online).await.unwrap();
        let outcome = engine.handle_inbound_message(message("tg-1")).await.unwrap();
        assert_eq!(outcome.routing.agent_id(), Some(&AgentId::from("a1")));

        let closed = engine.update_ticket_status(&outcome.ticket.id, TicketStatus::Resolved).await.unwrap();
        assert_eq!(closed.released_agent, Some(AgentId::from("a1")));
        assert_eq!(engine.get_agent(&"a1".into()).await.unwrap().unwrap().current_load, 0);

        let again = engine.update_ticket_status(&outcome.ticket.id, TicketStatus::Closed).await;
        assert!(matches!(again, Err(EngineError::InvalidState(_))));
        assert_eq!(engine.get_agent(&"a1".into()).await.unwrap().unwrap().current_load, 0);
    }
}
