//! Domain events pushed toward the real-time notification layer
//!
//! The engine only knows the [`EventPublisher`] trait. Transports (websocket hubs,
//! push gateways) subscribe to a [`BroadcastPublisher`] or provide their own
//! implementation. Events are published after the owning transaction commits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::model::{AgentId, ChannelType, TenantId, TicketId, TicketStatus};

/// Who should receive an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "agentId")]
pub enum EventTarget {
    /// Everyone connected for the tenant
    Broadcast,
    /// Only the given agent
    Agent(AgentId),
}

/// Events emitted by the assignment engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum EngineEvent {
    #[serde(rename = "ticket:assigned", rename_all = "camelCase")]
    TicketAssigned {
        tenant_id: TenantId,
        ticket_id: TicketId,
        agent_id: AgentId,
        automatic: bool,
    },

    #[serde(rename = "ticket:new_assignment", rename_all = "camelCase")]
    NewAssignment {
        tenant_id: TenantId,
        agent_id: AgentId,
        ticket_id: TicketId,
        ticket_number: i64,
        contact_name: Option<String>,
        channel_type: ChannelType,
    },

    #[serde(rename = "ticket:updated", rename_all = "camelCase")]
    TicketUpdated {
        tenant_id: TenantId,
        ticket_id: TicketId,
        status: TicketStatus,
        assigned_agent_id: Option<AgentId>,
    },

    #[serde(rename = "ticket:queued", rename_all = "camelCase")]
    TicketQueued {
        tenant_id: TenantId,
        ticket_id: TicketId,
        attempts: u32,
    },

    #[serde(rename = "agent:slot_released", rename_all = "camelCase")]
    SlotReleased {
        tenant_id: TenantId,
        agent_id: AgentId,
        current_load: u32,
    },
}

impl EngineEvent {
    /// Wire name used by real-time transports
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::TicketAssigned { .. } => "ticket:assigned",
            EngineEvent::NewAssignment { .. } => "ticket:new_assignment",
            EngineEvent::TicketUpdated { .. } => "ticket:updated",
            EngineEvent::TicketQueued { .. } => "ticket:queued",
            EngineEvent::SlotReleased { .. } => "agent:slot_released",
        }
    }

    pub fn tenant_id(&self) -> &TenantId {
        match self {
            EngineEvent::TicketAssigned { tenant_id, .. }
            | EngineEvent::NewAssignment { tenant_id, .. }
            | EngineEvent::TicketUpdated { tenant_id, .. }
            | EngineEvent::TicketQueued { tenant_id, .. }
            | EngineEvent::SlotReleased { tenant_id, .. } => tenant_id,
        }
    }

    pub fn target(&self) -> EventTarget {
        match self {
            EngineEvent::NewAssignment { agent_id, .. } => EventTarget::Agent(agent_id.clone()),
            _ => EventTarget::Broadcast,
        }
    }
}

/// Sink for engine events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: EngineEvent) -> Result<()>;
}

/// Subscriber handle returned by [`BroadcastPublisher::subscribe`]
pub struct EventSubscriber {
    receiver: broadcast::Receiver<EngineEvent>,
}

impl EventSubscriber {
    /// Receive the next event
    pub async fn receive(&mut self) -> Result<EngineEvent> {
        self.receiver
            .recv()
            .await
            .map_err(|e| EngineError::internal(format!("Failed to receive event: {}", e)))
    }

    /// Try to receive an event without blocking
    pub fn try_receive(&mut self) -> Result<Option<EngineEvent>> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(e) => Err(EngineError::internal(format!("Failed to try receive event: {}", e))),
        }
    }
}

/// In-process fan-out over `tokio::sync::broadcast`
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<EngineEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: EngineEvent) -> Result<()> {
        let name = event.name();
        if self.sender.send(event).is_err() {
            // No receivers are currently listening
            debug!("No subscribers listening for {}", name);
        }
        Ok(())
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPublisher;

#[async_trait]
impl EventPublisher for NullPublisher {
    async fn publish(&self, _event: EngineEvent) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assigned() -> EngineEvent {
        EngineEvent::TicketAssigned {
            tenant_id: "t1".into(),
            ticket_id: "k1".into(),
            agent_id: "a1".into(),
            automatic: true,
        }
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(assigned()).unwrap();
        assert_eq!(json["event"], "ticket:assigned");
        assert_eq!(json["payload"]["ticketId"], "k1");
        assert_eq!(json["payload"]["automatic"], true);
    }

    #[test]
    fn test_new_assignment_targets_agent() {
        let event = EngineEvent::NewAssignment {
            tenant_id: "t1".into(),
            agent_id: "a1".into(),
            ticket_id: "k1".into(),
            ticket_number: 7,
            contact_name: Some("Dana".to_string()),
            channel_type: ChannelType::Telegram,
        };
        assert_eq!(event.target(), EventTarget::Agent("a1".into()));
        assert_eq!(assigned().target(), EventTarget::Broadcast);
        assert_eq!(event.name(), "ticket:new_assignment");
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let publisher = BroadcastPublisher::default();
        // publishing without subscribers is fine
        publisher.publish(assigned()).await.unwrap();

        let mut subscriber = publisher.subscribe();
        publisher.publish(assigned()).await.unwrap();
        assert_eq!(subscriber.receive().await.unwrap(), assigned());
        assert!(subscriber.try_receive().unwrap().is_none());
    }
}
