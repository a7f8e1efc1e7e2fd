use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::database::{retry_transient, DatabaseManager};
use crate::error::Result;
use crate::events::{EngineEvent, EventPublisher, NullPublisher};
use crate::model::{Agent, AgentId, AgentProfile, AssignmentRecord, Tenant, TenantId, Ticket, TicketId};

/// Ticket assignment and queueing engine
///
/// Cheap to share behind an `Arc`; every operation takes `&self` and all shared
/// state lives in the database.
pub struct AssignmentEngine {
    pub(super) db: DatabaseManager,
    pub(super) config: EngineConfig,
    pub(super) publisher: Arc<dyn EventPublisher>,
}

impl std::fmt::Debug for AssignmentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentEngine").field("config", &self.config).finish()
    }
}

impl AssignmentEngine {
    /// Open the configured database and build an engine on top of it
    pub async fn new(config: EngineConfig, publisher: Arc<dyn EventPublisher>) -> Result<Self> {
        config.validate()?;
        info!("🚀 Creating AssignmentEngine");
        let db = DatabaseManager::new(&config.database).await?;
        Ok(Self::with_database(db, config, publisher))
    }

    /// Build an engine over an already opened database
    pub fn with_database(db: DatabaseManager, config: EngineConfig, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { db, config, publisher }
    }

    /// In-memory engine without event delivery
    pub async fn new_in_memory() -> Result<Self> {
        let db = DatabaseManager::new_in_memory().await?;
        Ok(Self::with_database(db, EngineConfig::default(), Arc::new(NullPublisher)))
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one atomic unit under the transient contention retry policy
    pub(super) async fn atomically<T, F, Fut>(&self, operation: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry_transient(&self.config.retry, operation, op).await
    }

    /// Deliver events for a committed change; delivery failures never undo it
    pub(super) async fn emit(&self, events: Vec<EngineEvent>) {
        for event in events {
            let name = event.name();
            if let Err(e) = self.publisher.publish(event).await {
                warn!("📡 Failed to publish {}: {}", name, e);
            }
        }
    }

    // Admin pass-throughs

    pub async fn create_tenant(&self, tenant_id: &TenantId, name: &str) -> Result<Tenant> {
        self.db.create_tenant(tenant_id, name).await
    }

    pub async fn upsert_agent(&self, profile: &AgentProfile) -> Result<Agent> {
        self.db.upsert_agent(profile).await
    }

    pub async fn get_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>> {
        self.db.get_agent(agent_id).await
    }

    /// Capacity snapshot of every agent of the tenant
    pub async fn list_agents(&self, tenant_id: &TenantId) -> Result<Vec<Agent>> {
        self.db.list_agents(tenant_id).await
    }

    pub async fn get_ticket(&self, ticket_id: &TicketId) -> Result<Option<Ticket>> {
        self.db.get_ticket(ticket_id).await
    }

    pub async fn assignment_history(&self, ticket_id: &TicketId) -> Result<Vec<AssignmentRecord>> {
        self.db.assignment_history(ticket_id).await
    }
}
