//! # Engine Server
//!
//! Owns a shared [`AssignmentEngine`] and the periodic safety drain. Drains are
//! normally triggered by slot releases; the safety loop picks up tickets left
//! queued after a missed trigger, for example when an admin raises an agent's
//! `max_load`.
//!
//! ```rust,no_run
//! use deskroute_assignment_engine::server::EngineServerBuilder;
//!
//! # tokio_test::block_on(async {
//! let mut server = EngineServerBuilder::new().with_in_memory_database().build().await?;
//! server.start()?;
//!
//! let report = server.sweep_once().await;
//! println!("📊 {} tenants drained, {} tickets assigned", report.tenants, report.assigned);
//!
//! server.stop().await;
//! # Ok::<(), deskroute_assignment_engine::EngineError>(())
//! # });
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::config::{DatabaseConfig, EngineConfig};
use crate::engine::AssignmentEngine;
use crate::error::Result;
use crate::events::{EventPublisher, NullPublisher};

/// Totals of one safety drain pass over every tenant with queued tickets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub tenants: usize,
    pub processed: usize,
    pub assigned: usize,
}

pub struct EngineServer {
    engine: Arc<AssignmentEngine>,

    /// Handle to the safety drain task while running
    drain_handle: Option<JoinHandle<()>>,
}

impl EngineServer {
    pub fn new(engine: Arc<AssignmentEngine>) -> Self {
        Self {
            engine,
            drain_handle: None,
        }
    }

    pub fn engine(&self) -> &Arc<AssignmentEngine> {
        &self.engine
    }

    pub fn is_running(&self) -> bool {
        self.drain_handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Spawn the safety drain loop. A zero interval in the config leaves it off.
    pub fn start(&mut self) -> Result<()> {
        if self.drain_handle.is_some() {
            warn!("Safety drain already running");
            return Ok(());
        }
        let Some(period) = self.engine.config().queue.safety_drain_interval() else {
            info!("⏸️ Safety drain disabled");
            return Ok(());
        };

        let engine = self.engine.clone();
        self.drain_handle = Some(tokio::spawn(async move {
            Self::safety_drain_loop(engine, period).await;
        }));
        info!("✅ Started safety drain every {:?}", period);
        Ok(())
    }

    /// Abort the safety drain loop and wait for it to finish
    pub async fn stop(&mut self) {
        info!("🛑 Stopping engine server...");
        if let Some(handle) = self.drain_handle.take() {
            handle.abort();
            let _ = handle.await;
        }
        info!("✅ Engine server stopped");
    }

    /// Drain every tenant that currently has queue entries
    pub async fn sweep_once(&self) -> SweepReport {
        Self::sweep(&self.engine).await
    }

    async fn safety_drain_loop(engine: Arc<AssignmentEngine>, period: Duration) {
        info!("🔄 Starting safety drain loop");
        let mut interval = interval(period);
        // first tick fires immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            let report = Self::sweep(&engine).await;
            if report.assigned > 0 {
                info!(
                    "📊 Safety drain assigned {} of {} queued tickets across {} tenants",
                    report.assigned, report.processed, report.tenants
                );
            } else {
                debug!("Safety drain found nothing to assign ({} tenants)", report.tenants);
            }
        }
    }

    async fn sweep(engine: &AssignmentEngine) -> SweepReport {
        let tenants = match engine.database().tenants_with_queued_tickets().await {
            Ok(tenants) => tenants,
            Err(e) => {
                error!("Failed to list tenants with queued tickets: {}", e);
                return SweepReport::default();
            }
        };

        let mut report = SweepReport {
            tenants: tenants.len(),
            ..SweepReport::default()
        };
        for tenant_id in tenants {
            match engine.process_queue(&tenant_id).await {
                Ok(drain) => {
                    report.processed += drain.processed;
                    report.assigned += drain.assigned;
                }
                Err(e) => error!("Error draining queue of tenant {}: {}", tenant_id, e),
            }
        }
        report
    }
}

impl Drop for EngineServer {
    fn drop(&mut self) {
        if let Some(handle) = self.drain_handle.take() {
            handle.abort();
        }
    }
}

/// Builder for [`EngineServer`]
pub struct EngineServerBuilder {
    config: EngineConfig,
    publisher: Arc<dyn EventPublisher>,
}

impl EngineServerBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            publisher: Arc::new(NullPublisher),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database.url = url.into();
        self
    }

    pub fn with_in_memory_database(mut self) -> Self {
        self.config.database = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..self.config.database
        };
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub async fn build(self) -> Result<EngineServer> {
        let engine = AssignmentEngine::new(self.config, self.publisher).await?;
        Ok(EngineServer::new(Arc::new(engine)))
    }
}

impl Default for EngineServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgentProfile, AgentStatus, ChannelType, NewTicket, Priority};

    #[tokio::test]
    async fn test_sweep_drains_tenants_with_queue_entries() {
        let server = EngineServerBuilder::new().with_in_memory_database().build().await.unwrap();
        let engine = server.engine().clone();
        engine.create_tenant(&"t1".into(), "Tenant").await.unwrap();

        let outcome = engine
            .create_ticket(NewTicket {
                tenant_id: "t1".into(),
                channel_type: ChannelType::Sms,
                contact_external_id: "+1555".to_string(),
                contact_name: None,
                priority: Priority::Urgent,
            })
            .await
            .unwrap();
        assert!(outcome.routing.is_queued());
        assert_eq!(server.sweep_once().await.assigned, 0);

        // agent appears without a presence event, so only the sweep can notice
        engine
            .upsert_agent(&AgentProfile::new("a1", "t1", "Alice", vec![ChannelType::Sms], 1).with_status(AgentStatus::Online))
            .await
            .unwrap();

        let report = server.sweep_once().await;
        assert_eq!(report, SweepReport { tenants: 1, processed: 1, assigned: 1 });
        assert!(engine.database().tenants_with_queued_tickets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let mut config = EngineConfig::default();
        config.queue.safety_drain_interval_secs = 1;
        let mut server = EngineServerBuilder::new()
            .with_config(config)
            .with_in_memory_database()
            .build()
            .await
            .unwrap();

        server.start().unwrap();
        assert!(server.is_running());
        server.stop().await;
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_disabled_safety_drain_does_not_spawn() {
        let mut config = EngineConfig::default();
        config.queue.safety_drain_interval_secs = 0;
        let mut server = EngineServerBuilder::new()
            .with_config(config)
            .with_in_memory_database()
            .build()
            .await
            .unwrap();

        server.start().unwrap();
        assert!(!server.is_running());
    }
}
