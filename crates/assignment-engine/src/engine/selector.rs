//! Agent selection

use rand::seq::SliceRandom;
use tracing::{debug, info};

use super::core::AssignmentEngine;
use crate::error::Result;
use crate::model::{Agent, ChannelType, TenantId};

impl AssignmentEngine {
    /// Pick the agent that should take the next `channel` ticket of the tenant
    ///
    /// Least `current_load` wins; ties are broken uniformly at random. `None` is
    /// an expected outcome meaning "queue it". Read-only.
    pub async fn find_available_agent(&self, tenant_id: &TenantId, channel: ChannelType) -> Result<Option<Agent>> {
        let candidates = self.db.find_candidate_agents(tenant_id, channel).await?;
        let chosen = pick_least_loaded(candidates);

        match &chosen {
            Some(agent) => info!(
                "🎯 Selected agent {} for {} in tenant {} (load {}/{})",
                agent.id, channel, tenant_id, agent.current_load, agent.max_load
            ),
            None => debug!("❌ No available agent for {} in tenant {}", channel, tenant_id),
        }
        Ok(chosen)
    }
}

fn pick_least_loaded(candidates: Vec<Agent>) -> Option<Agent> {
    let min_load = candidates.iter().map(|a| a.current_load).min()?;
    let tied: Vec<Agent> = candidates.into_iter().filter(|a| a.current_load == min_load).collect();
    tied.choose(&mut rand::thread_rng()).cloned()
}
