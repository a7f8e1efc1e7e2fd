//! Tenant rows

use chrono::Utc;
use sqlx::Row;
use tracing::info;

use super::DatabaseManager;
use crate::error::Result;
use crate::model::{Tenant, TenantId};

impl DatabaseManager {
    /// Onboard a tenant. Re-running with the same id keeps the original row.
    pub async fn create_tenant(&self, tenant_id: &TenantId, name: &str) -> Result<Tenant> {
        sqlx::query("INSERT INTO tenants (id, name, created_at) VALUES (?, ?, ?) ON CONFLICT(id) DO NOTHING")
            .bind(tenant_id)
            .bind(name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        info!("🏢 Tenant {} ready", tenant_id);
        self.get_tenant(tenant_id)
            .await?
            .ok_or_else(|| crate::EngineError::internal(format!("tenant {} vanished after insert", tenant_id)))
    }

    pub async fn get_tenant(&self, tenant_id: &TenantId) -> Result<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT id, name, created_at FROM tenants WHERE id = ?")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant)
    }

    /// Tenants that currently have at least one queue entry
    pub async fn tenants_with_queued_tickets(&self) -> Result<Vec<TenantId>> {
        let rows = sqlx::query("SELECT DISTINCT tenant_id FROM queue_entries ORDER BY tenant_id")
            .fetch_all(&self.pool)
            .await?;

        let mut tenants = Vec::with_capacity(rows.len());
        for row in rows {
            tenants.push(row.try_get("tenant_id")?);
        }
        Ok(tenants)
    }
}
