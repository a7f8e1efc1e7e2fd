//! Queue introspection REST API for operator dashboards

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::engine::AssignmentEngine;
use crate::error::EngineError;
use crate::model::{Agent, AgentId, AgentStatus, ChannelType, DrainReport, QueuedTicket, TenantId};

// Response types

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub database: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueResponse {
    pub tenant_id: TenantId,
    pub depth: usize,
    pub entries: Vec<QueuedTicket>,
}

/// One agent's capacity as shown on dashboards
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapacity {
    pub id: AgentId,
    pub display_name: String,
    pub status: AgentStatus,
    pub assigned_channels: Vec<ChannelType>,
    pub current_load: u32,
    pub max_load: u32,
    pub available_slots: u32,
}

impl From<Agent> for AgentCapacity {
    fn from(agent: Agent) -> Self {
        Self {
            available_slots: agent.available_slots(),
            id: agent.id,
            display_name: agent.display_name,
            status: agent.status,
            assigned_channels: agent.assigned_channels,
            current_load: agent.current_load,
            max_load: agent.max_load,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsResponse {
    pub tenant_id: TenantId,
    pub agents: Vec<AgentCapacity>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainResponse {
    pub tenant_id: TenantId,
    #[serde(flatten)]
    pub report: DrainReport,
    pub remaining: usize,
}

// Error response

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// [`EngineError`] rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Conflict(_) | EngineError::InvalidState(_) => StatusCode::CONFLICT,
            EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            EngineError::Contention(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match &self.0 {
            EngineError::NotFound(_) => "not_found",
            EngineError::Conflict(_) => "assignment_conflict",
            EngineError::InvalidState(_) => "invalid_state",
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::Contention(_) => "contention",
            _ => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("API request failed: {}", self.0);
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Build the introspection router over a shared engine
pub fn router(engine: Arc<AssignmentEngine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tenants/:tenant_id/queue", get(get_queue))
        .route("/tenants/:tenant_id/queue/drain", post(drain_queue))
        .route("/tenants/:tenant_id/agents", get(list_agents))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

async fn health(State(engine): State<Arc<AssignmentEngine>>) -> (StatusCode, Json<HealthResponse>) {
    let database = engine.database().health_check().await;
    let (status, label) = if database {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            database,
        }),
    )
}

async fn get_queue(
    State(engine): State<Arc<AssignmentEngine>>,
    Path(tenant_id): Path<String>,
) -> ApiResult<QueueResponse> {
    let tenant_id = known_tenant(&engine, tenant_id).await?;
    let entries = engine.get_queued_tickets(&tenant_id).await?;
    Ok(Json(QueueResponse {
        tenant_id,
        depth: entries.len(),
        entries,
    }))
}

async fn list_agents(
    State(engine): State<Arc<AssignmentEngine>>,
    Path(tenant_id): Path<String>,
) -> ApiResult<AgentsResponse> {
    let tenant_id = known_tenant(&engine, tenant_id).await?;
    let agents = engine.list_agents(&tenant_id).await?;
    Ok(Json(AgentsResponse {
        tenant_id,
        agents: agents.into_iter().map(AgentCapacity::from).collect(),
    }))
}

async fn drain_queue(
    State(engine): State<Arc<AssignmentEngine>>,
    Path(tenant_id): Path<String>,
) -> ApiResult<DrainResponse> {
    let tenant_id = known_tenant(&engine, tenant_id).await?;
    let report = engine.process_queue(&tenant_id).await?;
    let remaining = engine.database().queue_depth(&tenant_id).await?;
    info!(
        "🖐️ Operator drain of tenant {}: {} assigned, {} still queued",
        tenant_id, report.assigned, remaining
    );
    Ok(Json(DrainResponse {
        tenant_id,
        report,
        remaining: usize::try_from(remaining).unwrap_or(0),
    }))
}

async fn known_tenant(engine: &AssignmentEngine, raw: String) -> Result<TenantId, ApiError> {
    let tenant_id = TenantId::from(raw);
    match engine.database().get_tenant(&tenant_id).await? {
        Some(_) => Ok(tenant_id),
        None => Err(EngineError::not_found(format!("tenant {}", tenant_id)).into()),
    }
}
