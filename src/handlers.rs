use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::db_storage::PipelineStore;
use crate::errors::PipelineError;
use crate::icp::IcpConfig;
use crate::models::{RawLeadInput, Stage};
use crate::pipeline::PipelineOrchestrator;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn PipelineStore>,
    pub orchestrator: PipelineOrchestrator,
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct ProcessLeadRequest {
    pub lead: RawLeadInput,
    pub icp: IcpConfig,
    /// When present, only these stages run and the idempotency guard is
    /// bypassed.
    #[serde(default)]
    pub stages: Option<Vec<Stage>>,
}

/// Runs one raw lead through the pipeline for one ICP.
///
/// Always returns 200 with a structured outcome; pipeline failures are
/// reported inside the outcome rather than as HTTP errors.
pub async fn process_lead(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProcessLeadRequest>,
) -> Result<impl IntoResponse, PipelineError> {
    tracing::info!(
        "Processing lead {} against ICP '{}'",
        request.lead.email,
        request.icp.name
    );

    let outcome = state
        .orchestrator
        .process_raw_lead(&request.lead, &request.icp, request.stages.as_deref())
        .await;

    Ok((StatusCode::OK, Json(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct ProcessBatchRequest {
    pub leads: Vec<RawLeadInput>,
    pub icp: IcpConfig,
}

/// Runs a batch of raw leads against one ICP. One lead's failure never
/// aborts the batch.
pub async fn process_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProcessBatchRequest>,
) -> Result<impl IntoResponse, PipelineError> {
    if request.leads.is_empty() {
        return Err(PipelineError::BadRequest("batch is empty".to_string()));
    }
    if request.leads.len() > 1000 {
        return Err(PipelineError::BadRequest(
            "batch exceeds 1000 leads".to_string(),
        ));
    }

    tracing::info!(
        "Processing batch of {} leads against ICP '{}'",
        request.leads.len(),
        request.icp.name
    );

    let outcome = state
        .orchestrator
        .process_batch(&request.leads, &request.icp)
        .await;

    Ok((StatusCode::OK, Json(outcome)))
}

/// Per-tenant processing counters.
pub async fn tenant_stats(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<Uuid>,
) -> Result<impl IntoResponse, PipelineError> {
    let stats = state.store.processing_stats(tenant_id).await?;
    Ok(Json(stats))
}
