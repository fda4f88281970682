//! Axum route handlers for the Automation API.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::info;

use super::catalogue::{CatalogueEntry, CITIES, SPECIALIZATIONS};
use super::status::{AutomationStatus, Recommendation};
use super::{AutomationConfig, AutomationError, AutomationPipeline, PipelineSettings};
use crate::errors::AppError;
use crate::job_board::HhClient;
use crate::state::AppState;

/// POST /api/v1/automation/start
///
/// Validates the request, claims the run slot, and runs the pipeline on a
/// background task. Progress is observed through `/status`.
pub async fn handle_start(
    State(state): State<AppState>,
    Json(config): Json<AutomationConfig>,
) -> Result<Json<Value>, AppError> {
    if config.cities.is_empty() || config.specializations.is_empty() {
        return Err(AppError::Validation(
            "At least one city and one specialization are required".to_string(),
        ));
    }
    if state.monitor.is_active() {
        return Err(AutomationError::AlreadyRunning.into());
    }

    if state.store.get_profile(config.user_id).await?.is_none() {
        return Err(AutomationError::ProfileMissing(config.user_id).into());
    }
    let user = state.store.ensure_user(config.user_id).await?;

    let board = Arc::new(HhClient::for_user(state.config.hh.clone(), &user)?);
    let writer = state.monitor.try_begin()?;
    let pipeline = AutomationPipeline::new(
        Arc::clone(&state.store),
        board,
        Arc::clone(&state.scorer),
        Arc::clone(&state.llm),
        PipelineSettings::from_config(&state.config),
    );

    info!(user_id = %user.id, "Spawning automation run");
    tokio::spawn(async move {
        pipeline.run(writer, config).await;
    });

    Ok(Json(json!({ "message": "Automation started" })))
}

/// POST /api/v1/automation/stop
pub async fn handle_stop(State(state): State<AppState>) -> Json<Value> {
    state.monitor.request_stop();
    Json(json!({ "message": "Stop signal sent" }))
}

/// GET /api/v1/automation/status
pub async fn handle_status(State(state): State<AppState>) -> Json<AutomationStatus> {
    Json(state.monitor.snapshot())
}

/// GET /api/v1/automation/recommendations
pub async fn handle_recommendations(State(state): State<AppState>) -> Json<Vec<Recommendation>> {
    Json(state.monitor.snapshot().recommendations)
}

/// GET /api/v1/automation/cities
pub async fn handle_cities() -> Json<&'static [CatalogueEntry]> {
    Json(CITIES)
}

/// GET /api/v1/automation/specializations
pub async fn handle_specializations() -> Json<&'static [CatalogueEntry]> {
    Json(SPECIALIZATIONS)
}
