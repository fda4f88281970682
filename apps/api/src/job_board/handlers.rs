//! Axum route handlers for the job-board OAuth flow and public lookups.

use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::HhClient;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub user_id: Uuid,
}

/// The job board echoes `state` back on redirect; it carries the user id.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub user_id: Option<Uuid>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub message: String,
    pub user_id: Uuid,
    pub hh_user_id: Option<String>,
}

fn anonymous_client(state: &AppState) -> Result<HhClient, AppError> {
    Ok(HhClient::anonymous(state.config.hh.clone())?)
}

/// GET /api/v1/auth/hh/login?user_id=
///
/// Redirects the browser to the job board's consent page.
pub async fn handle_login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Result<Redirect, AppError> {
    let url = anonymous_client(&state)?.authorize_url(Some(&query.user_id.to_string()))?;
    Ok(Redirect::temporary(url.as_str()))
}

/// GET /api/v1/auth/hh/callback?code=&state=
///
/// Exchanges the authorization code, looks up the job-board account, and stores
/// the token pair on the user.
pub async fn handle_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<CallbackResponse>, AppError> {
    if let Some(error) = query.error {
        return Err(AppError::Unauthorized(format!("Authorization denied: {error}")));
    }
    let code = query
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Missing authorization code".to_string()))?;
    let user_id = query
        .user_id
        .or_else(|| query.state.as_deref().and_then(|s| s.parse().ok()))
        .ok_or_else(|| AppError::Validation("Missing or invalid user id".to_string()))?;

    let client = anonymous_client(&state)?;
    let tokens = client.exchange_code(&code).await?;
    let me = client.get_me().await?;
    let hh_user_id = me.get("id").and_then(|id| match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    state.store.ensure_user(user_id).await?;
    state
        .store
        .save_job_board_tokens(user_id, hh_user_id.as_deref(), &tokens)
        .await?;
    info!(user_id = %user_id, "Job board account connected");

    Ok(Json(CallbackResponse {
        message: "Job board account connected".to_string(),
        user_id,
        hh_user_id,
    }))
}

/// GET /api/v1/search/areas
pub async fn handle_areas(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    Ok(Json(anonymous_client(&state)?.get_areas().await?))
}

/// GET /api/v1/search/dictionaries
pub async fn handle_dictionaries(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    Ok(Json(anonymous_client(&state)?.get_dictionaries().await?))
}

/// GET /api/v1/search/specializations
pub async fn handle_specializations(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    Ok(Json(anonymous_client(&state)?.get_specializations().await?))
}

/// GET /api/v1/search/professional_roles
pub async fn handle_professional_roles(
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(anonymous_client(&state)?.get_professional_roles().await?))
}

/// GET /api/v1/search/vacancies/:id
pub async fn handle_vacancy(
    State(state): State<AppState>,
    Path(vacancy_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(anonymous_client(&state)?.get_vacancy(&vacancy_id).await?))
}
