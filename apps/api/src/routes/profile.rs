//! Candidate profile read/write. The interview flow that normally fills the
//! profile lives outside this service; this is its landing point.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::profile::{CandidateProfile, ProfileInput};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProfileQuery {
    pub user_id: Uuid,
}

/// GET /api/v1/profile?user_id=
pub async fn handle_get_profile(
    State(state): State<AppState>,
    Query(query): Query<ProfileQuery>,
) -> Result<Json<CandidateProfile>, AppError> {
    state
        .store
        .get_profile(query.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Profile for user {} not found", query.user_id)))
}

/// PUT /api/v1/profile?user_id=
pub async fn handle_put_profile(
    State(state): State<AppState>,
    Query(query): Query<ProfileQuery>,
    Json(input): Json<ProfileInput>,
) -> Result<Json<CandidateProfile>, AppError> {
    if let (Some(min), Some(max)) = (input.preferred_salary_min, input.preferred_salary_max) {
        if min > max {
            return Err(AppError::Validation(
                "preferred_salary_min cannot exceed preferred_salary_max".to_string(),
            ));
        }
    }

    state.store.ensure_user(query.user_id).await?;
    let profile = state.store.upsert_profile(query.user_id, input).await?;
    info!(user_id = %query.user_id, skills = profile.skills.len(), "Profile saved");
    Ok(Json(profile))
}
