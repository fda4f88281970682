//! Axum route handlers for resume generation and publishing.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::{cover_letter, resume_generator};
use crate::job_board::{HhClient, JobBoard};
use crate::models::profile::CandidateProfile;
use crate::models::resume::{BaseResume, ResumeVariation, VariationStatus};
use crate::models::user::User;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CoverLetterResponse {
    pub cover_letter: String,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub message: String,
    pub hh_resume_id: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

async fn require_profile(state: &AppState, user_id: Uuid) -> Result<CandidateProfile, AppError> {
    state
        .store
        .get_profile(user_id)
        .await?
        .ok_or_else(|| AppError::Validation("Profile not found. Complete the interview first.".to_string()))
}

/// A variation of one of the user's own base resumes. Someone else's variation
/// reads as missing.
async fn require_variation(
    state: &AppState,
    user_id: Uuid,
    variation_id: Uuid,
) -> Result<ResumeVariation, AppError> {
    let not_found = || AppError::NotFound(format!("Variation {variation_id} not found"));
    let variation = state
        .store
        .get_variation(variation_id)
        .await?
        .ok_or_else(not_found)?;
    let owned = state
        .store
        .get_base_resume(variation.base_resume_id)
        .await?
        .is_some_and(|base| base.user_id == user_id);
    if !owned {
        return Err(not_found());
    }
    Ok(variation)
}

/// A user who has connected a job-board account.
pub(crate) async fn require_connected_user(state: &AppState, user_id: Uuid) -> Result<User, AppError> {
    let user = state
        .store
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))?;
    if user.hh_access_token.is_none() {
        return Err(AppError::Unauthorized(
            "Job board account is not connected".to_string(),
        ));
    }
    Ok(user)
}

/// Saves a token pair the client obtained by refreshing, if there is one.
pub(crate) async fn persist_refreshed(
    state: &AppState,
    user_id: Uuid,
    client: &HhClient,
) -> Result<(), AppError> {
    if let Some(tokens) = client.take_refreshed_tokens() {
        state
            .store
            .save_job_board_tokens(user_id, None, &tokens)
            .await?;
        info!(user_id = %user_id, "Persisted refreshed job board tokens");
    }
    Ok(())
}

/// The job board takes the variation content as the resume body, titled after
/// the variation.
fn remote_resume_body(variation: &ResumeVariation) -> Value {
    let mut body = match &variation.content {
        Value::Object(map) => Value::Object(map.clone()),
        _ => json!({}),
    };
    let title = if variation.title.trim().is_empty() {
        variation.content.get("title").cloned().unwrap_or(Value::Null)
    } else {
        Value::String(variation.title.clone())
    };
    body["title"] = title;
    body
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/resumes/base?user_id=
///
/// Writes (or rewrites) the user's active base resume from their profile.
pub async fn handle_generate_base(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<BaseResume>, AppError> {
    let profile = require_profile(&state, query.user_id).await?;
    let resume =
        resume_generator::generate_base_resume(state.store.as_ref(), state.llm.as_ref(), &profile)
            .await?;
    Ok(Json(resume))
}

/// POST /api/v1/resumes/variations/:id/cover-letter?user_id=
pub async fn handle_cover_letter(
    State(state): State<AppState>,
    Path(variation_id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<Json<CoverLetterResponse>, AppError> {
    let variation = require_variation(&state, query.user_id, variation_id).await?;
    let profile = require_profile(&state, query.user_id).await?;

    let cover_letter = cover_letter::generate_for_variation(
        state.store.as_ref(),
        state.llm.as_ref(),
        &variation,
        &profile,
    )
    .await?;
    Ok(Json(CoverLetterResponse { cover_letter }))
}

/// POST /api/v1/resumes/variations/:id/publish?user_id=
///
/// Creates the resume on the job board (or updates the one already linked) and
/// marks the variation `published`.
pub async fn handle_publish(
    State(state): State<AppState>,
    Path(variation_id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<Json<PublishResponse>, AppError> {
    let user = require_connected_user(&state, query.user_id).await?;
    let variation = require_variation(&state, user.id, variation_id).await?;

    let client = HhClient::for_user(state.config.hh.clone(), &user)?;
    let body = remote_resume_body(&variation);
    let published = match variation.hh_resume_id.as_deref() {
        Some(remote_id) => client
            .update_resume(remote_id, &body)
            .await
            .map(|()| remote_id.to_string()),
        None => client.create_resume(&body).await,
    };
    persist_refreshed(&state, user.id, &client).await?;

    let hh_resume_id = published.map_err(|e| {
        warn!(variation_id = %variation_id, "Failed to publish resume: {e}");
        AppError::from(e)
    })?;

    if variation.hh_resume_id.is_none() {
        state
            .store
            .set_variation_remote_id(variation_id, &hh_resume_id)
            .await?;
    }
    state
        .store
        .set_variation_status(variation_id, VariationStatus::Published)
        .await?;
    info!(variation_id = %variation_id, hh_resume_id = %hh_resume_id, "Resume published");

    Ok(Json(PublishResponse {
        message: "Resume published".to_string(),
        hh_resume_id,
    }))
}

/// GET /api/v1/resumes/remote?user_id=
///
/// Lists the resumes the user already has on the job board.
pub async fn handle_remote_resumes(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, AppError> {
    let user = require_connected_user(&state, query.user_id).await?;
    let client = HhClient::for_user(state.config.hh.clone(), &user)?;
    let resumes = client.get_my_resumes().await;
    persist_refreshed(&state, user.id, &client).await?;
    Ok(Json(resumes?))
}

/// GET /api/v1/resumes/remote/:id?user_id=
pub async fn handle_remote_resume(
    State(state): State<AppState>,
    Path(resume_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, AppError> {
    let user = require_connected_user(&state, query.user_id).await?;
    let client = HhClient::for_user(state.config.hh.clone(), &user)?;
    let resume = client.get_resume(&resume_id).await;
    persist_refreshed(&state, user.id, &client).await?;
    Ok(Json(resume?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resume::NewVariation;

    fn variation(title: &str, content: Value) -> ResumeVariation {
        NewVariation {
            base_resume_id: Uuid::new_v4(),
            vacancy_id: None,
            title: title.to_string(),
            content,
            adaptations: Vec::new(),
        }
        .into_variation()
    }

    #[test]
    fn test_remote_body_uses_variation_title() {
        let body = remote_resume_body(&variation(
            "Engineer for Acme",
            json!({"title": "Engineer", "skills": ["Rust"]}),
        ));
        assert_eq!(body["title"], "Engineer for Acme");
        assert_eq!(body["skills"][0], "Rust");
    }

    #[test]
    fn test_remote_body_falls_back_to_content_title() {
        let body = remote_resume_body(&variation("  ", json!({"title": "Engineer"})));
        assert_eq!(body["title"], "Engineer");
    }

    #[test]
    fn test_remote_body_from_non_object_content() {
        let body = remote_resume_body(&variation("Engineer", json!("plain text")));
        assert_eq!(body, json!({"title": "Engineer"}));
    }
}
