pub mod health;
pub mod profile;

use axum::{
    routing::{get, post},
    Router,
};

use crate::automation::handlers as automation;
use crate::generation::handlers as generation;
use crate::job_board::handlers as job_board;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Profile
        .route(
            "/api/v1/profile",
            get(profile::handle_get_profile).put(profile::handle_put_profile),
        )
        // Automation
        .route("/api/v1/automation/start", post(automation::handle_start))
        .route("/api/v1/automation/stop", post(automation::handle_stop))
        .route("/api/v1/automation/status", get(automation::handle_status))
        .route(
            "/api/v1/automation/recommendations",
            get(automation::handle_recommendations),
        )
        .route("/api/v1/automation/cities", get(automation::handle_cities))
        .route(
            "/api/v1/automation/specializations",
            get(automation::handle_specializations),
        )
        // Job-board OAuth
        .route("/api/v1/auth/hh/login", get(job_board::handle_login))
        .route("/api/v1/auth/hh/callback", get(job_board::handle_callback))
        // Job-board public lookups
        .route("/api/v1/search/areas", get(job_board::handle_areas))
        .route(
            "/api/v1/search/dictionaries",
            get(job_board::handle_dictionaries),
        )
        .route(
            "/api/v1/search/specializations",
            get(job_board::handle_specializations),
        )
        .route(
            "/api/v1/search/professional_roles",
            get(job_board::handle_professional_roles),
        )
        .route(
            "/api/v1/search/vacancies/:id",
            get(job_board::handle_vacancy),
        )
        // Resumes
        .route("/api/v1/resumes/base", post(generation::handle_generate_base))
        .route(
            "/api/v1/resumes/variations/:id/cover-letter",
            post(generation::handle_cover_letter),
        )
        .route(
            "/api/v1/resumes/variations/:id/publish",
            post(generation::handle_publish),
        )
        .route("/api/v1/resumes/remote", get(generation::handle_remote_resumes))
        .route(
            "/api/v1/resumes/remote/:id",
            get(generation::handle_remote_resume),
        )
        .with_state(state)
}
