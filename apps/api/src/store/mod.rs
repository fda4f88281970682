//! Persistence seam. Every pipeline and generator write goes through `Store`;
//! each call is its own commit, so a failed run leaves a resumable partial state.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::job_board::TokenPair;
use crate::models::profile::{CandidateProfile, ProfileInput};
use crate::models::resume::{BaseResume, NewVariation, ResumeVariation, VariationStatus};
use crate::models::user::User;
use crate::models::vacancy::{NewVacancy, VacancyRecord};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the user, creating an empty account row if it does not exist yet.
    async fn ensure_user(&self, user_id: Uuid) -> Result<User>;

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>>;

    async fn save_job_board_tokens(
        &self,
        user_id: Uuid,
        hh_user_id: Option<&str>,
        tokens: &TokenPair,
    ) -> Result<()>;

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<CandidateProfile>>;

    async fn upsert_profile(&self, user_id: Uuid, input: ProfileInput) -> Result<CandidateProfile>;

    /// Inserts the vacancy keyed by `external_id`. An existing record is returned untouched
    /// unless `refresh_existing` is set, in which case its listing fields are overwritten.
    async fn upsert_vacancy(&self, vacancy: &NewVacancy, refresh_existing: bool)
        -> Result<VacancyRecord>;

    async fn get_vacancy(&self, vacancy_id: Uuid) -> Result<Option<VacancyRecord>>;

    /// Vacancies without a match score, oldest fetched first.
    async fn unscored_vacancies(&self, limit: i64) -> Result<Vec<VacancyRecord>>;

    async fn record_match(
        &self,
        vacancy_id: Uuid,
        score: f64,
        analysis: &Value,
        key_skills: &[String],
    ) -> Result<()>;

    /// Vacancies scoring at or above `min_score`, best first.
    async fn scored_vacancies(&self, min_score: f64, limit: i64) -> Result<Vec<VacancyRecord>>;

    async fn get_base_resume(&self, base_resume_id: Uuid) -> Result<Option<BaseResume>>;

    async fn active_base_resume(&self, user_id: Uuid) -> Result<Option<BaseResume>>;

    /// Updates the active base resume in place, or creates one.
    async fn save_base_resume(&self, user_id: Uuid, title: &str, content: &Value)
        -> Result<BaseResume>;

    async fn variation_exists(&self, base_resume_id: Uuid, vacancy_id: Uuid) -> Result<bool>;

    async fn insert_variation(&self, variation: NewVariation) -> Result<ResumeVariation>;

    async fn get_variation(&self, variation_id: Uuid) -> Result<Option<ResumeVariation>>;

    /// Variations of the user's base resumes in the given status, oldest first.
    async fn variations_with_status(
        &self,
        user_id: Uuid,
        status: VariationStatus,
    ) -> Result<Vec<ResumeVariation>>;

    async fn set_variation_status(&self, variation_id: Uuid, status: VariationStatus)
        -> Result<()>;

    async fn set_variation_cover_letter(&self, variation_id: Uuid, cover_letter: &str)
        -> Result<()>;

    async fn set_variation_remote_id(&self, variation_id: Uuid, hh_resume_id: &str) -> Result<()>;
}
