//! Cover letters: free text from the model, optionally attached to a variation.

use tracing::info;

use crate::errors::AppError;
use crate::generation::prompts::{
    format_profile, format_vacancy, COVER_LETTER_PROMPT_TEMPLATE, COVER_LETTER_SYSTEM,
};
use crate::llm_client::{LlmBackend, LlmMessage, ResponseMode};
use crate::models::profile::CandidateProfile;
use crate::models::resume::ResumeVariation;
use crate::models::vacancy::VacancyRecord;
use crate::store::Store;

pub async fn generate(
    llm: &dyn LlmBackend,
    profile: &CandidateProfile,
    vacancy: &VacancyRecord,
) -> Result<String, AppError> {
    let prompt = COVER_LETTER_PROMPT_TEMPLATE
        .replace("{profile}", &format_profile(profile))
        .replace("{vacancy}", &format_vacancy(vacancy));
    let messages = [
        LlmMessage::system(COVER_LETTER_SYSTEM),
        LlmMessage::user(prompt),
    ];

    let letter = llm
        .send(&messages, ResponseMode::Text)
        .await
        .map_err(|e| AppError::Llm(format!("Cover letter generation failed: {e}")))?;
    Ok(letter.trim().to_string())
}

/// Generates a letter for the variation's vacancy and saves it on the variation.
pub async fn generate_for_variation(
    store: &dyn Store,
    llm: &dyn LlmBackend,
    variation: &ResumeVariation,
    profile: &CandidateProfile,
) -> Result<String, AppError> {
    let vacancy_id = variation.vacancy_id.ok_or_else(|| {
        AppError::Validation(format!("Variation {} has no vacancy", variation.id))
    })?;
    let vacancy = store
        .get_vacancy(vacancy_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Vacancy {vacancy_id} not found")))?;

    let letter = generate(llm, profile, &vacancy).await?;
    store
        .set_variation_cover_letter(variation.id, &letter)
        .await?;
    info!(variation_id = %variation.id, "Cover letter attached");
    Ok(letter)
}
