//! Resume generation: a base resume written from the candidate profile, and
//! per-vacancy variations adapted from it.
//!
//! Every function commits its own write through `Store`; callers never persist
//! on their behalf.

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::errors::AppError;
use crate::generation::prompts::{
    format_base_resume, format_profile, format_vacancy, RESUME_ADAPTATION_PROMPT_TEMPLATE,
    RESUME_GENERATION_PROMPT_TEMPLATE, RESUME_SYSTEM,
};
use crate::llm_client::{call_json, LlmBackend, LlmMessage};
use crate::models::profile::CandidateProfile;
use crate::models::resume::{BaseResume, NewVariation, ResumeVariation};
use crate::models::vacancy::VacancyRecord;
use crate::store::Store;

const FALLBACK_TITLE: &str = "Resume";

#[derive(Debug, Default, Deserialize)]
struct AdaptationReply {
    #[serde(default)]
    adapted_resume: Option<Value>,
    #[serde(default)]
    adaptations: Value,
}

/// Adaptation notes arrive as a list, a single string, or not at all.
fn normalize_adaptations(raw: &Value) -> Vec<String> {
    let items: Vec<&Value> = match raw {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Writes (or rewrites) the user's active base resume from their profile.
pub async fn generate_base_resume(
    store: &dyn Store,
    llm: &dyn LlmBackend,
    profile: &CandidateProfile,
) -> Result<BaseResume, AppError> {
    let prompt = RESUME_GENERATION_PROMPT_TEMPLATE.replace("{profile}", &format_profile(profile));
    let messages = [LlmMessage::system(RESUME_SYSTEM), LlmMessage::user(prompt)];

    let content: Value = call_json(llm, &messages)
        .await
        .map_err(|e| AppError::Llm(format!("Base resume generation failed: {e}")))?;

    let title = content
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or(profile
            .preferred_position
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty()))
        .unwrap_or(FALLBACK_TITLE)
        .to_string();

    let resume = store
        .save_base_resume(profile.user_id, &title, &content)
        .await?;
    info!(user_id = %profile.user_id, base_resume_id = %resume.id, "Base resume generated");
    Ok(resume)
}

/// Adapts the base resume to one vacancy and stores the result as a `draft` variation.
///
/// Returns `Conflict` if a variation for this (base resume, vacancy) pair already exists.
pub async fn create_variation(
    store: &dyn Store,
    llm: &dyn LlmBackend,
    base: &BaseResume,
    vacancy: &VacancyRecord,
    profile: &CandidateProfile,
) -> Result<ResumeVariation, AppError> {
    if store.variation_exists(base.id, vacancy.id).await? {
        return Err(AppError::Conflict(format!(
            "Variation of resume {} for vacancy {} already exists",
            base.id, vacancy.id
        )));
    }

    let prompt = RESUME_ADAPTATION_PROMPT_TEMPLATE
        .replace("{base_resume}", &format_base_resume(base))
        .replace("{vacancy}", &format_vacancy(vacancy))
        .replace("{profile}", &format_profile(profile));
    let messages = [LlmMessage::system(RESUME_SYSTEM), LlmMessage::user(prompt)];

    let reply: AdaptationReply = call_json(llm, &messages)
        .await
        .map_err(|e| AppError::Llm(format!("Resume adaptation failed: {e}")))?;

    let content = reply
        .adapted_resume
        .filter(|c| c.is_object())
        .unwrap_or_else(|| base.content.clone());

    let variation = store
        .insert_variation(NewVariation {
            base_resume_id: base.id,
            vacancy_id: Some(vacancy.id),
            title: format!("{} for {}", base.title, vacancy.company_name),
            content,
            adaptations: normalize_adaptations(&reply.adaptations),
        })
        .await?;
    info!(variation_id = %variation.id, vacancy_id = %vacancy.id, "Resume variation created");
    Ok(variation)
}
