//! Match scoring: a trait-based scorer that rates a vacancy against a
//! candidate profile on a 0–100 scale.
//!
//! Default: `LlmMatchScorer`. `AppState` holds an `Arc<dyn MatchScorer>`, so the
//! pipeline and handlers never depend on the concrete backend.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::AppError;
use crate::generation::prompts::{
    format_profile, format_vacancy, MATCH_PROMPT_TEMPLATE, MATCH_SYSTEM,
};
use crate::llm_client::{call_json, LlmBackend, LlmMessage};
use crate::models::profile::CandidateProfile;
use crate::models::vacancy::VacancyRecord;
use crate::store::Store;

/// Structured fit assessment, persisted verbatim as the vacancy's `match_analysis`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchAnalysis {
    #[serde(default, deserialize_with = "lenient_score")]
    pub match_score: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub matching_skills: Vec<String>,
    #[serde(default)]
    pub missing_skills: Vec<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub recommendation: Option<String>,
}

/// Accepts `72`, `72.5`, `"72"`; anything else scores 0.
fn lenient_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().unwrap_or_default(),
        _ => 0.0,
    })
}

impl MatchAnalysis {
    /// Clamps the score into 0–100; non-finite scores become 0.
    pub fn normalized(mut self) -> Self {
        self.match_score = if self.match_score.is_finite() {
            self.match_score.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self
    }

    /// First two reasons, joined for compact display in recommendations.
    pub fn short_reason(&self) -> String {
        self.reasons
            .iter()
            .take(2)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Key skills to store on the vacancy: the required list, or matching + missing
    /// when the model left it empty.
    pub fn key_skills(&self) -> Vec<String> {
        if !self.required_skills.is_empty() {
            return self.required_skills.clone();
        }
        self.matching_skills
            .iter()
            .chain(&self.missing_skills)
            .cloned()
            .collect()
    }
}

/// The match scorer trait. Implement this to swap backends without touching
/// the pipeline or handler code.
#[async_trait]
pub trait MatchScorer: Send + Sync {
    async fn score(
        &self,
        profile: &CandidateProfile,
        vacancy: &VacancyRecord,
    ) -> Result<MatchAnalysis, AppError>;
}

/// Semantic scorer via the configured language model.
pub struct LlmMatchScorer {
    llm: Arc<dyn LlmBackend>,
}

impl LlmMatchScorer {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl MatchScorer for LlmMatchScorer {
    async fn score(
        &self,
        profile: &CandidateProfile,
        vacancy: &VacancyRecord,
    ) -> Result<MatchAnalysis, AppError> {
        let prompt = MATCH_PROMPT_TEMPLATE
            .replace("{profile}", &format_profile(profile))
            .replace("{vacancy}", &format_vacancy(vacancy));
        let messages = [LlmMessage::system(MATCH_SYSTEM), LlmMessage::user(prompt)];

        let analysis: MatchAnalysis = call_json(self.llm.as_ref(), &messages)
            .await
            .map_err(|e| AppError::Llm(format!("Match scoring failed: {e}")))?;
        Ok(analysis.normalized())
    }
}

/// Scores the vacancy and commits score, analysis blob, and derived key skills.
pub async fn analyze_and_store(
    store: &dyn Store,
    scorer: &dyn MatchScorer,
    profile: &CandidateProfile,
    vacancy: &VacancyRecord,
) -> Result<MatchAnalysis, AppError> {
    let analysis = scorer.score(profile, vacancy).await?.normalized();
    let blob = serde_json::to_value(&analysis)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize analysis: {e}")))?;

    store
        .record_match(vacancy.id, analysis.match_score, &blob, &analysis.key_skills())
        .await?;
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::tests::ScriptedLlm;
    use crate::models::profile::ProfileInput;
    use crate::models::vacancy::NewVacancy;
    use crate::store::MemoryStore;
    use serde_json::json;
    use uuid::Uuid;

    fn profile() -> CandidateProfile {
        ProfileInput {
            skills: vec!["Rust".to_string()],
            ..Default::default()
        }
        .into_profile(Uuid::new_v4(), None)
    }

    #[test]
    fn test_lenient_score_accepts_strings_and_floats() {
        let a: MatchAnalysis = serde_json::from_value(json!({"match_score": "81%"})).unwrap();
        let b: MatchAnalysis = serde_json::from_value(json!({"match_score": 64.5})).unwrap();
        let c: MatchAnalysis = serde_json::from_value(json!({"match_score": null})).unwrap();
        assert_eq!(a.match_score, 81.0);
        assert_eq!(b.match_score, 64.5);
        assert_eq!(c.match_score, 0.0);
    }

    #[test]
    fn test_normalized_clamps_score() {
        let high = MatchAnalysis {
            match_score: 140.0,
            ..Default::default()
        };
        let nan = MatchAnalysis {
            match_score: f64::NAN,
            ..Default::default()
        };
        assert_eq!(high.normalized().match_score, 100.0);
        assert_eq!(nan.normalized().match_score, 0.0);
    }

    #[test]
    fn test_short_reason_uses_first_two() {
        let analysis = MatchAnalysis {
            reasons: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            ..Default::default()
        };
        assert_eq!(analysis.short_reason(), "a; b");
    }

    #[test]
    fn test_key_skills_fall_back_to_matching_and_missing() {
        let analysis = MatchAnalysis {
            matching_skills: vec!["Rust".to_string()],
            missing_skills: vec!["Go".to_string()],
            ..Default::default()
        };
        assert_eq!(analysis.key_skills(), vec!["Rust", "Go"]);
    }

    #[tokio::test]
    async fn test_llm_scorer_sends_profile_and_vacancy() {
        let llm = Arc::new(ScriptedLlm::new([
            r#"{"match_score": 77, "reasons": ["Rust"], "required_skills": ["Rust"]}"#,
        ]));
        let scorer = LlmMatchScorer::new(llm.clone());
        let vacancy = NewVacancy::from_hh_item(&json!({"id": "1", "name": "Rust developer"}))
            .unwrap()
            .into_record();

        let analysis = scorer.score(&profile(), &vacancy).await.unwrap();

        assert_eq!(analysis.match_score, 77.0);
        let calls = llm.calls.lock().unwrap();
        assert!(calls[0].0[1].content.contains("Title: Rust developer"));
        assert!(calls[0].0[1].content.contains("Skills: Rust"));
    }

    #[tokio::test]
    async fn test_analyze_and_store_persists_score_and_skills() {
        let store = MemoryStore::new();
        let vacancy = store
            .upsert_vacancy(
                &NewVacancy::from_hh_item(&json!({"id": "1", "name": "Rust developer"})).unwrap(),
                false,
            )
            .await
            .unwrap();
        let scorer = LlmMatchScorer::new(Arc::new(ScriptedLlm::new([
            r#"{"match_score": 65, "required_skills": ["Rust", "Tokio"]}"#,
        ])));

        analyze_and_store(&store, &scorer, &profile(), &vacancy)
            .await
            .unwrap();

        let stored = store.get_vacancy(vacancy.id).await.unwrap().unwrap();
        assert_eq!(stored.match_score, Some(65.0));
        assert_eq!(stored.key_skills, vec!["Rust", "Tokio"]);
        assert_eq!(stored.match_analysis.unwrap()["match_score"], 65.0);
    }

    #[tokio::test]
    async fn test_llm_failure_leaves_vacancy_unscored() {
        let store = MemoryStore::new();
        let vacancy = store
            .upsert_vacancy(&NewVacancy::from_hh_item(&json!({"id": "1"})).unwrap(), false)
            .await
            .unwrap();
        let llm = ScriptedLlm::new(Vec::<String>::new());
        llm.push_failure("overloaded");
        let scorer = LlmMatchScorer::new(Arc::new(llm));

        let result = analyze_and_store(&store, &scorer, &profile(), &vacancy).await;

        assert!(matches!(result, Err(AppError::Llm(_))));
        assert_eq!(store.unscored_vacancies(10).await.unwrap().len(), 1);
    }
}
