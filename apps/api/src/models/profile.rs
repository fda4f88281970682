use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandidateProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub skills: Vec<String>,
    pub experience_years: Option<i32>,
    pub preferred_position: Option<String>,
    pub preferred_salary_min: Option<i32>,
    pub preferred_salary_max: Option<i32>,
    pub preferred_locations: Vec<String>,
    pub summary: Option<String>,
    /// Richer extracted data (parsed resume fields, interview answers).
    pub structured_profile: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile fields accepted from the interview / resume-parsing collaborators.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileInput {
    #[serde(default)]
    pub skills: Vec<String>,
    pub experience_years: Option<u32>,
    pub preferred_position: Option<String>,
    pub preferred_salary_min: Option<i32>,
    pub preferred_salary_max: Option<i32>,
    #[serde(default)]
    pub preferred_locations: Vec<String>,
    pub summary: Option<String>,
    pub structured_profile: Option<Value>,
}

impl ProfileInput {
    /// Skills are a set: trimmed, empty entries dropped, case-insensitive duplicates removed
    /// (first spelling wins).
    pub fn normalized_skills(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.skills
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .filter(|s| seen.insert(s.to_lowercase()))
            .map(str::to_string)
            .collect()
    }

    pub fn into_profile(self, user_id: Uuid, existing: Option<&CandidateProfile>) -> CandidateProfile {
        let now = Utc::now();
        CandidateProfile {
            id: existing.map(|p| p.id).unwrap_or_else(Uuid::new_v4),
            user_id,
            skills: self.normalized_skills(),
            experience_years: self.experience_years.map(|y| y.min(i32::MAX as u32) as i32),
            preferred_position: self.preferred_position,
            preferred_salary_min: self.preferred_salary_min,
            preferred_salary_max: self.preferred_salary_max,
            preferred_locations: self.preferred_locations,
            summary: self.summary,
            structured_profile: self.structured_profile,
            created_at: existing.map(|p| p.created_at).unwrap_or(now),
            updated_at: now,
        }
    }
}
