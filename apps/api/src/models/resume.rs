use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// The canonical, vacancy-agnostic resume generated from a profile.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BaseResume {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub content: Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariationStatus {
    Draft,
    /// Could not be submitted automatically; waiting for a manual application.
    Ready,
    Applied,
    Published,
    Archived,
}

impl VariationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariationStatus::Draft => "draft",
            VariationStatus::Ready => "ready",
            VariationStatus::Applied => "applied",
            VariationStatus::Published => "published",
            VariationStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for VariationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(VariationStatus::Draft),
            "ready" => Ok(VariationStatus::Ready),
            "applied" => Ok(VariationStatus::Applied),
            "published" => Ok(VariationStatus::Published),
            "archived" => Ok(VariationStatus::Archived),
            other => Err(anyhow::anyhow!("Unknown variation status '{other}'")),
        }
    }
}

/// A vacancy-tailored derivative of a base resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeVariation {
    pub id: Uuid,
    pub base_resume_id: Uuid,
    pub vacancy_id: Option<Uuid>,
    /// Id of the published copy on the job board, once published.
    pub hh_resume_id: Option<String>,
    pub title: String,
    pub content: Value,
    pub adaptations: Vec<String>,
    pub cover_letter: Option<String>,
    pub status: VariationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVariation {
    pub base_resume_id: Uuid,
    pub vacancy_id: Option<Uuid>,
    pub title: String,
    pub content: Value,
    pub adaptations: Vec<String>,
}

impl NewVariation {
    pub fn into_variation(self) -> ResumeVariation {
        let now = Utc::now();
        ResumeVariation {
            id: Uuid::new_v4(),
            base_resume_id: self.base_resume_id,
            vacancy_id: self.vacancy_id,
            hh_resume_id: None,
            title: self.title,
            content: self.content,
            adaptations: self.adaptations,
            cover_letter: None,
            status: VariationStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }
}
