//! Job-board (hh.ru) integration: REST client with OAuth token handling, and the
//! narrow `JobBoard` seam the automation pipeline depends on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod client;
pub mod handlers;

pub use client::{HhClient, HhSettings};

#[derive(Debug, Error)]
pub enum JobBoardError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Job board returned {status} for {endpoint}: {body}")]
    Status {
        status: u16,
        endpoint: String,
        body: String,
    },

    #[error("Failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("No published resume id to apply with")]
    MissingResume,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl JobBoardError {
    pub fn status(&self) -> Option<u16> {
        match self {
            JobBoardError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// OAuth access/refresh pair as returned by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Vacancy search filters. Empty fields are omitted from the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VacancySearch {
    pub text: Option<String>,
    pub area: Option<String>,
    pub specialization: Option<String>,
    #[serde(default)]
    pub professional_roles: Vec<String>,
    pub salary: Option<u32>,
    #[serde(default)]
    pub only_with_salary: bool,
    pub experience: Option<String>,
    pub employment: Option<String>,
    pub schedule: Option<String>,
    #[serde(default)]
    pub page: u32,
    pub per_page: Option<u32>,
}

impl VacancySearch {
    pub const DEFAULT_PER_PAGE: u32 = 20;
    /// The job board refuses pages larger than this.
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let per_page = self
            .per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE);
        let mut query = vec![("page", self.page.to_string()), ("per_page", per_page.to_string())];

        let mut push = |key: &'static str, value: &Option<String>| {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                query.push((key, v.to_string()));
            }
        };
        push("text", &self.text);
        push("area", &self.area);
        push("specialization", &self.specialization);
        push("experience", &self.experience);
        push("employment", &self.employment);
        push("schedule", &self.schedule);

        for role in &self.professional_roles {
            query.push(("professional_role", role.clone()));
        }
        if let Some(salary) = self.salary {
            query.push(("salary", salary.to_string()));
        }
        if self.only_with_salary {
            query.push(("only_with_salary", "true".to_string()));
        }
        query
    }
}

/// One page of `/vacancies` results. Items stay raw JSON until they are cached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VacancyPage {
    #[serde(default)]
    pub found: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub pages: u32,
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub items: Vec<Value>,
}

/// What the automation pipeline needs from the job board.
#[async_trait]
pub trait JobBoard: Send + Sync {
    async fn search_vacancies(&self, search: &VacancySearch) -> Result<VacancyPage, JobBoardError>;

    /// Submits an application (negotiation). `resume_id` is the job board's id of a
    /// published resume; without one nothing is sent.
    async fn apply_to_vacancy(
        &self,
        vacancy_id: &str,
        resume_id: Option<&str>,
        message: &str,
    ) -> Result<(), JobBoardError>;

    /// Returns the token pair obtained by a refresh since the last call, if any.
    /// The caller is responsible for persisting it.
    fn take_refreshed_tokens(&self) -> Option<TokenPair>;
}
