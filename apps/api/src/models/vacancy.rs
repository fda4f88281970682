use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Cached copy of a job-board vacancy, enriched in place by the match scorer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VacancyRecord {
    pub id: Uuid,
    /// Identifier assigned by the job board. Unique across the cache.
    pub external_id: String,
    pub title: String,
    pub company_name: String,
    pub salary_from: Option<i32>,
    pub salary_to: Option<i32>,
    pub salary_currency: Option<String>,
    pub location: Option<String>,
    pub experience: Option<String>,
    pub employment_type: Option<String>,
    pub requirements: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub key_skills: Vec<String>,
    pub match_score: Option<f64>,
    pub match_analysis: Option<Value>,
    pub raw_data: Option<Value>,
    pub fetched_at: DateTime<Utc>,
}

impl VacancyRecord {
    /// "100000-150000 RUR", "?-150000 RUR", or empty when no salary is published.
    pub fn salary_text(&self) -> String {
        if self.salary_from.is_none() && self.salary_to.is_none() {
            return String::new();
        }
        let bound = |v: Option<i32>| v.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string());
        format!(
            "{}-{} {}",
            bound(self.salary_from),
            bound(self.salary_to),
            self.salary_currency.as_deref().unwrap_or_default()
        )
        .trim_end()
        .to_string()
    }
}

/// Vacancy fields extracted from one job-board search item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewVacancy {
    pub external_id: String,
    pub title: String,
    pub company_name: String,
    pub salary_from: Option<i32>,
    pub salary_to: Option<i32>,
    pub salary_currency: Option<String>,
    pub location: Option<String>,
    pub experience: Option<String>,
    pub employment_type: Option<String>,
    pub requirements: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub raw_data: Value,
}

impl NewVacancy {
    /// Maps a search item (`/vacancies` `items[]`) into cache fields.
    /// Returns `None` when the item carries no usable id.
    pub fn from_hh_item(item: &Value) -> Option<Self> {
        let external_id = match item.get("id")? {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        let text = |path: &[&str]| -> Option<String> {
            let mut cursor = item;
            for key in path {
                cursor = cursor.get(key)?;
            }
            cursor.as_str().map(str::to_string)
        };
        let salary = item.get("salary").filter(|s| !s.is_null());
        let salary_bound = |key: &str| -> Option<i32> {
            salary
                .and_then(|s| s.get(key))
                .and_then(Value::as_i64)
                .and_then(|n| i32::try_from(n).ok())
        };

        Some(Self {
            external_id,
            title: text(&["name"]).unwrap_or_default(),
            company_name: text(&["employer", "name"]).unwrap_or_default(),
            salary_from: salary_bound("from"),
            salary_to: salary_bound("to"),
            salary_currency: salary.map(|s| {
                s.get("currency")
                    .and_then(Value::as_str)
                    .unwrap_or("RUR")
                    .to_string()
            }),
            location: text(&["area", "name"]),
            experience: text(&["experience", "name"]),
            employment_type: text(&["employment", "name"]),
            requirements: text(&["snippet", "requirement"]),
            description: text(&["snippet", "responsibility"]),
            url: text(&["alternate_url"]),
            raw_data: item.clone(),
        })
    }

    pub fn into_record(self) -> VacancyRecord {
        VacancyRecord {
            id: Uuid::new_v4(),
            external_id: self.external_id,
            title: self.title,
            company_name: self.company_name,
            salary_from: self.salary_from,
            salary_to: self.salary_to,
            salary_currency: self.salary_currency,
            location: self.location,
            experience: self.experience,
            employment_type: self.employment_type,
            requirements: self.requirements,
            description: self.description,
            url: self.url,
            key_skills: Vec::new(),
            match_score: None,
            match_analysis: None,
            raw_data: Some(self.raw_data),
            fetched_at: Utc::now(),
        }
    }

    /// Overwrites listing fields on an existing record, keeping identity and match data.
    pub fn refresh(&self, record: &mut VacancyRecord) {
        record.title = self.title.clone();
        record.company_name = self.company_name.clone();
        record.salary_from = self.salary_from;
        record.salary_to = self.salary_to;
        record.salary_currency = self.salary_currency.clone();
        record.location = self.location.clone();
        record.experience = self.experience.clone();
        record.employment_type = self.employment_type.clone();
        record.requirements = self.requirements.clone();
        record.description = self.description.clone();
        record.url = self.url.clone();
        record.raw_data = Some(self.raw_data.clone());
        record.fetched_at = Utc::now();
    }
}
