//! In-process store used for `STORE_BACKEND=memory` dry runs and in tests.
//! Same contract as `PgStore`; nothing survives a restart.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Store;
use crate::job_board::TokenPair;
use crate::models::profile::{CandidateProfile, ProfileInput};
use crate::models::resume::{BaseResume, NewVariation, ResumeVariation, VariationStatus};
use crate::models::user::User;
use crate::models::vacancy::{NewVacancy, VacancyRecord};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    profiles: HashMap<Uuid, CandidateProfile>,
    /// Insertion order doubles as fetch order.
    vacancies: Vec<VacancyRecord>,
    base_resumes: Vec<BaseResume>,
    variations: Vec<ResumeVariation>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn vacancy_count(&self) -> usize {
        self.inner.read().await.vacancies.len()
    }

    #[cfg(test)]
    pub async fn all_variations(&self) -> Vec<ResumeVariation> {
        self.inner.read().await.variations.clone()
    }

    #[cfg(test)]
    pub async fn vacancy_by_external_id(&self, external_id: &str) -> Option<VacancyRecord> {
        self.inner
            .read()
            .await
            .vacancies
            .iter()
            .find(|v| v.external_id == external_id)
            .cloned()
    }
}

fn variation_mut(inner: &mut Inner, variation_id: Uuid) -> Result<&mut ResumeVariation> {
    inner
        .variations
        .iter_mut()
        .find(|v| v.id == variation_id)
        .ok_or_else(|| anyhow!("Variation {variation_id} not found"))
}

#[async_trait]
impl Store for MemoryStore {
    async fn ensure_user(&self, user_id: Uuid) -> Result<User> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .users
            .entry(user_id)
            .or_insert_with(|| User::new(user_id))
            .clone())
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.inner.read().await.users.get(&user_id).cloned())
    }

    async fn save_job_board_tokens(
        &self,
        user_id: Uuid,
        hh_user_id: Option<&str>,
        tokens: &TokenPair,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .entry(user_id)
            .or_insert_with(|| User::new(user_id));
        if let Some(hh_user_id) = hh_user_id {
            user.hh_user_id = Some(hh_user_id.to_string());
        }
        user.hh_access_token = Some(tokens.access_token.clone());
        user.hh_refresh_token = Some(tokens.refresh_token.clone());
        user.hh_token_expires_at = tokens
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<CandidateProfile>> {
        Ok(self.inner.read().await.profiles.get(&user_id).cloned())
    }

    async fn upsert_profile(&self, user_id: Uuid, input: ProfileInput) -> Result<CandidateProfile> {
        let mut inner = self.inner.write().await;
        inner
            .users
            .entry(user_id)
            .or_insert_with(|| User::new(user_id));
        let profile = input.into_profile(user_id, inner.profiles.get(&user_id));
        inner.profiles.insert(user_id, profile.clone());
        Ok(profile)
    }

    async fn upsert_vacancy(
        &self,
        vacancy: &NewVacancy,
        refresh_existing: bool,
    ) -> Result<VacancyRecord> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .vacancies
            .iter_mut()
            .find(|v| v.external_id == vacancy.external_id)
        {
            if refresh_existing {
                vacancy.refresh(existing);
            }
            return Ok(existing.clone());
        }
        let record = vacancy.clone().into_record();
        inner.vacancies.push(record.clone());
        Ok(record)
    }

    async fn get_vacancy(&self, vacancy_id: Uuid) -> Result<Option<VacancyRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .vacancies
            .iter()
            .find(|v| v.id == vacancy_id)
            .cloned())
    }

    async fn unscored_vacancies(&self, limit: i64) -> Result<Vec<VacancyRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .vacancies
            .iter()
            .filter(|v| v.match_score.is_none())
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn record_match(
        &self,
        vacancy_id: Uuid,
        score: f64,
        analysis: &Value,
        key_skills: &[String],
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let vacancy = inner
            .vacancies
            .iter_mut()
            .find(|v| v.id == vacancy_id)
            .ok_or_else(|| anyhow!("Vacancy {vacancy_id} not found"))?;
        vacancy.match_score = Some(score);
        vacancy.match_analysis = Some(analysis.clone());
        vacancy.key_skills = key_skills.to_vec();
        Ok(())
    }

    async fn scored_vacancies(&self, min_score: f64, limit: i64) -> Result<Vec<VacancyRecord>> {
        let inner = self.inner.read().await;
        let mut scored: Vec<VacancyRecord> = inner
            .vacancies
            .iter()
            .filter(|v| v.match_score.is_some_and(|s| s >= min_score))
            .cloned()
            .collect();
        scored.sort_by(|a, b| {
            b.match_score
                .unwrap_or_default()
                .total_cmp(&a.match_score.unwrap_or_default())
        });
        scored.truncate(limit.max(0) as usize);
        Ok(scored)
    }

    async fn get_base_resume(&self, base_resume_id: Uuid) -> Result<Option<BaseResume>> {
        Ok(self
            .inner
            .read()
            .await
            .base_resumes
            .iter()
            .find(|r| r.id == base_resume_id)
            .cloned())
    }

    async fn active_base_resume(&self, user_id: Uuid) -> Result<Option<BaseResume>> {
        Ok(self
            .inner
            .read()
            .await
            .base_resumes
            .iter()
            .find(|r| r.user_id == user_id && r.is_active)
            .cloned())
    }

    async fn save_base_resume(
        &self,
        user_id: Uuid,
        title: &str,
        content: &Value,
    ) -> Result<BaseResume> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        if let Some(existing) = inner
            .base_resumes
            .iter_mut()
            .find(|r| r.user_id == user_id && r.is_active)
        {
            existing.title = title.to_string();
            existing.content = content.clone();
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let resume = BaseResume {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            content: content.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        inner.base_resumes.push(resume.clone());
        Ok(resume)
    }

    async fn variation_exists(&self, base_resume_id: Uuid, vacancy_id: Uuid) -> Result<bool> {
        Ok(self
            .inner
            .read()
            .await
            .variations
            .iter()
            .any(|v| v.base_resume_id == base_resume_id && v.vacancy_id == Some(vacancy_id)))
    }

    async fn insert_variation(&self, variation: NewVariation) -> Result<ResumeVariation> {
        let mut inner = self.inner.write().await;
        if let Some(vacancy_id) = variation.vacancy_id {
            if inner.variations.iter().any(|v| {
                v.base_resume_id == variation.base_resume_id && v.vacancy_id == Some(vacancy_id)
            }) {
                return Err(anyhow!(
                    "Variation for vacancy {vacancy_id} already exists on base resume {}",
                    variation.base_resume_id
                ));
            }
        }
        let variation = variation.into_variation();
        inner.variations.push(variation.clone());
        Ok(variation)
    }

    async fn get_variation(&self, variation_id: Uuid) -> Result<Option<ResumeVariation>> {
        Ok(self
            .inner
            .read()
            .await
            .variations
            .iter()
            .find(|v| v.id == variation_id)
            .cloned())
    }

    async fn variations_with_status(
        &self,
        user_id: Uuid,
        status: VariationStatus,
    ) -> Result<Vec<ResumeVariation>> {
        let inner = self.inner.read().await;
        Ok(inner
            .variations
            .iter()
            .filter(|v| v.status == status)
            .filter(|v| {
                inner
                    .base_resumes
                    .iter()
                    .any(|r| r.id == v.base_resume_id && r.user_id == user_id)
            })
            .cloned()
            .collect())
    }

    async fn set_variation_status(
        &self,
        variation_id: Uuid,
        status: VariationStatus,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let variation = variation_mut(&mut inner, variation_id)?;
        variation.status = status;
        variation.updated_at = Utc::now();
        Ok(())
    }

    async fn set_variation_cover_letter(
        &self,
        variation_id: Uuid,
        cover_letter: &str,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let variation = variation_mut(&mut inner, variation_id)?;
        variation.cover_letter = Some(cover_letter.to_string());
        variation.updated_at = Utc::now();
        Ok(())
    }

    async fn set_variation_remote_id(&self, variation_id: Uuid, hh_resume_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let variation = variation_mut(&mut inner, variation_id)?;
        variation.hh_resume_id = Some(hh_resume_id.to_string());
        variation.updated_at = Utc::now();
        Ok(())
    }
}
