use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::Store;
use crate::job_board::TokenPair;
use crate::models::profile::{CandidateProfile, ProfileInput};
use crate::models::resume::{BaseResume, NewVariation, ResumeVariation, VariationStatus};
use crate::models::user::User;
use crate::models::vacancy::{NewVacancy, VacancyRecord};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// `resume_variations` row; status is stored as text and parsed on the way out.
#[derive(Debug, FromRow)]
struct VariationRow {
    id: Uuid,
    base_resume_id: Uuid,
    vacancy_id: Option<Uuid>,
    hh_resume_id: Option<String>,
    title: String,
    content: Value,
    adaptations: Vec<String>,
    cover_letter: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VariationRow> for ResumeVariation {
    type Error = anyhow::Error;

    fn try_from(row: VariationRow) -> Result<Self> {
        Ok(ResumeVariation {
            id: row.id,
            base_resume_id: row.base_resume_id,
            vacancy_id: row.vacancy_id,
            hh_resume_id: row.hh_resume_id,
            title: row.title,
            content: row.content,
            adaptations: row.adaptations,
            cover_letter: row.cover_letter,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

async fn touch_variation(pool: &PgPool, sql: &str, variation_id: Uuid, value: &str) -> Result<()> {
    let result = sqlx::query(sql)
        .bind(value)
        .bind(variation_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(anyhow!("Variation {variation_id} not found"));
    }
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn ensure_user(&self, user_id: Uuid) -> Result<User> {
        sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(sqlx::query_as::<_, User>(
            r#"
            SELECT id, hh_user_id, hh_access_token, hh_refresh_token, hh_token_expires_at, created_at
            FROM users WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            r#"
            SELECT id, hh_user_id, hh_access_token, hh_refresh_token, hh_token_expires_at, created_at
            FROM users WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn save_job_board_tokens(
        &self,
        user_id: Uuid,
        hh_user_id: Option<&str>,
        tokens: &TokenPair,
    ) -> Result<()> {
        let expires_at = tokens
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        sqlx::query(
            r#"
            INSERT INTO users (id, hh_user_id, hh_access_token, hh_refresh_token, hh_token_expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                hh_user_id = COALESCE(EXCLUDED.hh_user_id, users.hh_user_id),
                hh_access_token = EXCLUDED.hh_access_token,
                hh_refresh_token = EXCLUDED.hh_refresh_token,
                hh_token_expires_at = EXCLUDED.hh_token_expires_at,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(hh_user_id)
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<CandidateProfile>> {
        Ok(
            sqlx::query_as::<_, CandidateProfile>("SELECT * FROM user_profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn upsert_profile(&self, user_id: Uuid, input: ProfileInput) -> Result<CandidateProfile> {
        self.ensure_user(user_id).await?;
        let existing = self.get_profile(user_id).await?;
        let profile = input.into_profile(user_id, existing.as_ref());

        Ok(sqlx::query_as::<_, CandidateProfile>(
            r#"
            INSERT INTO user_profiles
                (id, user_id, skills, experience_years, preferred_position,
                 preferred_salary_min, preferred_salary_max, preferred_locations,
                 summary, structured_profile)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (user_id) DO UPDATE SET
                skills = EXCLUDED.skills,
                experience_years = EXCLUDED.experience_years,
                preferred_position = EXCLUDED.preferred_position,
                preferred_salary_min = EXCLUDED.preferred_salary_min,
                preferred_salary_max = EXCLUDED.preferred_salary_max,
                preferred_locations = EXCLUDED.preferred_locations,
                summary = EXCLUDED.summary,
                structured_profile = EXCLUDED.structured_profile,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(profile.id)
        .bind(user_id)
        .bind(&profile.skills)
        .bind(profile.experience_years)
        .bind(&profile.preferred_position)
        .bind(profile.preferred_salary_min)
        .bind(profile.preferred_salary_max)
        .bind(&profile.preferred_locations)
        .bind(&profile.summary)
        .bind(&profile.structured_profile)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn upsert_vacancy(
        &self,
        vacancy: &NewVacancy,
        refresh_existing: bool,
    ) -> Result<VacancyRecord> {
        // A no-op DO UPDATE keeps RETURNING populated for rows that already exist.
        let on_conflict = if refresh_existing {
            r#"
            ON CONFLICT (external_id) DO UPDATE SET
                title = EXCLUDED.title,
                company_name = EXCLUDED.company_name,
                salary_from = EXCLUDED.salary_from,
                salary_to = EXCLUDED.salary_to,
                salary_currency = EXCLUDED.salary_currency,
                location = EXCLUDED.location,
                experience = EXCLUDED.experience,
                employment_type = EXCLUDED.employment_type,
                requirements = EXCLUDED.requirements,
                description = EXCLUDED.description,
                url = EXCLUDED.url,
                raw_data = EXCLUDED.raw_data,
                fetched_at = NOW()
            "#
        } else {
            "ON CONFLICT (external_id) DO UPDATE SET external_id = vacancies_cache.external_id"
        };

        let sql = format!(
            r#"
            INSERT INTO vacancies_cache
                (id, external_id, title, company_name, salary_from, salary_to, salary_currency,
                 location, experience, employment_type, requirements, description, url, raw_data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            {on_conflict}
            RETURNING *
            "#
        );

        Ok(sqlx::query_as::<_, VacancyRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&vacancy.external_id)
            .bind(&vacancy.title)
            .bind(&vacancy.company_name)
            .bind(vacancy.salary_from)
            .bind(vacancy.salary_to)
            .bind(&vacancy.salary_currency)
            .bind(&vacancy.location)
            .bind(&vacancy.experience)
            .bind(&vacancy.employment_type)
            .bind(&vacancy.requirements)
            .bind(&vacancy.description)
            .bind(&vacancy.url)
            .bind(&vacancy.raw_data)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_vacancy(&self, vacancy_id: Uuid) -> Result<Option<VacancyRecord>> {
        Ok(
            sqlx::query_as::<_, VacancyRecord>("SELECT * FROM vacancies_cache WHERE id = $1")
                .bind(vacancy_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn unscored_vacancies(&self, limit: i64) -> Result<Vec<VacancyRecord>> {
        Ok(sqlx::query_as::<_, VacancyRecord>(
            "SELECT * FROM vacancies_cache WHERE match_score IS NULL ORDER BY fetched_at ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn record_match(
        &self,
        vacancy_id: Uuid,
        score: f64,
        analysis: &Value,
        key_skills: &[String],
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE vacancies_cache
            SET match_score = $1, match_analysis = $2, key_skills = $3
            WHERE id = $4
            "#,
        )
        .bind(score)
        .bind(analysis)
        .bind(key_skills)
        .bind(vacancy_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn scored_vacancies(&self, min_score: f64, limit: i64) -> Result<Vec<VacancyRecord>> {
        Ok(sqlx::query_as::<_, VacancyRecord>(
            r#"
            SELECT * FROM vacancies_cache
            WHERE match_score >= $1
            ORDER BY match_score DESC, fetched_at ASC
            LIMIT $2
            "#,
        )
        .bind(min_score)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_base_resume(&self, base_resume_id: Uuid) -> Result<Option<BaseResume>> {
        Ok(
            sqlx::query_as::<_, BaseResume>("SELECT * FROM base_resumes WHERE id = $1")
                .bind(base_resume_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn active_base_resume(&self, user_id: Uuid) -> Result<Option<BaseResume>> {
        Ok(sqlx::query_as::<_, BaseResume>(
            "SELECT * FROM base_resumes WHERE user_id = $1 AND is_active ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn save_base_resume(
        &self,
        user_id: Uuid,
        title: &str,
        content: &Value,
    ) -> Result<BaseResume> {
        if let Some(existing) = self.active_base_resume(user_id).await? {
            return Ok(sqlx::query_as::<_, BaseResume>(
                r#"
                UPDATE base_resumes SET title = $1, content = $2, updated_at = NOW()
                WHERE id = $3
                RETURNING *
                "#,
            )
            .bind(title)
            .bind(content)
            .bind(existing.id)
            .fetch_one(&self.pool)
            .await?);
        }

        self.ensure_user(user_id).await?;
        Ok(sqlx::query_as::<_, BaseResume>(
            r#"
            INSERT INTO base_resumes (id, user_id, title, content, is_active)
            VALUES ($1, $2, $3, $4, TRUE)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .bind(content)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn variation_exists(&self, base_resume_id: Uuid, vacancy_id: Uuid) -> Result<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM resume_variations WHERE base_resume_id = $1 AND vacancy_id = $2)",
        )
        .bind(base_resume_id)
        .bind(vacancy_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn insert_variation(&self, variation: NewVariation) -> Result<ResumeVariation> {
        let row = sqlx::query_as::<_, VariationRow>(
            r#"
            INSERT INTO resume_variations
                (id, base_resume_id, vacancy_id, title, content, adaptations, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(variation.base_resume_id)
        .bind(variation.vacancy_id)
        .bind(&variation.title)
        .bind(&variation.content)
        .bind(&variation.adaptations)
        .bind(VariationStatus::Draft.as_str())
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_variation(&self, variation_id: Uuid) -> Result<Option<ResumeVariation>> {
        sqlx::query_as::<_, VariationRow>("SELECT * FROM resume_variations WHERE id = $1")
            .bind(variation_id)
            .fetch_optional(&self.pool)
            .await?
            .map(ResumeVariation::try_from)
            .transpose()
    }

    async fn variations_with_status(
        &self,
        user_id: Uuid,
        status: VariationStatus,
    ) -> Result<Vec<ResumeVariation>> {
        sqlx::query_as::<_, VariationRow>(
            r#"
            SELECT v.* FROM resume_variations v
            JOIN base_resumes b ON b.id = v.base_resume_id
            WHERE b.user_id = $1 AND v.status = $2
            ORDER BY v.created_at ASC
            "#,
        )
        .bind(user_id)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ResumeVariation::try_from)
        .collect()
    }

    async fn set_variation_status(
        &self,
        variation_id: Uuid,
        status: VariationStatus,
    ) -> Result<()> {
        touch_variation(
            &self.pool,
            "UPDATE resume_variations SET status = $1, updated_at = NOW() WHERE id = $2",
            variation_id,
            status.as_str(),
        )
        .await
    }

    async fn set_variation_cover_letter(
        &self,
        variation_id: Uuid,
        cover_letter: &str,
    ) -> Result<()> {
        touch_variation(
            &self.pool,
            "UPDATE resume_variations SET cover_letter = $1, updated_at = NOW() WHERE id = $2",
            variation_id,
            cover_letter,
        )
        .await
    }

    async fn set_variation_remote_id(&self, variation_id: Uuid, hh_resume_id: &str) -> Result<()> {
        touch_variation(
            &self.pool,
            "UPDATE resume_variations SET hh_resume_id = $1, updated_at = NOW() WHERE id = $2",
            variation_id,
            hh_resume_id,
        )
        .await
    }
}
