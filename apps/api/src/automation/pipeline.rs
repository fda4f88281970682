//! The automation run: load → analyze → generate → apply (optional).
//!
//! Phases run strictly in sequence, one item at a time, with a fixed delay
//! between external calls. Every item yields an `ItemOutcome`; a skipped item
//! never aborts its phase. Only phase preconditions (a missing profile) and
//! store failures outside an item end the run in `error`.
//!
//! Stop requests are honoured at the top of every item loop and between phases.
//! A stopped phase returns at once without publishing its summary, and the
//! run leaves `status` at `running`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::status::{Phase, Recommendation, StatusWriter, StopSignal};
use super::AutomationError;
use crate::config::Config;
use crate::errors::AppError;
use crate::generation::match_scorer::{analyze_and_store, MatchScorer};
use crate::generation::resume_generator::{create_variation, generate_base_resume};
use crate::generation::cover_letter;
use crate::job_board::{JobBoard, VacancySearch};
use crate::llm_client::LlmBackend;
use crate::models::profile::CandidateProfile;
use crate::models::resume::{BaseResume, ResumeVariation, VariationStatus};
use crate::models::vacancy::{NewVacancy, VacancyRecord};
use crate::store::Store;

/// Inclusive score at which a vacancy is recommended and gets a tailored resume.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 60.0;

/// Pause after each external call, per phase.
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub between_searches: Duration,
    pub between_scores: Duration,
    pub between_generations: Duration,
    pub between_applications: Duration,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            between_searches: Duration::from_millis(500),
            between_scores: Duration::from_millis(200),
            between_generations: Duration::from_millis(500),
            between_applications: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub match_threshold: f64,
    /// Results requested per (city, specialization) query; only page 0 is read.
    pub search_page_size: u32,
    /// Unscored vacancies scored per run.
    pub analyze_batch: i64,
    pub recommendation_cap: usize,
    pub refresh_on_upsert: bool,
    pub delays: RateLimits,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            search_page_size: VacancySearch::MAX_PER_PAGE,
            analyze_batch: 200,
            recommendation_cap: 50,
            refresh_on_upsert: false,
            delays: RateLimits::default(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            match_threshold: config.match_threshold,
            refresh_on_upsert: config.refresh_vacancies_on_upsert,
            ..Default::default()
        }
    }
}

fn default_auto_apply() -> bool {
    true
}

fn default_max_resumes() -> u32 {
    20
}

/// Per-run input, fixed for the lifetime of the run.
#[derive(Debug, Clone, Deserialize)]
pub struct AutomationConfig {
    pub user_id: Uuid,
    #[serde(default)]
    pub specializations: Vec<String>,
    #[serde(default)]
    pub cities: Vec<String>,
    #[serde(default = "default_auto_apply")]
    pub auto_apply: bool,
    #[serde(default = "default_max_resumes")]
    pub max_resumes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Done,
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedItem {
    pub item: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseReport {
    pub processed: usize,
    pub skipped: Vec<SkippedItem>,
    /// The phase returned early on a stop request; its closing status update
    /// was not published.
    pub stopped: bool,
}

impl PhaseReport {
    fn halted(mut self) -> Self {
        self.stopped = true;
        self
    }

    fn record(&mut self, item: impl Into<String>, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Done => self.processed += 1,
            ItemOutcome::Skipped(reason) => {
                let item = item.into();
                warn!(item = %item, reason = %reason, "Item skipped");
                self.skipped.push(SkippedItem { item, reason });
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub load: PhaseReport,
    pub analyze: PhaseReport,
    pub generate: PhaseReport,
    pub apply: PhaseReport,
}

impl Default for RunReport {
    fn default() -> Self {
        Self {
            outcome: RunOutcome::Completed,
            load: PhaseReport::default(),
            analyze: PhaseReport::default(),
            generate: PhaseReport::default(),
            apply: PhaseReport::default(),
        }
    }
}

pub struct AutomationPipeline {
    store: Arc<dyn Store>,
    board: Arc<dyn JobBoard>,
    scorer: Arc<dyn MatchScorer>,
    llm: Arc<dyn LlmBackend>,
    settings: PipelineSettings,
}

impl AutomationPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        board: Arc<dyn JobBoard>,
        scorer: Arc<dyn MatchScorer>,
        llm: Arc<dyn LlmBackend>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            board,
            scorer,
            llm,
            settings,
        }
    }

    /// Drives one run to its end. The writer is consumed, so the run slot is
    /// released when this returns.
    pub async fn run(&self, writer: StatusWriter, config: AutomationConfig) -> RunReport {
        let stop = writer.stop_signal();
        let mut report = RunReport::default();
        info!(user_id = %config.user_id, cities = ?config.cities, specializations = ?config.specializations, "Automation run started");

        let result = self.run_phases(&writer, &stop, &config, &mut report).await;
        self.persist_refreshed_tokens(config.user_id).await;

        match result {
            Ok(true) => {
                writer.complete("Automation finished successfully");
                info!(user_id = %config.user_id, "Automation run completed");
            }
            Ok(false) => {
                report.outcome = RunOutcome::Stopped;
                info!(user_id = %config.user_id, "Automation run stopped on request");
            }
            Err(e) => {
                report.outcome = RunOutcome::Failed;
                error!(user_id = %config.user_id, "Automation run failed: {e}");
                writer.fail(e.to_string());
            }
        }
        report
    }

    /// `Ok(false)` means a stop was requested.
    async fn run_phases(
        &self,
        writer: &StatusWriter,
        stop: &StopSignal,
        config: &AutomationConfig,
        report: &mut RunReport,
    ) -> Result<bool, AutomationError> {
        report.load = self.load_vacancies(writer, stop, config).await;
        self.persist_refreshed_tokens(config.user_id).await;
        if report.load.stopped || stop.is_set() {
            return Ok(false);
        }

        report.analyze = self.analyze_vacancies(writer, stop, config.user_id).await?;
        if report.analyze.stopped || stop.is_set() {
            return Ok(false);
        }

        report.generate = self
            .generate_resumes(writer, stop, config.user_id, config.max_resumes)
            .await?;
        if report.generate.stopped || stop.is_set() {
            return Ok(false);
        }

        if config.auto_apply {
            report.apply = self.auto_apply(writer, stop, config.user_id).await?;
            self.persist_refreshed_tokens(config.user_id).await;
            if report.apply.stopped || stop.is_set() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn persist_refreshed_tokens(&self, user_id: Uuid) {
        if let Some(tokens) = self.board.take_refreshed_tokens() {
            match self.store.save_job_board_tokens(user_id, None, &tokens).await {
                Ok(()) => info!(user_id = %user_id, "Persisted refreshed job board tokens"),
                Err(e) => warn!(user_id = %user_id, "Failed to persist refreshed tokens: {e}"),
            }
        }
    }

    async fn profile(&self, user_id: Uuid) -> Result<CandidateProfile, AutomationError> {
        self.store
            .get_profile(user_id)
            .await?
            .ok_or(AutomationError::ProfileMissing(user_id))
    }

    // ── Load ────────────────────────────────────────────────────────────────

    async fn load_vacancies(
        &self,
        writer: &StatusWriter,
        stop: &StopSignal,
        config: &AutomationConfig,
    ) -> PhaseReport {
        writer.enter_phase(Phase::Loading, "Loading vacancies...");
        let mut report = PhaseReport::default();

        for city in &config.cities {
            for specialization in &config.specializations {
                if stop.is_set() {
                    return report.halted();
                }
                writer.message(format!(
                    "Loading: city {city}, specialization {specialization}..."
                ));

                let outcome = match self.load_query(writer, city, specialization).await {
                    Ok(()) => ItemOutcome::Done,
                    Err(e) => ItemOutcome::Skipped(e.to_string()),
                };
                report.record(format!("area {city} / specialization {specialization}"), outcome);
                tokio::time::sleep(self.settings.delays.between_searches).await;
            }
        }
        if stop.is_set() {
            return report.halted();
        }

        writer.update(|s| s.message = format!("Loaded {} vacancies", s.vacancies_loaded));
        info!(queries = report.processed, skipped = report.skipped.len(), "Load phase finished");
        report
    }

    async fn load_query(
        &self,
        writer: &StatusWriter,
        city: &str,
        specialization: &str,
    ) -> anyhow::Result<()> {
        let search = VacancySearch {
            area: Some(city.to_string()),
            specialization: Some(specialization.to_string()),
            page: 0,
            per_page: Some(self.settings.search_page_size),
            ..Default::default()
        };
        let page = self.board.search_vacancies(&search).await?;

        let cap = u64::from(self.settings.search_page_size);
        writer.update(|s| s.vacancies_total += page.found.min(cap) as u32);

        for item in &page.items {
            let Some(vacancy) = NewVacancy::from_hh_item(item) else {
                warn!(area = city, specialization, "Search item without an id, ignored");
                continue;
            };
            self.store
                .upsert_vacancy(&vacancy, self.settings.refresh_on_upsert)
                .await?;
            writer.update(|s| s.vacancies_loaded += 1);
        }
        Ok(())
    }

    // ── Analyze ─────────────────────────────────────────────────────────────

    async fn analyze_vacancies(
        &self,
        writer: &StatusWriter,
        stop: &StopSignal,
        user_id: Uuid,
    ) -> Result<PhaseReport, AutomationError> {
        writer.enter_phase(Phase::Analyzing, "Analyzing vacancies...");
        let profile = self.profile(user_id).await?;
        let vacancies = self
            .store
            .unscored_vacancies(self.settings.analyze_batch)
            .await?;

        let mut report = PhaseReport::default();
        let mut recommendations = Vec::new();

        for vacancy in &vacancies {
            if stop.is_set() {
                return Ok(report.halted());
            }
            let outcome = match analyze_and_store(
                self.store.as_ref(),
                self.scorer.as_ref(),
                &profile,
                vacancy,
            )
            .await
            {
                Ok(analysis) => {
                    writer.update(|s| {
                        s.vacancies_analyzed += 1;
                        s.message = format!("Analyzed {} vacancies", s.vacancies_analyzed);
                    });
                    if analysis.match_score >= self.settings.match_threshold {
                        recommendations.push(Recommendation {
                            vacancy_id: vacancy.id,
                            external_id: vacancy.external_id.clone(),
                            title: vacancy.title.clone(),
                            company: vacancy.company_name.clone(),
                            match_score: analysis.match_score,
                            reason: analysis.short_reason(),
                        });
                    }
                    ItemOutcome::Done
                }
                Err(e) => ItemOutcome::Skipped(e.to_string()),
            };
            report.record(vacancy.external_id.as_str(), outcome);
            tokio::time::sleep(self.settings.delays.between_scores).await;
        }
        if stop.is_set() {
            return Ok(report.halted());
        }

        let found = recommendations.len();
        recommendations.sort_by(|a, b| b.match_score.total_cmp(&a.match_score));
        recommendations.truncate(self.settings.recommendation_cap);
        writer.update(|s| {
            s.recommendations = recommendations;
            s.message = format!("Found {found} matching vacancies");
        });
        info!(analyzed = report.processed, found, "Analyze phase finished");
        Ok(report)
    }

    // ── Generate ────────────────────────────────────────────────────────────

    async fn generate_resumes(
        &self,
        writer: &StatusWriter,
        stop: &StopSignal,
        user_id: Uuid,
        max_resumes: u32,
    ) -> Result<PhaseReport, AutomationError> {
        writer.enter_phase(Phase::Generating, "Generating resumes...");
        let profile = self.profile(user_id).await?;

        let base = match self.store.active_base_resume(user_id).await? {
            Some(base) => base,
            None => {
                writer.message("Creating base resume...");
                generate_base_resume(self.store.as_ref(), self.llm.as_ref(), &profile).await?
            }
        };

        let vacancies = self
            .store
            .scored_vacancies(self.settings.match_threshold, i64::from(max_resumes))
            .await?;

        let mut report = PhaseReport::default();
        for vacancy in &vacancies {
            if stop.is_set() {
                return Ok(report.halted());
            }
            let outcome = self.generate_one(writer, &profile, &base, vacancy).await;
            report.record(vacancy.external_id.as_str(), outcome);
        }
        if stop.is_set() {
            return Ok(report.halted());
        }

        writer.update(|s| s.message = format!("Created {} resumes", s.resumes_generated));
        info!(generated = report.processed, "Generate phase finished");
        Ok(report)
    }

    async fn generate_one(
        &self,
        writer: &StatusWriter,
        profile: &CandidateProfile,
        base: &BaseResume,
        vacancy: &VacancyRecord,
    ) -> ItemOutcome {
        match self.store.variation_exists(base.id, vacancy.id).await {
            Ok(true) => return ItemOutcome::Skipped("variation already exists".to_string()),
            Ok(false) => {}
            Err(e) => return ItemOutcome::Skipped(e.to_string()),
        }

        writer.message(format!("Creating resume for {}...", vacancy.company_name));
        let outcome = match create_variation(
            self.store.as_ref(),
            self.llm.as_ref(),
            base,
            vacancy,
            profile,
        )
        .await
        {
            Ok(_) => {
                writer.update(|s| s.resumes_generated += 1);
                ItemOutcome::Done
            }
            Err(e) => ItemOutcome::Skipped(e.to_string()),
        };
        tokio::time::sleep(self.settings.delays.between_generations).await;
        outcome
    }

    // ── Apply ───────────────────────────────────────────────────────────────

    async fn auto_apply(
        &self,
        writer: &StatusWriter,
        stop: &StopSignal,
        user_id: Uuid,
    ) -> Result<PhaseReport, AutomationError> {
        writer.enter_phase(Phase::Applying, "Sending applications...");
        let profile = self.profile(user_id).await?;
        let variations = self
            .store
            .variations_with_status(user_id, VariationStatus::Draft)
            .await?;

        let mut report = PhaseReport::default();
        for variation in &variations {
            if stop.is_set() {
                return Ok(report.halted());
            }
            let outcome = self.apply_one(writer, &profile, variation).await;
            report.record(variation.id.to_string(), outcome);
        }
        if stop.is_set() {
            return Ok(report.halted());
        }

        writer.update(|s| s.message = format!("Sent {} applications", s.applications_sent));
        info!(sent = report.processed, "Apply phase finished");
        Ok(report)
    }

    async fn apply_one(
        &self,
        writer: &StatusWriter,
        profile: &CandidateProfile,
        variation: &ResumeVariation,
    ) -> ItemOutcome {
        let Some(vacancy_id) = variation.vacancy_id else {
            return ItemOutcome::Skipped("variation has no vacancy".to_string());
        };
        let vacancy = match self.store.get_vacancy(vacancy_id).await {
            Ok(Some(vacancy)) => vacancy,
            Ok(None) => return ItemOutcome::Skipped(format!("vacancy {vacancy_id} not found")),
            Err(e) => return ItemOutcome::Skipped(e.to_string()),
        };

        writer.message(format!(
            "Generating cover letter for {}...",
            vacancy.company_name
        ));
        let letter = match cover_letter::generate_for_variation(
            self.store.as_ref(),
            self.llm.as_ref(),
            variation,
            profile,
        )
        .await
        {
            Ok(letter) => letter,
            Err(e) => return ItemOutcome::Skipped(e.to_string()),
        };

        let submitted = self
            .board
            .apply_to_vacancy(
                &vacancy.external_id,
                variation.hh_resume_id.as_deref(),
                &letter,
            )
            .await;

        let outcome = match submitted {
            Ok(()) => match self.mark(variation, VariationStatus::Applied).await {
                Ok(()) => {
                    writer.update(|s| s.applications_sent += 1);
                    ItemOutcome::Done
                }
                Err(e) => ItemOutcome::Skipped(e.to_string()),
            },
            Err(e) => {
                warn!(variation_id = %variation.id, "Could not auto-apply: {e}");
                match self.mark(variation, VariationStatus::Ready).await {
                    Ok(()) => ItemOutcome::Skipped(format!("submission failed, left ready: {e}")),
                    Err(store_err) => ItemOutcome::Skipped(store_err.to_string()),
                }
            }
        };
        tokio::time::sleep(self.settings.delays.between_applications).await;
        outcome
    }

    async fn mark(&self, variation: &ResumeVariation, status: VariationStatus) -> Result<(), AppError> {
        self.store
            .set_variation_status(variation.id, status)
            .await
            .map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::automation::status::{AutomationMonitor, RunState};
    use crate::generation::match_scorer::MatchAnalysis;
    use crate::job_board::{JobBoardError, TokenPair, VacancyPage};
    use crate::llm_client::tests::ScriptedLlm;
    use crate::llm_client::{LlmError, LlmMessage, ResponseMode};
    use crate::models::profile::ProfileInput;
    use crate::models::resume::NewVariation;
    use crate::store::MemoryStore;

    #[derive(Default)]
    struct FakeBoard {
        /// Keyed by (area, specialization).
        pages: HashMap<(String, String), Vec<Value>>,
        failing_areas: Vec<String>,
        reject_applications: bool,
        stop_after_first_search: Option<AutomationMonitor>,
        stop_on_apply: Option<AutomationMonitor>,
        refreshed: Mutex<Option<TokenPair>>,
        searches: Mutex<Vec<(String, String)>>,
        applications: Mutex<Vec<(String, Option<String>, String)>>,
    }

    impl FakeBoard {
        fn with_page(mut self, area: &str, spec: &str, items: Vec<Value>) -> Self {
            self.pages.insert((area.to_string(), spec.to_string()), items);
            self
        }
    }

    #[async_trait]
    impl JobBoard for FakeBoard {
        async fn search_vacancies(
            &self,
            search: &VacancySearch,
        ) -> Result<VacancyPage, JobBoardError> {
            let area = search.area.clone().unwrap_or_default();
            let spec = search.specialization.clone().unwrap_or_default();
            self.searches.lock().unwrap().push((area.clone(), spec.clone()));
            if let Some(monitor) = &self.stop_after_first_search {
                monitor.request_stop();
            }
            if self.failing_areas.contains(&area) {
                return Err(JobBoardError::Status {
                    status: 503,
                    endpoint: "/vacancies".to_string(),
                    body: "unavailable".to_string(),
                });
            }
            let items = self.pages.get(&(area, spec)).cloned().unwrap_or_default();
            Ok(VacancyPage {
                found: items.len() as u64,
                items,
                ..Default::default()
            })
        }

        async fn apply_to_vacancy(
            &self,
            vacancy_id: &str,
            resume_id: Option<&str>,
            message: &str,
        ) -> Result<(), JobBoardError> {
            self.applications.lock().unwrap().push((
                vacancy_id.to_string(),
                resume_id.map(str::to_string),
                message.to_string(),
            ));
            if let Some(monitor) = &self.stop_on_apply {
                monitor.request_stop();
            }
            if self.reject_applications || resume_id.is_none() {
                return Err(JobBoardError::MissingResume);
            }
            Ok(())
        }

        fn take_refreshed_tokens(&self) -> Option<TokenPair> {
            self.refreshed.lock().unwrap().take()
        }
    }

    /// Scores by vacancy title.
    #[derive(Default)]
    struct FakeScorer {
        scores: HashMap<String, f64>,
        calls: Mutex<usize>,
        stop_on_call: Option<AutomationMonitor>,
    }

    impl FakeScorer {
        fn new(scores: &[(&str, f64)]) -> Self {
            Self {
                scores: scores.iter().map(|(t, s)| (t.to_string(), *s)).collect(),
                calls: Mutex::new(0),
                stop_on_call: None,
            }
        }
    }

    #[async_trait]
    impl MatchScorer for FakeScorer {
        async fn score(
            &self,
            _profile: &CandidateProfile,
            vacancy: &VacancyRecord,
        ) -> Result<MatchAnalysis, AppError> {
            *self.calls.lock().unwrap() += 1;
            if let Some(monitor) = &self.stop_on_call {
                monitor.request_stop();
            }
            let score = self
                .scores
                .get(&vacancy.title)
                .copied()
                .ok_or_else(|| AppError::Llm(format!("no score for {}", vacancy.title)))?;
            Ok(MatchAnalysis {
                match_score: score,
                reasons: vec![format!("fits {}", vacancy.title)],
                ..Default::default()
            })
        }
    }

    fn item(id: &str, title: &str) -> Value {
        json!({"id": id, "name": title, "employer": {"name": format!("{title} Inc")}})
    }

    fn config(user_id: Uuid, cities: &[&str], specs: &[&str], auto_apply: bool) -> AutomationConfig {
        AutomationConfig {
            user_id,
            cities: cities.iter().map(|c| c.to_string()).collect(),
            specializations: specs.iter().map(|s| s.to_string()).collect(),
            auto_apply,
            max_resumes: 5,
        }
    }

    async fn store_with_profile() -> (Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();
        store
            .upsert_profile(
                user_id,
                ProfileInput {
                    skills: vec!["Rust".to_string()],
                    preferred_position: Some("Backend Engineer".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        (store, user_id)
    }

    fn pipeline(
        store: Arc<MemoryStore>,
        board: Arc<FakeBoard>,
        scorer: Arc<FakeScorer>,
        llm: Arc<ScriptedLlm>,
    ) -> AutomationPipeline {
        AutomationPipeline::new(store, board, scorer, llm, PipelineSettings::default())
    }

    const BASE_REPLY: &str = r#"{"title": "Backend Engineer"}"#;
    const VARIATION_REPLY: &str = r#"{"adapted_resume": {"title": "Tailored"}, "adaptations": ["Retitled"]}"#;

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_without_apply() {
        let (store, user_id) = store_with_profile().await;
        let board = Arc::new(FakeBoard::default().with_page(
            "1",
            "1.221",
            vec![item("101", "A"), item("102", "B"), item("103", "C")],
        ));
        let scorer = Arc::new(FakeScorer::new(&[("A", 80.0), ("B", 40.0), ("C", 65.0)]));
        let llm = Arc::new(ScriptedLlm::new([BASE_REPLY, VARIATION_REPLY, VARIATION_REPLY]));
        let monitor = AutomationMonitor::new();

        let report = pipeline(store.clone(), board, scorer, llm)
            .run(
                monitor.try_begin().unwrap(),
                config(user_id, &["1"], &["1.221"], false),
            )
            .await;

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(store.vacancy_count().await, 3);

        let status = monitor.snapshot();
        assert_eq!(status.status, RunState::Completed);
        assert_eq!(status.vacancies_loaded, 3);
        assert_eq!(status.vacancies_total, 3);
        assert_eq!(status.vacancies_analyzed, 3);
        let scores: Vec<f64> = status.recommendations.iter().map(|r| r.match_score).collect();
        assert_eq!(scores, vec![80.0, 65.0]);
        assert_eq!(status.recommendations[0].reason, "fits A");

        let variations = store.all_variations().await;
        assert_eq!(variations.len(), 2);
        assert!(variations.iter().all(|v| v.status == VariationStatus::Draft));
        assert_eq!(status.resumes_generated, 2);
        assert_eq!(status.applications_sent, 0);
        assert!(!monitor.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_is_inclusive_at_sixty() {
        let (store, user_id) = store_with_profile().await;
        let board = Arc::new(
            FakeBoard::default().with_page("1", "1", vec![item("1", "Sixty"), item("2", "FiftyNine")]),
        );
        let scorer = Arc::new(FakeScorer::new(&[("Sixty", 60.0), ("FiftyNine", 59.0)]));
        let llm = Arc::new(ScriptedLlm::new([BASE_REPLY, VARIATION_REPLY]));
        let monitor = AutomationMonitor::new();

        pipeline(store.clone(), board, scorer, llm)
            .run(monitor.try_begin().unwrap(), config(user_id, &["1"], &["1"], false))
            .await;

        let status = monitor.snapshot();
        assert_eq!(status.recommendations.len(), 1);
        assert_eq!(status.recommendations[0].title, "Sixty");

        let variations = store.all_variations().await;
        assert_eq!(variations.len(), 1);
        let sixty = store.vacancy_by_external_id("1").await.unwrap();
        assert_eq!(variations[0].vacancy_id, Some(sixty.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recommendations_capped_at_fifty_best() {
        let (store, user_id) = store_with_profile().await;
        let mut items = Vec::new();
        let mut scores = Vec::new();
        for i in 0..80 {
            let title = format!("V{i}");
            items.push(item(&i.to_string(), &title));
            scores.push((title, 60.0 + f64::from(i) * 0.5));
        }
        let score_refs: Vec<(&str, f64)> = scores.iter().map(|(t, s)| (t.as_str(), *s)).collect();
        let board = Arc::new(FakeBoard::default().with_page("1", "1", items));
        let scorer = Arc::new(FakeScorer::new(&score_refs));
        let llm = Arc::new(ScriptedLlm::new([BASE_REPLY]));
        let monitor = AutomationMonitor::new();
        let mut run_config = config(user_id, &["1"], &["1"], false);
        run_config.max_resumes = 0;

        pipeline(store, board, scorer, llm)
            .run(monitor.try_begin().unwrap(), run_config)
            .await;

        let recs = monitor.snapshot().recommendations;
        assert_eq!(recs.len(), 50);
        assert_eq!(recs[0].match_score, 99.5);
        assert_eq!(recs[49].match_score, 75.0);
        assert!(recs.windows(2).all(|w| w[0].match_score > w[1].match_score));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_load_keeps_cached_vacancies() {
        let (store, user_id) = store_with_profile().await;
        let monitor = AutomationMonitor::new();
        let board = Arc::new(FakeBoard {
            stop_after_first_search: Some(monitor.clone()),
            ..FakeBoard::default()
                .with_page("1", "1", vec![item("1", "A"), item("2", "B")])
                .with_page("2", "1", vec![item("3", "C")])
        });
        let scorer = Arc::new(FakeScorer::new(&[("A", 90.0), ("B", 90.0)]));
        let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()));

        let report = pipeline(store.clone(), board.clone(), scorer.clone(), llm)
            .run(monitor.try_begin().unwrap(), config(user_id, &["1", "2"], &["1"], false))
            .await;

        assert_eq!(report.outcome, RunOutcome::Stopped);
        assert!(report.load.stopped);
        assert_eq!(board.searches.lock().unwrap().len(), 1);
        assert_eq!(store.vacancy_count().await, 2);
        assert_eq!(*scorer.calls.lock().unwrap(), 0);

        let status = monitor.snapshot();
        assert_eq!(status.status, RunState::Running);
        assert_eq!(status.phase, Some(Phase::Loading));
        assert_eq!(status.message, "Loading: city 1, specialization 1...");
        assert!(status.stop_requested);
        assert!(!monitor.is_active());
    }

    /// Requests a stop once the wrapped model has answered `stop_at_call` times.
    struct StoppingLlm {
        inner: ScriptedLlm,
        monitor: AutomationMonitor,
        stop_at_call: usize,
    }

    #[async_trait]
    impl LlmBackend for StoppingLlm {
        fn provider_name(&self) -> &'static str {
            "stopping"
        }

        async fn send(
            &self,
            messages: &[LlmMessage],
            mode: ResponseMode,
        ) -> Result<String, LlmError> {
            let reply = self.inner.send(messages, mode).await;
            if self.inner.call_count() >= self.stop_at_call {
                self.monitor.request_stop();
            }
            reply
        }
    }

    async fn seed_drafts(store: &MemoryStore, user_id: Uuid, titles: &[&str]) {
        let base = store
            .save_base_resume(user_id, "Engineer", &json!({}))
            .await
            .unwrap();
        for (i, title) in titles.iter().enumerate() {
            let vacancy = store
                .upsert_vacancy(
                    &NewVacancy::from_hh_item(&item(&(i + 1).to_string(), title)).unwrap(),
                    false,
                )
                .await
                .unwrap();
            store
                .record_match(vacancy.id, 90.0, &json!({}), &[])
                .await
                .unwrap();
            let variation = store
                .insert_variation(NewVariation {
                    base_resume_id: base.id,
                    vacancy_id: Some(vacancy.id),
                    title: format!("Engineer for {title} Inc"),
                    content: json!({}),
                    adaptations: Vec::new(),
                })
                .await
                .unwrap();
            store
                .set_variation_remote_id(variation.id, &format!("hh-resume-{i}"))
                .await
                .unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_analyze_publishes_nothing() {
        let (store, user_id) = store_with_profile().await;
        let monitor = AutomationMonitor::new();
        let board = Arc::new(
            FakeBoard::default().with_page("1", "1", vec![item("1", "A"), item("2", "B")]),
        );
        let scorer = Arc::new(FakeScorer {
            stop_on_call: Some(monitor.clone()),
            ..FakeScorer::new(&[("A", 90.0), ("B", 90.0)])
        });
        let llm = Arc::new(ScriptedLlm::new([BASE_REPLY, VARIATION_REPLY]));

        let report = pipeline(store.clone(), board, scorer.clone(), llm.clone())
            .run(monitor.try_begin().unwrap(), config(user_id, &["1"], &["1"], false))
            .await;

        assert_eq!(report.outcome, RunOutcome::Stopped);
        assert!(report.analyze.stopped);
        assert_eq!(report.analyze.processed, 1);
        assert_eq!(*scorer.calls.lock().unwrap(), 1);
        assert_eq!(llm.call_count(), 0);

        let status = monitor.snapshot();
        assert_eq!(status.status, RunState::Running);
        assert_eq!(status.phase, Some(Phase::Analyzing));
        assert_eq!(status.vacancies_analyzed, 1);
        assert!(status.recommendations.is_empty());
        assert_eq!(status.message, "Analyzed 1 vacancies");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_generate_halts_before_next_variation() {
        let (store, user_id) = store_with_profile().await;
        let monitor = AutomationMonitor::new();
        let board = Arc::new(
            FakeBoard::default().with_page("1", "1", vec![item("1", "A"), item("2", "B")]),
        );
        let scorer = Arc::new(FakeScorer::new(&[("A", 90.0), ("B", 80.0)]));
        // Base resume, then the first variation.
        let llm = Arc::new(StoppingLlm {
            inner: ScriptedLlm::new([BASE_REPLY, VARIATION_REPLY, VARIATION_REPLY]),
            monitor: monitor.clone(),
            stop_at_call: 2,
        });
        let pipeline = AutomationPipeline::new(
            store.clone(),
            board.clone(),
            scorer,
            llm.clone(),
            PipelineSettings::default(),
        );

        let report = pipeline
            .run(monitor.try_begin().unwrap(), config(user_id, &["1"], &["1"], true))
            .await;

        assert_eq!(report.outcome, RunOutcome::Stopped);
        assert!(report.generate.stopped);
        assert_eq!(llm.inner.call_count(), 2);
        assert_eq!(store.all_variations().await.len(), 1);
        assert!(board.applications.lock().unwrap().is_empty());

        let status = monitor.snapshot();
        assert_eq!(status.status, RunState::Running);
        assert_eq!(status.phase, Some(Phase::Generating));
        assert_eq!(status.resumes_generated, 1);
        assert_eq!(status.message, "Creating resume for A Inc...");
        assert_eq!(status.recommendations.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_apply_leaves_remaining_drafts() {
        let (store, user_id) = store_with_profile().await;
        seed_drafts(&store, user_id, &["A", "B"]).await;
        let monitor = AutomationMonitor::new();
        let board = Arc::new(FakeBoard {
            stop_on_apply: Some(monitor.clone()),
            ..FakeBoard::default()
        });
        let llm = Arc::new(ScriptedLlm::new(["Dear A Inc", "Dear B Inc"]));

        let report = pipeline(store.clone(), board.clone(), Arc::new(FakeScorer::default()), llm.clone())
            .run(monitor.try_begin().unwrap(), config(user_id, &[], &[], true))
            .await;

        assert_eq!(report.outcome, RunOutcome::Stopped);
        assert!(report.apply.stopped);
        assert_eq!(board.applications.lock().unwrap().len(), 1);
        assert_eq!(llm.call_count(), 1);

        let statuses: Vec<VariationStatus> =
            store.all_variations().await.iter().map(|v| v.status).collect();
        assert_eq!(statuses.iter().filter(|s| **s == VariationStatus::Applied).count(), 1);
        assert_eq!(statuses.iter().filter(|s| **s == VariationStatus::Draft).count(), 1);

        let status = monitor.snapshot();
        assert_eq!(status.status, RunState::Running);
        assert_eq!(status.phase, Some(Phase::Applying));
        assert_eq!(status.applications_sent, 1);
        assert!(status.message.starts_with("Generating cover letter for"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_query_is_skipped() {
        let (store, user_id) = store_with_profile().await;
        let board = Arc::new(FakeBoard {
            failing_areas: vec!["2".to_string()],
            ..FakeBoard::default().with_page("1", "1", vec![item("1", "A")])
        });
        let scorer = Arc::new(FakeScorer::new(&[("A", 30.0)]));
        let llm = Arc::new(ScriptedLlm::new([BASE_REPLY]));
        let monitor = AutomationMonitor::new();

        let report = pipeline(store.clone(), board, scorer, llm)
            .run(monitor.try_begin().unwrap(), config(user_id, &["1", "2"], &["1"], false))
            .await;

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.load.processed, 1);
        assert_eq!(report.load.skipped.len(), 1);
        assert_eq!(report.load.skipped[0].item, "area 2 / specialization 1");
        assert!(report.load.skipped[0].reason.contains("503"));
        assert_eq!(store.vacancy_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scoring_failure_is_skipped_with_reason() {
        let (store, user_id) = store_with_profile().await;
        let board = Arc::new(
            FakeBoard::default().with_page("1", "1", vec![item("1", "Known"), item("2", "Unknown")]),
        );
        let scorer = Arc::new(FakeScorer::new(&[("Known", 70.0)]));
        let llm = Arc::new(ScriptedLlm::new([BASE_REPLY, VARIATION_REPLY]));
        let monitor = AutomationMonitor::new();

        let report = pipeline(store.clone(), board, scorer, llm)
            .run(monitor.try_begin().unwrap(), config(user_id, &["1"], &["1"], false))
            .await;

        assert_eq!(report.analyze.processed, 1);
        assert_eq!(report.analyze.skipped[0].item, "2");
        assert!(report.analyze.skipped[0].reason.contains("no score for Unknown"));
        assert!(store.vacancy_by_external_id("2").await.unwrap().match_score.is_none());
        assert_eq!(monitor.snapshot().status, RunState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_profile_fails_run() {
        let store = Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();
        let board = Arc::new(FakeBoard::default().with_page("1", "1", vec![item("1", "A")]));
        let scorer = Arc::new(FakeScorer::new(&[("A", 90.0)]));
        let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()));
        let monitor = AutomationMonitor::new();

        let report = pipeline(store.clone(), board, scorer.clone(), llm)
            .run(monitor.try_begin().unwrap(), config(user_id, &["1"], &["1"], true))
            .await;

        assert_eq!(report.outcome, RunOutcome::Failed);
        let status = monitor.snapshot();
        assert_eq!(status.status, RunState::Error);
        assert!(status.error.unwrap().contains("Profile not found"));
        assert_eq!(status.phase, Some(Phase::Analyzing));
        assert_eq!(store.vacancy_count().await, 1);
        assert_eq!(*scorer.calls.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_submission_leaves_variation_ready() {
        let (store, user_id) = store_with_profile().await;
        let board = Arc::new(FakeBoard::default().with_page("1", "1", vec![item("1", "A")]));
        let scorer = Arc::new(FakeScorer::new(&[("A", 85.0)]));
        let llm = Arc::new(ScriptedLlm::new([BASE_REPLY, VARIATION_REPLY, "Dear A Inc"]));
        let monitor = AutomationMonitor::new();

        let report = pipeline(store.clone(), board.clone(), scorer, llm)
            .run(monitor.try_begin().unwrap(), config(user_id, &["1"], &["1"], true))
            .await;

        assert_eq!(report.outcome, RunOutcome::Completed);
        let variations = store.all_variations().await;
        assert_eq!(variations[0].status, VariationStatus::Ready);
        assert_eq!(variations[0].cover_letter.as_deref(), Some("Dear A Inc"));
        assert_eq!(report.apply.skipped.len(), 1);
        assert!(report.apply.skipped[0].reason.starts_with("submission failed"));

        let applications = board.applications.lock().unwrap();
        assert_eq!(applications[0].0, "1");
        assert_eq!(applications[0].1, None);
        assert_eq!(monitor.snapshot().applications_sent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_submission_marks_applied() {
        let (store, user_id) = store_with_profile().await;
        let vacancy = store
            .upsert_vacancy(&NewVacancy::from_hh_item(&item("7", "Seven")).unwrap(), false)
            .await
            .unwrap();
        store
            .record_match(vacancy.id, 90.0, &json!({}), &[])
            .await
            .unwrap();
        let base = store
            .save_base_resume(user_id, "Engineer", &json!({}))
            .await
            .unwrap();
        let variation = store
            .insert_variation(NewVariation {
                base_resume_id: base.id,
                vacancy_id: Some(vacancy.id),
                title: "Engineer for Seven Inc".to_string(),
                content: json!({}),
                adaptations: Vec::new(),
            })
            .await
            .unwrap();
        store
            .set_variation_remote_id(variation.id, "hh-resume-1")
            .await
            .unwrap();

        let board = Arc::new(FakeBoard::default());
        let scorer = Arc::new(FakeScorer::default());
        let llm = Arc::new(ScriptedLlm::new(["Dear Seven Inc"]));
        let monitor = AutomationMonitor::new();

        let report = pipeline(store.clone(), board.clone(), scorer, llm.clone())
            .run(monitor.try_begin().unwrap(), config(user_id, &[], &[], true))
            .await;

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.generate.skipped[0].reason, "variation already exists");
        let stored = store.get_variation(variation.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VariationStatus::Applied);
        assert_eq!(monitor.snapshot().applications_sent, 1);
        assert_eq!(llm.call_count(), 1);

        let applications = board.applications.lock().unwrap();
        assert_eq!(
            applications[0],
            (
                "7".to_string(),
                Some("hh-resume-1".to_string()),
                "Dear Seven Inc".to_string()
            )
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_creates_no_duplicate_variations() {
        let (store, user_id) = store_with_profile().await;
        let board = Arc::new(FakeBoard::default().with_page("1", "1", vec![item("1", "A")]));
        let scorer = Arc::new(FakeScorer::new(&[("A", 90.0)]));
        let llm = Arc::new(ScriptedLlm::new([BASE_REPLY, VARIATION_REPLY]));
        let monitor = AutomationMonitor::new();
        let pipeline = pipeline(store.clone(), board, scorer.clone(), llm.clone());

        pipeline
            .run(monitor.try_begin().unwrap(), config(user_id, &["1"], &["1"], false))
            .await;
        let second = pipeline
            .run(monitor.try_begin().unwrap(), config(user_id, &["1"], &["1"], false))
            .await;

        assert_eq!(store.vacancy_count().await, 1);
        assert_eq!(store.all_variations().await.len(), 1);
        assert_eq!(second.generate.processed, 0);
        assert_eq!(second.generate.skipped.len(), 1);
        assert_eq!(*scorer.calls.lock().unwrap(), 1);
        assert_eq!(llm.call_count(), 2);
        assert_eq!(monitor.snapshot().resumes_generated, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshed_tokens_are_persisted() {
        let (store, user_id) = store_with_profile().await;
        let board = Arc::new(FakeBoard::default());
        *board.refreshed.lock().unwrap() = Some(TokenPair {
            access_token: "new-access".to_string(),
            refresh_token: "new-refresh".to_string(),
            expires_in: Some(3600),
        });
        let llm = Arc::new(ScriptedLlm::new([BASE_REPLY]));
        let monitor = AutomationMonitor::new();

        pipeline(store.clone(), board, Arc::new(FakeScorer::default()), llm)
            .run(monitor.try_begin().unwrap(), config(user_id, &[], &[], false))
            .await;

        let user = store.get_user(user_id).await.unwrap().unwrap();
        assert_eq!(user.hh_access_token.as_deref(), Some("new-access"));
        assert_eq!(user.hh_refresh_token.as_deref(), Some("new-refresh"));
    }

    #[test]
    fn test_config_defaults() {
        let config: AutomationConfig = serde_json::from_value(json!({
            "user_id": Uuid::nil(),
            "cities": ["1"],
            "specializations": ["1.221"]
        }))
        .unwrap();
        assert!(config.auto_apply);
        assert_eq!(config.max_resumes, 20);
    }
}
