use std::sync::Arc;

use crate::automation::AutomationMonitor;
use crate::config::Config;
use crate::generation::match_scorer::MatchScorer;
use crate::llm_client::LlmBackend;
use crate::store::Store;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub llm: Arc<dyn LlmBackend>,
    /// Pluggable match scorer. Default: LlmMatchScorer over `llm`.
    pub scorer: Arc<dyn MatchScorer>,
    /// Process-wide automation status; at most one run holds its writer.
    pub monitor: AutomationMonitor,
    /// Job-board settings live in `config.hh`; clients are built per request.
    pub config: Config,
}
