//! Application state: the process-wide backend selection, prompts, the
//! persistence sink, and the in-memory answer-key registry.
//!
//! The backend is chosen exactly once here, from the environment, and then
//! injected into every pipeline run; nothing downstream inspects env vars.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::backend::{build_backend, GenerativeStep};
use crate::config::{load_agent_config_from_env, BackendConfig, Prompts};
use crate::domain::QuizQuestionOut;
use crate::persist::{MemorySink, PersistenceSink};
use crate::scoring::AnswerKey;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn GenerativeStep>,
    pub prompts: Prompts,
    pub sink: Arc<dyn PersistenceSink>,
    pub answer_key: Arc<RwLock<AnswerKey>>,
}

impl AppState {
    /// Build state from env: load config, resolve the backend, set up stores.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let prompts = load_agent_config_from_env()
            .and_then(|c| c.prompts)
            .unwrap_or_default();
        let backend = build_backend(&BackendConfig::from_env());
        Self::with_parts(backend, prompts, Arc::new(MemorySink::new()))
    }

    /// Assemble state from explicit parts. This is the seam tests use to
    /// inject stub/failing backends and sinks.
    pub fn with_parts(
        backend: Arc<dyn GenerativeStep>,
        prompts: Prompts,
        sink: Arc<dyn PersistenceSink>,
    ) -> Self {
        Self {
            backend,
            prompts,
            sink,
            answer_key: Arc::new(RwLock::new(AnswerKey::new())),
        }
    }

    /// Register freshly generated quiz questions so later submissions can be
    /// scored against them.
    ///
    /// The key only grows for the lifetime of the process; entries are tiny
    /// (id, subject, one answer letter) and a durable store would own
    /// eviction. Revisit if quiz volume per process becomes large.
    pub async fn register_questions(&self, subject: &str, questions: &[QuizQuestionOut]) {
        let mut key = self.answer_key.write().await;
        for q in questions {
            key.insert(q.id.clone(), subject, q.question.correct_answer.clone());
        }
        info!(target: "assess", %subject, count = questions.len(), total = key.len(), "Questions registered in answer key");
    }

    /// Snapshot of the current answer key for a scoring pass.
    pub async fn answer_key_snapshot(&self) -> AnswerKey {
        self.answer_key.read().await.clone()
    }
}
