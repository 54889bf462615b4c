//! Generative backend capability and its two implementations.
//!
//! [`GenerativeStep`] is the single seam between the pipeline and whatever
//! produces raw text: a live OpenAI chat-completions client, or a
//! deterministic stub that is always available. Which one runs is decided
//! once at startup from [`BackendConfig`]; stages never pick per call.
//!
//! NOTE: We never log the API key and we keep payload truncations short.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use crate::config::BackendConfig;

/// Which stage a prompt belongs to. The stub uses this to shape its canned
/// output; the live backend uses it only to pick a sampling temperature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
  ExtractTopics,
  GenerateQuestions,
  Summarize,
  ExtractKeyPoints,
  AssessEducationalValue,
}

impl StageKind {
  fn temperature(self) -> f32 {
    match self {
      StageKind::ExtractTopics | StageKind::GenerateQuestions => 0.8,
      _ => 0.2,
    }
  }
}

/// A fully built request for one stage invocation.
#[derive(Clone, Debug)]
pub struct PromptSpec {
  pub kind: StageKind,
  pub system: String,
  pub user: String,
  /// How many items the stage wants (topics/questions); 0 when not counted.
  pub count: usize,
  /// Topics already present in the pipeline state, if any.
  pub topics: Vec<String>,
}

/// Transport/auth/quota failure from the live backend. Stages absorb this
/// with their fallback; it is never surfaced to the pipeline caller.
#[derive(Debug, Error)]
pub enum GenerationFailure {
  #[error("transport error: {0}")]
  Transport(String),
  #[error("backend HTTP {status}: {message}")]
  Http { status: u16, message: String },
  #[error("backend returned no content")]
  Empty,
}

#[async_trait]
pub trait GenerativeStep: Send + Sync {
  /// One attempt, no retries. Raw text out; callers sanitize it themselves.
  async fn invoke(&self, spec: &PromptSpec) -> Result<String, GenerationFailure>;

  fn name(&self) -> &'static str;
}

/// Select the process-wide backend. Absent credentials mean the stub serves
/// every request for the lifetime of the process.
pub fn build_backend(cfg: &BackendConfig) -> Arc<dyn GenerativeStep> {
  match OpenAiStep::from_config(cfg) {
    Some(live) => {
      info!(target: "studyloop_backend", base_url = %live.base_url, model = %live.model, "Generative backend enabled (OpenAI)");
      Arc::new(live)
    }
    None => {
      info!(target: "studyloop_backend", "Generative backend disabled (no OPENAI_API_KEY). Using deterministic stub.");
      Arc::new(StubStep)
    }
  }
}

// --- Live backend ---

pub struct OpenAiStep {
  client: reqwest::Client,
  api_key: String,
  base_url: String,
  model: String,
}

impl OpenAiStep {
  /// Construct the live client if the config carries a key; otherwise None.
  pub fn from_config(cfg: &BackendConfig) -> Option<Self> {
    let api_key = cfg.api_key.clone()?;
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;
    Some(Self {
      client,
      api_key,
      base_url: cfg.base_url.clone(),
      model: cfg.model.clone(),
    })
  }
}

#[async_trait]
impl GenerativeStep for OpenAiStep {
  #[instrument(level = "info", skip(self, spec), fields(kind = ?spec.kind, model = %self.model))]
  async fn invoke(&self, spec: &PromptSpec) -> Result<String, GenerationFailure> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: spec.system.clone() },
        ChatMessageReq { role: "user".into(), content: spec.user.clone() },
      ],
      temperature: spec.kind.temperature(),
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
    };

    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "studyloop-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req)
      .send()
      .await
      .map_err(|e| GenerationFailure::Transport(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      return Err(GenerationFailure::Http { status, message });
    }

    let body: ChatCompletionResponse = res
      .json()
      .await
      .map_err(|e| GenerationFailure::Transport(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }

    body
      .choices
      .first()
      .and_then(|c| c.message.content.clone())
      .filter(|t| !t.trim().is_empty())
      .ok_or(GenerationFailure::Empty)
  }

  fn name(&self) -> &'static str { "openai" }
}

// --- Deterministic stub ---

/// Always-available backend returning canned, shape-correct JSON. Output is
/// fenced on purpose so the stub exercises the same sanitizer path as live
/// model output.
pub struct StubStep;

const STUB_TOPIC_BANK: &[&str] = &[
  "Core Concepts",
  "Key Definitions",
  "Worked Examples",
  "Common Pitfalls",
  "Applications",
];

#[async_trait]
impl GenerativeStep for StubStep {
  async fn invoke(&self, spec: &PromptSpec) -> Result<String, GenerationFailure> {
    let payload = match spec.kind {
      StageKind::ExtractTopics => {
        let topics: Vec<String> = (0..spec.count.max(1))
          .map(|i| stub_topic(i))
          .collect();
        serde_json::json!({ "topics": topics })
      }
      StageKind::GenerateQuestions => {
        let topics = if spec.topics.is_empty() {
          vec![stub_topic(0)]
        } else {
          spec.topics.clone()
        };
        let questions: Vec<serde_json::Value> = (0..spec.count.max(1))
          .map(|i| {
            let topic = &topics[i % topics.len()];
            serde_json::json!({
              "question": format!("Which statement best describes {}?", topic),
              "options": [
                format!("The defining idea behind {}", topic),
                "An unrelated historical anecdote",
                "A common misconception",
                "A term from a different field",
              ],
              "correctAnswer": "A",
              "topic": topic,
              "difficulty": "intermediate",
            })
          })
          .collect();
        serde_json::json!({ "questions": questions })
      }
      StageKind::Summarize => serde_json::json!({
        "summary": "The material introduces its main ideas step by step and reinforces them with examples.",
      }),
      StageKind::ExtractKeyPoints => serde_json::json!({
        "keyPoints": [
          "The material builds from definitions to applications.",
          "Worked examples illustrate each new idea.",
          "Review questions consolidate understanding.",
        ],
      }),
      StageKind::AssessEducationalValue => serde_json::json!({
        "educationalValue": "medium",
        "difficulty": "intermediate",
      }),
    };

    Ok(format!("```json\n{}\n```", payload))
  }

  fn name(&self) -> &'static str { "stub" }
}

fn stub_topic(i: usize) -> String {
  match STUB_TOPIC_BANK.get(i) {
    Some(t) => (*t).to_string(),
    None => format!("Topic {}", i + 1),
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
