//! Configuration: stage prompts (TOML-overridable) and the generative
//! backend selection, both resolved once at process start.

use serde::Deserialize;
use tracing::{error, info};

/// Prompts used by the pipeline stages. Defaults are sensible for general
/// educational content; override them in TOML to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  // Quiz generation
  pub topics_system: String,
  pub topics_user_template: String,
  pub questions_system: String,
  pub questions_user_template: String,
  // Content analysis
  pub summary_system: String,
  pub summary_user_template: String,
  pub key_points_system: String,
  pub key_points_user_template: String,
  pub assess_system: String,
  pub assess_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      topics_system: "You extract study topics from educational text. Respond ONLY with strict JSON.".into(),
      topics_user_template: "Extract the {count} most important topics from the text below. Return JSON {\"topics\": [string]}.{context}\n\nText:\n{text}".into(),
      questions_system: "You write multiple-choice quiz questions. Respond ONLY with strict JSON.".into(),
      questions_user_template: "Write {count} four-option multiple-choice questions covering these topics: {topics}.{context}\nReturn JSON {\"questions\": [{\"question\": string, \"options\": [4 strings], \"correctAnswer\": \"A\"|\"B\"|\"C\"|\"D\", \"topic\": string, \"difficulty\": \"beginner\"|\"intermediate\"|\"advanced\"}]}.\n\nSource text:\n{text}".into(),
      summary_system: "You summarize educational material for learners. Respond ONLY with strict JSON.".into(),
      summary_user_template: "Summarize the text below in 2-3 sentences ({depth}). Return JSON {\"summary\": string}.\n\nText:\n{text}".into(),
      key_points_system: "You distill educational material into key points. Respond ONLY with strict JSON.".into(),
      key_points_user_template: "List the 3-5 key points of the text below ({depth}). Return JSON {\"keyPoints\": [string]}.\n\nText:\n{text}".into(),
      assess_system: "You assess the educational value of material. Respond ONLY with strict JSON.".into(),
      assess_user_template: "Assess the text below. Return JSON {\"educationalValue\": \"high\"|\"medium\"|\"low\", \"difficulty\": \"beginner\"|\"intermediate\"|\"advanced\"}.\n\nText:\n{text}".into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Option<Prompts>,
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO
/// error, returns None and the compiled-in defaults stay in effect.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AgentConfig>(&s) {
      Ok(cfg) => {
        info!(target: "studyloop_backend", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "studyloop_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "studyloop_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

/// Generative backend settings, read from the environment exactly once at
/// startup. `api_key = None` selects the deterministic stub for the whole
/// process lifetime; there is no per-call switching.
#[derive(Clone, Debug)]
pub struct BackendConfig {
  pub api_key: Option<String>,
  pub base_url: String,
  pub model: String,
}

impl BackendConfig {
  pub fn from_env() -> Self {
    Self {
      api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
      base_url: std::env::var("OPENAI_BASE_URL")
        .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
      model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
    }
  }
}
