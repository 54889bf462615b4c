//! The stage engine: ordered execution, sanitize-or-fallback policy, trace.
//!
//! Every generative call in the system goes through one [`Stage`], so the
//! generate → sanitize → merge-or-fallback policy lives in exactly one place
//! instead of being repeated per call site. Pipelines are linear: no
//! branching, no retries, one attempt per stage, and the run always reaches
//! the end regardless of how many stages degraded.

use tracing::{debug, instrument, warn};

use crate::backend::{GenerativeStep, PromptSpec};
use crate::config::Prompts;
use crate::domain::PipelineState;
use crate::sanitize::{extract, ParseFailure};
use crate::util::trunc_for_log;

/// One named unit of work with a generative path and a deterministic
/// fallback path sharing the same output contract.
///
/// Contract for implementors:
/// - `merge` must validate the payload fully before touching `state`; on
///   `Err` the state must be left exactly as it was.
/// - `fallback` must always succeed and produce the same field shape the
///   successful path produces. Fallback data is fixed, exhaustively tested
///   content — never another generative call.
/// - Both return a short human-readable summary for the trace line.
pub trait Stage: Send + Sync {
  fn name(&self) -> &'static str;

  /// Build the stage request from fields earlier stages already produced.
  fn prompt(&self, prompts: &Prompts, state: &PipelineState) -> PromptSpec;

  fn merge(&self, state: &mut PipelineState, value: serde_json::Value)
    -> Result<String, ParseFailure>;

  fn fallback(&self, state: &mut PipelineState) -> String;
}

/// An ordered list of stages with fixed linear transitions.
pub struct Pipeline {
  stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
  pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
    Self { stages }
  }

  /// Execute all stages in order, threading the state through.
  ///
  /// Generation and parse failures are absorbed per stage; the only way this
  /// does not return a complete state is a programming defect in a stage.
  #[instrument(level = "info", skip_all, fields(backend = backend.name(), stages = self.stages.len()))]
  pub async fn run(
    &self,
    backend: &dyn GenerativeStep,
    prompts: &Prompts,
    mut state: PipelineState,
  ) -> PipelineState {
    for stage in &self.stages {
      let spec = stage.prompt(prompts, &state);

      let merged: Result<String, ()> = match backend.invoke(&spec).await {
        Ok(raw) => match extract(&raw) {
          Ok(value) => stage.merge(&mut state, value).map_err(|e| {
            warn!(target: "pipeline", stage = stage.name(), error = %e, "Payload rejected by stage; using fallback");
          }),
          Err(e) => {
            warn!(target: "pipeline", stage = stage.name(), error = %e, raw = %trunc_for_log(&raw, 120), "Unparseable output; using fallback");
            Err(())
          }
        },
        Err(e) => {
          warn!(target: "pipeline", stage = stage.name(), error = %e, "Generation failed; using fallback");
          Err(())
        }
      };

      let line = match merged {
        Ok(summary) => summary,
        Err(()) => format!("fallback used: {}", stage.fallback(&mut state)),
      };
      debug!(target: "pipeline", stage = stage.name(), %line, "Stage complete");
      state.trace.push(format!("{}: {}", stage.name(), line));
    }
    state
  }
}

// Convenience: merge helpers shared by concrete stages.

/// Pull a required non-empty string field out of a payload object.
pub(crate) fn require_string(value: &serde_json::Value, key: &str) -> Result<String, ParseFailure> {
  value
    .get(key)
    .and_then(|v| v.as_str())
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_string)
    .ok_or_else(|| ParseFailure::WrongShape(format!("missing or empty '{}'", key)))
}

/// Pull a required non-empty array of non-empty strings out of a payload.
pub(crate) fn require_string_list(
  value: &serde_json::Value,
  key: &str,
) -> Result<Vec<String>, ParseFailure> {
  let items = value
    .get(key)
    .and_then(|v| v.as_array())
    .ok_or_else(|| ParseFailure::WrongShape(format!("missing array '{}'", key)))?;
  let out: Vec<String> = items
    .iter()
    .filter_map(|v| v.as_str())
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_string)
    .collect();
  if out.is_empty() {
    return Err(ParseFailure::WrongShape(format!("'{}' has no usable entries", key)));
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::{GenerationFailure, StageKind};
  use async_trait::async_trait;

  /// Backend that fails every call; exercises the fallback path end to end.
  pub struct DownStep;

  #[async_trait]
  impl GenerativeStep for DownStep {
    async fn invoke(&self, _spec: &PromptSpec) -> Result<String, GenerationFailure> {
      Err(GenerationFailure::Http { status: 429, message: "quota exceeded".into() })
    }
    fn name(&self) -> &'static str { "down" }
  }

  /// Backend that answers with refusal prose (no JSON anywhere).
  pub struct RefusingStep;

  #[async_trait]
  impl GenerativeStep for RefusingStep {
    async fn invoke(&self, _spec: &PromptSpec) -> Result<String, GenerationFailure> {
      Ok("I'm sorry, I cannot produce that.".into())
    }
    fn name(&self) -> &'static str { "refusing" }
  }

  struct SummaryOnly;

  impl Stage for SummaryOnly {
    fn name(&self) -> &'static str { "summary_only" }
    fn prompt(&self, _p: &Prompts, _s: &PipelineState) -> PromptSpec {
      PromptSpec {
        kind: StageKind::Summarize,
        system: String::new(),
        user: String::new(),
        count: 0,
        topics: vec![],
      }
    }
    fn merge(&self, state: &mut PipelineState, value: serde_json::Value)
      -> Result<String, ParseFailure>
    {
      let summary = require_string(&value, "summary")?;
      state.summary = Some(summary);
      Ok("merged".into())
    }
    fn fallback(&self, state: &mut PipelineState) -> String {
      state.summary = Some("default summary".into());
      "default summary".into()
    }
  }

  #[tokio::test]
  async fn generation_failure_degrades_to_fallback_and_completes() {
    let pipeline = Pipeline::new(vec![Box::new(SummaryOnly)]);
    let state = pipeline
      .run(&DownStep, &Prompts::default(), PipelineState::new("text", 0))
      .await;
    assert_eq!(state.summary.as_deref(), Some("default summary"));
    assert_eq!(state.trace.len(), 1);
    assert!(state.trace[0].contains("fallback used"));
  }

  #[tokio::test]
  async fn refusal_text_degrades_to_fallback() {
    let pipeline = Pipeline::new(vec![Box::new(SummaryOnly)]);
    let state = pipeline
      .run(&RefusingStep, &Prompts::default(), PipelineState::new("text", 0))
      .await;
    assert_eq!(state.summary.as_deref(), Some("default summary"));
  }

  #[tokio::test]
  async fn wrong_shape_payload_degrades_to_fallback() {
    struct WrongShapeStep;
    #[async_trait]
    impl GenerativeStep for WrongShapeStep {
      async fn invoke(&self, _spec: &PromptSpec) -> Result<String, GenerationFailure> {
        Ok(r#"{"unexpected": 42}"#.into())
      }
      fn name(&self) -> &'static str { "wrong_shape" }
    }

    let pipeline = Pipeline::new(vec![Box::new(SummaryOnly)]);
    let state = pipeline
      .run(&WrongShapeStep, &Prompts::default(), PipelineState::new("text", 0))
      .await;
    assert_eq!(state.summary.as_deref(), Some("default summary"));
  }

  #[test]
  fn require_string_list_rejects_empty_entries() {
    let v = serde_json::json!({"topics": ["", "  "]});
    assert!(require_string_list(&v, "topics").is_err());
    let v = serde_json::json!({"topics": ["Algebra", ""]});
    assert_eq!(require_string_list(&v, "topics").unwrap(), vec!["Algebra"]);
  }
}
