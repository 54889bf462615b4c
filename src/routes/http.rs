//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{error, info, instrument};

use crate::logic::{run_content_analysis, run_quiz_generation, score_assessment};
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state, body), fields(text_len = body.text.len(), count = body.question_count))]
pub async fn http_post_quiz(
  State(state): State<Arc<AppState>>,
  Json(body): Json<QuizIn>,
) -> impl IntoResponse {
  let ctx = body.context.unwrap_or_default();
  let bundle = run_quiz_generation(&state, &body.text, body.question_count, ctx).await;
  info!(target: "pipeline", questions = bundle.questions.len(), "HTTP quiz served");
  Json(QuizOut { bundle })
}

#[instrument(level = "info", skip(state, body), fields(text_len = body.text.len(), analysis_type = body.analysis_type.as_str()))]
pub async fn http_post_analyze(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AnalyzeIn>,
) -> impl IntoResponse {
  match run_content_analysis(&state, &body.text, body.analysis_type).await {
    Ok(analysis) => Json(AnalyzeOut { analysis }).into_response(),
    Err(e) => {
      error!(target: "pipeline", error = %e, "Analysis persistence failed");
      (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorOut { message: e.to_string() }),
      )
        .into_response()
    }
  }
}

#[instrument(level = "info", skip(state, body), fields(user = %body.user_id, answers = body.answers.len()))]
pub async fn http_post_score(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ScoreIn>,
) -> impl IntoResponse {
  match score_assessment(&state, &body.user_id, &body.answers).await {
    Ok(report) => {
      info!(target: "assess", user = %body.user_id, overall = report.overall_score, "HTTP assessment scored");
      Json(ScoreOut { report }).into_response()
    }
    Err(e) => {
      error!(target: "assess", user = %body.user_id, error = %e, "Assessment persistence failed");
      (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorOut { message: e.to_string() }),
      )
        .into_response()
    }
  }
}
