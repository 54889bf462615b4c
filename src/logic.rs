//! Core operations shared by every transport: quiz generation, content
//! analysis, and assessment scoring. HTTP handlers are thin wrappers over
//! these.

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
  AnalysisType, AssessmentMetadata, AssessmentResult, ContentAnalysis, ContentAnalysisRecord,
  Difficulty, EducationalValue, PipelineState, QuizBundle, QuizContext, QuizQuestionOut,
};
use crate::persist::SinkError;
use crate::scoring::{self, AssessmentScoreReport, SubmittedAnswer};
use crate::stages::{analysis_pipeline, quiz_pipeline};
use crate::state::AppState;

/// Hard cap on questions per quiz; requests beyond it are clamped.
const MAX_QUESTIONS: usize = 25;

/// Run the quiz-generation pipeline: ExtractTopics → GenerateQuestions.
///
/// Always returns exactly the requested number of questions — clamped to
/// 1..=MAX_QUESTIONS, with the clamp reported via the bundle's
/// requested/returned counts — each with 4 options and a correct answer in
/// A..D, regardless of how the generative backend behaved. Generated
/// questions are registered in the answer key so a later submission can be
/// scored.
#[instrument(level = "info", skip(state, text, ctx), fields(text_len = text.len(), requested = count))]
pub async fn run_quiz_generation(
  state: &AppState,
  text: &str,
  count: usize,
  ctx: QuizContext,
) -> QuizBundle {
  let requested_count = count;
  let count = count.clamp(1, MAX_QUESTIONS);
  if count != requested_count {
    warn!(target: "pipeline", requested = requested_count, effective = count, "Question count clamped");
  }
  let subject = ctx.subject.clone().unwrap_or_else(|| "General".to_string());

  let pipeline = quiz_pipeline(ctx);
  let run = pipeline
    .run(state.backend.as_ref(), &state.prompts, PipelineState::new(text, count))
    .await;
  for line in &run.trace {
    info!(target: "pipeline", %line, "quiz trace");
  }

  // Stage contract: both fields are set by the end of the run. An empty
  // result here is a stage defect, not a runtime condition.
  debug_assert!(run.questions.is_some() && run.topics.is_some());
  let questions: Vec<QuizQuestionOut> = run
    .questions
    .unwrap_or_default()
    .into_iter()
    .map(|question| QuizQuestionOut { id: Uuid::new_v4().to_string(), question })
    .collect();
  let topics = run.topics.unwrap_or_default();

  state.register_questions(&subject, &questions).await;
  info!(target: "pipeline", %subject, questions = questions.len(), topics = topics.len(), "Quiz generated");

  let returned_count = questions.len();
  QuizBundle { questions, topics, subject, requested_count, returned_count }
}

/// Run the content-analysis pipeline: Summarize → ExtractKeyPoints →
/// AssessEducationalValue. All three stages always execute; the result is
/// structurally complete no matter how many of them degraded.
///
/// The only error that can surface is a persistence write failure.
#[instrument(level = "info", skip(state, text), fields(text_len = text.len(), analysis_type = analysis_type.as_str()))]
pub async fn run_content_analysis(
  state: &AppState,
  text: &str,
  analysis_type: AnalysisType,
) -> Result<ContentAnalysis, SinkError> {
  let pipeline = analysis_pipeline(analysis_type);
  let run = pipeline
    .run(state.backend.as_ref(), &state.prompts, PipelineState::new(text, 0))
    .await;
  for line in &run.trace {
    info!(target: "pipeline", %line, "analysis trace");
  }

  debug_assert!(
    run.summary.is_some()
      && run.key_points.is_some()
      && run.educational_value.is_some()
      && run.difficulty.is_some()
  );
  let analysis = ContentAnalysis {
    summary: run.summary.unwrap_or_default(),
    key_points: run.key_points.unwrap_or_default(),
    educational_value: run.educational_value.unwrap_or(EducationalValue::Medium),
    difficulty: run.difficulty.unwrap_or(Difficulty::Intermediate),
  };

  let record = ContentAnalysisRecord {
    id: Uuid::new_v4().to_string(),
    analysis_type: analysis_type.as_str().to_string(),
    input_chars: text.chars().count(),
    result: analysis.clone(),
  };
  state.sink.save_analysis(record).await?;

  Ok(analysis)
}

/// Score a learner's submitted answers, persist the assessment row, and
/// return the report. Scoring itself is pure; the sink write is the only
/// fallible step and its failure propagates untouched.
#[instrument(level = "info", skip(state, answers), fields(%user_id, answers = answers.len()))]
pub async fn score_assessment(
  state: &AppState,
  user_id: &str,
  answers: &[SubmittedAnswer],
) -> Result<AssessmentScoreReport, SinkError> {
  let key = state.answer_key_snapshot().await;
  let report = scoring::score(&key, answers);
  info!(
    target: "assess",
    overall = report.overall_score,
    weak = report.weak_subjects.len(),
    strong = report.strong_subjects.len(),
    "Assessment scored"
  );

  let record = build_assessment_record(user_id, &report);
  state.sink.save_assessment(record).await?;
  Ok(report)
}

fn build_assessment_record(user_id: &str, report: &AssessmentScoreReport) -> AssessmentResult {
  let subject = match report.subject_scores.len() {
    0 => "none".to_string(),
    1 => report.subject_scores.keys().next().cloned().unwrap_or_default(),
    _ => "multi-subject".to_string(),
  };

  // Study order: ascending score, name as tie-break (BTreeMap iteration is
  // already name-ordered).
  let mut learning_path: Vec<String> = report.subject_scores.keys().cloned().collect();
  learning_path.sort_by_key(|s| report.subject_scores[s]);

  AssessmentResult {
    id: Uuid::new_v4().to_string(),
    user_id: user_id.to_string(),
    subject,
    score: report.overall_score,
    total_questions: report.total_questions,
    correct_answers: report.correct_answers,
    weak_areas: report.weak_subjects.clone(),
    recommendations: recommendations_for(report),
    assessment_type: "quiz".to_string(),
    metadata: AssessmentMetadata {
      subject_scores: report.subject_scores.clone(),
      study_plan: report.study_plan.clone(),
      personalized_content: None,
      learning_path,
    },
  }
}

fn recommendations_for(report: &AssessmentScoreReport) -> Vec<String> {
  if report.weak_subjects.is_empty() {
    return vec!["Keep practicing to maintain your current scores.".to_string()];
  }
  report
    .weak_subjects
    .iter()
    .map(|s| format!("Review the fundamentals of {} and retake a short quiz.", s))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  use async_trait::async_trait;

  use crate::backend::{GenerationFailure, GenerativeStep, PromptSpec, StubStep};
  use crate::config::Prompts;
  use crate::persist::{MemorySink, PersistenceSink};
  use crate::scoring::{AnswerKey, SubmittedAnswer};

  /// Backend that fails every call.
  struct DownStep;

  #[async_trait]
  impl GenerativeStep for DownStep {
    async fn invoke(&self, _spec: &PromptSpec) -> Result<String, GenerationFailure> {
      Err(GenerationFailure::Transport("connection refused".into()))
    }
    fn name(&self) -> &'static str { "down" }
  }

  /// Sink whose writes always fail; exercises error propagation.
  struct BrokenSink;

  #[async_trait]
  impl PersistenceSink for BrokenSink {
    async fn save_assessment(&self, _r: AssessmentResult) -> Result<(), SinkError> {
      Err(SinkError::Write("disk full".into()))
    }
    async fn save_analysis(&self, _r: ContentAnalysisRecord) -> Result<(), SinkError> {
      Err(SinkError::Write("disk full".into()))
    }
  }

  fn app(backend: Arc<dyn GenerativeStep>) -> (AppState, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    (AppState::with_parts(backend, Prompts::default(), sink.clone()), sink)
  }

  const TEXT: &str = "Photosynthesis converts light energy into chemical energy. \
    Chlorophyll absorbs light. Plants release oxygen as a byproduct.";

  #[tokio::test]
  async fn quiz_has_exact_count_with_stub_backend() {
    let (state, _) = app(Arc::new(StubStep));
    let bundle = run_quiz_generation(&state, TEXT, 5, QuizContext::default()).await;
    assert_eq!(bundle.questions.len(), 5);
    for q in &bundle.questions {
      assert!(q.question.is_valid());
    }
  }

  #[tokio::test]
  async fn oversized_quiz_request_is_clamped_visibly() {
    let (state, _) = app(Arc::new(StubStep));
    let bundle = run_quiz_generation(&state, TEXT, 30, QuizContext::default()).await;
    assert_eq!(bundle.questions.len(), MAX_QUESTIONS);
    assert_eq!(bundle.requested_count, 30);
    assert_eq!(bundle.returned_count, MAX_QUESTIONS);
  }

  #[tokio::test]
  async fn zero_count_request_is_floored_visibly() {
    let (state, _) = app(Arc::new(StubStep));
    let bundle = run_quiz_generation(&state, TEXT, 0, QuizContext::default()).await;
    assert_eq!(bundle.questions.len(), 1);
    assert_eq!(bundle.requested_count, 0);
    assert_eq!(bundle.returned_count, 1);
  }

  #[tokio::test]
  async fn quiz_has_exact_count_when_every_stage_fails() {
    let (state, _) = app(Arc::new(DownStep));
    let bundle = run_quiz_generation(&state, TEXT, 7, QuizContext::default()).await;
    assert_eq!(bundle.questions.len(), 7);
    for q in &bundle.questions {
      assert_eq!(q.question.options.len(), 4);
      assert!(matches!(q.question.correct_answer.as_str(), "A" | "B" | "C" | "D"));
    }
    // Topic extraction fell back, but question generation still keyed off it.
    assert!(!bundle.topics.is_empty());
  }

  #[tokio::test]
  async fn analysis_is_always_structurally_complete() {
    for backend in [Arc::new(StubStep) as Arc<dyn GenerativeStep>, Arc::new(DownStep)] {
      let (state, sink) = app(backend);
      let analysis = run_content_analysis(&state, TEXT, AnalysisType::Educational)
        .await
        .expect("analysis");
      assert!(!analysis.summary.is_empty());
      assert!(!analysis.key_points.is_empty());
      assert_eq!(sink.analysis_count().await, 1);
    }
  }

  #[tokio::test]
  async fn analysis_with_stub_is_idempotent() {
    let (state, _) = app(Arc::new(StubStep));
    let a = run_content_analysis(&state, TEXT, AnalysisType::Summary).await.unwrap();
    let b = run_content_analysis(&state, TEXT, AnalysisType::Summary).await.unwrap();
    assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
  }

  #[tokio::test]
  async fn concurrent_runs_do_not_share_state() {
    let (state, _) = app(Arc::new(DownStep));
    let s1 = state.clone();
    let s2 = state.clone();
    let (a, b) = tokio::join!(
      run_content_analysis(&s1, "Alpha alpha alpha. Alpha again.", AnalysisType::Summary),
      run_content_analysis(&s2, "Omega omega omega. Omega again.", AnalysisType::Summary),
    );
    let a = a.unwrap();
    let b = b.unwrap();
    // Fallback summaries derive from each run's own input text.
    assert!(a.summary.contains("Alpha"));
    assert!(b.summary.contains("Omega"));
    assert!(!a.summary.contains("Omega"));
    assert!(!b.summary.contains("Alpha"));
  }

  #[tokio::test]
  async fn generated_quiz_can_be_scored_end_to_end() {
    let (state, sink) = app(Arc::new(StubStep));
    let ctx = QuizContext { subject: Some("Biology".into()), ..QuizContext::default() };
    let bundle = run_quiz_generation(&state, TEXT, 4, ctx).await;

    let answers: Vec<SubmittedAnswer> = bundle
      .questions
      .iter()
      .map(|q| SubmittedAnswer {
        question_id: q.id.clone(),
        answer: q.question.correct_answer.clone(),
        subject: Some(bundle.subject.clone()),
      })
      .collect();
    let report = score_assessment(&state, "learner-1", &answers).await.unwrap();
    assert_eq!(report.overall_score, 100);
    assert_eq!(report.subject_scores["Biology"], 100);
    assert_eq!(report.strong_subjects, vec!["Biology"]);
    assert_eq!(sink.assessment_count().await, 1);
    assert_eq!(sink.assessments_for("learner-1").await[0].subject, "Biology");
  }

  #[tokio::test]
  async fn sink_failure_propagates_to_caller() {
    let state = AppState::with_parts(Arc::new(StubStep), Prompts::default(), Arc::new(BrokenSink));
    let err = score_assessment(&state, "learner-1", &[]).await.unwrap_err();
    assert!(matches!(err, SinkError::Write(_)));
    let err = run_content_analysis(&state, TEXT, AnalysisType::Summary).await.unwrap_err();
    assert!(matches!(err, SinkError::Write(_)));
  }

  fn report_for(correct: usize) -> AssessmentScoreReport {
    let mut key = AnswerKey::new();
    for i in 0..10 {
      key.insert(format!("q-{i}"), "Math", "A");
    }
    let answers: Vec<SubmittedAnswer> = (0..10)
      .map(|i| SubmittedAnswer {
        question_id: format!("q-{i}"),
        answer: if i < correct { "A".into() } else { "B".into() },
        subject: None,
      })
      .collect();
    scoring::score(&key, &answers)
  }

  #[test]
  fn empty_report_record_is_labeled_none() {
    let report = scoring::score(&AnswerKey::new(), &[]);
    let record = build_assessment_record("u1", &report);
    assert_eq!(record.subject, "none");
    assert_eq!(record.score, 0);
    assert!(record.metadata.learning_path.is_empty());
  }

  #[test]
  fn record_carries_single_subject_name() {
    let record = build_assessment_record("u1", &report_for(7));
    assert_eq!(record.subject, "Math");
    assert_eq!(record.score, 70);
    assert_eq!(record.total_questions, 10);
    assert_eq!(record.correct_answers, 7);
    assert!(record.metadata.personalized_content.is_none());
  }

  #[test]
  fn weak_subject_yields_targeted_recommendation() {
    let record = build_assessment_record("u1", &report_for(3));
    assert_eq!(record.weak_areas, vec!["Math"]);
    assert!(record.recommendations[0].contains("Math"));
  }

  #[test]
  fn clean_report_yields_generic_recommendation() {
    let record = build_assessment_record("u1", &report_for(9));
    assert!(record.weak_areas.is_empty());
    assert_eq!(record.recommendations.len(), 1);
  }
}
