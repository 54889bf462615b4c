//! Public request/response structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and clients independently.

use serde::{Deserialize, Serialize};

use crate::domain::{AnalysisType, ContentAnalysis, QuizBundle, QuizContext};
use crate::scoring::{AssessmentScoreReport, SubmittedAnswer};

#[derive(Debug, Deserialize)]
pub struct QuizIn {
    pub text: String,
    #[serde(rename = "questionCount")]
    pub question_count: usize,
    #[serde(default)]
    pub context: Option<QuizContext>,
}

#[derive(Serialize)]
pub struct QuizOut {
    #[serde(flatten)]
    pub bundle: QuizBundle,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeIn {
    pub text: String,
    #[serde(rename = "analysisType")]
    pub analysis_type: AnalysisType,
}

#[derive(Serialize)]
pub struct AnalyzeOut {
    #[serde(flatten)]
    pub analysis: ContentAnalysis,
}

#[derive(Debug, Deserialize)]
pub struct ScoreIn {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub answers: Vec<SubmittedAnswer>,
}

#[derive(Serialize)]
pub struct ScoreOut {
    #[serde(flatten)]
    pub report: AssessmentScoreReport,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
