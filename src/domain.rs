//! Domain models: pipeline state, quiz questions, analysis results, and the
//! persisted assessment record.

use serde::{Deserialize, Serialize};

/// How demanding the material (or a question) is for a learner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  Beginner,
  Intermediate,
  Advanced,
}
impl Default for Difficulty {
  fn default() -> Self { Difficulty::Intermediate }
}

impl Difficulty {
  /// Lenient parse used on generative output (`"Advanced"`, `"advanced"`, ...).
  pub fn parse_loose(s: &str) -> Option<Self> {
    match s.trim().to_lowercase().as_str() {
      "beginner" | "easy" => Some(Difficulty::Beginner),
      "intermediate" | "medium" => Some(Difficulty::Intermediate),
      "advanced" | "hard" => Some(Difficulty::Advanced),
      _ => None,
    }
  }
}

/// How much a piece of content teaches, as judged by the analysis pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EducationalValue {
  High,
  Medium,
  Low,
}

impl EducationalValue {
  pub fn parse_loose(s: &str) -> Option<Self> {
    match s.trim().to_lowercase().as_str() {
      "high" => Some(EducationalValue::High),
      "medium" | "moderate" => Some(EducationalValue::Medium),
      "low" => Some(EducationalValue::Low),
      _ => None,
    }
  }
}

/// A four-option multiple-choice question.
/// Invariant: exactly 4 options and `correct_answer` is one of "A".."D".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
  pub question: String,
  pub options: Vec<String>,
  #[serde(rename = "correctAnswer")]
  pub correct_answer: String,
  pub topic: String,
  #[serde(default)]
  pub difficulty: Option<Difficulty>,
}

impl Question {
  /// Structural validity check applied to every question regardless of
  /// whether it came from the model or a fallback.
  pub fn is_valid(&self) -> bool {
    !self.question.trim().is_empty()
      && self.options.len() == 4
      && self.options.iter().all(|o| !o.trim().is_empty())
      && matches!(self.correct_answer.as_str(), "A" | "B" | "C" | "D")
  }
}

/// Optional caller-supplied context for quiz generation; everything here is
/// advisory and only shapes the prompts (and fallback difficulty).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct QuizContext {
  #[serde(default)]
  pub subject: Option<String>,
  #[serde(default, rename = "gradeLevel")]
  pub grade_level: Option<String>,
  #[serde(default)]
  pub difficulty: Option<Difficulty>,
  #[serde(default, rename = "learningObjectives")]
  pub learning_objectives: Vec<String>,
  /// Topics the caller already knows it wants covered; these pre-seed topic
  /// extraction and its fallback.
  #[serde(default, rename = "keyTopics")]
  pub key_topics: Vec<String>,
  #[serde(default)]
  pub language: Option<String>,
}

impl QuizContext {
  /// Render the context as a prompt fragment, or an empty string when the
  /// caller supplied nothing.
  pub fn prompt_fragment(&self) -> String {
    let mut parts: Vec<String> = vec![];
    if let Some(s) = &self.subject {
      parts.push(format!("Subject: {}", s));
    }
    if let Some(g) = &self.grade_level {
      parts.push(format!("Grade level: {}", g));
    }
    if let Some(d) = &self.difficulty {
      parts.push(format!("Difficulty: {:?}", d));
    }
    if !self.learning_objectives.is_empty() {
      parts.push(format!("Learning objectives: {}", self.learning_objectives.join("; ")));
    }
    if !self.key_topics.is_empty() {
      parts.push(format!("Prefer these topics: {}", self.key_topics.join(", ")));
    }
    if let Some(l) = &self.language {
      parts.push(format!("Language: {}", l));
    }
    if parts.is_empty() {
      String::new()
    } else {
      format!("\nContext: {}.", parts.join(". "))
    }
  }
}

/// How deep the content-analysis prompts should go. The stage order never
/// changes; this only adjusts prompt wording.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
  Summary,
  Detailed,
  Educational,
}

impl AnalysisType {
  pub fn as_str(self) -> &'static str {
    match self {
      AnalysisType::Summary => "summary",
      AnalysisType::Detailed => "detailed",
      AnalysisType::Educational => "educational",
    }
  }

  pub fn depth_hint(self) -> &'static str {
    match self {
      AnalysisType::Summary => "a brief overview",
      AnalysisType::Detailed => "a thorough, detail-oriented reading",
      AnalysisType::Educational => "a focus on what a learner should take away",
    }
  }
}

/// The accumulating record of inputs and stage outputs threaded through one
/// pipeline run. Created fresh per invocation, never shared across runs.
///
/// Later stages only add fields or read existing ones; a field set by a stage
/// is never cleared afterwards.
#[derive(Clone, Debug, Default)]
pub struct PipelineState {
  pub input_text: String,
  pub requested_count: usize,

  pub topics: Option<Vec<String>>,
  pub questions: Option<Vec<Question>>,
  pub summary: Option<String>,
  pub key_points: Option<Vec<String>>,
  pub educational_value: Option<EducationalValue>,
  pub difficulty: Option<Difficulty>,

  /// One line per executed stage, for observability only.
  pub trace: Vec<String>,
}

impl PipelineState {
  pub fn new(input_text: impl Into<String>, requested_count: usize) -> Self {
    Self {
      input_text: input_text.into(),
      requested_count,
      ..Self::default()
    }
  }
}

/// Output of the content-analysis pipeline. Always structurally complete:
/// a caller cannot tell a fully generated result from a fully degraded one.
#[derive(Clone, Debug, Serialize)]
pub struct ContentAnalysis {
  pub summary: String,
  #[serde(rename = "keyPoints")]
  pub key_points: Vec<String>,
  #[serde(rename = "educationalValue")]
  pub educational_value: EducationalValue,
  pub difficulty: Difficulty,
}

/// A generated quiz question together with its registry id, so a later
/// assessment submission can be scored against it.
#[derive(Clone, Debug, Serialize)]
pub struct QuizQuestionOut {
  pub id: String,
  #[serde(flatten)]
  pub question: Question,
}

/// Output of the quiz-generation pipeline. The requested/returned pair makes
/// count clamping visible to the caller instead of silently shrinking an
/// oversized request.
#[derive(Clone, Debug, Serialize)]
pub struct QuizBundle {
  pub questions: Vec<QuizQuestionOut>,
  pub topics: Vec<String>,
  pub subject: String,
  #[serde(rename = "requestedCount")]
  pub requested_count: usize,
  #[serde(rename = "returnedCount")]
  pub returned_count: usize,
}

/// Daily effort recommendation derived from a scored assessment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyPlan {
  #[serde(rename = "dailyMinutes")]
  pub daily_minutes: u32,
  /// Weakest subjects first, at most two.
  #[serde(rename = "prioritySubjects")]
  pub priority_subjects: Vec<String>,
}

/// Persisted record of one submitted assessment. Created once per
/// submission; never mutated afterwards (a resubmission creates a new row).
#[derive(Clone, Debug, Serialize)]
pub struct AssessmentResult {
  pub id: String,
  #[serde(rename = "userId")]
  pub user_id: String,
  pub subject: String,
  /// Overall percentage, 0-100.
  pub score: u32,
  #[serde(rename = "totalQuestions")]
  pub total_questions: usize,
  #[serde(rename = "correctAnswers")]
  pub correct_answers: usize,
  #[serde(rename = "weakAreas")]
  pub weak_areas: Vec<String>,
  pub recommendations: Vec<String>,
  #[serde(rename = "assessmentType")]
  pub assessment_type: String,
  pub metadata: AssessmentMetadata,
}

#[derive(Clone, Debug, Serialize)]
pub struct AssessmentMetadata {
  /// Per-subject percentages; subjects never attempted are absent, not zero.
  #[serde(rename = "subjectScores")]
  pub subject_scores: std::collections::BTreeMap<String, u32>,
  #[serde(rename = "studyPlan")]
  pub study_plan: StudyPlan,
  /// Not yet computed by the platform. Kept as an explicit None rather than
  /// filled with placeholder data.
  #[serde(rename = "personalizedContent")]
  pub personalized_content: Option<serde_json::Value>,
  /// Subjects in recommended study order: weakest first, then the rest.
  #[serde(rename = "learningPath")]
  pub learning_path: Vec<String>,
}

/// Persisted record of one content-analysis run.
#[derive(Clone, Debug, Serialize)]
pub struct ContentAnalysisRecord {
  pub id: String,
  #[serde(rename = "analysisType")]
  pub analysis_type: String,
  #[serde(rename = "inputChars")]
  pub input_chars: usize,
  pub result: ContentAnalysis,
}
