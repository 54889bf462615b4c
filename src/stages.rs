//! Concrete pipeline stages and the two fixed pipelines built from them.
//!
//! Quiz generation:  ExtractTopics → GenerateQuestions
//! Content analysis: Summarize → ExtractKeyPoints → AssessEducationalValue
//!
//! Every fallback here is fixed, deterministic data derived from the input
//! text or canned banks. No randomness: two runs on the same input with the
//! stub backend are byte-identical.

use crate::backend::{PromptSpec, StageKind};
use crate::config::Prompts;
use crate::domain::{
  AnalysisType, Difficulty, EducationalValue, PipelineState, Question, QuizContext,
};
use crate::pipeline::{require_string, require_string_list, Pipeline, Stage};
use crate::sanitize::ParseFailure;
use crate::util::{fill_template, split_sentences};

/// Fixed order for the quiz-generation pipeline.
pub fn quiz_pipeline(ctx: QuizContext) -> Pipeline {
  Pipeline::new(vec![
    Box::new(ExtractTopics { ctx: ctx.clone() }),
    Box::new(GenerateQuestions { ctx }),
  ])
}

/// Fixed order for the content-analysis pipeline.
pub fn analysis_pipeline(analysis_type: AnalysisType) -> Pipeline {
  Pipeline::new(vec![
    Box::new(Summarize { analysis_type }),
    Box::new(ExtractKeyPoints { analysis_type }),
    Box::new(AssessEducationalValue),
  ])
}

// --- ExtractTopics ---

const FALLBACK_TOPIC_BANK: &[&str] = &[
  "Main Ideas",
  "Key Terms",
  "Important Details",
  "Concept Review",
  "Practice and Application",
];

pub struct ExtractTopics {
  pub ctx: QuizContext,
}

impl Stage for ExtractTopics {
  fn name(&self) -> &'static str { "extract_topics" }

  fn prompt(&self, prompts: &Prompts, state: &PipelineState) -> PromptSpec {
    let count = state.requested_count.to_string();
    PromptSpec {
      kind: StageKind::ExtractTopics,
      system: prompts.topics_system.clone(),
      user: fill_template(
        &prompts.topics_user_template,
        &[
          ("count", &count),
          ("context", &self.ctx.prompt_fragment()),
          ("text", &state.input_text),
        ],
      ),
      count: state.requested_count,
      topics: self.ctx.key_topics.clone(),
    }
  }

  fn merge(&self, state: &mut PipelineState, value: serde_json::Value)
    -> Result<String, ParseFailure>
  {
    let generated = require_string_list(&value, "topics")?;
    // Caller-provided key topics come first; generated ones fill the rest.
    let mut topics = self.ctx.key_topics.clone();
    for t in generated {
      if !topics.contains(&t) {
        topics.push(t);
      }
    }
    topics.truncate(state.requested_count.max(1));
    let n = topics.len();
    state.topics = Some(topics);
    Ok(format!("{} topics", n))
  }

  fn fallback(&self, state: &mut PipelineState) -> String {
    let topics = fallback_topics(&self.ctx, &state.input_text, state.requested_count.max(1));
    let n = topics.len();
    state.topics = Some(topics);
    format!("{} topics", n)
  }
}

/// Deterministic topic substitutes: caller key topics first, then distinct
/// longer words from the input, then the canned bank.
fn fallback_topics(ctx: &QuizContext, input: &str, count: usize) -> Vec<String> {
  let mut topics: Vec<String> = ctx.key_topics.clone();

  for word in input.split_whitespace() {
    if topics.len() >= count {
      break;
    }
    let cleaned: String = word.chars().filter(|c| c.is_alphabetic()).collect();
    if cleaned.chars().count() < 5 {
      continue;
    }
    let titled = title_case(&cleaned);
    if !topics.contains(&titled) {
      topics.push(titled);
    }
  }

  let mut bank = FALLBACK_TOPIC_BANK.iter();
  while topics.len() < count {
    match bank.next() {
      Some(t) if !topics.contains(&(*t).to_string()) => topics.push((*t).to_string()),
      Some(_) => {}
      None => topics.push(format!("Topic {}", topics.len() + 1)),
    }
  }
  topics.truncate(count);
  topics
}

fn title_case(word: &str) -> String {
  let mut chars = word.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
    None => String::new(),
  }
}

// --- GenerateQuestions ---

pub struct GenerateQuestions {
  pub ctx: QuizContext,
}

impl Stage for GenerateQuestions {
  fn name(&self) -> &'static str { "generate_questions" }

  fn prompt(&self, prompts: &Prompts, state: &PipelineState) -> PromptSpec {
    let topics = state.topics.clone().unwrap_or_default();
    let count = state.requested_count.to_string();
    PromptSpec {
      kind: StageKind::GenerateQuestions,
      system: prompts.questions_system.clone(),
      user: fill_template(
        &prompts.questions_user_template,
        &[
          ("count", &count),
          ("topics", &topics.join(", ")),
          ("context", &self.ctx.prompt_fragment()),
          ("text", &state.input_text),
        ],
      ),
      count: state.requested_count,
      topics,
    }
  }

  fn merge(&self, state: &mut PipelineState, value: serde_json::Value)
    -> Result<String, ParseFailure>
  {
    // Accept either {"questions": [...]} or a bare top-level array.
    let items = value
      .get("questions")
      .and_then(|v| v.as_array())
      .or_else(|| value.as_array())
      .ok_or_else(|| ParseFailure::WrongShape("missing 'questions' array".into()))?;

    let mut kept: Vec<Question> = items
      .iter()
      .filter_map(|v| serde_json::from_value::<Question>(v.clone()).ok())
      .filter(Question::is_valid)
      .collect();
    if kept.is_empty() {
      return Err(ParseFailure::WrongShape("no structurally valid questions".into()));
    }

    // Exactly requested_count questions, always: truncate extras, pad
    // shortfalls with deterministic substitutes.
    let want = state.requested_count.max(1);
    let generated = kept.len().min(want);
    kept.truncate(want);
    let topics = state.topics.clone().unwrap_or_default();
    let mut i = kept.len();
    while kept.len() < want {
      let topic = cycle(&topics, i);
      kept.push(fallback_question(&topic, self.ctx.difficulty));
      i += 1;
    }
    let padded = kept.len() - generated;

    state.questions = Some(kept);
    if padded == 0 {
      Ok(format!("{} questions", generated))
    } else {
      Ok(format!("{} questions ({} padded)", generated + padded, padded))
    }
  }

  fn fallback(&self, state: &mut PipelineState) -> String {
    let want = state.requested_count.max(1);
    let topics = state.topics.clone().unwrap_or_default();
    let questions: Vec<Question> = (0..want)
      .map(|i| fallback_question(&cycle(&topics, i), self.ctx.difficulty))
      .collect();
    state.questions = Some(questions);
    format!("{} questions", want)
  }
}

fn cycle(topics: &[String], i: usize) -> String {
  if topics.is_empty() {
    FALLBACK_TOPIC_BANK[i % FALLBACK_TOPIC_BANK.len()].to_string()
  } else {
    topics[i % topics.len()].clone()
  }
}

/// Hand-authored, always-valid question keyed to a topic.
fn fallback_question(topic: &str, difficulty: Option<Difficulty>) -> Question {
  Question {
    question: format!("Which of the following best relates to \"{}\"?", topic),
    options: vec![
      format!("A statement about {} drawn from the material", topic),
      "An idea the material argues against".to_string(),
      "A detail from an unrelated subject".to_string(),
      "None of the above".to_string(),
    ],
    correct_answer: "A".to_string(),
    topic: topic.to_string(),
    difficulty: Some(difficulty.unwrap_or_default()),
  }
}

// --- Summarize ---

pub struct Summarize {
  pub analysis_type: AnalysisType,
}

impl Stage for Summarize {
  fn name(&self) -> &'static str { "summarize" }

  fn prompt(&self, prompts: &Prompts, state: &PipelineState) -> PromptSpec {
    PromptSpec {
      kind: StageKind::Summarize,
      system: prompts.summary_system.clone(),
      user: fill_template(
        &prompts.summary_user_template,
        &[("depth", self.analysis_type.depth_hint()), ("text", &state.input_text)],
      ),
      count: 0,
      topics: vec![],
    }
  }

  fn merge(&self, state: &mut PipelineState, value: serde_json::Value)
    -> Result<String, ParseFailure>
  {
    let summary = require_string(&value, "summary")?;
    state.summary = Some(summary);
    Ok("summary merged".into())
  }

  fn fallback(&self, state: &mut PipelineState) -> String {
    let sentences = split_sentences(&state.input_text);
    let summary = if sentences.is_empty() {
      "No summary could be derived from the provided text.".to_string()
    } else {
      let take = sentences.len().min(2);
      format!("{}.", sentences[..take].join(". "))
    };
    state.summary = Some(summary);
    "summary from input excerpt".into()
  }
}

// --- ExtractKeyPoints ---

pub struct ExtractKeyPoints {
  pub analysis_type: AnalysisType,
}

impl Stage for ExtractKeyPoints {
  fn name(&self) -> &'static str { "extract_key_points" }

  fn prompt(&self, prompts: &Prompts, state: &PipelineState) -> PromptSpec {
    PromptSpec {
      kind: StageKind::ExtractKeyPoints,
      system: prompts.key_points_system.clone(),
      user: fill_template(
        &prompts.key_points_user_template,
        &[("depth", self.analysis_type.depth_hint()), ("text", &state.input_text)],
      ),
      count: 0,
      topics: vec![],
    }
  }

  fn merge(&self, state: &mut PipelineState, value: serde_json::Value)
    -> Result<String, ParseFailure>
  {
    let mut points = require_string_list(&value, "keyPoints")?;
    points.truncate(5);
    let n = points.len();
    state.key_points = Some(points);
    Ok(format!("{} key points", n))
  }

  fn fallback(&self, state: &mut PipelineState) -> String {
    let sentences = split_sentences(&state.input_text);
    let points = if sentences.is_empty() {
      vec!["The provided text was too short to extract key points.".to_string()]
    } else {
      sentences.into_iter().take(3).collect()
    };
    let n = points.len();
    state.key_points = Some(points);
    format!("{} key points from input excerpt", n)
  }
}

// --- AssessEducationalValue ---

pub struct AssessEducationalValue;

impl Stage for AssessEducationalValue {
  fn name(&self) -> &'static str { "assess_educational_value" }

  fn prompt(&self, prompts: &Prompts, state: &PipelineState) -> PromptSpec {
    PromptSpec {
      kind: StageKind::AssessEducationalValue,
      system: prompts.assess_system.clone(),
      user: fill_template(&prompts.assess_user_template, &[("text", &state.input_text)]),
      count: 0,
      topics: vec![],
    }
  }

  fn merge(&self, state: &mut PipelineState, value: serde_json::Value)
    -> Result<String, ParseFailure>
  {
    // Parse both before assigning either; merge is all-or-nothing.
    let ev = require_string(&value, "educationalValue")
      .ok()
      .and_then(|s| EducationalValue::parse_loose(&s))
      .ok_or_else(|| ParseFailure::WrongShape("bad 'educationalValue'".into()))?;
    let diff = require_string(&value, "difficulty")
      .ok()
      .and_then(|s| Difficulty::parse_loose(&s))
      .ok_or_else(|| ParseFailure::WrongShape("bad 'difficulty'".into()))?;
    state.educational_value = Some(ev);
    state.difficulty = Some(diff);
    Ok(format!("{:?}/{:?}", ev, diff))
  }

  fn fallback(&self, state: &mut PipelineState) -> String {
    state.educational_value = Some(EducationalValue::Medium);
    state.difficulty = Some(Difficulty::Intermediate);
    "medium/intermediate defaults".into()
  }
}
