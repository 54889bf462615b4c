//! Deterministic assessment scoring: per-subject percentages, weak/strong
//! classification, and the derived study plan. No AI dependency anywhere in
//! this module.
//!
//! Thresholds: a subject is weak when its score is strictly below 60 and
//! strong when it is 80 or above; [60, 80) is neither.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::StudyPlan;

pub const WEAK_THRESHOLD: u32 = 60;
pub const STRONG_THRESHOLD: u32 = 80;

/// Canonical answer and subject for one question id. The key's provenance is
/// external to this module; scoring only consumes it.
#[derive(Clone, Debug)]
pub struct AnswerKeyEntry {
  pub subject: String,
  pub correct_answer: String,
}

/// Fixed mapping from question id to its subject and canonical answer.
#[derive(Clone, Debug, Default)]
pub struct AnswerKey {
  entries: HashMap<String, AnswerKeyEntry>,
}

impl AnswerKey {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, question_id: impl Into<String>, subject: impl Into<String>, correct_answer: impl Into<String>) {
    self.entries.insert(
      question_id.into(),
      AnswerKeyEntry { subject: subject.into(), correct_answer: correct_answer.into() },
    );
  }

  pub fn get(&self, question_id: &str) -> Option<&AnswerKeyEntry> {
    self.entries.get(question_id)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[allow(dead_code)]
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// One answer as submitted by a learner. The subject is advisory; the answer
/// key's subject wins when they disagree.
#[derive(Clone, Debug, Deserialize)]
pub struct SubmittedAnswer {
  #[serde(rename = "questionId")]
  pub question_id: String,
  pub answer: String,
  #[serde(default)]
  pub subject: Option<String>,
}

/// Full scoring output for one submitted assessment.
#[derive(Clone, Debug, Serialize)]
pub struct AssessmentScoreReport {
  /// Arithmetic mean of the attempted subjects' scores, 0 when none.
  #[serde(rename = "overallScore")]
  pub overall_score: u32,
  /// Subjects with at least one attempt; never-attempted subjects are
  /// absent, not zero.
  #[serde(rename = "subjectScores")]
  pub subject_scores: BTreeMap<String, u32>,
  /// Weak subjects (< 60), weakest first.
  #[serde(rename = "weakSubjects")]
  pub weak_subjects: Vec<String>,
  /// Strong subjects (>= 80), strongest first.
  #[serde(rename = "strongSubjects")]
  pub strong_subjects: Vec<String>,
  #[serde(rename = "totalQuestions")]
  pub total_questions: usize,
  #[serde(rename = "correctAnswers")]
  pub correct_answers: usize,
  #[serde(rename = "studyPlan")]
  pub study_plan: StudyPlan,
}

/// Score a batch of submitted answers against the answer key.
///
/// Unknown question ids are silently excluded rather than failing the whole
/// batch; client submissions are routinely partial or stale.
#[instrument(level = "info", skip(key, answers), fields(answers = answers.len(), key_size = key.len()))]
pub fn score(key: &AnswerKey, answers: &[SubmittedAnswer]) -> AssessmentScoreReport {
  let mut attempted: BTreeMap<String, (usize, usize)> = BTreeMap::new(); // subject -> (attempted, correct)
  let mut total_questions = 0usize;
  let mut correct_answers = 0usize;

  for a in answers {
    let Some(entry) = key.get(&a.question_id) else {
      debug!(target: "assess", question_id = %a.question_id, "Unknown question id; excluded from scoring");
      continue;
    };
    let bucket = attempted.entry(entry.subject.clone()).or_insert((0, 0));
    bucket.0 += 1;
    total_questions += 1;
    if a.answer.trim().eq_ignore_ascii_case(&entry.correct_answer) {
      bucket.1 += 1;
      correct_answers += 1;
    }
  }

  let subject_scores: BTreeMap<String, u32> = attempted
    .iter()
    .map(|(subject, (att, corr))| (subject.clone(), percentage(*corr, *att)))
    .collect();

  let overall_score = if subject_scores.is_empty() {
    0
  } else {
    let sum: u32 = subject_scores.values().sum();
    ((sum as f64) / (subject_scores.len() as f64)).round() as u32
  };

  let mut weak_subjects: Vec<String> = subject_scores
    .iter()
    .filter(|(_, s)| **s < WEAK_THRESHOLD)
    .map(|(subject, _)| subject.clone())
    .collect();
  weak_subjects.sort_by_key(|s| subject_scores[s]);

  let mut strong_subjects: Vec<String> = subject_scores
    .iter()
    .filter(|(_, s)| **s >= STRONG_THRESHOLD)
    .map(|(subject, _)| subject.clone())
    .collect();
  strong_subjects.sort_by_key(|s| std::cmp::Reverse(subject_scores[s]));

  let study_plan = derive_study_plan(&weak_subjects);

  AssessmentScoreReport {
    overall_score,
    subject_scores,
    weak_subjects,
    strong_subjects,
    total_questions,
    correct_answers,
    study_plan,
  }
}

fn percentage(correct: usize, attempted: usize) -> u32 {
  if attempted == 0 {
    return 0;
  }
  ((correct as f64) / (attempted as f64) * 100.0).round() as u32
}

/// Daily minutes: 60 when three or more subjects are weak, otherwise 45.
/// Priority subjects: the (up to) two weakest, ascending by score.
fn derive_study_plan(weak_ascending: &[String]) -> StudyPlan {
  let daily_minutes = if weak_ascending.len() >= 3 { 60 } else { 45 };
  StudyPlan {
    daily_minutes,
    priority_subjects: weak_ascending.iter().take(2).cloned().collect(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn key() -> AnswerKey {
    let mut k = AnswerKey::new();
    for i in 0..10 {
      k.insert(format!("math-{i}"), "Math", "A");
    }
    for i in 0..5 {
      k.insert(format!("hist-{i}"), "History", "B");
    }
    for i in 0..4 {
      k.insert(format!("sci-{i}"), "Science", "C");
    }
    k
  }

  fn answers(subject: &str, prefix: &str, n: usize, correct: usize, right: &str) -> Vec<SubmittedAnswer> {
    (0..n)
      .map(|i| SubmittedAnswer {
        question_id: format!("{prefix}-{i}"),
        answer: if i < correct { right.into() } else { "D".into() },
        subject: Some(subject.into()),
      })
      .collect()
  }

  #[test]
  fn empty_submission_scores_zero_with_empty_lists() {
    let report = score(&key(), &[]);
    assert_eq!(report.overall_score, 0);
    assert!(report.subject_scores.is_empty());
    assert!(report.weak_subjects.is_empty());
    assert!(report.strong_subjects.is_empty());
    assert_eq!(report.study_plan.daily_minutes, 45);
    assert!(report.study_plan.priority_subjects.is_empty());
  }

  #[test]
  fn seven_of_ten_is_seventy_and_neither_weak_nor_strong() {
    let report = score(&key(), &answers("Math", "math", 10, 7, "A"));
    assert_eq!(report.subject_scores["Math"], 70);
    assert_eq!(report.overall_score, 70);
    assert!(report.weak_subjects.is_empty());
    assert!(report.strong_subjects.is_empty());
  }

  #[test]
  fn sixty_is_not_weak_and_eighty_is_strong() {
    // Math: 6/10 = 60, History: 4/5 = 80.
    let mut subs = answers("Math", "math", 10, 6, "A");
    subs.extend(answers("History", "hist", 5, 4, "B"));
    let report = score(&key(), &subs);
    assert_eq!(report.subject_scores["Math"], 60);
    assert_eq!(report.subject_scores["History"], 80);
    assert!(report.weak_subjects.is_empty());
    assert_eq!(report.strong_subjects, vec!["History"]);
  }

  #[test]
  fn unattempted_subjects_are_absent_not_zero() {
    let report = score(&key(), &answers("Math", "math", 10, 5, "A"));
    assert!(report.subject_scores.contains_key("Math"));
    assert!(!report.subject_scores.contains_key("History"));
    assert!(!report.subject_scores.contains_key("Science"));
    // Overall is the mean over attempted subjects only.
    assert_eq!(report.overall_score, 50);
  }

  #[test]
  fn unknown_question_ids_are_silently_excluded() {
    let mut subs = answers("Math", "math", 4, 4, "A");
    subs.push(SubmittedAnswer {
      question_id: "bogus-99".into(),
      answer: "A".into(),
      subject: Some("Math".into()),
    });
    let report = score(&key(), &subs);
    assert_eq!(report.total_questions, 4);
    assert_eq!(report.subject_scores["Math"], 100);
  }

  #[test]
  fn rounding_uses_nearest_integer() {
    // 1/3 = 33.33 -> 33; 2/3 = 66.67 -> 67.
    let mut k = AnswerKey::new();
    for i in 0..3 {
      k.insert(format!("a-{i}"), "A", "A");
      k.insert(format!("b-{i}"), "B", "A");
    }
    let mut subs = answers("A", "a", 3, 1, "A");
    subs.extend(answers("B", "b", 3, 2, "A"));
    let report = score(&k, &subs);
    assert_eq!(report.subject_scores["A"], 33);
    assert_eq!(report.subject_scores["B"], 67);
    assert_eq!(report.overall_score, 50);
  }

  #[test]
  fn study_plan_scales_with_weak_subject_count() {
    // Three weak subjects -> 60 minutes, two priorities, weakest first.
    let mut k = AnswerKey::new();
    for (subj, prefix) in [("Math", "m"), ("History", "h"), ("Science", "s")] {
      for i in 0..10 {
        k.insert(format!("{prefix}-{i}"), subj, "A");
      }
    }
    let mut subs = answers("Math", "m", 10, 1, "A"); // 10
    subs.extend(answers("History", "h", 10, 3, "A")); // 30
    subs.extend(answers("Science", "s", 10, 5, "A")); // 50
    let report = score(&k, &subs);
    assert_eq!(report.weak_subjects, vec!["Math", "History", "Science"]);
    assert_eq!(report.study_plan.daily_minutes, 60);
    assert_eq!(report.study_plan.priority_subjects, vec!["Math", "History"]);
  }

  #[test]
  fn answer_comparison_ignores_case_and_whitespace() {
    let mut k = AnswerKey::new();
    k.insert("q1", "Math", "A");
    let subs = vec![SubmittedAnswer {
      question_id: "q1".into(),
      answer: " a ".into(),
      subject: None,
    }];
    let report = score(&k, &subs);
    assert_eq!(report.correct_answers, 1);
  }
}
