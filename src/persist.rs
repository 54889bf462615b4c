//! Persistence seam. The pipeline's job ends at producing the final state;
//! whatever stores it lives behind [`PersistenceSink`], and a write failure
//! propagates to the caller untouched (no retries here).

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::domain::{AssessmentResult, ContentAnalysisRecord};

#[derive(Debug, Error)]
pub enum SinkError {
  #[error("storage write failed: {0}")]
  Write(String),
}

#[async_trait]
pub trait PersistenceSink: Send + Sync {
  /// Durably record one scored assessment. One row per submission; rows are
  /// never updated.
  async fn save_assessment(&self, record: AssessmentResult) -> Result<(), SinkError>;

  async fn save_analysis(&self, record: ContentAnalysisRecord) -> Result<(), SinkError>;
}

/// In-memory sink used in this deployment (a real database is out of scope).
/// Rows live behind an RwLock so concurrent runs append independently.
#[derive(Default)]
pub struct MemorySink {
  assessments: RwLock<Vec<AssessmentResult>>,
  analyses: RwLock<Vec<ContentAnalysisRecord>>,
}

impl MemorySink {
  pub fn new() -> Self {
    Self::default()
  }

  #[allow(dead_code)]
  pub async fn assessments_for(&self, user_id: &str) -> Vec<AssessmentResult> {
    self
      .assessments
      .read()
      .await
      .iter()
      .filter(|r| r.user_id == user_id)
      .cloned()
      .collect()
  }

  #[allow(dead_code)]
  pub async fn assessment_count(&self) -> usize {
    self.assessments.read().await.len()
  }

  #[allow(dead_code)]
  pub async fn analysis_count(&self) -> usize {
    self.analyses.read().await.len()
  }
}

#[async_trait]
impl PersistenceSink for MemorySink {
  #[instrument(level = "debug", skip(self, record), fields(id = %record.id, user = %record.user_id))]
  async fn save_assessment(&self, record: AssessmentResult) -> Result<(), SinkError> {
    self.assessments.write().await.push(record);
    debug!(target: "assess", "Assessment row stored");
    Ok(())
  }

  #[instrument(level = "debug", skip(self, record), fields(id = %record.id))]
  async fn save_analysis(&self, record: ContentAnalysisRecord) -> Result<(), SinkError> {
    self.analyses.write().await.push(record);
    Ok(())
  }
}
