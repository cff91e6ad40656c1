//! deploy.job: One end-to-end run of the deployment pipeline.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;

const JOB_ID_LEN: usize = 8;
const JOB_ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Short random token namespacing a job's workspace, image, container and
/// storage prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Draw a fresh id: 8 characters from `[a-z0-9]`.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let id = (0..JOB_ID_LEN)
            .map(|_| JOB_ID_CHARSET[rng.random_range(0..JOB_ID_CHARSET.len())] as char)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pipeline state of a deployment job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Cloning,
    Building,
    ExtractingArtifacts,
    Uploading,
    CleaningUp,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Cloning => "cloning",
            Self::Building => "building",
            Self::ExtractingArtifacts => "extracting_artifacts",
            Self::Uploading => "uploading",
            Self::CleaningUp => "cleaning_up",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Whether the pipeline may move from `self` to `next`.
    ///
    /// Stages advance strictly in order; any non-terminal state may jump to
    /// `CleaningUp`, and only `CleaningUp` reaches a terminal state.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Created, Cloning)
            | (Cloning, Building)
            | (Building, ExtractingArtifacts)
            | (ExtractingArtifacts, Uploading)
            | (CleaningUp, Succeeded)
            | (CleaningUp, Failed) => true,
            (from, CleaningUp) => !from.is_terminal() && from != CleaningUp,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral record of a single deployment, alive for one request.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentJob {
    pub id: JobId,
    pub source_url: String,
    pub workspace_path: PathBuf,
    pub artifact_path: PathBuf,
    pub state: JobState,
    pub result_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DeploymentJob {
    pub fn new(id: JobId, source_url: impl Into<String>, output_root: &Path) -> Self {
        let workspace_path = output_root.join(id.as_str());
        let artifact_path = workspace_path.join("dist");
        Self {
            id,
            source_url: source_url.into(),
            workspace_path,
            artifact_path,
            state: JobState::Created,
            result_url: None,
            created_at: Utc::now(),
        }
    }

    /// Move to `next`, recording the transition.
    pub fn transition(&mut self, next: JobState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal job transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(job_id = %self.id, from = %self.state, to = %next, "Job state changed");
        crate::metrics::stage_entered(next.as_str());
        self.state = next;
    }

    /// Milliseconds since the job was created.
    pub fn elapsed_ms(&self) -> u64 {
        (Utc::now() - self.created_at).num_milliseconds().max(0) as u64
    }
}
