//! Deployment orchestrator: clone, build, extract, upload, clean up.
//!
//! Each call to [`Deployer::deploy`] owns one job end to end. Stages run
//! strictly in sequence; the first failure skips the remaining stages but
//! never the cleanup, which removes the workspace and discards the job's
//! image and container whatever the outcome. Cleanup failures are logged
//! and counted, never returned.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use crate::config::DeployConfig;
use crate::error::{BuildError, CleanupError, DeployError, DeployFailure, DeployResult};
use crate::models::job::{DeploymentJob, JobId, JobState};
use crate::services::build::{BuildStrategy, DockerBuildStrategy};
use crate::services::cleanup::{WorkspaceCleaner, WorkspaceRemover};
use crate::services::process::CommandRunner;
use crate::services::source::{GitSource, SourceFetcher};
use crate::services::storage::ObjectStorage;
use crate::services::upload::{self, ArtifactUploader};

pub struct Deployer {
    output_dir: PathBuf,
    deploy_domain: String,
    pipeline_timeout: Duration,
    source: Arc<dyn SourceFetcher>,
    strategy: Arc<dyn BuildStrategy>,
    uploader: ArtifactUploader,
    cleaner: Arc<dyn WorkspaceRemover>,
}

impl Deployer {
    pub fn new(
        config: &DeployConfig,
        source: Arc<dyn SourceFetcher>,
        strategy: Arc<dyn BuildStrategy>,
        uploader: ArtifactUploader,
    ) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            deploy_domain: config.deploy_domain.clone(),
            pipeline_timeout: config.pipeline_timeout,
            source,
            strategy,
            uploader,
            cleaner: Arc::new(WorkspaceCleaner::new(CommandRunner::new(Some(
                config.command_timeout,
            )))),
        }
    }

    /// Git sources, Docker builds and the given storage, wired from config.
    pub fn from_config(config: &DeployConfig, storage: Arc<dyn ObjectStorage>) -> Self {
        let runner = CommandRunner::new(Some(config.command_timeout));
        let source = GitSource::new(runner.clone());
        let strategy = DockerBuildStrategy::new(runner)
            .with_base_image(&config.build_image)
            .with_commands(&config.install_command, &config.build_command)
            .with_container_artifact_dir(&config.container_artifact_dir)
            .with_sudo(config.use_sudo);
        let uploader = ArtifactUploader::new(storage, &config.bucket, config.upload_concurrency)
            .with_multipart_threshold(config.multipart_threshold);

        Self::new(config, Arc::new(source), Arc::new(strategy), uploader)
    }

    /// Replace how workspaces are removed after each job.
    pub fn with_cleaner(mut self, cleaner: Arc<dyn WorkspaceRemover>) -> Self {
        self.cleaner = cleaner;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Public URL for a deployed job.
    pub fn site_url(&self, job_id: &JobId) -> String {
        format!("https://{job_id}.{}/", self.deploy_domain)
    }

    /// Run one deployment of `source_url`.
    ///
    /// Returns the succeeded job (with `result_url` set) or the failure with
    /// the stage it happened in. The workspace and build image are released
    /// before this returns on every path.
    pub async fn deploy(&self, source_url: &str) -> Result<DeploymentJob, DeployFailure> {
        let job = DeploymentJob::new(JobId::generate(), source_url, &self.output_dir);
        let span = tracing::info_span!("deploy", job_id = %job.id);
        self.run_job(job).instrument(span).await
    }

    async fn run_job(&self, mut job: DeploymentJob) -> Result<DeploymentJob, DeployFailure> {
        tracing::info!(
            url = %job.source_url,
            workspace = %job.workspace_path.display(),
            strategy = self.strategy.name(),
            "Deployment started"
        );

        let outcome = match tokio::time::timeout(self.pipeline_timeout, self.run_stages(&mut job)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(DeployError::TimedOut {
                limit: self.pipeline_timeout,
            }),
        };
        let stage = job.state;

        job.transition(JobState::CleaningUp);
        self.cleanup(&job).await;

        match outcome {
            Ok(()) => {
                let site_url = self.site_url(&job.id);
                job.result_url = Some(site_url.clone());
                job.transition(JobState::Succeeded);
                crate::metrics::job_finished("succeeded", job.elapsed_ms());
                tracing::info!(site_url = %site_url, duration_ms = job.elapsed_ms(), "Deployment succeeded");
                Ok(job)
            }
            Err(error) => {
                job.transition(JobState::Failed);
                crate::metrics::job_finished("failed", job.elapsed_ms());
                tracing::error!(%stage, duration_ms = job.elapsed_ms(), "Deployment failed: {error}");
                Err(DeployFailure {
                    job_id: job.id,
                    stage,
                    error,
                })
            }
        }
    }

    async fn run_stages(&self, job: &mut DeploymentJob) -> DeployResult<()> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        job.transition(JobState::Cloning);
        self.source.fetch(&job.source_url, &job.workspace_path).await?;

        job.transition(JobState::Building);
        self.strategy
            .build(&job.workspace_path, job.id.as_str())
            .await?;

        job.transition(JobState::ExtractingArtifacts);
        verify_artifacts(&job.artifact_path).await?;
        tracing::info!(path = %job.artifact_path.display(), "Build artifacts found");

        job.transition(JobState::Uploading);
        self.uploader.upload_dir(&job.artifact_path, &job.id).await?;

        Ok(())
    }

    /// Release the job's host resources. Each action runs regardless of the
    /// other's result.
    async fn cleanup(&self, job: &DeploymentJob) -> Vec<CleanupError> {
        let mut failures = Vec::new();

        if let Err(e) = self.cleaner.remove_workspace(&job.workspace_path).await {
            crate::metrics::cleanup_failed("workspace");
            failures.push(e);
        }

        if let Err(source) = self.strategy.discard(job.id.as_str()).await {
            crate::metrics::cleanup_failed("image");
            failures.push(CleanupError::Image {
                image: job.id.to_string(),
                source,
            });
        }

        for failure in &failures {
            tracing::warn!("Cleanup failed: {failure}");
        }
        failures
    }
}

/// The build's success is not proof of output: require a non-empty
/// artifact directory.
async fn verify_artifacts(path: &Path) -> DeployResult<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => {}
        _ => return Err(BuildError::MissingArtifacts(path.to_path_buf()).into()),
    }

    let dir = path.to_path_buf();
    let has_files = tokio::task::spawn_blocking(move || upload::contains_files(&dir))
        .await
        .map_err(|e| DeployError::Internal(format!("artifact scan task failed: {e}")))?;
    if !has_files {
        return Err(BuildError::EmptyArtifacts(path.to_path_buf()).into());
    }
    Ok(())
}
