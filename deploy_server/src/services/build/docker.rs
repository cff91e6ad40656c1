//! Docker-backed build: generated Dockerfile, throwaway container, `docker cp`.

use std::ffi::{OsStr, OsString};
use std::path::Path;

use async_trait::async_trait;

use super::{BuildStrategy, ARTIFACT_DIR};
use crate::error::{BuildError, BuildStep, ProcessError};
use crate::services::process::CommandRunner;

/// Node toolchain build inside a single-use image.
#[derive(Debug, Clone)]
pub struct DockerBuildStrategy {
    runner: CommandRunner,
    docker_bin: String,
    use_sudo: bool,
    base_image: String,
    install_command: String,
    build_command: String,
    container_artifact_dir: String,
}

impl DockerBuildStrategy {
    pub fn new(runner: CommandRunner) -> Self {
        Self {
            runner,
            docker_bin: "docker".to_string(),
            use_sudo: false,
            base_image: "node:16".to_string(),
            install_command: "npm install".to_string(),
            build_command: "npm run build".to_string(),
            container_artifact_dir: "/app/dist".to_string(),
        }
    }

    pub fn with_base_image(mut self, image: impl Into<String>) -> Self {
        self.base_image = image.into();
        self
    }

    /// Run docker through `sudo -n`.
    pub fn with_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = use_sudo;
        self
    }

    pub fn with_docker_bin(mut self, docker_bin: impl Into<String>) -> Self {
        self.docker_bin = docker_bin.into();
        self
    }

    pub fn with_commands(mut self, install: impl Into<String>, build: impl Into<String>) -> Self {
        self.install_command = install.into();
        self.build_command = build.into();
        self
    }

    /// Directory inside the image holding the build output.
    pub fn with_container_artifact_dir(mut self, dir: impl Into<String>) -> Self {
        self.container_artifact_dir = dir.into();
        self
    }

    /// Build descriptor written into every workspace.
    pub fn dockerfile(&self) -> String {
        format!(
            "FROM {image}\n\
             WORKDIR /app\n\
             COPY package*.json ./\n\
             RUN {install}\n\
             COPY . .\n\
             RUN {build}\n",
            image = self.base_image,
            install = self.install_command,
            build = self.build_command,
        )
    }

    fn container_name(tag: &str) -> String {
        format!("{tag}_container")
    }

    /// Program and arguments for one docker invocation.
    fn command_line(&self, args: Vec<OsString>) -> (&str, Vec<OsString>) {
        if self.use_sudo {
            let mut full = vec![OsString::from("-n"), OsString::from(&self.docker_bin)];
            full.extend(args);
            ("sudo", full)
        } else {
            (self.docker_bin.as_str(), args)
        }
    }

    async fn docker(&self, args: Vec<OsString>) -> Result<String, ProcessError> {
        let (program, args) = self.command_line(args);
        self.runner.run(program, args).await
    }

    /// `docker cp` of the in-image artifact dir to `workspace/dist`.
    fn copy_out_args(&self, tag: &str, workspace: &Path) -> Vec<OsString> {
        let container_src = format!("{}:{}", Self::container_name(tag), self.container_artifact_dir);
        let host_dest = workspace.join(ARTIFACT_DIR);
        vec![
            OsString::from("cp"),
            OsString::from(container_src),
            host_dest.into_os_string(),
        ]
    }

    async fn step(&self, step: BuildStep, args: Vec<OsString>) -> Result<(), BuildError> {
        self.docker(args)
            .await
            .map_err(|source| BuildError::Step { step, source })?;
        tracing::info!(%step, "Build step completed");
        Ok(())
    }
}

/// Docker's answer when the image was never built or is already gone.
fn is_missing_image(err: &ProcessError) -> bool {
    matches!(err, ProcessError::Failed { stderr, .. } if stderr.contains("No such image"))
}

fn os_args<const N: usize>(args: [&OsStr; N]) -> Vec<OsString> {
    args.into_iter().map(OsStr::to_os_string).collect()
}

#[async_trait]
impl BuildStrategy for DockerBuildStrategy {
    fn name(&self) -> &str {
        "docker"
    }

    async fn build(&self, workspace: &Path, tag: &str) -> Result<(), BuildError> {
        let descriptor = workspace.join("Dockerfile");
        tokio::fs::write(&descriptor, self.dockerfile())
            .await
            .map_err(|source| BuildError::Descriptor {
                path: descriptor.clone(),
                source,
            })?;

        let container = Self::container_name(tag);

        tracing::info!(tag, image = %self.base_image, "Building image");
        self.step(
            BuildStep::Image,
            os_args([
                OsStr::new("build"),
                OsStr::new("-t"),
                OsStr::new(tag),
                workspace.as_os_str(),
            ]),
        )
        .await?;

        self.step(
            BuildStep::CreateContainer,
            os_args([
                OsStr::new("create"),
                OsStr::new("--name"),
                OsStr::new(&container),
                OsStr::new(tag),
            ]),
        )
        .await?;

        self.step(BuildStep::CopyArtifacts, self.copy_out_args(tag, workspace))
            .await?;

        self.step(
            BuildStep::RemoveContainer,
            os_args([OsStr::new("rm"), OsStr::new(&container)]),
        )
        .await?;

        Ok(())
    }

    async fn discard(&self, tag: &str) -> Result<(), ProcessError> {
        // Left behind only when the build failed between create and rm.
        let container = Self::container_name(tag);
        if let Err(e) = self
            .docker(os_args([OsStr::new("rm"), OsStr::new("-f"), OsStr::new(&container)]))
            .await
        {
            tracing::debug!(container = %container, "No container to remove: {e}");
        }

        match self.docker(os_args([OsStr::new("rmi"), OsStr::new(tag)])).await {
            Ok(_) => {
                tracing::info!(image = tag, "Removed build image");
                Ok(())
            }
            Err(e) if is_missing_image(&e) => {
                tracing::debug!(image = tag, "No image to remove");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
