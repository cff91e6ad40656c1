//! Shared helpers for deployment integration tests.
//!
//! Fakes stand in for git, docker and S3 so the orchestrator can be driven
//! end to end against a temporary directory and an in-memory bucket.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, MultipartUpload, ObjectStore};
use tempfile::TempDir;

use sitedrop_server::config::DeployConfig;
use sitedrop_server::error::{
    BuildError, BuildStep, CleanupError, DeployError, DeployResult, ProcessError,
};
use sitedrop_server::services::build::BuildStrategy;
use sitedrop_server::services::cleanup::WorkspaceRemover;
use sitedrop_server::services::deployer::Deployer;
use sitedrop_server::services::source::SourceFetcher;
use sitedrop_server::services::storage::{ObjectStorage, ObjectStoreBackend};
use sitedrop_server::services::upload::ArtifactUploader;

pub const DOMAIN: &str = "sites.example.com";
pub const BUCKET: &str = "sites";

/// Source that writes a minimal project, or fails after a partial write.
#[derive(Default)]
pub struct FakeSource {
    pub fail: bool,
    pub fetched: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl SourceFetcher for FakeSource {
    async fn fetch(&self, url: &str, dest: &Path) -> DeployResult<()> {
        self.fetched.lock().unwrap().push(url.to_string());
        tokio::fs::create_dir_all(dest).await?;
        if self.fail {
            return Err(DeployError::Clone {
                url: url.to_string(),
                source: ProcessError::Failed {
                    program: "git".to_string(),
                    code: Some(128),
                    stderr: "fatal: repository not found".to_string(),
                },
            });
        }
        tokio::fs::write(dest.join("package.json"), r#"{"name":"site"}"#).await?;
        Ok(())
    }
}

/// What the fake build leaves behind.
#[derive(Clone)]
pub enum BuildOutcome {
    /// Write these `(relative path, body)` files under `dist/`.
    Files(Vec<(&'static str, &'static str)>),
    NoDist,
    EmptyDist,
    Fail,
    Hang,
}

pub struct FakeBuild {
    pub outcome: BuildOutcome,
    pub discard_fails: bool,
    pub built: Mutex<Vec<String>>,
    pub discarded: Mutex<Vec<String>>,
}

impl FakeBuild {
    pub fn new(outcome: BuildOutcome) -> Self {
        Self {
            outcome,
            discard_fails: false,
            built: Mutex::new(Vec::new()),
            discarded: Mutex::new(Vec::new()),
        }
    }

    pub fn site() -> Self {
        Self::new(BuildOutcome::Files(vec![
            ("index.html", "<html></html>"),
            ("style.css", "body {}"),
            ("assets/app.js", "console.log('hi')"),
            ("assets/logo.png", "png"),
            ("data/blob.zzqx", "???"),
        ]))
    }

    pub fn discarded(&self) -> Vec<String> {
        self.discarded.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildStrategy for FakeBuild {
    fn name(&self) -> &str {
        "fake"
    }

    async fn build(&self, workspace: &Path, tag: &str) -> Result<(), BuildError> {
        self.built.lock().unwrap().push(tag.to_string());
        let dist = workspace.join("dist");
        match &self.outcome {
            BuildOutcome::Files(files) => {
                for (rel, body) in files {
                    let path = dist.join(rel);
                    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                    std::fs::write(path, body).unwrap();
                }
                Ok(())
            }
            BuildOutcome::NoDist => Ok(()),
            BuildOutcome::EmptyDist => {
                std::fs::create_dir_all(dist.join("assets")).unwrap();
                Ok(())
            }
            BuildOutcome::Fail => Err(BuildError::Step {
                step: BuildStep::Image,
                source: ProcessError::Failed {
                    program: "docker".to_string(),
                    code: Some(1),
                    stderr: "npm ERR! build failed".to_string(),
                },
            }),
            BuildOutcome::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }

    async fn discard(&self, tag: &str) -> Result<(), ProcessError> {
        self.discarded.lock().unwrap().push(tag.to_string());
        if self.discard_fails {
            return Err(ProcessError::Failed {
                program: "docker".to_string(),
                code: Some(1),
                stderr: format!("Error: No such image: {tag}"),
            });
        }
        Ok(())
    }
}

/// Workspace removal that always fails, as both the plain and the elevated
/// attempt would for files nobody can delete.
#[derive(Default)]
pub struct StuckRemover {
    pub attempts: Mutex<Vec<std::path::PathBuf>>,
}

#[async_trait]
impl WorkspaceRemover for StuckRemover {
    async fn remove_workspace(&self, path: &Path) -> Result<(), CleanupError> {
        self.attempts.lock().unwrap().push(path.to_path_buf());
        Err(CleanupError::Workspace {
            path: path.to_path_buf(),
            message: "Permission denied (os error 13); elevated removal failed: sudo: a password is required"
                .to_string(),
        })
    }
}

/// In-memory bucket that rejects keys ending in `fail_suffix`.
pub struct TestStorage {
    pub memory: Arc<InMemory>,
    inner: ObjectStoreBackend,
    fail_suffix: Option<&'static str>,
    pub puts: AtomicUsize,
}

impl TestStorage {
    pub fn new() -> Self {
        let memory = Arc::new(InMemory::new());
        Self {
            inner: ObjectStoreBackend::with_store(memory.clone()),
            memory,
            fail_suffix: None,
            puts: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(suffix: &'static str) -> Self {
        Self {
            fail_suffix: Some(suffix),
            ..Self::new()
        }
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Every stored key, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .memory
            .list(None)
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await
            .unwrap();
        keys.sort();
        keys
    }

    async fn maybe_fail(&self, key: &str) -> Result<(), object_store::Error> {
        match self.fail_suffix {
            Some(suffix) if key.ends_with(suffix) => {
                // Let sibling uploads land first.
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err(object_store::Error::Generic {
                    store: "test",
                    source: format!("injected failure for {key}").into(),
                })
            }
            _ => Ok(()),
        }
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        let object = self.memory.get(&ObjectPath::from(key)).await.ok()?;
        object
            .attributes
            .get(&Attribute::ContentType)
            .map(|value| value.to_string())
    }
}

#[async_trait]
impl ObjectStorage for TestStorage {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), object_store::Error> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail(key).await?;
        self.inner.put_object(key, body, content_type).await
    }

    async fn put_multipart(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<Box<dyn MultipartUpload>, object_store::Error> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail(key).await?;
        self.inner.put_multipart(key, content_type).await
    }
}

pub fn test_config(output_dir: &Path, extra: &[(&str, &str)]) -> DeployConfig {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("S3_BUCKET".to_string(), BUCKET.to_string()),
        ("DEPLOY_DOMAIN".to_string(), DOMAIN.to_string()),
        (
            "DEPLOY_OUTPUT_DIR".to_string(),
            output_dir.to_string_lossy().into_owned(),
        ),
    ]);
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    DeployConfig::from_lookup(|key| vars.get(key).cloned())
}

/// A deployer over fakes, rooted in a fresh temporary directory.
pub struct Harness {
    pub tmp: TempDir,
    pub source: Arc<FakeSource>,
    pub build: Arc<FakeBuild>,
    pub storage: Arc<TestStorage>,
    pub deployer: Arc<Deployer>,
}

impl Harness {
    pub fn new(source: FakeSource, build: FakeBuild, storage: TestStorage) -> Self {
        Self::with_config(source, build, storage, &[])
    }

    pub fn with_config(
        source: FakeSource,
        build: FakeBuild,
        storage: TestStorage,
        extra: &[(&str, &str)],
    ) -> Self {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp.path().join("output"), extra);
        let source = Arc::new(source);
        let build = Arc::new(build);
        let storage = Arc::new(storage);
        let uploader = ArtifactUploader::new(storage.clone(), &config.bucket, config.upload_concurrency);
        let deployer = Deployer::new(&config, source.clone(), build.clone(), uploader);

        Self {
            tmp,
            source,
            build,
            storage,
            deployer: Arc::new(deployer),
        }
    }

    pub fn output_dir(&self) -> &Path {
        self.deployer.output_dir()
    }

    /// Workspaces still present under the output root.
    pub fn leftover_workspaces(&self) -> Vec<String> {
        match std::fs::read_dir(self.output_dir()) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}
