//! Artifact uploader: publishes a directory tree under a job prefix.
//!
//! Every regular file below the artifact root becomes one object keyed
//! `{job_id}/{relative_path}`. Uploads fan out with a concurrency cap and
//! are joined before the stage completes. A failed upload fails the stage,
//! but objects already written by sibling uploads are left in place.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use object_store::WriteMultipart;
use tokio::io::AsyncReadExt;
use walkdir::WalkDir;

use crate::error::UploadError;
use crate::models::artifact::ArtifactFile;
use crate::models::job::JobId;
use crate::services::storage::ObjectStorage;

/// Files larger than this are streamed as multipart uploads.
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 8 * 1024 * 1024;

/// Part size for streamed uploads; S3's minimum for all but the last part.
const MULTIPART_CHUNK_BYTES: usize = 5 * 1024 * 1024;

/// Parts in flight per streamed file.
const MULTIPART_PARTS_IN_FLIGHT: usize = 2;

/// Totals for a completed upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub files: usize,
    pub bytes: u64,
}

pub struct ArtifactUploader {
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
    concurrency: usize,
    multipart_threshold: u64,
}

impl ArtifactUploader {
    pub fn new(storage: Arc<dyn ObjectStorage>, bucket: impl Into<String>, concurrency: usize) -> Self {
        Self {
            storage,
            bucket: bucket.into(),
            concurrency: concurrency.max(1),
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
        }
    }

    pub fn with_multipart_threshold(mut self, bytes: u64) -> Self {
        self.multipart_threshold = bytes;
        self
    }

    /// Upload every file under `dir` to `{job_id}/...`.
    ///
    /// Waits for all uploads to resolve; returns the first failure observed
    /// if any upload failed.
    pub async fn upload_dir(&self, dir: &Path, job_id: &JobId) -> Result<UploadSummary, UploadError> {
        let root = dir.to_path_buf();
        let files = tokio::task::spawn_blocking(move || collect_artifacts(&root))
            .await
            .map_err(|e| UploadError::ScanAborted {
                path: dir.to_path_buf(),
                message: e.to_string(),
            })??;
        tracing::info!(
            job_id = %job_id,
            files = files.len(),
            bucket = %self.bucket,
            concurrency = self.concurrency,
            "Uploading artifacts"
        );

        let prefix = job_id.as_str();
        let results: Vec<Result<u64, UploadError>> = stream::iter(files)
            .map(|file| async move { self.upload_file(file, prefix).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut summary = UploadSummary::default();
        let mut first_error = None;
        for result in results {
            match result {
                Ok(bytes) => {
                    summary.files += 1;
                    summary.bytes += bytes;
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, "Artifact upload failed: {e}");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        crate::metrics::files_uploaded(summary.files);

        if let Some(e) = first_error {
            return Err(e);
        }

        tracing::info!(
            job_id = %job_id,
            files = summary.files,
            bytes = summary.bytes,
            "Uploaded all artifacts to s3://{}/{}",
            self.bucket,
            job_id
        );
        Ok(summary)
    }

    async fn upload_file(&self, file: ArtifactFile, prefix: &str) -> Result<u64, UploadError> {
        let key = file.storage_key(prefix);
        let read_error = |source| UploadError::Read {
            path: file.source_path.clone(),
            source,
        };
        let size = tokio::fs::metadata(&file.source_path)
            .await
            .map_err(read_error)?
            .len();

        if size > self.multipart_threshold {
            self.stream_file(&file, &key).await?;
        } else {
            let body = tokio::fs::read(&file.source_path).await.map_err(read_error)?;
            self.storage
                .put_object(&key, Bytes::from(body), &file.content_type)
                .await
                .map_err(|source| self.put_error(&key, source))?;
        }

        tracing::debug!(key = %key, content_type = %file.content_type, size, "Uploaded artifact");
        Ok(size)
    }

    /// Upload a large file part by part without holding it in memory.
    async fn stream_file(&self, file: &ArtifactFile, key: &str) -> Result<(), UploadError> {
        let upload = self
            .storage
            .put_multipart(key, &file.content_type)
            .await
            .map_err(|source| self.put_error(key, source))?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, MULTIPART_CHUNK_BYTES);

        if let Err(e) = self.write_parts(&file.source_path, key, &mut writer).await {
            if let Err(abort) = writer.abort().await {
                tracing::warn!(key = %key, "Failed to abort multipart upload: {abort}");
            }
            return Err(e);
        }

        writer
            .finish()
            .await
            .map_err(|source| self.put_error(key, source))?;
        Ok(())
    }

    async fn write_parts(
        &self,
        path: &Path,
        key: &str,
        writer: &mut WriteMultipart,
    ) -> Result<(), UploadError> {
        let read_error = |source| UploadError::Read {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = tokio::fs::File::open(path).await.map_err(read_error)?;
        let mut buf = vec![0u8; 256 * 1024];
        loop {
            let n = reader.read(&mut buf).await.map_err(read_error)?;
            if n == 0 {
                return Ok(());
            }
            writer
                .wait_for_capacity(MULTIPART_PARTS_IN_FLIGHT)
                .await
                .map_err(|source| self.put_error(key, source))?;
            writer.write(&buf[..n]);
        }
    }

    fn put_error(&self, key: &str, source: object_store::Error) -> UploadError {
        UploadError::Put {
            key: key.to_string(),
            bucket: self.bucket.clone(),
            source,
        }
    }
}

/// Enumerate regular files under `dir`, sorted by path.
///
/// Directories are traversed but never returned; symlinks are not followed.
/// Blocking; run it off the async workers.
pub fn collect_artifacts(dir: &Path) -> Result<Vec<ArtifactFile>, UploadError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|source| UploadError::Scan {
            path: dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(file) = ArtifactFile::new(dir, entry.path()) {
            files.push(file);
        }
    }
    Ok(files)
}

/// Whether `dir` holds at least one regular file at any depth.
pub fn contains_files(dir: &Path) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .any(|entry| entry.file_type().is_file())
}
