//! Deploy service configuration: loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct DeployConfig {
    /// Object storage access key id.
    pub aws_access_key_id: String,
    /// Object storage secret access key.
    pub aws_secret_access_key: String,
    /// Object storage region.
    pub aws_region: String,
    /// Custom endpoint for S3-compatible stores.
    pub s3_endpoint: Option<String>,
    /// Bucket receiving the built artifacts.
    pub bucket: String,
    /// Domain suffix used to compose the public site URL.
    pub deploy_domain: String,
    /// Root directory holding one workspace per job.
    pub output_dir: PathBuf,
    /// Maximum number of concurrent file uploads per job.
    pub upload_concurrency: usize,
    /// Deadline for each external command (clone, docker steps).
    pub command_timeout: Duration,
    /// Deadline for a whole pipeline run, cleanup excluded.
    pub pipeline_timeout: Duration,
    /// Prefix container commands with `sudo -n`.
    pub use_sudo: bool,
    /// Base image for the generated build descriptor.
    pub build_image: String,
    /// Dependency install step run inside the image.
    pub install_command: String,
    /// Build step run inside the image.
    pub build_command: String,
    /// Where the build leaves its output inside the image.
    pub container_artifact_dir: String,
    /// Files above this size are uploaded in parts.
    pub multipart_threshold: u64,
}

impl DeployConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let aws_access_key_id = lookup("AWS_ACCESS_KEY_ID").unwrap_or_default();
        let aws_secret_access_key = lookup("AWS_SECRET_ACCESS_KEY").unwrap_or_default();
        let aws_region = lookup("AWS_REGION").unwrap_or_default();
        let s3_endpoint = lookup("S3_ENDPOINT").filter(|s| !s.is_empty());
        let bucket = lookup("S3_BUCKET").unwrap_or_default();
        let deploy_domain = lookup("DEPLOY_DOMAIN").unwrap_or_default();
        let output_dir = lookup("DEPLOY_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("output"));
        let upload_concurrency = lookup("DEPLOY_UPLOAD_CONCURRENCY")
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(16);
        let command_timeout_secs = positive(lookup("DEPLOY_COMMAND_TIMEOUT_SECS")).unwrap_or(600);
        let pipeline_timeout_secs = positive(lookup("DEPLOY_PIPELINE_TIMEOUT_SECS")).unwrap_or(1800);
        let use_sudo = lookup("DEPLOY_USE_SUDO")
            .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let build_image = lookup("DEPLOY_BUILD_IMAGE").unwrap_or_else(|| "node:16".to_string());
        let install_command =
            lookup("DEPLOY_INSTALL_COMMAND").unwrap_or_else(|| "npm install".to_string());
        let build_command =
            lookup("DEPLOY_BUILD_COMMAND").unwrap_or_else(|| "npm run build".to_string());
        let container_artifact_dir =
            lookup("DEPLOY_CONTAINER_ARTIFACT_DIR").unwrap_or_else(|| "/app/dist".to_string());
        let multipart_threshold = positive(lookup("DEPLOY_MULTIPART_THRESHOLD_BYTES"))
            .unwrap_or(crate::services::upload::DEFAULT_MULTIPART_THRESHOLD);

        if aws_access_key_id.is_empty() || aws_secret_access_key.is_empty() {
            tracing::warn!("AWS credentials not set -- uploads will fail to authenticate");
        }
        if bucket.is_empty() {
            tracing::warn!("S3_BUCKET not set -- uploads will fail");
        }
        if deploy_domain.is_empty() {
            tracing::warn!("DEPLOY_DOMAIN not set -- site URLs will be incomplete");
        }

        Self {
            aws_access_key_id,
            aws_secret_access_key,
            aws_region,
            s3_endpoint,
            bucket,
            deploy_domain,
            output_dir,
            upload_concurrency,
            command_timeout: Duration::from_secs(command_timeout_secs),
            pipeline_timeout: Duration::from_secs(pipeline_timeout_secs),
            use_sudo,
            build_image,
            install_command,
            build_command,
            container_artifact_dir,
            multipart_threshold,
        }
    }
}

/// Parse a strictly positive number; zero and garbage fall back to the default.
fn positive(value: Option<String>) -> Option<u64> {
    value.and_then(|s| s.trim().parse().ok()).filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> DeployConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DeployConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn missing_values_default_to_empty() {
        let config = config_from(&[]);
        assert_eq!(config.bucket, "");
        assert_eq!(config.aws_region, "");
        assert_eq!(config.deploy_domain, "");
        assert!(config.s3_endpoint.is_none());
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.upload_concurrency, 16);
        assert_eq!(config.command_timeout, Duration::from_secs(600));
        assert_eq!(config.pipeline_timeout, Duration::from_secs(1800));
        assert!(!config.use_sudo);
        assert_eq!(config.build_image, "node:16");
    }

    #[test]
    fn values_are_read_from_environment() {
        let config = config_from(&[
            ("S3_BUCKET", "sites"),
            ("AWS_REGION", "eu-west-1"),
            ("DEPLOY_DOMAIN", "sites.example.com"),
            ("DEPLOY_UPLOAD_CONCURRENCY", "4"),
            ("DEPLOY_USE_SUDO", "true"),
            ("DEPLOY_COMMAND_TIMEOUT_SECS", "30"),
        ]);
        assert_eq!(config.bucket, "sites");
        assert_eq!(config.aws_region, "eu-west-1");
        assert_eq!(config.upload_concurrency, 4);
        assert!(config.use_sudo);
        assert_eq!(config.command_timeout, Duration::from_secs(30));
    }

    #[test]
    fn zero_timeouts_fall_back_to_defaults() {
        let config = config_from(&[
            ("DEPLOY_COMMAND_TIMEOUT_SECS", "0"),
            ("DEPLOY_PIPELINE_TIMEOUT_SECS", "0"),
            ("DEPLOY_MULTIPART_THRESHOLD_BYTES", "0"),
        ]);
        assert_eq!(config.command_timeout, Duration::from_secs(600));
        assert_eq!(config.pipeline_timeout, Duration::from_secs(1800));
        assert_eq!(
            config.multipart_threshold,
            crate::services::upload::DEFAULT_MULTIPART_THRESHOLD
        );
    }

    #[test]
    fn build_commands_are_configurable() {
        let config = config_from(&[
            ("DEPLOY_INSTALL_COMMAND", "pnpm install"),
            ("DEPLOY_BUILD_COMMAND", "pnpm build"),
            ("DEPLOY_CONTAINER_ARTIFACT_DIR", "/app/out"),
        ]);
        assert_eq!(config.install_command, "pnpm install");
        assert_eq!(config.build_command, "pnpm build");
        assert_eq!(config.container_artifact_dir, "/app/out");

        let defaults = config_from(&[]);
        assert_eq!(defaults.install_command, "npm install");
        assert_eq!(defaults.build_command, "npm run build");
        assert_eq!(defaults.container_artifact_dir, "/app/dist");
    }

    #[test]
    fn zero_concurrency_falls_back_to_default() {
        let config = config_from(&[("DEPLOY_UPLOAD_CONCURRENCY", "0")]);
        assert_eq!(config.upload_concurrency, 16);
    }
}
