//! Sitedrop: on-demand static site builds.
//!
//! Clones a repository, builds it inside a throwaway container, publishes
//! the `dist/` output to object storage under a per-job prefix and returns
//! the public URL. Every request runs its own pipeline; nothing is shared
//! between jobs but the storage client.

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod routes;
pub mod services;

pub use config::DeployConfig;
pub use error::{DeployError, DeployFailure};
pub use models::job::{DeploymentJob, JobId, JobState};
pub use services::deployer::Deployer;
