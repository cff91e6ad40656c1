//! Deployment data models: ephemeral, one set per request.

pub mod artifact;
pub mod job;
