//! Deployment services: process execution, build, storage and orchestration.

pub mod build;
pub mod cleanup;
pub mod deployer;
pub mod process;
pub mod source;
pub mod storage;
pub mod upload;
