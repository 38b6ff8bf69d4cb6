//! Node and client configuration loaded from JSON.

pub mod client;
pub mod server;

pub use client::ClientConfig;
pub use server::{DirGroup, ServerConfig};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0} directories are not configured")]
    MissingDirectories(DirGroup),
    #[error("{0} directories are configured but empty")]
    EmptyDirectories(DirGroup),
    #[error("{name} must be within (0, 1], got {value}")]
    InvalidThreshold { name: &'static str, value: f32 },
    #[error("disk usage warn threshold {warn} exceeds threshold {threshold}")]
    WarnAboveThreshold { warn: f32, threshold: f32 },
    #[error("{name} {port} is outside 1..=65535")]
    InvalidPort { name: &'static str, port: i32 },
    #[error("quorum sizes must satisfy 1 <= ack ({ack}) <= write ({write}) <= ensemble ({ensemble})")]
    InvalidQuorum {
        ensemble: usize,
        write: usize,
        ack: usize,
    },
}

pub(crate) fn port_in_range(port: i32) -> bool {
    (1..=65535).contains(&port)
}
