use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

/// Worker tunables, loaded from YAML with an embedded default.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Batch result-queue poll timeout, in milliseconds. Bounds how quickly
    /// a cancellation request is noticed mid-batch.
    pub recv_timeout_ms: u64,
    /// Jobs primed per pool worker before results start draining.
    pub pipeline_depth: usize,
    /// Delay before closing the socket, so the final frame can drain.
    pub shutdown_grace_ms: u64,
    /// Upper bound on a single frame payload, in MiB.
    pub max_frame_mib: u64,
    /// Connection attempts before giving up on the controller.
    pub connect_attempts: u32,
    /// Delay between connection attempts, in milliseconds.
    pub connect_retry_ms: u64,
}

impl Config {
    pub fn max_frame_bytes(&self) -> u64 {
        self.max_frame_mib.saturating_mul(1024 * 1024)
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p)?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };
    let config: Config = serde_yaml::from_slice(&bytes)?;
    Ok(config)
}
