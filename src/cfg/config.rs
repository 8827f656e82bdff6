// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Tunables for the flow-control core, loaded from YAML.

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::device::{MAX_POOL_SIZE, WAIT_TOKENS_MS, WRITE_RETRY_MS};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Device-wide tunables (pool cap, retry/overflow timers, token batching).
    pub device: DeviceConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DeviceConfig {
    #[serde(rename = "MaxPoolSize", default = "default_max_pool_size")]
    /// Upper bound on bytes the write-buffer pool may cache.
    pub max_pool_size: usize,

    #[serde(
        rename = "WriteRetryInterval",
        with = "serde_millis",
        default = "default_write_retry"
    )]
    /// Delay before retrying a stalled device write.
    pub write_retry_interval: Duration,

    #[serde(
        rename = "WaitForTokensInterval",
        with = "serde_millis",
        default = "default_wait_tokens"
    )]
    /// How long a client may sit at the front of a full send queue before
    /// being removed for overflow.
    pub wait_for_tokens_interval: Duration,

    #[serde(rename = "ClientTokensInterval", default = "default_client_tokens_interval")]
    /// Batch size for returning client credit.
    pub client_tokens_interval: u32,
}

fn default_max_pool_size() -> usize {
    MAX_POOL_SIZE
}

fn default_write_retry() -> Duration {
    Duration::from_millis(WRITE_RETRY_MS)
}

fn default_wait_tokens() -> Duration {
    Duration::from_millis(WAIT_TOKENS_MS)
}

fn default_client_tokens_interval() -> u32 {
    16
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            max_pool_size: default_max_pool_size(),
            write_retry_interval: default_write_retry(),
            wait_for_tokens_interval: default_wait_tokens(),
            client_tokens_interval: default_client_tokens_interval(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self { device: DeviceConfig::default() }
    }
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates invariants on the loaded tunables.
    pub fn validate(&mut self) -> Result<()> {
        ensure!(self.device.max_pool_size > 0, "MaxPoolSize must be > 0");
        ensure!(
            self.device.client_tokens_interval > 0,
            "ClientTokensInterval must be > 0"
        );
        Ok(())
    }
}

/// Serde helpers for representing `Duration` as a number of milliseconds.
mod serde_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
