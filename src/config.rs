use std::path::PathBuf;

use anyhow::{Context, Result};
use dotenv::dotenv;
use serde::{Deserialize, Serialize};

use crate::common::{
    DEFAULT_STORE_PATH, DEFAULT_SYNC_TIMEOUT_SECS, DEFAULT_WAITER_SWEEP_INTERVAL_SECS,
};

/// What a dispatch message carries. `Thin` sends only the job identifier and
/// workers re-read current state by id; `Fat` inlines the accumulated payload
/// for workers that cannot reach the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    #[default]
    Thin,
    Fat,
}

/// Process settings, read from `SCRIBEFLOW_`-prefixed environment variables
/// with a `.env` preload.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    #[serde(default = "default_sync_timeout_secs")]
    pub sync_timeout_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub waiter_sweep_interval_secs: u64,

    #[serde(default)]
    pub dispatch_mode: DispatchMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            sync_timeout_secs: default_sync_timeout_secs(),
            waiter_sweep_interval_secs: default_sweep_interval_secs(),
            dispatch_mode: DispatchMode::default(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenv().ok();
        envy::prefixed("SCRIBEFLOW_")
            .from_env::<Settings>()
            .context("Failed to read settings from environment")
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

fn default_sync_timeout_secs() -> u64 {
    DEFAULT_SYNC_TIMEOUT_SECS
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_WAITER_SWEEP_INTERVAL_SECS
}
