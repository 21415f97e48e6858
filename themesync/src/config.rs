use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use theme_core::{ThemeClient, ThemeError};

use crate::sync::backoff::DEFAULT_BACKOFF_INTERVAL;

const DEFAULT_API_VERSION: &str = "2024-01";
const DEFAULT_WORKERS: u64 = 2;

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub store: String,
    pub theme_id: u64,
    pub password: String,
    pub root: PathBuf,
    pub api_version: String,
    pub workers: usize,
    pub backoff_interval: Duration,
    pub verbose: bool,
}

impl SyncConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = lookup("THEMESYNC_STORE").context("THEMESYNC_STORE is not set")?;
        let theme_id = lookup("THEMESYNC_THEME_ID")
            .context("THEMESYNC_THEME_ID is not set")?
            .trim()
            .parse::<u64>()
            .context("THEMESYNC_THEME_ID must be a number")?;
        let password = lookup("THEMESYNC_PASSWORD").context("THEMESYNC_PASSWORD is not set")?;
        let root = lookup("THEMESYNC_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let api_version =
            lookup("THEMESYNC_API_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.to_string());
        let workers = read_u64(&lookup, "THEMESYNC_WORKERS", DEFAULT_WORKERS) as usize;
        let backoff_interval = Duration::from_millis(read_u64(
            &lookup,
            "THEMESYNC_BACKOFF_MS",
            DEFAULT_BACKOFF_INTERVAL.as_millis() as u64,
        ));
        let verbose = read_bool(&lookup, "THEMESYNC_VERBOSE", false);

        Ok(Self {
            store,
            theme_id,
            password,
            root,
            api_version,
            workers,
            backoff_interval,
            verbose,
        })
    }

    pub fn client(&self) -> Result<ThemeClient, ThemeError> {
        ThemeClient::new(
            &self.store,
            &self.api_version,
            self.theme_id,
            self.password.clone(),
        )
    }
}

fn read_u64<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}
