use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::tracker::{PollConfig, DEFAULT_NOTICE_TTL, DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL};

const SETTINGS_FILE: &str = "settings.json";
const LOG_FILE: &str = "jobsheet.log";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "jobsheet")
}

/// Where the browse view sends its logs while it owns the terminal.
pub fn log_path() -> Result<PathBuf> {
    let dir = match project_dirs() {
        Some(dirs) => dirs.data_dir().to_path_buf(),
        None => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
    Ok(dir.join(LOG_FILE))
}

/// User preferences kept between runs. Loaded once at startup and handed to
/// whatever needs them; changes go through the setters, which save right away.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip)]
    path: PathBuf,
}

impl Preferences {
    pub fn default_path() -> PathBuf {
        match project_dirs() {
            Some(dirs) => dirs.config_dir().join(SETTINGS_FILE),
            None => PathBuf::from(SETTINGS_FILE),
        }
    }

    /// Reads preferences from `path`; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut prefs = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
            serde_json::from_str::<Preferences>(&raw)
                .with_context(|| format!("Failed to parse settings file: {}", path.display()))?
        } else {
            debug!("No settings at {}, using defaults", path.display());
            Preferences::default()
        };
        prefs.path = path.to_path_buf();
        Ok(prefs)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_dark_mode(&mut self, on: bool) -> Result<()> {
        self.dark_mode = on;
        self.save()
    }

    pub fn toggle_dark_mode(&mut self) -> Result<bool> {
        self.set_dark_mode(!self.dark_mode)?;
        Ok(self.dark_mode)
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("Failed to write settings file: {}", self.path.display()))
    }
}

/// Runtime settings for talking to the sheet.
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: String,
    pub poll: PollConfig,
    pub timeout: Option<Duration>,
    /// How long a notice stays up in the browse view.
    pub notice_ttl: Duration,
}

impl Config {
    /// `endpoint` comes from the command line (or `JOBSHEET_ENDPOINT`) and
    /// wins over the one saved in preferences.
    pub fn resolve(endpoint: Option<String>, prefs: &Preferences) -> Result<Self> {
        let endpoint = endpoint
            .filter(|e| !e.trim().is_empty())
            .or_else(|| prefs.endpoint.clone())
            .ok_or_else(|| {
                anyhow!(
                    "No sheet endpoint configured. Pass --endpoint, set JOBSHEET_ENDPOINT, \
                     or add \"endpoint\" to {}",
                    prefs.path().display()
                )
            })?;

        let attempts = env_parse::<u32>("JOBSHEET_POLL_ATTEMPTS")?.unwrap_or(DEFAULT_POLL_ATTEMPTS);
        if attempts == 0 {
            bail!("JOBSHEET_POLL_ATTEMPTS must be at least 1");
        }
        let interval = env_parse::<u64>("JOBSHEET_POLL_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        let timeout = env_parse::<u64>("JOBSHEET_TIMEOUT_SECS")?.map(Duration::from_secs);
        let notice_ttl = env_parse::<u64>("JOBSHEET_NOTICE_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_NOTICE_TTL);

        Ok(Self {
            endpoint: endpoint.trim().to_string(),
            poll: PollConfig { attempts, interval },
            timeout,
            notice_ttl,
        })
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("Invalid {} value '{}': {}", key, raw, e)),
        _ => Ok(None),
    }
}
