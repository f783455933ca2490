use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub google: GoogleConfig,
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
  /// Base URL of the Calendar API (override to point at a mock server)
  pub calendar_api_url: String,
  /// Base URL of the Tasks API (override to point at a mock server)
  pub tasks_api_url: String,
}

impl Default for GoogleConfig {
  fn default() -> Self {
    Self {
      calendar_api_url: "https://www.googleapis.com/calendar/v3/".to_string(),
      tasks_api_url: "https://tasks.googleapis.com/tasks/v1/".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// How far ahead an event sync pass fetches, in days
  pub event_horizon_days: i64,
  /// How far ahead a task sync pass fetches, in days
  pub task_horizon_days: i64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      event_horizon_days: 14,
      task_horizon_days: 365,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./datebook.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/datebook/config.yaml
  ///
  /// Every key has a workable default, so a missing file is not an error.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("datebook.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("datebook").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}
