use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub reads: ReadsConfig,
  /// Log filter used when TASKDECK_LOG is unset (defaults to "info")
  pub log_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the task service, e.g. https://www.teambition.com/api/
  pub url: String,
  /// Current user, used to scope "my tasks" listings
  pub user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
  /// Persistent cache in a SQLite file
  #[default]
  Sqlite,
  /// Process-lifetime cache
  Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  #[serde(default)]
  pub backend: CacheBackend,
  /// SQLite file (defaults to the platform data dir)
  pub path: Option<PathBuf>,
}

/// Request sizes used by listing reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ReadsConfig {
  #[serde(default = "default_my_tasks_count")]
  pub my_tasks_count: u32,
  #[serde(default = "default_done_page_size")]
  pub done_page_size: u32,
}

fn default_my_tasks_count() -> u32 {
  500
}

fn default_done_page_size() -> u32 {
  30
}

impl Default for ReadsConfig {
  fn default() -> Self {
    Self {
      my_tasks_count: default_my_tasks_count(),
      done_page_size: default_done_page_size(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./taskdeck.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/taskdeck/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/taskdeck/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("taskdeck.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("taskdeck").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml_str(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.reads.my_tasks_count == 0 || config.reads.done_page_size == 0 {
      return Err(eyre!("reads sizes must be greater than zero"));
    }
    Ok(config)
  }

  /// Get the task service token from environment variables.
  ///
  /// Checks TASKDECK_TOKEN first, then TEAMBITION_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("TASKDECK_TOKEN")
      .or_else(|_| std::env::var("TEAMBITION_TOKEN"))
      .map_err(|_| {
        eyre!("API token not found. Set TASKDECK_TOKEN or TEAMBITION_TOKEN environment variable.")
      })
  }

  /// User id for "my tasks" listings, or an error naming the missing key.
  pub fn user_id(&self) -> Result<&str> {
    self
      .api
      .user_id
      .as_deref()
      .ok_or_else(|| eyre!("api.user_id is not set in the config file"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::from_yaml_str("api:\n  url: https://example.com/api/\n").unwrap();

    assert_eq!(config.api.url, "https://example.com/api/");
    assert_eq!(config.cache.backend, CacheBackend::Sqlite);
    assert!(config.cache.path.is_none());
    assert_eq!(config.reads, ReadsConfig::default());
    assert_eq!(config.reads.my_tasks_count, 500);
    assert_eq!(config.reads.done_page_size, 30);
    assert!(config.user_id().is_err());
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
api:
  url: https://example.com/api/
  user_id: u1
cache:
  backend: memory
reads:
  done_page_size: 10
log_level: debug
"#;
    let config = Config::from_yaml_str(yaml).unwrap();

    assert_eq!(config.user_id().unwrap(), "u1");
    assert_eq!(config.cache.backend, CacheBackend::Memory);
    assert_eq!(config.reads.my_tasks_count, 500);
    assert_eq!(config.reads.done_page_size, 10);
    assert_eq!(config.log_level.as_deref(), Some("debug"));
  }

  #[test]
  fn test_rejects_zero_sizes() {
    let yaml = "api:\n  url: u\nreads:\n  my_tasks_count: 0\n";
    assert!(Config::from_yaml_str(yaml).is_err());
  }

  #[test]
  fn test_unknown_backend_is_an_error() {
    let yaml = "api:\n  url: u\ncache:\n  backend: redis\n";
    assert!(Config::from_yaml_str(yaml).is_err());
  }

  #[test]
  fn test_missing_explicit_path() {
    let err = Config::load(Some(Path::new("/nonexistent/taskdeck.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
