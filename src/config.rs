use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HistoryError, Result};

/// Settings persisted to history-config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Overrides the directory holding history.json and aggregate.json
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
    #[serde(default = "default_usage_stats_enabled")]
    pub usage_stats_enabled: bool,
    // Older configs only had a debug switch
    #[serde(default, skip_serializing)]
    pub debug: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_usage_stats_enabled() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_level: default_log_level(),
            log_json: false,
            usage_stats_enabled: true,
            debug: false,
        }
    }
}

impl AppConfig {
    pub fn data_paths(&self) -> DataPaths {
        match &self.data_dir {
            Some(dir) => DataPaths::new(dir.clone()),
            None => DataPaths::new(get_proxypal_config_dir()),
        }
    }
}

/// Locations of the persisted history files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    dir: PathBuf,
}

impl DataPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Request history file path
    pub fn history_path(&self) -> PathBuf {
        self.dir.join("history.json")
    }

    /// Aggregate analytics file path (cumulative stats, never trimmed)
    pub fn aggregate_path(&self) -> PathBuf {
        self.dir.join("aggregate.json")
    }

    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }
}

/// Get the proxypal config directory, creating it if needed
pub fn get_proxypal_config_dir() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| {
            tracing::warn!("could not determine config directory, using current directory");
            PathBuf::from(".")
        })
        .join("proxypal");

    if let Err(e) = std::fs::create_dir_all(&config_dir) {
        tracing::error!(
            dir = %config_dir.display(),
            error = %e,
            "failed to create config directory"
        );
    }

    config_dir
}

pub fn get_config_path() -> PathBuf {
    get_proxypal_config_dir().join("history-config.json")
}

fn migrate_config(config: &mut AppConfig) -> bool {
    if config.debug {
        config.debug = false;
        if config.log_level == default_log_level() {
            tracing::info!("migrating legacy debug flag to logLevel=debug");
            config.log_level = "debug".to_string();
        }
        return true;
    }

    false
}

pub fn load_config_from_path(path: &Path) -> AppConfig {
    if !path.exists() {
        return AppConfig::default();
    }

    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file, falling back to defaults"
            );
            return AppConfig::default();
        }
    };

    let mut config = match serde_json::from_str::<AppConfig>(&data) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse config file, falling back to defaults"
            );
            return AppConfig::default();
        }
    };

    if migrate_config(&mut config) {
        if let Err(e) = save_config_to_path(path, &config) {
            tracing::warn!(error = %e, "failed to persist migrated config");
        }
    }

    config
}

/// Save config to file
/// Uses atomic write (write to temp file then rename) to prevent corruption
pub fn save_config_to_path(path: &Path, config: &AppConfig) -> Result<()> {
    let config_dir = path
        .parent()
        .ok_or_else(|| HistoryError::Config(format!("invalid config path '{}'", path.display())))?;

    std::fs::create_dir_all(config_dir).map_err(|e| {
        HistoryError::Config(format!(
            "failed to create config directory '{}': {}",
            config_dir.display(),
            e
        ))
    })?;

    let data = serde_json::to_string_pretty(config)?;

    let temp_path = path.with_extension("tmp");

    // Retry for Windows file locking issues
    let mut last_error = None;
    for attempt in 0..3 {
        match std::fs::write(&temp_path, &data) {
            Ok(_) => {
                last_error = None;
                break;
            }
            Err(e) => {
                if attempt < 2 {
                    tracing::warn!(attempt = attempt + 1, error = %e, "config save failed, retrying");
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
                last_error = Some(e);
            }
        }
    }

    if let Some(e) = last_error {
        return Err(HistoryError::Config(format!(
            "failed to write config to temp file (attempted 3 times): {}",
            e
        )));
    }

    std::fs::rename(&temp_path, path)?;

    tracing::debug!(path = %path.display(), "config saved");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn test_dir(prefix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "proxypal-{}-{}",
            prefix,
            uuid::Uuid::new_v4()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn load_config_from_missing_file_returns_defaults() {
        let dir = test_dir("config-missing");
        let path = dir.join("history-config.json");

        let loaded = load_config_from_path(&path);

        assert_eq!(loaded.log_level, "info");
        assert!(loaded.usage_stats_enabled);
        assert!(loaded.data_dir.is_none());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn load_config_from_invalid_json_returns_defaults() {
        let dir = test_dir("config-invalid");
        let path = dir.join("history-config.json");
        fs::write(&path, "{ invalid json").unwrap();

        let loaded = load_config_from_path(&path);

        assert_eq!(loaded.log_level, AppConfig::default().log_level);
        assert!(!loaded.log_json);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn load_config_migrates_legacy_debug_flag() {
        let dir = test_dir("config-migrate");
        let path = dir.join("history-config.json");
        fs::write(&path, r#"{ "debug": true }"#).unwrap();

        let loaded = load_config_from_path(&path);

        assert_eq!(loaded.log_level, "debug");
        assert!(!loaded.debug);

        let persisted = fs::read_to_string(&path).unwrap();
        assert!(persisted.contains("\"logLevel\": \"debug\""));
        assert!(!persisted.contains("\"debug\":"));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn save_then_load_keeps_data_dir() {
        let dir = test_dir("config-save");
        let path = dir.join("nested").join("history-config.json");
        let config = AppConfig {
            data_dir: Some(dir.join("data")),
            usage_stats_enabled: false,
            ..AppConfig::default()
        };

        save_config_to_path(&path, &config).unwrap();
        let loaded = load_config_from_path(&path);

        assert_eq!(loaded.data_dir, Some(dir.join("data")));
        assert!(!loaded.usage_stats_enabled);
        assert_eq!(
            loaded.data_paths().history_path(),
            dir.join("data").join("history.json")
        );
        assert!(!path.with_extension("tmp").exists());

        let _ = fs::remove_dir_all(dir);
    }
}
