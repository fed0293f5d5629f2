use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Connection settings for a manager's store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Database file; in-memory when absent
    pub database: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    /// SQLite journal mode, e.g. "wal"
    pub journal_mode: Option<String>,
    pub foreign_keys: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            database: None,
            busy_timeout_ms: 5000,
            journal_mode: None,
            foreign_keys: true,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("entity-manager.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".entity-manager").join("entities.db")
}

pub fn load_config(path: Option<&Path>) -> Result<Option<ManagerConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: ManagerConfig = toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &ManagerConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        )));
    }

    let contents = toml::to_string_pretty(config).map_err(|e| Error::Config(e.to_string()))?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
