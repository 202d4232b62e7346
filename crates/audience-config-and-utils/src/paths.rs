//! File system paths.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Resolves where the audience service keeps its files.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.audience)
    base_dir: PathBuf,
}

impl Paths {
    /// Use `~/.audience` as the base directory.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".audience"),
        })
    }

    /// Use a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// `<base>/config.json`
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// `<base>/audience.sqlite`, holding the hit queue and the stored profile.
    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join("audience.sqlite")
    }

    /// `<base>/logs`
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// `<base>/logs/audience.jsonl`
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("audience.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
