//! Configuration for training-store

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use training_engine::EngineConfig;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("training-store")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the database and config file
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// SQLite file name inside `storage_dir`
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Progression rules
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_database_file() -> String {
    "progress.db".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            database_file: default_database_file(),
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get database path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join(&self.database_file)
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use training_engine::ScorePolicy;

    #[test]
    fn test_default_paths() {
        let config = Config {
            storage_dir: PathBuf::from("/var/lib/training"),
            ..Config::default()
        };
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/training/progress.db"));
        assert_eq!(config.config_path(), PathBuf::from("/var/lib/training/config.toml"));
    }

    #[test]
    fn test_engine_table_parsed() {
        let config: Config = toml::from_str(
            r#"
            storage_dir = "/tmp/t"

            [engine]
            score_policy = "latest"
            certificate_prefix = "ACME"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_file, "progress.db");
        assert_eq!(config.engine.score_policy, ScorePolicy::Latest);
        assert_eq!(config.engine.certificate_prefix, "ACME");
        assert!(!config.engine.grant_zero_rewards);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config {
            storage_dir: dir.path().to_path_buf(),
            database_file: "learners.db".to_string(),
            engine: EngineConfig::default(),
        };

        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();

        assert_eq!(loaded.storage_dir, config.storage_dir);
        assert_eq!(loaded.database_file, "learners.db");
        assert_eq!(loaded.engine, config.engine);
    }
}
