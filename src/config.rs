use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path, or `:memory:` for a private in-memory database
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_local_path")]
    pub local_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

// Default values
fn default_db_path() -> String {
    "data/filevault.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_local_path() -> String {
    "data/files".to_string()
}

fn default_max_age_days() -> i64 {
    3
}

fn default_interval_secs() -> u64 {
    3600
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_path: default_local_path(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl DatabaseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

impl SweepConfig {
    /// Retention threshold in seconds
    pub fn max_age_secs(&self) -> i64 {
        self.max_age_days.saturating_mul(86_400)
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.ensure_directories()?;
        tracing::info!(
            "Storage config: database={}, files={}, max_age_days={}",
            config.database.path,
            config.storage.local_path,
            config.sweep.max_age_days
        );
        Ok(config)
    }

    /// Load configuration from filevault.toml or config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = [
            "filevault.toml",
            "config.toml",
            "data/filevault.toml",
            "data/config.toml",
        ];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config: Config = toml::from_str(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    /// Apply environment variable overrides
    /// Format: FV_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Database overrides
        if let Some(val) = lookup("FV_CONF_DATABASE_PATH") {
            self.database.path = val;
        }
        if let Some(val) = lookup("FV_CONF_DATABASE_MAX_CONNECTIONS") {
            if let Ok(n) = val.parse() {
                self.database.max_connections = n;
            }
        }

        // Storage overrides
        if let Some(val) = lookup("FV_CONF_STORAGE_LOCAL_PATH") {
            if !val.trim().is_empty() {
                self.storage.local_path = val;
            }
        }

        // Sweep overrides
        if let Some(val) = lookup("FV_CONF_SWEEP_MAX_AGE_DAYS") {
            if let Ok(days) = val.parse() {
                self.sweep.max_age_days = days;
            }
        }
        if let Some(val) = lookup("FV_CONF_SWEEP_INTERVAL_SECS") {
            if let Ok(secs) = val.parse() {
                self.sweep.interval_secs = secs;
            }
        }
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        if !self.database.is_in_memory() {
            if let Some(parent) = Path::new(&self.database.path).parent() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::create_dir_all(&self.storage.local_path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database.path, "data/filevault.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.storage.local_path, "data/files");
        assert_eq!(config.sweep.max_age_secs(), 3 * 86_400);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            local_path = "/srv/files"

            [sweep]
            max_age_days = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.local_path, "/srv/files");
        assert_eq!(config.sweep.max_age_days, 7);
        assert_eq!(config.sweep.interval_secs, 3600);
        assert_eq!(config.database.path, "data/filevault.db");
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FV_CONF_DATABASE_PATH", ":memory:"),
            ("FV_CONF_DATABASE_MAX_CONNECTIONS", "not-a-number"),
            ("FV_CONF_STORAGE_LOCAL_PATH", "  "),
            ("FV_CONF_SWEEP_INTERVAL_SECS", "60"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert!(config.database.is_in_memory());
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.storage.local_path, "data/files");
        assert_eq!(config.sweep.interval_secs, 60);
    }
}
