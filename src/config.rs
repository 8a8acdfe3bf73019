use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub praxis: PraxisConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

/// Core settings: where the knowledge store lives.
#[derive(Debug, Clone, Deserialize)]
pub struct PraxisConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Similarity-index configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SimilarityConfig {
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default)]
    pub min_score: f32,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            default_k: default_k(),
            min_score: 0.0,
        }
    }
}

/// Traversal cost bounds
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default = "default_visited_budget")]
    pub visited_budget: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            visited_budget: default_visited_budget(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_dimensions() -> usize {
    1536
}

fn default_k() -> usize {
    5
}

fn default_max_hops() -> usize {
    5
}

fn default_visited_budget() -> usize {
    10_000
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in PRAXIS_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let config_path = std::env::var("PRAXIS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .context("Failed to parse config.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.similarity.dimensions == 0 {
            anyhow::bail!("similarity.dimensions must be greater than 0");
        }

        if self.similarity.default_k == 0 {
            anyhow::bail!("similarity.default_k must be greater than 0");
        }

        if self.similarity.min_score < -1.0 || self.similarity.min_score > 1.0 {
            anyhow::bail!("similarity.min_score must be between -1.0 and 1.0 (cosine range)");
        }

        if self.graph.max_hops == 0 {
            anyhow::bail!("graph.max_hops must be greater than 0");
        }

        if self.graph.visited_budget == 0 {
            anyhow::bail!("graph.visited_budget must be greater than 0");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.praxis.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    fn write_config(temp_dir: &TempDir, body: &str) -> PathBuf {
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, body).unwrap();
        config_path.canonicalize().unwrap()
    }

    fn with_config_env(config_path: &Path, f: impl FnOnce()) {
        let original = std::env::var("PRAXIS_CONFIG").ok();
        std::env::set_var("PRAXIS_CONFIG", config_path.to_str().unwrap());
        f();
        std::env::remove_var("PRAXIS_CONFIG");
        if let Some(val) = original {
            std::env::set_var("PRAXIS_CONFIG", val);
        }
    }

    #[test]
    fn test_config_load_success() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = write_config(
            &temp_dir,
            r#"
[praxis]
db_path = "./praxis.db"
log_level = "debug"

[similarity]
dimensions = 8
default_k = 3
min_score = 0.25

[graph]
max_hops = 4
visited_budget = 500
"#,
        );
        with_config_env(&config_path, || {
            let config = Config::load();
            assert!(config.is_ok(), "Config::load() failed: {:?}", config.err());
            let config = config.unwrap();
            assert_eq!(config.praxis.log_level, "debug");
            assert_eq!(config.similarity.dimensions, 8);
            assert_eq!(config.similarity.default_k, 3);
            assert_eq!(config.graph.max_hops, 4);
        });
    }

    #[test]
    fn test_config_defaults() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = write_config(
            &temp_dir,
            r#"
[praxis]
db_path = "./praxis.db"
"#,
        );
        with_config_env(&config_path, || {
            let config = Config::load().unwrap();
            assert_eq!(config.praxis.log_level, "info");
            assert_eq!(config.similarity.dimensions, 1536);
            assert_eq!(config.similarity.default_k, 5);
            assert_eq!(config.similarity.min_score, 0.0);
            assert_eq!(config.graph.max_hops, 5);
            assert_eq!(config.graph.visited_budget, 10_000);
        });
    }

    #[test]
    fn test_config_rejects_bad_min_score() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = write_config(
            &temp_dir,
            r#"
[praxis]
db_path = "./praxis.db"

[similarity]
min_score = 1.5
"#,
        );
        with_config_env(&config_path, || {
            let config = Config::load();
            assert!(config.is_err());
            assert!(config.unwrap_err().to_string().contains("min_score"));
        });
    }

    #[test]
    fn test_config_rejects_zero_budget() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = write_config(
            &temp_dir,
            r#"
[praxis]
db_path = "./praxis.db"

[graph]
visited_budget = 0
"#,
        );
        with_config_env(&config_path, || {
            assert!(Config::load().is_err());
        });
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("PRAXIS_CONFIG").ok();
        std::env::set_var("PRAXIS_CONFIG", "nonexistent.toml");
        let config = Config::load();
        assert!(config.is_err());
        std::env::remove_var("PRAXIS_CONFIG");
        if let Some(v) = original {
            std::env::set_var("PRAXIS_CONFIG", v);
        }
    }
}
