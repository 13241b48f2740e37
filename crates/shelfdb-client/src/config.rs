use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use shelfdb_common::{Result, ShelfError};
use shelfdb_storage::StoreSchema;

/// Database opened by `Database::open_in_memory`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub name: String,
    /// Schema version reported by the engine.
    pub version: u32,
    /// Object stores created when the database opens.
    pub stores: Vec<StoreSchema>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: "shelfdb".to_string(),
            version: 1,
            stores: Vec::new(),
        }
    }
}

impl DatabaseConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_store(mut self, store: StoreSchema) -> Self {
        self.stores.push(store);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ShelfError::Config("database name must not be empty".into()));
        }
        if self.version == 0 {
            return Err(ShelfError::Config("database version must be at least 1".into()));
        }
        Ok(())
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set (default: "info").
    pub level: String,
    /// Colourise output (default: true)
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from TOML file, with environment variable overrides.
    /// Falls back to defaults if file is not found. SHELFDB_CONFIG env var overrides the path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        ConfigLoader.load(path)
    }
}

/// Resolves configuration from file and environment variables.
struct ConfigLoader;

impl ConfigLoader {
    fn load<P: AsRef<Path>>(&self, default_path: P) -> anyhow::Result<Config> {
        let cfg_path = match env::var("SHELFDB_CONFIG") {
            Ok(env_path) => PathBuf::from(env_path),
            Err(_) => default_path.as_ref().to_path_buf(),
        };

        let mut cfg = match fs::read_to_string(&cfg_path) {
            Ok(s) => toml::from_str(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e.into()),
        };
        Self::apply_env_overrides(&mut cfg);
        cfg.database.validate()?;
        Ok(cfg)
    }

    /// Apply SHELFDB_* environment variable overrides.
    fn apply_env_overrides(cfg: &mut Config) {
        if let Ok(v) = env::var("SHELFDB_DATABASE") {
            cfg.database.name = v;
        }

        if let Ok(v) = env::var("SHELFDB_LOG") {
            cfg.logging.level = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use shelfdb_common::KeyPath;

    #[test]
    fn parses_store_definitions() {
        let cfg: Config = toml::from_str(
            r#"
            [database]
            name = "library"
            version = 3

            [[database.stores]]
            name = "books"
            key_path = "isbn"

            [[database.stores.indexes]]
            name = "author"

            [[database.stores.indexes]]
            name = "by_tag"
            key_path = "tags"
            multi_entry = true

            [[database.stores]]
            name = "loans"
            auto_increment = true

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.database.name, "library");
        assert_eq!(cfg.database.version, 3);
        assert_eq!(cfg.database.stores.len(), 2);
        let books = &cfg.database.stores[0];
        assert_eq!(books.key_path, Some(KeyPath::from("isbn")));
        assert_eq!(books.indexes[0].resolved_key_path(), KeyPath::from("author"));
        assert!(books.indexes[1].multi_entry);
        assert!(cfg.database.stores[1].auto_increment);
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.logging.ansi);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn rejects_zero_version() {
        let cfg = DatabaseConfig {
            version: 0,
            ..DatabaseConfig::default()
        };
        assert_eq!(cfg.validate().unwrap_err().kind(), "config_error");
    }
}
