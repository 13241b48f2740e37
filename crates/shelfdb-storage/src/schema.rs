//! Object store and index definitions.
//!
//! Definitions are plain serde structs so a database layout can be written
//! in a configuration file.

use serde::{Deserialize, Serialize};
use shelfdb_common::{EngineErrorKind, KeyPath, Result, ShelfError};

/// Definition of an object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSchema {
    pub name: String,
    /// In-line key path. `None` means keys are supplied out of line.
    #[serde(default)]
    pub key_path: Option<KeyPath>,
    /// Generate numeric keys when none is supplied.
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default)]
    pub indexes: Vec<IndexSchema>,
}

impl StoreSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: None,
            auto_increment: false,
            indexes: Vec::new(),
        }
    }

    pub fn key_path(mut self, key_path: impl Into<KeyPath>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn index(mut self, index: IndexSchema) -> Self {
        self.indexes.push(index);
        self
    }

    /// Check the definition for combinations the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ShelfError::engine(
                EngineErrorKind::InvalidAccess,
                "object store name must not be empty",
            ));
        }
        if self.auto_increment {
            match &self.key_path {
                Some(KeyPath::Single(path)) if path.is_empty() => {
                    return Err(ShelfError::engine(
                        EngineErrorKind::InvalidAccess,
                        format!(
                            "store '{}' cannot combine a key generator with an empty key path",
                            self.name
                        ),
                    ));
                }
                Some(KeyPath::Compound(_)) => {
                    return Err(ShelfError::engine(
                        EngineErrorKind::InvalidAccess,
                        format!(
                            "store '{}' cannot combine a key generator with a compound key path",
                            self.name
                        ),
                    ));
                }
                _ => {}
            }
        }

        let mut seen = std::collections::HashSet::new();
        for index in &self.indexes {
            if !seen.insert(index.name.as_str()) {
                return Err(ShelfError::constraint(format!(
                    "index '{}' is defined twice on store '{}'",
                    index.name, self.name
                )));
            }
            index.validate()?;
        }
        Ok(())
    }
}

/// Definition of a secondary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    /// Defaults to the field named like the index.
    #[serde(default)]
    pub key_path: Option<KeyPath>,
    #[serde(default)]
    pub unique: bool,
    /// Index every element of an array value separately.
    #[serde(default)]
    pub multi_entry: bool,
}

impl IndexSchema {
    /// An index over the field with the same name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: None,
            unique: false,
            multi_entry: false,
        }
    }

    pub fn on(mut self, key_path: impl Into<KeyPath>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn multi_entry(mut self) -> Self {
        self.multi_entry = true;
        self
    }

    /// Key path actually used to derive index keys.
    pub fn resolved_key_path(&self) -> KeyPath {
        self.key_path
            .clone()
            .unwrap_or_else(|| KeyPath::Single(self.name.clone()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.multi_entry && matches!(self.resolved_key_path(), KeyPath::Compound(_)) {
            return Err(ShelfError::engine(
                EngineErrorKind::InvalidAccess,
                format!("multi-entry index '{}' cannot use a compound key path", self.name),
            ));
        }
        Ok(())
    }
}
