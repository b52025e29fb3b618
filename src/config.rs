//! Config System - Composable, Frozen-at-Serve Configuration
//!
//! A `Config` is folded from an ordered list of `ConfigOption`s over an
//! explicit base, then never mutated again.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::hashing::{hash_contents, hash_dir, HashVariant};

/// Reason recorded for hashes registered through configuration.
pub const CONFIG_HASH_REASON: &str = "config";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A client-side code reference: a path, inline code, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Import {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
}

impl Import {
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<Import>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub known_hashes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub no_reload_on_install: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub claim_on_install: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Config {
    /// Compose a config from the zero value.
    pub fn new(options: impl IntoIterator<Item = ConfigOption>) -> Result<Self, ConfigError> {
        ConfigBuilder::new().options(options).build()
    }

    /// Copy with no shared state, via a JSON round-trip.
    pub fn deep_copy(&self) -> Result<Self, ConfigError> {
        let encoded = serde_json::to_vec(self)?;
        Ok(serde_json::from_slice(&encoded)?)
    }

    /// Load a config document of the served shape from disk.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&content)?)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    fn add_known_hashes<I>(&mut self, hashes: I)
    where
        I: IntoIterator<Item = String>,
    {
        for hash in hashes {
            self.known_hashes
                .insert(hash, json!({ "reason": CONFIG_HASH_REASON }));
        }
    }
}

/// One setup-time mutation of a `Config`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOption {
    /// Replace the title. Last write wins.
    Title(String),
    /// Append imports after any already present.
    Imports(Vec<Import>),
    NoReloadOnInstall(bool),
    ClaimOnInstall(bool),
    /// Trust literal hash strings.
    KnownHashes(Vec<String>),
    /// Trust the hashes of in-memory file contents.
    KnownHashesFromContents {
        contents: Vec<Vec<u8>>,
        variants: Vec<HashVariant>,
    },
    /// Trust the hashes of every file under a directory, read at build time.
    KnownHashesFromDir {
        path: PathBuf,
        variants: Vec<HashVariant>,
    },
}

impl ConfigOption {
    pub fn title(title: impl Into<String>) -> Self {
        Self::Title(title.into())
    }

    pub fn imports(imports: impl IntoIterator<Item = Import>) -> Self {
        Self::Imports(imports.into_iter().collect())
    }

    pub fn known_hashes<I, S>(hashes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::KnownHashes(hashes.into_iter().map(Into::into).collect())
    }

    pub fn known_hashes_from_dir(path: impl Into<PathBuf>, variants: &[HashVariant]) -> Self {
        Self::KnownHashesFromDir {
            path: path.into(),
            variants: variants.to_vec(),
        }
    }

    /// Apply this mutation to `config`.
    pub fn apply(&self, config: &mut Config) -> Result<(), ConfigError> {
        match self {
            Self::Title(title) => config.title = title.clone(),
            Self::Imports(imports) => config.imports.extend(imports.iter().cloned()),
            Self::NoReloadOnInstall(value) => config.no_reload_on_install = *value,
            Self::ClaimOnInstall(value) => config.claim_on_install = *value,
            Self::KnownHashes(hashes) => config.add_known_hashes(hashes.iter().cloned()),
            Self::KnownHashesFromContents { contents, variants } => {
                config.add_known_hashes(hash_contents(contents, variants));
            }
            Self::KnownHashesFromDir { path, variants } => {
                let hashes: BTreeSet<String> =
                    hash_dir(path, variants).map_err(|source| ConfigError::Io {
                        path: path.clone(),
                        source,
                    })?;
                tracing::debug!(
                    dir = %path.display(),
                    count = hashes.len(),
                    "registered known hashes from directory"
                );
                config.add_known_hashes(hashes);
            }
        }
        Ok(())
    }
}

/// Ordered option list over an explicit base config.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    base: Config,
    options: Vec<ConfigOption>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a deployment-wide default instead of the zero value.
    pub fn from_base(base: Config) -> Self {
        Self {
            base,
            options: vec![],
        }
    }

    pub fn option(mut self, option: ConfigOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn options(mut self, options: impl IntoIterator<Item = ConfigOption>) -> Self {
        self.options.extend(options);
        self
    }

    pub fn title(self, title: impl Into<String>) -> Self {
        self.option(ConfigOption::title(title))
    }

    pub fn imports(self, imports: impl IntoIterator<Item = Import>) -> Self {
        self.option(ConfigOption::imports(imports))
    }

    pub fn no_reload_on_install(self, value: bool) -> Self {
        self.option(ConfigOption::NoReloadOnInstall(value))
    }

    pub fn claim_on_install(self, value: bool) -> Self {
        self.option(ConfigOption::ClaimOnInstall(value))
    }

    pub fn known_hashes<I, S>(self, hashes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.option(ConfigOption::known_hashes(hashes))
    }

    pub fn known_hashes_from_dir(self, path: impl Into<PathBuf>, variants: &[HashVariant]) -> Self {
        self.option(ConfigOption::known_hashes_from_dir(path, variants))
    }

    /// Deep-copy the base and fold every option over it, in order.
    ///
    /// The base is never touched, so the builder can be built repeatedly.
    pub fn build(&self) -> Result<Config, ConfigError> {
        let mut config = self.base.deep_copy()?;
        for option in &self.options {
            option.apply(&mut config)?;
        }
        Ok(config)
    }
}
