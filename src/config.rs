// src/config.rs
//! Registry configuration.
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. Built-in defaults
//! 2. An optional `registry.toml` (or `.json`, `.yaml`) in the working directory
//! 3. Environment variables prefixed `REGISTRY__`, e.g. `REGISTRY__DID_NAMESPACE`
//!
//! The binary loads a `.env` file before reading the environment.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::models::did::join_did;

/// Largest accepted resource payload, in bytes.
pub const DEFAULT_MAX_RESOURCE_SIZE: usize = 200 * 1024;

/// Runtime settings of the registry.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// DID method of owner documents, e.g. `cheqd`.
    pub did_method: String,

    /// DID namespace of owner documents, e.g. `testnet`.
    pub did_namespace: String,

    /// Page size used when scanning the store.
    pub repair_page_size: usize,

    /// Largest accepted resource payload.
    pub max_resource_size: usize,

    /// Genesis file imported by the migration runner.
    #[serde(default)]
    pub genesis_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            did_method: "cheqd".to_string(),
            did_namespace: "testnet".to_string(),
            repair_page_size: 100,
            max_resource_size: DEFAULT_MAX_RESOURCE_SIZE,
            genesis_path: None,
        }
    }
}

impl Settings {
    /// Loads settings from `registry.*` and `REGISTRY__*` variables.
    ///
    /// # Errors
    /// Returns `Err` if a source cannot be parsed or a value has the wrong
    /// type, or if `repair_page_size` is zero.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Config::builder().add_source(File::with_name("registry").required(false)))
    }

    fn load_from(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        let settings: Settings = builder
            .set_default("did_method", defaults.did_method)?
            .set_default("did_namespace", defaults.did_namespace)?
            .set_default("repair_page_size", defaults.repair_page_size as u64)?
            .set_default("max_resource_size", defaults.max_resource_size as u64)?
            .add_source(Environment::with_prefix("REGISTRY").prefix_separator("__").separator("__"))
            .build()?
            .try_deserialize()?;

        if settings.repair_page_size == 0 {
            return Err(ConfigError::Message("repair_page_size must be at least 1".into()));
        }
        Ok(settings)
    }

    /// The owner document id of a collection.
    pub fn collection_did(&self, collection_id: &str) -> String {
        join_did(&self.did_method, &self.did_namespace, collection_id)
    }
}
