use std::collections::HashMap;
use std::env;

use tourney_core::config::{
    value_or_default, ConfigError, EngineConfig, DATABASE_PATH_VAR, DEFAULT_DATABASE_PATH,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Publication store file; `:memory:` for an ephemeral store
    pub database_path: String,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "TOURNEY_API_BIND_ADDR", "127.0.0.1:8080");
        let database_path = value_or_default(&lookup, DATABASE_PATH_VAR, DEFAULT_DATABASE_PATH);
        let engine = EngineConfig::from_lookup(&lookup)?;

        Ok(Self {
            bind_addr,
            database_path,
            engine,
        })
    }
}
