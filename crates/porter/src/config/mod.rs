//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use crate::connection::ConnectionDescriptor;
use crate::error::{PorterError, Result};

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Resolve a connection alias into a descriptor.
    pub fn connection(&self, alias: &str) -> Result<ConnectionDescriptor> {
        self.connections
            .iter()
            .find(|c| c.alias == alias)
            .map(ConnectionDescriptor::from_config)
            .ok_or_else(|| PorterError::Config(format!("unknown connection alias '{}'", alias)))
    }

    /// All configured aliases.
    pub fn aliases(&self) -> Vec<&str> {
        self.connections.iter().map(|c| c.alias.as_str()).collect()
    }
}
