//! Configuration loading and validation.

mod types;
mod validation;

pub use types::{Config, ConnectionProfile, Dialect, JobRequest, MigrationJob, TablePair, TableRef};

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.source.validate()?;
        config.dest.validate()?;
        Ok(config)
    }

    /// Build the validated migration job described by this configuration.
    pub fn into_job(self) -> Result<MigrationJob> {
        self.job.into_job(self.source, self.dest)
    }
}
