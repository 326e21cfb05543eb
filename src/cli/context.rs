use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tourguide::Config;
use tourguide_policy_center::{load_policy_with_options, TourPolicy};

use super::output::OutputFormat;

pub struct CliContext {
    config: Config,
    config_path: PathBuf,
    output: OutputFormat,
}

impl CliContext {
    pub fn new(config: Config, config_path: PathBuf, output: OutputFormat) -> Self {
        Self {
            config,
            config_path,
            output,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }

    /// Builtin defaults overlaid with configured files, the environment and
    /// `overrides`.
    pub fn policy(&self, overrides: Vec<(String, String)>) -> Result<TourPolicy> {
        load_policy_with_options(&self.config.policy_options(overrides))
            .context("Failed to load policy")
    }
}
