//! Application configuration
//!
//! Read from `config/config.yaml` when present, otherwise from
//! `<config_dir>/tourguide/config.yaml`. Every field has a default so a
//! missing file is not an error.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use flow_cache::HttpFetcherConfig;
use route_matcher::RouteParams;
use serde::{Deserialize, Serialize};
use tourguide_policy_center::LoadOptions;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Policy overlay files, applied in order.
    pub policy_paths: Vec<PathBuf>,

    /// Endpoint answering flow batch requests.
    pub flow_endpoint: Option<String>,

    /// Flow request timeout
    pub fetch_timeout_ms: u64,

    /// Values for `{{name}}` route placeholders.
    pub route_params: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy_paths: Vec::new(),
            flow_endpoint: None,
            fetch_timeout_ms: 10_000,
            route_params: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn route_params(&self) -> RouteParams {
        self.route_params
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect()
    }

    pub fn fetcher_config(&self) -> Option<HttpFetcherConfig> {
        self.flow_endpoint.as_ref().map(|endpoint| {
            let mut config = HttpFetcherConfig::new(endpoint.clone());
            config.timeout = Duration::from_millis(self.fetch_timeout_ms.max(1));
            config
        })
    }

    /// Policy load options: configured files, environment, then `overrides`.
    pub fn policy_options(&self, overrides: Vec<(String, String)>) -> LoadOptions {
        LoadOptions {
            paths: self.policy_paths.clone(),
            include_env: true,
            cli_overrides: overrides,
        }
    }
}

/// `<config_dir>/tourguide/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tourguide").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            "flow_endpoint: https://flows.test/batch\nroute_params:\n  orgId: \"42\"\n",
        )
        .unwrap();
        assert_eq!(config.fetch_timeout_ms, 10_000);
        assert!(config.policy_paths.is_empty());
        assert_eq!(config.route_params().get("orgId"), Some("42"));

        let fetcher = config.fetcher_config().unwrap();
        assert_eq!(fetcher.endpoint, "https://flows.test/batch");
        assert_eq!(fetcher.timeout, Duration::from_secs(10));
    }

    #[test]
    fn no_endpoint_means_no_fetcher() {
        assert!(Config::default().fetcher_config().is_none());
    }

    #[test]
    fn cli_overrides_are_passed_through() {
        let config = Config {
            policy_paths: vec![PathBuf::from("policy.yaml")],
            ..Config::default()
        };
        let options = config.policy_options(vec![("cache.capacity".into(), "5".into())]);
        assert_eq!(options.paths, vec![PathBuf::from("policy.yaml")]);
        assert!(options.include_env);
        assert_eq!(options.cli_overrides.len(), 1);
    }
}
