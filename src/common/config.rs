//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};
use crate::testing::timeout::Timeouts;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Default timeouts per operation kind
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Keep created objects instead of deleting them after each step
    #[serde(default)]
    pub skip_delete: bool,

    /// Stop scheduling tests after the first failure
    #[serde(default)]
    pub fail_fast: bool,

    /// Number of tests run concurrently
    #[serde(default = "default_parallel")]
    pub parallel: usize,

    /// Override termination grace periods of pods created by tests
    #[serde(default, with = "super::duration::option")]
    pub force_termination_grace_period: Option<Duration>,

    /// Run every test in this namespace instead of a generated one
    #[serde(default)]
    pub namespace: Option<String>,

    /// File name looked up when walking test directories
    #[serde(default = "default_test_file")]
    pub test_file: String,

    /// Report settings
    #[serde(default)]
    pub report: ReportConfig,

    /// kubectl settings
    #[serde(default)]
    pub kubectl: KubectlConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            skip_delete: false,
            fail_fast: false,
            parallel: default_parallel(),
            force_termination_grace_period: None,
            namespace: None,
            test_file: default_test_file(),
            report: ReportConfig::default(),
            kubectl: KubectlConfig::default(),
        }
    }
}

fn default_parallel() -> usize {
    4
}

fn default_test_file() -> String {
    "kubestep-test.yaml".to_string()
}

/// Report output settings
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    /// Write a JSON report here when set
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// How to reach the cluster through kubectl
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct KubectlConfig {
    /// kubectl binary; looked up in PATH when unset
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// kubeconfig context to use
    #[serde(default)]
    pub context: Option<String>,

    /// kubeconfig file to use
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit file, which must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        if config.parallel == 0 {
            return Err(Error::Config("parallel must be at least 1".to_string()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.parallel, 4);
        assert_eq!(config.test_file, "kubestep-test.yaml");
        assert!(!config.skip_delete);
        assert!(config.report.path.is_none());
    }

    #[test]
    fn test_parse_full() {
        let config = Config::parse(
            r#"
skip_delete = true
parallel = 2
force_termination_grace_period = "5s"
namespace = "shared"

[timeouts]
assert = "1m"
exec = "10s"

[report]
path = "out/report.json"

[kubectl]
context = "kind-kind"
"#,
        )
        .unwrap();
        assert!(config.skip_delete);
        assert_eq!(config.parallel, 2);
        assert_eq!(config.force_termination_grace_period, Some(Duration::from_secs(5)));
        assert_eq!(config.timeouts.assert, Some(Duration::from_secs(60)));
        assert_eq!(config.timeouts.exec, Some(Duration::from_secs(10)));
        assert_eq!(config.report.path, Some(PathBuf::from("out/report.json")));
        assert_eq!(config.kubectl.context.as_deref(), Some("kind-kind"));
    }

    #[test]
    fn test_rejects_unknown_keys_and_zero_parallel() {
        assert!(matches!(Config::parse("paralel = 2"), Err(Error::ConfigParse(_))));
        assert!(matches!(Config::parse("parallel = 0"), Err(Error::Config(_))));
    }
}
