//! Configuration loading.
//!
//! Settings come from a TOML file with four sections, each of which may be
//! omitted:
//!
//! ```toml
//! [store]
//! path = "./data"                # required for import, init, rebuild
//!
//! [backend]
//! kind = "elasticsearch"        # or "embedded"
//! url = "http://localhost:9200"
//! index = "rsp"
//!
//! [query]
//! results_max = 1000
//! batch_size = 50
//! excerpt_chars = 200
//!
//! [server]
//! bind = "0.0.0.0:5000"
//! ```
//!
//! `RSP_DATA_PATH` and `RSP_SEARCH_URL` override `store.path` and
//! `backend.url`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file used when `--config` is not given. Optional.
pub const DEFAULT_CONFIG_PATH: &str = "./config/rsp.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreConfig {
    /// Raw store root. No default: commands that touch the store fail
    /// when neither this nor `RSP_DATA_PATH` is set.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn require_path(&self) -> Result<&Path> {
        self.path
            .as_deref()
            .context("no raw store path: set [store].path or RSP_DATA_PATH")
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Elasticsearch,
    Embedded,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: BackendKind,
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default = "default_index_name")]
    pub index: String,
    /// Directory for on-disk embedded indexes; RAM when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    /// Give up waiting for the backend after this many probes; unbounded when absent.
    #[serde(default)]
    pub probe_max_attempts: Option<u32>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            url: default_backend_url(),
            index: default_index_name(),
            path: None,
            probe_interval_ms: default_probe_interval_ms(),
            probe_max_attempts: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_backend_kind() -> BackendKind {
    BackendKind::Elasticsearch
}
fn default_backend_url() -> String {
    "http://localhost:9200".to_string()
}
fn default_index_name() -> String {
    "rsp".to_string()
}
fn default_probe_interval_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    #[serde(default = "default_results_max")]
    pub results_max: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            results_max: default_results_max(),
            batch_size: default_batch_size(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

fn default_results_max() -> usize {
    1000
}
fn default_batch_size() -> usize {
    50
}
fn default_excerpt_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

impl BackendConfig {
    pub fn retry_policy(&self) -> crate::retry::RetryPolicy {
        let interval = std::time::Duration::from_millis(self.probe_interval_ms);
        match self.probe_max_attempts {
            Some(max) => crate::retry::RetryPolicy::bounded(interval, max),
            None => crate::retry::RetryPolicy::forever(interval),
        }
    }
}

/// Load the configuration.
///
/// With `path = None` the default location is tried and a missing file means
/// built-in defaults. An explicit path must exist.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => parse_file(path)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                parse_file(default)?
            } else {
                Config::default()
            }
        }
    };
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

fn parse_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| "Failed to parse config file")
}

/// Apply `RSP_DATA_PATH` / `RSP_SEARCH_URL` from `lookup`.
pub fn apply_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup("RSP_DATA_PATH").filter(|v| !v.is_empty()) {
        config.store.path = Some(PathBuf::from(path));
    }
    if let Some(url) = lookup("RSP_SEARCH_URL").filter(|v| !v.is_empty()) {
        config.backend.url = url;
    }
}

pub fn validate(config: &Config) -> Result<()> {
    let index = &config.backend.index;
    if index.is_empty() {
        bail!("backend.index must not be empty");
    }
    if index.chars().any(|c| c.is_ascii_uppercase() || c.is_whitespace() || c == '/') {
        bail!(
            "backend.index '{}' must be lowercase, without spaces or slashes",
            index
        );
    }
    if config.backend.kind == BackendKind::Elasticsearch && config.backend.url.is_empty() {
        bail!("backend.url must be set for the elasticsearch backend");
    }
    if config.backend.probe_interval_ms == 0 {
        bail!("backend.probe_interval_ms must be > 0");
    }
    if config.query.results_max == 0 {
        bail!("query.results_max must be > 0");
    }
    if config.query.batch_size == 0 {
        bail!("query.batch_size must be > 0");
    }
    if config.query.excerpt_chars < 3 {
        bail!("query.excerpt_chars must be >= 3");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.store.path, None);
        assert!(config.store.require_path().is_err());
        assert_eq!(config.backend.kind, BackendKind::Elasticsearch);
        assert_eq!(config.backend.url, "http://localhost:9200");
        assert_eq!(config.backend.index, "rsp");
        assert_eq!(config.query, QueryConfig { results_max: 1000, batch_size: 50, excerpt_chars: 200 });
        assert_eq!(config.server.bind, "0.0.0.0:5000");
        validate(&config).unwrap();
    }

    #[test]
    fn parses_partial_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rsp.toml");
        std::fs::write(
            &path,
            r#"
[store]
path = "/srv/rsp"

[backend]
kind = "embedded"
path = "/srv/rsp-index"

[query]
batch_size = 20
"#,
        )
        .unwrap();
        let config = parse_file(&path).unwrap();
        assert_eq!(config.store.require_path().unwrap(), Path::new("/srv/rsp"));
        assert_eq!(config.backend.kind, BackendKind::Embedded);
        assert_eq!(config.backend.path, Some(PathBuf::from("/srv/rsp-index")));
        assert_eq!(config.query.batch_size, 20);
        assert_eq!(config.query.results_max, 1000);
        assert_eq!(config.server.bind, "0.0.0.0:5000");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(load_config(Some(&tmp.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn bad_values_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rsp.toml");
        std::fs::write(&path, "[backend]\nkind = \"solr\"\n").unwrap();
        assert!(load_config(Some(&path)).is_err());

        let mut config = Config::default();
        config.query.batch_size = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.backend.index = "My Index".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn env_overrides() {
        let mut config = Config::default();
        apply_overrides(&mut config, |key| match key {
            "RSP_DATA_PATH" => Some("/tmp/data".into()),
            "RSP_SEARCH_URL" => Some("http://es:9200".into()),
            _ => None,
        });
        assert_eq!(config.store.path, Some(PathBuf::from("/tmp/data")));
        assert_eq!(config.backend.url, "http://es:9200");

        let mut config = Config::default();
        apply_overrides(&mut config, |_| Some(String::new()));
        assert_eq!(config.store.path, None);
    }

    #[test]
    fn retry_policy_from_config() {
        let mut backend = BackendConfig::default();
        assert_eq!(backend.retry_policy().max_attempts, None);
        backend.probe_max_attempts = Some(3);
        backend.probe_interval_ms = 10;
        let policy = backend.retry_policy();
        assert_eq!(policy.max_attempts, Some(3));
        assert_eq!(policy.interval, std::time::Duration::from_millis(10));
    }
}
