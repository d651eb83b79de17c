use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub const CONFIG_ENV: &str = "ESXI_EXPORTER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "esxi-exporter.yaml";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ExporterConfig {
    pub listen_address: String,
    pub metrics_path: String,
    pub log_level: String,
    pub scheme: Scheme,
    pub connect_timeout_secs: u64,
    pub query_timeout_secs: u64,
    pub hosts: Vec<HostTarget>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Https,
    /// Plain HTTP, only meant for local SDK stubs.
    Http,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Https => "https",
            Scheme::Http => "http",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HostTarget {
    pub address: String,
    pub username: String,
    pub password: String,
}

impl HostTarget {
    pub fn new(address: &str, username: &str, password: &str) -> Self {
        Self {
            address: address.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub fn sdk_url(&self, scheme: Scheme) -> String {
        format!("{}://{}/sdk", scheme.as_str(), self.address)
    }
}

// le mot de passe ne sort jamais dans les logs
impl fmt::Debug for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostTarget")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:9601".into(),
            metrics_path: "/metrics".into(),
            log_level: "info".into(),
            scheme: Scheme::Https,
            connect_timeout_secs: 10,
            query_timeout_secs: 10,
            hosts: Vec::new(),
        }
    }
}

impl ExporterConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Go-style `:9601` means every interface.
    pub fn bind_address(&self) -> String {
        if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        }
    }

    pub fn from_yaml(txt: &str) -> Result<Self> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: ExporterConfig = serde_yaml::from_str(txt).context("invalid exporter config")?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.metrics_path.starts_with('/') || self.metrics_path == "/" {
            bail!("metrics_path must start with '/' and cannot be the root path: {:?}", self.metrics_path);
        }
        if self.metrics_path == "/health" {
            bail!("metrics_path /health is reserved for the liveness endpoint");
        }
        if self.connect_timeout_secs == 0 || self.query_timeout_secs == 0 {
            bail!("timeouts must be greater than zero");
        }

        let mut seen = HashSet::new();
        for host in &self.hosts {
            if host.address.trim().is_empty() {
                bail!("host entry with an empty address");
            }
            if !seen.insert(host.address.as_str()) {
                bail!("host {} is configured more than once", host.address);
            }
        }
        Ok(())
    }
}

/// `explicit`, else `$ESXI_EXPORTER_CONFIG`, else `esxi-exporter.yaml`.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(p) => p.to_path_buf(),
        None => std::env::var(CONFIG_ENV)
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into())
            .into(),
    }
}

/// A missing file yields the defaults (no hosts); an unreadable or malformed one is an error.
/// Not validated here: CLI overrides still apply, `validate()` runs after them.
pub async fn load_config(path: &Path) -> Result<ExporterConfig> {
    let cfg = if path.exists() {
        let txt = fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        ExporterConfig::from_yaml(&txt).with_context(|| format!("in {}", path.display()))?
    } else {
        ExporterConfig::default()
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
listen_address: "127.0.0.1:9700"
connect_timeout_secs: 3
hosts:
  - address: 10.40.92.2
    username: root
    password: "s3cret"
  - address: 10.40.92.238
    username: monitor
    password: "other"
"#;

    #[test]
    fn test_defaults() {
        let cfg = ExporterConfig::default();
        assert_eq!(cfg.listen_address, "0.0.0.0:9601");
        assert_eq!(cfg.metrics_path, "/metrics");
        assert_eq!(cfg.scheme, Scheme::Https);
        assert!(cfg.hosts.is_empty());
        cfg.validate().unwrap();
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg = ExporterConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(cfg.listen_address, "127.0.0.1:9700");
        assert_eq!(cfg.metrics_path, "/metrics");
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(3));
        assert_eq!(cfg.query_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.hosts.len(), 2);
        assert_eq!(cfg.hosts[1].username, "monitor");
        assert_eq!(cfg.hosts[0].sdk_url(cfg.scheme), "https://10.40.92.2/sdk");
    }

    #[test]
    fn test_bind_address_accepts_port_only_form() {
        let mut cfg = ExporterConfig::default();
        assert_eq!(cfg.bind_address(), "0.0.0.0:9601");
        cfg.listen_address = ":9700".into();
        assert_eq!(cfg.bind_address(), "0.0.0.0:9700");
    }

    #[test]
    fn test_config_path_prefers_explicit() {
        assert_eq!(config_path(Some(Path::new("/etc/esxi.yaml"))), PathBuf::from("/etc/esxi.yaml"));
    }

    #[test]
    fn test_validation_rejects_duplicates_and_bad_paths() {
        let mut cfg = ExporterConfig::from_yaml(SAMPLE).unwrap();
        cfg.hosts.push(HostTarget::new("10.40.92.2", "root", "x"));
        assert!(cfg.validate().is_err());

        let mut cfg = ExporterConfig::default();
        cfg.metrics_path = "/".into();
        assert!(cfg.validate().is_err());
        cfg.metrics_path = "metrics".into();
        assert!(cfg.validate().is_err());
        cfg.metrics_path = "/health".into();
        assert!(cfg.validate().is_err());

        let mut cfg = ExporterConfig::default();
        cfg.hosts.push(HostTarget::new("  ", "root", "x"));
        assert!(cfg.validate().is_err());

        let mut cfg = ExporterConfig::default();
        cfg.query_timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let target = HostTarget::new("10.0.0.1", "root", "hunter2");
        let printed = format!("{target:?}");
        assert!(printed.contains("10.0.0.1"));
        assert!(!printed.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let cfg = load_config(file.path()).await.unwrap();
        assert_eq!(cfg.hosts.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("absent.yaml")).await.unwrap();
        assert!(cfg.hosts.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hosts: [not, a, host]").unwrap();
        assert!(load_config(file.path()).await.is_err());
    }
}
