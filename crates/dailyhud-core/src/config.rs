//! Configuration structures for daily-hud

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HudError, Result};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "~/.config/daily-hud/config.yaml";

/// Main configuration for daily-hud
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Secret name -> 1Password reference (`op://Vault/Item/field`)
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub todoist: TodoistConfig,

    #[serde(default)]
    pub github: GithubConfig,

    #[serde(default)]
    pub kubernetes: KubernetesConfig,

    #[serde(default)]
    pub truenas: TruenasConfig,

    #[serde(default)]
    pub ssh_hosts: Vec<SshHostConfig>,

    #[serde(default)]
    pub windows_hosts: Vec<WindowsHostConfig>,

    /// Certificate targets: `host`, `host:port` or `https://...`
    #[serde(default)]
    pub certificates: Vec<String>,

    #[serde(default)]
    pub domains: Vec<String>,

    #[serde(default)]
    pub cves: CveConfig,

    #[serde(default)]
    pub containers: ContainerConfig,
}

/// Alerting thresholds shared by several checks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub check_timeout_seconds: u64,
    pub disk_warning_percent: u32,
    pub disk_critical_percent: u32,
    pub cert_warning_days: i64,
    pub cert_critical_days: i64,
    pub domain_warning_days: i64,
    pub snapshot_stale_hours: i64,
    pub pod_memory_warning_percent: u32,
    pub pod_cpu_warning_percent: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            check_timeout_seconds: 30,
            disk_warning_percent: 80,
            disk_critical_percent: 90,
            cert_warning_days: 14,
            cert_critical_days: 7,
            domain_warning_days: 30,
            snapshot_stale_hours: 24,
            pod_memory_warning_percent: 80,
            pod_cpu_warning_percent: 80,
        }
    }
}

impl Thresholds {
    /// Per-check timeout used by the orchestrator
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_seconds.max(1))
    }
}

/// On-disk cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub directory: String,
    pub durations: CacheDurations,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: "~/.cache/daily-hud".to_string(),
            durations: CacheDurations::default(),
        }
    }
}

/// Whole-namespace expiry windows, in hours
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheDurations {
    pub domains: u64,
    pub cves: u64,
    pub container_vulns: u64,
}

impl Default for CacheDurations {
    fn default() -> Self {
        Self {
            domains: 24,
            cves: 12,
            container_vulns: 6,
        }
    }
}

/// Convert a cache duration in hours to a `Duration`
pub fn hours(h: u64) -> Duration {
    Duration::from_secs(h * 3600)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TodoistConfig {
    /// Only report tasks from these project ids
    pub projects: Vec<String>,
    pub api_url: String,
}

impl Default for TodoistConfig {
    fn default() -> Self {
        Self {
            projects: Vec::new(),
            api_url: "https://api.todoist.com/rest/v2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub username: String,
    pub api_url: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            api_url: "https://api.github.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesConfig {
    /// kubectl context; current context when unset
    pub context: Option<String>,
    /// Restrict pod checks to these namespaces
    pub namespaces: Vec<String>,
    pub ignore_namespaces: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TruenasConfig {
    pub host: String,
    /// Override for the API base URL, defaults to `https://{host}/api/v2.0`
    pub api_url: Option<String>,
    /// Verify the TLS certificate (off by default: self-signed is common)
    pub verify_tls: bool,
}

impl TruenasConfig {
    pub fn base_url(&self) -> String {
        match &self.api_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}/api/v2.0", self.host),
        }
    }
}

/// Checks that can run on a remote host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostCheck {
    Disk,
    Updates,
}

fn default_host_checks() -> Vec<HostCheck> {
    vec![HostCheck::Disk]
}

fn default_unknown_name() -> String {
    "unknown".to_string()
}

fn default_root_user() -> String {
    "root".to_string()
}

fn default_ssh_method() -> String {
    "ssh".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshHostConfig {
    #[serde(default = "default_unknown_name")]
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_root_user")]
    pub user: String,
    #[serde(default = "default_host_checks")]
    pub checks: Vec<HostCheck>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowsHostConfig {
    #[serde(default = "default_unknown_name")]
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub user: String,
    /// Transport; only "ssh" is supported
    #[serde(default = "default_ssh_method")]
    pub method: String,
    #[serde(default = "default_host_checks")]
    pub checks: Vec<HostCheck>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CveConfig {
    /// Scan packages installed on this machine
    pub check_local: bool,
    pub api_url: String,
}

impl Default for CveConfig {
    fn default() -> Self {
        Self {
            check_local: true,
            api_url: "https://api.osv.dev/v1/query".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub scanner: String,
    pub max_images: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            scanner: "trivy".to_string(),
            max_images: 10,
        }
    }
}

impl Config {
    /// Load configuration from a path, expanding a leading `~`
    pub fn load(path: &str) -> Result<Self> {
        let path = expand_tilde(path);
        if !path.exists() {
            return Err(HudError::ConfigNotFound(path.display().to_string()));
        }
        Self::from_file(&path)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        if path.extension().map(|e| e == "json").unwrap_or(false) {
            serde_json::from_str(&content).map_err(|e| HudError::Parse {
                context: path.display().to_string(),
                message: e.to_string(),
            })
        } else {
            Self::from_yaml(&content).map_err(|e| match e {
                HudError::Parse { message, .. } => HudError::Parse {
                    context: path.display().to_string(),
                    message,
                },
                other => other,
            })
        }
    }

    /// Parse YAML configuration; an empty document is the default config
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| HudError::Parse {
            context: "config".to_string(),
            message: e.to_string(),
        })
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
secrets:
  todoist_token: "op://Personal/Todoist/credential"
thresholds:
  check_timeout_seconds: 10
  disk_warning_percent: 70
github:
  username: octocat
ssh_hosts:
  - name: nas
    host: 10.0.0.5
    checks: [disk, updates]
  - host: 10.0.0.6
domains:
  - example.com
cache:
  durations:
    domains: 48
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.thresholds.check_timeout_seconds, 10);
        assert_eq!(config.thresholds.disk_warning_percent, 70);
        // untouched thresholds keep their defaults
        assert_eq!(config.thresholds.disk_critical_percent, 90);
        assert_eq!(config.github.username, "octocat");
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.ssh_hosts.len(), 2);
        assert_eq!(config.ssh_hosts[0].checks, vec![HostCheck::Disk, HostCheck::Updates]);
        assert_eq!(config.ssh_hosts[1].name, "unknown");
        assert_eq!(config.ssh_hosts[1].user, "root");
        assert_eq!(config.ssh_hosts[1].checks, vec![HostCheck::Disk]);
        assert_eq!(config.cache.durations.domains, 48);
        assert_eq!(config.cache.durations.cves, 12);
        assert!(config.cache.enabled);
        assert!(config.cves.check_local);
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = Config::from_yaml("\n").unwrap();
        assert!(config.secrets.is_empty());
        assert_eq!(config.thresholds.check_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let err = Config::from_yaml("thresholds: [unclosed").unwrap_err();
        assert!(matches!(err, HudError::Parse { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/daily-hud/config.yaml").unwrap_err();
        assert!(matches!(err, HudError::ConfigNotFound(_)));
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"domains": ["example.org"]}"#).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.domains, vec!["example.org"]);
    }

    #[test]
    fn test_truenas_base_url() {
        let mut cfg = TruenasConfig {
            host: "nas.local".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.base_url(), "https://nas.local/api/v2.0");
        cfg.api_url = Some("http://127.0.0.1:9000/".to_string());
        assert_eq!(cfg.base_url(), "http://127.0.0.1:9000");
    }

    #[test]
    fn test_expand_tilde_passthrough() {
        assert_eq!(expand_tilde("/etc/hud.yaml"), PathBuf::from("/etc/hud.yaml"));
    }
}
