//! The check registry: every known check, its section and when it runs

use dailyhud_core::{Config, HudError, Probe, Result, Secrets};
use serde::Serialize;
use std::str::FromStr;
use tracing::debug;

use crate::probes::{
    CertificatesProbe, ContainersProbe, CveProbe, DomainsProbe, GithubProbe, KubernetesProbe,
    SshHostsProbe, TodoistProbe, TruenasProbe, WindowsHostsProbe,
};

/// Every check daily-hud knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CheckKind {
    Todoist,
    Github,
    Kubernetes,
    Truenas,
    Ssh,
    Windows,
    Certs,
    Domains,
    Cves,
    Containers,
}

impl CheckKind {
    /// All checks in display order
    pub const ALL: [CheckKind; 10] = [
        CheckKind::Todoist,
        CheckKind::Github,
        CheckKind::Kubernetes,
        CheckKind::Truenas,
        CheckKind::Ssh,
        CheckKind::Windows,
        CheckKind::Certs,
        CheckKind::Domains,
        CheckKind::Cves,
        CheckKind::Containers,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            CheckKind::Todoist => "todoist",
            CheckKind::Github => "github",
            CheckKind::Kubernetes => "kubernetes",
            CheckKind::Truenas => "truenas",
            CheckKind::Ssh => "ssh",
            CheckKind::Windows => "windows",
            CheckKind::Certs => "certs",
            CheckKind::Domains => "domains",
            CheckKind::Cves => "cves",
            CheckKind::Containers => "containers",
        }
    }

    /// Display section the check's results land in
    pub fn section(&self) -> &'static str {
        match self {
            CheckKind::Todoist => "Todoist",
            CheckKind::Github => "GitHub",
            CheckKind::Kubernetes => "Kubernetes",
            CheckKind::Truenas => "TrueNAS",
            CheckKind::Ssh => "SSH Hosts",
            CheckKind::Windows => "Windows",
            CheckKind::Certs => "Certificates",
            CheckKind::Domains => "Domains",
            CheckKind::Cves => "Security",
            CheckKind::Containers => "Containers",
        }
    }

    /// Name of the secret the check authenticates with, if any
    pub fn required_secret(&self) -> Option<&'static str> {
        match self {
            CheckKind::Todoist => Some("todoist_token"),
            CheckKind::Github => Some("github_token"),
            CheckKind::Truenas => Some("truenas_api_key"),
            _ => None,
        }
    }

    /// Whether the check runs when no explicit list is given
    pub fn auto_include(&self, config: &Config, secrets: &Secrets) -> bool {
        match self {
            CheckKind::Todoist => secrets.is_resolved("todoist_token"),
            CheckKind::Github => !config.github.username.is_empty(),
            CheckKind::Kubernetes => true,
            CheckKind::Truenas => !config.truenas.host.is_empty(),
            CheckKind::Ssh => !config.ssh_hosts.is_empty(),
            CheckKind::Windows => !config.windows_hosts.is_empty(),
            CheckKind::Certs => !config.certificates.is_empty(),
            CheckKind::Domains => !config.domains.is_empty(),
            CheckKind::Cves => config.cves.check_local,
            CheckKind::Containers => true,
        }
    }

    /// The probe implementing this check
    pub fn probe(&self) -> Box<dyn Probe> {
        match self {
            CheckKind::Todoist => Box::new(TodoistProbe),
            CheckKind::Github => Box::new(GithubProbe),
            CheckKind::Kubernetes => Box::new(KubernetesProbe),
            CheckKind::Truenas => Box::new(TruenasProbe),
            CheckKind::Ssh => Box::new(SshHostsProbe),
            CheckKind::Windows => Box::new(WindowsHostsProbe),
            CheckKind::Certs => Box::new(CertificatesProbe),
            CheckKind::Domains => Box::new(DomainsProbe),
            CheckKind::Cves => Box::new(CveProbe),
            CheckKind::Containers => Box::new(ContainersProbe),
        }
    }

    pub fn info(&self) -> CheckInfo {
        CheckInfo {
            id: self.id(),
            section: self.section(),
            required_secret: self.required_secret(),
        }
    }
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for CheckKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let id = s.trim().to_lowercase();
        CheckKind::ALL
            .into_iter()
            .find(|k| k.id() == id)
            .ok_or_else(|| format!("Unknown check: {}", s))
    }
}

/// Registry row, for listing
#[derive(Debug, Clone, Serialize)]
pub struct CheckInfo {
    pub id: &'static str,
    pub section: &'static str,
    pub required_secret: Option<&'static str>,
}

/// The full registry table in display order
pub fn all_checks() -> Vec<CheckInfo> {
    CheckKind::ALL.iter().map(CheckKind::info).collect()
}

/// Preferred section order for rendering
pub fn display_order() -> Vec<&'static str> {
    CheckKind::ALL.iter().map(CheckKind::section).collect()
}

/// Split a comma-separated `--only` value into trimmed, non-empty ids
pub fn parse_check_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decide which checks run.
///
/// With an explicit list every id must be known, otherwise nothing runs.
/// Without one, each check's auto-include predicate decides. An empty
/// result is an error of its own.
pub fn resolve_run_set(
    explicit: Option<&[String]>,
    config: &Config,
    secrets: &Secrets,
) -> Result<Vec<CheckKind>> {
    let selected = match explicit {
        Some(ids) => {
            let mut selected = Vec::new();
            let mut unknown = Vec::new();

            for id in ids.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
                match id.parse::<CheckKind>() {
                    Ok(kind) if !selected.contains(&kind) => selected.push(kind),
                    Ok(_) => {}
                    Err(_) => unknown.push(id.to_string()),
                }
            }

            if !unknown.is_empty() {
                return Err(HudError::UnknownChecks {
                    unknown,
                    available: CheckKind::ALL.iter().map(|k| k.id().to_string()).collect(),
                });
            }
            selected
        }
        None => CheckKind::ALL
            .into_iter()
            .filter(|k| k.auto_include(config, secrets))
            .collect(),
    };

    if selected.is_empty() {
        return Err(HudError::NoChecksConfigured);
    }

    debug!(
        "Run set: {}",
        selected.iter().map(|k| k.id()).collect::<Vec<_>>().join(", ")
    );
    Ok(selected)
}
