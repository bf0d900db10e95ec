//! Probe implementations, one module per check

mod certs;
mod containers;
mod cves;
mod domains;
mod github;
mod kubernetes;
mod remote;
mod ssh;
mod todoist;
mod truenas;
mod windows;

pub use certs::CertificatesProbe;
pub use containers::ContainersProbe;
pub use cves::CveProbe;
pub use domains::DomainsProbe;
pub use github::GithubProbe;
pub use kubernetes::KubernetesProbe;
pub use ssh::SshHostsProbe;
pub use todoist::TodoistProbe;
pub use truenas::TruenasProbe;
pub use windows::WindowsHostsProbe;
