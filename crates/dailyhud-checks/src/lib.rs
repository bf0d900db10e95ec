//! daily-hud checks
//!
//! The check registry and every probe: task trackers (Todoist, GitHub),
//! infrastructure (Kubernetes, TrueNAS, SSH and Windows hosts) and
//! security (certificates, domains, CVEs, container images).

mod http;
pub mod probes;
pub mod registry;

pub use registry::{
    all_checks, display_order, parse_check_list, resolve_run_set, CheckInfo, CheckKind,
};
