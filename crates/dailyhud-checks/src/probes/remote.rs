//! Non-interactive SSH used by the host probes

use dailyhud_core::command::{run_command, CommandError};
use dailyhud_core::{CheckResult, HostCheck, Status, Thresholds};
use std::time::Duration;
use tracing::debug;

pub(crate) const COMMAND_TIMEOUT: Duration = Duration::from_secs(20);
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// `user@host` reachable with key-based auth only
pub(crate) struct Ssh<'a> {
    user: &'a str,
    host: &'a str,
}

impl<'a> Ssh<'a> {
    pub(crate) fn new(user: &'a str, host: &'a str) -> Self {
        Self { user, host }
    }

    fn target(&self) -> String {
        if self.user.is_empty() {
            self.host.to_string()
        } else {
            format!("{}@{}", self.user, self.host)
        }
    }

    /// Run `command` remotely and return trimmed stdout
    pub(crate) fn run(&self, command: &str, timeout: Duration) -> Result<String, String> {
        let target = self.target();
        debug!("ssh {} {}", target, command);
        let args = [
            "-o",
            "BatchMode=yes",
            "-o",
            "ConnectTimeout=10",
            "-o",
            "StrictHostKeyChecking=accept-new",
            target.as_str(),
            command,
        ];

        match run_command("ssh", &args, timeout) {
            Ok(out) => Ok(out.trim().to_string()),
            Err(CommandError::TimedOut) => Err("Connection timed out".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Fold one host's sub-results: a single "<name>: OK" line when everything
/// passed, otherwise only the non-OK results prefixed with the host name.
pub(crate) fn fold_host_results(name: &str, results: Vec<CheckResult>, ok_suffix: &str) -> Vec<CheckResult> {
    let problems: Vec<CheckResult> = results
        .into_iter()
        .filter(|r| r.status != Status::Ok)
        .map(|r| r.prefixed(name))
        .collect();

    if problems.is_empty() {
        vec![CheckResult::ok(name, format!("{}: OK{}", name, ok_suffix))]
    } else {
        problems
    }
}

/// Grade disk usage rows of `(label, percent, free)` against thresholds
pub(crate) fn grade_disks(
    rows: impl IntoIterator<Item = (String, u32, String)>,
    thresholds: &Thresholds,
    unit: &str,
    render: impl Fn(&str, u32, &str) -> String,
) -> CheckResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for (label, pct, free) in rows {
        if pct >= thresholds.disk_critical_percent {
            errors.push(render(&label, pct, &free));
        } else if pct >= thresholds.disk_warning_percent {
            warnings.push(render(&label, pct, &free));
        }
    }

    if !errors.is_empty() {
        CheckResult::error("disk", "Disk critical").with_details(errors)
    } else if !warnings.is_empty() {
        CheckResult::warning(
            "disk",
            format!("Disk: {} {}(s) high", warnings.len(), unit),
        )
        .with_details(warnings)
    } else {
        CheckResult::ok("disk", "Disk: OK")
    }
}

/// Whether a host config asks for `check`
pub(crate) fn wants(checks: &[HostCheck], check: HostCheck) -> bool {
    checks.contains(&check)
}
