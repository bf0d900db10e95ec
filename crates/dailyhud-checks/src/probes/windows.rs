//! Windows hosts over SSH + PowerShell

use dailyhud_core::{
    CheckResult, HostCheck, Probe, ProbeContext, Result, Status, Thresholds, WindowsHostConfig,
};

use super::remote::{fold_host_results, grade_disks, wants, Ssh, COMMAND_TIMEOUT, CONNECT_TIMEOUT};

const DRIVES_SCRIPT: &str = concat!(
    "Get-PSDrive -PSProvider FileSystem | ",
    "Where-Object { $_.Used -gt 0 } | ",
    "ForEach-Object { ",
    "$pct = [math]::Round(($_.Used / ($_.Used + $_.Free)) * 100); ",
    "$freeGB = [math]::Round($_.Free / 1GB, 1); ",
    "Write-Output \\\"$($_.Name): $pct% ($($freeGB)GB free)\\\" ",
    "}"
);

const UPDATES_SCRIPT: &str = concat!(
    "try { ",
    "$updates = (Get-WindowsUpdate -ErrorAction Stop).Count; ",
    "Write-Output $updates ",
    "} catch { ",
    "Write-Output 'unavailable' ",
    "}"
);

pub struct WindowsHostsProbe;

impl Probe for WindowsHostsProbe {
    fn id(&self) -> &str {
        "windows"
    }

    fn run(&self, ctx: &ProbeContext) -> Result<Vec<CheckResult>> {
        Ok(ctx
            .config
            .windows_hosts
            .iter()
            .flat_map(|host| check_host(host, ctx.thresholds()))
            .collect())
    }
}

fn powershell(ssh: &Ssh, script: &str) -> std::result::Result<String, String> {
    ssh.run(&format!("powershell -Command \"{}\"", script), COMMAND_TIMEOUT)
}

fn check_host(host: &WindowsHostConfig, thresholds: &Thresholds) -> Vec<CheckResult> {
    let name = host.name.as_str();
    if host.host.is_empty() {
        return vec![CheckResult::error(name, format!("{}: No host configured", name))];
    }
    if host.method != "ssh" {
        return vec![CheckResult::error(
            name,
            format!("{}: WinRM not yet supported (use SSH)", name),
        )];
    }

    let ssh = Ssh::new(&host.user, &host.host);
    let probe = ssh.run("powershell -Command \"Write-Output 'ok'\"", CONNECT_TIMEOUT);
    if probe.is_err() {
        return vec![CheckResult::error(name, format!("{}: Connection failed", name))];
    }

    let mut results = Vec::new();
    let mut pending = String::new();

    if wants(&host.checks, HostCheck::Disk) {
        if let Ok(output) = powershell(&ssh, DRIVES_SCRIPT) {
            results.push(evaluate_drives(&output, thresholds));
        }
    }

    if wants(&host.checks, HostCheck::Updates) {
        if let Some(update) = check_updates(&ssh) {
            // pending updates ride along on the OK line
            if update.status == Status::Warning {
                if let Some((_, info)) = update.message.split_once(": ") {
                    pending = format!(" ({})", info);
                }
            } else {
                results.push(update);
            }
        }
    }

    fold_host_results(name, results, &pending)
}

/// Parse lines like `C: 75% (120GB free)`
fn evaluate_drives(output: &str, thresholds: &Thresholds) -> CheckResult {
    let rows = output.lines().filter_map(|line| {
        let (drive, rest) = line.split_once(':')?;
        let rest = rest.trim();
        let pct = rest.split('%').next()?.trim().parse::<u32>().ok()?;
        let free = rest
            .split_once('(')
            .map(|(_, f)| f.trim_end_matches(')').to_string())
            .unwrap_or_default();
        Some((drive.trim().to_string(), pct, free))
    });

    grade_disks(rows, thresholds, "drive", |drive, pct, free| {
        format!("{}: {}% ({})", drive, pct, free)
    })
}

fn evaluate_update_count(output: &str) -> CheckResult {
    match output.trim().parse::<u64>() {
        Ok(0) => CheckResult::ok("updates", "Updates: Up to date"),
        Ok(count) => CheckResult::warning("updates", format!("Updates: {} pending", count)),
        Err(_) => CheckResult::ok("updates", "Updates: Check skipped"),
    }
}

fn check_updates(ssh: &Ssh) -> Option<CheckResult> {
    match powershell(ssh, UPDATES_SCRIPT) {
        Ok(output) if output.trim() != "unavailable" => Some(evaluate_update_count(&output)),
        _ => powershell(ssh, "(Get-Service wuauserv).Status").ok().map(|_| {
            CheckResult::ok("updates", "Updates: Check unavailable (no PSWindowsUpdate)")
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drives() {
        let output = "C: 91% (10.5GB free)\nD: 82% (120GB free)\nbogus line\n";
        let result = evaluate_drives(output, &Thresholds::default());
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.details, vec!["C: 91% (10.5GB free)"]);

        let result = evaluate_drives("D: 82% (120GB free)", &Thresholds::default());
        assert_eq!(result.message, "Disk: 1 drive(s) high");
    }

    #[test]
    fn test_update_count() {
        assert_eq!(evaluate_update_count("0").message, "Updates: Up to date");
        assert_eq!(evaluate_update_count("5\r\n").message, "Updates: 5 pending");
        assert_eq!(evaluate_update_count("?").message, "Updates: Check skipped");
    }

    #[test]
    fn test_winrm_rejected() {
        let host = WindowsHostConfig {
            name: "desk".to_string(),
            host: "10.0.0.9".to_string(),
            user: "admin".to_string(),
            method: "winrm".to_string(),
            checks: vec![HostCheck::Disk],
        };
        let results = check_host(&host, &Thresholds::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "desk: WinRM not yet supported (use SSH)");
    }
}
