//! Kubernetes cluster health via kubectl
//!
//! Emits five results under one section: nodes, pods, volume snapshots,
//! CloudNativePG clusters and resource pressure.

use chrono::{DateTime, Utc};
use dailyhud_core::command::{run_command, CommandError};
use dailyhud_core::{CheckResult, KubernetesConfig, Probe, ProbeContext, Result, Thresholds};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const KUBECTL_TIMEOUT: Duration = Duration::from_secs(20);
const MISSING_RESOURCE: &str = "the server doesn't have a resource type";

/// kubectl bound to an optional context
pub(crate) struct Kubectl<'a> {
    context: Option<&'a str>,
}

impl<'a> Kubectl<'a> {
    pub(crate) fn new(context: Option<&'a str>) -> Self {
        Self {
            context: context.filter(|c| !c.is_empty()),
        }
    }

    pub(crate) fn run(&self, args: &[&str]) -> std::result::Result<String, CommandError> {
        let mut full: Vec<&str> = Vec::with_capacity(args.len() + 2);
        if let Some(context) = self.context {
            full.extend(["--context", context]);
        }
        full.extend_from_slice(args);
        debug!("kubectl {}", full.join(" "));
        run_command("kubectl", &full, KUBECTL_TIMEOUT)
    }

    fn json(&self, args: &[&str]) -> std::result::Result<Value, KubectlError> {
        let output = self.run(args).map_err(KubectlError::Command)?;
        serde_json::from_str(&output).map_err(|_| KubectlError::Parse)
    }
}

enum KubectlError {
    Command(CommandError),
    Parse,
}

impl KubectlError {
    fn is_missing_resource(&self) -> bool {
        matches!(self, KubectlError::Command(CommandError::Failed { stderr })
            if stderr.to_lowercase().contains(MISSING_RESOURCE))
    }

    fn into_result(self, name: &str, label: &str) -> CheckResult {
        match self {
            KubectlError::Command(e) => CheckResult::error(name, format!("{}: {}", label, e)),
            KubectlError::Parse => {
                CheckResult::error(name, format!("{}: Failed to parse kubectl output", label))
            }
        }
    }
}

pub struct KubernetesProbe;

impl Probe for KubernetesProbe {
    fn id(&self) -> &str {
        "kubernetes"
    }

    fn run(&self, ctx: &ProbeContext) -> Result<Vec<CheckResult>> {
        let config = &ctx.config.kubernetes;
        let thresholds = ctx.thresholds();
        let kubectl = Kubectl::new(config.context.as_deref());
        let now = Utc::now();

        let pods = kubectl.json(&["get", "pods", "-A", "-o", "json"]);

        let nodes = match kubectl.json(&["get", "nodes", "-o", "json"]) {
            Ok(data) => evaluate_nodes(&data),
            Err(e) => e.into_result("k8s-nodes", "Nodes"),
        };

        let pod_result = match &pods {
            Ok(data) => evaluate_pods(data, config),
            Err(KubectlError::Command(e)) => {
                CheckResult::error("k8s-pods", format!("Pods: {}", e))
            }
            Err(KubectlError::Parse) => {
                CheckResult::error("k8s-pods", "Pods: Failed to parse kubectl output")
            }
        };

        let snapshots = match kubectl.json(&["get", "volumesnapshots", "-A", "-o", "json"]) {
            Ok(data) => evaluate_snapshots(&data, config, thresholds.snapshot_stale_hours, now),
            Err(e) if e.is_missing_resource() => {
                CheckResult::ok("k8s-snapshots", "Snapshots: VolumeSnapshots not available")
            }
            Err(e) => e.into_result("k8s-snapshots", "Snapshots"),
        };

        let cnpg = match kubectl.json(&["get", "clusters.postgresql.cnpg.io", "-A", "-o", "json"]) {
            Ok(data) => evaluate_cnpg(&data, config),
            Err(e) if e.is_missing_resource() => CheckResult::ok("k8s-cnpg", "CNPG: Not installed"),
            Err(e) => e.into_result("k8s-cnpg", "CNPG"),
        };

        let resources = match kubectl.run(&["top", "pods", "-A", "--no-headers"]) {
            Err(e) if is_metrics_unavailable(&e) => {
                CheckResult::ok("k8s-resources", "Resources: Metrics not available")
            }
            Err(e) => CheckResult::error("k8s-resources", format!("Resources: {}", e)),
            Ok(top) => match &pods {
                Ok(specs) => evaluate_resources(&top, specs, config, thresholds),
                Err(_) => CheckResult::error("k8s-resources", "Resources: Failed to get pod specs"),
            },
        };

        Ok(vec![nodes, pod_result, snapshots, cnpg, resources])
    }
}

fn is_metrics_unavailable(err: &CommandError) -> bool {
    match err {
        CommandError::Failed { stderr } => {
            stderr.contains("Metrics API not available") || stderr.to_lowercase().contains("metrics")
        }
        _ => false,
    }
}

fn items(data: &Value) -> &[Value] {
    data.get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn str_at<'v>(value: &'v Value, pointer: &str) -> Option<&'v str> {
    value.pointer(pointer).and_then(Value::as_str)
}

fn meta(item: &Value) -> (&str, &str) {
    (
        str_at(item, "/metadata/namespace").unwrap_or_default(),
        str_at(item, "/metadata/name").unwrap_or("unknown"),
    )
}

fn ignored(config: &KubernetesConfig, namespace: &str) -> bool {
    config.ignore_namespaces.iter().any(|n| n == namespace)
}

fn evaluate_nodes(data: &Value) -> CheckResult {
    let nodes = items(data);
    let mut unhealthy = Vec::new();

    for node in nodes {
        let ready = node
            .pointer("/status/conditions")
            .and_then(Value::as_array)
            .and_then(|conds| {
                conds
                    .iter()
                    .find(|c| c.get("type").and_then(Value::as_str) == Some("Ready"))
            })
            .map(|c| c.get("status").and_then(Value::as_str) == Some("True"))
            .unwrap_or(false);

        if !ready {
            unhealthy.push(str_at(node, "/metadata/name").unwrap_or("unknown"));
        }
    }

    let healthy = nodes.len() - unhealthy.len();
    let message = format!("Nodes: {}/{} healthy", healthy, nodes.len());
    if unhealthy.is_empty() {
        CheckResult::ok("k8s-nodes", message)
    } else {
        CheckResult::error("k8s-nodes", message)
            .with_details(unhealthy.iter().map(|n| format!("Not Ready: {}", n)))
    }
}

const BAD_WAITING_REASONS: [&str; 3] = ["CrashLoopBackOff", "ImagePullBackOff", "ErrImagePull"];
const RESTART_LIMIT: u64 = 10;
const POD_DETAIL_LIMIT: usize = 10;

fn evaluate_pods(data: &Value, config: &KubernetesConfig) -> CheckResult {
    let mut running = 0;
    let mut problems = Vec::new();

    for pod in items(data) {
        let (ns, name) = meta(pod);
        if ignored(config, ns) {
            continue;
        }
        if !config.namespaces.is_empty() && !config.namespaces.iter().any(|n| n == ns) {
            continue;
        }

        let phase = str_at(pod, "/status/phase").unwrap_or("Unknown");
        let mut restarts = 0;
        let mut waiting_reason = None;
        for cs in pod
            .pointer("/status/containerStatuses")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
        {
            restarts += cs.get("restartCount").and_then(Value::as_u64).unwrap_or(0);
            if let Some(waiting) = cs.pointer("/state/waiting").filter(|w| w.is_object()) {
                waiting_reason = Some(waiting.get("reason").and_then(Value::as_str).unwrap_or(""));
            }
        }

        let mut ok = phase == "Running" || phase == "Succeeded";
        if restarts > RESTART_LIMIT {
            ok = false;
        }
        if waiting_reason.is_some_and(|r| BAD_WAITING_REASONS.contains(&r)) {
            ok = false;
        }

        if ok {
            running += 1;
        } else {
            let mut reason = waiting_reason.filter(|r| !r.is_empty()).unwrap_or(phase).to_string();
            if restarts > RESTART_LIMIT {
                reason = format!("{} ({} restarts)", reason, restarts);
            }
            problems.push(format!("{}/{}: {}", ns, name, reason));
        }
    }

    let message = format!("Pods: {}/{} running", running, running + problems.len());
    if problems.is_empty() {
        return CheckResult::ok("k8s-pods", message);
    }

    let mut result = CheckResult::error("k8s-pods", message)
        .with_details(problems.iter().take(POD_DETAIL_LIMIT).cloned());
    if problems.len() > POD_DETAIL_LIMIT {
        result.add_detail(format!("... and {} more", problems.len() - POD_DETAIL_LIMIT));
    }
    result
}

fn evaluate_snapshots(
    data: &Value,
    config: &KubernetesConfig,
    stale_hours: i64,
    now: DateTime<Utc>,
) -> CheckResult {
    let mut stale: Vec<(String, i64)> = Vec::new();

    for snap in items(data) {
        let (ns, name) = meta(snap);
        if ignored(config, ns) {
            continue;
        }
        let Some(created) = str_at(snap, "/status/creationTime")
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        else {
            continue;
        };

        let age_hours = (now - created.with_timezone(&Utc)).num_seconds() as f64 / 3600.0;
        if age_hours > stale_hours as f64 {
            stale.push((format!("{}/{}", ns, name), age_hours as i64));
        }
    }

    if stale.is_empty() {
        return CheckResult::ok("k8s-snapshots", format!("Snapshots: All within {}h", stale_hours));
    }

    let mut result = CheckResult::warning(
        "k8s-snapshots",
        format!("Snapshots: {} stale (>{}h)", stale.len(), stale_hours),
    );
    stale.sort_by(|a, b| b.1.cmp(&a.1));
    for (key, age) in stale.iter().take(5) {
        result.add_detail(format!("{}: {}h old", key, age));
    }
    result
}

const CNPG_HEALTHY: &str = "Cluster in healthy state";

fn evaluate_cnpg(data: &Value, config: &KubernetesConfig) -> CheckResult {
    let clusters = items(data);
    if clusters.is_empty() {
        return CheckResult::ok("k8s-cnpg", "CNPG: No clusters found");
    }

    let mut problems = Vec::new();
    for cluster in clusters {
        let (ns, name) = meta(cluster);
        if ignored(config, ns) {
            continue;
        }

        let phase = str_at(cluster, "/status/phase").unwrap_or("Unknown");
        if phase != CNPG_HEALTHY {
            problems.push(format!("{}/{}: Phase: {}", ns, name, phase));
            continue;
        }

        let has_recovery_point = str_at(cluster, "/status/firstRecoverabilityPoint")
            .is_some_and(|s| !s.is_empty())
            || str_at(cluster, "/status/lastSuccessfulBackup").is_some_and(|s| !s.is_empty());
        let backup_configured = cluster
            .pointer("/spec/backup")
            .is_some_and(|b| !b.is_null() && b.as_object().map_or(true, |o| !o.is_empty()));

        if !has_recovery_point && backup_configured {
            problems.push(format!("{}/{}: No successful backups", ns, name));
        }
    }

    if problems.is_empty() {
        CheckResult::ok(
            "k8s-cnpg",
            format!("CNPG Backups: {} cluster(s) OK", clusters.len()),
        )
    } else {
        CheckResult::warning("k8s-cnpg", format!("CNPG: {} issue(s)", problems.len()))
            .with_details(problems)
    }
}

/// Memory quantity in MiB; `None` for unsupported suffixes
fn parse_memory_mi(quantity: &str) -> Option<f64> {
    if let Some(v) = quantity.strip_suffix("Gi") {
        v.parse::<f64>().ok().map(|v| v * 1024.0)
    } else if let Some(v) = quantity.strip_suffix("Mi") {
        v.parse::<f64>().ok()
    } else if let Some(v) = quantity.strip_suffix("Ki") {
        v.parse::<f64>().ok().map(|v| v / 1024.0)
    } else {
        None
    }
}

/// CPU quantity in millicores
fn parse_cpu_m(quantity: &str) -> Option<f64> {
    match quantity.strip_suffix('m') {
        Some(v) => v.parse::<f64>().ok(),
        None => quantity.parse::<f64>().ok().map(|v| v * 1000.0),
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Limits {
    mem_mi: f64,
    cpu_m: f64,
}

fn pod_limits(specs: &Value) -> HashMap<String, Limits> {
    let mut limits = HashMap::new();

    for pod in items(specs) {
        let ns = str_at(pod, "/metadata/namespace").unwrap_or_default();
        let name = str_at(pod, "/metadata/name").unwrap_or_default();

        let mut total = Limits::default();
        for container in pod
            .pointer("/spec/containers")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
        {
            if let Some(mem) = str_at(container, "/resources/limits/memory") {
                total.mem_mi += parse_memory_mi(mem).unwrap_or(0.0).floor();
            }
            if let Some(cpu) = str_at(container, "/resources/limits/cpu") {
                total.cpu_m += parse_cpu_m(cpu).unwrap_or(0.0).floor();
            }
        }

        if total.mem_mi > 0.0 || total.cpu_m > 0.0 {
            limits.insert(format!("{}/{}", ns, name), total);
        }
    }

    limits
}

fn evaluate_resources(
    top: &str,
    specs: &Value,
    config: &KubernetesConfig,
    thresholds: &Thresholds,
) -> CheckResult {
    let limits = pod_limits(specs);
    let mem_warn = thresholds.pod_memory_warning_percent as f64;
    let cpu_warn = thresholds.pod_cpu_warning_percent as f64;
    let mut warnings = Vec::new();

    for line in top.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let [ns, name, cpu, mem, ..] = parts.as_slice() else {
            continue;
        };
        if ignored(config, ns) {
            continue;
        }
        let key = format!("{}/{}", ns, name);
        let Some(limit) = limits.get(&key) else {
            continue;
        };

        let used_cpu = cpu.strip_suffix('m').and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0);
        let used_mem = match (mem.strip_suffix("Mi"), mem.strip_suffix("Gi")) {
            (Some(v), _) => v.parse::<f64>().unwrap_or(0.0),
            (_, Some(v)) => v.parse::<f64>().map(|v| v * 1024.0).unwrap_or(0.0),
            _ => 0.0,
        };

        let mem_pct = if limit.mem_mi > 0.0 { used_mem / limit.mem_mi * 100.0 } else { 0.0 };
        let cpu_pct = if limit.cpu_m > 0.0 { used_cpu / limit.cpu_m * 100.0 } else { 0.0 };

        if mem_pct >= mem_warn {
            warnings.push(format!("{}: {}% memory limit", key, mem_pct as u64));
        } else if cpu_pct >= cpu_warn {
            warnings.push(format!("{}: {}% CPU limit", key, cpu_pct as u64));
        }
    }

    if warnings.is_empty() {
        return CheckResult::ok("k8s-resources", "Resources: No pressure");
    }

    let mut result = CheckResult::warning(
        "k8s-resources",
        format!("Resources: {} pod(s) under pressure", warnings.len()),
    )
    .with_details(warnings.iter().take(5).cloned());
    if warnings.len() > 5 {
        result.add_detail(format!("... and {} more", warnings.len() - 5));
    }
    result
}
