//! Vulnerability scan of running container images with Trivy

use dailyhud_core::command::{command_exists, run_command, CommandError};
use dailyhud_core::{hours, CheckResult, Probe, ProbeContext, Result, Status, TtlCache};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

use super::kubernetes::Kubectl;

const CACHE_NAMESPACE: &str = "container_vulns";
const SCAN_TIMEOUT: Duration = Duration::from_secs(25);
const IMAGES_JSONPATH: &str =
    "jsonpath={range .items[*]}{range .spec.containers[*]}{.image}{'\\n'}{end}{end}";

/// Severity counts for one image, or why it could not be scanned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counts {
    critical: u64,
    high: u64,
    medium: u64,
}

impl Counts {
    fn to_json(self) -> Value {
        json!({"CRITICAL": self.critical, "HIGH": self.high, "MEDIUM": self.medium})
    }

    fn from_json(value: &Value) -> std::result::Result<Self, String> {
        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return Err(error.to_string());
        }
        let get = |key: &str| value.get(key).and_then(Value::as_u64).unwrap_or(0);
        Ok(Self {
            critical: get("CRITICAL"),
            high: get("HIGH"),
            medium: get("MEDIUM"),
        })
    }
}

pub struct ContainersProbe;

impl Probe for ContainersProbe {
    fn id(&self) -> &str {
        "containers"
    }

    fn run(&self, ctx: &ProbeContext) -> Result<Vec<CheckResult>> {
        let config = &ctx.config.containers;
        if config.scanner != "trivy" {
            return Ok(vec![CheckResult::ok(
                "containers",
                "Containers: Only Trivy scanner supported",
            )]);
        }
        if !command_exists("trivy") {
            return Ok(vec![CheckResult::ok("containers", "Containers: Trivy not installed")]);
        }

        let kubectl = Kubectl::new(ctx.config.kubernetes.context.as_deref());
        let images = running_images(&kubectl, config.max_images);
        if images.is_empty() {
            return Ok(vec![CheckResult::ok(
                "containers",
                "Containers: No running images found",
            )]);
        }

        let cache = ctx.cache.open(CACHE_NAMESPACE);
        let outcomes = scan_cached_images(
            cache.as_ref(),
            hours(ctx.config.cache.durations.container_vulns),
            images,
            scan_image,
        );

        Ok(vec![summarize(&outcomes)])
    }
}

type ScanOutcome = std::result::Result<Counts, String>;

/// Scan `images`, reusing cached counts. The namespace is rewritten only
/// when an image was scanned, and then holds just the current images.
fn scan_cached_images(
    cache: Option<&TtlCache>,
    max_age: Duration,
    images: Vec<String>,
    scan: impl Fn(&str) -> ScanOutcome,
) -> Vec<(String, ScanOutcome)> {
    let cached = cache.map(|c| c.load(max_age)).unwrap_or_default();
    let mut current = serde_json::Map::new();
    let mut scanned_any = false;

    let outcomes = images
        .into_iter()
        .map(|image| {
            let outcome = match cached.get(&image) {
                Some(entry) => {
                    current.insert(image.clone(), entry.clone());
                    Counts::from_json(entry)
                }
                None => {
                    scanned_any = true;
                    let scanned = scan(&image);
                    let entry = match &scanned {
                        Ok(counts) => counts.to_json(),
                        Err(msg) => json!({ "error": msg }),
                    };
                    current.insert(image.clone(), entry);
                    scanned
                }
            };
            (image, outcome)
        })
        .collect();

    if let (Some(cache), true) = (cache, scanned_any) {
        cache.save(&current);
    }
    outcomes
}

/// Distinct images across all pods, sorted, at most `limit`
fn parse_images(output: &str, limit: usize) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .take(limit)
        .collect()
}

fn running_images(kubectl: &Kubectl, limit: usize) -> Vec<String> {
    match kubectl.run(&["get", "pods", "-A", "-o", IMAGES_JSONPATH]) {
        Ok(output) => parse_images(&output, limit),
        Err(e) => {
            debug!("Listing running images failed: {}", e);
            Vec::new()
        }
    }
}

fn parse_trivy_report(output: &str) -> std::result::Result<Counts, String> {
    let report: Value =
        serde_json::from_str(output).map_err(|_| "Invalid scan output".to_string())?;
    let mut counts = Counts::default();

    let vulns = report
        .get("Results")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|target| target.get("Vulnerabilities").and_then(Value::as_array))
        .flatten();

    for vuln in vulns {
        match vuln.get("Severity").and_then(Value::as_str) {
            Some("CRITICAL") => counts.critical += 1,
            Some("HIGH") => counts.high += 1,
            Some("MEDIUM") => counts.medium += 1,
            _ => {}
        }
    }
    Ok(counts)
}

fn scan_image(image: &str) -> std::result::Result<Counts, String> {
    debug!("trivy image {}", image);
    let args = [
        "image",
        "--format",
        "json",
        "--severity",
        "CRITICAL,HIGH,MEDIUM",
        "--quiet",
        image,
    ];
    match run_command("trivy", &args, SCAN_TIMEOUT) {
        Ok(output) => parse_trivy_report(&output),
        Err(CommandError::TimedOut) => Err("Scan timed out".to_string()),
        Err(CommandError::NotFound(_)) => Err("Trivy not found".to_string()),
        Err(_) => Err("Scan failed".to_string()),
    }
}

fn summarize(outcomes: &[(String, ScanOutcome)]) -> CheckResult {
    let mut total = Counts::default();
    let mut scanned = 0;
    let mut errors = Vec::new();

    for (image, outcome) in outcomes {
        match outcome {
            Ok(counts) => {
                scanned += 1;
                total.critical += counts.critical;
                total.high += counts.high;
                total.medium += counts.medium;
            }
            Err(msg) => errors.push(format!("{}: {}", image, msg)),
        }
    }

    if scanned == 0 {
        return if errors.is_empty() {
            CheckResult::ok("containers", "Containers: No images scanned")
        } else {
            CheckResult::warning("containers", "Containers: Scan failed")
                .with_details(errors.into_iter().take(3))
        };
    }

    let status = if total.critical > 0 {
        Status::Error
    } else if total.high > 0 {
        Status::Warning
    } else {
        return CheckResult::ok(
            "containers",
            format!(
                "Containers: {} images scanned, no critical/high vulnerabilities",
                scanned
            ),
        );
    };

    let mut result = CheckResult::new(
        "containers",
        status,
        format!("Containers: {} images scanned", scanned),
    );
    for (count, label) in [
        (total.critical, "critical"),
        (total.high, "high"),
        (total.medium, "medium"),
    ] {
        if count > 0 {
            result.add_detail(format!("{} {} vulnerabilities", count, label));
        }
    }
    result
}
