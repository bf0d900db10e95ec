//! Advisories affecting locally installed packages, from OSV.dev

use dailyhud_core::command::run_command;
use dailyhud_core::{hours, CheckResult, Probe, ProbeContext, Result, Status};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::http;

const CACHE_NAMESPACE: &str = "cves";
const PACKAGE_QUERY_TIMEOUT: Duration = Duration::from_secs(20);
const OSV_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_PACKAGES: usize = 20;
const DETAIL_LIMIT: usize = 10;

/// Only these are queried; checking every package would be too slow
const IMPORTANT_PACKAGES: [&str; 20] = [
    "openssl", "openssh", "curl", "wget", "bash", "sudo", "git", "python3", "python", "nodejs",
    "nginx", "apache2", "httpd", "postgresql", "mysql", "mariadb", "redis", "docker",
    "containerd", "linux-image",
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Package {
    name: String,
    version: String,
    ecosystem: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Advisory {
    id: String,
    #[serde(default)]
    summary: String,
    severity: String,
    #[serde(default)]
    has_fix: bool,
    package: String,
}

pub struct CveProbe;

impl Probe for CveProbe {
    fn id(&self) -> &str {
        "cves"
    }

    fn run(&self, ctx: &ProbeContext) -> Result<Vec<CheckResult>> {
        let config = &ctx.config.cves;
        if !config.check_local {
            return Ok(Vec::new());
        }

        let cache = ctx.cache.open(CACHE_NAMESPACE);
        let cached = cache
            .as_ref()
            .map(|c| c.load(hours(ctx.config.cache.durations.cves)))
            .map(|data| cached_advisories(&data))
            .unwrap_or_default();

        let advisories = if !cached.is_empty() {
            cached
        } else {
            let packages = local_packages();
            if packages.is_empty() {
                return Ok(vec![CheckResult::ok("cves", "CVEs: No package manager detected")]);
            }

            let client = match http::client(OSV_TIMEOUT, false) {
                Ok(client) => client,
                Err(e) => {
                    return Ok(vec![CheckResult::error("cves", format!("CVEs: {}", e))]);
                }
            };

            let advisories: Vec<Advisory> = select_important(packages)
                .iter()
                .flat_map(|pkg| query_osv(&client, &config.api_url, pkg))
                .collect();

            if let Some(cache) = &cache {
                let mut data = Map::new();
                data.insert("vulns".to_string(), json!(advisories));
                cache.save(&data);
            }
            advisories
        };

        Ok(vec![summarize(&advisories)])
    }
}

fn cached_advisories(data: &Map<String, Value>) -> Vec<Advisory> {
    data.get("vulns")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn parse_package_list(output: &str, ecosystem: &'static str) -> Vec<Package> {
    output
        .lines()
        .filter_map(|line| {
            let (name, version) = line.trim().split_once(char::is_whitespace)?;
            Some(Package {
                name: name.to_string(),
                version: version.trim().to_string(),
                ecosystem,
            })
        })
        .collect()
}

fn local_packages() -> Vec<Package> {
    if let Ok(out) = run_command(
        "dpkg-query",
        &["-W", "-f", "${Package} ${Version}\n"],
        PACKAGE_QUERY_TIMEOUT,
    ) {
        return parse_package_list(&out, "Debian");
    }
    if let Ok(out) = run_command(
        "rpm",
        &["-qa", "--qf", "%{NAME} %{VERSION}-%{RELEASE}\n"],
        PACKAGE_QUERY_TIMEOUT,
    ) {
        return parse_package_list(&out, "Red Hat");
    }
    Vec::new()
}

fn select_important(packages: Vec<Package>) -> Vec<Package> {
    packages
        .into_iter()
        .filter(|p| {
            let name = p.name.to_lowercase();
            IMPORTANT_PACKAGES.iter().any(|imp| name.contains(imp))
        })
        .take(MAX_PACKAGES)
        .collect()
}

fn classify_cvss(score: f64) -> &'static str {
    if score >= 9.0 {
        "critical"
    } else if score >= 7.0 {
        "high"
    } else if score >= 4.0 {
        "medium"
    } else {
        "low"
    }
}

/// Severity from the CVSS v3 entry; vector strings count as medium
fn severity_of(vuln: &Value) -> &'static str {
    let mut severity = "unknown";
    for entry in vuln.get("severity").and_then(Value::as_array).into_iter().flatten() {
        if entry.get("type").and_then(Value::as_str) != Some("CVSS_V3") {
            continue;
        }
        if let Some(score) = entry.get("score").and_then(Value::as_str).filter(|s| !s.is_empty()) {
            severity = classify_cvss(score.parse::<f64>().unwrap_or(5.0));
        }
    }
    severity
}

fn has_fix(vuln: &Value) -> bool {
    vuln.get("affected")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|a| a.get("ranges").and_then(Value::as_array))
        .flatten()
        .filter_map(|r| r.get("events").and_then(Value::as_array))
        .flatten()
        .any(|event| event.get("fixed").is_some())
}

fn parse_osv_response(body: &Value, package: &str) -> Vec<Advisory> {
    body.get("vulns")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|vuln| Advisory {
            id: vuln
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string(),
            summary: vuln
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .chars()
                .take(80)
                .collect(),
            severity: severity_of(vuln).to_string(),
            has_fix: has_fix(vuln),
            package: package.to_string(),
        })
        .collect()
}

fn query_osv(client: &Client, api_url: &str, package: &Package) -> Vec<Advisory> {
    let payload = json!({
        "package": {"name": package.name, "ecosystem": package.ecosystem},
        "version": package.version,
    });

    let body = client
        .post(api_url)
        .json(&payload)
        .send()
        .map_err(http::HttpError::from)
        .and_then(http::json_body);

    match body {
        Ok(body) => parse_osv_response(&body, &package.name),
        Err(e) => {
            warn!("OSV query for {} failed: {}", package.name, e);
            Vec::new()
        }
    }
}

fn summarize(advisories: &[Advisory]) -> CheckResult {
    if advisories.is_empty() {
        return CheckResult::ok("cves", "CVEs: No known vulnerabilities");
    }

    let count = |level: &str| advisories.iter().filter(|a| a.severity == level).count();
    let critical = count("critical");
    let high = count("high");
    let medium = count("medium");
    let low = count("low");

    let serious: Vec<&Advisory> = advisories
        .iter()
        .filter(|a| a.severity == "critical")
        .chain(advisories.iter().filter(|a| a.severity == "high"))
        .collect();

    let status = if critical > 0 {
        Status::Error
    } else if high > 0 {
        Status::Warning
    } else {
        Status::Ok
    };

    let mut result = CheckResult::new(
        "cves",
        status,
        format!(
            "CVEs: {} advisory(ies) affecting installed packages",
            advisories.len()
        ),
    );

    for advisory in serious.iter().take(DETAIL_LIMIT) {
        let fix = if advisory.has_fix { " - update available" } else { "" };
        result.add_detail(format!(
            "{}: {} ({}){}",
            advisory.id, advisory.package, advisory.severity, fix
        ));
    }
    if serious.len() > DETAIL_LIMIT {
        result.add_detail(format!(
            "... and {} more high/critical",
            serious.len() - DETAIL_LIMIT
        ));
    }
    if medium > 0 || low > 0 {
        result.add_detail(format!("Plus {} medium, {} low severity", medium, low));
    }

    debug!("{} advisories, {} high or critical", advisories.len(), serious.len());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advisory(id: &str, severity: &str, has_fix: bool) -> Advisory {
        Advisory {
            id: id.to_string(),
            summary: String::new(),
            severity: severity.to_string(),
            has_fix,
            package: "openssl".to_string(),
        }
    }

    #[test]
    fn test_parse_package_list() {
        let out = "openssl 3.0.2-0ubuntu1.15\nbash 5.1-6ubuntu1\n\nbroken\n";
        let pkgs = parse_package_list(out, "Debian");
        assert_eq!(pkgs.len(), 2);
        assert_eq!(pkgs[0].version, "3.0.2-0ubuntu1.15");
        assert_eq!(pkgs[1].ecosystem, "Debian");
    }

    #[test]
    fn test_select_important() {
        let pkgs = parse_package_list("libssl3 3.0\nopenssh-server 1:8.9\nzsh 5.8\nlibcurl4 7.81\n", "Debian");
        let names: Vec<_> = select_important(pkgs).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["openssh-server", "libcurl4"]);
    }

    #[test]
    fn test_severity_and_fix() {
        let vuln = serde_json::json!({
            "id": "CVE-2024-0001",
            "severity": [{"type": "CVSS_V3", "score": "9.8"}],
            "affected": [{"ranges": [{"events": [{"introduced": "0"}, {"fixed": "3.0.3"}]}]}]
        });
        assert_eq!(severity_of(&vuln), "critical");
        assert!(has_fix(&vuln));

        let vector = serde_json::json!({
            "severity": [{"type": "CVSS_V3", "score": "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"}]
        });
        assert_eq!(severity_of(&vector), "medium");
        assert_eq!(severity_of(&serde_json::json!({})), "unknown");
        assert!(!has_fix(&serde_json::json!({})));
    }

    #[test]
    fn test_summarize() {
        let advisories = vec![
            advisory("A", "high", true),
            advisory("B", "medium", false),
            advisory("C", "critical", false),
            advisory("D", "low", false),
        ];
        let result = summarize(&advisories);
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.message, "CVEs: 4 advisory(ies) affecting installed packages");
        assert_eq!(
            result.details,
            vec![
                "C: openssl (critical)",
                "A: openssl (high) - update available",
                "Plus 1 medium, 1 low severity"
            ]
        );

        let only_medium = summarize(&[advisory("B", "medium", false)]);
        assert_eq!(only_medium.status, Status::Ok);
        assert_eq!(summarize(&[]).message, "CVEs: No known vulnerabilities");
    }

    #[test]
    fn test_query_osv() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("POST", "/v1/query")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "package": {"name": "curl", "ecosystem": "Debian"}
            })))
            .with_body(r#"{"vulns": [{"id": "CVE-1", "summary": "bad", "severity": [{"type": "CVSS_V3", "score": "7.5"}]}]}"#)
            .create();

        let client = http::client(Duration::from_secs(5), false).unwrap();
        let pkg = Package {
            name: "curl".to_string(),
            version: "7.81".to_string(),
            ecosystem: "Debian",
        };
        let found = query_osv(&client, &format!("{}/v1/query", server.url()), &pkg);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, "high");
        assert_eq!(found[0].package, "curl");
    }

    #[test]
    fn test_cached_advisories_round_trip() {
        let mut data = Map::new();
        data.insert("vulns".to_string(), json!([advisory("A", "high", true)]));
        assert_eq!(cached_advisories(&data), vec![advisory("A", "high", true)]);
        assert!(cached_advisories(&Map::new()).is_empty());
    }
}
