//! TrueNAS appliance status over its REST API

use dailyhud_core::{CheckResult, Probe, ProbeContext, Result, ResultsBuilder, Thresholds};
use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::http::{self, HttpError};

/// `update/check_available` can be slow
const UPDATE_CHECK_TIMEOUT: Duration = Duration::from_secs(20);

pub struct TruenasProbe;

impl Probe for TruenasProbe {
    fn id(&self) -> &str {
        "truenas"
    }

    fn run(&self, ctx: &ProbeContext) -> Result<Vec<CheckResult>> {
        let config = &ctx.config.truenas;
        if config.host.is_empty() {
            return Ok(vec![CheckResult::error("truenas", "TrueNAS: No host configured")]);
        }
        let Some(api_key) = ctx.secrets.get("truenas_api_key") else {
            return Ok(vec![CheckResult::error("truenas", "TrueNAS: No API key configured")]);
        };

        let api = match TruenasApi::new(config.base_url(), api_key, !config.verify_tls) {
            Ok(api) => api,
            Err(e) => {
                return Ok(vec![CheckResult::error(
                    "truenas",
                    format!("TrueNAS: API error - {}", e),
                )])
            }
        };

        let info = match api.get("system/info", http::REQUEST_TIMEOUT) {
            Ok(info) => info,
            Err(HttpError::Timeout) => {
                return Ok(vec![CheckResult::error("truenas", "TrueNAS: Connection timed out")])
            }
            Err(HttpError::Connect(_)) => {
                return Ok(vec![CheckResult::error(
                    "truenas",
                    format!("TrueNAS: Cannot connect to {}", config.host),
                )])
            }
            Err(e) => {
                return Ok(vec![CheckResult::error(
                    "truenas",
                    format!("TrueNAS: API error - {}", e),
                )])
            }
        };
        let hostname = info
            .get("hostname")
            .and_then(Value::as_str)
            .unwrap_or(config.host.as_str())
            .to_string();

        let mut results = ResultsBuilder::new();

        results.push(match api.get("pool", http::REQUEST_TIMEOUT) {
            Ok(pools) => evaluate_pools(&pools, ctx.thresholds()),
            Err(e) => {
                debug!("TrueNAS pool query failed: {}", e);
                CheckResult::error("truenas-storage", "Storage: Failed to fetch pool data")
            }
        });

        results.push(match api.get("update/check_available", UPDATE_CHECK_TIMEOUT) {
            Ok(update) => evaluate_update(&update),
            Err(e) => {
                debug!("TrueNAS update check failed: {}", e);
                CheckResult::ok("truenas-updates", "Updates: Check skipped")
            }
        });

        results.push_front(CheckResult::ok(
            "truenas-system",
            format!("System: OK ({})", hostname),
        ));

        Ok(results.finish())
    }
}

struct TruenasApi<'a> {
    client: Client,
    base_url: String,
    api_key: &'a str,
}

impl<'a> TruenasApi<'a> {
    fn new(base_url: String, api_key: &'a str, accept_invalid_certs: bool) -> std::result::Result<Self, HttpError> {
        // per-request timeouts override this
        let client = http::client(UPDATE_CHECK_TIMEOUT, accept_invalid_certs)?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn get(&self, path: &str, timeout: Duration) -> std::result::Result<Value, HttpError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .bearer_auth(self.api_key)
            .timeout(timeout)
            .send()?;
        http::json_body(response)
    }
}

fn format_free(free_bytes: f64) -> String {
    let tb = free_bytes / 1024f64.powi(4);
    if tb >= 1.0 {
        format!("{:.1}TB free", tb)
    } else {
        format!("{:.0}GB free", free_bytes / 1024f64.powi(3))
    }
}

fn evaluate_pools(pools: &Value, thresholds: &Thresholds) -> CheckResult {
    let pools = pools.as_array().map(Vec::as_slice).unwrap_or_default();
    let warn = thresholds.disk_warning_percent as f64;
    let crit = thresholds.disk_critical_percent as f64;

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for pool in pools {
        let name = pool.get("name").and_then(Value::as_str).unwrap_or("unknown");
        let status = pool.get("status").and_then(Value::as_str).unwrap_or("UNKNOWN");
        let used = pool.pointer("/used/parsed").and_then(Value::as_f64).unwrap_or(0.0);
        let free = pool.pointer("/free/parsed").and_then(Value::as_f64).unwrap_or(0.0);
        let total = used + free;

        if total > 0.0 {
            let used_pct = used / total * 100.0;
            let line = format!("{}: {:.0}% used ({})", name, used_pct, format_free(free));
            if used_pct >= crit {
                errors.push(line);
            } else if used_pct >= warn {
                warnings.push(line);
            }
        }

        if status != "ONLINE" {
            errors.push(format!("{}: {}", name, status));
        }
    }

    if !errors.is_empty() {
        CheckResult::error("truenas-storage", "Storage: Critical").with_details(errors)
    } else if !warnings.is_empty() {
        CheckResult::warning(
            "truenas-storage",
            format!("Storage: {} pool(s) high usage", warnings.len()),
        )
        .with_details(warnings)
    } else {
        CheckResult::ok("truenas-storage", format!("Storage: {} pool(s) OK", pools.len()))
    }
}

fn evaluate_update(update: &Value) -> CheckResult {
    if update.get("status").and_then(Value::as_str) == Some("AVAILABLE") {
        let version = update.get("version").and_then(Value::as_str).unwrap_or("unknown");
        CheckResult::warning("truenas-updates", format!("Updates: {} available", version))
    } else {
        CheckResult::ok("truenas-updates", "Updates: Up to date")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dailyhud_core::{CacheStore, Config, Secrets, Status};
    use serde_json::json;

    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

    #[test]
    fn test_pools() {
        let pools = json!([
            {"name": "tank", "status": "ONLINE",
             "used": {"parsed": 85.0 * GIB}, "free": {"parsed": 15.0 * GIB}},
            {"name": "fast", "status": "ONLINE",
             "used": {"parsed": 10.0 * GIB}, "free": {"parsed": 2048.0 * GIB}}
        ]);
        let result = evaluate_pools(&pools, &Thresholds::default());
        assert_eq!(result.status, Status::Warning);
        assert_eq!(result.message, "Storage: 1 pool(s) high usage");
        assert_eq!(result.details, vec!["tank: 85% used (15GB free)"]);

        let degraded = json!([{"name": "tank", "status": "DEGRADED"}]);
        let result = evaluate_pools(&degraded, &Thresholds::default());
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.details, vec!["tank: DEGRADED"]);

        let healthy = json!([{"name": "fast", "status": "ONLINE",
            "used": {"parsed": GIB}, "free": {"parsed": 2048.0 * GIB}}]);
        assert_eq!(
            evaluate_pools(&healthy, &Thresholds::default()).message,
            "Storage: 1 pool(s) OK"
        );
    }

    #[test]
    fn test_format_free() {
        assert_eq!(format_free(1.5 * 1024.0 * GIB), "1.5TB free");
        assert_eq!(format_free(200.0 * GIB), "200GB free");
    }

    fn context(url: String) -> ProbeContext {
        let mut config = Config::default();
        config.truenas.host = "nas.local".to_string();
        config.truenas.api_url = Some(url);
        let mut secrets = Secrets::new();
        secrets.insert("truenas_api_key", Some("key".to_string()));
        ProbeContext::new(config, secrets, CacheStore::disabled())
    }

    #[test]
    fn test_full_probe_system_first() {
        let mut server = mockito::Server::new();
        let _info = server
            .mock("GET", "/system/info")
            .match_header("authorization", "Bearer key")
            .with_body(r#"{"hostname": "vault", "version": "24.04"}"#)
            .create();
        let _pool = server
            .mock("GET", "/pool")
            .with_body(r#"[{"name": "tank", "status": "ONLINE"}]"#)
            .create();
        let _update = server
            .mock("GET", "/update/check_available")
            .with_status(500)
            .create();

        let results = TruenasProbe.run(&context(server.url())).unwrap();
        let messages: Vec<_> = results.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["System: OK (vault)", "Storage: 1 pool(s) OK", "Updates: Check skipped"]
        );
    }

    #[test]
    fn test_unreachable_is_single_error() {
        let mut server = mockito::Server::new();
        let _info = server.mock("GET", "/system/info").with_status(403).create();

        let results = TruenasProbe.run(&context(server.url())).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "TrueNAS: API error - HTTP 403");
    }

    #[test]
    fn test_update_available() {
        let result = evaluate_update(&json!({"status": "AVAILABLE", "version": "25.04"}));
        assert_eq!(result.status, Status::Warning);
        assert_eq!(result.message, "Updates: 25.04 available");
    }
}
