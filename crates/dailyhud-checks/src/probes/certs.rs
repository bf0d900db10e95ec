//! TLS certificate expiry via the openssl CLI

use chrono::{DateTime, NaiveDateTime, Utc};
use dailyhud_core::command::{run_command_with_input, CommandError};
use dailyhud_core::{CheckResult, Probe, ProbeContext, Result, Thresholds};
use reqwest::Url;
use std::time::Duration;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct CertificatesProbe;

impl Probe for CertificatesProbe {
    fn id(&self) -> &str {
        "certs"
    }

    fn run(&self, ctx: &ProbeContext) -> Result<Vec<CheckResult>> {
        let targets = &ctx.config.certificates;
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let lookups = targets
            .iter()
            .map(|target| match parse_target(target) {
                Some((host, port)) => (display_name(&host, port), fetch_expiry(&host, port)),
                None => (target.clone(), Err("Invalid target".to_string())),
            })
            .collect::<Vec<_>>();

        Ok(vec![grade(lookups, ctx.thresholds(), Utc::now())])
    }
}

/// Accepts `host`, `host:port`, `https://host[:port]/...` (and `http://`, read as https)
fn parse_target(target: &str) -> Option<(String, u16)> {
    let target = target.trim();
    if target.starts_with("http://") || target.starts_with("https://") {
        let https = target.replacen("http://", "https://", 1);
        let url = Url::parse(&https).ok()?;
        let host = url.host_str().filter(|h| !h.is_empty())?.to_string();
        return Some((host, url.port().unwrap_or(443)));
    }

    let (host, port) = match target.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().unwrap_or(443)),
        None => (target, 443),
    };
    if host.is_empty() {
        None
    } else {
        Some((host.to_string(), port))
    }
}

fn display_name(host: &str, port: u16) -> String {
    if port == 443 {
        host.to_string()
    } else {
        format!("{}:{}", host, port)
    }
}

fn describe_connect_error(err: CommandError) -> String {
    match err {
        CommandError::TimedOut => "Connection timed out".to_string(),
        CommandError::NotFound(cmd) => format!("{} not installed", cmd),
        CommandError::Failed { stderr } => {
            let lower = stderr.to_lowercase();
            if lower.contains("name or service not known")
                || lower.contains("nodename nor servname")
                || lower.contains("getaddrinfo")
            {
                "DNS resolution failed".to_string()
            } else if lower.contains("connection refused") {
                "Connection refused".to_string()
            } else {
                let first = stderr.lines().next().unwrap_or("unknown");
                format!("Error: {}", first.chars().take(50).collect::<String>())
            }
        }
        CommandError::Io(msg) => format!("Error: {}", msg.chars().take(50).collect::<String>()),
    }
}

fn fetch_expiry(host: &str, port: u16) -> std::result::Result<DateTime<Utc>, String> {
    let connect = format!("{}:{}", host, port);
    debug!("Fetching certificate from {}", connect);

    let pem = run_command_with_input(
        "openssl",
        &["s_client", "-connect", &connect, "-servername", host],
        Some(b"".as_slice()),
        CONNECT_TIMEOUT,
    )
    .map_err(describe_connect_error)?;

    if !pem.contains("BEGIN CERTIFICATE") {
        return Err("No certificate returned".to_string());
    }

    let enddate = run_command_with_input(
        "openssl",
        &["x509", "-noout", "-enddate"],
        Some(pem.as_bytes()),
        CONNECT_TIMEOUT,
    )
    .map_err(|e| format!("Error: {}", e))?;

    parse_enddate(&enddate).ok_or_else(|| "No expiry date in certificate".to_string())
}

/// Parse `notAfter=Dec 31 23:59:59 2025 GMT`
fn parse_enddate(output: &str) -> Option<DateTime<Utc>> {
    let raw = output.trim().strip_prefix("notAfter=")?;
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let without_zone = normalized.strip_suffix(" GMT").unwrap_or(&normalized);
    NaiveDateTime::parse_from_str(without_zone, "%b %d %H:%M:%S %Y")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Whole days until `expiry`, rounded toward negative infinity
pub(crate) fn days_until(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiry - now).num_seconds().div_euclid(86_400)
}

fn grade(
    lookups: Vec<(String, std::result::Result<DateTime<Utc>, String>)>,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> CheckResult {
    let total = lookups.len();
    let mut ok = 0;
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for (name, lookup) in lookups {
        let expiry = match lookup {
            Ok(expiry) => expiry,
            Err(msg) => {
                errors.push(format!("{}: {}", name, msg));
                continue;
            }
        };

        let days = days_until(expiry, now);
        if days < 0 {
            errors.push(format!("{}: EXPIRED {} days ago", name, days.abs()));
        } else if days <= thresholds.cert_critical_days {
            errors.push(format!("{}: expires in {} days", name, days));
        } else if days <= thresholds.cert_warning_days {
            warnings.push(format!("{}: expires in {} days", name, days));
        } else {
            ok += 1;
        }
    }

    if !errors.is_empty() {
        CheckResult::error("certs", format!("Certificates: {} critical", errors.len()))
            .with_details(errors)
    } else if !warnings.is_empty() {
        CheckResult::warning(
            "certs",
            format!(
                "Certificates: {}/{} OK, {} expiring soon",
                ok,
                total,
                warnings.len()
            ),
        )
        .with_details(warnings)
    } else {
        CheckResult::ok(
            "certs",
            format!(
                "Certificates: {}/{} valid (>{} days)",
                ok, total, thresholds.cert_warning_days
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dailyhud_core::Status;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("example.com"), Some(("example.com".into(), 443)));
        assert_eq!(parse_target("example.com:8443"), Some(("example.com".into(), 8443)));
        assert_eq!(parse_target("example.com:abc"), Some(("example.com".into(), 443)));
        assert_eq!(
            parse_target("https://git.example.com:3000/login"),
            Some(("git.example.com".into(), 3000))
        );
        assert_eq!(parse_target("http://example.com"), Some(("example.com".into(), 443)));
        assert_eq!(parse_target(":443"), None);
    }

    #[test]
    fn test_parse_enddate() {
        let expected = Utc.with_ymd_and_hms(2026, 1, 5, 23, 59, 59).unwrap();
        assert_eq!(parse_enddate("notAfter=Jan  5 23:59:59 2026 GMT\n"), Some(expected));
        assert_eq!(parse_enddate("subject=CN=x"), None);
    }

    #[test]
    fn test_days_until_floors() {
        let half_day_ago = now() - chrono::Duration::hours(12);
        assert_eq!(days_until(half_day_ago, now()), -1);
        assert_eq!(days_until(now() + chrono::Duration::hours(36), now()), 1);
    }

    #[test]
    fn test_grade() {
        let t = Thresholds::default();
        let lookups = vec![
            ("a.example".to_string(), Ok(now() + chrono::Duration::days(60))),
            ("b.example".to_string(), Ok(now() + chrono::Duration::days(10))),
        ];
        let result = grade(lookups, &t, now());
        assert_eq!(result.status, Status::Warning);
        assert_eq!(result.message, "Certificates: 1/2 OK, 1 expiring soon");
        assert_eq!(result.details, vec!["b.example: expires in 10 days"]);

        let lookups = vec![
            ("a.example".to_string(), Ok(now() - chrono::Duration::days(3))),
            ("b.example:8443".to_string(), Err("Connection refused".to_string())),
            ("c.example".to_string(), Ok(now() + chrono::Duration::days(5))),
        ];
        let result = grade(lookups, &t, now());
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.message, "Certificates: 3 critical");
        assert_eq!(
            result.details,
            vec![
                "a.example: EXPIRED 3 days ago",
                "b.example:8443: Connection refused",
                "c.example: expires in 5 days"
            ]
        );

        let result = grade(
            vec![("a".to_string(), Ok(now() + chrono::Duration::days(90)))],
            &t,
            now(),
        );
        assert_eq!(result.message, "Certificates: 1/1 valid (>14 days)");
    }

    #[test]
    fn test_dns_error_description() {
        let err = CommandError::Failed {
            stderr: "BIO_lookup_ex:system lib:crypto/bio/bio_addr.c: Name or service not known"
                .to_string(),
        };
        assert_eq!(describe_connect_error(err), "DNS resolution failed");
    }
}
