//! Domain registration expiry via whois, cached per domain

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use dailyhud_core::command::{command_exists, run_command, CommandError};
use dailyhud_core::{hours, CheckResult, Probe, ProbeContext, Result, TtlCache};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

use super::certs::days_until;

const WHOIS_TIMEOUT: Duration = Duration::from_secs(15);
const CACHE_NAMESPACE: &str = "domains";

pub struct DomainsProbe;

impl Probe for DomainsProbe {
    fn id(&self) -> &str {
        "domains"
    }

    fn run(&self, ctx: &ProbeContext) -> Result<Vec<CheckResult>> {
        let domains = &ctx.config.domains;
        if domains.is_empty() {
            return Ok(Vec::new());
        }
        if !command_exists("whois") {
            return Ok(vec![CheckResult::warning("domains", "Domains: whois not installed")]);
        }

        let cache = ctx.cache.open(CACHE_NAMESPACE);
        let result = check_cached_domains(
            cache.as_ref(),
            hours(ctx.config.cache.durations.domains),
            domains,
            ctx.thresholds().domain_warning_days,
            Utc::now(),
            lookup_expiry,
        );

        Ok(vec![result])
    }
}

fn expiry_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?im)^\s*(?:Registry Expiry Date|Registrar Registration Expiration Date|Expiration Date|Expiry Date|Expiration Time|expires|paid-till|Renewal date)\s*:\s*(.+?)\s*$",
        )
        .ok()
    })
    .as_ref()
}

/// Parse the date formats registries commonly print
fn parse_whois_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y.%m.%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
    }
    let date_part = raw.split_whitespace().next().unwrap_or(raw);
    for format in ["%Y-%m-%d", "%Y.%m.%d", "%d-%b-%Y", "%d.%m.%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

fn parse_whois_expiry(output: &str) -> Option<DateTime<Utc>> {
    expiry_regex()?
        .captures_iter(output)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| parse_whois_date(m.as_str()))
}

fn lookup_expiry(domain: &str) -> std::result::Result<DateTime<Utc>, String> {
    debug!("whois {}", domain);
    let output = match run_command("whois", &[domain], WHOIS_TIMEOUT) {
        Ok(out) => out,
        // some whois clients exit non-zero even with a usable answer
        Err(CommandError::Failed { stderr }) => {
            if stderr.to_lowercase().contains("connect") {
                return Err("WHOIS server unavailable".to_string());
            }
            return Err(format!("WHOIS error: {}", stderr.chars().take(40).collect::<String>()));
        }
        Err(CommandError::TimedOut) => return Err("WHOIS server unavailable".to_string()),
        Err(e) => return Err(format!("WHOIS error: {}", e)),
    };

    if output.contains("No match for") || output.to_uppercase().contains("NOT FOUND") {
        return Err("Domain not found".to_string());
    }
    parse_whois_expiry(&output).ok_or_else(|| "No expiration date in WHOIS".to_string())
}

/// Load the namespace, grade every domain and write back only when a
/// lookup ran, so a run served from cache keeps the namespace's mtime.
fn check_cached_domains(
    cache: Option<&TtlCache>,
    max_age: Duration,
    domains: &[String],
    warn_days: i64,
    now: DateTime<Utc>,
    lookup: impl Fn(&str) -> std::result::Result<DateTime<Utc>, String>,
) -> CheckResult {
    let cached = cache.map(|c| c.load(max_age)).unwrap_or_default();
    let (result, updated) = check_domains(domains, &cached, warn_days, now, lookup);
    if let (Some(cache), Some(updated)) = (cache, updated) {
        cache.save(&updated);
    }
    result
}

/// Grade every domain, consulting `cached` first. Returns the result and,
/// when at least one domain was looked up, the cache contents to persist.
fn check_domains(
    domains: &[String],
    cached: &Map<String, Value>,
    warn_days: i64,
    now: DateTime<Utc>,
    lookup: impl Fn(&str) -> std::result::Result<DateTime<Utc>, String>,
) -> (CheckResult, Option<Map<String, Value>>) {
    let mut ok = 0;
    let mut looked_up = false;
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut fresh = Map::new();

    for domain in domains {
        let entry = cached.get(domain).and_then(|entry| {
            if let Some(error) = entry.get("error").and_then(Value::as_str).filter(|e| !e.is_empty()) {
                return Some(Err(error.to_string()));
            }
            entry
                .get("expiry")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| Ok(dt.with_timezone(&Utc)))
        });

        let (outcome, cache_entry) = match entry {
            Some(outcome) => (outcome, cached[domain.as_str()].clone()),
            None => {
                looked_up = true;
                let outcome = lookup(domain);
                let cache_entry = match &outcome {
                    Ok(expiry) => json!({ "expiry": expiry.to_rfc3339() }),
                    Err(msg) => json!({ "error": msg }),
                };
                (outcome, cache_entry)
            }
        };
        fresh.insert(domain.clone(), cache_entry);

        match outcome {
            Err(msg) => errors.push(format!("{}: {}", domain, msg)),
            Ok(expiry) => {
                let days = days_until(expiry, now);
                if days < 0 {
                    errors.push(format!("{}: EXPIRED", domain));
                } else if days <= warn_days {
                    warnings.push(format!("{}: expires in {} days", domain, days));
                } else {
                    ok += 1;
                }
            }
        }
    }

    let result = if !errors.is_empty() {
        CheckResult::error("domains", format!("Domains: {} issue(s)", errors.len()))
            .with_details(errors)
    } else if !warnings.is_empty() {
        CheckResult::warning(
            "domains",
            format!("Domains: {} expiring within {} days", warnings.len(), warn_days),
        )
        .with_details(warnings)
    } else {
        debug!("{} of {} domains valid", ok, domains.len());
        CheckResult::ok(
            "domains",
            format!("Domains: All {} valid (>{} days)", domains.len(), warn_days),
        )
    };

    (result, looked_up.then_some(fresh))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dailyhud_core::Status;
    use std::cell::{Cell, RefCell};
    use std::time::SystemTime;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_whois_output() {
        let verisign = "   Domain Name: EXAMPLE.COM\n   Registry Expiry Date: 2026-08-13T04:00:00Z\n";
        assert_eq!(
            parse_whois_expiry(verisign),
            Some(Utc.with_ymd_and_hms(2026, 8, 13, 4, 0, 0).unwrap())
        );

        let ru = "domain: EXAMPLE.RU\npaid-till: 2027-01-02T21:00:00Z\n";
        assert_eq!(
            parse_whois_expiry(ru),
            Some(Utc.with_ymd_and_hms(2027, 1, 2, 21, 0, 0).unwrap())
        );

        let uk = "    Expiry date:  05-Nov-2026\n";
        assert_eq!(
            parse_whois_expiry(uk),
            Some(Utc.with_ymd_and_hms(2026, 11, 5, 0, 0, 0).unwrap())
        );

        assert_eq!(parse_whois_expiry("Domain Name: X\n"), None);
    }

    #[test]
    fn test_grades_and_cache_entries() {
        let domains = vec!["ok.com".to_string(), "soon.com".to_string(), "gone.com".to_string()];
        let lookup = |d: &str| match d {
            "ok.com" => Ok(now() + chrono::Duration::days(200)),
            "soon.com" => Ok(now() + chrono::Duration::days(12)),
            _ => Err("Domain not found".to_string()),
        };

        let (result, fresh) = check_domains(&domains, &Map::new(), 30, now(), lookup);
        let fresh = fresh.unwrap();
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.message, "Domains: 1 issue(s)");
        assert_eq!(result.details, vec!["gone.com: Domain not found"]);
        assert_eq!(fresh["gone.com"], json!({"error": "Domain not found"}));
        assert!(fresh["ok.com"]["expiry"].is_string());
    }

    #[test]
    fn test_cached_entries_skip_lookup() {
        let mut cached = Map::new();
        cached.insert("a.com".to_string(), json!({"expiry": "2026-03-20T00:00:00+00:00"}));
        cached.insert("b.com".to_string(), json!({"error": "WHOIS server unavailable"}));

        let calls = RefCell::new(Vec::new());
        let lookup = |d: &str| {
            calls.borrow_mut().push(d.to_string());
            Ok(now() + chrono::Duration::days(400))
        };

        let domains = vec!["a.com".to_string(), "b.com".to_string(), "c.com".to_string()];
        let (result, fresh) = check_domains(&domains, &cached, 30, now(), lookup);
        let fresh = fresh.unwrap();

        assert_eq!(*calls.borrow(), vec!["c.com"]);
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.details, vec!["b.com: WHOIS server unavailable"]);
        // the cached negative entry is carried forward unchanged
        assert_eq!(fresh["b.com"], cached["b.com"]);
        assert_eq!(fresh.len(), 3);
    }

    #[test]
    fn test_fully_cached_run_has_nothing_to_persist() {
        let mut cached = Map::new();
        cached.insert("a.com".to_string(), json!({"expiry": "2026-09-01T00:00:00+00:00"}));
        let domains = vec!["a.com".to_string()];

        let (result, updated) = check_domains(&domains, &cached, 30, now(), |_| {
            Err("unexpected lookup".to_string())
        });
        assert_eq!(result.status, Status::Ok);
        assert!(updated.is_none());
    }

    #[test]
    fn test_negative_entry_expires_with_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TtlCache::open(CACHE_NAMESPACE, dir.path());
        let ttl = hours(24);
        let domains = vec!["flaky.com".to_string()];

        let calls = Cell::new(0);
        let lookup = |_: &str| {
            calls.set(calls.get() + 1);
            Err("WHOIS server unavailable".to_string())
        };
        let age_namespace = |by: Duration| {
            let file = std::fs::File::options()
                .write(true)
                .open(cache.path().unwrap())
                .unwrap();
            file.set_modified(SystemTime::now() - by).unwrap();
        };

        let first = check_cached_domains(Some(&cache), ttl, &domains, 30, now(), lookup);
        assert_eq!(first.details, vec!["flaky.com: WHOIS server unavailable"]);
        assert_eq!(calls.get(), 1);

        // later runs inside the TTL reuse the entry and leave the mtime alone
        age_namespace(hours(23));
        let mtime = std::fs::metadata(cache.path().unwrap()).unwrap().modified().unwrap();
        let second = check_cached_domains(Some(&cache), ttl, &domains, 30, now(), lookup);
        assert_eq!(second.details, first.details);
        assert_eq!(calls.get(), 1);
        assert_eq!(
            std::fs::metadata(cache.path().unwrap()).unwrap().modified().unwrap(),
            mtime
        );

        // once the namespace is past its TTL the domain is looked up again
        age_namespace(hours(25));
        check_cached_domains(Some(&cache), ttl, &domains, 30, now(), lookup);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_all_valid() {
        let domains = vec!["a.com".to_string()];
        let (result, _) = check_domains(&domains, &Map::new(), 30, now(), |_| {
            Ok(now() + chrono::Duration::days(90))
        });
        assert_eq!(result.status, Status::Ok);
        assert_eq!(result.message, "Domains: All 1 valid (>30 days)");
    }
}
