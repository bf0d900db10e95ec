//! GitHub: PRs awaiting review and issues assigned

use chrono::{DateTime, Utc};
use dailyhud_core::{CheckResult, Probe, ProbeContext, Result};
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::debug;

use crate::http::{self, HttpError};

pub struct GithubProbe;

impl Probe for GithubProbe {
    fn id(&self) -> &str {
        "github"
    }

    fn run(&self, ctx: &ProbeContext) -> Result<Vec<CheckResult>> {
        let Some(token) = ctx.secrets.get("github_token") else {
            return Ok(vec![CheckResult::error("github", "GitHub: No API token configured")]);
        };

        let config = &ctx.config.github;
        if config.username.is_empty() {
            return Ok(vec![CheckResult::error("github", "GitHub: No username configured")]);
        }

        let result = match fetch(&config.api_url, token, &config.username) {
            Ok((prs, issues)) => summarize(&prs, &issues, Utc::now()),
            Err(HttpError::Timeout) => CheckResult::error("github", "GitHub: Request timed out"),
            Err(HttpError::Status(401)) => CheckResult::error(
                "github",
                "GitHub: API error - Authentication failed - check token",
            ),
            Err(e) => CheckResult::error("github", format!("GitHub: API error - {}", e)),
        };

        Ok(vec![result])
    }
}

/// One search hit, PR or issue
#[derive(Debug, Clone, PartialEq)]
struct Item {
    number: u64,
    title: String,
    repo: String,
    created_at: String,
}

impl Item {
    fn from_json(item: &Value) -> Self {
        let repo = item
            .get("repository_url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(|url| {
                let parts: Vec<&str> = url.rsplitn(3, '/').collect();
                match parts.as_slice() {
                    [name, owner, _] => format!("{}/{}", owner, name),
                    _ => url.to_string(),
                }
            })
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            number: item.get("number").and_then(Value::as_u64).unwrap_or_default(),
            title: item
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("Untitled")
                .to_string(),
            repo,
            created_at: item
                .get("created_at")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

fn search(
    client: &Client,
    api_url: &str,
    token: &str,
    query: &str,
) -> std::result::Result<Vec<Item>, HttpError> {
    let url = format!("{}/search/issues", api_url.trim_end_matches('/'));
    debug!("GitHub search: {}", query);

    let response = client
        .get(url)
        .bearer_auth(token)
        .header("Accept", "application/vnd.github+json")
        .header("X-GitHub-Api-Version", "2022-11-28")
        .query(&[("q", query), ("per_page", "20")])
        .send()?;

    let body = http::json_body(response)?;
    Ok(body
        .get("items")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(Item::from_json).collect())
        .unwrap_or_default())
}

fn fetch(
    api_url: &str,
    token: &str,
    username: &str,
) -> std::result::Result<(Vec<Item>, Vec<Item>), HttpError> {
    let client = http::client(http::REQUEST_TIMEOUT, false)?;
    let prs = search(
        &client,
        api_url,
        token,
        &format!("is:pr is:open review-requested:{}", username),
    )?;
    let issues = search(
        &client,
        api_url,
        token,
        &format!("is:issue is:open assignee:{}", username),
    )?;
    Ok((prs, issues))
}

fn format_age(created_at: &str, now: DateTime<Utc>) -> Option<String> {
    let created = DateTime::parse_from_rfc3339(created_at).ok()?;
    let days = (now - created.with_timezone(&Utc)).num_days();
    Some(match days {
        0 => "today".to_string(),
        1 => "1 day old".to_string(),
        n => format!("{} days old", n),
    })
}

fn plural(count: usize, word: &str) -> String {
    format!("{} {}{}", count, word, if count == 1 { "" } else { "s" })
}

fn summarize(prs: &[Item], issues: &[Item], now: DateTime<Utc>) -> CheckResult {
    if prs.is_empty() && issues.is_empty() {
        return CheckResult::ok("github", "GitHub: No PRs or issues awaiting action");
    }

    let mut parts = Vec::new();
    if !prs.is_empty() {
        parts.push(format!("{} awaiting review", plural(prs.len(), "PR")));
    }
    if !issues.is_empty() {
        parts.push(format!("{} assigned", plural(issues.len(), "issue")));
    }

    let mut result = CheckResult::warning("github", format!("GitHub: {}", parts.join(", ")));

    for pr in prs {
        let age = format_age(&pr.created_at, now)
            .map(|a| format!(" - {}", a))
            .unwrap_or_default();
        result.add_detail(format!("PR #{}: {} ({}){}", pr.number, pr.title, pr.repo, age));
    }
    for issue in issues {
        result.add_detail(format!(
            "Issue #{}: {} ({})",
            issue.number, issue.title, issue.repo
        ));
    }

    result
}
