//! Todoist: tasks due today and overdue

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use dailyhud_core::{CheckResult, Probe, ProbeContext, Result};
use serde_json::Value;
use tracing::debug;

use crate::http::{self, HttpError};

pub struct TodoistProbe;

impl Probe for TodoistProbe {
    fn id(&self) -> &str {
        "todoist"
    }

    fn run(&self, ctx: &ProbeContext) -> Result<Vec<CheckResult>> {
        let Some(token) = ctx.secrets.get("todoist_token") else {
            return Ok(vec![CheckResult::error(
                "todoist",
                "Todoist: No API token configured",
            )]);
        };

        let config = &ctx.config.todoist;
        let result = match fetch_tasks(&config.api_url, token) {
            Ok(tasks) => summarize(&tasks, &config.projects, Local::now().date_naive()),
            Err(HttpError::Timeout) => CheckResult::error("todoist", "Todoist: Request timed out"),
            Err(e) => CheckResult::error("todoist", format!("Todoist: API error - {}", e)),
        };

        Ok(vec![result])
    }
}

fn fetch_tasks(api_url: &str, token: &str) -> std::result::Result<Vec<Value>, HttpError> {
    let client = http::client(http::REQUEST_TIMEOUT, false)?;
    let url = format!("{}/tasks", api_url.trim_end_matches('/'));
    debug!("Fetching Todoist tasks from {}", url);

    let body = http::json_body(client.get(url).bearer_auth(token).send()?)?;
    match body {
        Value::Array(tasks) => Ok(tasks),
        _ => Err(HttpError::Decode("expected a list of tasks".to_string())),
    }
}

/// Parse a due date given as `YYYY-MM-DD`, a floating datetime or RFC 3339
fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    if raw.contains('T') {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.date_naive());
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
            .ok()
            .map(|dt| dt.date())
    } else {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
    }
}

fn project_id(task: &Value) -> Option<String> {
    match task.get("project_id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

struct DueTask {
    content: String,
    due_string: String,
    days_overdue: i64,
}

fn summarize(tasks: &[Value], projects: &[String], today: NaiveDate) -> CheckResult {
    let mut overdue = Vec::new();
    let mut due_today = Vec::new();

    for task in tasks {
        let Some(due) = task.get("due").filter(|d| d.is_object()) else {
            continue;
        };
        let Some(due_date) = due.get("date").and_then(Value::as_str).and_then(parse_due_date)
        else {
            continue;
        };

        if !projects.is_empty() {
            match project_id(task) {
                Some(id) if projects.contains(&id) => {}
                _ => continue,
            }
        }

        let entry = DueTask {
            content: task
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or("Untitled")
                .to_string(),
            due_string: due
                .get("string")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            days_overdue: (today - due_date).num_days(),
        };

        if due_date < today {
            overdue.push(entry);
        } else if due_date == today {
            due_today.push(entry);
        }
    }

    if overdue.is_empty() && due_today.is_empty() {
        return CheckResult::ok("todoist", "Todoist: No tasks due today");
    }

    let mut result = if overdue.is_empty() {
        let plural = if due_today.len() == 1 { "" } else { "s" };
        CheckResult::ok(
            "todoist",
            format!("Todoist: {} task{} due today", due_today.len(), plural),
        )
    } else {
        CheckResult::warning(
            "todoist",
            format!(
                "Todoist: {} due today, {} overdue",
                due_today.len(),
                overdue.len()
            ),
        )
    };

    // stable sort keeps API order among equally overdue tasks
    overdue.sort_by(|a, b| b.days_overdue.cmp(&a.days_overdue));
    for task in &overdue {
        let unit = if task.days_overdue == 1 { "day" } else { "days" };
        result.add_detail(format!(
            "[!] Overdue ({} {}): {}",
            task.days_overdue, unit, task.content
        ));
    }

    for task in &due_today {
        let suffix = if !task.due_string.is_empty()
            && !task.due_string.to_lowercase().contains("today")
        {
            format!(" @ {}", task.due_string)
        } else {
            String::new()
        };
        result.add_detail(format!("Today: {}{}", task.content, suffix));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use dailyhud_core::{CacheStore, Config, Secrets, Status};
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    #[test]
    fn test_parse_due_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 3, 10);
        assert_eq!(parse_due_date("2026-03-10"), expected);
        assert_eq!(parse_due_date("2026-03-10T09:00:00"), expected);
        assert_eq!(parse_due_date("2026-03-10T09:00:00Z"), expected);
        assert_eq!(parse_due_date("next week"), None);
    }

    #[test]
    fn test_no_tasks_due() {
        let tasks = vec![
            json!({"content": "someday"}),
            json!({"content": "later", "due": {"date": "2026-04-01"}}),
        ];
        let result = summarize(&tasks, &[], today());
        assert_eq!(result.status, Status::Ok);
        assert_eq!(result.message, "Todoist: No tasks due today");
    }

    #[test]
    fn test_overdue_sorted_first() {
        let tasks = vec![
            json!({"content": "a", "due": {"date": "2026-03-09", "string": "yesterday"}}),
            json!({"content": "b", "due": {"date": "2026-03-10", "string": "every day at 9am"}}),
            json!({"content": "c", "due": {"date": "2026-03-05"}}),
            json!({"content": "d", "due": {"date": "2026-03-10", "string": "today"}}),
        ];
        let result = summarize(&tasks, &[], today());
        assert_eq!(result.status, Status::Warning);
        assert_eq!(result.message, "Todoist: 2 due today, 2 overdue");
        assert_eq!(
            result.details,
            vec![
                "[!] Overdue (5 days): c",
                "[!] Overdue (1 day): a",
                "Today: b @ every day at 9am",
                "Today: d",
            ]
        );
    }

    #[test]
    fn test_single_task_today_and_project_filter() {
        let tasks = vec![
            json!({"content": "mine", "project_id": "42", "due": {"date": "2026-03-10"}}),
            json!({"content": "other", "project_id": "7", "due": {"date": "2026-03-10"}}),
        ];
        let result = summarize(&tasks, &["42".to_string()], today());
        assert_eq!(result.status, Status::Ok);
        assert_eq!(result.message, "Todoist: 1 task due today");
        assert_eq!(result.details, vec!["Today: mine"]);
    }

    #[test]
    fn test_missing_token() {
        let ctx = ProbeContext::new(Config::default(), Secrets::new(), CacheStore::disabled());
        let results = TodoistProbe.run(&ctx).unwrap();
        assert_eq!(results[0].status, Status::Error);
        assert_eq!(results[0].message, "Todoist: No API token configured");
    }

    #[test]
    fn test_api_error_reported() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/tasks")
            .match_header("authorization", "Bearer tok")
            .with_status(500)
            .create();

        let mut config = Config::default();
        config.todoist.api_url = server.url();
        let mut secrets = Secrets::new();
        secrets.insert("todoist_token", Some("tok".to_string()));
        let ctx = ProbeContext::new(config, secrets, CacheStore::disabled());

        let results = TodoistProbe.run(&ctx).unwrap();
        assert_eq!(results[0].status, Status::Error);
        assert_eq!(results[0].message, "Todoist: API error - HTTP 500");
    }

    #[test]
    fn test_fetch_and_summarize() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/tasks")
            .with_header("content-type", "application/json")
            .with_body(r#"[{"content": "x"}]"#)
            .create();

        let mut config = Config::default();
        config.todoist.api_url = server.url();
        let mut secrets = Secrets::new();
        secrets.insert("todoist_token", Some("tok".to_string()));
        let ctx = ProbeContext::new(config, secrets, CacheStore::disabled());

        let results = TodoistProbe.run(&ctx).unwrap();
        assert_eq!(results[0].message, "Todoist: No tasks due today");
    }
}
