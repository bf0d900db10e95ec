//! Report types: check results, sections and the run aggregate

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Status of a single check result
///
/// Ordered by severity: `Unknown < Ok < Warning < Error`. `Unknown` only
/// marks "no data returned" and ranks below everything else, so it never
/// raises the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Unknown,
    Ok,
    Warning,
    Error,
}

impl Status {
    /// Lower-case identifier used in JSON output
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Warning => "warning",
            Status::Error => "error",
            Status::Unknown => "unknown",
        }
    }

    /// Terminal symbol for this status
    pub fn symbol(&self) -> &'static str {
        match self {
            Status::Ok => "✓",
            Status::Warning => "⚠",
            Status::Error => "✗",
            Status::Unknown => "?",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one sub-check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Stable identifier of the sub-check (e.g. "disk", "k8s-pods")
    pub name: String,

    pub status: Status,

    /// Single-line human summary
    pub message: String,

    /// Supplementary lines; order is significant and owned by the probe
    #[serde(default)]
    pub details: Vec<String>,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, status: Status, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn ok(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Status::Ok, message)
    }

    pub fn warning(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Status::Warning, message)
    }

    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Status::Error, message)
    }

    pub fn unknown(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Status::Unknown, message)
    }

    /// Add a detail line
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    /// Add several detail lines, keeping their order
    pub fn with_details<I, S>(mut self, details: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.details.extend(details.into_iter().map(Into::into));
        self
    }

    pub fn add_detail(&mut self, detail: impl Into<String>) {
        self.details.push(detail.into());
    }

    /// Prefix the message, e.g. with a host name
    pub fn prefixed(mut self, prefix: &str) -> Self {
        self.message = format!("{}: {}", prefix, self.message);
        self
    }
}

/// Accumulates the ordered result list a probe returns.
///
/// Probes push into one builder from every return path and hand the
/// finished list to the orchestrator.
#[derive(Debug, Default)]
pub struct ResultsBuilder {
    results: Vec<CheckResult>,
}

impl ResultsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: CheckResult) -> &mut Self {
        self.results.push(result);
        self
    }

    pub fn extend(&mut self, results: impl IntoIterator<Item = CheckResult>) -> &mut Self {
        self.results.extend(results);
        self
    }

    /// Insert at the front, used for a summary line computed last
    pub fn push_front(&mut self, result: CheckResult) -> &mut Self {
        self.results.insert(0, result);
        self
    }

    /// True when nothing pushed so far is non-OK
    pub fn all_ok(&self) -> bool {
        self.results.iter().all(|r| r.status.is_ok())
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn finish(self) -> Vec<CheckResult> {
        self.results
    }
}

/// A named bucket holding one probe's results, in the order it produced them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub results: Vec<CheckResult>,
}

impl Section {
    pub fn new(name: impl Into<String>, results: Vec<CheckResult>) -> Self {
        Self {
            name: name.into(),
            results,
        }
    }
}

/// Counts of results by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub ok: usize,
    pub warning: usize,
    pub error: usize,
    pub unknown: usize,
}

impl SeverityCounts {
    pub fn add(&mut self, status: Status) {
        match status {
            Status::Ok => self.ok += 1,
            Status::Warning => self.warning += 1,
            Status::Error => self.error += 1,
            Status::Unknown => self.unknown += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.ok + self.warning + self.error + self.unknown
    }
}

/// Complete outcome of one orchestration cycle.
///
/// Sections are stored in fan-in (completion) order; the flattened result
/// view follows the same order.
#[derive(Debug, Clone, Default)]
pub struct Run {
    sections: Vec<Section>,
    elapsed: Duration,
}

impl Run {
    pub fn new(sections: Vec<Section>, elapsed: Duration) -> Self {
        Self { sections, elapsed }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// All results across sections
    pub fn results(&self) -> impl Iterator<Item = &CheckResult> {
        self.sections.iter().flat_map(|s| s.results.iter())
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}
