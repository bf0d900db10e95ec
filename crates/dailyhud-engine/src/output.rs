//! Output formatting for runs

use chrono::{DateTime, Local};
use colored::{Color, Colorize};
use dailyhud_core::{CheckResult, Result, Run, Section, SeverityCounts, Status};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::time::Duration;

use crate::aggregate::{count_results, sections_in_display_order};

const RULE_WIDTH: usize = 60;

/// Options for text rendering
#[derive(Debug, Clone, Copy, Default)]
pub struct TextOptions {
    /// Emit ANSI colours
    pub color: bool,
    /// Show details for OK results too
    pub verbose: bool,
}

fn paint(text: &str, color: Color, enabled: bool) -> String {
    if enabled {
        text.color(color).to_string()
    } else {
        text.to_string()
    }
}

fn status_color(status: Status) -> Color {
    match status {
        Status::Ok => Color::Green,
        Status::Warning => Color::Yellow,
        Status::Error => Color::Red,
        Status::Unknown => Color::White,
    }
}

/// Coloured status symbol
pub fn format_status(status: Status, color: bool) -> String {
    paint(status.symbol(), status_color(status), color)
}

/// Three-line banner with the generation time
pub fn format_header(now: DateTime<Local>, color: bool) -> String {
    let line = "═".repeat(RULE_WIDTH);
    let title = format!("  DAILY HUD - {}", now.format("%a %b %d, %Y %I:%M %p"));

    let mut output = String::new();
    output.push_str(&paint(&line, Color::Cyan, color));
    output.push('\n');
    if color {
        output.push_str(&title.bold().white().to_string());
    } else {
        output.push_str(&title);
    }
    output.push('\n');
    output.push_str(&paint(&line, Color::Cyan, color));
    output.push_str("\n\n");
    output
}

/// One result line plus its details when they should be shown
pub fn format_result(result: &CheckResult, opts: TextOptions) -> String {
    let mut output = format!("{} {}\n", format_status(result.status, opts.color), result.message);

    if !result.details.is_empty() && (!result.status.is_ok() || opts.verbose) {
        for detail in &result.details {
            if detail.starts_with("  ") {
                output.push_str(&format!("  {}\n", detail));
            } else {
                output.push_str(&format!("    {}\n", detail));
            }
        }
    }

    output
}

/// Section rule followed by every result, or a placeholder when empty
pub fn format_section(section: &Section, opts: TextOptions) -> String {
    let mut header = format!("── {} ", section.name);
    let used = header.chars().count();
    header.push_str(&"─".repeat(RULE_WIDTH.saturating_sub(used)));

    let mut output = String::new();
    if opts.color {
        output.push_str(&header.dimmed().to_string());
    } else {
        output.push_str(&header);
    }
    output.push('\n');

    if section.results.is_empty() {
        output.push_str(&format!(
            "{} No data available\n",
            format_status(Status::Unknown, opts.color)
        ));
    } else {
        for result in &section.results {
            output.push_str(&format_result(result, opts));
        }
    }

    output.push('\n');
    output
}

fn plural(count: usize, word: &str) -> String {
    format!("{} {}{}", count, word, if count == 1 { "" } else { "s" })
}

/// The one-line summary, e.g. "1 error, 2 warnings, 5 OK - 8 checks in 3.2s"
pub fn summary_line(counts: &SeverityCounts, elapsed: Duration, color: bool) -> String {
    let mut parts = Vec::new();
    if counts.error > 0 {
        parts.push(paint(&plural(counts.error, "error"), Color::Red, color));
    }
    if counts.warning > 0 {
        parts.push(paint(&plural(counts.warning, "warning"), Color::Yellow, color));
    }
    if counts.ok > 0 && (counts.error > 0 || counts.warning > 0) {
        parts.push(paint(&format!("{} OK", counts.ok), Color::Green, color));
    }

    let summary = if parts.is_empty() {
        paint("All systems OK", Color::Green, color)
    } else {
        parts.join(", ")
    };

    format!(
        "Summary: {} - {} checks in {:.1}s",
        summary,
        counts.total(),
        elapsed.as_secs_f64()
    )
}

/// Footer framing the summary line
pub fn format_summary(counts: &SeverityCounts, elapsed: Duration, color: bool) -> String {
    let line = paint(&"═".repeat(RULE_WIDTH), Color::Cyan, color);
    format!("\n{}\n{}\n{}\n", line, summary_line(counts, elapsed, color), line)
}

/// Format a run as text, sections in display order
pub fn format_text(run: &Run, preferred_order: &[&str], opts: TextOptions) -> String {
    format_text_at(run, preferred_order, opts, Local::now())
}

/// [`format_text`] with an explicit header timestamp
pub fn format_text_at(
    run: &Run,
    preferred_order: &[&str],
    opts: TextOptions,
    now: DateTime<Local>,
) -> String {
    let mut output = format_header(now, opts.color);
    for section in sections_in_display_order(run, preferred_order) {
        output.push_str(&format_section(section, opts));
    }
    output.push_str(&format_summary(&count_results(run.results()), run.elapsed(), opts.color));
    output
}

/// JSON document: `{"results": {section: [...]}, "summary": {...}}`
struct JsonReport<'a> {
    sections: Vec<&'a Section>,
    counts: SeverityCounts,
    elapsed: Duration,
}

/// Sections as an object keyed by name, in display order
struct JsonSections<'a>(&'a [&'a Section]);

struct JsonSummary {
    counts: SeverityCounts,
    elapsed: Duration,
}

impl Serialize for JsonSections<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for section in self.0 {
            map.serialize_entry(&section.name, &section.results)?;
        }
        map.end()
    }
}

impl Serialize for JsonSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Summary", 4)?;
        state.serialize_field("ok", &self.counts.ok)?;
        state.serialize_field("warnings", &self.counts.warning)?;
        state.serialize_field("errors", &self.counts.error)?;
        let rounded = (self.elapsed.as_secs_f64() * 100.0).round() / 100.0;
        state.serialize_field("elapsed_seconds", &rounded)?;
        state.end()
    }
}

impl Serialize for JsonReport<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Report", 2)?;
        state.serialize_field("results", &JsonSections(&self.sections))?;
        state.serialize_field(
            "summary",
            &JsonSummary {
                counts: self.counts,
                elapsed: self.elapsed,
            },
        )?;
        state.end()
    }
}

/// Format a run as JSON
pub fn format_json(run: &Run, preferred_order: &[&str], pretty: bool) -> Result<String> {
    let report = JsonReport {
        sections: sections_in_display_order(run, preferred_order),
        counts: count_results(run.results()),
        elapsed: run.elapsed(),
    };

    if pretty {
        serde_json::to_string_pretty(&report).map_err(Into::into)
    } else {
        serde_json::to_string(&report).map_err(Into::into)
    }
}
