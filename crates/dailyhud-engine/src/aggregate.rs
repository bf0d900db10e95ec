//! Folding a run into counts, an exit code and a display order

use dailyhud_core::{CheckResult, Run, Section, SeverityCounts, Status};

/// No warnings or errors
pub const EXIT_OK: i32 = 0;
/// At least one warning, no errors
pub const EXIT_WARNING: i32 = 1;
/// At least one error (including synthetic timeout/failure results)
pub const EXIT_ERROR: i32 = 2;

/// Partition the run's results by status
pub fn counts_by_severity(run: &Run) -> SeverityCounts {
    count_results(run.results())
}

pub fn count_results<'a>(results: impl IntoIterator<Item = &'a CheckResult>) -> SeverityCounts {
    let mut counts = SeverityCounts::default();
    for result in results {
        counts.add(result.status);
    }
    counts
}

/// `2` if any result is an error, else `1` if any is a warning, else `0`
pub fn overall_exit_code(run: &Run) -> i32 {
    exit_code_for(run.results())
}

pub fn exit_code_for<'a>(results: impl IntoIterator<Item = &'a CheckResult>) -> i32 {
    match results.into_iter().map(|r| r.status).max() {
        Some(Status::Error) => EXIT_ERROR,
        Some(Status::Warning) => EXIT_WARNING,
        _ => EXIT_OK,
    }
}

/// Sections named in `preferred` first, in that order, then the rest in
/// the order the run holds them.
pub fn sections_in_display_order<'a>(run: &'a Run, preferred: &[&str]) -> Vec<&'a Section> {
    let mut ordered: Vec<&Section> = Vec::with_capacity(run.sections().len());

    for name in preferred {
        ordered.extend(run.sections().iter().filter(|s| s.name == *name));
    }

    ordered.extend(
        run.sections()
            .iter()
            .filter(|s| !preferred.contains(&s.name.as_str())),
    );

    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CheckRunner, WorkUnit};
    use std::thread;
    use std::time::Duration;

    fn result(status: Status) -> CheckResult {
        CheckResult::new("x", status, "m")
    }

    #[test]
    fn test_exit_code_table() {
        use Status::*;
        let cases: &[(&[Status], i32)] = &[
            (&[], 0),
            (&[Ok], 0),
            (&[Unknown], 0),
            (&[Ok, Unknown], 0),
            (&[Warning], 1),
            (&[Ok, Warning], 1),
            (&[Warning, Unknown], 1),
            (&[Warning, Warning, Ok], 1),
            (&[Error], 2),
            (&[Ok, Error], 2),
            (&[Warning, Error], 2),
            (&[Error, Warning], 2),
            (&[Unknown, Error], 2),
            (&[Ok, Warning, Error, Unknown], 2),
        ];

        for (statuses, expected) in cases {
            let results: Vec<_> = statuses.iter().map(|s| result(*s)).collect();
            assert_eq!(exit_code_for(&results), *expected, "statuses: {:?}", statuses);
        }
    }

    #[test]
    fn test_exit_code_over_run() {
        let run = Run::new(
            vec![
                Section::new("A", vec![result(Status::Ok)]),
                Section::new("B", vec![result(Status::Warning)]),
            ],
            Duration::ZERO,
        );
        assert_eq!(overall_exit_code(&run), EXIT_WARNING);
    }

    #[test]
    fn test_counts() {
        let run = Run::new(
            vec![
                Section::new("A", vec![result(Status::Ok), result(Status::Error)]),
                Section::new("B", vec![result(Status::Warning), result(Status::Ok)]),
            ],
            Duration::ZERO,
        );
        let counts = counts_by_severity(&run);
        assert_eq!((counts.ok, counts.warning, counts.error), (2, 1, 1));
    }

    #[test]
    fn test_display_order_preferred_then_remaining() {
        let run = Run::new(
            vec![
                Section::new("Extra", vec![]),
                Section::new("Kubernetes", vec![]),
                Section::new("Another", vec![]),
                Section::new("Todoist", vec![]),
            ],
            Duration::ZERO,
        );
        let preferred = ["Todoist", "GitHub", "Kubernetes"];

        let names: Vec<_> = sections_in_display_order(&run, &preferred)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["Todoist", "Kubernetes", "Extra", "Another"]);

        // deterministic across calls
        let again: Vec<_> = sections_in_display_order(&run, &preferred)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, again);
    }

    #[test]
    fn test_scenario_ok_warning_timeout() {
        let units = vec![
            WorkUnit::new("p1", "P1"),
            WorkUnit::new("p2", "P2"),
            WorkUnit::new("p3", "P3"),
        ];

        let run = CheckRunner::new()
            .worker_limit(2)
            .per_check_timeout(Duration::from_millis(200))
            .overall_timeout(Duration::from_secs(2))
            .run(units, |id| match id {
                "p1" => Ok(vec![CheckResult::ok("p1", "ok")]),
                "p2" => Ok(vec![CheckResult::warning("p2", "warn").with_details(["a", "b"])]),
                _ => {
                    thread::sleep(Duration::from_millis(700));
                    Ok(vec![CheckResult::ok("p3", "too late")])
                }
            });

        assert_eq!(run.sections().len(), 3);
        let counts = counts_by_severity(&run);
        assert_eq!((counts.ok, counts.warning, counts.error), (1, 1, 1));
        assert_eq!(overall_exit_code(&run), EXIT_ERROR);
        assert_eq!(run.section("P2").unwrap().results[0].details, vec!["a", "b"]);
    }
}
