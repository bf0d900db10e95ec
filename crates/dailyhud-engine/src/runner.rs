//! Check runner that fans probes out onto a bounded worker pool
//!
//! Every unit of work runs on its own thread. At most `worker_limit` units
//! are waited on at once; the rest queue. A unit that does not report
//! within `per_check_timeout` of starting is given up on and replaced by a
//! synthetic ERROR result. The thread itself is NOT cancelled: probes block
//! in subprocess and network calls that have no cancellation point, so a
//! timed-out unit keeps running in the background until it finishes and its
//! late result is discarded. After a round of timeouts the number of live
//! probe threads can therefore exceed `worker_limit`; keep the limit small.
//!
//! `overall_timeout` bounds the whole call. Anything unresolved when it
//! passes, queued or running, is treated as an individual timeout.

use dailyhud_core::{CheckResult, HudError, Run, Section};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Maximum characters of an error message kept in a synthetic result
const ERROR_MESSAGE_LIMIT: usize = 50;

/// Configuration for the check runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum number of units waited on concurrently
    pub worker_limit: usize,
    /// How long one unit may run before it is treated as failed
    pub per_check_timeout: Duration,
    /// Hard ceiling on the whole run
    pub overall_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from_check_timeout(Duration::from_secs(30))
    }
}

impl RunnerConfig {
    /// Six workers and an overall ceiling of twice the per-check timeout
    pub fn from_check_timeout(per_check_timeout: Duration) -> Self {
        Self {
            worker_limit: 6,
            per_check_timeout,
            overall_timeout: per_check_timeout * 2,
        }
    }
}

/// One probe to dispatch: its registry id and the section it reports into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub id: String,
    pub section: String,
}

impl WorkUnit {
    pub fn new(id: impl Into<String>, section: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            section: section.into(),
        }
    }
}

/// Lifecycle of a unit of work. `Completed`, `TimedOut` and `Failed` are
/// terminal and never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    Running,
    Completed,
    TimedOut,
    Failed,
}

impl UnitState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitState::Completed | UnitState::TimedOut | UnitState::Failed)
    }
}

/// What a worker thread reports back
enum Outcome {
    Returned(dailyhud_core::Result<Vec<CheckResult>>),
    Panicked(String),
}

/// Runs work units concurrently and folds their results into a [`Run`]
pub struct CheckRunner {
    config: RunnerConfig,
}

impl CheckRunner {
    /// Create a new check runner
    pub fn new() -> Self {
        Self {
            config: RunnerConfig::default(),
        }
    }

    /// Set the runner configuration
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn worker_limit(mut self, limit: usize) -> Self {
        self.config.worker_limit = limit;
        self
    }

    pub fn per_check_timeout(mut self, timeout: Duration) -> Self {
        self.config.per_check_timeout = timeout;
        self
    }

    pub fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.config.overall_timeout = timeout;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run every unit through `execute` and collect the results.
    ///
    /// `execute` receives a unit's id and must be callable from many threads
    /// at once. Each section in the returned run holds exactly what one unit
    /// produced, in the order it produced it; sections appear in the order
    /// units reached a terminal state.
    pub fn run<F>(&self, units: Vec<WorkUnit>, execute: F) -> Run
    where
        F: Fn(&str) -> dailyhud_core::Result<Vec<CheckResult>> + Send + Sync + 'static,
    {
        let started = Instant::now();
        let limit = self.config.worker_limit.max(1);
        let overall_deadline = started + self.config.overall_timeout;
        let execute = Arc::new(execute);

        info!(
            "Dispatching {} checks ({} workers, {:?} per check)",
            units.len(),
            limit,
            self.config.per_check_timeout
        );

        let (tx, rx) = mpsc::channel::<(usize, Outcome)>();
        let mut states = vec![UnitState::Pending; units.len()];
        let mut pending: VecDeque<usize> = (0..units.len()).collect();
        // (unit index, deadline)
        let mut running: Vec<(usize, Instant)> = Vec::with_capacity(limit);
        let mut sections: Vec<Section> = Vec::with_capacity(units.len());

        while sections.len() < units.len() {
            if Instant::now() >= overall_deadline {
                warn!(
                    "Overall timeout of {:?} reached with {} checks unresolved",
                    self.config.overall_timeout,
                    running.len() + pending.len()
                );
                for index in running.drain(..).map(|(i, _)| i).chain(pending.drain(..)) {
                    states[index] = UnitState::TimedOut;
                    sections.push(timeout_section(&units[index]));
                }
                break;
            }

            while running.len() < limit {
                let Some(index) = pending.pop_front() else {
                    break;
                };
                let unit = &units[index];
                match spawn_unit(index, unit, Arc::clone(&execute), tx.clone()) {
                    Ok(()) => {
                        debug!("Check {} started", unit.id);
                        states[index] = UnitState::Running;
                        running.push((index, Instant::now() + self.config.per_check_timeout));
                    }
                    Err(e) => {
                        warn!("Failed to start check {}: {}", unit.id, e);
                        states[index] = UnitState::Failed;
                        sections.push(failure_section(unit, &e.to_string()));
                    }
                }
            }

            if running.is_empty() {
                // everything left failed to spawn
                continue;
            }

            let now = Instant::now();
            let next_deadline = running
                .iter()
                .map(|(_, deadline)| *deadline)
                .min()
                .map_or(overall_deadline, |d| d.min(overall_deadline));

            match rx.recv_timeout(next_deadline.saturating_duration_since(now)) {
                Ok((index, outcome)) => {
                    let Some(pos) = running.iter().position(|(i, _)| *i == index) else {
                        debug!(
                            "Discarding late result from {} ({:?})",
                            units[index].id, states[index]
                        );
                        continue;
                    };
                    running.swap_remove(pos);
                    let unit = &units[index];
                    let (state, section) = resolve(unit, outcome);
                    debug!("Check {} finished: {:?}", unit.id, state);
                    states[index] = state;
                    sections.push(section);
                }
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    running.retain(|(index, deadline)| {
                        if *deadline > now {
                            return true;
                        }
                        let unit = &units[*index];
                        warn!(
                            "Check {} exceeded {:?}; leaving it to finish in the background",
                            unit.id, self.config.per_check_timeout
                        );
                        states[*index] = UnitState::TimedOut;
                        sections.push(timeout_section(unit));
                        false
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // we hold a sender, so this only happens if every worker vanished
                    for (index, _) in running.drain(..) {
                        states[index] = UnitState::Failed;
                        sections.push(failure_section(&units[index], "worker disconnected"));
                    }
                }
            }
        }

        debug_assert!(states.iter().all(UnitState::is_terminal));

        let elapsed = started.elapsed();
        info!("Run completed: {} sections in {:?}", sections.len(), elapsed);
        Run::new(sections, elapsed)
    }
}

impl Default for CheckRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_unit<F>(
    index: usize,
    unit: &WorkUnit,
    execute: Arc<F>,
    tx: Sender<(usize, Outcome)>,
) -> std::io::Result<()>
where
    F: Fn(&str) -> dailyhud_core::Result<Vec<CheckResult>> + Send + Sync + 'static,
{
    let id = unit.id.clone();
    thread::Builder::new()
        .name(format!("check-{}", unit.id))
        .spawn(move || {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| execute(&id))) {
                Ok(result) => Outcome::Returned(result),
                Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
            };
            // the receiver is gone once the run has returned; late results are dropped
            let _ = tx.send((index, outcome));
        })
        .map(|_| ())
}

fn resolve(unit: &WorkUnit, outcome: Outcome) -> (UnitState, Section) {
    match outcome {
        Outcome::Returned(Ok(results)) => (
            UnitState::Completed,
            Section::new(unit.section.clone(), results),
        ),
        Outcome::Returned(Err(e)) => {
            warn!("Check {} failed: {}", unit.id, e);
            (UnitState::Failed, failure_section(unit, &error_text(&e)))
        }
        Outcome::Panicked(msg) => {
            warn!("Check {} panicked: {}", unit.id, msg);
            (UnitState::Failed, failure_section(unit, &msg))
        }
    }
}

fn error_text(err: &HudError) -> String {
    match err {
        HudError::Other(msg) => msg.clone(),
        other => other.to_string(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

fn truncate_chars(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Synthetic section for a unit that returned an error or panicked
pub fn failure_section(unit: &WorkUnit, message: &str) -> Section {
    Section::new(
        unit.section.clone(),
        vec![CheckResult::error(
            unit.id.clone(),
            format!(
                "{}: Error - {}",
                unit.section,
                truncate_chars(message, ERROR_MESSAGE_LIMIT)
            ),
        )],
    )
}

/// Synthetic section for a unit that did not finish in time
pub fn timeout_section(unit: &WorkUnit) -> Section {
    Section::new(
        unit.section.clone(),
        vec![CheckResult::error(
            unit.id.clone(),
            format!("{}: Timeout or error", unit.section),
        )],
    )
}
