//! The probe abstraction and the context each probe runs with.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::CacheStore;
use crate::config::{Config, Thresholds};
use crate::error::Result;
use crate::report::CheckResult;

/// Resolved secrets for one invocation.
///
/// A declared secret that failed to resolve is kept as `None` so callers
/// can tell "not configured" from "configured but unavailable".
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    values: BTreeMap<String, Option<String>>,
}

impl Secrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<String>) {
        self.values.insert(name.into(), value);
    }

    /// The resolved value, if the secret resolved
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.as_deref())
    }

    /// True when the secret was declared, resolved or not
    pub fn is_declared(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn is_resolved(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Option<String>)> for Secrets {
    fn from_iter<I: IntoIterator<Item = (String, Option<String>)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Everything a probe may read during one run.
///
/// Cheap to clone; every unit of work gets its own copy.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    pub config: Arc<Config>,
    pub secrets: Arc<Secrets>,
    pub cache: CacheStore,
}

impl ProbeContext {
    pub fn new(config: Config, secrets: Secrets, cache: CacheStore) -> Self {
        Self {
            config: Arc::new(config),
            secrets: Arc::new(secrets),
            cache,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.config.thresholds
    }
}

/// A unit of work producing zero or more results for one named check.
///
/// Expected failures (network, auth, parsing) are returned as results with
/// a non-OK status. `Err` is reserved for faults the probe does not know how
/// to report; the orchestrator turns those, and panics, into a single ERROR
/// result for the probe's section.
pub trait Probe: Send + Sync {
    /// Registry id of this probe (e.g. "kubernetes")
    fn id(&self) -> &str;

    /// Run the probe
    fn run(&self, ctx: &ProbeContext) -> Result<Vec<CheckResult>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_declared_vs_resolved() {
        let secrets: Secrets = vec![
            ("todoist_token".to_string(), Some("abc".to_string())),
            ("github_token".to_string(), None),
        ]
        .into_iter()
        .collect();

        assert_eq!(secrets.get("todoist_token"), Some("abc"));
        assert!(secrets.is_resolved("todoist_token"));
        assert!(secrets.is_declared("github_token"));
        assert!(!secrets.is_resolved("github_token"));
        assert!(!secrets.is_declared("truenas_api_key"));
    }

    #[test]
    fn test_context_clones_share_config() {
        let ctx = ProbeContext::new(Config::default(), Secrets::new(), CacheStore::disabled());
        let other = ctx.clone();
        assert!(Arc::ptr_eq(&ctx.config, &other.config));
        assert_eq!(other.thresholds().check_timeout_seconds, 30);
    }
}
