//! daily-hud secrets
//!
//! Resolves `op://Vault/Item/field` references through the 1Password CLI.
//! Lookups are memoized for the lifetime of one [`SecretResolver`], which
//! the caller owns for a single invocation.

mod error;

pub use error::{Result, SecretError};

use dailyhud_core::command::{command_exists, run_command, CommandError};
use dailyhud_core::Secrets;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

const OP_TIMEOUT: Duration = Duration::from_secs(30);

/// Somewhere secret references can be read from
pub trait SecretSource {
    fn read(&self, reference: &str) -> Result<String>;
}

/// The `op` command line client
#[derive(Debug, Default, Clone, Copy)]
pub struct OpCli;

impl SecretSource for OpCli {
    fn read(&self, reference: &str) -> Result<String> {
        if !command_exists("op") {
            return Err(SecretError::CliUnavailable);
        }

        match run_command("op", &["read", reference], OP_TIMEOUT) {
            Ok(value) => Ok(value.trim().to_string()),
            Err(CommandError::NotFound(_)) => Err(SecretError::CliUnavailable),
            Err(CommandError::TimedOut) => Err(SecretError::Timeout),
            Err(CommandError::Failed { stderr }) => Err(classify_failure(&stderr)),
            Err(CommandError::Io(msg)) => Err(SecretError::ReadFailed(msg)),
        }
    }
}

fn classify_failure(stderr: &str) -> SecretError {
    if stderr.to_lowercase().contains("not signed in") {
        SecretError::NotSignedIn
    } else if stderr.is_empty() {
        SecretError::ReadFailed("Unknown error".to_string())
    } else {
        SecretError::ReadFailed(stderr.to_string())
    }
}

/// Memoizing resolver; one per run
pub struct SecretResolver<S: SecretSource = OpCli> {
    source: S,
    memo: HashMap<String, Result<String>>,
}

impl SecretResolver<OpCli> {
    pub fn new() -> Self {
        Self::with_source(OpCli)
    }
}

impl Default for SecretResolver<OpCli> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SecretSource> SecretResolver<S> {
    pub fn with_source(source: S) -> Self {
        Self {
            source,
            memo: HashMap::new(),
        }
    }

    /// Read one reference, consulting the memo first
    pub fn get(&mut self, reference: &str) -> Result<String> {
        if let Some(cached) = self.memo.get(reference) {
            return cached.clone();
        }

        let value = if reference.starts_with("op://") {
            self.source.read(reference)
        } else {
            Err(SecretError::InvalidReference(reference.to_string()))
        };
        self.memo.insert(reference.to_string(), value.clone());
        value
    }

    /// Resolve every configured secret. A failed lookup is recorded as
    /// unresolved rather than failing the run.
    pub fn resolve_all(&mut self, references: &BTreeMap<String, String>) -> Secrets {
        let mut secrets = Secrets::new();
        for (name, reference) in references {
            match self.get(reference) {
                Ok(value) => {
                    debug!("Resolved secret {}", name);
                    secrets.insert(name.clone(), Some(value));
                }
                Err(e) => {
                    warn!("Secret {} unavailable: {}", name, e);
                    secrets.insert(name.clone(), None);
                }
            }
        }
        secrets
    }

    /// Number of distinct references looked up so far
    pub fn lookups(&self) -> usize {
        self.memo.len()
    }
}

/// Resolve `references` with a fresh `op`-backed resolver
pub fn resolve_secrets(references: &BTreeMap<String, String>) -> Secrets {
    SecretResolver::new().resolve_all(references)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeSource {
        calls: Cell<usize>,
    }

    impl SecretSource for FakeSource {
        fn read(&self, reference: &str) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            match reference {
                "op://Personal/Todoist/credential" => Ok("tok".to_string()),
                "op://Personal/Locked/credential" => Err(SecretError::NotSignedIn),
                _ => Err(SecretError::ReadFailed("no such item".to_string())),
            }
        }
    }

    fn resolver() -> SecretResolver<FakeSource> {
        SecretResolver::with_source(FakeSource { calls: Cell::new(0) })
    }

    #[test]
    fn test_invalid_reference_never_reaches_source() {
        let mut resolver = resolver();
        assert_eq!(
            resolver.get("plain-text-token"),
            Err(SecretError::InvalidReference("plain-text-token".to_string()))
        );
        assert_eq!(resolver.source.calls.get(), 0);
    }

    #[test]
    fn test_memoized() {
        let mut resolver = resolver();
        assert_eq!(resolver.get("op://Personal/Todoist/credential").unwrap(), "tok");
        assert_eq!(resolver.get("op://Personal/Todoist/credential").unwrap(), "tok");
        assert!(resolver.get("op://Personal/Locked/credential").is_err());
        assert!(resolver.get("op://Personal/Locked/credential").is_err());
        assert_eq!(resolver.source.calls.get(), 2);
        assert_eq!(resolver.lookups(), 2);
    }

    #[test]
    fn test_resolve_all_records_failures() {
        let mut refs = BTreeMap::new();
        refs.insert("todoist_token".to_string(), "op://Personal/Todoist/credential".to_string());
        refs.insert("github_token".to_string(), "op://Personal/Missing/credential".to_string());
        refs.insert("truenas_api_key".to_string(), "not-a-reference".to_string());

        let secrets = resolver().resolve_all(&refs);
        assert_eq!(secrets.len(), 3);
        assert_eq!(secrets.get("todoist_token"), Some("tok"));
        assert!(secrets.is_declared("github_token"));
        assert!(!secrets.is_resolved("github_token"));
        assert!(!secrets.is_resolved("truenas_api_key"));
    }

    #[test]
    fn test_classify_failure() {
        assert_eq!(
            classify_failure("[ERROR] You are not signed in"),
            SecretError::NotSignedIn
        );
        assert_eq!(
            classify_failure(""),
            SecretError::ReadFailed("Unknown error".to_string())
        );
    }

    #[test]
    fn test_into_hud_error() {
        let err: dailyhud_core::HudError = SecretError::CliUnavailable.into();
        assert!(err.to_string().starts_with("Secret error: 1Password CLI"));
    }
}
