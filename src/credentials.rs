use anyhow::{anyhow, Result};
use std::fmt;
use std::path::PathBuf;

pub const EMAIL_VAR: &str = "DAYONE_EMAIL";
pub const PASSWORD_VAR: &str = "DAYONE_PASSWORD";
pub const JOURNAL_VAR: &str = "DAYONE_JOURNAL_ID";
pub const PUBLISHED_JOURNAL_VAR: &str = "DAYONE_PUBLISHED_JOURNAL";
pub const CHROME_VAR: &str = "CHROME_EXECUTABLE";

pub const DEFAULT_JOURNAL: &str = "Blog Public";

/// Account secrets for the journaling service
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Per-run configuration sourced from the process environment
///
/// Built once at startup and passed to each component explicitly.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub credentials: Option<Credentials>,
    pub draft_journal: String,
    pub published_journal: Option<String>,
    pub chrome_executable: Option<PathBuf>,
}

impl RunConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let credentials = match (non_empty(EMAIL_VAR), non_empty(PASSWORD_VAR)) {
            (Some(email), Some(password)) => Some(Credentials { email, password }),
            _ => None,
        };

        Self {
            credentials,
            draft_journal: non_empty(JOURNAL_VAR).unwrap_or_else(|| DEFAULT_JOURNAL.to_string()),
            published_journal: non_empty(PUBLISHED_JOURNAL_VAR),
            chrome_executable: non_empty(CHROME_VAR).map(PathBuf::from),
        }
    }

    pub fn require_credentials(&self) -> Result<&Credentials> {
        self.credentials.as_ref().ok_or_else(|| {
            anyhow!("Missing credentials: set {EMAIL_VAR} and {PASSWORD_VAR}")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> RunConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RunConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_full_environment() {
        let cfg = config(&[
            (EMAIL_VAR, "me@example.com"),
            (PASSWORD_VAR, "hunter2"),
            (JOURNAL_VAR, "Drafts"),
            (PUBLISHED_JOURNAL_VAR, "Published"),
        ]);
        let creds = cfg.require_credentials().unwrap();
        assert_eq!(creds.email, "me@example.com");
        assert_eq!(cfg.draft_journal, "Drafts");
        assert_eq!(cfg.published_journal.as_deref(), Some("Published"));
    }

    #[test]
    fn test_defaults_and_missing_credentials() {
        let cfg = config(&[(EMAIL_VAR, "me@example.com"), (PASSWORD_VAR, "  ")]);
        assert!(cfg.credentials.is_none());
        assert_eq!(cfg.draft_journal, DEFAULT_JOURNAL);
        let err = cfg.require_credentials().unwrap_err().to_string();
        assert!(err.contains(PASSWORD_VAR));
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials {
            email: "me@example.com".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
