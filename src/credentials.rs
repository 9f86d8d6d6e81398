//! Credential retrieval for authenticating to remotes
//!
//! A single credential is stored under the application identifier. Absence is
//! a legitimate state: git operations then run unauthenticated and fail at
//! fetch or push time for private remotes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::APP_ID;

pub const ENV_GIT_USERNAME: &str = "BRANCH_PRUNER_GIT_USERNAME";
pub const ENV_GIT_PASSWORD: &str = "BRANCH_PRUNER_GIT_PASSWORD";

/// Username/password pair. Held in memory only.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value for git's `http.extraHeader`
    pub fn authorization_header(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Authorization: Basic {}", token)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of credentials for git operations
pub trait CredentialProvider {
    fn credentials(&self) -> Option<Credentials>;
}

/// Reads the credential stored for [`APP_ID`]: environment first, then the
/// JSON credential store in the user's config directory.
pub struct StoredCredentialProvider {
    store_path: Option<PathBuf>,
    lookup: Box<dyn Fn(&str) -> Option<String>>,
}

impl StoredCredentialProvider {
    /// Provider backed by the process environment and the default store
    pub fn new() -> Self {
        Self {
            store_path: dirs::config_dir().map(|d| d.join(APP_ID).join("credentials.json")),
            lookup: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// Provider with an explicit store file and environment lookup
    pub fn with_store<F>(store_path: impl Into<PathBuf>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + 'static,
    {
        Self {
            store_path: Some(store_path.into()),
            lookup: Box::new(lookup),
        }
    }

    fn from_env(&self) -> Option<Credentials> {
        let username = (self.lookup)(ENV_GIT_USERNAME)?;
        let password = (self.lookup)(ENV_GIT_PASSWORD).unwrap_or_default();
        Some(Credentials::new(username, password))
    }

    fn from_store(path: &Path) -> Option<Credentials> {
        if !path.exists() {
            debug!("No credential store at {}", path.display());
            return None;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read credential store {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<HashMap<String, Credentials>>(&content) {
            Ok(mut store) => store.remove(APP_ID),
            Err(e) => {
                warn!("Failed to parse credential store {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl Default for StoredCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialProvider for StoredCredentialProvider {
    fn credentials(&self) -> Option<Credentials> {
        let found = self
            .from_env()
            .or_else(|| self.store_path.as_deref().and_then(Self::from_store));

        if found.is_none() {
            warn!("No stored credentials for '{}'; continuing unauthenticated", APP_ID);
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("bot", "hunter2");
        let shown = format!("{:?}", creds);
        assert!(shown.contains("bot"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn test_authorization_header() {
        let creds = Credentials::new("user", "pass");
        assert_eq!(creds.authorization_header(), "Authorization: Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_reads_store_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(
            &path,
            r#"{ "branch-pruner": { "Username": "bot", "Password": "s3cret" }, "other": { "Username": "x", "Password": "y" } }"#,
        )
        .unwrap();

        let provider = StoredCredentialProvider::with_store(&path, |_| None);
        assert_eq!(provider.credentials(), Some(Credentials::new("bot", "s3cret")));
    }

    #[test]
    fn test_env_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{ "branch-pruner": { "Username": "bot", "Password": "s3cret" } }"#).unwrap();

        let provider = StoredCredentialProvider::with_store(&path, |key| match key {
            ENV_GIT_USERNAME => Some("ci".to_string()),
            ENV_GIT_PASSWORD => Some("token".to_string()),
            _ => None,
        });
        assert_eq!(provider.credentials(), Some(Credentials::new("ci", "token")));
    }

    #[test]
    fn test_missing_or_corrupt_store_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing = StoredCredentialProvider::with_store(dir.path().join("nope.json"), |_| None);
        assert_eq!(missing.credentials(), None);

        let corrupt_path = dir.path().join("bad.json");
        std::fs::write(&corrupt_path, "not json").unwrap();
        let corrupt = StoredCredentialProvider::with_store(&corrupt_path, |_| None);
        assert_eq!(corrupt.credentials(), None);
    }
}
