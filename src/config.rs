//! Configuration for branch-pruner
//!
//! Loaded once at startup from a JSON file, then overlaid with environment
//! variables. The resulting `Config` is passed explicitly into every component.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Application identifier, used for config/credential/cache directories
pub const APP_ID: &str = "branch-pruner";

/// Config file looked up in the working directory when `--config` is not given
pub const CONFIG_FILE_NAME: &str = "branch-pruner.json";

/// Environment variables overlaid on top of the file
pub const ENV_PATH_TO_REPOS: &str = "BRANCH_PRUNER_PATH_TO_REPOS";
pub const ENV_PUSH_DELETES_TO_REMOTE: &str = "BRANCH_PRUNER_PUSH_DELETES_TO_REMOTE";
pub const ENV_SLACK_WEBHOOK: &str = "BRANCH_PRUNER_SLACK_WEBHOOK";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    /// Base directory for local bare mirrors
    #[serde(default = "default_path_to_repos")]
    pub path_to_repos: PathBuf,

    /// Dry-run gate: nothing is pushed unless this is true
    #[serde(default)]
    pub push_deletes_to_remote: bool,

    /// Slack incoming-webhook URL; outcomes are only logged when unset
    #[serde(default)]
    pub slack_webhook: Option<String>,

    /// Repositories to prune, processed in order
    #[serde(default)]
    pub configured_repositories: Vec<ConfiguredRepository>,
}

/// One repository to prune
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfiguredRepository {
    /// Display name, also used to derive the mirror directory
    pub name: String,

    /// Clone URL of the remote
    pub url: String,

    /// Branch everything is compared against
    #[serde(default = "default_master_branch")]
    pub master_branch_name: String,

    /// Branch names (or glob patterns) never considered for deletion
    #[serde(default)]
    pub ignored_branches: BTreeSet<String>,
}

fn default_path_to_repos() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_ID)
        .join("repos")
}

fn default_master_branch() -> String {
    "master".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path_to_repos: default_path_to_repos(),
            push_deletes_to_remote: false,
            slack_webhook: None,
            configured_repositories: Vec::new(),
        }
    }
}

impl Config {
    /// Locate the config file: explicit path, then `./branch-pruner.json`,
    /// then the per-user config directory.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Ok(local);
        }

        if let Some(user) = dirs::config_dir().map(|d| d.join(APP_ID).join("config.json")) {
            if user.exists() {
                return Ok(user);
            }
        }

        Err(Error::Config(format!(
            "no configuration found; pass --config or create ./{}",
            CONFIG_FILE_NAME
        )))
    }

    /// Load, overlay the process environment, and validate
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_json(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.apply_env_overlay(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document without overlay or validation
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)?;
        Ok(config)
    }

    /// Overlay scalar settings from the environment
    pub fn apply_env_overlay<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_PATH_TO_REPOS).filter(|v| !v.trim().is_empty()) {
            self.path_to_repos = PathBuf::from(path);
        }

        if let Some(raw) = lookup(ENV_PUSH_DELETES_TO_REMOTE) {
            self.push_deletes_to_remote = parse_bool(&raw).ok_or_else(|| {
                Error::Config(format!(
                    "{} must be true or false, got '{}'",
                    ENV_PUSH_DELETES_TO_REMOTE, raw
                ))
            })?;
        }

        if let Some(webhook) = lookup(ENV_SLACK_WEBHOOK) {
            let webhook = webhook.trim().to_string();
            self.slack_webhook = (!webhook.is_empty()).then_some(webhook);
        }

        Ok(())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let mut mirrors: HashMap<PathBuf, &str> = HashMap::new();

        for repo in &self.configured_repositories {
            if repo.name.trim().is_empty() {
                return Err(Error::Config("repository with an empty Name".to_string()));
            }
            if repo.url.trim().is_empty() {
                return Err(Error::Config(format!("repository '{}' has no Url", repo.name)));
            }
            if repo.master_branch_name.trim().is_empty() {
                return Err(Error::Config(format!(
                    "repository '{}' has an empty MasterBranchName",
                    repo.name
                )));
            }

            let path = self.mirror_path(repo);
            if let Some(other) = mirrors.insert(path.clone(), &repo.name) {
                return Err(Error::Config(format!(
                    "repositories '{}' and '{}' both map to mirror {}",
                    other,
                    repo.name,
                    path.display()
                )));
            }
        }

        Ok(())
    }

    /// Directory of the bare mirror for a repository
    pub fn mirror_path(&self, repo: &ConfiguredRepository) -> PathBuf {
        self.path_to_repos.join(sanitize_repo_name(&repo.name))
    }

    /// Repositories selected by name, or all of them when `names` is empty
    pub fn select_repositories(&self, names: &[String]) -> Result<Vec<ConfiguredRepository>> {
        if names.is_empty() {
            return Ok(self.configured_repositories.clone());
        }

        names
            .iter()
            .map(|name| {
                self.configured_repositories
                    .iter()
                    .find(|r| &r.name == name)
                    .cloned()
                    .ok_or_else(|| Error::Config(format!("unknown repository '{}'", name)))
            })
            .collect()
    }

    /// Copy safe to print: the webhook URL carries its own secret
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.slack_webhook.is_some() {
            copy.slack_webhook = Some("<redacted>".to_string());
        }
        copy
    }
}

impl ConfiguredRepository {
    /// Whether a branch is excluded from pruning by configuration.
    ///
    /// Entries match the short name (`feature/a`), the friendly name
    /// (`origin/feature/a`), or act as a glob against the short name.
    pub fn is_ignored(&self, short_name: &str, friendly_name: &str) -> bool {
        if self.ignored_branches.contains(short_name) || self.ignored_branches.contains(friendly_name) {
            return true;
        }

        self.ignored_branches.iter().any(|pattern| {
            glob::Pattern::new(pattern)
                .map(|p| p.matches(short_name))
                .unwrap_or(false)
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}

/// Sanitize a repository name for use as a directory name
pub fn sanitize_repo_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_whitespace() => '-',
            c => c,
        })
        .collect()
}
