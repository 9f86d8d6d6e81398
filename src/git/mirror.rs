//! Local bare mirrors: cloning, fetching and listing remote-tracking branches

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::command::{self, git};
use crate::config::{Config, ConfiguredRepository};
use crate::credentials::Credentials;
use crate::error::{Error, Result};

/// The only remote the pruner works with
pub const REMOTE_NAME: &str = "origin";

const TRACKING_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";

/// A remote-tracking branch as seen in the mirror after the last fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBranchRef {
    /// Friendly name (e.g., "origin/feature/my-branch")
    pub friendly_name: String,
    /// Name of the ref on the remote (e.g., "refs/heads/feature/my-branch")
    pub upstream_canonical_name: String,
    /// Commit hash the branch points to
    pub tip: String,
    /// Author date of the tip commit
    pub tip_author_time: DateTime<Utc>,
    pub is_remote: bool,
}

impl RemoteBranchRef {
    /// Branch name without the remote prefix (e.g., "feature/my-branch")
    pub fn short_name(&self) -> &str {
        self.upstream_canonical_name
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.upstream_canonical_name)
    }

    pub fn short_tip(&self) -> &str {
        short_hash(&self.tip)
    }
}

/// First 7 characters of a commit hash
pub fn short_hash(id: &str) -> &str {
    id.get(..7).unwrap_or(id)
}

/// Owns the directory of mirrors and clones them on first use
pub struct RepositoryCache {
    base_dir: PathBuf,
    credentials: Option<Credentials>,
}

impl RepositoryCache {
    pub fn new(base_dir: impl Into<PathBuf>, credentials: Option<Credentials>) -> Self {
        Self {
            base_dir: base_dir.into(),
            credentials,
        }
    }

    /// Cache rooted at the configured `PathToRepos`
    pub fn from_config(config: &Config, credentials: Option<Credentials>) -> Self {
        Self::new(&config.path_to_repos, credentials)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory of the mirror for a repository
    pub fn mirror_path(&self, repo: &ConfiguredRepository) -> PathBuf {
        self.base_dir.join(crate::config::sanitize_repo_name(&repo.name))
    }

    /// Return the mirror for `repo`, bare-cloning it if it does not exist yet.
    /// An existing mirror is returned unchanged.
    pub fn ensure_mirror(&self, repo: &ConfiguredRepository) -> Result<Mirror> {
        let path = self.mirror_path(repo);
        let mirror = Mirror::new(&repo.name, &path, self.credentials.clone());

        if path.exists() {
            if !is_bare_repository(&path) {
                return Err(Error::Clone {
                    repo: repo.name.clone(),
                    message: format!("{} exists but is not a bare repository", path.display()),
                });
            }
            debug!("Using existing mirror at: {}", path.display());
            return Ok(mirror);
        }

        std::fs::create_dir_all(&self.base_dir)?;
        info!("Cloning {} into {}", repo.name, path.display());

        let path_arg = path.to_string_lossy();
        let output = command::output(
            git(&self.base_dir, self.credentials.as_ref()).args([
                "clone",
                "--bare",
                "--quiet",
                repo.url.as_str(),
                &*path_arg,
            ]),
            "clone",
        )?;

        if !output.status.success() {
            remove_partial_clone(&path);
            return Err(Error::Clone {
                repo: repo.name.clone(),
                message: command::stderr_message(&output),
            });
        }

        // A bare clone maps heads onto heads; track them under origin/ instead.
        // Fetch also passes it explicitly; this keeps plain `git fetch` in the mirror consistent.
        if let Err(e) = command::checked(
            git(&path, None).args(["config", "--replace-all", "remote.origin.fetch", TRACKING_REFSPEC]),
            "config",
        ) {
            remove_partial_clone(&path);
            return Err(Error::Clone {
                repo: repo.name.clone(),
                message: e.to_string(),
            });
        }

        Ok(mirror)
    }
}

/// Leave nothing behind so the next run retries from scratch
fn remove_partial_clone(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_dir_all(path) {
            warn!("Failed to remove partial clone {}: {}", path.display(), e);
        }
    }
}

fn is_bare_repository(path: &Path) -> bool {
    path.join("HEAD").is_file() && path.join("objects").is_dir()
}

/// Handle to a local bare mirror
#[derive(Debug, Clone)]
pub struct Mirror {
    name: String,
    path: PathBuf,
    credentials: Option<Credentials>,
}

impl Mirror {
    /// Open an existing mirror without checking it
    pub fn new(name: &str, path: &Path, credentials: Option<Credentials>) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            credentials,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Fetch `origin` with pruning, so branches deleted upstream disappear locally.
    ///
    /// The tracking refspec is given on the command line, so mirrors whose
    /// stored fetch config is missing (e.g. a plain `git clone --bare`) still
    /// populate `refs/remotes/origin/*`.
    pub fn fetch(&self) -> Result<()> {
        debug!("Fetching {} into {}", REMOTE_NAME, self.path.display());

        let output = command::output(
            git(&self.path, self.credentials.as_ref()).args([
                "fetch",
                "--prune",
                "--quiet",
                REMOTE_NAME,
                TRACKING_REFSPEC,
            ]),
            "fetch",
        )?;

        if !output.status.success() {
            return Err(Error::Fetch {
                repo: self.name.clone(),
                message: command::stderr_message(&output),
            });
        }

        Ok(())
    }

    /// All remote-tracking branches of `origin`, excluding the symbolic `origin/HEAD`
    pub fn remote_branches(&self) -> Result<Vec<RemoteBranchRef>> {
        let output = command::checked(
            git(&self.path, None).args([
                "for-each-ref",
                "--format=%(refname)%09%(objectname)%09%(authordate:unix)%09%(symref)",
                &format!("refs/remotes/{}/", REMOTE_NAME),
            ]),
            "for-each-ref",
        )?;

        let branches = parse_ref_listing(&command::stdout_text(&output));
        debug!("Found {} remote branches in {}", branches.len(), self.name);
        Ok(branches)
    }

    /// Look up a single remote-tracking branch by short name
    pub fn remote_branch(&self, short_name: &str) -> Result<Option<RemoteBranchRef>> {
        Ok(self
            .remote_branches()?
            .into_iter()
            .find(|b| b.short_name() == short_name))
    }
}

/// Parse `for-each-ref` output in the format used by [`Mirror::remote_branches`]
pub(crate) fn parse_ref_listing(output: &str) -> Vec<RemoteBranchRef> {
    let prefix = format!("refs/remotes/{}/", REMOTE_NAME);
    let mut branches = Vec::new();

    for line in output.lines() {
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 3 {
            continue;
        }

        let (refname, commit, author_time) = (parts[0], parts[1], parts[2]);
        let is_symbolic = parts.get(3).is_some_and(|s| !s.trim().is_empty());

        // Skip HEAD
        if is_symbolic || refname.ends_with("/HEAD") {
            continue;
        }

        let Some(name) = refname.strip_prefix(&prefix) else {
            continue;
        };

        let tip_author_time = author_time
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_default();

        branches.push(RemoteBranchRef {
            friendly_name: format!("{}/{}", REMOTE_NAME, name),
            upstream_canonical_name: format!("refs/heads/{}", name),
            tip: commit.to_string(),
            tip_author_time,
            is_remote: true,
        });
    }

    branches
}
