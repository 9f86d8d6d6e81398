//! Deleting remote branches by push

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use super::command::{self, git};
use super::mirror::{Mirror, REMOTE_NAME, RemoteBranchRef};
use crate::error::Result;

/// `<flag>\t<from>:<to>\t<summary> (<reason>)`
static PORCELAIN_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<flag>.)\t(?P<from>[^:\t]*):(?P<to>[^\t]+)\t(?P<summary>\[[^\]]+\]|\S+)(?: \((?P<reason>.*)\))?$")
        .expect("porcelain regex is valid")
});

/// What the remote reported for one ref
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefUpdateStatus {
    /// The remote removed the ref
    Deleted,
    /// The remote ref no longer points at the tip we expected to delete
    Stale(String),
    /// The remote refused the update
    Rejected(String),
    /// Anything else (up to date, forced update, ...)
    Other(String),
}

/// Per-ref line of a push report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    /// Ref on the remote (e.g., "refs/heads/feature/a")
    pub reference: String,
    pub status: RefUpdateStatus,
}

/// Outcome of a deletion push as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PushReport {
    pub updates: Vec<RefUpdate>,
    /// Whether git exited successfully
    pub success: bool,
    /// Error output, used when no per-ref status was reported
    pub message: String,
}

impl PushReport {
    /// Status reported for a given remote ref
    pub fn update_for(&self, reference: &str) -> Option<&RefUpdate> {
        self.updates.iter().find(|u| u.reference == reference)
    }
}

impl Mirror {
    /// Delete `branch` on `origin`, leased on its last observed tip so a branch
    /// that moved since the fetch is refused instead of deleted.
    pub fn push_delete(&self, branch: &RemoteBranchRef) -> Result<PushReport> {
        let lease = format!("--force-with-lease={}:{}", branch.upstream_canonical_name, branch.tip);
        let refspec = format!(":{}", branch.upstream_canonical_name);

        debug!("Pushing deletion of {} at {}", branch.friendly_name, branch.short_tip());

        let output = command::output(
            git(self.path(), self.credentials()).args(["push", "--porcelain", &lease, REMOTE_NAME, &refspec]),
            "push",
        )?;

        Ok(PushReport {
            updates: parse_porcelain(&command::stdout_text(&output)),
            success: output.status.success(),
            message: command::stderr_message(&output),
        })
    }
}

/// Parse `git push --porcelain` output into per-ref updates
pub(crate) fn parse_porcelain(output: &str) -> Vec<RefUpdate> {
    output
        .lines()
        .filter_map(|line| PORCELAIN_LINE.captures(line))
        .map(|caps| {
            let flag = &caps["flag"];
            let summary = caps["summary"].to_string();
            let reason = caps.name("reason").map(|r| r.as_str().to_string());

            let status = match flag {
                "-" => RefUpdateStatus::Deleted,
                "!" => {
                    let reason = reason.unwrap_or_else(|| summary.clone());
                    if reason.contains("stale info") {
                        RefUpdateStatus::Stale(reason)
                    } else {
                        RefUpdateStatus::Rejected(reason)
                    }
                }
                _ => RefUpdateStatus::Other(summary),
            };

            RefUpdate {
                reference: caps["to"].to_string(),
                status,
            }
        })
        .collect()
}
