//! Ahead/behind computation between a branch tip and master

use super::command::{self, git};
use super::mirror::Mirror;
use crate::error::{Error, Result};

/// Commit counts between a branch tip and master, relative to their merge-base
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DivergenceResult {
    /// Commits reachable from the branch tip but not from master
    pub ahead_by: usize,
    /// Commits reachable from master but not from the branch tip
    pub behind_by: usize,
    /// Common ancestor of the two tips, `None` for unrelated histories
    pub merge_base: Option<String>,
}

impl DivergenceResult {
    /// Every commit on the branch is already reachable from master
    pub fn is_merged(&self) -> bool {
        self.ahead_by == 0
    }
}

impl Mirror {
    /// Merge-base of two commits, `None` for unrelated histories
    pub fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>> {
        let output = command::output(git(self.path(), None).args(["merge-base", a, b]), "merge-base")?;

        match output.status.code() {
            Some(0) => Ok(Some(command::stdout_text(&output).trim().to_string())),
            // git exits 1 with no output when there is no common ancestor
            Some(1) if output.stderr.is_empty() => Ok(None),
            _ => Err(Error::Git {
                command: "merge-base".to_string(),
                message: command::stderr_message(&output),
            }),
        }
    }

    /// Ahead/behind counts of `branch_tip` relative to `master_tip`. Read-only.
    pub fn diverge(&self, branch_tip: &str, master_tip: &str) -> Result<DivergenceResult> {
        let merge_base = self.merge_base(branch_tip, master_tip)?;
        let range = format!("{}...{}", master_tip, branch_tip);
        let output = command::checked(
            git(self.path(), None).args(["rev-list", "--left-right", "--count", &range]),
            "rev-list",
        )?;

        let mut result = parse_left_right_count(&command::stdout_text(&output))?;
        result.merge_base = merge_base;
        Ok(result)
    }
}

/// Parse `rev-list --left-right --count master...branch` output ("<behind>\t<ahead>")
pub(crate) fn parse_left_right_count(output: &str) -> Result<DivergenceResult> {
    let invalid = || Error::Git {
        command: "rev-list".to_string(),
        message: format!("unexpected count output: '{}'", output.trim()),
    };

    let mut counts = output.split_whitespace().map(|n| n.parse::<usize>());
    let behind_by = counts.next().ok_or_else(invalid)?.map_err(|_| invalid())?;
    let ahead_by = counts.next().ok_or_else(invalid)?.map_err(|_| invalid())?;

    Ok(DivergenceResult {
        ahead_by,
        behind_by,
        merge_base: None,
    })
}
