//! Pruning policy
//!
//! Decides, per remote branch, whether it is fully merged into master and, if
//! so, deletes it on the remote (or only logs it in dry-run mode). Failures
//! while evaluating or deleting one branch never stop the others.

use std::fmt;
use tracing::{debug, error, warn};

use crate::config::{Config, ConfiguredRepository};
use crate::error::Result;
use crate::git::{MirrorOps, PushReport, RefUpdateStatus, RemoteBranchRef, short_hash};
use crate::notifier::Notifier;

/// Result of acting on one merged branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneOutcome {
    /// The remote confirmed the deletion
    Deleted { branch: String, tip: String },
    /// Would have been deleted, but pushing is disabled
    DryRunSkipped { branch: String, tip: String },
    /// The push failed or the remote refused it
    PushFailed { branch: String, tip: String, reason: String },
    /// The remote's report did not confirm deletion of the tip we observed
    NotificationMismatch { branch: String, tip: String, detail: String },
}

impl PruneOutcome {
    /// Friendly name of the branch (e.g., "origin/feature/a")
    pub fn branch(&self) -> &str {
        match self {
            Self::Deleted { branch, .. }
            | Self::DryRunSkipped { branch, .. }
            | Self::PushFailed { branch, .. }
            | Self::NotificationMismatch { branch, .. } => branch,
        }
    }

    /// Tip the branch had when it was evaluated
    pub fn tip(&self) -> &str {
        match self {
            Self::Deleted { tip, .. }
            | Self::DryRunSkipped { tip, .. }
            | Self::PushFailed { tip, .. }
            | Self::NotificationMismatch { tip, .. } => tip,
        }
    }

    pub fn short_tip(&self) -> &str {
        short_hash(self.tip())
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::PushFailed { .. } | Self::NotificationMismatch { .. })
    }
}

impl fmt::Display for PruneOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (branch, tip) = (self.branch(), self.short_tip());
        match self {
            Self::Deleted { .. } => write!(f, "deleted {} ({})", branch, tip),
            Self::DryRunSkipped { .. } => write!(f, "would delete {} ({})", branch, tip),
            Self::PushFailed { reason, .. } => {
                write!(f, "failed to delete {} ({}): {}", branch, tip, reason)
            }
            Self::NotificationMismatch { detail, .. } => {
                write!(f, "deletion of {} ({}) not confirmed: {}", branch, tip, detail)
            }
        }
    }
}

/// Everything one repository pass produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// One entry per merged branch acted upon, in evaluation order
    pub outcomes: Vec<PruneOutcome>,
    /// Number of candidate branches compared against master
    pub evaluated: usize,
    /// Branches whose divergence could not be computed
    pub divergence_errors: usize,
    /// `origin/<master>` did not exist, so nothing was evaluated
    pub master_missing: bool,
}

/// Applies the pruning policy to one mirror at a time
pub struct Pruner<'a> {
    push_deletes: bool,
    notifier: &'a dyn Notifier,
}

impl<'a> Pruner<'a> {
    pub fn new(push_deletes: bool, notifier: &'a dyn Notifier) -> Self {
        Self {
            push_deletes,
            notifier,
        }
    }

    pub fn from_config(config: &Config, notifier: &'a dyn Notifier) -> Self {
        Self::new(config.push_deletes_to_remote, notifier)
    }

    /// Evaluate every remote branch of `repo` against its master branch.
    ///
    /// Only listing the mirror's refs can fail; everything after that is
    /// handled per branch.
    pub fn evaluate(&self, repo: &ConfiguredRepository, mirror: &dyn MirrorOps) -> Result<PruneReport> {
        let branches = mirror.remote_branches()?;

        let Some(master) = branches
            .iter()
            .find(|b| b.short_name() == repo.master_branch_name)
            .cloned()
        else {
            warn!(
                "{}/{} not found in {}; skipping repository",
                crate::git::REMOTE_NAME,
                repo.master_branch_name,
                repo.name
            );
            return Ok(PruneReport {
                master_missing: true,
                ..Default::default()
            });
        };

        let candidates = select_candidates(repo, &master, branches);
        debug!("{} candidate branches in {}", candidates.len(), repo.name);

        let mut report = PruneReport::default();
        for branch in &candidates {
            report.evaluated += 1;

            let divergence = match mirror.diverge(&branch.tip, &master.tip) {
                Ok(divergence) => divergence,
                Err(e) => {
                    error!(
                        "Failed to compare {} ({}) with {} in {}: {}",
                        branch.friendly_name,
                        branch.short_tip(),
                        master.friendly_name,
                        repo.name,
                        e
                    );
                    report.divergence_errors += 1;
                    continue;
                }
            };

            debug!(
                "{} ({}): ahead {}, behind {}",
                branch.friendly_name,
                branch.short_tip(),
                divergence.ahead_by,
                divergence.behind_by
            );

            if !divergence.is_merged() {
                continue;
            }

            let outcome = self.prune_branch(repo, mirror, branch);
            self.notifier.notify(&outcome, &repo.name);
            report.outcomes.push(outcome);
        }

        Ok(report)
    }

    fn prune_branch(
        &self,
        repo: &ConfiguredRepository,
        mirror: &dyn MirrorOps,
        branch: &RemoteBranchRef,
    ) -> PruneOutcome {
        if !self.push_deletes {
            debug!(
                "[dry run] would delete {} ({}) from {}",
                branch.friendly_name,
                branch.short_tip(),
                repo.name
            );
            return PruneOutcome::DryRunSkipped {
                branch: branch.friendly_name.clone(),
                tip: branch.tip.clone(),
            };
        }

        let outcome = match mirror.push_delete(branch) {
            Ok(report) => outcome_from_report(branch, &report),
            Err(e) => PruneOutcome::PushFailed {
                branch: branch.friendly_name.clone(),
                tip: branch.tip.clone(),
                reason: e.to_string(),
            },
        };

        if outcome.is_failure() {
            error!("{}: {}", repo.name, outcome);
        } else {
            debug!("{}: {}", repo.name, outcome);
        }
        outcome
    }
}

/// Remote branches eligible for evaluation, most recently authored first.
///
/// Master is always excluded, whether or not it is in the ignore list.
fn select_candidates(
    repo: &ConfiguredRepository,
    master: &RemoteBranchRef,
    branches: Vec<RemoteBranchRef>,
) -> Vec<RemoteBranchRef> {
    let mut candidates: Vec<RemoteBranchRef> = branches
        .into_iter()
        .filter(|b| b.upstream_canonical_name != master.upstream_canonical_name)
        .filter(|b| !repo.is_ignored(b.short_name(), &b.friendly_name))
        .collect();

    candidates.sort_by(|a, b| b.tip_author_time.cmp(&a.tip_author_time));
    candidates
}

/// Interpret the transport's report for a deletion push of `branch`.
///
/// The push is leased on the observed tip, so a reported deletion is a
/// deletion of that tip. A ref that moved comes back as stale.
pub(crate) fn outcome_from_report(branch: &RemoteBranchRef, report: &PushReport) -> PruneOutcome {
    let friendly = branch.friendly_name.clone();
    let tip = branch.tip.clone();

    match report.update_for(&branch.upstream_canonical_name).map(|u| &u.status) {
        Some(RefUpdateStatus::Deleted) => PruneOutcome::Deleted { branch: friendly, tip },
        Some(RefUpdateStatus::Stale(reason)) => PruneOutcome::NotificationMismatch {
            branch: friendly,
            tip,
            detail: format!("branch moved on the remote ({})", reason),
        },
        Some(RefUpdateStatus::Rejected(reason)) => PruneOutcome::PushFailed {
            branch: friendly,
            tip,
            reason: reason.clone(),
        },
        Some(RefUpdateStatus::Other(summary)) => PruneOutcome::NotificationMismatch {
            branch: friendly,
            tip,
            detail: format!("unexpected push status {}", summary),
        },
        None if !report.success => PruneOutcome::PushFailed {
            branch: friendly,
            tip,
            reason: report.message.clone(),
        },
        None => PruneOutcome::NotificationMismatch {
            branch: friendly,
            tip,
            detail: "remote did not report the ref".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::git::{DivergenceResult, RefUpdate};
    use chrono::DateTime;
    use std::cell::RefCell;
    use std::collections::{BTreeSet, HashMap};

    fn branch(name: &str, tip: &str, authored: i64) -> RemoteBranchRef {
        RemoteBranchRef {
            friendly_name: format!("origin/{}", name),
            upstream_canonical_name: format!("refs/heads/{}", name),
            tip: tip.to_string(),
            tip_author_time: DateTime::from_timestamp(authored, 0).unwrap(),
            is_remote: true,
        }
    }

    fn repo(ignored: &[&str]) -> ConfiguredRepository {
        ConfiguredRepository {
            name: "api".to_string(),
            url: "https://example.com/api.git".to_string(),
            master_branch_name: "master".to_string(),
            ignored_branches: ignored.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    /// In-memory mirror: divergence keyed by branch tip, push reports keyed by ref
    #[derive(Default)]
    struct FakeMirror {
        branches: Vec<RemoteBranchRef>,
        ahead: HashMap<String, usize>,
        failing_diverge: Vec<String>,
        push_reports: HashMap<String, PushReport>,
        pushes: RefCell<Vec<String>>,
    }

    impl FakeMirror {
        fn with(branches: Vec<(RemoteBranchRef, usize)>) -> Self {
            let mut mirror = Self::default();
            for (b, ahead) in branches {
                mirror.ahead.insert(b.tip.clone(), ahead);
                mirror.branches.push(b);
            }
            mirror
        }

        fn deleted(reference: &str) -> PushReport {
            PushReport {
                updates: vec![RefUpdate {
                    reference: reference.to_string(),
                    status: RefUpdateStatus::Deleted,
                }],
                success: true,
                message: String::new(),
            }
        }
    }

    impl MirrorOps for FakeMirror {
        fn remote_branches(&self) -> Result<Vec<RemoteBranchRef>> {
            Ok(self.branches.clone())
        }

        fn diverge(&self, branch_tip: &str, _master_tip: &str) -> Result<DivergenceResult> {
            if self.failing_diverge.iter().any(|t| t == branch_tip) {
                return Err(Error::Git {
                    command: "rev-list".to_string(),
                    message: "bad object".to_string(),
                });
            }
            Ok(DivergenceResult {
                ahead_by: self.ahead.get(branch_tip).copied().unwrap_or(0),
                behind_by: 1,
                merge_base: None,
            })
        }

        fn push_delete(&self, branch: &RemoteBranchRef) -> Result<PushReport> {
            self.pushes.borrow_mut().push(branch.short_name().to_string());
            Ok(self
                .push_reports
                .get(&branch.upstream_canonical_name)
                .cloned()
                .unwrap_or_else(|| Self::deleted(&branch.upstream_canonical_name)))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        seen: RefCell<Vec<(String, PruneOutcome)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, outcome: &PruneOutcome, repo_name: &str) {
            self.seen.borrow_mut().push((repo_name.to_string(), outcome.clone()));
        }
    }

    fn example_mirror() -> FakeMirror {
        FakeMirror::with(vec![
            (branch("master", "m000000000", 300), 0),
            (branch("feature/a", "a000000000", 100), 0),
            (branch("feature/b", "b000000000", 200), 2),
        ])
    }

    #[test]
    fn test_only_merged_branch_is_reported() {
        let notifier = RecordingNotifier::default();
        let pruner = Pruner::new(true, &notifier);
        let mirror = example_mirror();

        let report = pruner.evaluate(&repo(&["master"]), &mirror).unwrap();

        assert_eq!(
            report.outcomes,
            vec![PruneOutcome::Deleted {
                branch: "origin/feature/a".to_string(),
                tip: "a000000000".to_string(),
            }]
        );
        assert_eq!(report.evaluated, 2);
        assert_eq!(*mirror.pushes.borrow(), vec!["feature/a".to_string()]);
        assert_eq!(notifier.seen.borrow().len(), 1);
        assert_eq!(notifier.seen.borrow()[0].0, "api");
    }

    #[test]
    fn test_dry_run_never_pushes_and_is_idempotent() {
        let notifier = RecordingNotifier::default();
        let pruner = Pruner::new(false, &notifier);
        let mirror = example_mirror();

        let first = pruner.evaluate(&repo(&["master"]), &mirror).unwrap();
        let second = pruner.evaluate(&repo(&["master"]), &mirror).unwrap();

        assert_eq!(first, second);
        assert!(matches!(&first.outcomes[..], [PruneOutcome::DryRunSkipped { .. }]));
        assert!(mirror.pushes.borrow().is_empty());
    }

    #[test]
    fn test_master_excluded_even_when_not_ignored() {
        let notifier = RecordingNotifier::default();
        let pruner = Pruner::new(false, &notifier);

        let report = pruner.evaluate(&repo(&[]), &example_mirror()).unwrap();

        assert_eq!(report.evaluated, 2);
        assert!(report.outcomes.iter().all(|o| o.branch() != "origin/master"));
    }

    #[test]
    fn test_ignored_branch_produces_no_outcome() {
        let notifier = RecordingNotifier::default();
        let pruner = Pruner::new(true, &notifier);
        let mirror = example_mirror();

        let report = pruner.evaluate(&repo(&["feature/*"]), &mirror).unwrap();

        assert_eq!(report.evaluated, 0);
        assert!(report.outcomes.is_empty());
        assert!(mirror.pushes.borrow().is_empty());
    }

    #[test]
    fn test_missing_master_skips_repository() {
        let notifier = RecordingNotifier::default();
        let pruner = Pruner::new(true, &notifier);
        let mirror = FakeMirror::with(vec![(branch("feature/a", "a000000000", 100), 0)]);

        let report = pruner.evaluate(&repo(&[]), &mirror).unwrap();

        assert!(report.master_missing);
        assert_eq!(report.evaluated, 0);
        assert!(report.outcomes.is_empty());
        assert!(notifier.seen.borrow().is_empty());
    }

    #[test]
    fn test_outcomes_ordered_newest_first() {
        let notifier = RecordingNotifier::default();
        let pruner = Pruner::new(false, &notifier);
        let mirror = FakeMirror::with(vec![
            (branch("master", "m000000000", 50), 0),
            (branch("old", "o000000000", 10), 0),
            (branch("new", "n000000000", 30), 0),
            (branch("mid", "d000000000", 20), 0),
        ]);

        let report = pruner.evaluate(&repo(&[]), &mirror).unwrap();
        let names: Vec<&str> = report.outcomes.iter().map(|o| o.branch()).collect();
        assert_eq!(names, vec!["origin/new", "origin/mid", "origin/old"]);
    }

    #[test]
    fn test_stale_lease_is_mismatch_and_iteration_continues() {
        let notifier = RecordingNotifier::default();
        let pruner = Pruner::new(true, &notifier);
        let mut mirror = FakeMirror::with(vec![
            (branch("master", "m000000000", 300), 0),
            (branch("moved", "c000000000", 200), 0),
            (branch("rejected", "r000000000", 150), 0),
            (branch("fine", "f000000000", 100), 0),
        ]);
        mirror.push_reports.insert(
            "refs/heads/moved".to_string(),
            PushReport {
                updates: vec![RefUpdate {
                    reference: "refs/heads/moved".to_string(),
                    status: RefUpdateStatus::Stale("stale info".to_string()),
                }],
                success: false,
                message: "failed to push some refs".to_string(),
            },
        );
        mirror.push_reports.insert(
            "refs/heads/rejected".to_string(),
            PushReport {
                updates: vec![RefUpdate {
                    reference: "refs/heads/rejected".to_string(),
                    status: RefUpdateStatus::Rejected("protected branch".to_string()),
                }],
                success: false,
                message: String::new(),
            },
        );

        let report = pruner.evaluate(&repo(&[]), &mirror).unwrap();

        assert!(matches!(report.outcomes[0], PruneOutcome::NotificationMismatch { .. }));
        assert_eq!(
            report.outcomes[1],
            PruneOutcome::PushFailed {
                branch: "origin/rejected".to_string(),
                tip: "r000000000".to_string(),
                reason: "protected branch".to_string(),
            }
        );
        assert!(matches!(report.outcomes[2], PruneOutcome::Deleted { .. }));
        assert_eq!(notifier.seen.borrow().len(), 3);
    }

    #[test]
    fn test_divergence_error_is_branch_local() {
        let notifier = RecordingNotifier::default();
        let pruner = Pruner::new(false, &notifier);
        let mut mirror = example_mirror();
        mirror.failing_diverge.push("a000000000".to_string());
        mirror.branches.push(branch("feature/c", "c000000000", 50));

        let report = pruner.evaluate(&repo(&[]), &mirror).unwrap();

        assert_eq!(report.divergence_errors, 1);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].branch(), "origin/feature/c");
    }

    #[test]
    fn test_outcome_from_report_without_ref_line() {
        let b = branch("feature/a", "a000000000", 0);

        let failed = PushReport {
            success: false,
            message: "Authentication failed".to_string(),
            ..Default::default()
        };
        assert_eq!(
            outcome_from_report(&b, &failed),
            PruneOutcome::PushFailed {
                branch: "origin/feature/a".to_string(),
                tip: "a000000000".to_string(),
                reason: "Authentication failed".to_string(),
            }
        );

        let silent = PushReport {
            success: true,
            ..Default::default()
        };
        assert!(matches!(
            outcome_from_report(&b, &silent),
            PruneOutcome::NotificationMismatch { .. }
        ));
    }

    /// Collects formatted log output in memory
    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_outcome_logged_once_at_info_without_webhook() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let notifier = crate::notifier::LogNotifier;
        let pruner = Pruner::new(false, &notifier);
        tracing::subscriber::with_default(subscriber, || {
            pruner.evaluate(&repo(&[]), &example_mirror()).unwrap();
        });

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output.matches("origin/feature/a").count(), 1, "{}", output);
    }

    #[test]
    fn test_outcome_display_uses_short_hash() {
        let outcome = PruneOutcome::Deleted {
            branch: "origin/feature/a".to_string(),
            tip: "0123456789abcdef".to_string(),
        };
        assert_eq!(outcome.to_string(), "deleted origin/feature/a (0123456)");
    }
}
