//! Drives one pruning pass over every configured repository
//!
//! Repositories are processed sequentially. A failure in one repository is
//! logged and counted; the run moves on to the next.

use tracing::{error, info, info_span, warn};

use crate::config::{Config, ConfiguredRepository};
use crate::error::{Error, Result};
use crate::git::{MirrorLock, RepositoryCache};
use crate::notifier::Notifier;
use crate::pruner::{PruneOutcome, PruneReport, Pruner};

/// Totals for a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Repositories that were fetched and evaluated
    pub repositories_processed: usize,
    /// Repositories aborted by a clone, fetch or git error
    pub repositories_failed: usize,
    /// Repositories skipped (missing master, mirror locked)
    pub repositories_skipped: usize,
    pub deleted: usize,
    pub dry_run: usize,
    pub push_failed: usize,
    pub mismatched: usize,
}

impl RunSummary {
    fn record(&mut self, report: &PruneReport) {
        if report.master_missing {
            self.repositories_skipped += 1;
            return;
        }

        self.repositories_processed += 1;
        for outcome in &report.outcomes {
            match outcome {
                PruneOutcome::Deleted { .. } => self.deleted += 1,
                PruneOutcome::DryRunSkipped { .. } => self.dry_run += 1,
                PruneOutcome::PushFailed { .. } => self.push_failed += 1,
                PruneOutcome::NotificationMismatch { .. } => self.mismatched += 1,
            }
        }
    }
}

/// Sequential runner over configured repositories
pub struct Runner<'a> {
    cache: RepositoryCache,
    pruner: Pruner<'a>,
}

impl<'a> Runner<'a> {
    pub fn new(cache: RepositoryCache, pruner: Pruner<'a>) -> Self {
        Self { cache, pruner }
    }

    /// Runner wired from configuration, with credentials already resolved
    pub fn from_config(
        config: &Config,
        credentials: Option<crate::credentials::Credentials>,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self::new(
            RepositoryCache::from_config(config, credentials),
            Pruner::from_config(config, notifier),
        )
    }

    /// Process every repository in order; never fails as a whole
    pub fn run(&self, repositories: &[ConfiguredRepository]) -> RunSummary {
        let mut summary = RunSummary::default();

        for repo in repositories {
            let span = info_span!("repo", name = %repo.name);
            let _guard = span.enter();

            match self.process(repo) {
                Ok(report) => summary.record(&report),
                Err(Error::Lock { path }) => {
                    warn!("Skipping {}: {} is held by another run", repo.name, path.display());
                    summary.repositories_skipped += 1;
                }
                Err(e) => {
                    error!("Skipping {}: {}", repo.name, e);
                    summary.repositories_failed += 1;
                }
            }
        }

        info!(
            "Run finished: {} processed, {} failed, {} skipped; {} deleted, {} dry-run, {} failed, {} unconfirmed",
            summary.repositories_processed,
            summary.repositories_failed,
            summary.repositories_skipped,
            summary.deleted,
            summary.dry_run,
            summary.push_failed,
            summary.mismatched
        );

        summary
    }

    /// Lock, mirror, fetch and evaluate a single repository
    pub fn process(&self, repo: &ConfiguredRepository) -> Result<PruneReport> {
        let _lock = MirrorLock::acquire(&self.cache.mirror_path(repo))?;

        let mirror = self.cache.ensure_mirror(repo)?;
        mirror.fetch()?;

        let report = self.pruner.evaluate(repo, &mirror)?;
        info!(
            "{}: evaluated {} branches, {} acted upon",
            repo.name,
            report.evaluated,
            report.outcomes.len()
        );
        Ok(report)
    }
}
