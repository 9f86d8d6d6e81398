//! Git operations module using the git CLI
//!
//! Provides functionality for:
//! - Cloning and locating bare mirrors of configured repositories
//! - Fetching remote branches with pruning
//! - Computing ahead/behind divergence against master
//! - Deleting remote branches by push

mod command;
mod divergence;
mod lock;
mod mirror;
mod push;

pub use divergence::DivergenceResult;
pub use lock::MirrorLock;
pub use mirror::{Mirror, REMOTE_NAME, RemoteBranchRef, RepositoryCache, short_hash};
pub use push::{PushReport, RefUpdate, RefUpdateStatus};

use crate::error::Result;

/// Mirror operations the pruner depends on
pub trait MirrorOps {
    /// Remote-tracking branches as of the last fetch
    fn remote_branches(&self) -> Result<Vec<RemoteBranchRef>>;

    /// Ahead/behind of `branch_tip` relative to `master_tip`
    fn diverge(&self, branch_tip: &str, master_tip: &str) -> Result<DivergenceResult>;

    /// Push a deletion of `branch` to the remote
    fn push_delete(&self, branch: &RemoteBranchRef) -> Result<PushReport>;
}

impl MirrorOps for Mirror {
    fn remote_branches(&self) -> Result<Vec<RemoteBranchRef>> {
        Mirror::remote_branches(self)
    }

    fn diverge(&self, branch_tip: &str, master_tip: &str) -> Result<DivergenceResult> {
        Mirror::diverge(self, branch_tip, master_tip)
    }

    fn push_delete(&self, branch: &RemoteBranchRef) -> Result<PushReport> {
        Mirror::push_delete(self, branch)
    }
}
