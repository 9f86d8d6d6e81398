//! branch-pruner - deletes fully-merged remote branches across a fleet of repositories
//!
//! For each configured repository the runner keeps a bare mirror up to date,
//! compares every remote branch against the repository's master branch, and
//! deletes (or, in dry-run mode, reports) the branches master already contains.

pub mod config;
pub mod credentials;
pub mod error;
pub mod git;
pub mod notifier;
pub mod pruner;
pub mod runner;
