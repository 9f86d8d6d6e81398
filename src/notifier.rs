//! Operator notifications for prune outcomes
//!
//! Notifying can never fail the caller: transport errors are logged and dropped.

use reqwest::blocking::Client;
use serde_json::json;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::pruner::PruneOutcome;

/// Receives every outcome the pruner produces
pub trait Notifier {
    fn notify(&self, outcome: &PruneOutcome, repo_name: &str);
}

/// Chat message for an outcome, `None` for outcomes that are only logged
pub fn format_message(outcome: &PruneOutcome, repo_name: &str) -> Option<String> {
    let branch = outcome.branch();
    let tip = outcome.short_tip();

    match outcome {
        PruneOutcome::Deleted { .. } => Some(format!(
            ":wastebasket: Deleted merged branch `{}` ({}) from *{}*",
            branch, tip, repo_name
        )),
        PruneOutcome::DryRunSkipped { .. } => None,
        PruneOutcome::PushFailed { reason, .. } => Some(format!(
            ":x: Failed to delete `{}` ({}) from *{}*: {}",
            branch, tip, repo_name, reason
        )),
        PruneOutcome::NotificationMismatch { detail, .. } => Some(format!(
            ":warning: Deletion of `{}` ({}) from *{}* was not confirmed: {}",
            branch, tip, repo_name, detail
        )),
    }
}

/// Posts outcomes to a Slack incoming webhook
pub struct SlackNotifier {
    client: Client,
    webhook: String,
}

impl SlackNotifier {
    pub fn new(webhook: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            webhook: webhook.into(),
        }
    }
}

impl Notifier for SlackNotifier {
    fn notify(&self, outcome: &PruneOutcome, repo_name: &str) {
        let Some(text) = format_message(outcome, repo_name) else {
            debug!("Not posting to Slack for {}: {}", repo_name, outcome);
            return;
        };

        let result = self
            .client
            .post(&self.webhook)
            .json(&json!({ "text": text }))
            .send();

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("Posted Slack notification for {}", outcome.branch());
            }
            Ok(response) => {
                error!(
                    "Slack webhook returned {} for {} in {}",
                    response.status(),
                    outcome.branch(),
                    repo_name
                );
            }
            Err(e) => {
                // reqwest errors may embed the URL, which is itself a secret
                error!(
                    "Failed to post Slack notification for {} in {}: {}",
                    outcome.branch(),
                    repo_name,
                    e.without_url()
                );
            }
        }
    }
}

/// Used when no webhook is configured
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, outcome: &PruneOutcome, repo_name: &str) {
        info!("{}: {}", repo_name, outcome);
    }
}

/// Slack when a webhook is configured, otherwise log-only
pub fn from_config(config: &Config) -> Box<dyn Notifier> {
    match config.slack_webhook.as_deref() {
        Some(webhook) => Box::new(SlackNotifier::new(webhook)),
        None => Box::new(LogNotifier),
    }
}
