pub mod locks;

use std::sync::Arc;

use crate::deploy::{CleanupRunner, DeploymentResult, DeploymentRunner};
use crate::platform::github::comment_endpoint;
use crate::platform::types::{InstallationAccessToken, PullRequestRef};
use crate::platform::{CredentialProvider, Notifier};
use crate::webhook::events::{PullRequestAction, WebhookEvent};

use locks::PrLocks;

pub const DEPLOYMENT_STARTED: &str = "Deployment started for this pull request.";
pub const DEPLOYMENT_FAILED: &str = "Deployment failed. Please check the logs.";
pub const CLEANUP_COMPLETED: &str = "Cleanup completed for this pull request.";
pub const CLEANUP_FAILED: &str = "Cleanup failed. Please check the logs.";

/// What the dispatcher did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Deployed,
    CleanedUp,
    NoAction,
}

impl DispatchOutcome {
    pub fn message(self) -> &'static str {
        match self {
            DispatchOutcome::Deployed => "Deployment processed",
            DispatchOutcome::CleanedUp => "Cleanup processed",
            DispatchOutcome::NoAction => "No action taken",
        }
    }
}

/// Comment text reporting a finished deployment.
pub fn deployment_message(result: &DeploymentResult) -> String {
    if !result.succeeded {
        return DEPLOYMENT_FAILED.to_string();
    }

    let mut message = match &result.url {
        Some(url) => format!("Deployment successful. [Deployed application]({url})."),
        None => "Deployment successful.".to_string(),
    };
    if let Some(name) = &result.environment_name {
        message.push_str(&format!(" Environment: `{name}`."));
    }
    message
}

/// Maps pull-request transitions to deploy and cleanup runs, reporting each on the PR.
pub struct EventDispatcher {
    credentials: Arc<dyn CredentialProvider>,
    notifier: Arc<dyn Notifier>,
    deployer: DeploymentRunner,
    cleaner: CleanupRunner,
    api_base_url: String,
    locks: PrLocks,
}

impl EventDispatcher {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        notifier: Arc<dyn Notifier>,
        deployer: DeploymentRunner,
        cleaner: CleanupRunner,
        api_base_url: &str,
    ) -> Self {
        Self {
            credentials,
            notifier,
            deployer,
            cleaner,
            api_base_url: api_base_url.to_string(),
            locks: PrLocks::new(),
        }
    }

    pub fn locks(&self) -> &PrLocks {
        &self.locks
    }

    /// Handle one verified event to completion.
    pub async fn dispatch(&self, event: &WebhookEvent) -> DispatchOutcome {
        if event.action == PullRequestAction::Other {
            tracing::debug!(
                repo = %event.repository_full_name,
                pr = event.pull_request_number,
                "Ignoring pull request action"
            );
            return DispatchOutcome::NoAction;
        }

        let endpoint = match comment_endpoint(
            &self.api_base_url,
            &event.repository_full_name,
            event.pull_request_number,
        ) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                tracing::warn!(error = %e, "Event has no usable pull request context");
                return DispatchOutcome::NoAction;
            }
        };

        let _guard = self
            .locks
            .lock(PullRequestRef {
                repo_full_name: event.repository_full_name.clone(),
                number: event.pull_request_number,
            })
            .await;

        match event.action {
            PullRequestAction::Opened | PullRequestAction::Synchronize => {
                self.deploy(event, &endpoint).await;
                DispatchOutcome::Deployed
            }
            PullRequestAction::Closed => {
                self.cleanup(event, &endpoint).await;
                DispatchOutcome::CleanedUp
            }
            PullRequestAction::Other => DispatchOutcome::NoAction,
        }
    }

    async fn deploy(&self, event: &WebhookEvent, endpoint: &str) {
        tracing::info!(
            repo = %event.repository_full_name,
            pr = event.pull_request_number,
            branch = %event.head_branch,
            action = ?event.action,
            "Deploying pull request"
        );

        let Some(token) = self.token_or_report(event, endpoint, DEPLOYMENT_FAILED).await else {
            return;
        };

        self.notify(event, endpoint, DEPLOYMENT_STARTED, &token).await;

        let result = self
            .deployer
            .run(&event.head_branch, event.pull_request_number)
            .await;

        self.notify(event, endpoint, &deployment_message(&result), &token)
            .await;
    }

    async fn cleanup(&self, event: &WebhookEvent, endpoint: &str) {
        tracing::info!(
            repo = %event.repository_full_name,
            pr = event.pull_request_number,
            branch = %event.head_branch,
            "Cleaning up pull request environment"
        );

        // Cleanup does not depend on credentials and runs whether or not the PR merged.
        let succeeded = self
            .cleaner
            .run(&event.head_branch, event.pull_request_number)
            .await;
        let message = if succeeded {
            CLEANUP_COMPLETED
        } else {
            CLEANUP_FAILED
        };

        let Some(token) = self.token_or_report(event, endpoint, message).await else {
            return;
        };

        self.notify(event, endpoint, message, &token).await;
    }

    /// Fetch a token; on failure, post `failure_message` with a prior token if one is still valid.
    async fn token_or_report(
        &self,
        event: &WebhookEvent,
        endpoint: &str,
        failure_message: &str,
    ) -> Option<InstallationAccessToken> {
        match self
            .credentials
            .installation_token(event.installation_id)
            .await
        {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::error!(
                    repo = %event.repository_full_name,
                    pr = event.pull_request_number,
                    installation_id = event.installation_id,
                    error = %e,
                    "Failed to obtain installation token"
                );

                match self
                    .credentials
                    .last_usable_token(event.installation_id)
                    .await
                {
                    Some(prior) => {
                        self.notify(event, endpoint, failure_message, &prior).await;
                    }
                    None => {
                        tracing::warn!(
                            repo = %event.repository_full_name,
                            pr = event.pull_request_number,
                            "No usable token to report the failure on the pull request"
                        );
                    }
                }
                None
            }
        }
    }

    async fn notify(
        &self,
        event: &WebhookEvent,
        endpoint: &str,
        message: &str,
        token: &InstallationAccessToken,
    ) {
        if let Err(e) = self.notifier.post(endpoint, message, token).await {
            tracing::warn!(
                repo = %event.repository_full_name,
                pr = event.pull_request_number,
                error = %e,
                "Failed to post pull request comment"
            );
        }
    }
}
