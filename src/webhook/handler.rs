use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::dispatch::DispatchOutcome;
use crate::server::AppState;
use crate::webhook::events::WebhookEvent;
use crate::webhook::signature::verify;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookResponse {
    pub message: String,
}

fn respond(status: StatusCode, message: &str) -> (StatusCode, Json<WebhookResponse>) {
    (
        status,
        Json(WebhookResponse {
            message: message.to_string(),
        }),
    )
}

pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookResponse>) {
    // Verify signature before looking at anything in the payload
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok());
    if signature.is_none() {
        tracing::warn!("Missing X-Hub-Signature-256 header");
    }
    if !verify(&body, signature, state.config.webhook_secret()) {
        tracing::warn!("Webhook signature verification failed");
        return respond(StatusCode::UNAUTHORIZED, "Invalid signature");
    }

    let no_action = respond(StatusCode::OK, DispatchOutcome::NoAction.message());

    if let Some(event_type) = headers.get("x-github-event").and_then(|v| v.to_str().ok()) {
        if event_type != "pull_request" {
            tracing::debug!(event_type = %event_type, "Ignoring unsupported event");
            return no_action;
        }
    }

    // Parse event
    let event = match WebhookEvent::parse(&body) {
        Ok(Some(event)) => event,
        Ok(None) => {
            tracing::debug!("Event has no pull request context");
            return no_action;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse webhook payload");
            return no_action;
        }
    };

    tracing::info!(
        repo = %event.repository_full_name,
        pr = event.pull_request_number,
        action = ?event.action,
        "Received pull request event"
    );

    // The actions run in their own task so a sender that stops waiting
    // does not cancel a deployment halfway through.
    let task_state = Arc::clone(&state);
    let task = tokio::spawn(async move {
        let outcome = task_state.dispatcher.dispatch(&event).await;
        tracing::info!(
            repo = %event.repository_full_name,
            pr = event.pull_request_number,
            outcome = ?outcome,
            "Pull request event handled"
        );
        outcome
    });

    match task.await {
        Ok(outcome) => respond(StatusCode::OK, outcome.message()),
        Err(e) => {
            tracing::error!(error = %e, "Pull request event task failed");
            respond(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}
