use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Webhook signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("Installation token exchange failed with status {status}: {body}")]
    UpstreamAuth { status: u16, body: String },

    #[error("Script execution failed: {0}")]
    ScriptExecution(String),

    #[error("Script {script} timed out after {timeout:?}")]
    ScriptTimeout { script: String, timeout: Duration },

    #[error("Failed to post comment{}: {message}", status_suffix(.status))]
    Notify { status: Option<u16>, message: String },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, AppError>;
