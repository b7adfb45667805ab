use std::sync::Arc;

use axum::{routing::post, Router};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::deploy::{CleanupRunner, DeploymentRunner, ScriptRunner};
use crate::dispatch::EventDispatcher;
use crate::platform::github::{GitHubCredentials, GitHubNotifier};

pub struct AppState {
    pub config: AppConfig,
    pub dispatcher: EventDispatcher,
}

impl AppState {
    /// Build the production state. Fails if the app's private key is unusable.
    pub fn new(config: AppConfig) -> crate::error::Result<Self> {
        let credentials = GitHubCredentials::new(&config.github)?;
        let notifier = GitHubNotifier::new(&config.github);

        for script in [&config.scripts.provision, &config.scripts.cleanup] {
            if !script.exists() {
                tracing::warn!(script = %script.display(), "Configured script not found");
            }
        }

        let dispatcher = EventDispatcher::new(
            Arc::new(credentials),
            Arc::new(notifier),
            DeploymentRunner::new(ScriptRunner::provision(&config.scripts)),
            CleanupRunner::new(ScriptRunner::cleanup(&config.scripts)),
            &config.github.api_base_url,
        );

        Ok(Self { config, dispatcher })
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(crate::webhook::handler::handle_webhook))
        .route("/health", axum::routing::get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}
