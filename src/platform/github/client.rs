use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::GitHubConfig;
use crate::error::{AppError, Result};
use crate::platform::types::InstallationAccessToken;
use crate::platform::{CredentialProvider, Notifier};

use super::auth::{AppIdentityAssertion, AppSigner};

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

/// Refresh cached tokens this long before GitHub expires them.
const REFRESH_MARGIN_MINUTES: i64 = 5;

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Build the create-comment endpoint for a pull request.
pub fn comment_endpoint(api_base_url: &str, repo_full_name: &str, number: u64) -> Result<String> {
    let (owner, repo) = parse_repo(repo_full_name)?;
    Ok(format!(
        "{}/repos/{}/{}/issues/{number}/comments",
        api_base_url.trim_end_matches('/'),
        urlencoding::encode(owner),
        urlencoding::encode(repo),
    ))
}

fn parse_repo(repo_full_name: &str) -> Result<(&str, &str)> {
    match repo_full_name.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => Err(AppError::Internal(format!(
            "Invalid repo name: {repo_full_name}"
        ))),
    }
}

/// Exchanges app assertions for installation tokens against the GitHub API.
pub struct GitHubCredentials {
    client: Client,
    api_base_url: String,
    user_agent: String,
    signer: AppSigner,
    /// Cache of installation tokens: installation_id -> token
    token_cache: Arc<RwLock<HashMap<u64, InstallationAccessToken>>>,
}

impl GitHubCredentials {
    /// Load the private key and prepare the exchange client.
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let signer = AppSigner::from_config(config)?;
        Ok(Self::with_signer(
            signer,
            &config.api_base_url,
            &config.user_agent,
        ))
    }

    pub fn with_signer(signer: AppSigner, api_base_url: &str, user_agent: &str) -> Self {
        Self {
            client: Client::new(),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.to_string(),
            signer,
            token_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Mint a fresh assertion and exchange it for an installation token.
    ///
    /// No retries; the caller decides what a failure means for the event.
    pub async fn exchange_for_installation_token(
        &self,
        installation_id: u64,
    ) -> Result<InstallationAccessToken> {
        let assertion = self.signer.mint()?;
        self.exchange(&assertion, installation_id).await
    }

    async fn exchange(
        &self,
        assertion: &AppIdentityAssertion,
        installation_id: u64,
    ) -> Result<InstallationAccessToken> {
        let url = format!(
            "{}/app/installations/{installation_id}/access_tokens",
            self.api_base_url
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(assertion.jwt())
            .header("accept", ACCEPT)
            .header("user-agent", &self.user_agent)
            .header("x-github-api-version", API_VERSION)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::UpstreamAuth {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.json::<AccessTokenResponse>().await?;
        let expires_at = body
            .expires_at
            .unwrap_or_else(|| Utc::now() + Duration::hours(1));

        tracing::debug!(
            installation_id,
            expires_at = %expires_at,
            "Obtained installation token"
        );

        Ok(InstallationAccessToken::new(body.token, expires_at))
    }
}

#[async_trait]
impl CredentialProvider for GitHubCredentials {
    async fn installation_token(&self, installation_id: u64) -> Result<InstallationAccessToken> {
        // Check cache
        {
            let cache = self.token_cache.read().await;
            if let Some(token) = cache.get(&installation_id) {
                if token.is_valid_at(Utc::now() + Duration::minutes(REFRESH_MARGIN_MINUTES)) {
                    return Ok(token.clone());
                }
            }
        }

        let token = self.exchange_for_installation_token(installation_id).await?;

        let mut cache = self.token_cache.write().await;
        cache.insert(installation_id, token.clone());

        Ok(token)
    }

    async fn last_usable_token(&self, installation_id: u64) -> Option<InstallationAccessToken> {
        let cache = self.token_cache.read().await;
        cache
            .get(&installation_id)
            .filter(|token| token.is_valid_at(Utc::now()))
            .cloned()
    }
}

/// Posts comments with an installation token.
pub struct GitHubNotifier {
    client: Client,
    user_agent: String,
}

impl GitHubNotifier {
    pub fn new(config: &GitHubConfig) -> Self {
        Self {
            client: Client::new(),
            user_agent: config.user_agent.clone(),
        }
    }
}

#[async_trait]
impl Notifier for GitHubNotifier {
    async fn post(
        &self,
        comment_endpoint: &str,
        message: &str,
        token: &InstallationAccessToken,
    ) -> Result<()> {
        let response = self
            .client
            .post(comment_endpoint)
            .bearer_auth(&token.value)
            .header("accept", ACCEPT)
            .header("user-agent", &self.user_agent)
            .header("x-github-api-version", API_VERSION)
            .json(&serde_json::json!({ "body": message }))
            .send()
            .await
            .map_err(|e| AppError::Notify {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Notify {
                status: Some(status.as_u16()),
                message: body,
            });
        }

        Ok(())
    }
}
