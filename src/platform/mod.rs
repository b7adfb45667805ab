pub mod github;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::InstallationAccessToken;

/// Supplies installation-scoped access tokens.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Get a token for the installation, exchanging a fresh app assertion if needed.
    async fn installation_token(&self, installation_id: u64) -> Result<InstallationAccessToken>;

    /// A previously issued token that has not yet expired, if one is held.
    ///
    /// Used only to report a failure after a token exchange was rejected.
    async fn last_usable_token(&self, installation_id: u64) -> Option<InstallationAccessToken>;
}

/// Posts status messages to a pull request's comment thread.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post(
        &self,
        comment_endpoint: &str,
        message: &str,
        token: &InstallationAccessToken,
    ) -> Result<()>;
}
