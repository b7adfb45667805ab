use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::config::GitHubConfig;
use crate::error::{AppError, Result};

/// Lifetime of an app assertion; GitHub allows at most ten minutes.
pub const ASSERTION_LIFETIME_SECS: i64 = 10 * 60;

/// Backdate `iat` to tolerate clock drift between us and GitHub.
const CLOCK_DRIFT_SECS: i64 = 60;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// A signed JWT identifying the app itself.
#[derive(Clone)]
pub struct AppIdentityAssertion {
    pub issuer: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    jwt: String,
}

impl AppIdentityAssertion {
    pub fn jwt(&self) -> &str {
        &self.jwt
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl std::fmt::Debug for AppIdentityAssertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppIdentityAssertion")
            .field("issuer", &self.issuer)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("jwt", &"[REDACTED]")
            .finish()
    }
}

/// Signs app assertions with the app's RSA private key.
///
/// The key is loaded and test-signed once at construction so that a bad key
/// is a startup failure rather than a per-event one.
#[derive(Clone)]
pub struct AppSigner {
    app_id: u64,
    key: EncodingKey,
}

impl AppSigner {
    pub fn from_config(config: &GitHubConfig) -> Result<Self> {
        let key_pem = config.load_private_key()?;
        Self::from_pem(config.app_id, &key_pem)
    }

    pub fn from_pem(app_id: u64, key_pem: &[u8]) -> Result<Self> {
        let key = EncodingKey::from_rsa_pem(key_pem)
            .map_err(|e| AppError::Config(format!("Invalid RSA private key: {e}")))?;

        let signer = Self { app_id, key };
        signer.mint()?;
        Ok(signer)
    }

    /// Mint a fresh assertion valid from now.
    pub fn mint(&self) -> Result<AppIdentityAssertion> {
        self.mint_at(Utc::now())
    }

    pub fn mint_at(&self, now: DateTime<Utc>) -> Result<AppIdentityAssertion> {
        let issued_at = now - Duration::seconds(CLOCK_DRIFT_SECS);
        let expires_at = issued_at + Duration::seconds(ASSERTION_LIFETIME_SECS);
        let claims = JwtClaims {
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.app_id.to_string(),
        };

        let header = Header::new(Algorithm::RS256);
        let jwt = encode(&header, &claims, &self.key)
            .map_err(|e| AppError::Config(format!("Failed to generate JWT: {e}")))?;

        Ok(AppIdentityAssertion {
            issuer: claims.iss,
            issued_at,
            expires_at,
            jwt,
        })
    }
}
