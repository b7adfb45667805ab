use base64::Engine;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub github: GitHubConfig,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// How long shutdown waits for in-flight deployments to finish.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct GitHubConfig {
    pub app_id: u64,
    pub webhook_secret: String,
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    /// Base64-encoded PEM, for deployments that inject the key through the environment.
    #[serde(default)]
    pub private_key_base64: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

// Manual Debug impl to avoid leaking the webhook secret and key material
impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("app_id", &self.app_id)
            .field("webhook_secret", &"[REDACTED]")
            .field("private_key_path", &self.private_key_path)
            .field(
                "private_key_base64",
                &self.private_key_base64.as_ref().map(|_| "[REDACTED]"),
            )
            .field("api_base_url", &self.api_base_url)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl GitHubConfig {
    /// Read the app's private key PEM from whichever source is configured.
    pub fn load_private_key(&self) -> Result<Vec<u8>> {
        match (&self.private_key_path, &self.private_key_base64) {
            (Some(_), Some(_)) => Err(AppError::Config(
                "Set only one of github.private_key_path and github.private_key_base64"
                    .to_string(),
            )),
            (Some(path), None) => std::fs::read(path).map_err(|e| {
                AppError::Config(format!(
                    "Failed to read private key at {}: {e}",
                    path.display()
                ))
            }),
            (None, Some(encoded)) => base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| AppError::Config(format!("Invalid base64 private key: {e}"))),
            (None, None) => Err(AppError::Config(
                "No GitHub App private key configured".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScriptsConfig {
    #[serde(default = "default_provision_script")]
    pub provision: PathBuf,
    #[serde(default = "default_cleanup_script")]
    pub cleanup: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            provision: default_provision_script(),
            cleanup: default_cleanup_script(),
            timeout_secs: default_timeout_secs(),
            working_dir: None,
        }
    }
}

impl ScriptsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_user_agent() -> String {
    "preview-bot".to_string()
}

fn default_provision_script() -> PathBuf {
    PathBuf::from("./provision.sh")
}

fn default_cleanup_script() -> PathBuf {
    PathBuf::from("./cleanup.sh")
}

fn default_timeout_secs() -> u64 {
    15 * 60
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("preview-bot").required(false));
        }

        // Environment variable overrides with PREVIEW_BOT_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("PREVIEW_BOT")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| AppError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the service cannot safely run with.
    pub fn validate(&self) -> Result<()> {
        if self.github.app_id == 0 {
            return Err(AppError::Config("github.app_id must be set".to_string()));
        }
        if self.github.webhook_secret.is_empty() {
            return Err(AppError::Config(
                "github.webhook_secret must not be empty".to_string(),
            ));
        }
        if self.github.private_key_path.is_none() && self.github.private_key_base64.is_none() {
            return Err(AppError::Config(
                "One of github.private_key_path or github.private_key_base64 must be set"
                    .to_string(),
            ));
        }
        if self.scripts.timeout_secs == 0 {
            return Err(AppError::Config(
                "scripts.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn webhook_secret(&self) -> &[u8] {
        self.github.webhook_secret.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn github_config() -> GitHubConfig {
        GitHubConfig {
            app_id: 1234,
            webhook_secret: "s3cret".to_string(),
            private_key_path: None,
            private_key_base64: None,
            api_base_url: default_api_base_url(),
            user_agent: default_user_agent(),
        }
    }

    fn app_config(github: GitHubConfig) -> AppConfig {
        AppConfig {
            server: ServerConfig::default(),
            github,
            scripts: ScriptsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut github = github_config();
        github.private_key_base64 = Some("c2VjcmV0LWtleQ==".to_string());
        let rendered = format!("{github:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("c2VjcmV0LWtleQ=="));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_validate_requires_secret() {
        let mut github = github_config();
        github.private_key_path = Some(PathBuf::from("/tmp/key.pem"));
        github.webhook_secret = String::new();
        let err = app_config(github).validate().unwrap_err();
        assert!(err.to_string().contains("webhook_secret"));
    }

    #[test]
    fn test_validate_requires_key_source() {
        let err = app_config(github_config()).validate().unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut github = github_config();
        github.private_key_path = Some(PathBuf::from("/tmp/key.pem"));
        let mut config = app_config(github);
        config.scripts.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_private_key_from_base64() {
        let mut github = github_config();
        github.private_key_base64 = Some("LS0tLS1CRUdJTg==".to_string());
        assert_eq!(github.load_private_key().unwrap(), b"-----BEGIN");
    }

    #[test]
    fn test_load_private_key_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"pem-bytes").unwrap();

        let mut github = github_config();
        github.private_key_path = Some(file.path().to_path_buf());
        assert_eq!(github.load_private_key().unwrap(), b"pem-bytes");
    }

    #[test]
    fn test_load_private_key_rejects_both_sources() {
        let mut github = github_config();
        github.private_key_path = Some(PathBuf::from("/tmp/key.pem"));
        github.private_key_base64 = Some("LS0tLS1CRUdJTg==".to_string());
        assert!(github.load_private_key().is_err());
    }

    #[test]
    fn test_load_private_key_missing_file() {
        let mut github = github_config();
        github.private_key_path = Some(PathBuf::from("/nonexistent/preview-bot/key.pem"));
        let err = github.load_private_key().unwrap_err();
        assert!(err.to_string().contains("Failed to read private key"));
    }
}
