use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Log directory, stdout when unset
    pub log_dir: Option<PathBuf>,
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_url: "sqlite://database/learnova.db".to_string(),
            log_dir: None,
            gateway: GatewayConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ai.gateway.lovable.dev/v1".to_string(),
            api_key: String::new(),
            model: "google/gemini-2.5-flash".to_string(),
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Either a JWT secret for local verification or the URL of a remote
/// identity endpoint. The secret wins when both are set.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
    pub url: Option<String>,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "***"))
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Read the TOML file when it exists, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            toml::from_str(&text)?
        } else {
            info!("config file {} not found, using defaults", path.display());
            Config::default()
        };
        let _ = dotenvy::dotenv();
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = dotenvy::var("LEARNOVA_DATABASE_URL") {
            self.database_url = url;
        }
        if let Ok(url) = dotenvy::var("AI_GATEWAY_URL") {
            self.gateway.base_url = url;
        }
        if let Ok(key) = dotenvy::var("AI_GATEWAY_KEY").or_else(|_| dotenvy::var("LOVABLE_API_KEY")) {
            self.gateway.api_key = key;
        }
        if let Ok(model) = dotenvy::var("AI_MODEL") {
            self.gateway.model = model;
        }
        if let Ok(secret) = dotenvy::var("JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Ok(url) = dotenvy::var("AUTH_URL") {
            self.auth.url = Some(url);
        }
        if let Ok(key) = dotenvy::var("AUTH_API_KEY") {
            self.auth.api_key = Some(key);
        }
    }
}
