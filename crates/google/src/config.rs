//! Configuration for the Google plugin
//!
//! Reads TOML from `--config <path>` or ~/.config/auth-plugin-google/config.toml.
//! Secrets may instead come from the environment; a non-empty variable wins
//! over the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use auth_plugin_sdk::plugin::{AuthPluginConfig, AuthenticationMethod};
use auth_plugin_sdk::session::CookieOptions;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Full plugin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Public base URL of the gateway, e.g. `https://data.example.com`
    #[serde(default = "default_external_url")]
    pub external_url: String,

    /// Front-end path to return to after login when none was requested
    #[serde(default = "default_redirect_url")]
    pub auth_plugin_redirect_url: String,

    /// Hosts allowed as absolute redirect targets
    #[serde(default)]
    pub allowed_external_redirect_domains: Vec<String>,

    /// Base URL of the authorization API
    #[serde(default = "default_auth_api_url")]
    pub auth_api_url: String,

    /// Shared secret for service tokens sent to the authorization API
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// User the plugin acts as when talking to the authorization API
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub google: GoogleConfig,

    #[serde(default)]
    pub plugin: PluginMetadata,

    #[serde(default)]
    pub hooks: HookConfig,

    /// Email address or `@domain` to session groups
    #[serde(default)]
    pub group_mapping: HashMap<String, Vec<String>>,
}

fn default_listen_port() -> u16 {
    6201
}

fn default_external_url() -> String {
    "http://localhost:6100".to_string()
}

fn default_redirect_url() -> String {
    "/sign-in-redirect".to_string()
}

fn default_auth_api_url() -> String {
    "http://localhost:6104/v0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Cookie signing secret, shared with the gateway (required)
    #[serde(default)]
    pub secret: Option<String>,

    /// Session database file
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// How often expired sessions are removed (default: 15 minutes)
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,

    #[serde(default)]
    pub cookie: CookieOptions,
}

fn default_database() -> PathBuf {
    PathBuf::from("sessions.db")
}

fn default_prune_interval() -> u64 {
    900
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            secret: None,
            database: default_database(),
            prune_interval_secs: default_prune_interval(),
            cookie: CookieOptions::default(),
        }
    }
}

/// Google OAuth client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,

    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default = "default_userinfo_url")]
    pub userinfo_url: String,
}

fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_userinfo_url() -> String {
    "https://openidconnect.googleapis.com/v1/userinfo".to_string()
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            userinfo_url: default_userinfo_url(),
        }
    }
}

/// What `GET /config` advertises
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    #[serde(default = "default_key")]
    pub key: String,

    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_icon_url")]
    pub icon_url: String,

    #[serde(default)]
    pub authentication_method: AuthenticationMethod,
}

fn default_key() -> String {
    "google".to_string()
}

fn default_name() -> String {
    "Google".to_string()
}

fn default_icon_url() -> String {
    "/icon.svg".to_string()
}

impl Default for PluginMetadata {
    fn default() -> Self {
        Self {
            key: default_key(),
            name: default_name(),
            icon_url: default_icon_url(),
            authentication_method: AuthenticationMethod::default(),
        }
    }
}

/// Built-in user creation hooks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookConfig {
    /// Organizational unit assigned to new users
    #[serde(default)]
    pub org_unit_id: Option<String>,

    /// Roles attached to new users
    #[serde(default)]
    pub default_role_ids: Vec<String>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            external_url: default_external_url(),
            auth_plugin_redirect_url: default_redirect_url(),
            allowed_external_redirect_domains: Vec::new(),
            auth_api_url: default_auth_api_url(),
            jwt_secret: None,
            user_id: None,
            session: SessionSettings::default(),
            google: GoogleConfig::default(),
            plugin: PluginMetadata::default(),
            hooks: HookConfig::default(),
            group_mapping: HashMap::new(),
        }
    }
}

impl PluginConfig {
    /// Load, apply environment overrides and validate.
    ///
    /// An explicit path must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => {
                let default_path = Self::default_config_path();
                if default_path.exists() {
                    Self::load_from_path(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("auth-plugin-google")
            .join("config.toml")
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Override secrets from the environment
    pub fn apply_env(&mut self) {
        override_from_env(&mut self.session.secret, "SESSION_SECRET");
        override_from_env(&mut self.jwt_secret, "JWT_SECRET");
        override_from_env(&mut self.user_id, "USER_ID");
        override_from_env(&mut self.google.client_id, "GOOGLE_CLIENT_ID");
        override_from_env(&mut self.google.client_secret, "GOOGLE_CLIENT_SECRET");
    }

    /// Fail fast on settings the plugin cannot run without.
    ///
    /// Missing Google credentials are not an error here: the plugin still
    /// serves `/config` and `/healthz` with its login routes disabled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.secret.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Invalid(
                "session secret is required (session.secret or SESSION_SECRET)".to_string(),
            ));
        }

        for (name, value) in [
            ("external_url", &self.external_url),
            ("auth_api_url", &self.auth_api_url),
        ] {
            let url = Url::parse(value)
                .map_err(|e| ConfigError::Invalid(format!("{name} {value:?}: {e}")))?;
            if url.host_str().is_none() {
                return Err(ConfigError::Invalid(format!("{name} {value:?} has no host")));
            }
        }

        if self.auth_plugin_redirect_url.is_empty() {
            return Err(ConfigError::Invalid(
                "auth_plugin_redirect_url must not be empty".to_string(),
            ));
        }

        self.plugin_metadata()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn plugin_metadata(&self) -> AuthPluginConfig {
        AuthPluginConfig::new(
            self.plugin.key.clone(),
            self.plugin.name.clone(),
            self.plugin.icon_url.clone(),
            self.plugin.authentication_method,
        )
    }
}

fn override_from_env(slot: &mut Option<String>, var: &str) {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            *slot = Some(value);
        }
    }
}
